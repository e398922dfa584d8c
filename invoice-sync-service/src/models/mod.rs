//! Domain models for invoice-sync-service.

pub mod document;
pub mod job;
pub mod log_entry;
pub mod notice;
pub mod order;
pub mod payload;

pub use document::{
    DocumentInfo, DocumentType, LinkedDocument, PaymentStatus, RemoteDocument, PAYMENT_LINK_KEY,
};
pub use job::{JobKind, ScheduledJob};
pub use log_entry::{LogEntry, RequestKind, STATUS_BUILD_FAILED, STATUS_NO_RESPONSE};
pub use notice::{AdminNotice, NoticeLevel};
pub use order::{
    Address, Coupon, CouponKind, Fee, GiftCard, ItemMeta, LineItem, Order, OrderNote,
    OrderStatus, Product, ProductAttribute, Refund, RefundItem, ShippingMethod, TaxAmount,
    TaxLine,
};
pub use payload::{
    AccountingDetail, BankAccountRef, ClientData, DeliveryDate, Extras, InvoiceData,
    InvoiceItem, InvoicePayload, InvoiceSettings, MyData,
};
