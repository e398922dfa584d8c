//! Typed override hooks.
//!
//! Each hook receives the computed value and returns the value to use. An
//! unset hook leaves the value untouched.

use crate::models::{
    ClientData, DocumentType, InvoiceData, InvoiceItem, LineItem, MyData, Order, Refund,
};
use std::fmt;
use std::sync::Arc;

type Transform<T> = Arc<dyn Fn(T, &Order) -> T + Send + Sync>;

#[derive(Clone, Default)]
pub struct Overrides {
    skip_generation: Option<Arc<dyn Fn(&Order, DocumentType) -> bool + Send + Sync>>,
    can_regenerate: Option<Arc<dyn Fn(bool, &Order) -> bool + Send + Sync>>,
    client_data: Option<Transform<ClientData>>,
    client_country_data: Option<Transform<MyData>>,
    invoice_data: Option<Arc<dyn Fn(InvoiceData, &Order, DocumentType) -> InvoiceData + Send + Sync>>,
    item_data: Option<Arc<dyn Fn(InvoiceItem, &Order, &LineItem) -> Option<InvoiceItem> + Send + Sync>>,
    shipping_line: Option<Transform<InvoiceItem>>,
    discount_line: Option<Transform<InvoiceItem>>,
    refund_line: Option<Arc<dyn Fn(InvoiceItem, &Order, &Refund) -> InvoiceItem + Send + Sync>>,
    extra_items: Option<Arc<dyn Fn(&Order, &[InvoiceItem], DocumentType) -> Vec<InvoiceItem> + Send + Sync>>,
    language: Option<Transform<String>>,
    sequence_id: Option<Arc<dyn Fn(&Order, DocumentType) -> Option<String> + Send + Sync>>,
    invoice_number: Option<Arc<dyn Fn(&Order, DocumentType) -> Option<String> + Send + Sync>>,
    generate_decision: Option<Arc<dyn Fn(bool, &Order, DocumentType, &str) -> bool + Send + Sync>>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Veto generation entirely; `true` skips.
    pub fn on_skip_generation(
        mut self,
        f: impl Fn(&Order, DocumentType) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.skip_generation = Some(Arc::new(f));
        self
    }

    pub fn on_can_regenerate(
        mut self,
        f: impl Fn(bool, &Order) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.can_regenerate = Some(Arc::new(f));
        self
    }

    pub fn on_client_data(
        mut self,
        f: impl Fn(ClientData, &Order) -> ClientData + Send + Sync + 'static,
    ) -> Self {
        self.client_data = Some(Arc::new(f));
        self
    }

    /// Seller data forced by the destination country rules.
    pub fn on_client_country_data(
        mut self,
        f: impl Fn(MyData, &Order) -> MyData + Send + Sync + 'static,
    ) -> Self {
        self.client_country_data = Some(Arc::new(f));
        self
    }

    pub fn on_invoice_data(
        mut self,
        f: impl Fn(InvoiceData, &Order, DocumentType) -> InvoiceData + Send + Sync + 'static,
    ) -> Self {
        self.invoice_data = Some(Arc::new(f));
        self
    }

    /// Rewrite or drop (`None`) a product line.
    pub fn on_item_data(
        mut self,
        f: impl Fn(InvoiceItem, &Order, &LineItem) -> Option<InvoiceItem> + Send + Sync + 'static,
    ) -> Self {
        self.item_data = Some(Arc::new(f));
        self
    }

    pub fn on_shipping_line(
        mut self,
        f: impl Fn(InvoiceItem, &Order) -> InvoiceItem + Send + Sync + 'static,
    ) -> Self {
        self.shipping_line = Some(Arc::new(f));
        self
    }

    pub fn on_discount_line(
        mut self,
        f: impl Fn(InvoiceItem, &Order) -> InvoiceItem + Send + Sync + 'static,
    ) -> Self {
        self.discount_line = Some(Arc::new(f));
        self
    }

    pub fn on_refund_line(
        mut self,
        f: impl Fn(InvoiceItem, &Order, &Refund) -> InvoiceItem + Send + Sync + 'static,
    ) -> Self {
        self.refund_line = Some(Arc::new(f));
        self
    }

    /// Items appended after everything else.
    pub fn on_extra_items(
        mut self,
        f: impl Fn(&Order, &[InvoiceItem], DocumentType) -> Vec<InvoiceItem> + Send + Sync + 'static,
    ) -> Self {
        self.extra_items = Some(Arc::new(f));
        self
    }

    pub fn on_language(mut self, f: impl Fn(String, &Order) -> String + Send + Sync + 'static) -> Self {
        self.language = Some(Arc::new(f));
        self
    }

    /// Numbering sequence to use for a new document.
    pub fn on_sequence_id(
        mut self,
        f: impl Fn(&Order, DocumentType) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.sequence_id = Some(Arc::new(f));
        self
    }

    /// Preformatted document number for a new document.
    pub fn on_invoice_number(
        mut self,
        f: impl Fn(&Order, DocumentType) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.invoice_number = Some(Arc::new(f));
        self
    }

    /// Final say on whether an event generates a document.
    pub fn on_generate_decision(
        mut self,
        f: impl Fn(bool, &Order, DocumentType, &str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.generate_decision = Some(Arc::new(f));
        self
    }

    pub fn skip_generation(&self, order: &Order, document_type: DocumentType) -> bool {
        self.skip_generation
            .as_ref()
            .map(|f| f(order, document_type))
            .unwrap_or(false)
    }

    pub fn can_regenerate(&self, computed: bool, order: &Order) -> bool {
        match &self.can_regenerate {
            Some(f) => f(computed, order),
            None => computed,
        }
    }

    pub fn client_data(&self, data: ClientData, order: &Order) -> ClientData {
        match &self.client_data {
            Some(f) => f(data, order),
            None => data,
        }
    }

    pub fn client_country_data(&self, data: MyData, order: &Order) -> MyData {
        match &self.client_country_data {
            Some(f) => f(data, order),
            None => data,
        }
    }

    pub fn invoice_data(
        &self,
        data: InvoiceData,
        order: &Order,
        document_type: DocumentType,
    ) -> InvoiceData {
        match &self.invoice_data {
            Some(f) => f(data, order, document_type),
            None => data,
        }
    }

    pub fn item_data(&self, item: InvoiceItem, order: &Order, line: &LineItem) -> Option<InvoiceItem> {
        match &self.item_data {
            Some(f) => f(item, order, line),
            None => Some(item),
        }
    }

    pub fn shipping_line(&self, item: InvoiceItem, order: &Order) -> InvoiceItem {
        match &self.shipping_line {
            Some(f) => f(item, order),
            None => item,
        }
    }

    pub fn discount_line(&self, item: InvoiceItem, order: &Order) -> InvoiceItem {
        match &self.discount_line {
            Some(f) => f(item, order),
            None => item,
        }
    }

    pub fn refund_line(&self, item: InvoiceItem, order: &Order, refund: &Refund) -> InvoiceItem {
        match &self.refund_line {
            Some(f) => f(item, order, refund),
            None => item,
        }
    }

    pub fn extra_items(
        &self,
        order: &Order,
        items: &[InvoiceItem],
        document_type: DocumentType,
    ) -> Vec<InvoiceItem> {
        self.extra_items
            .as_ref()
            .map(|f| f(order, items, document_type))
            .unwrap_or_default()
    }

    pub fn language(&self, language: String, order: &Order) -> String {
        match &self.language {
            Some(f) => f(language, order),
            None => language,
        }
    }

    pub fn sequence_id(&self, order: &Order, document_type: DocumentType) -> Option<String> {
        self.sequence_id
            .as_ref()
            .and_then(|f| f(order, document_type))
            .filter(|s| !s.is_empty())
    }

    pub fn invoice_number(&self, order: &Order, document_type: DocumentType) -> Option<String> {
        self.invoice_number
            .as_ref()
            .and_then(|f| f(order, document_type))
            .filter(|s| !s.is_empty())
    }

    pub fn generate_decision(
        &self,
        computed: bool,
        order: &Order,
        document_type: DocumentType,
        payment_method: &str,
    ) -> bool {
        match &self.generate_decision {
            Some(f) => f(computed, order, document_type, payment_method),
            None => computed,
        }
    }
}

impl fmt::Debug for Overrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let set = [
            ("skip_generation", self.skip_generation.is_some()),
            ("can_regenerate", self.can_regenerate.is_some()),
            ("client_data", self.client_data.is_some()),
            ("client_country_data", self.client_country_data.is_some()),
            ("invoice_data", self.invoice_data.is_some()),
            ("item_data", self.item_data.is_some()),
            ("shipping_line", self.shipping_line.is_some()),
            ("discount_line", self.discount_line.is_some()),
            ("refund_line", self.refund_line.is_some()),
            ("extra_items", self.extra_items.is_some()),
            ("language", self.language.is_some()),
            ("sequence_id", self.sequence_id.is_some()),
            ("invoice_number", self.invoice_number.is_some()),
            ("generate_decision", self.generate_decision.is_some()),
        ];
        f.debug_list()
            .entries(set.iter().filter(|(_, on)| *on).map(|(name, _)| name))
            .finish()
    }
}
