#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use invoice_sync_service::client::{
    ApiError, ApiResponse, InvoiceListing, InvoicingApi, Sequence,
};
use invoice_sync_service::config::{
    ApiConfig, ApiCountry, Config, DatabaseConfig, LogSettings, MerchantConfig, ServerConfig,
    ViesConfig, WorkerConfig,
};
use invoice_sync_service::models::{
    Address, DocumentType, InvoicePayload, LineItem, Order, OrderStatus, Product,
    RemoteDocument, TaxAmount, TaxLine,
};
use invoice_sync_service::overrides::Overrides;
use invoice_sync_service::services::{MemoryBackend, Stores};
use invoice_sync_service::{AppState, Application};
use rust_decimal_macros::dec;
use secrecy::Secret;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const API_BASE_URL: &str = "http://invoicing.test";
pub const CALLBACK_SECRET: &str = "s3cret";
/// Nothing listens here; checks against it come back unverified.
pub const VIES_BASE_URL: &str = "http://127.0.0.1:1";

/// One call received by [`FakeApi`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create(InvoicePayload),
    Edit(InvoicePayload),
    Invoice(i64),
    DeleteItems(i64, Vec<i64>),
    FindByOrder(String, DocumentType),
    Tags,
    AddTag(String),
    MarkAsSent(i64, String),
    Sequences,
}

/// Scripted answer to the next create or edit.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Success with a fresh document in the given remote status.
    Created { status: i64, payment_link: Option<String> },
    Rejected { code: i64, message: String },
    TransportFailure,
    /// Well-formed reply without a document.
    Empty,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<Call>,
    replies: VecDeque<Reply>,
    documents: HashMap<i64, RemoteDocument>,
    broken_lookups: HashSet<i64>,
    listing: Vec<RemoteDocument>,
    tags: BTreeMap<i64, String>,
    next_id: i64,
    credentials_rejected: bool,
}

/// In-process stand-in for the invoicing API.
pub struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                next_id: 5000,
                ..Default::default()
            }),
        })
    }

    pub fn reply(&self, reply: Reply) {
        self.state.lock().unwrap().replies.push_back(reply);
    }

    pub fn insert_document(&self, document: RemoteDocument) {
        self.state
            .lock()
            .unwrap()
            .documents
            .insert(document.id, document);
    }

    pub fn remove_document(&self, id: i64) {
        self.state.lock().unwrap().documents.remove(&id);
    }

    /// Lookups of `id` fail with HTTP 500.
    pub fn break_lookup(&self, id: i64) {
        self.state.lock().unwrap().broken_lookups.insert(id);
    }

    pub fn set_listing(&self, documents: Vec<RemoteDocument>) {
        self.state.lock().unwrap().listing = documents;
    }

    /// Every sequences request is refused as unauthorized.
    pub fn reject_credentials(&self) {
        self.state.lock().unwrap().credentials_rejected = true;
    }

    pub fn insert_tag(&self, id: i64, name: &str) {
        self.state.lock().unwrap().tags.insert(id, name.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn created_payloads(&self) -> Vec<InvoicePayload> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Create(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn edited_payloads(&self) -> Vec<InvoicePayload> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Edit(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    /// Number of create and edit calls.
    /// Calls that change remote documents.
    pub fn mutating_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Create(_) | Call::Edit(_) | Call::DeleteItems(..)))
            .count()
    }

    fn answer(&self, payload: &InvoicePayload, id: Option<i64>) -> Result<ApiResponse, ApiError> {
        let mut state = self.state.lock().unwrap();
        let reply = state.replies.pop_front().unwrap_or(Reply::Created {
            status: 1,
            payment_link: None,
        });
        match reply {
            Reply::Created {
                status,
                payment_link,
            } => {
                let id = id.unwrap_or_else(|| {
                    state.next_id += 1;
                    state.next_id
                });
                let kind = payload
                    .invoice
                    .document_type
                    .map(|t| t.as_str().to_string())
                    .unwrap_or_else(|| "regular".into());
                let number = payload
                    .invoice
                    .invoice_no_formatted
                    .clone()
                    .unwrap_or_else(|| format!("2024{}", id));
                let document = remote_document(id, &kind, &number, status);
                state.documents.insert(id, document);
                Ok(created_response(id, &kind, &number, status, payment_link))
            }
            Reply::Rejected { code, message } => Ok(serde_json::from_value(json!({
                "error": code,
                "error_message": message,
            }))
            .unwrap()),
            Reply::TransportFailure => Err(ApiError::RequestFailed {
                message: "operation timed out".into(),
            }),
            Reply::Empty => Ok(ApiResponse::default()),
        }
    }
}

#[async_trait]
impl InvoicingApi for FakeApi {
    async fn create(&self, payload: &InvoicePayload) -> Result<ApiResponse, ApiError> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(Call::Create(payload.clone()));
        self.answer(payload, None)
    }

    async fn edit(&self, payload: &InvoicePayload) -> Result<ApiResponse, ApiError> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(Call::Edit(payload.clone()));
        self.answer(payload, payload.invoice.id)
    }

    async fn invoice(&self, id: i64) -> Result<RemoteDocument, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Invoice(id));
        if state.broken_lookups.contains(&id) {
            return Err(ApiError::Http {
                status: 500,
                message: "internal error".into(),
            });
        }
        state.documents.get(&id).cloned().ok_or(ApiError::NotFound)
    }

    async fn delete_invoice_items(&self, invoice_id: i64, item_ids: &[i64]) -> Result<(), ApiError> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(Call::DeleteItems(invoice_id, item_ids.to_vec()));
        Ok(())
    }

    async fn find_by_order(
        &self,
        order_no: &str,
        document_type: DocumentType,
    ) -> Result<InvoiceListing, ApiError> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(Call::FindByOrder(order_no.to_string(), document_type));
        Ok(InvoiceListing::from_documents(state.listing.clone()))
    }

    async fn tags(&self) -> Result<BTreeMap<i64, String>, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Tags);
        Ok(state.tags.clone())
    }

    async fn add_tag(&self, name: &str) -> Result<i64, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::AddTag(name.to_string()));
        let id = state.tags.keys().max().copied().unwrap_or(0) + 1;
        state.tags.insert(id, name.to_string());
        Ok(id)
    }

    async fn mark_as_sent(&self, invoice_id: i64, email: &str) -> Result<(), ApiError> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(Call::MarkAsSent(invoice_id, email.to_string()));
        Ok(())
    }

    async fn sequences(&self) -> Result<Vec<Sequence>, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Sequences);
        if state.credentials_rejected {
            return Err(ApiError::Http {
                status: 401,
                message: "Unauthorized".to_string(),
            });
        }
        Ok(vec![
            Sequence {
                id: 1,
                document_type: "regular".to_string(),
                mask: "FA[YYYY][NNNN]".to_string(),
            },
            Sequence {
                id: 2,
                document_type: "proforma".to_string(),
                mask: "ZF[YYYY][NNNN]".to_string(),
            },
        ])
    }
}

pub fn remote_document(id: i64, kind: &str, number: &str, status: i64) -> RemoteDocument {
    RemoteDocument {
        id,
        kind: kind.to_string(),
        number: number.to_string(),
        number_raw: Some(number.to_string()),
        status,
        token: format!("tok{}", id),
        ..Default::default()
    }
}

pub fn created_response(
    id: i64,
    kind: &str,
    number: &str,
    status: i64,
    payment_link: Option<String>,
) -> ApiResponse {
    let mut data = json!({
        "Invoice": {
            "id": id.to_string(),
            "type": kind,
            "invoice_no_formatted": number,
            "status": status.to_string(),
            "token": format!("tok{}", id),
        }
    });
    if let Some(link) = payment_link {
        data["PaymentLink"] = Value::String(link);
    }
    serde_json::from_value(json!({ "error": 0, "data": data })).unwrap()
}

pub fn address() -> Address {
    Address {
        first_name: "Jana".into(),
        last_name: "Novakova".into(),
        address_1: "Hlavna 1".into(),
        city: "Bratislava".into(),
        postcode: "81101".into(),
        country: "SK".into(),
        email: "jana@example.com".into(),
        phone: "+421900111222".into(),
        ..Default::default()
    }
}

/// 100.00 order with one 20% line, paid by cash on delivery.
pub fn order(id: i64) -> Order {
    Order {
        id,
        order_number: id.to_string(),
        status: OrderStatus::Pending,
        payment_method: "cod".into(),
        currency: "EUR".into(),
        currency_symbol: Some("€".into()),
        total: dec!(100),
        shipping_total: dec!(0),
        shipping_tax: dec!(0),
        discount_total: dec!(0),
        discount_tax: dec!(0),
        prices_include_tax: false,
        customer_note: String::new(),
        date_created: Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap(),
        date_paid: None,
        needs_processing: true,
        billing: address(),
        shipping: address(),
        items: vec![LineItem {
            id: 11,
            name: "Linen shirt".into(),
            quantity: dec!(1),
            subtotal: dec!(83.33),
            subtotal_tax: dec!(16.67),
            total: dec!(83.33),
            total_tax: dec!(16.67),
            subtotal_taxes: vec![TaxAmount {
                rate_id: 1,
                amount: Some(dec!(16.67)),
            }],
            meta: vec![],
            product: Some(Product {
                id: 501,
                sku: "SH-01".into(),
                ..Default::default()
            }),
        }],
        fees: vec![],
        tax_lines: vec![TaxLine {
            rate_id: 1,
            label: "VAT".into(),
            rate_percent: dec!(20),
            tax_total: dec!(16.67),
            shipping_tax_total: dec!(0),
            applies_to_shipping: true,
        }],
        refunds: vec![],
        shipping_methods: vec![],
        coupons: vec![],
        gift_cards: vec![],
        meta: BTreeMap::new(),
        notes: vec![],
    }
}

pub fn test_config(lock_dir: &TempDir) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: DatabaseConfig {
            url: None,
            max_connections: 1,
            min_connections: 1,
        },
        api: ApiConfig {
            email: "shop@example.com".into(),
            api_key: Secret::new("test-key".into()),
            company_id: None,
            country: ApiCountry::Sk,
            sandbox: true,
            base_url: Some(API_BASE_URL.into()),
            module: "invoice-sync-service-test".into(),
            timeout: Duration::from_secs(5),
        },
        vies: ViesConfig {
            base_url: VIES_BASE_URL.into(),
            timeout: Duration::from_secs(2),
        },
        merchant: MerchantConfig {
            base_country: "SK".into(),
            site_url: "https://shop.example/".into(),
            callback_secret: Some(Secret::new(CALLBACK_SECRET.into())),
            lock_dir: lock_dir.path().to_path_buf(),
        },
        worker: WorkerConfig {
            enabled: false,
            poll_interval: Duration::from_secs(1),
            batch_size: 10,
        },
        log: LogSettings {
            level: "info".into(),
            json: false,
        },
        service_name: "invoice-sync-service-test".to_string(),
    }
}

pub struct TestApp {
    pub address: String,
    pub http_port: u16,
    pub state: AppState,
    pub backend: Arc<MemoryBackend>,
    pub api: Arc<FakeApi>,
    pub lock_dir: TempDir,
}

impl TestApp {
    /// Spawn the service on a random port with in-memory storage, a fake
    /// invoicing API and the given merchant settings.
    pub async fn spawn(settings: Value) -> Self {
        Self::spawn_with(settings, Overrides::new()).await
    }

    pub async fn spawn_with(settings: Value, overrides: Overrides) -> Self {
        Self::spawn_adjusted(settings, overrides, |_| {}).await
    }

    /// Spawn with VAT number lookups sent to `vies_url`.
    pub async fn spawn_with_vies(settings: Value, vies_url: &str) -> Self {
        let vies_url = vies_url.to_string();
        Self::spawn_adjusted(settings, Overrides::new(), move |config| {
            config.vies.base_url = vies_url;
        })
        .await
    }

    /// Spawn with `adjust` applied to the test configuration first.
    pub async fn spawn_adjusted(
        settings: Value,
        overrides: Overrides,
        adjust: impl FnOnce(&mut Config),
    ) -> Self {
        let lock_dir = tempfile::tempdir().expect("Failed to create lock dir");
        let settings: HashMap<String, Value> = serde_json::from_value(settings).unwrap();
        let backend = Arc::new(MemoryBackend::with_settings(settings));
        let api = FakeApi::new();
        let mut config = test_config(&lock_dir);
        adjust(&mut config);

        let app = Application::build_with(
            config,
            Stores::memory(backend.clone()),
            None,
            api.clone(),
            overrides,
        )
        .await
        .expect("Failed to build test application");

        let http_port = app.http_port();
        let address = format!("http://127.0.0.1:{}", http_port);
        let state = app.state();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            http_port,
            state,
            backend,
            api,
            lock_dir,
        }
    }

    pub async fn insert_order(&self, order: Order) {
        self.backend.insert_order(order).await;
    }

    pub async fn order(&self, id: i64) -> Order {
        use invoice_sync_service::services::OrderRepository;
        self.backend
            .get(id)
            .await
            .unwrap()
            .expect("order should exist")
    }

    /// HTTP client that does not follow redirects.
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }
}
