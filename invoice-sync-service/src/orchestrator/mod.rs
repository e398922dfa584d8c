//! Generation Orchestrator.
//!
//! Decides between create, edit, skip and duplicate rejection for one
//! (order, document type), drives the invoicing API and writes the outcome
//! back to the order.

mod lock;
mod numbering;
mod recovery;

pub use lock::{lock_file_name, DocumentLock, LockError};
pub use numbering::custom_number;

use crate::assembler::{BuildError, MerchantContext, PayloadAssembler, RemoteLookup};
use crate::audit::AuditLogger;
use crate::client::{pdf_url, ApiError, ApiResponse, InvoicingApi, DELETE_BATCH_SIZE};
use crate::models::{
    DocumentInfo, DocumentType, LogEntry, Order, OrderStatus, RemoteDocument, RequestKind,
    PAYMENT_LINK_KEY, STATUS_BUILD_FAILED, STATUS_NO_RESPONSE,
};
use crate::overrides::Overrides;
use crate::scheduler::RetryScheduler;
use crate::services::metrics::{DOCUMENTS_TOTAL, ERRORS_TOTAL};
use crate::services::Stores;
use crate::settings::Settings;
use chrono::Utc;
use service_core::error::AppError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

pub const CONCURRENCY_MESSAGE: &str = "Request failed because of concurrency check.";
pub const NO_RESPONSE_MESSAGE: &str = "Request failed without further information.";

/// Hold time of the lock after a payment callback, so that duplicate
/// callbacks arriving in the same moment find it taken.
const CALLBACK_LOCK_GRACE: Duration = Duration::from_secs(1);

/// What caused a generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    StatusChange,
    Checkout,
    PaymentCallback,
    Manual,
    Retry,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::StatusChange => "status_change",
            Trigger::Checkout => "checkout",
            Trigger::PaymentCallback => "payment_callback",
            Trigger::Manual => "manual",
            Trigger::Retry => "retry",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GenerateOptions {
    /// Ignore any stored document id and always create.
    pub force_create: bool,
    pub trigger: Trigger,
}

impl GenerateOptions {
    pub fn new(trigger: Trigger) -> Self {
        Self {
            force_create: false,
            trigger,
        }
    }

    pub fn force_create(mut self, force: bool) -> Self {
        self.force_create = force;
        self
    }
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("generation skipped")]
    Skipped,

    #[error("Document was not created, because it already exists.")]
    DuplicateDocument,

    #[error("{}", CONCURRENCY_MESSAGE)]
    ConcurrencyBlocked,

    #[error("payload build failed: {0}")]
    PayloadBuildFailed(#[from] BuildError),

    #[error("invoicing API unavailable ({status}): {message}")]
    RemoteTransportFailed { status: i32, message: String },

    #[error("invoicing API rejected the request ({code}): {message}")]
    RemoteRejected { code: i64, message: String },

    #[error("failed to read the existing document: {0}")]
    ExistingLookupFailed(ApiError),

    #[error("order {0} not found")]
    OrderNotFound(i64),

    #[error(transparent)]
    Storage(#[from] AppError),
}

impl GenerateError {
    /// Short code handed back to synchronous callers.
    pub fn result_code(&self, document_type: DocumentType) -> String {
        match self {
            GenerateError::Skipped => "skipped".to_string(),
            GenerateError::DuplicateDocument => "duplicate_document".to_string(),
            GenerateError::ConcurrencyBlocked => "concurrency".to_string(),
            _ => format!("{}_failed", document_type.as_str()),
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            GenerateError::Skipped => "skipped",
            GenerateError::DuplicateDocument => "duplicate",
            GenerateError::ConcurrencyBlocked => "concurrency",
            GenerateError::PayloadBuildFailed(_) => "build_failed",
            GenerateError::RemoteTransportFailed { .. } => "transport_failed",
            GenerateError::RemoteRejected { .. } => "rejected",
            GenerateError::ExistingLookupFailed(_) => "lookup_failed",
            GenerateError::OrderNotFound(_) => "order_not_found",
            GenerateError::Storage(_) => "storage_error",
        }
    }
}

/// Default regeneration rule: documents stay editable until the order is
/// completed, or is processing with a payment method other than cash on
/// delivery.
pub fn default_can_regenerate(order: &Order) -> bool {
    match order.status {
        OrderStatus::Completed => false,
        OrderStatus::Processing => order.payment_method == "cod",
        _ => true,
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    api: Arc<dyn InvoicingApi>,
    stores: Stores,
    audit: AuditLogger,
    scheduler: RetryScheduler,
    overrides: Overrides,
    merchant: MerchantContext,
    lock_dir: PathBuf,
    api_base_url: String,
}

impl Orchestrator {
    pub fn new(
        api: Arc<dyn InvoicingApi>,
        stores: Stores,
        overrides: Overrides,
        merchant: MerchantContext,
        lock_dir: PathBuf,
        api_base_url: String,
    ) -> Self {
        Self {
            audit: AuditLogger::new(stores.audit.clone()),
            scheduler: RetryScheduler::new(stores.jobs.clone(), stores.notices.clone()),
            api,
            stores,
            overrides,
            merchant,
            lock_dir,
            api_base_url,
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn api(&self) -> &Arc<dyn InvoicingApi> {
        &self.api
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    pub fn scheduler(&self) -> &RetryScheduler {
        &self.scheduler
    }

    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    pub fn merchant(&self) -> &MerchantContext {
        &self.merchant
    }

    pub(crate) fn assembler(&self, settings: Settings) -> PayloadAssembler {
        PayloadAssembler::new(settings, self.overrides.clone(), self.merchant.clone())
    }

    /// Load the order and run [`Orchestrator::generate`] on it.
    pub async fn generate_for(
        &self,
        order_id: i64,
        document_type: DocumentType,
        options: GenerateOptions,
    ) -> Result<DocumentInfo, GenerateError> {
        let mut order = self
            .stores
            .orders
            .get(order_id)
            .await?
            .ok_or(GenerateError::OrderNotFound(order_id))?;
        self.generate(&mut order, document_type, options).await
    }

    /// Create or update the `document_type` document of `order`.
    #[instrument(
        skip(self, order, options),
        fields(
            order_id = order.id,
            document_type = %document_type,
            trigger = options.trigger.as_str(),
            force_create = options.force_create
        )
    )]
    pub async fn generate(
        &self,
        order: &mut Order,
        document_type: DocumentType,
        options: GenerateOptions,
    ) -> Result<DocumentInfo, GenerateError> {
        if self.overrides.skip_generation(order, document_type) {
            info!("Generation vetoed by override");
            return Err(self.fail(document_type, RequestKind::Create, GenerateError::Skipped));
        }

        let settings = self.stores.settings.snapshot().await?;

        let existing = if options.force_create {
            None
        } else {
            self.existing_document(order, document_type).await?
        };
        let request = if existing.is_some() {
            RequestKind::Edit
        } else {
            RequestKind::Create
        };

        if existing.is_some() {
            let computed = default_can_regenerate(order);
            if !self.overrides.can_regenerate(computed, order) {
                info!(status = order.status.as_str(), "Document exists and may not be regenerated");
                return Err(self.fail(document_type, request, GenerateError::DuplicateDocument));
            }
        }

        let lock = if settings.is_yes("prevent_concurrency", false) {
            match DocumentLock::acquire(&self.lock_dir, order.id, document_type, Utc::now()).await
            {
                Ok(lock) => Some(lock),
                Err(LockError::Io(e)) => {
                    error!(lock_dir = %self.lock_dir.display(), error = %e, "Failed to create concurrency lock");
                    let err = AppError::InternalError(
                        anyhow::Error::new(e).context("failed to create concurrency lock"),
                    );
                    return Err(self.fail(document_type, request, err.into()));
                }
                Err(LockError::Held) => {
                    warn!("Concurrency lock is taken");
                    self.audit
                        .record(
                            LogEntry::new(request)
                                .order(order.id)
                                .document(document_type)
                                .status(STATUS_BUILD_FAILED, CONCURRENCY_MESSAGE),
                        )
                        .await;
                    return Err(self.fail(document_type, request, GenerateError::ConcurrencyBlocked));
                }
            }
        } else {
            None
        };

        let sent = self
            .send(order, document_type, &settings, existing.as_ref())
            .await;

        if let Some(lock) = lock {
            let grace = (options.trigger == Trigger::PaymentCallback).then_some(CALLBACK_LOCK_GRACE);
            lock.release(grace).await;
        }

        let (response, language) = match sent {
            Ok(sent) => sent,
            Err(e) => return Err(self.fail(document_type, request, e)),
        };

        let mut entry = LogEntry::new(request).order(order.id).document(document_type);
        let response = match response {
            Err(e) => {
                let status = e.status().unwrap_or(STATUS_NO_RESPONSE);
                let message = Some(e.to_string())
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| NO_RESPONSE_MESSAGE.to_string());
                self.audit.record(entry.status(status, message.clone())).await;
                warn!(status = status, error = %message, code = e.code(), "Invoicing API request failed");

                let retry = request == RequestKind::Create
                    && options.trigger != Trigger::Manual
                    && settings.is_yes("retry_failed_api_calls", false)
                    && e.is_transport_failure();
                if retry {
                    self.schedule_retry(order, document_type).await;
                }
                return Err(self.fail(
                    document_type,
                    request,
                    GenerateError::RemoteTransportFailed { status, message },
                ));
            }
            Ok(response) => response,
        };

        if let Some((code, message)) = response.rejection() {
            let status = i32::try_from(code).unwrap_or(i32::MAX);
            entry = entry.status(status, message.clone());
            self.audit.record(entry).await;
            warn!(code = code, error = %message, "Invoicing API rejected the document");
            return Err(self.fail(
                document_type,
                request,
                GenerateError::RemoteRejected { code, message },
            ));
        }

        let Some(created) = response.data else {
            self.audit
                .record(entry.status(STATUS_NO_RESPONSE, NO_RESPONSE_MESSAGE))
                .await;
            return Err(self.fail(
                document_type,
                request,
                GenerateError::RemoteTransportFailed {
                    status: STATUS_NO_RESPONSE,
                    message: NO_RESPONSE_MESSAGE.to_string(),
                },
            ));
        };
        self.audit.record(entry).await;

        let document = created.invoice.into_remote();
        match created.payment_link.filter(|l| !l.is_empty()) {
            Some(link) if !document.is_paid() => order.set_meta(PAYMENT_LINK_KEY, link),
            _ => order.delete_meta(PAYMENT_LINK_KEY),
        }
        let mut info = self.store_document(order, document_type, &document, &language);
        info.payment_link = order.meta(PAYMENT_LINK_KEY).map(str::to_string);
        order.add_note(document_type.created_note());
        self.stores.orders.save(order).await?;

        DOCUMENTS_TOTAL
            .with_label_values(&[document_type.as_str(), request.as_str(), "ok"])
            .inc();
        info!(document_id = info.id, number = %info.number, "Document stored on order");

        Ok(info)
    }

    /// Regenerate every document the order already has, in type order.
    pub async fn regenerate(&self, order: &mut Order) -> Result<Vec<DocumentInfo>, GenerateError> {
        let mut documents = Vec::new();
        for document_type in DocumentType::ALL {
            if order.meta(&document_type.id_key()).is_none() {
                continue;
            }
            let info = self
                .generate(order, document_type, GenerateOptions::new(Trigger::Manual))
                .await?;
            documents.push(info);
        }
        Ok(documents)
    }

    /// Remote document behind the stored id, `None` when there is no id or
    /// the id went stale.
    async fn existing_document(
        &self,
        order: &Order,
        document_type: DocumentType,
    ) -> Result<Option<RemoteDocument>, GenerateError> {
        let Some(id) = order
            .meta(&document_type.id_key())
            .and_then(|v| v.trim().parse::<i64>().ok())
        else {
            return Ok(None);
        };
        match self.api.invoice(id).await {
            Ok(document) => Ok(Some(document)),
            Err(ApiError::NotFound) => {
                info!(document_id = id, "Stored document is gone remotely, creating a new one");
                Ok(None)
            }
            Err(e) => {
                warn!(document_id = id, error = %e, "Failed to read existing document");
                Err(GenerateError::ExistingLookupFailed(e))
            }
        }
    }

    /// Everything between the guards and the response: remote lookups,
    /// assembly, numbering, edit preparation and the API call itself.
    async fn send(
        &self,
        order: &mut Order,
        document_type: DocumentType,
        settings: &Settings,
        existing: Option<&RemoteDocument>,
    ) -> Result<(Result<ApiResponse, ApiError>, String), GenerateError> {
        let proforma = if document_type == DocumentType::Regular {
            self.linked_proforma(order).await
        } else {
            None
        };
        let lookup = RemoteLookup {
            existing: existing.cloned(),
            proforma,
            tag_id: self.resolve_tag(settings).await,
        };

        let assembler = self.assembler(settings.clone());
        let language = assembler.document_language(order);
        let request = if lookup.is_edit() {
            RequestKind::Edit
        } else {
            RequestKind::Create
        };

        let mut payload = match assembler.assemble(order, document_type, &lookup) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, stage = e.stage(), "Payload assembly failed");
                self.audit
                    .record(
                        LogEntry::new(request)
                            .order(order.id)
                            .document(document_type)
                            .status(STATUS_BUILD_FAILED, e.log_message()),
                    )
                    .await;
                return Err(e.into());
            }
        };

        payload.invoice.document_type = Some(document_type);
        let response = match existing {
            Some(existing) => {
                payload.invoice.id = Some(existing.id);
                self.clear_items(existing).await;
                self.api.edit(&payload).await
            }
            None => {
                if let Some(sequence) = self.overrides.sequence_id(order, document_type) {
                    payload.invoice.sequence_id = Some(sequence);
                } else {
                    payload.invoice.invoice_no_formatted =
                        match self.overrides.invoice_number(order, document_type) {
                            Some(number) => Some(number),
                            None if settings.is_yes("invoice_custom_num", false) => Some(
                                custom_number(
                                    order,
                                    document_type,
                                    settings,
                                    self.stores.settings.as_ref(),
                                    Utc::now(),
                                )
                                .await?,
                            ),
                            None => None,
                        };
                }
                self.api.create(&payload).await
            }
        };
        Ok((response, language))
    }

    /// Delete the current items of a document about to be edited. Failures
    /// only leave stale items behind, so they are logged and ignored.
    async fn clear_items(&self, existing: &RemoteDocument) {
        for chunk in existing.item_ids.chunks(DELETE_BATCH_SIZE) {
            if let Err(e) = self.api.delete_invoice_items(existing.id, chunk).await {
                warn!(document_id = existing.id, error = %e, "Failed to delete document items");
            }
        }
    }

    async fn linked_proforma(&self, order: &Order) -> Option<RemoteDocument> {
        let id = order
            .meta(&DocumentType::Proforma.id_key())?
            .trim()
            .parse::<i64>()
            .ok()?;
        match self.api.invoice(id).await {
            Ok(document) => Some(document),
            Err(e) => {
                warn!(proforma_id = id, error = %e, "Failed to read linked proforma");
                None
            }
        }
    }

    /// Id of the configured tag, created remotely when missing.
    async fn resolve_tag(&self, settings: &Settings) -> Option<i64> {
        let name = settings.get("invoice_tag")?;
        let wanted = name.to_lowercase();
        match self.api.tags().await {
            Ok(tags) => {
                if let Some(id) = tags
                    .iter()
                    .find(|(_, tag)| tag.to_lowercase() == wanted)
                    .map(|(id, _)| *id)
                {
                    return Some(id);
                }
            }
            Err(e) => warn!(error = %e, "Failed to list tags"),
        }
        match self.api.add_tag(&name).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(tag = %name, error = %e, "Failed to create tag");
                None
            }
        }
    }

    /// Write id, number and PDF URL of `document` to the order metadata.
    pub(crate) fn store_document(
        &self,
        order: &mut Order,
        document_type: DocumentType,
        document: &RemoteDocument,
        language: &str,
    ) -> DocumentInfo {
        let pdf = pdf_url(&self.api_base_url, language, document.id, &document.token);
        order.set_meta(&document_type.id_key(), document.id.to_string());
        order.set_meta(&document_type.number_key(), document.number.clone());
        order.set_meta(&document_type.pdf_key(), pdf.clone());
        DocumentInfo {
            id: document.id,
            number: document.number.clone(),
            pdf_url: pdf,
            payment_link: None,
        }
    }

    async fn schedule_retry(&self, order: &mut Order, document_type: DocumentType) {
        if let Err(e) = self
            .scheduler
            .schedule_retry(order, document_type, Utc::now())
            .await
        {
            ERRORS_TOTAL.with_label_values(&["retry_schedule"]).inc();
            warn!(error = %e, "Failed to schedule retry");
            return;
        }
        if let Err(e) = self.stores.orders.save(order).await {
            warn!(error = %e, "Failed to save order after scheduling retry");
        }
    }

    fn fail(
        &self,
        document_type: DocumentType,
        request: RequestKind,
        error: GenerateError,
    ) -> GenerateError {
        DOCUMENTS_TOTAL
            .with_label_values(&[document_type.as_str(), request.as_str(), error.outcome()])
            .inc();
        if !matches!(error, GenerateError::Skipped | GenerateError::DuplicateDocument) {
            ERRORS_TOTAL.with_label_values(&[error.outcome()]).inc();
        }
        error
    }
}
