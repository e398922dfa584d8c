//! Deferred work run by the job worker: retried creations and the lookup of
//! the invoice issued for a paid proforma.

use super::{GenerateError, GenerateOptions, Orchestrator, Trigger};
use crate::models::{DocumentType, Order, PAYMENT_LINK_KEY};
use tracing::{info, instrument, warn};

impl Orchestrator {
    /// Re-attempt a failed creation.
    ///
    /// The remote side is searched by order number first: a request that
    /// timed out locally may still have produced a document.
    #[instrument(skip(self, document_type), fields(document_type = %document_type))]
    pub async fn retry_generate(
        &self,
        order_id: i64,
        document_type: DocumentType,
        attempt: u32,
    ) -> Result<(), GenerateError> {
        let Some(mut order) = self.stores().orders.get(order_id).await? else {
            warn!("Order for retry no longer exists");
            return Ok(());
        };

        order.set_meta(&document_type.retry_attempts_key(), attempt.to_string());

        if order.meta(&document_type.id_key()).is_some() {
            info!("Document already exists, nothing to retry");
            self.stores().orders.save(&order).await?;
            return Ok(());
        }

        match self
            .api()
            .find_by_order(&order.order_number, document_type)
            .await
        {
            Ok(listing) => {
                if let Some(document) = listing.first() {
                    let language = self.order_language(&order).await?;
                    let stored = self.store_document(&mut order, document_type, &document, &language);
                    self.stores().orders.save(&order).await?;
                    info!(document_id = stored.id, "Found document created by an earlier attempt");
                    return Ok(());
                }
            }
            Err(e) => warn!(error = %e, "Lookup by order number failed, creating anew"),
        }

        self.generate(&mut order, document_type, GenerateOptions::new(Trigger::Retry))
            .await
            .map(|_| ())
    }

    /// Store the regular invoice the remote side issued for a paid proforma.
    #[instrument(skip(self))]
    pub async fn fetch_related(&self, proforma_id: i64) -> Result<(), GenerateError> {
        let key = DocumentType::Proforma.id_key();
        let Some(mut order) = self
            .stores()
            .orders
            .find_by_meta(&key, &proforma_id.to_string())
            .await?
            .into_iter()
            .next()
        else {
            warn!("No order references the proforma");
            return Ok(());
        };

        if order.meta(&DocumentType::Regular.id_key()).is_some() {
            info!(order_id = order.id, "Order already has an invoice");
            return Ok(());
        }

        let proforma = self
            .api()
            .invoice(proforma_id)
            .await
            .map_err(GenerateError::ExistingLookupFailed)?;
        if proforma.kind != DocumentType::Proforma.as_str() {
            warn!(kind = %proforma.kind, "Referenced document is not a proforma");
            return Ok(());
        }
        let Some(regular_id) = proforma.related_regular_id() else {
            info!(order_id = order.id, "Proforma has no related invoice yet");
            return Ok(());
        };
        let invoice = self
            .api()
            .invoice(regular_id)
            .await
            .map_err(GenerateError::ExistingLookupFailed)?;

        let language = self.order_language(&order).await?;
        self.store_document(&mut order, DocumentType::Regular, &invoice, &language);
        if invoice.is_paid() {
            order.delete_meta(PAYMENT_LINK_KEY);
        }
        self.stores().orders.save(&order).await?;
        info!(order_id = order.id, document_id = invoice.id, "Related invoice stored");
        Ok(())
    }

    async fn order_language(&self, order: &Order) -> Result<String, GenerateError> {
        let settings = self.stores().settings.snapshot().await?;
        Ok(self.assembler(settings).document_language(order))
    }
}
