mod common;

use chrono::{Duration, Utc};
use common::{remote_document, TestApp, CALLBACK_SECRET};
use invoice_sync_service::config::WorkerConfig;
use invoice_sync_service::models::{
    JobKind, LinkedDocument, OrderStatus, RequestKind, PAYMENT_LINK_KEY,
};
use invoice_sync_service::scheduler::JobWorker;
use invoice_sync_service::services::JobQueue;
use invoice_sync_service::triggers::{CallbackOutcome, CallbackRejection};
use serde_json::json;

async fn on_hold_with_proforma(app: &TestApp, proforma_status: i64) {
    let mut order = common::order(42);
    order.status = OrderStatus::OnHold;
    order.payment_method = "bacs".into();
    order.set_meta("proforma_id", "7");
    order.set_meta(PAYMENT_LINK_KEY, "https://pay.example/7");
    app.insert_order(order).await;
    app.api
        .insert_document(remote_document(7, "proforma", "P2024007", proforma_status));
}

async fn callback(app: &TestApp, invoice_id: &str, secret: &str) -> CallbackOutcome {
    app.state
        .dispatcher
        .payment_callback(invoice_id, secret)
        .await
        .unwrap()
}

fn rejected(outcome: CallbackOutcome) -> CallbackRejection {
    match outcome {
        CallbackOutcome::Rejected { reason } => reason,
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn wrong_secret_or_malformed_id_is_refused() {
    let app = TestApp::spawn(json!({})).await;
    on_hold_with_proforma(&app, 3).await;

    assert_eq!(
        rejected(callback(&app, "7", "wrong").await),
        CallbackRejection::InvalidParameters
    );
    assert_eq!(
        rejected(callback(&app, "seven", CALLBACK_SECRET).await),
        CallbackRejection::InvalidParameters
    );

    let log = app.backend.log_entries().await;
    assert_eq!(log.len(), 2);
    assert!(log.iter().all(|e| e.request_type == RequestKind::CallbackPaid
        && e.response_status == Some(901)
        && e.response_message.as_deref() == Some("Incorrect parameters")));
    assert_eq!(app.order(42).await.status, OrderStatus::OnHold);
}

#[tokio::test]
async fn unknown_document_is_refused() {
    let app = TestApp::spawn(json!({})).await;

    let reason = rejected(callback(&app, "404", CALLBACK_SECRET).await);

    assert_eq!(reason, CallbackRejection::DocumentNotFound);
    assert_eq!(reason.status(), 902);
    let log = app.backend.log_entries().await;
    assert_eq!(log[0].response_message.as_deref(), Some("Invoice ID 404 not found"));
}

#[tokio::test]
async fn unpaid_document_is_refused() {
    let app = TestApp::spawn(json!({})).await;
    on_hold_with_proforma(&app, 1).await;

    let reason = rejected(callback(&app, "7", CALLBACK_SECRET).await);

    assert_eq!(reason, CallbackRejection::DocumentNotPaid);
    assert_eq!(app.order(42).await.status, OrderStatus::OnHold);
}

#[tokio::test]
async fn paid_document_without_order_is_refused() {
    let app = TestApp::spawn(json!({})).await;
    app.api
        .insert_document(remote_document(8, "proforma", "P8", 3));

    let reason = rejected(callback(&app, "8", CALLBACK_SECRET).await);

    assert_eq!(reason, CallbackRejection::OrderNotFound);
    let log = app.backend.log_entries().await;
    assert_eq!(log[0].response_status, Some(904));
    assert_eq!(
        log[0].response_message.as_deref(),
        Some("Order with invoice ID 8 not found")
    );
}

#[tokio::test]
async fn order_not_on_hold_is_refused() {
    let app = TestApp::spawn(json!({})).await;
    on_hold_with_proforma(&app, 3).await;
    let mut order = app.order(42).await;
    order.status = OrderStatus::Processing;
    app.insert_order(order).await;

    let reason = rejected(callback(&app, "7", CALLBACK_SECRET).await);

    assert_eq!(reason, CallbackRejection::OrderNotOnHold);
    let log = app.backend.log_entries().await;
    assert_eq!(log[0].response_status, Some(905));
    assert_eq!(log[0].order_id, Some(42));
}

#[tokio::test]
async fn paid_proforma_completes_payment_and_triggers_invoice() {
    let app = TestApp::spawn(json!({ "invoice_regular_bacs": "processing" })).await;
    on_hold_with_proforma(&app, 3).await;

    let outcome = callback(&app, "7", CALLBACK_SECRET).await;

    assert_eq!(
        outcome,
        CallbackOutcome::Paid {
            order_id: 42,
            fetch_related_scheduled: false,
        }
    );
    let order = app.order(42).await;
    assert_eq!(order.status, OrderStatus::Processing);
    assert!(order.date_paid.is_some());
    assert_eq!(order.meta("regular_id"), Some("5001"));

    let created = app.api.created_payloads();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].invoice.proforma_id, Some(7));

    let log = app.backend.log_entries().await;
    assert_eq!(log[0].request_type, RequestKind::CallbackPaid);
    assert!(log[0].is_success());
    assert_eq!(log[1].request_type, RequestKind::Create);
    assert!(app.backend.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn paid_proforma_without_configured_invoice_fetches_the_related_one() {
    let app = TestApp::spawn(json!({})).await;
    on_hold_with_proforma(&app, 3).await;

    let outcome = callback(&app, "7", CALLBACK_SECRET).await;
    assert_eq!(
        outcome,
        CallbackOutcome::Paid {
            order_id: 42,
            fetch_related_scheduled: true,
        }
    );
    assert!(app.api.created_payloads().is_empty());

    let pending = app.backend.pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, JobKind::FetchRelated { proforma_id: 7 });

    let mut proforma = remote_document(7, "proforma", "P2024007", 3);
    proforma.related = vec![LinkedDocument {
        id: 9,
        kind: "regular".into(),
        tax_document: false,
    }];
    app.api.insert_document(proforma);
    app.api
        .insert_document(remote_document(9, "regular", "2024009", 3));

    let worker = JobWorker::new(
        app.state.orchestrator.clone(),
        &WorkerConfig {
            enabled: true,
            poll_interval: std::time::Duration::from_secs(1),
            batch_size: 10,
        },
    );
    assert_eq!(worker.tick(Utc::now() + Duration::minutes(6)).await.unwrap(), 1);

    let order = app.order(42).await;
    assert_eq!(order.meta("regular_id"), Some("9"));
    assert_eq!(order.meta("regular_invoice_number"), Some("2024009"));
    assert_eq!(order.meta(PAYMENT_LINK_KEY), None);
}

#[tokio::test]
async fn callback_endpoint_reports_outcome() {
    let app = TestApp::spawn(json!({})).await;
    on_hold_with_proforma(&app, 1).await;

    let response = app
        .client()
        .get(format!(
            "{}/callbacks/payment?invoice_id=7&secret_key={}",
            app.address, CALLBACK_SECRET
        ))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["outcome"], "rejected");
    assert_eq!(body["reason"], "document_not_paid");
}

#[tokio::test]
async fn callback_endpoint_requires_parameters() {
    let app = TestApp::spawn(json!({})).await;

    let response = app
        .client()
        .get(format!("{}/callbacks/payment?invoice_id=7", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 400);
}
