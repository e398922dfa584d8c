mod common;

use chrono::{Duration, Utc};
use common::{remote_document, Call, Reply, TestApp, API_BASE_URL};
use invoice_sync_service::models::{DocumentType, OrderStatus, RequestKind};
use invoice_sync_service::orchestrator::{
    lock_file_name, GenerateError, GenerateOptions, Trigger, CONCURRENCY_MESSAGE,
};
use invoice_sync_service::overrides::Overrides;
use invoice_sync_service::services::JobQueue;
use rust_decimal_macros::dec;
use serde_json::json;

fn manual() -> GenerateOptions {
    GenerateOptions::new(Trigger::Manual)
}

#[tokio::test]
async fn status_change_creates_regular_invoice() {
    let app = TestApp::spawn(json!({ "invoice_regular_cod": "processing" })).await;
    let mut order = common::order(42);
    order.status = OrderStatus::Processing;
    app.insert_order(order).await;

    let response = app
        .client()
        .post(format!("{}/events", app.address))
        .json(&json!({ "event": "status_changed", "order_id": 42 }))
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["documents"][0]["document_type"], "regular");
    assert_eq!(body["documents"][0]["result"], "regular_ok");

    let created = app.api.created_payloads();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].items.len(), 1);
    assert_eq!(created[0].items[0].unit_price, dec!(83.33));
    assert_eq!(created[0].items[0].tax, dec!(20));
    assert_eq!(created[0].invoice.document_type, Some(DocumentType::Regular));

    let order = app.order(42).await;
    assert_eq!(order.meta("regular_id"), Some("5001"));
    assert_eq!(order.meta("regular_invoice_number"), Some("20245001"));
    let pdf = order.meta("invoice_regular").unwrap();
    assert!(pdf.starts_with(API_BASE_URL));
    assert!(pdf.ends_with("/invoices/pdf/5001/token:tok5001"));
    assert!(order.notes.iter().any(|n| n.text == "Invoice created."));

    let log = app.backend.log_entries().await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].request_type, RequestKind::Create);
    assert_eq!(log[0].order_id, Some(42));
    assert!(log[0].is_success());
}

#[tokio::test]
async fn unconfigured_status_creates_nothing() {
    let app = TestApp::spawn(json!({ "invoice_regular_cod": "completed" })).await;
    let mut order = common::order(42);
    order.status = OrderStatus::Processing;
    app.insert_order(order).await;

    let outcomes = app
        .state
        .dispatcher
        .order_updated(42, Trigger::StatusChange)
        .await
        .unwrap();

    assert!(outcomes.is_empty());
    assert!(app.api.calls().is_empty());
}

#[tokio::test]
async fn existing_document_on_completed_order_is_a_duplicate() {
    let app = TestApp::spawn(json!({})).await;
    let mut order = common::order(42);
    order.status = OrderStatus::Completed;
    order.set_meta("regular_id", "7");
    app.insert_order(order).await;
    app.api.insert_document(remote_document(7, "regular", "2024007", 1));

    for _ in 0..2 {
        let err = app
            .state
            .orchestrator
            .generate_for(42, DocumentType::Regular, manual())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::DuplicateDocument));
        assert_eq!(err.result_code(DocumentType::Regular), "duplicate_document");
    }
    assert_eq!(app.api.mutating_calls(), 0);
}

#[tokio::test]
async fn stale_document_id_is_replaced_by_a_new_document() {
    let app = TestApp::spawn(json!({})).await;
    let mut order = common::order(42);
    order.status = OrderStatus::Completed;
    order.set_meta("regular_id", "7");
    app.insert_order(order).await;

    let info = app
        .state
        .orchestrator
        .generate_for(42, DocumentType::Regular, manual())
        .await
        .unwrap();

    assert_eq!(info.id, 5001);
    assert_eq!(app.api.created_payloads().len(), 1);
    assert!(app.api.edited_payloads().is_empty());
    assert_eq!(app.order(42).await.meta("regular_id"), Some("5001"));
}

#[tokio::test]
async fn eligible_existing_document_is_edited_after_clearing_items() {
    let app = TestApp::spawn(json!({})).await;
    let mut order = common::order(42);
    order.status = OrderStatus::OnHold;
    order.set_meta("proforma_id", "7");
    app.insert_order(order).await;
    let mut existing = remote_document(7, "proforma", "P2024007", 1);
    existing.item_ids = (1..=120).collect();
    app.api.insert_document(existing);

    let info = app
        .state
        .orchestrator
        .generate_for(42, DocumentType::Proforma, manual())
        .await
        .unwrap();
    assert_eq!(info.id, 7);

    let deletes: Vec<usize> = app
        .api
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::DeleteItems(7, ids) => Some(ids.len()),
            _ => None,
        })
        .collect();
    assert_eq!(deletes, vec![50, 50, 20]);

    let edited = app.api.edited_payloads();
    assert_eq!(edited.len(), 1);
    assert_eq!(edited[0].invoice.id, Some(7));
    assert_eq!(edited[0].invoice.vat_transfer, Some(0));
    assert!(app.api.created_payloads().is_empty());

    let log = app.backend.log_entries().await;
    assert_eq!(log[0].request_type, RequestKind::Edit);
}

#[tokio::test]
async fn failed_lookup_of_existing_document_aborts() {
    let app = TestApp::spawn(json!({})).await;
    let mut order = common::order(42);
    order.set_meta("regular_id", "7");
    app.insert_order(order).await;
    app.api.break_lookup(7);

    let err = app
        .state
        .orchestrator
        .generate_for(42, DocumentType::Regular, manual())
        .await
        .unwrap_err();

    assert!(matches!(err, GenerateError::ExistingLookupFailed(_)));
    assert_eq!(app.api.mutating_calls(), 0);
}

#[tokio::test]
async fn rejection_is_logged_verbatim_and_never_retried() {
    let app = TestApp::spawn(json!({ "retry_failed_api_calls": "yes" })).await;
    app.insert_order(common::order(42)).await;
    app.api.reply(Reply::Rejected {
        code: 2,
        message: "Client name is missing".into(),
    });

    let err = app
        .state
        .orchestrator
        .generate_for(42, DocumentType::Regular, GenerateOptions::new(Trigger::StatusChange))
        .await
        .unwrap_err();

    match err {
        GenerateError::RemoteRejected { code, message } => {
            assert_eq!(code, 2);
            assert_eq!(message, "Client name is missing");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let log = app.backend.log_entries().await;
    assert_eq!(log[0].response_status, Some(2));
    assert_eq!(log[0].response_message.as_deref(), Some("Client name is missing"));
    assert!(app.backend.pending().await.unwrap().is_empty());
    assert_eq!(app.order(42).await.meta("regular_id"), None);
}

#[tokio::test]
async fn build_failure_is_logged_without_remote_call() {
    let app = TestApp::spawn(json!({})).await;
    let mut order = common::order(42);
    order.items[0].subtotal_taxes[0].rate_id = 99;
    app.insert_order(order).await;

    let err = app
        .state
        .orchestrator
        .generate_for(42, DocumentType::Regular, manual())
        .await
        .unwrap_err();

    assert!(matches!(err, GenerateError::PayloadBuildFailed(_)));
    assert_eq!(app.api.mutating_calls(), 0);
    let log = app.backend.log_entries().await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].response_status, Some(990));
}

#[tokio::test]
async fn build_failure_on_edit_leaves_existing_document_untouched() {
    let app = TestApp::spawn(json!({})).await;
    let mut order = common::order(42);
    order.status = OrderStatus::OnHold;
    order.set_meta("proforma_id", "7");
    order.items[0].subtotal_taxes[0].rate_id = 99;
    app.insert_order(order).await;
    let mut existing = remote_document(7, "proforma", "P2024007", 1);
    existing.item_ids = vec![1, 2, 3];
    app.api.insert_document(existing);

    let err = app
        .state
        .orchestrator
        .generate_for(42, DocumentType::Proforma, manual())
        .await
        .unwrap_err();

    assert!(matches!(err, GenerateError::PayloadBuildFailed(_)));
    assert_eq!(app.api.mutating_calls(), 0);
    assert_eq!(app.order(42).await.meta("proforma_id"), Some("7"));
    let log = app.backend.log_entries().await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].request_type, RequestKind::Edit);
    assert_eq!(log[0].response_status, Some(990));
}

#[tokio::test]
async fn payment_link_follows_document_payment_state() {
    let app = TestApp::spawn(json!({})).await;
    app.insert_order(common::order(42)).await;

    app.api.reply(Reply::Created {
        status: 1,
        payment_link: Some("https://pay.example/abc".into()),
    });
    let info = app
        .state
        .orchestrator
        .generate_for(42, DocumentType::Proforma, manual())
        .await
        .unwrap();
    assert_eq!(info.payment_link.as_deref(), Some("https://pay.example/abc"));
    assert_eq!(
        app.order(42).await.meta("payment_link"),
        Some("https://pay.example/abc")
    );

    app.api.reply(Reply::Created {
        status: 3,
        payment_link: Some("https://pay.example/abc".into()),
    });
    app.state
        .orchestrator
        .generate_for(42, DocumentType::Regular, manual())
        .await
        .unwrap();
    assert_eq!(app.order(42).await.meta("payment_link"), None);
}

#[tokio::test]
async fn held_lock_blocks_generation() {
    let app = TestApp::spawn(json!({ "prevent_concurrency": "yes" })).await;
    app.insert_order(common::order(42)).await;
    let now = Utc::now();
    for at in [now, now + Duration::minutes(1)] {
        let path = app
            .lock_dir
            .path()
            .join(lock_file_name(42, DocumentType::Regular, at));
        std::fs::write(path, b"").unwrap();
    }

    let err = app
        .state
        .orchestrator
        .generate_for(42, DocumentType::Regular, manual())
        .await
        .unwrap_err();

    assert!(matches!(err, GenerateError::ConcurrencyBlocked));
    assert_eq!(err.result_code(DocumentType::Regular), "concurrency");
    assert_eq!(app.api.mutating_calls(), 0);
    let log = app.backend.log_entries().await;
    assert_eq!(log[0].response_status, Some(990));
    assert_eq!(log[0].response_message.as_deref(), Some(CONCURRENCY_MESSAGE));
}

#[tokio::test]
async fn unusable_lock_directory_is_a_storage_failure() {
    let scratch = tempfile::tempdir().unwrap();
    let not_a_dir = scratch.path().join("locks");
    std::fs::write(&not_a_dir, b"").unwrap();
    let app = TestApp::spawn_adjusted(
        json!({ "prevent_concurrency": "yes" }),
        Overrides::new(),
        |config| config.merchant.lock_dir = not_a_dir.clone(),
    )
    .await;
    app.insert_order(common::order(42)).await;

    let err = app
        .state
        .orchestrator
        .generate_for(42, DocumentType::Regular, manual())
        .await
        .unwrap_err();

    assert!(matches!(err, GenerateError::Storage(_)), "{:?}", err);
    assert_eq!(err.result_code(DocumentType::Regular), "regular_failed");
    assert_eq!(app.api.mutating_calls(), 0);
    assert!(app.backend.log_entries().await.is_empty());
}

#[tokio::test]
async fn lock_is_released_after_the_call() {
    let app = TestApp::spawn(json!({ "prevent_concurrency": "yes" })).await;
    app.insert_order(common::order(42)).await;

    app.state
        .orchestrator
        .generate_for(42, DocumentType::Proforma, manual())
        .await
        .unwrap();

    let leftovers = std::fs::read_dir(app.lock_dir.path()).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn skip_override_vetoes_generation() {

    let overrides = Overrides::new().on_skip_generation(|_, t| t == DocumentType::Proforma);
    let app = TestApp::spawn_with(json!({}), overrides).await;
    app.insert_order(common::order(42)).await;

    let err = app
        .state
        .orchestrator
        .generate_for(42, DocumentType::Proforma, manual())
        .await
        .unwrap_err();

    assert!(matches!(err, GenerateError::Skipped));
    assert!(app.api.calls().is_empty());
    assert!(app.backend.log_entries().await.is_empty());
}

#[tokio::test]
async fn custom_number_is_generated_and_reused() {
    let app = TestApp::spawn(json!({
        "invoice_custom_num": "yes",
        "invoice_regular_id_template": "FA[YEAR]-[COUNT]",
        "retry_failed_api_calls": "yes",
    }))
    .await;
    app.insert_order(common::order(42)).await;
    app.api.reply(Reply::TransportFailure);

    let expected = format!("FA{}-0001", Utc::now().format("%Y"));
    let options = GenerateOptions::new(Trigger::StatusChange);
    app.state
        .orchestrator
        .generate_for(42, DocumentType::Regular, options)
        .await
        .unwrap_err();
    let info = app
        .state
        .orchestrator
        .generate_for(42, DocumentType::Regular, options)
        .await
        .unwrap();

    let numbers: Vec<_> = app
        .api
        .created_payloads()
        .into_iter()
        .map(|p| p.invoice.invoice_no_formatted)
        .collect();
    assert_eq!(numbers, vec![Some(expected.clone()), Some(expected.clone())]);
    assert_eq!(info.number, expected);
}

#[tokio::test]
async fn configured_tag_is_matched_case_insensitively() {
    let app = TestApp::spawn(json!({ "invoice_tag": "Eshop" })).await;
    app.insert_order(common::order(42)).await;
    app.api.insert_tag(3, "eshop");

    app.state
        .orchestrator
        .generate_for(42, DocumentType::Regular, manual())
        .await
        .unwrap();

    assert_eq!(app.api.created_payloads()[0].tags, vec![3]);
    assert!(!app
        .api
        .calls()
        .iter()
        .any(|c| matches!(c, Call::AddTag(_))));
}

#[tokio::test]
async fn missing_tag_is_created() {
    let app = TestApp::spawn(json!({ "invoice_tag": "Eshop" })).await;
    app.insert_order(common::order(42)).await;

    app.state
        .orchestrator
        .generate_for(42, DocumentType::Regular, manual())
        .await
        .unwrap();

    assert!(app
        .api
        .calls()
        .contains(&Call::AddTag("Eshop".into())));
    assert_eq!(app.api.created_payloads()[0].tags, vec![1]);
}

#[tokio::test]
async fn regenerate_runs_every_stored_type_in_order() {
    let app = TestApp::spawn(json!({})).await;
    let mut order = common::order(42);
    order.status = OrderStatus::OnHold;
    order.set_meta("regular_id", "8");
    order.set_meta("proforma_id", "7");
    app.insert_order(order).await;
    app.api.insert_document(remote_document(7, "proforma", "P7", 1));
    app.api.insert_document(remote_document(8, "regular", "R8", 1));

    let mut order = app.order(42).await;
    let documents = app.state.orchestrator.regenerate(&mut order).await.unwrap();

    let ids: Vec<i64> = documents.iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![7, 8]);
    let edited: Vec<_> = app
        .api
        .edited_payloads()
        .into_iter()
        .map(|p| p.invoice.document_type)
        .collect();
    assert_eq!(
        edited,
        vec![Some(DocumentType::Proforma), Some(DocumentType::Regular)]
    );
}
