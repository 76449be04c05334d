//! Stamping lifecycle integration tests.

mod common;

use common::{create_draft, new_document, stamp_rejected, stamp_success, MockAuthority, TestApp};
use std::sync::atomic::Ordering;
use std::time::Duration;

use stamping_service::error::{DocumentError, StampError};
use stamping_service::models::{
    DocumentStatus, NewDocument, OperationType, PaymentMethod, SyncStatus,
};

#[tokio::test]
async fn stamp_success_reaches_stamped_with_authority_uuid() {
    let authority = MockAuthority::new();
    authority.push_stamp(stamp_success("AAA-111"));
    let app = TestApp::spawn(authority);

    let doc = create_draft(&app, "INV-0001").await;
    let stamped = app.lifecycle.request_stamp(doc.id).await.unwrap();

    assert_eq!(stamped.status, DocumentStatus::Stamped);
    assert_eq!(stamped.sync_status, SyncStatus::Idle);
    assert_eq!(stamped.authority_uuid.as_deref(), Some("AAA-111"));
    assert_eq!(stamped.series.as_deref(), Some("A"));
    assert_eq!(stamped.number.as_deref(), Some("100"));

    // Exactly one successful STAMP entry in the audit trail.
    let log = app.lifecycle.response_log(doc.id).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].operation, OperationType::Stamp);
    assert!(log[0].success);
    assert_eq!(app.authority.stamp_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn deferred_payment_with_concrete_form_fails_before_any_call() {
    let authority = MockAuthority::new();
    let app = TestApp::spawn(authority);

    let doc = app
        .lifecycle
        .create_document(NewDocument {
            source_invoice_ref: "INV-0002".to_string(),
            branch_ref: None,
            payment_method: PaymentMethod::DeferredPayment,
            payment_form_code: "03".to_string(),
            tax_use_code: "G03".to_string(),
        })
        .await
        .unwrap();

    let err = app.lifecycle.request_stamp(doc.id).await.unwrap_err();
    assert!(matches!(err, StampError::Validation(_)));

    // No authority call, no log entry, document untouched.
    assert_eq!(app.authority.stamp_calls.load(Ordering::SeqCst), 0);
    assert!(app.lifecycle.response_log(doc.id).await.unwrap().is_empty());
    let unchanged = app.lifecycle.document(doc.id).await.unwrap();
    assert_eq!(unchanged.status, DocumentStatus::Draft);
}

#[tokio::test]
async fn rejection_moves_to_error_and_is_retryable() {
    let authority = MockAuthority::new();
    authority.push_stamp(stamp_rejected("CFDI301", "invalid tax id"));
    authority.push_stamp(stamp_success("BBB-222"));
    let app = TestApp::spawn(authority);

    let doc = create_draft(&app, "INV-0003").await;

    let err = app.lifecycle.request_stamp(doc.id).await.unwrap_err();
    assert!(matches!(err, StampError::AuthorityRejection { .. }));

    let errored = app.lifecycle.document(doc.id).await.unwrap();
    assert_eq!(errored.status, DocumentStatus::Error);
    assert_eq!(errored.last_error.as_deref(), Some("[CFDI301] invalid tax id"));

    // ERROR is recoverable by a caller-initiated retry.
    let stamped = app.lifecycle.request_stamp(doc.id).await.unwrap();
    assert_eq!(stamped.status, DocumentStatus::Stamped);
    assert_eq!(stamped.authority_uuid.as_deref(), Some("BBB-222"));

    let log = app.lifecycle.response_log(doc.id).await.unwrap();
    assert_eq!(log.len(), 2);
    assert!(!log[0].success);
    assert!(log[0].error_message.is_some());
    assert!(log[1].success);
}

#[tokio::test]
async fn concurrent_stamps_on_same_document_yield_one_submission() {
    let authority = MockAuthority::new();
    authority.set_stamp_delay(Duration::from_millis(50));
    let app = TestApp::spawn(authority);

    let doc = create_draft(&app, "INV-0004").await;

    let (first, second) = tokio::join!(
        app.lifecycle.request_stamp(doc.id),
        app.lifecycle.request_stamp(doc.id),
    );

    let outcomes = [first, second];
    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    let duplicates = outcomes
        .iter()
        .filter(|r| matches!(r, Err(StampError::DuplicateSubmission(_))))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(duplicates, 1);
    // Never two authority calls for one invoice.
    assert_eq!(app.authority.stamp_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invoice_with_active_document_rejects_a_new_one() {
    let authority = MockAuthority::new();
    let app = TestApp::spawn(authority);

    let doc = create_draft(&app, "INV-0005").await;

    // Even in DRAFT, the invoice already has a document in progress.
    let err = app
        .lifecycle
        .create_document(new_document("INV-0005"))
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::ActiveDocumentExists(_)));

    app.lifecycle.request_stamp(doc.id).await.unwrap();
    let err = app
        .lifecycle
        .create_document(new_document("INV-0005"))
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::ActiveDocumentExists(_)));
}

#[tokio::test]
async fn stamping_an_already_stamped_document_is_an_invalid_transition() {
    let authority = MockAuthority::new();
    let app = TestApp::spawn(authority);

    let doc = create_draft(&app, "INV-0006").await;
    app.lifecycle.request_stamp(doc.id).await.unwrap();

    let err = app.lifecycle.request_stamp(doc.id).await.unwrap_err();
    assert!(matches!(err, StampError::Transition(_)));
    assert_eq!(app.authority.stamp_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn allocated_folio_is_kept_when_authority_omits_series() {
    let authority = MockAuthority::new();
    // Authority confirms the uuid but returns no series/number of its own.
    authority.push_stamp(stamping_service::services::authority::StampResponse {
        outcome: stamping_service::services::authority::StampOutcome::Success {
            uuid: "CCC-333".to_string(),
            series: None,
            number: None,
        },
        status_code: Some(200),
        raw: r#"{"uuid":"CCC-333"}"#.to_string(),
    });
    let app = TestApp::spawn_with_folios(authority);

    let doc = app
        .lifecycle
        .create_document(NewDocument {
            branch_ref: Some("MX-NORTH".to_string()),
            ..new_document("INV-0007")
        })
        .await
        .unwrap();

    let stamped = app.lifecycle.request_stamp(doc.id).await.unwrap();
    assert_eq!(stamped.series.as_deref(), Some("MX-NORTH"));
    assert_eq!(stamped.number.as_deref(), Some("1"));
}
