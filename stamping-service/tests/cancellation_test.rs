//! Cancellation lifecycle integration tests.

mod common;

use common::{
    cancel_accepted, cancel_pending, cancel_rejected, create_draft, query_found, stamp_success,
    MockAuthority, TestApp,
};
use std::sync::atomic::Ordering;

use stamping_service::error::{CancelError, DocumentError};
use stamping_service::models::{CancellationMotive, DocumentStatus, OperationType, SyncStatus};
use stamping_service::services::authority::AuthorityState;

#[tokio::test]
async fn accepted_cancellation_reaches_cancelled_with_timestamp() {
    let authority = MockAuthority::new();
    authority.push_stamp(stamp_success("AAA-111"));
    authority.push_cancel(cancel_accepted());
    let app = TestApp::spawn(authority);

    let doc = create_draft(&app, "INV-0201").await;
    app.lifecycle.request_stamp(doc.id).await.unwrap();

    let cancelled = app
        .lifecycle
        .request_cancellation(doc.id, CancellationMotive::ErrorsWithoutRelation, None)
        .await
        .unwrap();

    assert_eq!(cancelled.status, DocumentStatus::Cancelled);
    assert!(cancelled.cancellation_utc.is_some());
    assert_eq!(
        cancelled.cancellation_motive,
        Some(CancellationMotive::ErrorsWithoutRelation)
    );

    let log = app.lifecycle.response_log(doc.id).await.unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].operation, OperationType::CancelRequest);
    assert!(log[1].success);
}

#[tokio::test]
async fn motive_01_without_substitution_fails_before_any_call() {
    let authority = MockAuthority::new();
    let app = TestApp::spawn(authority);

    let doc = create_draft(&app, "INV-0202").await;
    app.lifecycle.request_stamp(doc.id).await.unwrap();

    let err = app
        .lifecycle
        .request_cancellation(doc.id, CancellationMotive::ErrorsWithRelation, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CancelError::Validation(_)));

    // No adapter call was made; the document is still stamped.
    assert_eq!(app.authority.cancel_calls.load(Ordering::SeqCst), 0);
    let unchanged = app.lifecycle.document(doc.id).await.unwrap();
    assert_eq!(unchanged.status, DocumentStatus::Stamped);
}

#[tokio::test]
async fn motive_01_requires_an_existing_stamped_substitution() {
    let authority = MockAuthority::new();
    authority.push_stamp(stamp_success("OLD-111"));
    authority.push_stamp(stamp_success("NEW-222"));
    authority.push_cancel(cancel_accepted());
    let app = TestApp::spawn(authority);

    let old = create_draft(&app, "INV-0203").await;
    app.lifecycle.request_stamp(old.id).await.unwrap();

    // An unknown substitution uuid is rejected locally.
    let err = app
        .lifecycle
        .request_cancellation(
            old.id,
            CancellationMotive::ErrorsWithRelation,
            Some("GHOST-999".to_string()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CancelError::Validation(_)));
    assert_eq!(app.authority.cancel_calls.load(Ordering::SeqCst), 0);

    // The corrected invoice gets its own stamped document, which can then
    // substitute the old one.
    let replacement = create_draft(&app, "INV-0203-R").await;
    app.lifecycle.request_stamp(replacement.id).await.unwrap();

    let cancelled = app
        .lifecycle
        .request_cancellation(
            old.id,
            CancellationMotive::ErrorsWithRelation,
            Some("NEW-222".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(cancelled.status, DocumentStatus::Cancelled);
    assert_eq!(cancelled.substitution_uuid.as_deref(), Some("NEW-222"));
}

#[tokio::test]
async fn substitution_uuid_is_rejected_for_other_motives() {
    let authority = MockAuthority::new();
    let app = TestApp::spawn(authority);

    let doc = create_draft(&app, "INV-0204").await;
    app.lifecycle.request_stamp(doc.id).await.unwrap();

    let err = app
        .lifecycle
        .request_cancellation(
            doc.id,
            CancellationMotive::OperationNotCompleted,
            Some("AAA-111".to_string()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CancelError::Validation(_)));
    assert_eq!(app.authority.cancel_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rejected_cancellation_reverts_to_stamped_with_reason_logged() {
    let authority = MockAuthority::new();
    authority.push_stamp(stamp_success("AAA-111"));
    authority.push_cancel(cancel_rejected("205", "uuid not cancellable"));
    let app = TestApp::spawn(authority);

    let doc = create_draft(&app, "INV-0205").await;
    app.lifecycle.request_stamp(doc.id).await.unwrap();

    let err = app
        .lifecycle
        .request_cancellation(doc.id, CancellationMotive::ErrorsWithoutRelation, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CancelError::AuthorityRejection { .. }));

    let reverted = app.lifecycle.document(doc.id).await.unwrap();
    assert_eq!(reverted.status, DocumentStatus::Stamped);
    assert_eq!(reverted.cancellation_motive, None);
    assert!(reverted.cancellation_utc.is_none());

    // The rejection reason is in the audit trail.
    let log = app.lifecycle.response_log(doc.id).await.unwrap();
    let entry = log
        .iter()
        .find(|e| e.operation == OperationType::CancelRequest)
        .unwrap();
    assert!(!entry.success);
    assert_eq!(
        entry.error_message.as_deref(),
        Some("[205] uuid not cancellable")
    );
}

#[tokio::test]
async fn pending_cancellation_is_confirmed_by_a_later_poll() {
    let authority = MockAuthority::new();
    authority.push_stamp(stamp_success("AAA-111"));
    authority.push_cancel(cancel_pending());
    authority.push_query(query_found("AAA-111", AuthorityState::Cancelled));
    let app = TestApp::spawn(authority);

    let doc = create_draft(&app, "INV-0206").await;
    app.lifecycle.request_stamp(doc.id).await.unwrap();

    // The caller observes the pending state; that is the one asynchronous
    // outcome the API surfaces.
    let pending = app
        .lifecycle
        .request_cancellation(doc.id, CancellationMotive::ErrorsWithoutRelation, None)
        .await
        .unwrap();
    assert_eq!(pending.status, DocumentStatus::CancelPending);
    assert_eq!(pending.sync_status, SyncStatus::Pending);

    // The sweep settles it.
    app.reconciliation().sweep().await.unwrap();

    let cancelled = app.lifecycle.document(doc.id).await.unwrap();
    assert_eq!(cancelled.status, DocumentStatus::Cancelled);
    assert!(cancelled.cancellation_utc.is_some());

    let log = app.lifecycle.response_log(doc.id).await.unwrap();
    assert!(log
        .iter()
        .any(|e| e.operation == OperationType::CancelConfirm));
}

#[tokio::test]
async fn cancelling_a_draft_is_not_allowed() {
    let authority = MockAuthority::new();
    let app = TestApp::spawn(authority);

    let doc = create_draft(&app, "INV-0207").await;
    let err = app
        .lifecycle
        .request_cancellation(doc.id, CancellationMotive::ErrorsWithoutRelation, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CancelError::NotAllowed(_)));
}

#[tokio::test]
async fn cancelled_document_frees_the_invoice_and_can_be_archived() {
    let authority = MockAuthority::new();
    let app = TestApp::spawn(authority);

    let doc = create_draft(&app, "INV-0208").await;
    app.lifecycle.request_stamp(doc.id).await.unwrap();
    app.lifecycle
        .request_cancellation(doc.id, CancellationMotive::ErrorsWithoutRelation, None)
        .await
        .unwrap();

    // Only after CANCELLED may the invoice get a new fiscal document.
    let successor = create_draft(&app, "INV-0208").await;
    assert_eq!(successor.status, DocumentStatus::Draft);

    // Archival is bookkeeping on top of CANCELLED.
    let archived = app.lifecycle.archive_document(doc.id).await.unwrap();
    assert_eq!(archived.status, DocumentStatus::Archived);

    // And archiving anything else is refused.
    let err = app.lifecycle.archive_document(successor.id).await.unwrap_err();
    assert!(matches!(err, DocumentError::Transition(_)));
}
