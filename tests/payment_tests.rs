mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{new_submission, pdf, signed_callback, Harness, WAIVED_AFFILIATION};
use conference_portal::db::{PaymentRole, PaymentStatus, PaymentTransaction, SubmissionStatus};
use conference_portal::error::AppError;
use conference_portal::hash;
use conference_portal::payment::{
    AttendeeRegistration, CallbackKind, CallbackResult, InitiationOutcome, IntegrityFailure,
    PaymentSession,
};
use rust_decimal_macros::dec;
use std::sync::atomic::Ordering;
use std::time::Duration;

async fn initiate(h: &Harness, uid: &str) -> PaymentSession {
    match h
        .state
        .payments
        .initiate(uid, Some("https://frontend.test/"))
        .await
        .unwrap()
    {
        InitiationOutcome::Required(session) => session,
        other => panic!("expected a payment session, got {:?}", other),
    }
}

async fn stored(h: &Harness, txnid: &str) -> PaymentTransaction {
    h.stores.payments.get(txnid).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_payment_success_is_applied_once() {
    let h = Harness::new().await;
    h.add_user("U1", PaymentRole::Attendee, "Elsewhere College").await;

    let session = initiate(&h, "U1").await;
    assert_eq!(session.amount, dec!(1000.00));
    assert_eq!(
        session.payment_url,
        format!("https://gateway.test/pay/access-{}", session.txnid)
    );

    let tx = stored(&h, &session.txnid).await;
    assert_eq!(tx.status, PaymentStatus::Initiated);
    assert_eq!(tx.uid.as_deref(), Some("U1"));
    assert_eq!(tx.frontend_url, "https://frontend.test");

    // The request sent to the gateway carries a correct forward hash.
    let request = h.gateway.requests.lock().unwrap()[0].clone();
    assert_eq!(request.amount, "1000.00");
    assert_eq!(
        request.hash,
        hash::forward_hash(
            common::GATEWAY_KEY,
            &request.txnid,
            &request.amount,
            &request.productinfo,
            &request.firstname,
            &request.email,
            common::GATEWAY_SALT,
        )
    );

    let callback = signed_callback(&tx, "success");
    let first = h
        .state
        .payments
        .handle_callback(&callback, CallbackKind::Success)
        .await
        .unwrap();
    let settled = match first {
        CallbackResult::Settled(tx) => tx,
        other => panic!("expected settlement, got {:?}", other),
    };
    assert_eq!(settled.status, PaymentStatus::Success);
    assert_eq!(settled.gateway_reference.as_deref(), Some("E900001"));

    let replay = h
        .state
        .payments
        .handle_callback(&callback, CallbackKind::Success)
        .await
        .unwrap();
    assert!(matches!(replay, CallbackResult::Duplicate(_)));
    assert_eq!(stored(&h, &session.txnid).await, settled);

    // A late failure for the same transaction changes nothing either.
    let late_failure = signed_callback(&tx, "failure");
    let result = h
        .state
        .payments
        .handle_callback(&late_failure, CallbackKind::Failure)
        .await
        .unwrap();
    assert!(matches!(result, CallbackResult::Duplicate(_)));
    assert_eq!(stored(&h, &session.txnid).await.status, PaymentStatus::Success);

    let view = h.state.payments.status_for_uid("U1").await.unwrap();
    assert_eq!(view.payment_status, "success");
    assert_eq!(view.payment_txn_id.as_deref(), Some(session.txnid.as_str()));
    assert!(!view.has_approved_paper);

    // Paid users are not asked to pay again.
    let again = h
        .state
        .payments
        .initiate("U1", None)
        .await
        .unwrap();
    assert_eq!(
        again,
        InitiationOutcome::NotRequired {
            reason: "already_paid".to_string()
        }
    );
}

#[tokio::test]
async fn test_tampered_callbacks_never_change_state() {
    let h = Harness::new().await;
    h.add_user("U1", PaymentRole::Attendee, "").await;
    let session = initiate(&h, "U1").await;
    let tx = stored(&h, &session.txnid).await;

    let mut forged = signed_callback(&tx, "success");
    forged.hash = forged.hash.to_uppercase();
    for kind in [CallbackKind::Success, CallbackKind::Failure] {
        let result = h
            .state
            .payments
            .handle_callback(&forged, kind)
            .await
            .unwrap();
        assert_eq!(result, CallbackResult::Rejected(IntegrityFailure::HashMismatch));
    }

    // Correct hash over a different amount than the one signed.
    let mut underpaid = signed_callback(&tx, "success");
    underpaid.amount = "1.00".to_string();
    let result = h
        .state
        .payments
        .handle_callback(&underpaid, CallbackKind::Success)
        .await
        .unwrap();
    assert_eq!(result, CallbackResult::Rejected(IntegrityFailure::HashMismatch));

    // Signed correctly, but for an amount the transaction was never opened with.
    let mut other = tx.clone();
    other.amount = dec!(1.00);
    let result = h
        .state
        .payments
        .handle_callback(&signed_callback(&other, "success"), CallbackKind::Success)
        .await
        .unwrap();
    assert_eq!(result, CallbackResult::Rejected(IntegrityFailure::AmountMismatch));

    let mut unknown = tx.clone();
    unknown.txnid = "TXN0unknown".to_string();
    let result = h
        .state
        .payments
        .handle_callback(&signed_callback(&unknown, "success"), CallbackKind::Success)
        .await
        .unwrap();
    assert_eq!(
        result,
        CallbackResult::Rejected(IntegrityFailure::UnknownTransaction)
    );

    assert_eq!(stored(&h, &session.txnid).await.status, PaymentStatus::Initiated);
}

#[tokio::test]
async fn test_failure_callback_and_non_success_status() {
    let h = Harness::new().await;
    h.add_user("U1", PaymentRole::Attendee, "").await;

    let session = initiate(&h, "U1").await;
    let tx = stored(&h, &session.txnid).await;
    let mut callback = signed_callback(&tx, "failure");
    callback.error_message = Some("Bank declined".to_string());
    let result = h
        .state
        .payments
        .handle_callback(&callback, CallbackKind::Failure)
        .await
        .unwrap();
    match result {
        CallbackResult::Settled(tx) => {
            assert_eq!(tx.status, PaymentStatus::Failure);
            assert_eq!(tx.failure_reason.as_deref(), Some("Bank declined"));
        }
        other => panic!("expected settlement, got {:?}", other),
    }

    // The success URL with a non-success status still records a failure.
    let session = initiate(&h, "U1").await;
    let tx = stored(&h, &session.txnid).await;
    let result = h
        .state
        .payments
        .handle_callback(&signed_callback(&tx, "userCancelled"), CallbackKind::Success)
        .await
        .unwrap();
    match result {
        CallbackResult::Settled(tx) => assert_eq!(tx.status, PaymentStatus::Failure),
        other => panic!("expected settlement, got {:?}", other),
    }
}

#[tokio::test]
async fn test_fee_waiver_skips_gateway() {
    let h = Harness::new().await;
    h.add_user("U1", PaymentRole::Attendee, &format!("Dept. of Physics, {}", WAIVED_AFFILIATION))
        .await;

    let outcome = h.state.payments.initiate("U1", None).await.unwrap();
    match outcome {
        InitiationOutcome::NotRequired { reason } => assert!(reason.contains(WAIVED_AFFILIATION)),
        other => panic!("expected waiver, got {:?}", other),
    }
    assert_eq!(h.gateway.calls(), 0);
    assert!(h.stores.payments.latest_for_uid("U1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_author_needs_accepted_paper() {
    let h = Harness::new().await;
    h.add_user("U1", PaymentRole::Author, "").await;

    let result = h.state.payments.initiate("U1", None).await;
    assert!(matches!(result, Err(AppError::PrecursorMissing { .. })));

    let abstract_doc = h
        .state
        .submissions
        .create_abstract(new_submission("U1", None, pdf("abstract.pdf", 100)))
        .await
        .unwrap();
    h.state
        .submissions
        .review(&abstract_doc.id, &h.admin().await, SubmissionStatus::Accepted, None)
        .await
        .unwrap();

    let session = initiate(&h, "U1").await;
    assert_eq!(session.role, PaymentRole::Author);
    assert_eq!(session.amount, dec!(2500.00));
    assert!(h.state.payments.status_for_uid("U1").await.unwrap().has_approved_paper);
}

#[tokio::test]
async fn test_gateway_failure_leaves_no_pending_transaction() {
    let h = Harness::new().await;
    h.add_user("U1", PaymentRole::Attendee, "").await;
    h.gateway.fail.store(true, Ordering::SeqCst);

    let result = h.state.payments.initiate("U1", None).await;
    assert!(matches!(result, Err(AppError::UpstreamGateway { .. })));

    let tx = h
        .stores
        .payments
        .latest_for_uid("U1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tx.status, PaymentStatus::Failure);
    assert!(tx
        .failure_reason
        .unwrap()
        .starts_with("initiation_failed"));
}

#[tokio::test]
async fn test_attendee_payment_keyed_by_txnid() {
    let h = Harness::new().await;
    let session = h
        .state
        .payments
        .initiate_attendee(AttendeeRegistration {
            name: "Grace Hopper".to_string(),
            email: "grace@example.org".to_string(),
            phone: "9876543210".to_string(),
            organization: "Navy".to_string(),
            frontend_url: None,
        })
        .await
        .unwrap();

    let tx = h.state.payments.status_for_txn(&session.txnid).await.unwrap();
    assert!(tx.uid.is_none());
    assert_eq!(tx.role, PaymentRole::Attendee);
    assert_eq!(tx.frontend_url, "http://frontend.test");

    let bad = h
        .state
        .payments
        .initiate_attendee(AttendeeRegistration {
            name: "Grace Hopper".to_string(),
            email: "not-an-email".to_string(),
            phone: "9876543210".to_string(),
            organization: String::new(),
            frontend_url: None,
        })
        .await;
    assert!(matches!(bad, Err(AppError::Validation { .. })));
}

#[tokio::test]
async fn test_expire_stale_closes_abandoned_checkouts() {
    let h = Harness::new().await;
    h.add_user("U1", PaymentRole::Attendee, "").await;
    let fresh = initiate(&h, "U1").await;

    let mut abandoned = stored(&h, &fresh.txnid).await;
    abandoned.txnid = hash::new_txn_id();
    abandoned.created_at = Utc::now() - ChronoDuration::hours(30);
    abandoned.updated_at = abandoned.created_at;
    h.stores.payments.insert(&abandoned).await.unwrap();

    let expired = h
        .state
        .payments
        .expire_stale(Duration::from_secs(24 * 3600))
        .await
        .unwrap();
    assert_eq!(expired, 1);

    let closed = stored(&h, &abandoned.txnid).await;
    assert_eq!(closed.status, PaymentStatus::Failure);
    assert_eq!(closed.failure_reason.as_deref(), Some("expired"));
    assert_eq!(stored(&h, &fresh.txnid).await.status, PaymentStatus::Initiated);

    // A verified payment arriving after expiry still settles, exactly once.
    let late = h
        .state
        .payments
        .handle_callback(&signed_callback(&abandoned, "success"), CallbackKind::Success)
        .await
        .unwrap();
    match late {
        CallbackResult::Settled(tx) => {
            assert_eq!(tx.status, PaymentStatus::Success);
            assert_eq!(tx.failure_reason, None);
        }
        other => panic!("expected late success to settle, got {:?}", other),
    }
    let replay = h
        .state
        .payments
        .handle_callback(&signed_callback(&abandoned, "success"), CallbackKind::Success)
        .await
        .unwrap();
    assert!(matches!(replay, CallbackResult::Duplicate(_)));
    assert_eq!(stored(&h, &abandoned.txnid).await.status, PaymentStatus::Success);
}

#[tokio::test]
async fn test_late_failure_keeps_expired_checkout_closed() {
    let h = Harness::new().await;
    h.add_user("U1", PaymentRole::Attendee, "").await;
    let session = initiate(&h, "U1").await;

    let mut abandoned = stored(&h, &session.txnid).await;
    abandoned.txnid = hash::new_txn_id();
    abandoned.created_at = Utc::now() - ChronoDuration::hours(30);
    abandoned.updated_at = abandoned.created_at;
    h.stores.payments.insert(&abandoned).await.unwrap();
    h.state
        .payments
        .expire_stale(Duration::from_secs(24 * 3600))
        .await
        .unwrap();

    let late = h
        .state
        .payments
        .handle_callback(&signed_callback(&abandoned, "failure"), CallbackKind::Failure)
        .await
        .unwrap();
    assert!(matches!(late, CallbackResult::Duplicate(_)));
    let closed = stored(&h, &abandoned.txnid).await;
    assert_eq!(closed.status, PaymentStatus::Failure);
    assert_eq!(closed.failure_reason.as_deref(), Some("expired"));
}
