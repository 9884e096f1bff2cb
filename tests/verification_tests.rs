mod common;

use common::Harness;
use conference_portal::db::{DocumentKind, VerificationStatus};
use conference_portal::error::AppError;
use conference_portal::storage::MAX_IMAGE_BYTES;

fn image(len: usize) -> Vec<u8> {
    vec![0xFF; len]
}

#[tokio::test]
async fn test_upload_then_approve_locks_documents() {
    let h = Harness::new().await;
    let verification = &h.state.verification;
    let admin = h.admin().await;

    assert_eq!(
        verification.status("U1").await.unwrap().verification_status,
        VerificationStatus::NotSubmitted
    );

    let uploaded = verification
        .upload_document("U1", DocumentKind::IdCard, image(2048), "id.jpg")
        .await
        .unwrap();
    assert_eq!(uploaded.verification_status, VerificationStatus::Pending);
    assert!(uploaded.url.contains("/files/id-cards/"));

    verification
        .upload_document("U1", DocumentKind::Receipt, image(2048), "receipt.png")
        .await
        .unwrap();
    let record = verification.status("U1").await.unwrap();
    assert!(record.id_card_url.is_some());
    assert!(record.payment_receipt_image_url.is_some());

    let decided = verification
        .admin_decision("U1", &admin, VerificationStatus::Approved)
        .await
        .unwrap();
    assert_eq!(decided.verification_status, VerificationStatus::Approved);
    assert_eq!(decided.verified_by.as_deref(), Some("ADMIN"));
    assert!(decided.verification_date.is_some());

    let writes = h.blobs.writes();
    let again = verification
        .upload_document("U1", DocumentKind::IdCard, image(2048), "id2.jpg")
        .await;
    assert!(matches!(again, Err(AppError::Conflict { .. })));
    assert_eq!(h.blobs.writes(), writes);
    assert_eq!(
        verification.status("U1").await.unwrap().id_card_url,
        record.id_card_url
    );
}

#[tokio::test]
async fn test_rejected_user_can_upload_again() {
    let h = Harness::new().await;
    let verification = &h.state.verification;
    let admin = h.admin().await;

    verification
        .upload_document("U1", DocumentKind::IdCard, image(10), "id.jpg")
        .await
        .unwrap();
    verification
        .admin_decision("U1", &admin, VerificationStatus::Rejected)
        .await
        .unwrap();

    let uploaded = verification
        .upload_document("U1", DocumentKind::IdCard, image(10), "id-clear.jpg")
        .await
        .unwrap();
    assert_eq!(uploaded.verification_status, VerificationStatus::Pending);

    let listed = verification.list_for_admin(&admin).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].user_id, "U1");
}

#[tokio::test]
async fn test_oversized_or_wrong_type_rejected_before_storage() {
    let h = Harness::new().await;
    let verification = &h.state.verification;

    let result = verification
        .upload_document("U1", DocumentKind::IdCard, image(MAX_IMAGE_BYTES), "id.jpg")
        .await;
    assert!(matches!(result, Err(AppError::PayloadTooLarge { .. })));

    let result = verification
        .upload_document("U1", DocumentKind::Receipt, image(10), "receipt.pdf")
        .await;
    assert!(matches!(result, Err(AppError::Validation { .. })));

    assert_eq!(h.blobs.writes(), 0);
    assert_eq!(
        verification.status("U1").await.unwrap().verification_status,
        VerificationStatus::NotSubmitted
    );
}

#[tokio::test]
async fn test_admin_decision_rules() {
    let h = Harness::new().await;
    let verification = &h.state.verification;
    let admin = h.admin().await;

    let missing = verification
        .admin_decision("NOBODY", &admin, VerificationStatus::Approved)
        .await;
    assert!(matches!(missing, Err(AppError::NotFound { .. })));

    verification
        .upload_document("U1", DocumentKind::IdCard, image(10), "id.jpg")
        .await
        .unwrap();
    let invalid = verification
        .admin_decision("U1", &admin, VerificationStatus::Pending)
        .await;
    assert!(matches!(invalid, Err(AppError::Validation { .. })));

    // Only the authorizer hands out admin identities.
    h.add_user("U2", conference_portal::db::PaymentRole::Attendee, "").await;
    assert!(matches!(
        h.state.authorizer.require_admin("U2").await,
        Err(AppError::Unauthorized { .. })
    ));
}
