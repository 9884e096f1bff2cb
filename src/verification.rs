//! Identity-document and payment-receipt verification.

use crate::auth::AdminIdentity;
use crate::db::{
    DocumentKind, UploadUpdate, VerificationRecord, VerificationRepositoryRef, VerificationStatus,
};
use crate::error::{AppError, Result};
use crate::storage::{self, BlobStoreRef};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub url: String,
    pub kind: DocumentKind,
    pub verification_status: VerificationStatus,
}

#[derive(Clone)]
pub struct VerificationService {
    repo: VerificationRepositoryRef,
    blobs: BlobStoreRef,
}

impl VerificationService {
    pub fn new(repo: VerificationRepositoryRef, blobs: BlobStoreRef) -> Self {
        Self { repo, blobs }
    }

    /// Stores an ID card or receipt image and puts the record back into
    /// `pending`. Nothing is written once the user has been approved.
    pub async fn upload_document(
        &self,
        user_id: &str,
        kind: DocumentKind,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<UploadReceipt> {
        if user_id.trim().is_empty() {
            return Err(AppError::validation("userId is required"));
        }
        storage::check_image_upload(filename, bytes.len())?;

        if let Some(existing) = self.repo.get(user_id).await? {
            if existing.verification_status == VerificationStatus::Approved {
                return Err(already_approved(user_id));
            }
        }

        let url = self.blobs.put(kind.folder(), filename, bytes).await?;
        let update = match kind {
            DocumentKind::IdCard => UploadUpdate::IdCard(url.clone()),
            DocumentKind::Receipt => UploadUpdate::Receipt(url.clone()),
        };

        // Approval may have landed between the read above and this write.
        let record = self
            .repo
            .record_upload(user_id, update)
            .await?
            .ok_or_else(|| already_approved(user_id))?;

        info!(user_id, kind = ?kind, "Verification document uploaded");
        Ok(UploadReceipt {
            url,
            kind,
            verification_status: record.verification_status,
        })
    }

    pub async fn admin_decision(
        &self,
        user_id: &str,
        admin: &AdminIdentity,
        action: VerificationStatus,
    ) -> Result<VerificationRecord> {
        if !matches!(
            action,
            VerificationStatus::Approved | VerificationStatus::Rejected
        ) {
            return Err(AppError::validation(format!(
                "action must be approved or rejected, got {}",
                action
            )));
        }

        let record = self
            .repo
            .record_decision(user_id, action, admin.uid(), Utc::now())
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource: "verification record",
                id: user_id.to_string(),
            })?;

        info!(user_id, admin = %admin.uid(), status = %action, "Verification decided");
        Ok(record)
    }

    /// The stored record, or an empty `not_submitted` one.
    pub async fn status(&self, user_id: &str) -> Result<VerificationRecord> {
        Ok(self
            .repo
            .get(user_id)
            .await?
            .unwrap_or_else(|| VerificationRecord::empty(user_id)))
    }

    /// Every record with at least one upload, most recently updated first.
    pub async fn list_for_admin(&self, admin: &AdminIdentity) -> Result<Vec<VerificationRecord>> {
        let records = self.repo.list_submitted().await?;
        info!(admin = %admin.uid(), count = records.len(), "Verification list requested");
        Ok(records)
    }
}

fn already_approved(user_id: &str) -> AppError {
    warn!(user_id, "Upload refused, verification already approved");
    AppError::Conflict {
        message: "verification already approved, documents can no longer be replaced"
            .to_string(),
    }
}
