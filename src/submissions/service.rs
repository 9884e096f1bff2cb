use super::lifecycle::{validate_authors, validate_title, AuthorInput};
use super::reference::{ReferenceAllocator, ReferenceNumber};
use crate::auth::AdminIdentity;
use crate::db::{
    PaperVersion, Submission, SubmissionRepositoryRef, SubmissionStatus, SubmissionType,
};
use crate::error::{AppError, Result};
use crate::storage::{self, BlobStoreRef};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// A file received from a client, not yet stored.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub owner: String,
    pub title: String,
    pub authors: Vec<AuthorInput>,
    pub reference_number: Option<String>,
    pub file: UploadedFile,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionHistory {
    pub submission_id: String,
    pub reference_number: String,
    pub current_version: i32,
    pub status: SubmissionStatus,
    pub versions: Vec<PaperVersion>,
}

/// Owns submissions and enforces the lifecycle rules on every write.
#[derive(Clone)]
pub struct SubmissionService {
    repo: SubmissionRepositoryRef,
    allocator: ReferenceAllocator,
    blobs: BlobStoreRef,
    reference_prefix: String,
}

impl SubmissionService {
    pub fn new(
        repo: SubmissionRepositoryRef,
        allocator: ReferenceAllocator,
        blobs: BlobStoreRef,
        reference_prefix: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            allocator,
            blobs,
            reference_prefix: reference_prefix.into(),
        }
    }

    pub async fn allocate_reference(&self) -> Result<ReferenceNumber> {
        self.allocator.allocate_next(&self.reference_prefix).await
    }

    /// Accepts a client-held reference only if this deployment's allocator
    /// has already issued it.
    async fn issued_reference(&self, given: &str) -> Result<ReferenceNumber> {
        let reference = ReferenceNumber::parse(given)?;
        if reference.prefix() != self.reference_prefix {
            return Err(AppError::validation(format!(
                "reference {} does not use prefix {}",
                reference, self.reference_prefix
            )));
        }
        let number = reference.number()?;
        if number == 0 || number > self.allocator.last_issued().await? {
            return Err(AppError::validation(format!(
                "reference {} has not been issued",
                reference
            )));
        }
        Ok(reference)
    }

    pub async fn create_abstract(&self, req: NewSubmission) -> Result<Submission> {
        let title = validate_title(&req.title)?;
        let authors = validate_authors(&req.authors)?;
        storage::check_document_upload(&req.file.filename, req.file.bytes.len())?;

        let reference = match req.reference_number.as_deref() {
            Some(given) => {
                let reference = self.issued_reference(given).await?;
                let existing = self.repo.find_by_reference(reference.as_str()).await?;
                if existing
                    .iter()
                    .any(|s| s.submission_type == SubmissionType::Abstract)
                {
                    return Err(AppError::Conflict {
                        message: format!("an abstract already uses reference {}", reference),
                    });
                }
                reference
            }
            None => self.allocate_reference().await?,
        };

        let file_url = self
            .blobs
            .put("abstracts", &req.file.filename, req.file.bytes)
            .await?;

        let submission = new_submission(
            req.owner,
            title,
            authors,
            reference,
            SubmissionType::Abstract,
            SubmissionStatus::Pending,
            file_url.clone(),
        );
        if let Err(e) = self.repo.insert(&submission).await {
            self.discard_blob(&file_url).await;
            return Err(e.into());
        }

        info!(
            submission_id = %submission.id,
            reference = %submission.reference_number,
            owner = %submission.owner,
            "Abstract submitted"
        );
        Ok(submission)
    }

    /// Creates the full paper as a new document next to the owner's accepted
    /// abstract, under the abstract's reference number.
    pub async fn create_full_paper(&self, req: NewSubmission) -> Result<Submission> {
        let title = validate_title(&req.title)?;
        let authors = validate_authors(&req.authors)?;
        storage::check_paper_upload(&req.file.filename, req.file.bytes.len())?;

        let wanted = req
            .reference_number
            .as_deref()
            .map(ReferenceNumber::parse)
            .transpose()?;
        let owned = self.repo.find_by_owner(&req.owner).await?;
        let candidates: Vec<&Submission> = owned
            .iter()
            .filter(|s| {
                s.submission_type == SubmissionType::Abstract
                    && s.status == SubmissionStatus::Accepted
                    && wanted
                        .as_ref()
                        .map_or(true, |r| s.reference_number == r.as_str())
            })
            .collect();
        let has_full_paper = |reference: &str| {
            owned.iter().any(|s| {
                s.submission_type == SubmissionType::FullPaper && s.reference_number == reference
            })
        };
        let abstract_doc = candidates
            .iter()
            .find(|s| !has_full_paper(&s.reference_number))
            .or_else(|| candidates.first())
            .copied()
            .ok_or_else(|| AppError::PrecursorMissing {
                message: match &wanted {
                    Some(r) => format!("no accepted abstract with reference {} for this author", r),
                    None => "a full paper requires an accepted abstract".to_string(),
                },
            })?;

        let reference = ReferenceNumber::parse(&abstract_doc.reference_number)?;
        let siblings = self.repo.find_by_reference(reference.as_str()).await?;
        if siblings
            .iter()
            .any(|s| s.submission_type == SubmissionType::FullPaper)
        {
            return Err(AppError::Conflict {
                message: format!("a full paper already exists for reference {}", reference),
            });
        }

        let file_url = self
            .blobs
            .put("papers", &req.file.filename, req.file.bytes)
            .await?;

        let submission = new_submission(
            req.owner,
            title,
            authors,
            reference,
            SubmissionType::FullPaper,
            SubmissionStatus::Submitted,
            file_url.clone(),
        );
        if let Err(e) = self.repo.insert(&submission).await {
            self.discard_blob(&file_url).await;
            return Err(e.into());
        }

        info!(
            submission_id = %submission.id,
            reference = %submission.reference_number,
            abstract_id = %abstract_doc.id,
            "Full paper submitted"
        );
        Ok(submission)
    }

    pub async fn start_review(&self, id: &str, admin: &AdminIdentity) -> Result<Submission> {
        let mut submission = self.load(id).await?;
        let revision = submission.revision;
        submission.begin_review(Utc::now())?;
        self.save(&mut submission, revision).await?;

        info!(submission_id = %id, admin = %admin.uid(), "Review started");
        Ok(submission)
    }

    pub async fn review(
        &self,
        id: &str,
        admin: &AdminIdentity,
        outcome: SubmissionStatus,
        comments: Option<String>,
    ) -> Result<Submission> {
        let mut submission = self.load(id).await?;
        let revision = submission.revision;
        let comments = comments
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        submission.apply_review(admin, outcome, comments, Utc::now())?;
        self.save(&mut submission, revision).await?;

        info!(
            submission_id = %id,
            admin = %admin.uid(),
            status = %outcome,
            "Submission reviewed"
        );
        Ok(submission)
    }

    /// Appends a revised PDF. Ownership, state and size are all checked
    /// before the file is stored.
    pub async fn resubmit(&self, id: &str, owner: &str, file: UploadedFile) -> Result<PaperVersion> {
        storage::check_paper_upload(&file.filename, file.bytes.len())?;

        let mut submission = self.load(id).await?;
        submission.ensure_resubmittable(owner)?;
        let revision = submission.revision;

        let file_url = self
            .blobs
            .put("papers/revisions", &file.filename, file.bytes)
            .await?;
        let version = match submission.append_version(owner, file_url.clone(), Utc::now()) {
            Ok(version) => version,
            Err(e) => {
                self.discard_blob(&file_url).await;
                return Err(e);
            }
        };
        // A lost revision race leaves the blob with no owner.
        if let Err(e) = self.save(&mut submission, revision).await {
            self.discard_blob(&file_url).await;
            return Err(e);
        }

        info!(
            submission_id = %id,
            version = version.version,
            "Revised paper resubmitted"
        );
        Ok(version)
    }

    pub async fn get(&self, id: &str) -> Result<Submission> {
        self.load(id).await
    }

    pub async fn versions(&self, id: &str) -> Result<VersionHistory> {
        let submission = self.load(id).await?;
        Ok(VersionHistory {
            submission_id: submission.id,
            reference_number: submission.reference_number,
            current_version: submission.current_version,
            status: submission.status,
            versions: submission.versions,
        })
    }

    pub async fn list_for_owner(&self, owner: &str) -> Result<Vec<Submission>> {
        Ok(self.repo.find_by_owner(owner).await?)
    }

    /// Whether `owner` holds any accepted submission.
    pub async fn has_approved_paper(&self, owner: &str) -> Result<bool> {
        let owned = self.repo.find_by_owner(owner).await?;
        Ok(owned
            .iter()
            .any(|s| s.status == SubmissionStatus::Accepted))
    }

    async fn load(&self, id: &str) -> Result<Submission> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource: "submission",
                id: id.to_string(),
            })
    }

    async fn discard_blob(&self, url: &str) {
        if let Err(e) = self.blobs.delete(url).await {
            warn!(url, error = %e, "Failed to remove orphaned upload");
        }
    }

    async fn save(&self, submission: &mut Submission, expected_revision: i64) -> Result<()> {
        self.repo.replace(submission, expected_revision).await?;
        submission.revision = expected_revision + 1;
        Ok(())
    }
}

fn new_submission(
    owner: String,
    title: String,
    authors: Vec<crate::db::Author>,
    reference: ReferenceNumber,
    submission_type: SubmissionType,
    status: SubmissionStatus,
    file_url: String,
) -> Submission {
    let now = Utc::now();
    Submission {
        id: Uuid::new_v4().to_string(),
        reference_number: reference.as_str().to_string(),
        submission_type,
        owner,
        title,
        authors,
        status,
        current_version: 1,
        versions: vec![PaperVersion {
            version: 1,
            file_url,
            submitted_at: now,
            status,
            admin_comment: None,
            reviewed_by: None,
            reviewed_at: None,
            is_current: true,
        }],
        review_comments: None,
        reviewed_by: None,
        reviewed_at: None,
        last_revision_at: None,
        created_at: now,
        updated_at: now,
        revision: 0,
    }
}
