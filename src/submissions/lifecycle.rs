//! Submission state machine and author-list rules.

use crate::auth::AdminIdentity;
use crate::db::{Author, PaperVersion, Submission, SubmissionStatus};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

pub const MAX_AUTHORS: usize = 6;
const MAX_TITLE_CHARS: usize = 300;

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"))
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+?[0-9][0-9 \-]{6,18}$").expect("valid phone regex"))
}

impl SubmissionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionStatus::Accepted | SubmissionStatus::Rejected)
    }

    /// Statuses an admin review may set.
    pub fn is_review_outcome(&self) -> bool {
        matches!(
            self,
            SubmissionStatus::Accepted
                | SubmissionStatus::Rejected
                | SubmissionStatus::AcceptedWithRevision
        )
    }

    pub fn can_transition_to(&self, next: SubmissionStatus) -> bool {
        use SubmissionStatus::*;
        match (self, next) {
            (Pending | Submitted | PendingReview, UnderReview) => true,
            (Pending | Submitted | UnderReview | PendingReview, next) => next.is_review_outcome(),
            (AcceptedWithRevision, PendingReview) => true,
            _ => false,
        }
    }
}

/// Author entry as submitted by a client, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub affiliation: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

fn required(value: &Option<String>, position: usize, field: &str) -> Result<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(AppError::validation(format!(
            "author {}: {} is required",
            position, field
        ))),
    }
}

fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Validates the author list and flags the first entry as main author.
///
/// The main author needs name, affiliation, email and phone; co-authors need
/// name and affiliation. Any email given must be well formed.
pub fn validate_authors(inputs: &[AuthorInput]) -> Result<Vec<Author>> {
    if inputs.is_empty() || inputs.len() > MAX_AUTHORS {
        return Err(AppError::validation(format!(
            "between 1 and {} authors are required, got {}",
            MAX_AUTHORS,
            inputs.len()
        )));
    }

    inputs
        .iter()
        .enumerate()
        .map(|(index, input)| {
            let position = index + 1;
            let is_main_author = index == 0;
            let name = required(&input.name, position, "name")?;
            let affiliation = required(&input.affiliation, position, "affiliation")?;
            let (email, phone) = if is_main_author {
                (
                    Some(required(&input.email, position, "email")?),
                    Some(required(&input.phone, position, "phone")?),
                )
            } else {
                (optional(&input.email), optional(&input.phone))
            };

            if let Some(email) = &email {
                if !email_pattern().is_match(email) {
                    return Err(AppError::validation(format!(
                        "author {}: invalid email '{}'",
                        position, email
                    )));
                }
            }
            if is_main_author {
                if let Some(phone) = &phone {
                    if !phone_pattern().is_match(phone) {
                        return Err(AppError::validation(format!(
                            "author {}: invalid phone number",
                            position
                        )));
                    }
                }
            }

            Ok(Author {
                name,
                affiliation,
                email,
                phone,
                is_main_author,
            })
        })
        .collect()
}

pub fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::validation("title is required"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(AppError::validation(format!(
            "title must be at most {} characters",
            MAX_TITLE_CHARS
        )));
    }
    Ok(title.to_string())
}

fn invalid_transition(from: SubmissionStatus, to: SubmissionStatus) -> AppError {
    AppError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}

impl Submission {
    pub fn current(&self) -> Option<&PaperVersion> {
        self.versions.iter().find(|v| v.is_current)
    }

    fn current_mut(&mut self) -> Option<&mut PaperVersion> {
        self.versions.iter_mut().find(|v| v.is_current)
    }

    pub fn begin_review(&mut self, now: DateTime<Utc>) -> Result<()> {
        let next = SubmissionStatus::UnderReview;
        if !self.status.can_transition_to(next) {
            return Err(invalid_transition(self.status, next));
        }
        self.status = next;
        if let Some(version) = self.current_mut() {
            version.status = next;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Records an admin decision. Only the review fields and statuses change.
    pub fn apply_review(
        &mut self,
        admin: &AdminIdentity,
        outcome: SubmissionStatus,
        comments: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !outcome.is_review_outcome() {
            return Err(AppError::validation(format!(
                "review status must be accepted, rejected or accepted_with_revision, got {}",
                outcome
            )));
        }
        if !self.status.can_transition_to(outcome) {
            return Err(invalid_transition(self.status, outcome));
        }

        self.status = outcome;
        self.review_comments = comments.clone();
        self.reviewed_by = Some(admin.uid().to_string());
        self.reviewed_at = Some(now);
        self.updated_at = now;
        if let Some(version) = self.current_mut() {
            version.status = outcome;
            version.admin_comment = comments;
            version.reviewed_by = Some(admin.uid().to_string());
            version.reviewed_at = Some(now);
        }
        Ok(())
    }

    /// Checks that `owner` may resubmit right now, without changing anything.
    pub fn ensure_resubmittable(&self, owner: &str) -> Result<()> {
        if self.owner != owner {
            return Err(AppError::Forbidden {
                message: "only the submission owner can resubmit".to_string(),
            });
        }
        if self.status != SubmissionStatus::AcceptedWithRevision {
            return Err(AppError::NotInRevisionState {
                status: self.status.to_string(),
            });
        }
        Ok(())
    }

    /// Appends a revised version and makes it the only current one.
    pub fn append_version(
        &mut self,
        owner: &str,
        file_url: String,
        now: DateTime<Utc>,
    ) -> Result<PaperVersion> {
        self.ensure_resubmittable(owner)?;

        for version in &mut self.versions {
            version.is_current = false;
        }
        let version = PaperVersion {
            version: self.current_version + 1,
            file_url,
            submitted_at: now,
            status: SubmissionStatus::PendingReview,
            admin_comment: None,
            reviewed_by: None,
            reviewed_at: None,
            is_current: true,
        };
        self.versions.push(version.clone());
        self.current_version = version.version;
        self.status = SubmissionStatus::PendingReview;
        self.last_revision_at = Some(now);
        self.updated_at = now;
        Ok(version)
    }
}
