use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionType {
    #[serde(rename = "abstract")]
    Abstract,
    #[serde(rename = "fullpaper")]
    FullPaper,
}

string_enum!(SubmissionType {
    Abstract => "abstract",
    FullPaper => "fullpaper",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Submitted,
    UnderReview,
    Accepted,
    Rejected,
    AcceptedWithRevision,
    PendingReview,
}

string_enum!(SubmissionStatus {
    Pending => "pending",
    Submitted => "submitted",
    UnderReview => "under_review",
    Accepted => "accepted",
    Rejected => "rejected",
    AcceptedWithRevision => "accepted_with_revision",
    PendingReview => "pending_review",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub name: String,
    pub affiliation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_main_author: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperVersion {
    pub version: i32,
    pub file_url: String,
    pub submitted_at: DateTime<Utc>,
    pub status: SubmissionStatus,
    pub admin_comment: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub is_current: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub reference_number: String,
    pub submission_type: SubmissionType,
    pub owner: String,
    pub title: String,
    pub authors: Vec<Author>,
    pub status: SubmissionStatus,
    pub current_version: i32,
    pub versions: Vec<PaperVersion>,
    pub review_comments: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub last_revision_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency token, bumped on every successful write.
    #[serde(skip)]
    pub revision: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Initiated,
    Success,
    Failure,
}

string_enum!(PaymentStatus {
    Initiated => "initiated",
    Success => "success",
    Failure => "failure",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRole {
    Author,
    Attendee,
}

string_enum!(PaymentRole {
    Author => "author",
    Attendee => "attendee",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayerInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub affiliation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTransaction {
    pub txnid: String,
    /// Absent for attendee registrations, which are keyed by `txnid` alone.
    pub uid: Option<String>,
    pub payer: PayerInfo,
    pub amount: Decimal,
    pub role: PaymentRole,
    pub product_info: String,
    pub status: PaymentStatus,
    pub frontend_url: String,
    pub gateway_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

/// Failure reason written by the reconciliation sweep rather than a callback.
pub const EXPIRED_REASON: &str = "expired";

impl PaymentTransaction {
    /// Whether `settlement` may overwrite the current state: `initiated`
    /// accepts anything, and a sweep-expired checkout still accepts a
    /// verified success.
    pub fn accepts(&self, settlement: &Settlement) -> bool {
        match self.status {
            PaymentStatus::Initiated => true,
            PaymentStatus::Failure => {
                settlement.status == PaymentStatus::Success
                    && self.failure_reason.as_deref() == Some(EXPIRED_REASON)
            }
            PaymentStatus::Success => false,
        }
    }
}

/// Terminal data recorded when a transaction leaves `initiated`.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub status: PaymentStatus,
    pub gateway_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub settled_at: DateTime<Utc>,
}

/// Result of a conditional `initiated -> final` update.
#[derive(Debug, Clone, PartialEq)]
pub enum SettleResult {
    Applied(PaymentTransaction),
    AlreadyFinal(PaymentTransaction),
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    NotSubmitted,
    Pending,
    Approved,
    Rejected,
}

string_enum!(VerificationStatus {
    NotSubmitted => "not_submitted",
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    IdCard,
    Receipt,
}

impl DocumentKind {
    pub fn folder(&self) -> &'static str {
        match self {
            DocumentKind::IdCard => "id-cards",
            DocumentKind::Receipt => "payment-receipts",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    pub user_id: String,
    pub id_card_url: Option<String>,
    pub payment_receipt_image_url: Option<String>,
    pub verification_status: VerificationStatus,
    pub verified_by: Option<String>,
    pub verification_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl VerificationRecord {
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            id_card_url: None,
            payment_receipt_image_url: None,
            verification_status: VerificationStatus::NotSubmitted,
            verified_by: None,
            verification_date: None,
            updated_at: Utc::now(),
        }
    }
}

/// Account data mirrored from the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub affiliation: String,
    pub role: PaymentRole,
    pub is_admin: bool,
}

impl UserProfile {
    pub fn payer(&self) -> PayerInfo {
        PayerInfo {
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            affiliation: self.affiliation.clone(),
        }
    }
}
