use super::models::{
    PaymentTransaction, SettleResult, Settlement, Submission, UserProfile, VerificationRecord,
    VerificationStatus,
};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Shared monotonically increasing counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Reads the counter, adds one and persists the result as a single
    /// serializable step. Returns `StoreError::Conflict` when a concurrent
    /// writer interfered and nothing was written.
    async fn try_increment(&self, counter: &str) -> StoreResult<u64>;

    async fn current(&self, counter: &str) -> StoreResult<u64>;
}

#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    /// Fails with `AlreadyExists` if a submission of the same type already
    /// holds this reference number.
    async fn insert(&self, submission: &Submission) -> StoreResult<()>;

    async fn get(&self, id: &str) -> StoreResult<Option<Submission>>;

    async fn find_by_owner(&self, owner: &str) -> StoreResult<Vec<Submission>>;

    async fn find_by_reference(&self, reference: &str) -> StoreResult<Vec<Submission>>;

    /// Writes the whole submission if the stored revision still equals
    /// `expected_revision`, otherwise `Conflict`.
    async fn replace(&self, submission: &Submission, expected_revision: i64) -> StoreResult<()>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn insert(&self, tx: &PaymentTransaction) -> StoreResult<()>;

    async fn get(&self, txnid: &str) -> StoreResult<Option<PaymentTransaction>>;

    async fn latest_for_uid(&self, uid: &str) -> StoreResult<Option<PaymentTransaction>>;

    async fn latest_success_for_uid(&self, uid: &str) -> StoreResult<Option<PaymentTransaction>>;

    /// Moves `txnid` out of `initiated` only if it is still `initiated`, or
    /// to `success` from a sweep-expired failure. See
    /// [`PaymentTransaction::accepts`].
    async fn settle(&self, txnid: &str, settlement: &Settlement) -> StoreResult<SettleResult>;

    async fn stale_initiated(&self, older_than: DateTime<Utc>) -> StoreResult<Vec<String>>;
}

#[async_trait]
pub trait VerificationRepository: Send + Sync {
    async fn get(&self, user_id: &str) -> StoreResult<Option<VerificationRecord>>;

    /// Applies `update` to the record (creating it if missing) and marks it
    /// `pending`, unless the stored record is already `approved`, in which
    /// case nothing is written and `None` is returned.
    async fn record_upload(
        &self,
        user_id: &str,
        update: UploadUpdate,
    ) -> StoreResult<Option<VerificationRecord>>;

    /// Returns `None` when no record exists for `user_id`.
    async fn record_decision(
        &self,
        user_id: &str,
        status: VerificationStatus,
        admin_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<VerificationRecord>>;

    async fn list_submitted(&self) -> StoreResult<Vec<VerificationRecord>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadUpdate {
    IdCard(String),
    Receipt(String),
}

/// Read access to identities issued by the authentication provider.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn profile(&self, uid: &str) -> StoreResult<Option<UserProfile>>;

    async fn is_admin(&self, uid: &str) -> StoreResult<bool>;
}

pub type CounterStoreRef = Arc<dyn CounterStore>;
pub type SubmissionRepositoryRef = Arc<dyn SubmissionRepository>;
pub type PaymentRepositoryRef = Arc<dyn PaymentRepository>;
pub type VerificationRepositoryRef = Arc<dyn VerificationRepository>;
pub type DirectoryRef = Arc<dyn Directory>;
