use super::models::{
    PaymentStatus, PaymentTransaction, SettleResult, Settlement, Submission, UserProfile,
    VerificationRecord, VerificationStatus,
};
use super::ports::{
    CounterStore, Directory, PaymentRepository, StoreResult, SubmissionRepository, UploadUpdate,
    VerificationRepository,
};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-process counters.
///
/// The read-modify-write happens under a single write lock, which gives the
/// same serializable guarantee the Postgres backend gets from its transaction.
#[derive(Default, Clone)]
pub struct InMemoryCounterStore {
    counters: Arc<RwLock<HashMap<String, u64>>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `counter` at `last_number`, as if that many numbers were issued.
    pub async fn seed(&self, counter: &str, last_number: u64) {
        self.counters
            .write()
            .await
            .insert(counter.to_string(), last_number);
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn try_increment(&self, counter: &str) -> StoreResult<u64> {
        let mut counters = self.counters.write().await;
        let last = counters.entry(counter.to_string()).or_insert(0);
        *last += 1;
        Ok(*last)
    }

    async fn current(&self, counter: &str) -> StoreResult<u64> {
        Ok(self.counters.read().await.get(counter).copied().unwrap_or(0))
    }
}

#[derive(Default, Clone)]
pub struct InMemorySubmissionRepository {
    submissions: Arc<RwLock<HashMap<String, Submission>>>,
}

impl InMemorySubmissionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubmissionRepository for InMemorySubmissionRepository {
    async fn insert(&self, submission: &Submission) -> StoreResult<()> {
        let mut submissions = self.submissions.write().await;
        let taken = submissions.values().any(|s| {
            s.reference_number == submission.reference_number
                && s.submission_type == submission.submission_type
        });
        if taken || submissions.contains_key(&submission.id) {
            return Err(StoreError::AlreadyExists);
        }
        submissions.insert(submission.id.clone(), submission.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Submission>> {
        Ok(self.submissions.read().await.get(id).cloned())
    }

    async fn find_by_owner(&self, owner: &str) -> StoreResult<Vec<Submission>> {
        let submissions = self.submissions.read().await;
        let mut found: Vec<Submission> = submissions
            .values()
            .filter(|s| s.owner == owner)
            .cloned()
            .collect();
        found.sort_by_key(|s| s.created_at);
        Ok(found)
    }

    async fn find_by_reference(&self, reference: &str) -> StoreResult<Vec<Submission>> {
        let submissions = self.submissions.read().await;
        let mut found: Vec<Submission> = submissions
            .values()
            .filter(|s| s.reference_number == reference)
            .cloned()
            .collect();
        found.sort_by_key(|s| s.created_at);
        Ok(found)
    }

    async fn replace(&self, submission: &Submission, expected_revision: i64) -> StoreResult<()> {
        let mut submissions = self.submissions.write().await;
        let stored = submissions
            .get_mut(&submission.id)
            .ok_or_else(|| StoreError::Corrupt(format!("submission {} vanished", submission.id)))?;
        if stored.revision != expected_revision {
            return Err(StoreError::Conflict);
        }
        let mut next = submission.clone();
        next.revision = expected_revision + 1;
        *stored = next;
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryPaymentRepository {
    transactions: Arc<RwLock<HashMap<String, PaymentTransaction>>>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn latest<'a>(
        txs: impl Iterator<Item = &'a PaymentTransaction>,
    ) -> Option<PaymentTransaction> {
        txs.max_by_key(|tx| tx.created_at).cloned()
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn insert(&self, tx: &PaymentTransaction) -> StoreResult<()> {
        let mut transactions = self.transactions.write().await;
        if transactions.contains_key(&tx.txnid) {
            return Err(StoreError::AlreadyExists);
        }
        transactions.insert(tx.txnid.clone(), tx.clone());
        Ok(())
    }

    async fn get(&self, txnid: &str) -> StoreResult<Option<PaymentTransaction>> {
        Ok(self.transactions.read().await.get(txnid).cloned())
    }

    async fn latest_for_uid(&self, uid: &str) -> StoreResult<Option<PaymentTransaction>> {
        let transactions = self.transactions.read().await;
        Ok(Self::latest(
            transactions
                .values()
                .filter(|tx| tx.uid.as_deref() == Some(uid)),
        ))
    }

    async fn latest_success_for_uid(&self, uid: &str) -> StoreResult<Option<PaymentTransaction>> {
        let transactions = self.transactions.read().await;
        Ok(Self::latest(transactions.values().filter(|tx| {
            tx.uid.as_deref() == Some(uid) && tx.status == PaymentStatus::Success
        })))
    }

    async fn settle(&self, txnid: &str, settlement: &Settlement) -> StoreResult<SettleResult> {
        let mut transactions = self.transactions.write().await;
        let Some(tx) = transactions.get_mut(txnid) else {
            return Ok(SettleResult::NotFound);
        };
        if !tx.accepts(settlement) {
            return Ok(SettleResult::AlreadyFinal(tx.clone()));
        }
        tx.status = settlement.status;
        tx.gateway_reference = settlement.gateway_reference.clone();
        tx.failure_reason = settlement.failure_reason.clone();
        tx.settled_at = Some(settlement.settled_at);
        tx.updated_at = settlement.settled_at;
        Ok(SettleResult::Applied(tx.clone()))
    }

    async fn stale_initiated(&self, older_than: DateTime<Utc>) -> StoreResult<Vec<String>> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .values()
            .filter(|tx| tx.status == PaymentStatus::Initiated && tx.created_at < older_than)
            .map(|tx| tx.txnid.clone())
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryVerificationRepository {
    records: Arc<RwLock<HashMap<String, VerificationRecord>>>,
}

impl InMemoryVerificationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VerificationRepository for InMemoryVerificationRepository {
    async fn get(&self, user_id: &str) -> StoreResult<Option<VerificationRecord>> {
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn record_upload(
        &self,
        user_id: &str,
        update: UploadUpdate,
    ) -> StoreResult<Option<VerificationRecord>> {
        let mut records = self.records.write().await;
        let record = records
            .entry(user_id.to_string())
            .or_insert_with(|| VerificationRecord::empty(user_id));
        if record.verification_status == VerificationStatus::Approved {
            return Ok(None);
        }
        match update {
            UploadUpdate::IdCard(url) => record.id_card_url = Some(url),
            UploadUpdate::Receipt(url) => record.payment_receipt_image_url = Some(url),
        }
        record.verification_status = VerificationStatus::Pending;
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    async fn record_decision(
        &self,
        user_id: &str,
        status: VerificationStatus,
        admin_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<VerificationRecord>> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(user_id) else {
            return Ok(None);
        };
        record.verification_status = status;
        record.verified_by = Some(admin_id.to_string());
        record.verification_date = Some(at);
        record.updated_at = at;
        Ok(Some(record.clone()))
    }

    async fn list_submitted(&self) -> StoreResult<Vec<VerificationRecord>> {
        let records = self.records.read().await;
        let mut listed: Vec<VerificationRecord> = records
            .values()
            .filter(|r| r.verification_status != VerificationStatus::NotSubmitted)
            .cloned()
            .collect();
        listed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(listed)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryDirectory {
    profiles: Arc<RwLock<HashMap<String, UserProfile>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, profile: UserProfile) {
        self.profiles
            .write()
            .await
            .insert(profile.uid.clone(), profile);
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn profile(&self, uid: &str) -> StoreResult<Option<UserProfile>> {
        Ok(self.profiles.read().await.get(uid).cloned())
    }

    async fn is_admin(&self, uid: &str) -> StoreResult<bool> {
        Ok(self
            .profiles
            .read()
            .await
            .get(uid)
            .map(|p| p.is_admin)
            .unwrap_or(false))
    }
}
