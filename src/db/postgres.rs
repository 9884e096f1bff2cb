//! Postgres implementations of the persistence ports.
//!
//! Queries are built at runtime, so the crate compiles without a live
//! database. Row structs decode the raw columns and are converted into the
//! typed models; an unknown enum string is reported as `StoreError::Corrupt`
//! rather than defaulted.

use super::models::{
    Author, PayerInfo, PaperVersion, PaymentTransaction, SettleResult, Settlement, Submission,
    EXPIRED_REASON,
    UserProfile, VerificationRecord, VerificationStatus,
};
use super::ports::{
    CounterStore, Directory, PaymentRepository, StoreResult, SubmissionRepository, UploadUpdate,
    VerificationRepository,
};
use super::DbPool;
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::FromRow;
use std::str::FromStr;

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Maps driver errors onto the port taxonomy. Serialization failures and
/// deadlocks are conflicts the caller may retry.
fn classify(err: sqlx::Error) -> StoreError {
    let code = match &err {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    };
    match code.as_deref() {
        Some("40001") | Some("40P01") => StoreError::Conflict,
        Some("23505") => StoreError::AlreadyExists,
        _ if matches!(
            err,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
        ) =>
        {
            StoreError::Unavailable(err.to_string())
        }
        _ => StoreError::Database(err),
    }
}

fn parse_enum<T: FromStr<Err = String>>(value: &str) -> StoreResult<T> {
    value.parse().map_err(StoreError::Corrupt)
}

#[async_trait]
impl CounterStore for PgStore {
    async fn try_increment(&self, counter: &str) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await.map_err(classify)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        let last: Option<i64> =
            sqlx::query_scalar("SELECT last_number FROM counters WHERE name = $1")
                .bind(counter)
                .fetch_optional(&mut *tx)
                .await
                .map_err(classify)?;
        let next = last.unwrap_or(0) + 1;

        sqlx::query(
            r#"
            INSERT INTO counters (name, last_number)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET last_number = EXCLUDED.last_number
            "#,
        )
        .bind(counter)
        .bind(next)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        tx.commit().await.map_err(classify)?;
        Ok(next as u64)
    }

    async fn current(&self, counter: &str) -> StoreResult<u64> {
        let last: Option<i64> =
            sqlx::query_scalar("SELECT last_number FROM counters WHERE name = $1")
                .bind(counter)
                .fetch_optional(self.pool.as_ref())
                .await
                .map_err(classify)?;
        Ok(last.unwrap_or(0) as u64)
    }
}

#[derive(Debug, FromRow)]
struct SubmissionRow {
    id: String,
    reference_number: String,
    submission_type: String,
    owner: String,
    title: String,
    authors: Json<Vec<Author>>,
    status: String,
    current_version: i32,
    versions: Json<Vec<PaperVersion>>,
    review_comments: Option<String>,
    reviewed_by: Option<String>,
    reviewed_at: Option<DateTime<Utc>>,
    last_revision_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    revision: i64,
}

impl TryFrom<SubmissionRow> for Submission {
    type Error = StoreError;

    fn try_from(row: SubmissionRow) -> StoreResult<Self> {
        Ok(Submission {
            id: row.id,
            reference_number: row.reference_number,
            submission_type: parse_enum(&row.submission_type)?,
            owner: row.owner,
            title: row.title,
            authors: row.authors.0,
            status: parse_enum(&row.status)?,
            current_version: row.current_version,
            versions: row.versions.0,
            review_comments: row.review_comments,
            reviewed_by: row.reviewed_by,
            reviewed_at: row.reviewed_at,
            last_revision_at: row.last_revision_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            revision: row.revision,
        })
    }
}

fn submissions_from(rows: Vec<SubmissionRow>) -> StoreResult<Vec<Submission>> {
    rows.into_iter().map(Submission::try_from).collect()
}

#[async_trait]
impl SubmissionRepository for PgStore {
    async fn insert(&self, submission: &Submission) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO submissions (
                id, reference_number, submission_type, owner, title, authors, status,
                current_version, versions, review_comments, reviewed_by, reviewed_at,
                last_revision_at, created_at, updated_at, revision
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, 0)
            "#,
        )
        .bind(&submission.id)
        .bind(&submission.reference_number)
        .bind(submission.submission_type.as_str())
        .bind(&submission.owner)
        .bind(&submission.title)
        .bind(Json(&submission.authors))
        .bind(submission.status.as_str())
        .bind(submission.current_version)
        .bind(Json(&submission.versions))
        .bind(&submission.review_comments)
        .bind(&submission.reviewed_by)
        .bind(submission.reviewed_at)
        .bind(submission.last_revision_at)
        .bind(submission.created_at)
        .bind(submission.updated_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Submission>> {
        sqlx::query_as::<_, SubmissionRow>("SELECT * FROM submissions WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await
            .map_err(classify)?
            .map(Submission::try_from)
            .transpose()
    }

    async fn find_by_owner(&self, owner: &str) -> StoreResult<Vec<Submission>> {
        let rows = sqlx::query_as::<_, SubmissionRow>(
            "SELECT * FROM submissions WHERE owner = $1 ORDER BY created_at",
        )
        .bind(owner)
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(classify)?;
        submissions_from(rows)
    }

    async fn find_by_reference(&self, reference: &str) -> StoreResult<Vec<Submission>> {
        let rows = sqlx::query_as::<_, SubmissionRow>(
            "SELECT * FROM submissions WHERE reference_number = $1 ORDER BY created_at",
        )
        .bind(reference)
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(classify)?;
        submissions_from(rows)
    }

    async fn replace(&self, submission: &Submission, expected_revision: i64) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE submissions
            SET title = $2, authors = $3, status = $4, current_version = $5, versions = $6,
                review_comments = $7, reviewed_by = $8, reviewed_at = $9,
                last_revision_at = $10, updated_at = $11, revision = revision + 1
            WHERE id = $1 AND revision = $12
            "#,
        )
        .bind(&submission.id)
        .bind(&submission.title)
        .bind(Json(&submission.authors))
        .bind(submission.status.as_str())
        .bind(submission.current_version)
        .bind(Json(&submission.versions))
        .bind(&submission.review_comments)
        .bind(&submission.reviewed_by)
        .bind(submission.reviewed_at)
        .bind(submission.last_revision_at)
        .bind(submission.updated_at)
        .bind(expected_revision)
        .execute(self.pool.as_ref())
        .await
        .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict);
        }
        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct PaymentRow {
    txnid: String,
    uid: Option<String>,
    payer_name: String,
    payer_email: String,
    payer_phone: String,
    payer_affiliation: String,
    amount: Decimal,
    role: String,
    product_info: String,
    status: String,
    frontend_url: String,
    gateway_reference: Option<String>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    settled_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentRow> for PaymentTransaction {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> StoreResult<Self> {
        Ok(PaymentTransaction {
            txnid: row.txnid,
            uid: row.uid,
            payer: PayerInfo {
                name: row.payer_name,
                email: row.payer_email,
                phone: row.payer_phone,
                affiliation: row.payer_affiliation,
            },
            amount: row.amount,
            role: parse_enum(&row.role)?,
            product_info: row.product_info,
            status: parse_enum(&row.status)?,
            frontend_url: row.frontend_url,
            gateway_reference: row.gateway_reference,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
            settled_at: row.settled_at,
        })
    }
}

impl PgStore {
    async fn fetch_payment(&self, sql: &str, key: &str) -> StoreResult<Option<PaymentTransaction>> {
        sqlx::query_as::<_, PaymentRow>(sql)
            .bind(key)
            .fetch_optional(self.pool.as_ref())
            .await
            .map_err(classify)?
            .map(PaymentTransaction::try_from)
            .transpose()
    }
}

#[async_trait]
impl PaymentRepository for PgStore {
    async fn insert(&self, tx: &PaymentTransaction) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_transactions (
                txnid, uid, payer_name, payer_email, payer_phone, payer_affiliation, amount,
                role, product_info, status, frontend_url, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&tx.txnid)
        .bind(&tx.uid)
        .bind(&tx.payer.name)
        .bind(&tx.payer.email)
        .bind(&tx.payer.phone)
        .bind(&tx.payer.affiliation)
        .bind(tx.amount)
        .bind(tx.role.as_str())
        .bind(&tx.product_info)
        .bind(tx.status.as_str())
        .bind(&tx.frontend_url)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn get(&self, txnid: &str) -> StoreResult<Option<PaymentTransaction>> {
        self.fetch_payment("SELECT * FROM payment_transactions WHERE txnid = $1", txnid)
            .await
    }

    async fn latest_for_uid(&self, uid: &str) -> StoreResult<Option<PaymentTransaction>> {
        self.fetch_payment(
            "SELECT * FROM payment_transactions WHERE uid = $1 ORDER BY created_at DESC LIMIT 1",
            uid,
        )
        .await
    }

    async fn latest_success_for_uid(&self, uid: &str) -> StoreResult<Option<PaymentTransaction>> {
        self.fetch_payment(
            r#"
            SELECT * FROM payment_transactions
            WHERE uid = $1 AND status = 'success'
            ORDER BY created_at DESC LIMIT 1
            "#,
            uid,
        )
        .await
    }

    async fn settle(&self, txnid: &str, settlement: &Settlement) -> StoreResult<SettleResult> {
        let applied = sqlx::query_as::<_, PaymentRow>(
            r#"
            UPDATE payment_transactions
            SET status = $2, gateway_reference = $3, failure_reason = $4,
                settled_at = $5, updated_at = $5
            WHERE txnid = $1
              AND (status = 'initiated'
                   OR ($2 = 'success' AND status = 'failure' AND failure_reason = $6))
            RETURNING *
            "#,
        )
        .bind(txnid)
        .bind(settlement.status.as_str())
        .bind(&settlement.gateway_reference)
        .bind(&settlement.failure_reason)
        .bind(settlement.settled_at)
        .bind(EXPIRED_REASON)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(classify)?;

        if let Some(row) = applied {
            return Ok(SettleResult::Applied(row.try_into()?));
        }
        Ok(match PaymentRepository::get(self, txnid).await? {
            Some(existing) => SettleResult::AlreadyFinal(existing),
            None => SettleResult::NotFound,
        })
    }

    async fn stale_initiated(&self, older_than: DateTime<Utc>) -> StoreResult<Vec<String>> {
        sqlx::query_scalar(
            "SELECT txnid FROM payment_transactions WHERE status = 'initiated' AND created_at < $1",
        )
        .bind(older_than)
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(classify)
    }
}

#[derive(Debug, FromRow)]
struct VerificationRow {
    user_id: String,
    id_card_url: Option<String>,
    payment_receipt_image_url: Option<String>,
    verification_status: String,
    verified_by: Option<String>,
    verification_date: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<VerificationRow> for VerificationRecord {
    type Error = StoreError;

    fn try_from(row: VerificationRow) -> StoreResult<Self> {
        Ok(VerificationRecord {
            user_id: row.user_id,
            id_card_url: row.id_card_url,
            payment_receipt_image_url: row.payment_receipt_image_url,
            verification_status: parse_enum(&row.verification_status)?,
            verified_by: row.verified_by,
            verification_date: row.verification_date,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl VerificationRepository for PgStore {
    async fn get(&self, user_id: &str) -> StoreResult<Option<VerificationRecord>> {
        sqlx::query_as::<_, VerificationRow>("SELECT * FROM verifications WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(self.pool.as_ref())
            .await
            .map_err(classify)?
            .map(VerificationRecord::try_from)
            .transpose()
    }

    async fn record_upload(
        &self,
        user_id: &str,
        update: UploadUpdate,
    ) -> StoreResult<Option<VerificationRecord>> {
        let (id_card_url, receipt_url) = match update {
            UploadUpdate::IdCard(url) => (Some(url), None),
            UploadUpdate::Receipt(url) => (None, Some(url)),
        };
        sqlx::query_as::<_, VerificationRow>(
            r#"
            INSERT INTO verifications (user_id, id_card_url, payment_receipt_image_url, verification_status, updated_at)
            VALUES ($1, $2, $3, 'pending', NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                id_card_url = COALESCE(EXCLUDED.id_card_url, verifications.id_card_url),
                payment_receipt_image_url = COALESCE(EXCLUDED.payment_receipt_image_url, verifications.payment_receipt_image_url),
                verification_status = 'pending',
                updated_at = NOW()
            WHERE verifications.verification_status <> 'approved'
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(id_card_url)
        .bind(receipt_url)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(classify)?
        .map(VerificationRecord::try_from)
        .transpose()
    }

    async fn record_decision(
        &self,
        user_id: &str,
        status: VerificationStatus,
        admin_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<VerificationRecord>> {
        sqlx::query_as::<_, VerificationRow>(
            r#"
            UPDATE verifications
            SET verification_status = $2, verified_by = $3, verification_date = $4, updated_at = $4
            WHERE user_id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(status.as_str())
        .bind(admin_id)
        .bind(at)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(classify)?
        .map(VerificationRecord::try_from)
        .transpose()
    }

    async fn list_submitted(&self) -> StoreResult<Vec<VerificationRecord>> {
        let rows = sqlx::query_as::<_, VerificationRow>(
            r#"
            SELECT * FROM verifications
            WHERE verification_status <> 'not_submitted'
            ORDER BY updated_at DESC
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(classify)?;
        rows.into_iter().map(VerificationRecord::try_from).collect()
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    uid: String,
    name: String,
    email: String,
    phone: String,
    affiliation: String,
    role: String,
    is_admin: bool,
}

#[async_trait]
impl Directory for PgStore {
    async fn profile(&self, uid: &str) -> StoreResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE uid = $1")
            .bind(uid)
            .fetch_optional(self.pool.as_ref())
            .await
            .map_err(classify)?;
        row.map(|r| {
            Ok(UserProfile {
                uid: r.uid,
                name: r.name,
                email: r.email,
                phone: r.phone,
                affiliation: r.affiliation,
                role: parse_enum(&r.role)?,
                is_admin: r.is_admin,
            })
        })
        .transpose()
    }

    async fn is_admin(&self, uid: &str) -> StoreResult<bool> {
        let flag: Option<bool> = sqlx::query_scalar("SELECT is_admin FROM users WHERE uid = $1")
            .bind(uid)
            .fetch_optional(self.pool.as_ref())
            .await
            .map_err(classify)?;
        Ok(flag.unwrap_or(false))
    }
}
