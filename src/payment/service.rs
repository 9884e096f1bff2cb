use super::gateway::{GatewayClientRef, InitiationRequest};
use super::waiver::WaiverPolicyRef;
use crate::config::{Config, FeeSchedule};
use crate::db::{
    DirectoryRef, PayerInfo, PaymentRepositoryRef, PaymentRole, PaymentStatus,
    PaymentTransaction, SettleResult, Settlement, EXPIRED_REASON,
};
use crate::error::{AppError, Result};
use crate::hash;
use crate::submissions::SubmissionService;
use chrono::{DateTime, Utc};
use reqwest::Url;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info, warn};

/// Server-side payment parameters. The salt never leaves this struct.
#[derive(Clone)]
pub struct PaymentSettings {
    pub key: String,
    pub salt: String,
    pub fees: FeeSchedule,
    pub public_base_url: String,
    pub default_frontend_url: String,
}

impl PaymentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            key: config.gateway.key.clone(),
            salt: config.gateway.salt.clone(),
            fees: config.fees.clone(),
            public_base_url: config.public_base_url.clone(),
            default_frontend_url: config.default_frontend_url.clone(),
        }
    }

    fn fee_for(&self, role: PaymentRole) -> Decimal {
        match role {
            PaymentRole::Author => self.fees.author,
            PaymentRole::Attendee => self.fees.attendee,
        }
    }
}

/// Parameters the client forwards to the hosted checkout page.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub payment_url: String,
    pub access_key: String,
    pub txnid: String,
    pub amount: Decimal,
    pub role: PaymentRole,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InitiationOutcome {
    Required(PaymentSession),
    NotRequired { reason: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendeeRegistration {
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub frontend_url: Option<String>,
}

/// Form body the gateway posts to the success and failure URLs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackPayload {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub productinfo: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub txnid: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub easepayid: Option<String>,
    #[serde(default, rename = "error_Message")]
    pub error_message: Option<String>,
}

/// Which callback URL the gateway used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    Success,
    Failure,
}

/// Why a callback was discarded without touching any transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityFailure {
    MissingFields,
    HashMismatch,
    UnknownTransaction,
    AmountMismatch,
}

impl IntegrityFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrityFailure::MissingFields => "malformed_callback",
            IntegrityFailure::HashMismatch => "hash_mismatch",
            IntegrityFailure::UnknownTransaction => "unknown_transaction",
            IntegrityFailure::AmountMismatch => "amount_mismatch",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallbackResult {
    /// First verified callback for the transaction; the state changed.
    Settled(PaymentTransaction),
    /// The transaction was already final; nothing changed.
    Duplicate(PaymentTransaction),
    Rejected(IntegrityFailure),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusView {
    pub payment_status: String,
    pub payment_amount: Option<Decimal>,
    pub payment_txn_id: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    pub has_approved_paper: bool,
}

/// Builds signed checkout requests and settles verified gateway callbacks.
#[derive(Clone)]
pub struct PaymentService {
    repo: PaymentRepositoryRef,
    directory: DirectoryRef,
    submissions: SubmissionService,
    gateway: GatewayClientRef,
    waiver: WaiverPolicyRef,
    settings: PaymentSettings,
}

impl PaymentService {
    pub fn new(
        repo: PaymentRepositoryRef,
        directory: DirectoryRef,
        submissions: SubmissionService,
        gateway: GatewayClientRef,
        waiver: WaiverPolicyRef,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            repo,
            directory,
            submissions,
            gateway,
            waiver,
            settings,
        }
    }

    /// Starts a registration payment for an account holder.
    pub async fn initiate(&self, uid: &str, frontend_url: Option<&str>) -> Result<InitiationOutcome> {
        let frontend_url = self.frontend_url(frontend_url)?;
        let profile = self
            .directory
            .profile(uid)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource: "user",
                id: uid.to_string(),
            })?;

        if profile.role == PaymentRole::Author && !self.submissions.has_approved_paper(uid).await? {
            return Err(AppError::PrecursorMissing {
                message: "author registration requires an accepted paper".to_string(),
            });
        }

        if let Some(paid) = self.repo.latest_success_for_uid(uid).await? {
            info!(uid, txnid = %paid.txnid, "Payment already completed");
            return Ok(InitiationOutcome::NotRequired {
                reason: "already_paid".to_string(),
            });
        }

        let payer = profile.payer();
        if let Some(reason) = self.waiver.exemption(&payer, profile.role) {
            info!(uid, reason = %reason, "Registration fee waived");
            return Ok(InitiationOutcome::NotRequired { reason });
        }

        let session = self
            .start_session(Some(uid.to_string()), payer, profile.role, frontend_url)
            .await?;
        Ok(InitiationOutcome::Required(session))
    }

    /// Starts a payment for an attendee without an account; the transaction
    /// is keyed by its txnid alone.
    pub async fn initiate_attendee(&self, registration: AttendeeRegistration) -> Result<PaymentSession> {
        let frontend_url = self.frontend_url(registration.frontend_url.as_deref())?;
        let payer = PayerInfo {
            name: registration.name,
            email: registration.email,
            phone: registration.phone,
            affiliation: registration.organization,
        };
        self.start_session(None, payer, PaymentRole::Attendee, frontend_url)
            .await
    }

    async fn start_session(
        &self,
        uid: Option<String>,
        payer: PayerInfo,
        role: PaymentRole,
        frontend_url: String,
    ) -> Result<PaymentSession> {
        let payer = validate_payer(payer)?;
        let amount = self.settings.fee_for(role).round_dp(2);
        let amount_text = format_amount(amount);
        let txnid = hash::new_txn_id();
        let product_info = format!("Conference Registration - {}", title_case(role.as_str()));

        let request = InitiationRequest {
            key: self.settings.key.clone(),
            txnid: txnid.clone(),
            amount: amount_text.clone(),
            productinfo: product_info.clone(),
            firstname: payer.name.clone(),
            phone: payer.phone.clone(),
            email: payer.email.clone(),
            surl: format!("{}/payment-success", self.settings.public_base_url),
            furl: format!("{}/payment-failure", self.settings.public_base_url),
            hash: hash::forward_hash(
                &self.settings.key,
                &txnid,
                &amount_text,
                &product_info,
                &payer.name,
                &payer.email,
                &self.settings.salt,
            ),
        };

        let now = Utc::now();
        let tx = PaymentTransaction {
            txnid: txnid.clone(),
            uid,
            payer,
            amount,
            role,
            product_info,
            status: PaymentStatus::Initiated,
            frontend_url,
            gateway_reference: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            settled_at: None,
        };
        // Persisted first so a callback can never arrive for an unknown txnid.
        self.repo.insert(&tx).await?;

        let access_key = match self.gateway.initiate(&request).await {
            Ok(key) => key,
            Err(e) => {
                let settlement = Settlement {
                    status: PaymentStatus::Failure,
                    gateway_reference: None,
                    failure_reason: Some(format!("initiation_failed: {}", e)),
                    settled_at: Utc::now(),
                };
                if let Err(store_err) = self.repo.settle(&txnid, &settlement).await {
                    error!(txnid = %txnid, error = %store_err, "Failed to close aborted transaction");
                }
                return Err(e);
            }
        };

        info!(txnid = %txnid, role = %role, amount = %amount_text, "Payment initiated");
        Ok(PaymentSession {
            payment_url: self.gateway.payment_url(&access_key),
            access_key,
            txnid,
            amount,
            role,
        })
    }

    /// Verifies a gateway callback and settles its transaction at most once.
    ///
    /// Nothing is written unless the reverse hash recomputed with the server
    /// salt matches the one supplied, the txnid is known and the amount
    /// agrees with what was initiated.
    pub async fn handle_callback(
        &self,
        payload: &CallbackPayload,
        kind: CallbackKind,
    ) -> Result<CallbackResult> {
        if payload.txnid.is_empty() || payload.hash.is_empty() || payload.status.is_empty() {
            warn!(txnid = %payload.txnid, "Discarding callback with missing fields");
            return Ok(CallbackResult::Rejected(IntegrityFailure::MissingFields));
        }

        let expected = hash::reverse_hash(
            &self.settings.salt,
            &payload.status,
            &payload.email,
            &payload.firstname,
            &payload.productinfo,
            &payload.amount,
            &payload.txnid,
            &self.settings.key,
        );
        if !hash::digests_match(&expected, &payload.hash) {
            warn!(txnid = %payload.txnid, "Discarding callback with invalid hash");
            return Ok(CallbackResult::Rejected(IntegrityFailure::HashMismatch));
        }

        let Some(tx) = self.repo.get(&payload.txnid).await? else {
            warn!(txnid = %payload.txnid, "Discarding callback for unknown transaction");
            return Ok(CallbackResult::Rejected(IntegrityFailure::UnknownTransaction));
        };

        match Decimal::from_str(payload.amount.trim()) {
            Ok(paid) if paid == tx.amount => {}
            _ => {
                error!(
                    txnid = %tx.txnid,
                    expected = %tx.amount,
                    received = %payload.amount,
                    "Discarding callback with mismatched amount"
                );
                return Ok(CallbackResult::Rejected(IntegrityFailure::AmountMismatch));
            }
        }

        let succeeded = kind == CallbackKind::Success && payload.status == "success";
        let settlement = Settlement {
            status: if succeeded {
                PaymentStatus::Success
            } else {
                PaymentStatus::Failure
            },
            gateway_reference: payload.easepayid.clone().filter(|r| !r.is_empty()),
            failure_reason: if succeeded {
                None
            } else {
                Some(
                    payload
                        .error_message
                        .clone()
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| payload.status.clone()),
                )
            },
            settled_at: Utc::now(),
        };

        match self.repo.settle(&payload.txnid, &settlement).await? {
            SettleResult::Applied(tx) => {
                info!(txnid = %tx.txnid, status = %tx.status, "Payment settled");
                Ok(CallbackResult::Settled(tx))
            }
            SettleResult::AlreadyFinal(tx) => {
                if tx.status != settlement.status {
                    warn!(
                        txnid = %tx.txnid,
                        recorded = %tx.status,
                        reported = %settlement.status,
                        "Late callback disagrees with recorded outcome, manual reconciliation needed"
                    );
                } else {
                    info!(txnid = %tx.txnid, "Duplicate callback ignored");
                }
                Ok(CallbackResult::Duplicate(tx))
            }
            SettleResult::NotFound => Ok(CallbackResult::Rejected(
                IntegrityFailure::UnknownTransaction,
            )),
        }
    }

    pub async fn status_for_uid(&self, uid: &str) -> Result<PaymentStatusView> {
        let tx = match self.repo.latest_success_for_uid(uid).await? {
            Some(tx) => Some(tx),
            None => self.repo.latest_for_uid(uid).await?,
        };
        let has_approved_paper = self.submissions.has_approved_paper(uid).await?;

        Ok(match tx {
            Some(tx) => PaymentStatusView {
                payment_status: tx.status.to_string(),
                payment_amount: Some(tx.amount),
                payment_txn_id: Some(tx.txnid),
                payment_date: tx.settled_at.or(Some(tx.created_at)),
                has_approved_paper,
            },
            None => PaymentStatusView {
                payment_status: "not_initiated".to_string(),
                payment_amount: None,
                payment_txn_id: None,
                payment_date: None,
                has_approved_paper,
            },
        })
    }

    pub async fn status_for_txn(&self, txnid: &str) -> Result<PaymentTransaction> {
        self.repo
            .get(txnid)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource: "transaction",
                id: txnid.to_string(),
            })
    }

    /// Fails `initiated` transactions older than `max_age`: abandoned
    /// checkouts. Returns how many were closed.
    pub async fn expire_stale(&self, max_age: Duration) -> Result<usize> {
        let max_age = chrono::Duration::from_std(max_age).map_err(|e| AppError::Internal {
            message: format!("invalid expiry: {}", e),
        })?;
        let cutoff = Utc::now() - max_age;
        let stale = self.repo.stale_initiated(cutoff).await?;

        let mut expired = 0;
        for txnid in stale {
            let settlement = Settlement {
                status: PaymentStatus::Failure,
                gateway_reference: None,
                failure_reason: Some(EXPIRED_REASON.to_string()),
                settled_at: Utc::now(),
            };
            if let SettleResult::Applied(_) = self.repo.settle(&txnid, &settlement).await? {
                info!(txnid = %txnid, "Expired abandoned payment");
                expired += 1;
            }
        }
        Ok(expired)
    }

    /// Where the browser goes after a callback: the frontend recorded for the
    /// transaction, or the default one when the txnid is unknown.
    pub fn result_redirect(
        &self,
        frontend_url: Option<&str>,
        status: &str,
        txnid: &str,
        amount: &str,
        reason: &str,
    ) -> String {
        let base = frontend_url.unwrap_or(&self.settings.default_frontend_url);
        let target = format!("{}/payment-result", base.trim_end_matches('/'));
        match Url::parse_with_params(
            &target,
            &[
                ("status", status),
                ("txnid", txnid),
                ("amount", amount),
                ("reason", reason),
            ],
        ) {
            Ok(url) => url.to_string(),
            Err(_) => target,
        }
    }

    fn frontend_url(&self, given: Option<&str>) -> Result<String> {
        let raw = match given.map(str::trim) {
            Some(url) if !url.is_empty() => url,
            _ => return Ok(self.settings.default_frontend_url.clone()),
        };
        let parsed = Url::parse(raw)
            .map_err(|_| AppError::validation(format!("invalid frontendUrl '{}'", raw)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::validation("frontendUrl must be http or https"));
        }
        Ok(raw.trim_end_matches('/').to_string())
    }
}

fn validate_payer(payer: PayerInfo) -> Result<PayerInfo> {
    let payer = PayerInfo {
        name: payer.name.trim().to_string(),
        email: payer.email.trim().to_string(),
        phone: payer.phone.trim().to_string(),
        affiliation: payer.affiliation.trim().to_string(),
    };
    if payer.name.is_empty() {
        return Err(AppError::validation("payer name is required"));
    }
    if payer.phone.is_empty() {
        return Err(AppError::validation("payer phone is required"));
    }
    match payer.email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(payer),
        _ => Err(AppError::validation("a valid payer email is required")),
    }
}

/// Two decimal places, as signed into the forward hash.
pub fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", amount)
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
