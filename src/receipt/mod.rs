//! Payment receipts, projected from settled transactions.

use crate::db::{PaymentRepositoryRef, PaymentRole, PaymentStatus, PaymentTransaction};
use crate::error::{AppError, Result};
use crate::payment::format_amount;
use crate::templates::{get_tera, RECEIPT_TEMPLATE};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

pub const CONFERENCE_NAME: &str = "International Conference Registration Desk";

/// What a receipt is looked up by: account holders by uid, attendees by the
/// transaction they paid with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptKey {
    Uid(String),
    Txn(String),
}

impl ReceiptKey {
    fn as_str(&self) -> &str {
        match self {
            ReceiptKey::Uid(key) | ReceiptKey::Txn(key) => key,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub receipt_number: String,
    pub txnid: String,
    pub gateway_reference: Option<String>,
    pub payer_name: String,
    pub payer_email: String,
    pub payer_phone: String,
    pub payer_affiliation: String,
    pub role: PaymentRole,
    pub product_info: String,
    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
}

impl Receipt {
    /// Only successful transactions have receipts.
    pub fn from_transaction(tx: &PaymentTransaction) -> Option<Self> {
        if tx.status != PaymentStatus::Success {
            return None;
        }
        Some(Self {
            receipt_number: format!("RCPT-{}", tx.txnid.trim_start_matches("TXN")),
            txnid: tx.txnid.clone(),
            gateway_reference: tx.gateway_reference.clone(),
            payer_name: tx.payer.name.clone(),
            payer_email: tx.payer.email.clone(),
            payer_phone: tx.payer.phone.clone(),
            payer_affiliation: tx.payer.affiliation.clone(),
            role: tx.role,
            product_info: tx.product_info.clone(),
            amount: tx.amount,
            paid_at: tx.settled_at.unwrap_or(tx.updated_at),
        })
    }

    pub fn paid_on(&self) -> String {
        self.paid_at.format("%d %B %Y, %H:%M UTC").to_string()
    }

    pub fn amount_text(&self) -> String {
        format_amount(self.amount)
    }

    /// Plain-text body. Same receipt, same bytes.
    pub fn to_text(&self) -> Result<String> {
        let mut context = tera::Context::new();
        context.insert("conference", CONFERENCE_NAME);
        context.insert("receipt_number", &self.receipt_number);
        context.insert("txnid", &self.txnid);
        context.insert("gateway_reference", &self.gateway_reference);
        context.insert("paid_on", &self.paid_on());
        context.insert("payer_name", &self.payer_name);
        context.insert("payer_email", &self.payer_email);
        context.insert("payer_phone", &self.payer_phone);
        context.insert("payer_affiliation", &self.payer_affiliation);
        context.insert("product_info", &self.product_info);
        context.insert("role", &self.role.as_str().to_uppercase());
        context.insert("amount", &self.amount_text());

        get_tera()
            .render(RECEIPT_TEMPLATE, &context)
            .map_err(|e| AppError::Internal {
                message: format!("receipt template error: {}", e),
            })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptAvailability {
    pub available: bool,
    pub txnid: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct ReceiptService {
    payments: PaymentRepositoryRef,
}

impl ReceiptService {
    pub fn new(payments: PaymentRepositoryRef) -> Self {
        Self { payments }
    }

    /// Never writes. Fails with `NotAvailable` unless a successful
    /// transaction exists for the key.
    pub async fn render(&self, key: &ReceiptKey) -> Result<Receipt> {
        let tx = match key {
            ReceiptKey::Uid(uid) => self.payments.latest_success_for_uid(uid).await?,
            ReceiptKey::Txn(txnid) => self.payments.get(txnid).await?,
        };

        tx.as_ref()
            .and_then(Receipt::from_transaction)
            .ok_or_else(|| AppError::NotAvailable {
                key: key.as_str().to_string(),
            })
    }

    pub async fn availability(&self, uid: &str) -> Result<ReceiptAvailability> {
        let receipt = self
            .payments
            .latest_success_for_uid(uid)
            .await?
            .as_ref()
            .and_then(Receipt::from_transaction);

        Ok(match receipt {
            Some(r) => ReceiptAvailability {
                available: true,
                txnid: Some(r.txnid),
                paid_at: Some(r.paid_at),
            },
            None => ReceiptAvailability {
                available: false,
                txnid: None,
                paid_at: None,
            },
        })
    }
}
