//! Payment gateway hash strings and transaction identifiers.
//!
//! The field order and the run of empty `udf` slots are fixed by the gateway:
//! any change here breaks every signed request and every callback check.

use chrono::Utc;
use sha2::{Digest, Sha512};

/// Empty user-defined fields `udf1..udf10` between `email` and `salt`.
const EMPTY_UDF_FIELDS: usize = 10;

fn sha512_hex(fields: &[&str]) -> String {
    let mut hasher = Sha512::new();
    hasher.update(fields.join("|").as_bytes());
    hex::encode(hasher.finalize())
}

/// `key|txnid|amount|productinfo|firstname|email|udf1..udf10|salt`
pub fn forward_hash(
    key: &str,
    txnid: &str,
    amount: &str,
    product_info: &str,
    first_name: &str,
    email: &str,
    salt: &str,
) -> String {
    let mut fields = vec![key, txnid, amount, product_info, first_name, email];
    fields.extend(std::iter::repeat("").take(EMPTY_UDF_FIELDS));
    fields.push(salt);
    sha512_hex(&fields)
}

/// `salt|status|udf10..udf1|email|firstname|productinfo|amount|txnid|key`
#[allow(clippy::too_many_arguments)]
pub fn reverse_hash(
    salt: &str,
    status: &str,
    email: &str,
    first_name: &str,
    product_info: &str,
    amount: &str,
    txnid: &str,
    key: &str,
) -> String {
    let mut fields = vec![salt, status];
    fields.extend(std::iter::repeat("").take(EMPTY_UDF_FIELDS));
    fields.extend([email, first_name, product_info, amount, txnid, key]);
    sha512_hex(&fields)
}

/// Byte-for-byte comparison that does not short-circuit on the first
/// differing byte.
pub fn digests_match(expected: &str, claimed: &str) -> bool {
    let (a, b) = (expected.as_bytes(), claimed.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// A fresh transaction id: `TXN`, the millisecond timestamp, then eight
/// random bytes in hex.
pub fn new_txn_id() -> String {
    let random_bytes: [u8; 8] = rand::random();
    format!(
        "TXN{}{}",
        Utc::now().timestamp_millis(),
        hex::encode(random_bytes)
    )
}
