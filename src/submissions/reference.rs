use crate::db::CounterStoreRef;
use crate::error::{AppError, Result};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

/// Counter shared by every submission, abstracts and full papers alike.
pub const SUBMISSION_COUNTER: &str = "submissions";

const MAX_ATTEMPTS: u32 = 5;

fn prefix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]*$").expect("valid prefix regex"))
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9]*-[0-9]{2,}$").expect("valid reference regex")
    })
}

/// `PREFIX-NN`: the number is zero-padded to two digits and printed in full
/// once it grows past 99.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ReferenceNumber(String);

impl ReferenceNumber {
    pub fn new(prefix: &str, number: u64) -> Self {
        Self(format!("{}-{:02}", prefix, number))
    }

    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if !reference_pattern().is_match(value) {
            return Err(AppError::validation(format!(
                "invalid reference number '{}', expected PREFIX-NN",
                value
            )));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn prefix(&self) -> &str {
        self.0.rsplit_once('-').map_or("", |(prefix, _)| prefix)
    }

    pub fn number(&self) -> Result<u64> {
        self.0
            .rsplit_once('-')
            .and_then(|(_, digits)| digits.parse().ok())
            .ok_or_else(|| {
                AppError::validation(format!("reference number '{}' is out of range", self.0))
            })
    }
}

impl fmt::Display for ReferenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issues reference numbers from the shared counter.
///
/// Each allocation is one serializable increment in the store. Conflicting
/// increments are retried a bounded number of times; every other store
/// failure is returned to the caller untouched. Issued numbers are never
/// handed out again, even if the submission they were meant for is never
/// created.
#[derive(Clone)]
pub struct ReferenceAllocator {
    counters: CounterStoreRef,
}

impl ReferenceAllocator {
    pub fn new(counters: CounterStoreRef) -> Self {
        Self { counters }
    }

    pub async fn allocate_next(&self, prefix: &str) -> Result<ReferenceNumber> {
        if !prefix_pattern().is_match(prefix) {
            return Err(AppError::validation(format!(
                "invalid reference prefix '{}'",
                prefix
            )));
        }

        let mut backoff = Duration::from_millis(5);
        for attempt in 1..=MAX_ATTEMPTS {
            match self.counters.try_increment(SUBMISSION_COUNTER).await {
                Ok(number) => {
                    let reference = ReferenceNumber::new(prefix, number);
                    info!(reference = %reference, attempt, "Allocated reference number");
                    return Ok(reference);
                }
                Err(e) if e.is_conflict() => {
                    warn!(attempt, "Reference counter conflict, retrying");
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::StoreTransient(format!(
            "reference counter still contended after {} attempts",
            MAX_ATTEMPTS
        )))
    }

    /// Last number issued so far.
    pub async fn last_issued(&self) -> Result<u64> {
        Ok(self.counters.current(SUBMISSION_COUNTER).await?)
    }
}
