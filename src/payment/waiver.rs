use crate::db::{PayerInfo, PaymentRole};
use std::sync::Arc;

/// Decides whether a payer is exempt from the registration fee.
pub trait WaiverPolicy: Send + Sync {
    /// Returns the reason when the fee is waived.
    fn exemption(&self, payer: &PayerInfo, role: PaymentRole) -> Option<String>;
}

pub type WaiverPolicyRef = Arc<dyn WaiverPolicy>;

/// Waives the fee when the payer's affiliation contains one of the
/// configured institution names, ignoring case.
#[derive(Debug, Clone, Default)]
pub struct AffiliationWaiver {
    institutions: Vec<(String, String)>,
}

impl AffiliationWaiver {
    pub fn new<I, S>(institutions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            institutions: institutions
                .into_iter()
                .map(Into::into)
                .filter(|name: &String| !name.trim().is_empty())
                .map(|name| (name.trim().to_lowercase(), name))
                .collect(),
        }
    }
}

impl WaiverPolicy for AffiliationWaiver {
    fn exemption(&self, payer: &PayerInfo, _role: PaymentRole) -> Option<String> {
        let affiliation = payer.affiliation.to_lowercase();
        self.institutions
            .iter()
            .find(|(needle, _)| affiliation.contains(needle.as_str()))
            .map(|(_, name)| format!("Registration fee waived for {} affiliates", name.trim()))
    }
}
