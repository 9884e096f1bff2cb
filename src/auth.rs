//! Admin capability checks.
//!
//! The identity provider is asked once per request, at the route boundary.
//! Services never look up the admin claim themselves: they take an
//! [`AdminIdentity`], which only [`Authorizer::require_admin`] can produce.

use crate::db::DirectoryRef;
use crate::error::{AppError, Result};

/// Proof that `uid` carried the admin claim when the request arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminIdentity {
    uid: String,
}

impl AdminIdentity {
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Builds an identity without consulting the directory. Test use only.
    #[doc(hidden)]
    pub fn assume(uid: impl Into<String>) -> Self {
        Self { uid: uid.into() }
    }
}

#[derive(Clone)]
pub struct Authorizer {
    directory: DirectoryRef,
}

impl Authorizer {
    pub fn new(directory: DirectoryRef) -> Self {
        Self { directory }
    }

    pub async fn require_admin(&self, uid: &str) -> Result<AdminIdentity> {
        if uid.trim().is_empty() {
            return Err(AppError::Unauthorized {
                message: "admin id is required".to_string(),
            });
        }
        if !self.directory.is_admin(uid).await? {
            tracing::warn!(uid, "Admin action attempted without admin claim");
            return Err(AppError::Unauthorized {
                message: "admin privileges required".to_string(),
            });
        }
        Ok(AdminIdentity {
            uid: uid.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InMemoryDirectory, PaymentRole, UserProfile};
    use std::sync::Arc;

    fn profile(uid: &str, is_admin: bool) -> UserProfile {
        UserProfile {
            uid: uid.into(),
            name: "Grace".into(),
            email: "grace@example.org".into(),
            phone: "1".into(),
            affiliation: "Navy".into(),
            role: PaymentRole::Attendee,
            is_admin,
        }
    }

    #[tokio::test]
    async fn test_require_admin() {
        let directory = InMemoryDirectory::new();
        directory.insert(profile("admin", true)).await;
        directory.insert(profile("user", false)).await;
        let authorizer = Authorizer::new(Arc::new(directory));

        assert_eq!(authorizer.require_admin("admin").await.unwrap().uid(), "admin");
        assert!(matches!(
            authorizer.require_admin("user").await,
            Err(AppError::Unauthorized { .. })
        ));
        assert!(authorizer.require_admin("nobody").await.is_err());
        assert!(authorizer.require_admin("").await.is_err());
    }
}
