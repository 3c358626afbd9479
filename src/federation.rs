//! Web-identity federation: bearer token in, temporary role credentials out.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::ObserverError;

/// Temporary credentials scoped to one assumed role.
///
/// Lives for a single reconcile pass and is never written anywhere.
#[derive(Clone, PartialEq, Eq)]
pub struct FederatedCredential {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for FederatedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FederatedCredential")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Exchanges a bearer token for credentials of `role_arn`.
#[async_trait::async_trait]
pub trait IdentityFederation: Send + Sync {
    /// `session_label` only shows up in the provider's audit trail.
    ///
    /// Every rejection is reported as [`ObserverError::Federation`].
    async fn assume_role(
        &self,
        token: &str,
        role_arn: &str,
        session_label: &str,
        duration_secs: i32,
    ) -> Result<FederatedCredential, ObserverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secrets() {
        let cred = FederatedCredential {
            access_key_id: "ASIAEXAMPLE".to_string(),
            secret_access_key: "very-secret".to_string(),
            session_token: "session".to_string(),
            expires_at: Utc::now(),
        };
        let out = format!("{cred:?}");
        assert!(out.contains("ASIAEXAMPLE"));
        assert!(!out.contains("very-secret"));
        assert!(!out.contains("session\""));
    }
}
