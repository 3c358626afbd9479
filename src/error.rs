//! Error types for the credential pipeline and reconcile pass.

use thiserror::Error;

/// Every way a reconcile pass can fail.
///
/// A missing resource is not represented here; it ends the pass as
/// [`crate::reconcile::PassOutcome::Done`].
#[derive(Debug, Error)]
pub enum ObserverError {
    /// The token authority refused or failed to issue a bearer token.
    #[error("failed to issue token for {principal} in namespace {namespace}: {message}")]
    TokenIssuance {
        namespace: String,
        principal: String,
        message: String,
    },

    /// The web-identity exchange was rejected or unreachable.
    #[error("failed to assume role {role_arn} with web identity: {message}")]
    Federation { role_arn: String, message: String },

    /// The temporary credentials lack rights on the key.
    #[error("permission denied describing key {key_id}: {message}")]
    Permission { key_id: String, message: String },

    /// The key identifier is unknown to the provider.
    #[error("key {key_id} not found: {message}")]
    KeyNotFound { key_id: String, message: String },

    /// Network or service fault while describing the key.
    #[error("transient error describing key {key_id}: {message}")]
    Transient { key_id: String, message: String },

    /// Writing observed state back to the cluster failed.
    #[error("failed to update status of {namespace}/{name}: {message}")]
    StatusPersist {
        namespace: String,
        name: String,
        message: String,
    },

    /// Reading the resource from the cluster failed for a reason other than absence.
    #[error("failed to fetch {namespace}/{name}: {message}")]
    ResourceFetch {
        namespace: String,
        name: String,
        message: String,
    },

    /// The pass deadline expired while `step` was in flight.
    #[error("reconcile pass timed out during {step}")]
    Timeout { step: &'static str },

    /// Desired state cannot be turned into a usable key access description.
    #[error("invalid resource: {0}")]
    InvalidResource(#[from] ConfigError),
}

impl ObserverError {
    /// Short machine-friendly label, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ObserverError::TokenIssuance { .. } => "token_issuance",
            ObserverError::Federation { .. } => "federation",
            ObserverError::Permission { .. } => "permission",
            ObserverError::KeyNotFound { .. } => "key_not_found",
            ObserverError::Transient { .. } => "transient",
            ObserverError::StatusPersist { .. } => "status_persist",
            ObserverError::ResourceFetch { .. } => "resource_fetch",
            ObserverError::Timeout { .. } => "timeout",
            ObserverError::InvalidResource(_) => "invalid_resource",
        }
    }
}

/// Construction-time validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("{field} is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_converts_into_invalid_resource() {
        let err: ObserverError = ConfigError::MissingField("KeyID").into();
        assert_eq!(err.kind(), "invalid_resource");
        assert_eq!(err.to_string(), "invalid resource: KeyID is required");
    }

    #[test]
    fn test_timeout_display_names_step() {
        let err = ObserverError::Timeout { step: "federation" };
        assert_eq!(err.to_string(), "reconcile pass timed out during federation");
    }
}
