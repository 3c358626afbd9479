//! Process-wide observer settings and the per-resource key access value.
//!
//! [`ObserverConfig`] is built once at startup and validated up front.
//! [`KeyAccess`] is built from an `EncryptionKey` spec on every pass; a
//! missing field is reported as a [`ConfigError`] rather than aborting.

use std::time::Duration;

use crate::error::ConfigError;

/// Audience the STS web-identity endpoint expects on projected tokens.
pub const STS_AUDIENCE: &str = "sts.amazonaws.com";

pub const DEFAULT_REQUEUE_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_PASS_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(900);
pub const TOKEN_SAFETY_MARGIN: Duration = Duration::from_secs(30);
pub const DEFAULT_SESSION_DURATION_SECS: i32 = 900;
pub const DEFAULT_SESSION_NAME: &str = "kms-key-observer";
pub const DEFAULT_TENANT_ROLE_NAME: &str = "kms-key-observer-reader";

// TokenRequest expirationSeconds bounds enforced by the API server.
const MIN_TOKEN_TTL: Duration = Duration::from_secs(600);
const MAX_TOKEN_TTL: Duration = Duration::from_secs(1 << 32);

// STS AssumeRoleWithWebIdentity bounds.
const MIN_SESSION_DURATION_SECS: i32 = 900;
const MAX_SESSION_DURATION_SECS: i32 = 43_200;

/// Immutable settings shared by every reconcile pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverConfig {
    pub requeue_interval: Duration,
    pub pass_timeout: Duration,
    pub token_ttl: Duration,
    pub token_safety_margin: Duration,
    pub session_duration_secs: i32,
    pub session_name: String,
    pub audience: String,
    /// Role assumed in the tenant account when `AccountID` is a bare account id.
    pub tenant_role_name: String,
    pub partition: String,
    /// Pins STS and KMS to one region; `None` defers to the SDK's resolution.
    pub region: Option<String>,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            requeue_interval: DEFAULT_REQUEUE_INTERVAL,
            pass_timeout: DEFAULT_PASS_TIMEOUT,
            token_ttl: DEFAULT_TOKEN_TTL,
            token_safety_margin: TOKEN_SAFETY_MARGIN,
            session_duration_secs: DEFAULT_SESSION_DURATION_SECS,
            session_name: DEFAULT_SESSION_NAME.to_string(),
            audience: STS_AUDIENCE.to_string(),
            tenant_role_name: DEFAULT_TENANT_ROLE_NAME.to_string(),
            partition: "aws".to_string(),
            region: None,
        }
    }
}

impl ObserverConfig {
    /// Validates `self` and returns it unchanged when every field is usable.
    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.requeue_interval.is_zero() {
            return Err(invalid("requeue_interval", "must be greater than zero"));
        }
        if self.pass_timeout.is_zero() {
            return Err(invalid("pass_timeout", "must be greater than zero"));
        }
        if !(MIN_TOKEN_TTL..=MAX_TOKEN_TTL).contains(&self.token_ttl) {
            return Err(invalid(
                "token_ttl",
                format!(
                    "must be within {}s..={}s",
                    MIN_TOKEN_TTL.as_secs(),
                    MAX_TOKEN_TTL.as_secs()
                ),
            ));
        }
        if self.token_ttl <= self.token_safety_margin {
            return Err(invalid(
                "token_ttl",
                format!(
                    "must exceed the {}s safety margin",
                    self.token_safety_margin.as_secs()
                ),
            ));
        }
        if !(MIN_SESSION_DURATION_SECS..=MAX_SESSION_DURATION_SECS)
            .contains(&self.session_duration_secs)
        {
            return Err(invalid(
                "session_duration_secs",
                format!("must be within {MIN_SESSION_DURATION_SECS}..={MAX_SESSION_DURATION_SECS}"),
            ));
        }
        if self.session_name.trim().is_empty() {
            return Err(ConfigError::MissingField("session_name"));
        }
        if self.audience.trim().is_empty() {
            return Err(ConfigError::MissingField("audience"));
        }
        if self.tenant_role_name.trim().is_empty() {
            return Err(ConfigError::MissingField("tenant_role_name"));
        }
        if self.partition.trim().is_empty() {
            return Err(ConfigError::MissingField("partition"));
        }
        if self.region.as_deref().is_some_and(|r| r.trim().is_empty()) {
            return Err(invalid("region", "must not be blank when set"));
        }
        Ok(self)
    }
}

/// Everything needed to reach one KMS key on behalf of one service account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAccess {
    pub key_id: String,
    pub role_arn: String,
    pub principal: String,
}

impl KeyAccess {
    /// Builds access details from desired state.
    ///
    /// `account_id` may be a full role ARN (used as-is) or a bare account id,
    /// in which case the role ARN is derived from `config`.
    pub fn new(
        key_id: &str,
        account_id: &str,
        principal: &str,
        config: &ObserverConfig,
    ) -> Result<Self, ConfigError> {
        let key_id = required("KeyID", key_id)?;
        let account_id = required("AccountID", account_id)?;
        let principal = required("KubernetesServiceAccount", principal)?;

        let role_arn = if account_id.starts_with("arn:") {
            account_id.to_string()
        } else {
            format!(
                "arn:{}:iam::{}:role/{}",
                config.partition, account_id, config.tenant_role_name
            )
        };

        Ok(Self {
            key_id: key_id.to_string(),
            role_arn,
            principal: principal.to_string(),
        })
    }
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        Err(ConfigError::MissingField(field))
    } else {
        Ok(value)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidField {
        field,
        reason: reason.into(),
    }
}
