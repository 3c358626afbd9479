use aws_sdk_sts::config::Region;
use aws_sdk_sts::error::DisplayErrorContext;
use tracing::debug;

use super::to_utc;
use crate::error::ObserverError;
use crate::federation::{FederatedCredential, IdentityFederation};

/// Exchanges web-identity tokens through STS `AssumeRoleWithWebIdentity`.
///
/// The call is unsigned; only the presented token authenticates it, so the
/// process's own AWS identity never comes into play.
pub struct StsFederation {
    client: aws_sdk_sts::Client,
}

impl StsFederation {
    /// Builds a client from the loaded SDK config, pinned to `region` if given.
    pub fn new(config: &aws_config::SdkConfig, region: Option<&str>) -> Self {
        let mut builder = aws_sdk_sts::config::Builder::from(config);
        if let Some(region) = region {
            builder = builder.region(Region::new(region.to_string()));
        }
        Self {
            client: aws_sdk_sts::Client::from_conf(builder.build()),
        }
    }
}

#[async_trait::async_trait]
impl IdentityFederation for StsFederation {
    async fn assume_role(
        &self,
        token: &str,
        role_arn: &str,
        session_label: &str,
        duration_secs: i32,
    ) -> Result<FederatedCredential, ObserverError> {
        let resp = self
            .client
            .assume_role_with_web_identity()
            .role_arn(role_arn)
            .role_session_name(session_label)
            .web_identity_token(token)
            .duration_seconds(duration_secs)
            .send()
            .await
            .map_err(|e| federation_error(role_arn, DisplayErrorContext(&e).to_string()))?;

        let creds = resp
            .credentials()
            .ok_or_else(|| federation_error(role_arn, "response contained no credentials"))?;
        let credential = credential_from_sts(creds)
            .ok_or_else(|| federation_error(role_arn, "credential expiration out of range"))?;

        debug!(role_arn, expires_at = %credential.expires_at, "assumed role with web identity");
        Ok(credential)
    }
}

fn credential_from_sts(creds: &aws_sdk_sts::types::Credentials) -> Option<FederatedCredential> {
    Some(FederatedCredential {
        access_key_id: creds.access_key_id().to_string(),
        secret_access_key: creds.secret_access_key().to_string(),
        session_token: creds.session_token().to_string(),
        expires_at: to_utc(creds.expiration())?,
    })
}

fn federation_error(role_arn: &str, message: impl Into<String>) -> ObserverError {
    ObserverError::Federation {
        role_arn: role_arn.to_string(),
        message: message.into(),
    }
}
