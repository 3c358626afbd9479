use std::time::Duration;

use k8s_openapi::api::authentication::v1::{TokenRequest, TokenRequestSpec};
use k8s_openapi::api::core::v1::ServiceAccount;
use kube::api::{Api, PostParams};

use crate::error::{ConfigError, ObserverError};
use crate::token::TokenIssuer;

/// Requests tokens via `POST serviceaccounts/{name}/token`.
///
/// Needs `create` on `serviceaccounts/token` in every namespace that holds
/// an `EncryptionKey`.
pub struct KubeTokenIssuer {
    client: kube::Client,
    expiration_seconds: i64,
}

impl KubeTokenIssuer {
    /// `ttl` is requested as the token lifetime and should match the cache's TTL.
    pub fn new(client: kube::Client, ttl: Duration) -> Result<Self, ConfigError> {
        Ok(Self {
            client,
            expiration_seconds: expiration_seconds(ttl)?,
        })
    }

    fn request_body(&self, audience: &str) -> TokenRequest {
        TokenRequest {
            spec: TokenRequestSpec {
                audiences: vec![audience.to_string()],
                expiration_seconds: Some(self.expiration_seconds),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

fn expiration_seconds(ttl: Duration) -> Result<i64, ConfigError> {
    i64::try_from(ttl.as_secs()).map_err(|_| ConfigError::InvalidField {
        field: "token_ttl",
        reason: format!("{}s does not fit a TokenRequest", ttl.as_secs()),
    })
}

#[async_trait::async_trait]
impl TokenIssuer for KubeTokenIssuer {
    async fn get_token(
        &self,
        namespace: &str,
        principal: &str,
        audience: &str,
    ) -> Result<String, ObserverError> {
        let issuance_error = |message: String| ObserverError::TokenIssuance {
            namespace: namespace.to_string(),
            principal: principal.to_string(),
            message,
        };

        let body = serde_json::to_vec(&self.request_body(audience))
            .map_err(|e| issuance_error(e.to_string()))?;

        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        let resp: TokenRequest = api
            .create_subresource("token", principal, &PostParams::default(), body)
            .await
            .map_err(|e| issuance_error(e.to_string()))?;

        resp.status
            .map(|s| s.token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| issuance_error("token request returned no token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiration_seconds_in_range() {
        assert_eq!(expiration_seconds(Duration::from_secs(900)), Ok(900));
    }

    #[test]
    fn test_expiration_seconds_rejects_overflow() {
        let err = expiration_seconds(Duration::from_secs(u64::MAX)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { field: "token_ttl", .. }));
    }
}
