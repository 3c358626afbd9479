//! Bearer tokens for workload principals.
//!
//! [`TokenIssuer`] is the async trait for minting a token from an external
//! authority. [`TokenCache`] sits in front of an issuer and reuses tokens
//! until they get close to expiry.

mod cache;

pub use cache::TokenCache;

use crate::error::ObserverError;

/// Mints a bearer token for `principal` in `namespace`, scoped to `audience`.
#[async_trait::async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn get_token(
        &self,
        namespace: &str,
        principal: &str,
        audience: &str,
    ) -> Result<String, ObserverError>;
}
