//! Cluster-backed collaborators.
//!
//! [`KubeTokenIssuer`] mints service-account tokens through the TokenRequest
//! API. [`KubeResourceStore`] reads `EncryptionKey` objects and writes their
//! status subresource.

mod store;
mod token_issuer;

pub use store::KubeResourceStore;
pub use token_issuer::KubeTokenIssuer;
