//! Remote key description.
//!
//! [`KeyDescriptor`] is the async trait for reading a key's metadata with
//! temporary credentials. [`crate::infra::aws::KmsKeyDescriptor`] implements
//! it against AWS KMS.

use chrono::{DateTime, Utc};

use crate::error::ObserverError;
use crate::federation::FederatedCredential;

/// Key attributes as reported by the provider at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMetadataSnapshot {
    pub key_id: String,
    pub arn: Option<String>,
    pub description: Option<String>,
    pub key_state: Option<String>,
    pub key_usage: Option<String>,
    pub origin: Option<String>,
    pub enabled: bool,
    pub creation_date: Option<DateTime<Utc>>,
    pub deletion_date: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub key_spec: Option<String>,
    pub customer_master_key_spec: Option<String>,
    pub key_manager: Option<String>,
    pub encryption_algorithms: Vec<String>,
    pub signing_algorithms: Vec<String>,
    pub multi_region: bool,
    pub custom_key_store_id: Option<String>,
    pub cloud_hsm_cluster_id: Option<String>,
}

/// Reads key metadata using only the credentials it is handed.
#[async_trait::async_trait]
pub trait KeyDescriptor: Send + Sync {
    /// Describes `key_id`, in `region` when given or the provider default otherwise.
    ///
    /// Fails with [`ObserverError::KeyNotFound`], [`ObserverError::Permission`]
    /// or [`ObserverError::Transient`]. Nothing is retried.
    async fn describe(
        &self,
        credential: &FederatedCredential,
        key_id: &str,
        region: Option<&str>,
    ) -> Result<KeyMetadataSnapshot, ObserverError>;
}
