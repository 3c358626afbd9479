use std::time::SystemTime;

use aws_sdk_kms::config::{Credentials, Region};
use aws_sdk_kms::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_kms::types::KeyMetadata;

use super::to_utc;
use crate::error::ObserverError;
use crate::federation::FederatedCredential;
use crate::keys::{KeyDescriptor, KeyMetadataSnapshot};

const CREDENTIALS_PROVIDER_NAME: &str = "web-identity-federation";

/// Describes keys through KMS `DescribeKey`.
///
/// A fresh client is built per call from the base SDK config with the
/// caller's temporary credentials swapped in, so ambient credentials are
/// never used for KMS.
pub struct KmsKeyDescriptor {
    config: aws_config::SdkConfig,
}

impl KmsKeyDescriptor {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn client_for(&self, credential: &FederatedCredential, region: Option<&str>) -> aws_sdk_kms::Client {
        let credentials = Credentials::new(
            credential.access_key_id.clone(),
            credential.secret_access_key.clone(),
            Some(credential.session_token.clone()),
            Some(SystemTime::from(credential.expires_at)),
            CREDENTIALS_PROVIDER_NAME,
        );
        let mut builder = aws_sdk_kms::config::Builder::from(&self.config).credentials_provider(credentials);
        if let Some(region) = region {
            builder = builder.region(Region::new(region.to_string()));
        }
        aws_sdk_kms::Client::from_conf(builder.build())
    }
}

#[async_trait::async_trait]
impl KeyDescriptor for KmsKeyDescriptor {
    async fn describe(
        &self,
        credential: &FederatedCredential,
        key_id: &str,
        region: Option<&str>,
    ) -> Result<KeyMetadataSnapshot, ObserverError> {
        let resp = self
            .client_for(credential, region)
            .describe_key()
            .key_id(key_id)
            .send()
            .await
            .map_err(|err| {
                let code = err.as_service_error().and_then(|e| e.code()).map(str::to_string);
                classify_describe_error(key_id, code.as_deref(), DisplayErrorContext(&err).to_string())
            })?;

        let metadata = resp.key_metadata().ok_or_else(|| ObserverError::Transient {
            key_id: key_id.to_string(),
            message: "DescribeKey response contained no key metadata".to_string(),
        })?;
        Ok(snapshot_from_metadata(metadata))
    }
}

/// Maps a KMS error code onto the failure classes callers act on.
fn classify_describe_error(key_id: &str, code: Option<&str>, message: String) -> ObserverError {
    let key_id = key_id.to_string();
    match code {
        Some("NotFoundException" | "InvalidArnException") => ObserverError::KeyNotFound { key_id, message },
        Some(
            "AccessDeniedException"
            | "UnrecognizedClientException"
            | "InvalidClientTokenId"
            | "ExpiredTokenException",
        ) => ObserverError::Permission { key_id, message },
        _ => ObserverError::Transient { key_id, message },
    }
}

// customer_master_key_spec is deprecated upstream in favour of key_spec but still reported.
#[allow(deprecated)]
fn snapshot_from_metadata(m: &KeyMetadata) -> KeyMetadataSnapshot {
    KeyMetadataSnapshot {
        key_id: m.key_id().to_string(),
        arn: m.arn().map(str::to_string),
        description: m.description().map(str::to_string),
        key_state: m.key_state().map(|s| s.as_str().to_string()),
        key_usage: m.key_usage().map(|u| u.as_str().to_string()),
        origin: m.origin().map(|o| o.as_str().to_string()),
        enabled: m.enabled(),
        creation_date: m.creation_date().and_then(to_utc),
        deletion_date: m.deletion_date().and_then(to_utc),
        valid_to: m.valid_to().and_then(to_utc),
        key_spec: m.key_spec().map(|k| k.as_str().to_string()),
        customer_master_key_spec: m.customer_master_key_spec().map(|k| k.as_str().to_string()),
        key_manager: m.key_manager().map(|k| k.as_str().to_string()),
        encryption_algorithms: m
            .encryption_algorithms()
            .iter()
            .map(|a| a.as_str().to_string())
            .collect(),
        signing_algorithms: m
            .signing_algorithms()
            .iter()
            .map(|a| a.as_str().to_string())
            .collect(),
        multi_region: m.multi_region().unwrap_or(false),
        custom_key_store_id: m.custom_key_store_id().map(str::to_string),
        cloud_hsm_cluster_id: m.cloud_hsm_cluster_id().map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_kms::primitives::DateTime;
    use aws_sdk_kms::types::{EncryptionAlgorithmSpec, KeyManagerType, KeySpec, KeyState, KeyUsageType, OriginType};

    #[test]
    fn test_snapshot_from_metadata() {
        let metadata = KeyMetadata::builder()
            .key_id("k1")
            .arn("arn:aws:kms:eu-north-1:111122223333:key/k1")
            .key_state(KeyState::Enabled)
            .enabled(true)
            .key_usage(KeyUsageType::EncryptDecrypt)
            .origin(OriginType::AwsKms)
            .key_manager(KeyManagerType::Customer)
            .key_spec(KeySpec::SymmetricDefault)
            .encryption_algorithms(EncryptionAlgorithmSpec::SymmetricDefault)
            .creation_date(DateTime::from_secs(1_700_000_000))
            .multi_region(true)
            .build()
            .expect("key_id is set");

        let snap = snapshot_from_metadata(&metadata);
        assert_eq!(snap.key_id, "k1");
        assert_eq!(snap.arn.as_deref(), Some("arn:aws:kms:eu-north-1:111122223333:key/k1"));
        assert_eq!(snap.key_state.as_deref(), Some("Enabled"));
        assert_eq!(snap.key_usage.as_deref(), Some("ENCRYPT_DECRYPT"));
        assert_eq!(snap.origin.as_deref(), Some("AWS_KMS"));
        assert_eq!(snap.key_manager.as_deref(), Some("CUSTOMER"));
        assert_eq!(snap.key_spec.as_deref(), Some("SYMMETRIC_DEFAULT"));
        assert_eq!(snap.encryption_algorithms, vec!["SYMMETRIC_DEFAULT"]);
        assert!(snap.signing_algorithms.is_empty());
        assert_eq!(snap.creation_date.map(|d| d.timestamp()), Some(1_700_000_000));
        assert!(snap.deletion_date.is_none());
        assert!(snap.enabled);
        assert!(snap.multi_region);
    }

    #[test]
    fn test_classify_not_found() {
        let err = classify_describe_error("k1", Some("NotFoundException"), "gone".to_string());
        assert!(matches!(err, ObserverError::KeyNotFound { .. }));
        let err = classify_describe_error("k1", Some("InvalidArnException"), "bad".to_string());
        assert!(matches!(err, ObserverError::KeyNotFound { .. }));
    }

    #[test]
    fn test_classify_permission() {
        let err = classify_describe_error("k1", Some("AccessDeniedException"), "denied".to_string());
        assert!(matches!(err, ObserverError::Permission { .. }));
    }

    #[test]
    fn test_classify_everything_else_as_transient() {
        let err = classify_describe_error("k1", Some("KMSInternalException"), "boom".to_string());
        assert!(matches!(err, ObserverError::Transient { .. }));
        let err = classify_describe_error("k1", None, "dispatch failure".to_string());
        assert!(matches!(err, ObserverError::Transient { .. }));
    }
}
