//! The `EncryptionKey` custom resource and projection of key metadata into its status.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::keys::KeyMetadataSnapshot;

/// Desired state: which key to watch, through which account, as which service account.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "keyobserver.io",
    version = "v1alpha1",
    kind = "EncryptionKey",
    plural = "encryptionkeys",
    namespaced,
    status = "EncryptionKeyStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.keyState"}"#,
    printcolumn = r#"{"name":"Reconciled","type":"date","jsonPath":".status.lastReconciledTime"}"#
)]
pub struct EncryptionKeySpec {
    /// Identifier (id, ARN or alias) of the KMS key.
    #[serde(rename = "KeyID", default)]
    #[schemars(length(min = 1, max = 2048))]
    pub key_id: String,

    /// Tenant account id, or the full ARN of the role to assume in it.
    #[serde(rename = "AccountID", default)]
    #[schemars(length(min = 1, max = 2048))]
    pub account_id: String,

    /// Service account in the resource's namespace whose token is exchanged.
    #[serde(rename = "KubernetesServiceAccount", default)]
    #[schemars(length(min = 1, max = 253))]
    pub kubernetes_service_account: String,
}

/// Observed state, replaced wholesale on each successful pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionKeyStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconciled_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_state: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_usage: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub custom_key_store_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cloud_hsm_cluster_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_manager: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub customer_master_key_spec: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_spec: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub encryption_algorithms: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signing_algorithms: Vec<String>,
    #[serde(default)]
    pub multi_region: bool,
}

/// Builds the observed state for `snapshot`, stamped with `reconciled_at`.
///
/// Nothing from the previous status survives: fields the provider stopped
/// reporting are cleared.
pub fn project_status(snapshot: &KeyMetadataSnapshot, reconciled_at: DateTime<Utc>) -> EncryptionKeyStatus {
    let s = snapshot.clone();
    EncryptionKeyStatus {
        last_reconciled_time: Some(reconciled_at),
        key_id: s.key_id,
        arn: s.arn.unwrap_or_default(),
        creation_date: s.creation_date,
        description: s.description.unwrap_or_default(),
        enabled: s.enabled,
        key_state: s.key_state.unwrap_or_default(),
        key_usage: s.key_usage.unwrap_or_default(),
        origin: s.origin.unwrap_or_default(),
        deletion_date: s.deletion_date,
        valid_to: s.valid_to,
        custom_key_store_id: s.custom_key_store_id.unwrap_or_default(),
        cloud_hsm_cluster_id: s.cloud_hsm_cluster_id.unwrap_or_default(),
        key_manager: s.key_manager.unwrap_or_default(),
        customer_master_key_spec: s.customer_master_key_spec.unwrap_or_default(),
        key_spec: s.key_spec.unwrap_or_default(),
        encryption_algorithms: s.encryption_algorithms,
        signing_algorithms: s.signing_algorithms,
        multi_region: s.multi_region,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> KeyMetadataSnapshot {
        KeyMetadataSnapshot {
            key_id: "k1".to_string(),
            arn: Some("arn:aws:kms:eu-north-1:111122223333:key/k1".to_string()),
            key_state: Some("Enabled".to_string()),
            enabled: true,
            encryption_algorithms: vec!["SYMMETRIC_DEFAULT".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_project_status_copies_snapshot() {
        let now = Utc::now();
        let status = project_status(&snapshot(), now);

        assert_eq!(status.key_state, "Enabled");
        assert_eq!(status.arn, "arn:aws:kms:eu-north-1:111122223333:key/k1");
        assert!(status.enabled);
        assert_eq!(status.last_reconciled_time, Some(now));
        assert_eq!(status.encryption_algorithms, vec!["SYMMETRIC_DEFAULT"]);
    }

    #[test]
    fn test_project_status_clears_stale_fields() {
        let now = Utc::now();
        let mut snap = snapshot();
        snap.deletion_date = Some(now);
        let first = project_status(&snap, now);
        assert!(first.deletion_date.is_some());

        let second = project_status(&snapshot(), now);
        assert!(second.deletion_date.is_none());
    }

    #[test]
    fn test_spec_uses_source_field_names() {
        let spec: EncryptionKeySpec = serde_json::from_value(serde_json::json!({
            "KeyID": "k1",
            "AccountID": "a1",
            "KubernetesServiceAccount": "sa1"
        }))
        .unwrap();
        assert_eq!(spec.key_id, "k1");
        assert_eq!(spec.account_id, "a1");
        assert_eq!(spec.kubernetes_service_account, "sa1");
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let status = project_status(&snapshot(), Utc::now());
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["keyState"], "Enabled");
        assert!(json.get("lastReconciledTime").is_some());
        assert!(json.get("deletionDate").is_none());
    }

    #[test]
    fn test_crd_identity_is_pinned() {
        use kube::{CustomResourceExt, Resource};

        let crd = EncryptionKey::crd();
        assert_eq!(crd.spec.group, "keyobserver.io");
        assert_eq!(crd.spec.names.kind, "EncryptionKey");
        assert_eq!(crd.spec.scope, "Namespaced");
        assert_eq!(EncryptionKey::api_version(&()), "keyobserver.io/v1alpha1");
    }
}
