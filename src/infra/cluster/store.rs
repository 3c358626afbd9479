use kube::ResourceExt;
use kube::api::{Api, PostParams};

use crate::error::ObserverError;
use crate::reconcile::ResourceStore;
use crate::resource::EncryptionKey;

/// `EncryptionKey` storage on the API server.
pub struct KubeResourceStore {
    client: kube::Client,
}

impl KubeResourceStore {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ResourceStore for KubeResourceStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<EncryptionKey>, ObserverError> {
        let api: Api<EncryptionKey> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| ObserverError::ResourceFetch {
                namespace: namespace.to_string(),
                name: name.to_string(),
                message: e.to_string(),
            })
    }

    /// Replaces the status subresource; the fetched `resourceVersion` guards
    /// against clobbering a concurrent writer.
    async fn update_status(&self, resource: &EncryptionKey) -> Result<(), ObserverError> {
        let namespace = resource.namespace().unwrap_or_default();
        let name = resource.name_any();
        let persist_error = |message: String| ObserverError::StatusPersist {
            namespace: namespace.clone(),
            name: name.clone(),
            message,
        };

        let body = serde_json::to_vec(resource).map_err(|e| persist_error(e.to_string()))?;
        let api: Api<EncryptionKey> = Api::namespaced(self.client.clone(), &namespace);
        api.replace_status(&name, &PostParams::default(), body)
            .await
            .map_err(|e| persist_error(e.to_string()))?;
        Ok(())
    }
}
