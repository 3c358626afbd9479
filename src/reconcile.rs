//! One reconcile pass for an `EncryptionKey`.
//!
//! ```text
//! Fetch ─┬─ absent ──────────────────────────────────────────────▶ Done
//!        └─ TokenAcquire ▶ FederationExchange ▶ KeyDescribe ▶ StatusUpdate ▶ Done(requeue)
//! ```
//!
//! Any failure after Fetch aborts the pass with the status untouched and
//! the error returned to the scheduler, which owns retry and backoff.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{KeyAccess, ObserverConfig};
use crate::error::{ConfigError, ObserverError};
use crate::federation::IdentityFederation;
use crate::keys::KeyDescriptor;
use crate::resource::{EncryptionKey, project_status};
use crate::token::{TokenCache, TokenIssuer};

/// Storage of `EncryptionKey` objects, owned by the platform.
#[async_trait::async_trait]
pub trait ResourceStore: Send + Sync {
    /// Returns `None` when the object does not exist.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<EncryptionKey>, ObserverError>;

    /// Persists `resource.status`.
    async fn update_status(&self, resource: &EncryptionKey) -> Result<(), ObserverError>;
}

/// How a successful pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Nothing left to do until the resource changes.
    Done,
    /// Run again after the given delay.
    Requeue(Duration),
}

/// Drives the credential pipeline for one resource at a time.
///
/// Safe to share across concurrent passes; the token cache is the only
/// shared mutable state.
pub struct Reconciler {
    store: Arc<dyn ResourceStore>,
    tokens: TokenCache,
    federation: Arc<dyn IdentityFederation>,
    descriptor: Arc<dyn KeyDescriptor>,
    config: ObserverConfig,
}

impl Reconciler {
    /// Validates `config` and builds the token cache from it.
    ///
    /// A config that [`ObserverConfig::validated`] rejects never reaches a pass.
    pub fn new(
        store: Arc<dyn ResourceStore>,
        issuer: Arc<dyn TokenIssuer>,
        federation: Arc<dyn IdentityFederation>,
        descriptor: Arc<dyn KeyDescriptor>,
        config: ObserverConfig,
    ) -> Result<Self, ConfigError> {
        let config = config.validated()?;
        let tokens = TokenCache::new(issuer, config.token_ttl, config.token_safety_margin);
        Ok(Self {
            store,
            tokens,
            federation,
            descriptor,
            config,
        })
    }

    /// Runs Fetch through StatusUpdate for `namespace/name`.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile_pass(&self, namespace: &str, name: &str) -> Result<PassOutcome, ObserverError> {
        let deadline = Instant::now() + self.config.pass_timeout;

        let Some(resource) = bounded(deadline, "fetch", self.store.get(namespace, name)).await? else {
            debug!("resource no longer exists, nothing to do");
            return Ok(PassOutcome::Done);
        };

        let spec = &resource.spec;
        let access = KeyAccess::new(
            &spec.key_id,
            &spec.account_id,
            &spec.kubernetes_service_account,
            &self.config,
        )?;

        let result = self.observe(namespace, name, resource, &access, deadline).await;
        if let Err(e) = &result {
            warn!(error = %e, kind = e.kind(), key_id = %access.key_id, "reconcile pass failed");
        }
        result
    }

    async fn observe(
        &self,
        namespace: &str,
        name: &str,
        resource: EncryptionKey,
        access: &KeyAccess,
        deadline: Instant,
    ) -> Result<PassOutcome, ObserverError> {
        debug!(principal = %access.principal, "acquiring token");
        let token = bounded(
            deadline,
            "token",
            self.tokens
                .get_token(namespace, &access.principal, &self.config.audience),
        )
        .await?;

        debug!(role_arn = %access.role_arn, "exchanging token for role credentials");
        let credential = bounded(
            deadline,
            "federation",
            self.federation.assume_role(
                &token,
                &access.role_arn,
                &self.config.session_name,
                self.config.session_duration_secs,
            ),
        )
        .await?;

        debug!(key_id = %access.key_id, "describing key");
        let snapshot = bounded(
            deadline,
            "describe",
            self.descriptor
                .describe(&credential, &access.key_id, self.config.region.as_deref()),
        )
        .await?;

        let mut updated = resource;
        updated.status = Some(project_status(&snapshot, Utc::now()));
        bounded(deadline, "status_update", self.store.update_status(&updated)).await?;

        info!(
            namespace,
            name,
            key_state = snapshot.key_state.as_deref().unwrap_or_default(),
            "updated EncryptionKey status"
        );
        Ok(PassOutcome::Requeue(self.config.requeue_interval))
    }
}

/// Awaits `fut` until `deadline`; the future is dropped (cancelled) if it runs over.
async fn bounded<T>(
    deadline: Instant,
    step: &'static str,
    fut: impl Future<Output = Result<T, ObserverError>>,
) -> Result<T, ObserverError> {
    tokio::time::timeout_at(deadline, fut)
        .await
        .map_err(|_| ObserverError::Timeout { step })?
}
