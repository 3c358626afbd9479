use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::TokenIssuer;
use crate::error::ObserverError;

/// (namespace, principal, audience)
type CacheKey = (String, String, String);

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

type Slot = Arc<tokio::sync::Mutex<Option<CachedToken>>>;

/// Reuses issued tokens until fewer than `safety_margin` of validity remain.
///
/// The outer map lock is only held long enough to find or create the slot
/// for a key. The slot's own lock is held across issuance, so concurrent
/// cold calls for the same key produce exactly one issuance while other
/// keys stay unblocked.
pub struct TokenCache {
    issuer: Arc<dyn TokenIssuer>,
    ttl: Duration,
    safety_margin: Duration,
    slots: Mutex<HashMap<CacheKey, Slot>>,
}

impl TokenCache {
    /// `ttl` must match the lifetime the issuer actually grants and exceed
    /// `safety_margin`; `Reconciler::new` only passes validated values.
    pub(crate) fn new(issuer: Arc<dyn TokenIssuer>, ttl: Duration, safety_margin: Duration) -> Self {
        Self {
            issuer,
            ttl,
            safety_margin,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a token with more than the safety margin left, issuing one if needed.
    ///
    /// Issuance errors are returned as-is and leave any previous entry in
    /// place; an expired entry is never handed out as a fallback.
    pub async fn get_token(
        &self,
        namespace: &str,
        principal: &str,
        audience: &str,
    ) -> Result<String, ObserverError> {
        let slot = self.slot(namespace, principal, audience);
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref() {
            let remaining = cached.expires_at.saturating_duration_since(Instant::now());
            if remaining > self.safety_margin {
                debug!(namespace, principal, audience, remaining_secs = remaining.as_secs(), "token cache hit");
                return Ok(cached.token.clone());
            }
        }

        debug!(namespace, principal, audience, "token cache miss, requesting new token");
        // The authority starts the token's lifetime no earlier than this.
        let requested_at = Instant::now();
        let token = self.issuer.get_token(namespace, principal, audience).await?;

        *entry = Some(CachedToken {
            token: token.clone(),
            expires_at: requested_at + self.ttl,
        });
        Ok(token)
    }

    fn slot(&self, namespace: &str, principal: &str, audience: &str) -> Slot {
        let key = (
            namespace.to_string(),
            principal.to_string(),
            audience.to_string(),
        );
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(key).or_default().clone()
    }

    #[cfg(test)]
    fn expires_at(&self, namespace: &str, principal: &str, audience: &str) -> Option<Instant> {
        let slot = self.slot(namespace, principal, audience);
        let entry = slot.try_lock().ok()?;
        entry.as_ref().map(|c| c.expires_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(900);
    const MARGIN: Duration = Duration::from_secs(30);

    #[derive(Default)]
    struct CountingIssuer {
        issued: AtomicUsize,
        delay: Option<Duration>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl TokenIssuer for CountingIssuer {
        async fn get_token(
            &self,
            namespace: &str,
            principal: &str,
            _audience: &str,
        ) -> Result<String, ObserverError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(ObserverError::TokenIssuance {
                    namespace: namespace.to_string(),
                    principal: principal.to_string(),
                    message: "forbidden".to_string(),
                });
            }
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("tok-{n}"))
        }
    }

    fn cache_with(issuer: Arc<CountingIssuer>) -> TokenCache {
        TokenCache::new(issuer, TTL, MARGIN)
    }

    #[tokio::test(start_paused = true)]
    async fn test_reuses_token_while_valid() {
        let issuer = Arc::new(CountingIssuer::default());
        let cache = cache_with(issuer.clone());

        let first = cache.get_token("ns1", "sa1", "sts.amazonaws.com").await.unwrap();
        tokio::time::advance(Duration::from_secs(600)).await;
        let second = cache.get_token("ns1", "sa1", "sts.amazonaws.com").await.unwrap();
        tokio::time::advance(Duration::from_secs(269)).await;
        let third = cache.get_token("ns1", "sa1", "sts.amazonaws.com").await.unwrap();

        assert_eq!(first, "tok-1");
        assert_eq!(second, first);
        assert_eq!(third, first);
        assert_eq!(issuer.issued.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshes_inside_safety_margin() {
        let issuer = Arc::new(CountingIssuer::default());
        let cache = cache_with(issuer.clone());

        cache.get_token("ns1", "sa1", "aud").await.unwrap();
        let first_expiry = cache.expires_at("ns1", "sa1", "aud").unwrap();

        // exactly 30s left
        tokio::time::advance(Duration::from_secs(870)).await;
        let refreshed = cache.get_token("ns1", "sa1", "aud").await.unwrap();

        assert_eq!(refreshed, "tok-2");
        assert_eq!(issuer.issued.load(Ordering::SeqCst), 2);
        let new_expiry = cache.expires_at("ns1", "sa1", "aud").unwrap();
        assert_eq!(new_expiry - first_expiry, Duration::from_secs(870));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let issuer = Arc::new(CountingIssuer::default());
        let cache = cache_with(issuer.clone());

        let a = cache.get_token("ns1", "sa1", "aud").await.unwrap();
        let b = cache.get_token("ns2", "sa1", "aud").await.unwrap();
        let c = cache.get_token("ns1", "sa1", "other").await.unwrap();

        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(issuer.issued.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_cold_calls_issue_once() {
        let issuer = Arc::new(CountingIssuer {
            delay: Some(Duration::from_millis(20)),
            ..Default::default()
        });
        let cache = Arc::new(cache_with(issuer.clone()));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_token("ns1", "sa1", "aud").await })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "tok-1");
        }
        assert_eq!(issuer.issued.load(Ordering::SeqCst), 1);
        let expiry = cache.expires_at("ns1", "sa1", "aud").unwrap();
        assert!(expiry > Instant::now());
    }

    #[tokio::test(start_paused = true)]
    async fn test_issuance_error_propagates_and_is_not_cached() {
        let issuer = Arc::new(CountingIssuer {
            fail: true,
            ..Default::default()
        });
        let cache = cache_with(issuer.clone());

        let err = cache.get_token("ns1", "sa1", "aud").await.unwrap_err();
        assert!(matches!(err, ObserverError::TokenIssuance { .. }));
        assert!(cache.expires_at("ns1", "sa1", "aud").is_none());
    }
}
