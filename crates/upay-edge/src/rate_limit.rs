use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::{DEFAULT_MAX_ATTEMPTS, DEFAULT_WINDOW, RATE_LIMIT_KEY_PREFIX};
use crate::counter_store::CounterStore;

/// Admission limits for one client identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Attempts admitted per window.
    pub max_attempts: u32,
    /// Counter lifetime, restarted on each admitted attempt.
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            window: DEFAULT_WINDOW,
        }
    }
}

/// Fixed-window limiter over an injected [`CounterStore`].
///
/// Fails open: with no store configured, or when the store errors, every
/// attempt is admitted. The cap is soft under concurrency because the
/// read and the write are separate round trips.
#[derive(Clone)]
pub struct RateLimiter {
    store: Option<Arc<dyn CounterStore>>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(store: Option<Arc<dyn CounterStore>>) -> Self {
        Self {
            store,
            policy: RateLimitPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RateLimitPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Backend name, or `"disabled"` when running without a store.
    pub fn backend(&self) -> &'static str {
        self.store.as_ref().map_or("disabled", |s| s.backend())
    }

    /// Record an attempt by `identity` and report whether it is admitted.
    ///
    /// Denied attempts leave the counter untouched.
    pub async fn allow(&self, identity: &str) -> bool {
        let Some(store) = self.store.as_ref() else {
            return true;
        };
        let key = counter_key(identity);

        let current = match store.get(&key).await {
            Ok(current) => current,
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "counter store read failed, admitting request");
                return true;
            }
        };

        let next = match current {
            None => 1,
            Some(count) if count >= self.policy.max_attempts => {
                tracing::debug!(key = %key, count, "rate limit exceeded");
                return false;
            }
            Some(count) => count + 1,
        };

        if let Err(e) = store.put_with_ttl(&key, next, self.policy.window).await {
            tracing::warn!(error = %e, key = %key, "counter store write failed, admitting request");
        }
        true
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("backend", &self.backend())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Store key for a client identity.
pub fn counter_key(identity: &str) -> String {
    format!("{RATE_LIMIT_KEY_PREFIX}{identity}")
}
