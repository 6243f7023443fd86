use std::sync::Arc;

use upay::{
    CounterStore, HttpOrderProcessor, InMemoryCounterStore, OrderProcessor, RateLimiter,
    SqliteCounterStore,
};

use crate::config::{CounterBackend, GatewayConfig};
use crate::error::GatewayError;
use crate::gateway::{GatewaySettings, OrderGateway};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub gateway: Arc<OrderGateway>,
}

impl AppState {
    /// Wire the HTTP order processor and the given counter store.
    pub fn new(
        config: GatewayConfig,
        store: Option<Arc<dyn CounterStore>>,
    ) -> Result<Self, GatewayError> {
        // Backstop only; the per-request deadline is `upstream_timeout`.
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to create HTTP client: {e}")))?;
        let processor = Arc::new(HttpOrderProcessor::new(http_client, config.api_base.clone()));
        Ok(Self::with_processor(config, store, processor))
    }

    pub fn with_processor(
        config: GatewayConfig,
        store: Option<Arc<dyn CounterStore>>,
        processor: Arc<dyn OrderProcessor>,
    ) -> Self {
        let limiter = RateLimiter::new(store).with_policy(config.rate_limit);
        let gateway = OrderGateway::new(limiter, processor, GatewaySettings::from(&config));
        Self {
            config: Arc::new(config),
            gateway: Arc::new(gateway),
        }
    }
}

/// Open the counter store selected by configuration. `None` disables rate limiting.
pub fn open_counter_store(
    backend: &CounterBackend,
) -> Result<Option<Arc<dyn CounterStore>>, upay::UpayError> {
    let store: Arc<dyn CounterStore> = match backend {
        CounterBackend::Memory => Arc::new(InMemoryCounterStore::new()),
        CounterBackend::Sqlite(path) => Arc::new(SqliteCounterStore::open(path)?),
        CounterBackend::Disabled => return Ok(None),
    };
    Ok(Some(store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_counter_store() {
        let memory = open_counter_store(&CounterBackend::Memory).unwrap();
        assert_eq!(memory.unwrap().backend(), "memory");
        assert!(open_counter_store(&CounterBackend::Disabled)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_open_counter_store_reports_unusable_path() {
        let backend = CounterBackend::Sqlite("/nonexistent-upay-dir/counters.db".to_string());
        let err = open_counter_store(&backend).err().unwrap();
        assert!(
            matches!(err, upay::UpayError::Store(upay::StoreError::Unavailable(_))),
            "got {err:?}"
        );
    }
}
