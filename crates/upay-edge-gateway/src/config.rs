use std::env;
use std::time::Duration;
use url::Url;

use upay::constants::{DEFAULT_MAX_ATTEMPTS, DEFAULT_WINDOW};
use upay::order::MerchantProfile;
use upay::rate_limit::RateLimitPolicy;

const DEFAULT_PORT: u16 = 8787;
const DEFAULT_MCH_ID: &str = "1";
const DEFAULT_MEMO: &str = "testpayment";
const DEFAULT_ORDER_ID_PREFIX: &str = "TEST";
const DEFAULT_ORDER_USER_ID: &str = "1";
const DEFAULT_ORDER_AMOUNT: f64 = 1.23;
const DEFAULT_CLIENT_IP_HEADER: &str = "cf-connecting-ip";
const DEFAULT_RATE_LIMIT_DB_PATH: &str = "./upay-rate-limit.db";
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;
const MIN_SECRET_LEN: usize = 16;

/// Where rate limit counters live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterBackend {
    Memory,
    Sqlite(String),
    /// No store: the limiter admits everything.
    Disabled,
}

#[derive(Clone)]
pub struct GatewayConfig {
    /// Processor API base URL (`UPAY_API`)
    pub api_base: String,
    /// Prefix the processor order id is appended to for the payer redirect (`UPAY_UI`)
    pub ui_base: String,
    /// Shared signing secret (`UPAY_PAYMENT_KEY`)
    pub payment_key: String,
    pub merchant: MerchantProfile,
    pub order_id_prefix: String,
    /// uid sent for orders created through `/create-order`
    pub order_user_id: String,
    /// amount sent for orders created through `/create-order`
    pub order_amount: f64,
    /// Header carrying the connecting client's address
    pub client_ip_header: String,
    pub counter_backend: CounterBackend,
    pub rate_limit: RateLimitPolicy,
    pub upstream_timeout: Duration,
    pub port: u16,
    /// Bearer token required for /metrics (None = see `public_metrics`)
    pub metrics_token: Option<String>,
    pub public_metrics: bool,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_base", &self.api_base)
            .field("ui_base", &self.ui_base)
            .field("payment_key", &"[REDACTED]")
            .field("merchant", &self.merchant)
            .field("order_id_prefix", &self.order_id_prefix)
            .field("order_user_id", &self.order_user_id)
            .field("order_amount", &self.order_amount)
            .field("client_ip_header", &self.client_ip_header)
            .field("counter_backend", &self.counter_backend)
            .field("rate_limit", &self.rate_limit)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("port", &self.port)
            .field(
                "metrics_token",
                &self.metrics_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("public_metrics", &self.public_metrics)
            .finish()
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::MissingRequired(key));

        let api_base = require("UPAY_API")?;
        Url::parse(&api_base).map_err(|_| ConfigError::InvalidUrl(api_base.clone()))?;

        let ui_base = require("UPAY_UI")?;
        Url::parse(&ui_base).map_err(|_| ConfigError::InvalidUrl(ui_base.clone()))?;

        let notify_url = require("UPAY_NOTIFY")?;
        let redirect_url = require("UPAY_REDIRECT")?;

        let payment_key = require("UPAY_PAYMENT_KEY")?;
        if payment_key.len() < MIN_SECRET_LEN {
            tracing::warn!(
                "UPAY_PAYMENT_KEY is short ({} bytes); signatures are only as strong as this secret",
                payment_key.len()
            );
        }

        let merchant = MerchantProfile {
            mch_id: get("UPAY_MCH_ID").unwrap_or_else(|| DEFAULT_MCH_ID.to_string()),
            memo: get("UPAY_MEMO").unwrap_or_else(|| DEFAULT_MEMO.to_string()),
            notify_url,
            redirect_url,
        };

        let order_id_prefix =
            get("ORDER_ID_PREFIX").unwrap_or_else(|| DEFAULT_ORDER_ID_PREFIX.to_string());
        let order_user_id =
            get("ORDER_USER_ID").unwrap_or_else(|| DEFAULT_ORDER_USER_ID.to_string());

        let order_amount = match get("ORDER_AMOUNT") {
            Some(raw) => raw
                .parse::<f64>()
                .ok()
                .filter(|a| a.is_finite() && *a > 0.0)
                .ok_or(ConfigError::InvalidNumber("ORDER_AMOUNT", raw))?,
            None => DEFAULT_ORDER_AMOUNT,
        };

        let client_ip_header = get("CLIENT_IP_HEADER")
            .unwrap_or_else(|| DEFAULT_CLIENT_IP_HEADER.to_string())
            .to_ascii_lowercase();

        let counter_backend = match get("RATE_LIMIT_STORE").as_deref() {
            None | Some("memory") => CounterBackend::Memory,
            Some("sqlite") => CounterBackend::Sqlite(
                get("RATE_LIMIT_DB_PATH")
                    .unwrap_or_else(|| DEFAULT_RATE_LIMIT_DB_PATH.to_string()),
            ),
            Some("none") => CounterBackend::Disabled,
            Some(other) => return Err(ConfigError::InvalidStore(other.to_string())),
        };

        let rate_limit = RateLimitPolicy {
            max_attempts: parse_or("RATE_LIMIT_MAX", get("RATE_LIMIT_MAX"), DEFAULT_MAX_ATTEMPTS)?,
            window: Duration::from_secs(parse_or(
                "RATE_LIMIT_WINDOW_SECS",
                get("RATE_LIMIT_WINDOW_SECS"),
                DEFAULT_WINDOW.as_secs(),
            )?),
        };
        if rate_limit.max_attempts == 0 || rate_limit.window.is_zero() {
            return Err(ConfigError::InvalidNumber(
                "RATE_LIMIT_MAX/RATE_LIMIT_WINDOW_SECS",
                "0".to_string(),
            ));
        }

        let upstream_timeout = Duration::from_secs(parse_or(
            "UPSTREAM_TIMEOUT_SECS",
            get("UPSTREAM_TIMEOUT_SECS"),
            DEFAULT_UPSTREAM_TIMEOUT_SECS,
        )?);

        let port = parse_or("PORT", get("PORT"), DEFAULT_PORT)?;

        let metrics_token = get("METRICS_TOKEN");
        let public_metrics = get("UPAY_PUBLIC_METRICS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        if counter_backend == CounterBackend::Disabled {
            tracing::warn!("RATE_LIMIT_STORE=none, /create-order is not rate limited");
        }

        Ok(Self {
            api_base,
            ui_base,
            payment_key,
            merchant,
            order_id_prefix,
            order_user_id,
            order_amount,
            client_ip_header,
            counter_backend,
            rate_limit,
            upstream_timeout,
            port,
            metrics_token,
            public_metrics,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber(key, raw)),
        None => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid value for {0}: {1}")]
    InvalidNumber(&'static str, String),

    #[error("unknown RATE_LIMIT_STORE: {0} (expected memory, sqlite or none)")]
    InvalidStore(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(extra: &[(&str, &str)]) -> HashMap<String, String> {
        let mut map: HashMap<String, String> = [
            ("UPAY_API", "https://api.upay.example"),
            ("UPAY_UI", "https://pay.upay.example/order/"),
            ("UPAY_NOTIFY", "https://edge.example/notify"),
            ("UPAY_REDIRECT", "https://shop.example/done"),
            ("UPAY_PAYMENT_KEY", "0123456789abcdef0123456789abcdef"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in extra {
            map.insert(k.to_string(), v.to_string());
        }
        map
    }

    fn load(map: HashMap<String, String>) -> Result<GatewayConfig, ConfigError> {
        GatewayConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(vars(&[])).unwrap();
        assert_eq!(config.port, 8787);
        assert_eq!(config.merchant.mch_id, "1");
        assert_eq!(config.merchant.memo, "testpayment");
        assert_eq!(config.order_id_prefix, "TEST");
        assert_eq!(config.order_amount, 1.23);
        assert_eq!(config.client_ip_header, "cf-connecting-ip");
        assert_eq!(config.counter_backend, CounterBackend::Memory);
        assert_eq!(config.rate_limit, RateLimitPolicy::default());
        assert_eq!(config.upstream_timeout, Duration::from_secs(10));
        assert!(!config.public_metrics);
    }

    #[test]
    fn test_missing_secret() {
        let mut map = vars(&[]);
        map.remove("UPAY_PAYMENT_KEY");
        assert!(matches!(
            load(map),
            Err(ConfigError::MissingRequired("UPAY_PAYMENT_KEY"))
        ));
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let map = vars(&[("UPAY_NOTIFY", "  ")]);
        assert!(matches!(
            load(map),
            Err(ConfigError::MissingRequired("UPAY_NOTIFY"))
        ));
    }

    #[test]
    fn test_invalid_api_url() {
        let map = vars(&[("UPAY_API", "not a url")]);
        assert!(matches!(load(map), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_counter_backends() {
        let sqlite = load(vars(&[
            ("RATE_LIMIT_STORE", "sqlite"),
            ("RATE_LIMIT_DB_PATH", "/tmp/c.db"),
        ]))
        .unwrap();
        assert_eq!(
            sqlite.counter_backend,
            CounterBackend::Sqlite("/tmp/c.db".to_string())
        );

        let none = load(vars(&[("RATE_LIMIT_STORE", "none")])).unwrap();
        assert_eq!(none.counter_backend, CounterBackend::Disabled);

        assert!(matches!(
            load(vars(&[("RATE_LIMIT_STORE", "redis")])),
            Err(ConfigError::InvalidStore(_))
        ));
    }

    #[test]
    fn test_rate_limit_overrides() {
        let config = load(vars(&[
            ("RATE_LIMIT_MAX", "10"),
            ("RATE_LIMIT_WINDOW_SECS", "30"),
        ]))
        .unwrap();
        assert_eq!(config.rate_limit.max_attempts, 10);
        assert_eq!(config.rate_limit.window, Duration::from_secs(30));

        assert!(load(vars(&[("RATE_LIMIT_MAX", "0")])).is_err());
        assert!(load(vars(&[("RATE_LIMIT_MAX", "many")])).is_err());
    }

    #[test]
    fn test_invalid_amount() {
        assert!(load(vars(&[("ORDER_AMOUNT", "-1")])).is_err());
        assert!(load(vars(&[("ORDER_AMOUNT", "abc")])).is_err());
        assert_eq!(
            load(vars(&[("ORDER_AMOUNT", "9.99")])).unwrap().order_amount,
            9.99
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = load(vars(&[("METRICS_TOKEN", "tok-123")])).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("0123456789abcdef"));
        assert!(!debug.contains("tok-123"));
        assert!(debug.contains("[REDACTED]"));
    }
}
