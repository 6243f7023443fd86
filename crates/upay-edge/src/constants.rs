use std::time::Duration;

/// Name of the digest field carried by signed messages.
pub const SIGNATURE_FIELD: &str = "sign";

/// Lifetime of an order at the processor, in milliseconds.
pub const ORDER_TTL_MS: i64 = 3_600_000;

/// Order API path, relative to the processor's API base URL.
pub const ORDER_PATH: &str = "/api/v1/order";

/// `code` value the processor returns for an accepted order.
pub const UPSTREAM_SUCCESS_CODE: i64 = 1;

/// Order creations admitted per client within one window.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Prefix for rate limit counter keys.
pub const RATE_LIMIT_KEY_PREFIX: &str = "rate-limit-";
