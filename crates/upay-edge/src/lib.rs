//! Message authentication and admission control for the UPay payment processor.
//!
//! UPay authenticates every message in both directions with a digest over a
//! canonical rendering of the message fields plus a shared secret. This crate
//! provides that protocol and the pieces an edge service composes around it:
//!
//! - [`sign`]: canonical serialization, [`sign::sign`] and [`sign::verify`]
//! - [`order`]: the outbound order request and inbound notification messages
//! - [`rate_limit`]: fixed-window per-client limiter over a [`CounterStore`]
//! - [`counter_store`]: in-memory and SQLite counter backends
//! - [`upstream`]: the processor's order API ([`HttpOrderProcessor`])
//!
//! # Quick example
//!
//! ```
//! use upay::sign::{sign, verify, SignableMessage};
//!
//! let fields = SignableMessage::new()
//!     .with("oid", "TESTabc")
//!     .with("uid", "1")
//!     .with("amount", 1.23);
//!
//! let digest = sign(&fields, "secret");
//! assert!(verify(&fields, &digest, "secret"));
//! ```

pub mod constants;
pub mod counter_store;
pub mod error;
pub mod order;
pub mod rate_limit;
pub mod security;
pub mod sign;
pub mod upstream;

pub use counter_store::{CounterStore, InMemoryCounterStore, SqliteCounterStore};
pub use error::{SignError, StoreError, UpayError, UpstreamError};
pub use order::{MerchantProfile, NotificationMessage, OrderCreationRequest};
pub use rate_limit::{RateLimitPolicy, RateLimiter};
pub use sign::{FieldValue, SignableMessage, SignedMessage};
pub use upstream::{HttpOrderProcessor, OrderProcessor};
