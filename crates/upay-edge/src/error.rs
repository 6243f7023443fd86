use thiserror::Error;

/// Errors building a [`SignableMessage`](crate::sign::SignableMessage).
#[derive(Debug, Error)]
pub enum SignError {
    /// Only strings, numbers and booleans have a canonical rendering.
    #[error("field `{0}` is not a scalar value")]
    NonScalarField(String),
}

/// Errors returned by a [`CounterStore`](crate::counter_store::CounterStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The backend cannot be reached or opened. Also the variant for
    /// external implementations to report outages with.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

/// Errors talking to the processor's order API.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(String),

    #[error("upstream rejected order (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Any error produced by this crate.
#[derive(Debug, Error)]
pub enum UpayError {
    #[error(transparent)]
    Sign(#[from] SignError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}
