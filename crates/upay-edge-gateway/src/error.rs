use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use std::fmt;

#[derive(Debug)]
pub enum GatewayError {
    /// Client identity header absent
    MissingIdentity,
    /// Too many order attempts from this client
    RateLimited,
    /// Processor refused the order or could not be reached
    UpstreamRejected(String),
    /// Processor did not answer within the request deadline
    UpstreamTimeout,
    /// Notification body is not a flat JSON object
    MalformedNotification(String),
    /// Internal error
    Internal(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::MissingIdentity => write!(f, "missing client identity"),
            GatewayError::RateLimited => write!(f, "rate limited"),
            GatewayError::UpstreamRejected(msg) => write!(f, "upstream rejected order: {}", msg),
            GatewayError::UpstreamTimeout => write!(f, "upstream timed out"),
            GatewayError::MalformedNotification(msg) => {
                write!(f, "malformed notification: {}", msg)
            }
            GatewayError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<upay::SignError> for GatewayError {
    fn from(e: upay::SignError) -> Self {
        GatewayError::MalformedNotification(e.to_string())
    }
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MissingIdentity | GatewayError::MalformedNotification(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            // The processor's integration expects 200 here; the body carries the failure.
            GatewayError::UpstreamRejected(_) | GatewayError::UpstreamTimeout => StatusCode::OK,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            GatewayError::MissingIdentity => "No ip",
            GatewayError::RateLimited => "Too many requests",
            GatewayError::UpstreamRejected(_) | GatewayError::UpstreamTimeout => {
                "Create order failed"
            }
            GatewayError::MalformedNotification(_) => "Invalid notification",
            GatewayError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal error"
            }
        };
        HttpResponse::build(self.status_code())
            .content_type("text/plain; charset=utf-8")
            .body(body)
    }
}
