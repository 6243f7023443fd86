use async_trait::async_trait;
use serde::Deserialize;

use crate::constants::{ORDER_PATH, UPSTREAM_SUCCESS_CODE};
use crate::error::UpstreamError;
use crate::order::OrderCreationRequest;

/// Order API of the payment processor.
#[async_trait]
pub trait OrderProcessor: Send + Sync {
    /// Submit a signed order. Returns the processor-assigned order id.
    async fn create_order(&self, order: &OrderCreationRequest) -> Result<String, UpstreamError>;
}

/// Response body of `POST /api/v1/order`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderResponse {
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<CreatedOrder>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedOrder {
    pub id: String,
}

impl CreateOrderResponse {
    /// Accepted orders carry `code == 1` and a `data.id`.
    pub fn into_order_id(self) -> Result<String, UpstreamError> {
        match (self.code, self.data) {
            (UPSTREAM_SUCCESS_CODE, Some(data)) => Ok(data.id),
            (UPSTREAM_SUCCESS_CODE, None) => Err(UpstreamError::InvalidResponse(
                "success response without data.id".to_string(),
            )),
            (code, _) => Err(UpstreamError::Rejected {
                code,
                message: self.message.unwrap_or_default(),
            }),
        }
    }
}

/// [`OrderProcessor`] over HTTP.
///
/// One attempt per order, no retries. Bounding the call is left to the caller
/// and to the client's own timeout.
#[derive(Debug, Clone)]
pub struct HttpOrderProcessor {
    client: reqwest::Client,
    api_base: String,
}

impl HttpOrderProcessor {
    pub fn new(client: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into(),
        }
    }

    pub fn order_url(&self) -> String {
        format!("{}{}", self.api_base.trim_end_matches('/'), ORDER_PATH)
    }
}

#[async_trait]
impl OrderProcessor for HttpOrderProcessor {
    async fn create_order(&self, order: &OrderCreationRequest) -> Result<String, UpstreamError> {
        let body = serde_json::to_vec(order)?;

        let response = self
            .client
            .post(self.order_url())
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| UpstreamError::Transport(format!("failed to read response: {e}")))?;

        // The processor reports rejections in the body; the status code is not authoritative.
        let parsed: CreateOrderResponse = serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                status = %status,
                body = %text,
                "processor returned an unparseable order response"
            );
            UpstreamError::InvalidResponse(e.to_string())
        })?;

        tracing::debug!(status = %status, code = parsed.code, oid = %order.oid, "processor responded");
        parsed.into_order_id()
    }
}
