//! Order creation and notification handling.
//!
//! [`OrderGateway`] is transport-agnostic: routes hand it the client identity
//! and the decoded body, and map its results onto HTTP responses.

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

use upay::constants::SIGNATURE_FIELD;
use upay::order::{new_order_id, now_ms, MerchantProfile, NotificationMessage, OrderCreationRequest};
use upay::sign::{verify, SignableMessage, SignedMessage};
use upay::{OrderProcessor, RateLimiter};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::metrics;

/// Signing and order parameters the gateway needs from configuration.
#[derive(Clone)]
pub struct GatewaySettings {
    pub secret: String,
    pub ui_base: String,
    pub merchant: MerchantProfile,
    pub order_id_prefix: String,
    pub upstream_timeout: Duration,
}

impl From<&GatewayConfig> for GatewaySettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            secret: config.payment_key.clone(),
            ui_base: config.ui_base.clone(),
            merchant: config.merchant.clone(),
            order_id_prefix: config.order_id_prefix.clone(),
            upstream_timeout: config.upstream_timeout,
        }
    }
}

pub struct OrderGateway {
    limiter: RateLimiter,
    processor: Arc<dyn OrderProcessor>,
    settings: GatewaySettings,
}

impl OrderGateway {
    pub fn new(
        limiter: RateLimiter,
        processor: Arc<dyn OrderProcessor>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            limiter,
            processor,
            settings,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Fresh merchant order id with the configured prefix.
    pub fn new_order_id(&self) -> String {
        new_order_id(&self.settings.order_id_prefix)
    }

    /// Create an order at the processor on behalf of `identity`.
    ///
    /// Returns the payer redirect URL: the UI base followed by the
    /// processor-assigned order id. The processor is called once, bounded by
    /// the upstream timeout; nothing is retried or rolled back.
    pub async fn create_order(
        &self,
        identity: Option<&str>,
        oid: &str,
        uid: &str,
        amount: f64,
    ) -> Result<String, GatewayError> {
        let identity = identity
            .filter(|s| !s.is_empty())
            .ok_or(GatewayError::MissingIdentity)?;

        if !self.limiter.allow(identity).await {
            metrics::RATE_LIMITED_TOTAL.inc();
            tracing::info!(identity = %identity, "order creation rate limited");
            return Err(GatewayError::RateLimited);
        }

        let mut order =
            OrderCreationRequest::new(&self.settings.merchant, oid, uid, amount, now_ms());
        order.sign_with(&self.settings.secret);
        tracing::debug!(oid = %order.oid, nonce = %order.nonce, "order signed");

        let start = Instant::now();
        let outcome = tokio::time::timeout(
            self.settings.upstream_timeout,
            self.processor.create_order(&order),
        )
        .await;
        metrics::UPSTREAM_LATENCY.observe(start.elapsed().as_secs_f64());

        let upstream_id = match outcome {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => {
                metrics::ORDERS_TOTAL.with_label_values(&["rejected"]).inc();
                tracing::warn!(oid = %order.oid, error = %e, "order creation failed");
                return Err(GatewayError::UpstreamRejected(e.to_string()));
            }
            Err(_) => {
                metrics::ORDERS_TOTAL.with_label_values(&["timeout"]).inc();
                tracing::warn!(
                    oid = %order.oid,
                    timeout_secs = self.settings.upstream_timeout.as_secs_f64(),
                    "order creation timed out"
                );
                return Err(GatewayError::UpstreamTimeout);
            }
        };

        metrics::ORDERS_TOTAL.with_label_values(&["created"]).inc();
        tracing::info!(oid = %order.oid, upstream_id = %upstream_id, "order created");
        Ok(format!("{}{}", self.settings.ui_base, upstream_id))
    }

    /// Check a notification's signature over its own fields.
    ///
    /// `Ok(false)` means the digest did not match, including when `sign` is
    /// missing or not a string. Non-scalar fields are a malformed body.
    pub fn handle_notification(&self, mut body: Map<String, Value>) -> Result<bool, GatewayError> {
        let claimed = match body.remove(SIGNATURE_FIELD) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };

        let fields = match SignableMessage::from_json_object(&body) {
            Ok(fields) => fields,
            Err(e) => {
                metrics::NOTIFICATIONS_TOTAL
                    .with_label_values(&["malformed"])
                    .inc();
                return Err(e.into());
            }
        };

        let accepted = claimed
            .as_deref()
            .is_some_and(|claimed| verify(&fields, claimed, &self.settings.secret));

        let note: Option<NotificationMessage> = serde_json::from_value(Value::Object(body)).ok();
        let (oid, upstream_id, status) = note
            .map(|n| (n.oid, n.id, n.status))
            .unwrap_or_default();

        if accepted {
            metrics::NOTIFICATIONS_TOTAL
                .with_label_values(&["success"])
                .inc();
            tracing::info!(oid = %oid, upstream_id = %upstream_id, status, "[notify] success");
        } else {
            metrics::NOTIFICATIONS_TOTAL.with_label_values(&["failed"]).inc();
            tracing::warn!(
                oid = %oid,
                upstream_id = %upstream_id,
                signed = claimed.is_some(),
                "[notify] failed"
            );
        }
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use upay::{InMemoryCounterStore, UpstreamError};

    const SECRET: &str = "gateway-test-secret";

    enum Reply {
        Accept(&'static str),
        Reject,
        Hang,
    }

    struct StubProcessor {
        reply: Reply,
        seen: Mutex<Vec<OrderCreationRequest>>,
    }

    #[async_trait]
    impl OrderProcessor for StubProcessor {
        async fn create_order(
            &self,
            order: &OrderCreationRequest,
        ) -> Result<String, UpstreamError> {
            self.seen.lock().unwrap().push(order.clone());
            match self.reply {
                Reply::Accept(id) => Ok(id.to_string()),
                Reply::Reject => Err(UpstreamError::Rejected {
                    code: 0,
                    message: "rejected".into(),
                }),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok("late".into())
                }
            }
        }
    }

    fn settings() -> GatewaySettings {
        GatewaySettings {
            secret: SECRET.into(),
            ui_base: "https://pay.upay.example/order/".into(),
            merchant: MerchantProfile {
                mch_id: "1".into(),
                memo: "testpayment".into(),
                notify_url: "https://edge.example/notify".into(),
                redirect_url: "https://shop.example/done".into(),
            },
            order_id_prefix: "TEST".into(),
            upstream_timeout: Duration::from_secs(5),
        }
    }

    fn gateway(reply: Reply) -> (OrderGateway, Arc<StubProcessor>) {
        let processor = Arc::new(StubProcessor {
            reply,
            seen: Mutex::new(Vec::new()),
        });
        let limiter = RateLimiter::new(Some(Arc::new(InMemoryCounterStore::new())));
        (
            OrderGateway::new(limiter, processor.clone(), settings()),
            processor,
        )
    }

    fn signed_notification() -> Map<String, Value> {
        let mut note = NotificationMessage {
            oid: "TESTabc".into(),
            id: "UP123".into(),
            uid: "1".into(),
            timestamp: 1_700_000_000_000,
            nonce: "k3j4h5".into(),
            status: 1,
            status_code: 0,
            sign: None,
        };
        note.sign_with(SECRET);
        match serde_json::to_value(note).unwrap() {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_create_order_redirects_to_ui() {
        let (gateway, processor) = gateway(Reply::Accept("UP123"));
        let url = gateway
            .create_order(Some("1.2.3.4"), "TESTabc", "1", 1.23)
            .await
            .unwrap();
        assert_eq!(url, "https://pay.upay.example/order/UP123");

        let seen = processor.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].oid, "TESTabc");
        assert_eq!(seen[0].expired_at - seen[0].timestamp, 3_600_000);
        assert!(seen[0].verify_with(SECRET));
    }

    #[tokio::test]
    async fn test_create_order_requires_identity() {
        let (gateway, processor) = gateway(Reply::Accept("UP123"));
        for identity in [None, Some("")] {
            let err = gateway
                .create_order(identity, "TESTabc", "1", 1.23)
                .await
                .unwrap_err();
            assert!(matches!(err, GatewayError::MissingIdentity));
        }
        assert!(processor.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_rejection() {
        let (gateway, _) = gateway(Reply::Reject);
        let err = gateway
            .create_order(Some("1.2.3.4"), "TESTabc", "1", 1.23)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamRejected(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_timeout() {
        let (gateway, _) = gateway(Reply::Hang);
        let err = gateway
            .create_order(Some("1.2.3.4"), "TESTabc", "1", 1.23)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_before_upstream() {
        let (gateway, processor) = gateway(Reply::Accept("UP1"));
        for _ in 0..5 {
            gateway
                .create_order(Some("9.9.9.9"), "TESTabc", "1", 1.23)
                .await
                .unwrap();
        }
        let err = gateway
            .create_order(Some("9.9.9.9"), "TESTabc", "1", 1.23)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::RateLimited));
        assert_eq!(processor.seen.lock().unwrap().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identity_is_used_verbatim() {
        let (gateway, _) = gateway(Reply::Accept("UP1"));
        for _ in 0..5 {
            gateway
                .create_order(Some("9.9.9.9"), "TESTabc", "1", 1.23)
                .await
                .unwrap();
        }
        assert!(gateway
            .create_order(Some(" 9.9.9.9"), "TESTabc", "1", 1.23)
            .await
            .is_ok());
    }

    #[test]
    fn test_new_order_id_uses_prefix() {
        let (gateway, _) = gateway(Reply::Accept("UP1"));
        assert!(gateway.new_order_id().starts_with("TEST"));
    }

    #[test]
    fn test_notification_verifies() {
        let (gateway, _) = gateway(Reply::Accept("UP1"));
        assert!(gateway.handle_notification(signed_notification()).unwrap());
    }

    #[test]
    fn test_notification_with_flipped_digit_fails() {
        let (gateway, _) = gateway(Reply::Accept("UP1"));
        let mut body = signed_notification();
        let sign = body["sign"].as_str().unwrap().to_string();
        let mut chars: Vec<char> = sign.chars().collect();
        chars[0] = if chars[0] == 'a' { 'b' } else { 'a' };
        body.insert("sign".into(), json!(chars.into_iter().collect::<String>()));
        assert!(!gateway.handle_notification(body).unwrap());
    }

    #[test]
    fn test_notification_tampered_field_fails() {
        let (gateway, _) = gateway(Reply::Accept("UP1"));
        let mut body = signed_notification();
        body.insert("status".into(), json!(2));
        assert!(!gateway.handle_notification(body).unwrap());
    }

    #[test]
    fn test_notification_extra_fields_are_covered() {
        let (gateway, _) = gateway(Reply::Accept("UP1"));
        let mut body = signed_notification();
        body.remove("sign");
        body.insert("amount".into(), json!(1.23));
        let fields = SignableMessage::from_json_object(&body).unwrap();
        body.insert("sign".into(), json!(upay::sign::sign(&fields, SECRET)));
        assert!(gateway.handle_notification(body).unwrap());
    }

    #[test]
    fn test_notification_without_sign_fails() {
        let (gateway, _) = gateway(Reply::Accept("UP1"));
        let mut body = signed_notification();
        body.remove("sign");
        assert!(!gateway.handle_notification(body.clone()).unwrap());

        body.insert("sign".into(), json!(12345));
        assert!(!gateway.handle_notification(body).unwrap());
    }

    #[test]
    fn test_notification_with_nested_value_is_malformed() {
        let (gateway, _) = gateway(Reply::Accept("UP1"));
        let mut body = signed_notification();
        body.insert("meta".into(), json!({"a": 1}));
        let err = gateway.handle_notification(body).unwrap_err();
        assert!(matches!(err, GatewayError::MalformedNotification(_)));
    }
}
