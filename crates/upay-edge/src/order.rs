use serde::{Deserialize, Serialize};

use crate::constants::ORDER_TTL_MS;
use crate::sign::{hex, SignableMessage, SignedMessage};

/// Merchant-level fields copied into every order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerchantProfile {
    pub mch_id: String,
    pub memo: String,
    /// Where the processor posts payment notifications.
    pub notify_url: String,
    /// Where the processor sends the payer after checkout.
    pub redirect_url: String,
}

/// Order payload posted to the processor's order API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreationRequest {
    pub oid: String,
    pub uid: String,
    pub amount: f64,
    pub memo: String,
    /// Milliseconds since the Unix epoch.
    pub expired_at: i64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub nonce: String,
    pub mch_id: String,
    pub notify_url: String,
    pub redirect_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign: Option<String>,
}

impl OrderCreationRequest {
    /// Unsigned order created at `now_ms`, expiring one hour later, with a fresh nonce.
    pub fn new(
        merchant: &MerchantProfile,
        oid: impl Into<String>,
        uid: impl Into<String>,
        amount: f64,
        now_ms: i64,
    ) -> Self {
        Self {
            oid: oid.into(),
            uid: uid.into(),
            amount,
            memo: merchant.memo.clone(),
            expired_at: now_ms.saturating_add(ORDER_TTL_MS),
            timestamp: now_ms,
            nonce: new_nonce(),
            mch_id: merchant.mch_id.clone(),
            notify_url: merchant.notify_url.clone(),
            redirect_url: merchant.redirect_url.clone(),
            sign: None,
        }
    }
}

impl SignedMessage for OrderCreationRequest {
    fn signable(&self) -> SignableMessage {
        SignableMessage::new()
            .with("oid", self.oid.as_str())
            .with("uid", self.uid.as_str())
            .with("amount", self.amount)
            .with("memo", self.memo.as_str())
            .with("expiredAt", self.expired_at)
            .with("timestamp", self.timestamp)
            .with("nonce", self.nonce.as_str())
            .with("mchId", self.mch_id.as_str())
            .with("notifyUrl", self.notify_url.as_str())
            .with("redirectUrl", self.redirect_url.as_str())
    }

    fn signature(&self) -> Option<&str> {
        self.sign.as_deref()
    }

    fn set_signature(&mut self, signature: String) {
        self.sign = Some(signature);
    }
}

/// Payment status notification posted by the processor.
///
/// Verification runs on the raw JSON object so fields unknown to this struct
/// are still covered; the typed form is for logging and for building
/// notifications in tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    pub oid: String,
    /// Processor-assigned order id.
    pub id: String,
    pub uid: String,
    pub timestamp: i64,
    pub nonce: String,
    pub status: i64,
    pub status_code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign: Option<String>,
}

impl SignedMessage for NotificationMessage {
    fn signable(&self) -> SignableMessage {
        SignableMessage::new()
            .with("oid", self.oid.as_str())
            .with("id", self.id.as_str())
            .with("uid", self.uid.as_str())
            .with("timestamp", self.timestamp)
            .with("nonce", self.nonce.as_str())
            .with("status", self.status)
            .with("statusCode", self.status_code)
    }

    fn signature(&self) -> Option<&str> {
        self.sign.as_deref()
    }

    fn set_signature(&mut self, signature: String) {
        self.sign = Some(signature);
    }
}

/// 128-bit random nonce, hex encoded.
pub fn new_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::fill(&mut bytes);
    hex::encode(bytes)
}

/// Merchant order id: `prefix` followed by 12 random hex characters.
pub fn new_order_id(prefix: &str) -> String {
    let mut bytes = [0u8; 6];
    rand::fill(&mut bytes);
    format!("{prefix}{}", hex::encode(bytes))
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
