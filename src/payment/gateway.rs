use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde_json::json;
use sha2::Sha256;
use std::time::Duration;
use tracing::warn;

use super::models::{amount_to_minor, GatewayOrder, GatewayPayment};
use crate::error::{AppResult, PaymentError};

type HmacSha256 = Hmac<Sha256>;

/// Narrow contract to the payment gateway. The reconciler only ever talks
/// to this trait; the HTTP client below is the production implementation.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Register an order before checkout; amount is in booking currency.
    async fn create_order(
        &self,
        amount: Decimal,
        currency: &str,
        receipt: &str,
        notes: serde_json::Value,
    ) -> AppResult<GatewayOrder>;

    /// Fetch the authoritative payment record for a gateway payment id.
    async fn fetch_payment(&self, payment_id: &str) -> AppResult<GatewayPayment>;

    /// Verify the checkout callback signature: HMAC-SHA256 over
    /// "{order_id}|{payment_id}" with the API secret, hex encoded.
    fn verify_callback_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;

    /// Verify a webhook delivery: HMAC-SHA256 over the raw body with the
    /// webhook secret, hex encoded.
    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool;
}

/// Reqwest-backed gateway client with bounded timeouts. A slow gateway
/// surfaces as GatewayUnavailable, never as a hung request.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
    webhook_secret: String,
}

impl HttpPaymentGateway {
    pub fn new(
        base_url: String,
        key_id: String,
        key_secret: String,
        webhook_secret: String,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build gateway HTTP client");

        Self {
            client,
            base_url,
            key_id,
            key_secret,
            webhook_secret,
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_order(
        &self,
        amount: Decimal,
        currency: &str,
        receipt: &str,
        notes: serde_json::Value,
    ) -> AppResult<GatewayOrder> {
        let body = json!({
            "amount": amount_to_minor(amount)?,
            "currency": currency,
            "receipt": receipt,
            "notes": notes,
        });

        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(
                PaymentError::GatewayUnavailable(format!("order creation failed: {}", error_text))
                    .into(),
            );
        }

        Ok(response.json::<GatewayOrder>().await?)
    }

    async fn fetch_payment(&self, payment_id: &str) -> AppResult<GatewayPayment> {
        let response = self
            .client
            .get(format!("{}/payments/{}", self.base_url, payment_id))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PaymentError::GatewayUnavailable(format!(
                "payment fetch failed for {}: {}",
                payment_id, error_text
            ))
            .into());
        }

        Ok(response.json::<GatewayPayment>().await?)
    }

    fn verify_callback_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        let payload = format!("{}|{}", order_id, payment_id);
        verify_hmac_hex(self.key_secret.as_bytes(), payload.as_bytes(), signature)
    }

    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        verify_hmac_hex(self.webhook_secret.as_bytes(), body, signature)
    }
}

/// Constant-time HMAC-SHA256 check against a hex-encoded signature.
fn verify_hmac_hex(secret: &[u8], payload: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        warn!("Signature is not valid hex");
        return false;
    };

    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Hex-encoded HMAC-SHA256, used by tests and by the invoice receipt hash.
pub fn sign_hmac_hex(secret: &[u8], payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_roundtrip() {
        let secret = b"test_secret";
        let payload = b"order_ABC|pay_XYZ";
        let signature = sign_hmac_hex(secret, payload);

        assert!(verify_hmac_hex(secret, payload, &signature));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let secret = b"test_secret";
        let signature = sign_hmac_hex(secret, b"order_ABC|pay_XYZ");

        assert!(!verify_hmac_hex(secret, b"order_ABC|pay_OTHER", &signature));
        assert!(!verify_hmac_hex(b"wrong_secret", b"order_ABC|pay_XYZ", &signature));
    }

    #[test]
    fn test_garbage_signature_rejected() {
        assert!(!verify_hmac_hex(b"secret", b"payload", "not-hex!"));
        assert!(!verify_hmac_hex(b"secret", b"payload", ""));
        assert!(!verify_hmac_hex(b"secret", b"payload", "deadbeef"));
    }

    #[test]
    fn test_callback_signature_via_gateway() {
        let gateway = HttpPaymentGateway::new(
            "http://localhost:9999".to_string(),
            "key".to_string(),
            "api_secret".to_string(),
            "webhook_secret".to_string(),
        );

        let signature = sign_hmac_hex(b"api_secret", b"order_1|pay_1");
        assert!(gateway.verify_callback_signature("order_1", "pay_1", &signature));
        assert!(!gateway.verify_callback_signature("order_1", "pay_2", &signature));

        let body = br#"{"event_id":"evt_1"}"#;
        let wh_sig = sign_hmac_hex(b"webhook_secret", body);
        assert!(gateway.verify_webhook_signature(body, &wh_sig));
        assert!(!gateway.verify_webhook_signature(b"{}", &wh_sig));
    }
}
