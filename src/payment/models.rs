use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppResult, PaymentError};

/// Order registered with the gateway before the customer pays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    /// Amount in the gateway's minor unit (paise).
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
}

/// Payment as reported by the gateway's fetch endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayment {
    pub id: String,
    pub order_id: Option<String>,
    /// Amount in the gateway's minor unit (paise).
    pub amount: i64,
    pub currency: String,
    pub method: Option<String>,
    pub status: String,
}

impl GatewayPayment {
    pub fn is_captured(&self) -> bool {
        self.status == "captured"
    }
}

/// Convert a gateway minor-unit amount to the booking currency unit.
/// This is the single place the conversion happens.
pub fn amount_from_minor(minor: i64) -> AppResult<Decimal> {
    if minor < 0 {
        return Err(PaymentError::InvalidAmount(format!("negative amount: {}", minor)).into());
    }
    Ok(Decimal::new(minor, 2))
}

/// Convert a booking-currency amount to the gateway minor unit.
pub fn amount_to_minor(amount: Decimal) -> AppResult<i64> {
    use rust_decimal::prelude::ToPrimitive;
    (amount * Decimal::new(100, 0))
        .round()
        .to_i64()
        .ok_or_else(|| PaymentError::InvalidAmount(format!("amount out of range: {}", amount)).into())
}

/// Client-side verification callback after checkout completes.
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    pub booking_id: Uuid,
    #[validate(length(min = 1))]
    pub gateway_payment_id: String,
    #[validate(length(min = 1))]
    pub gateway_order_id: String,
    #[validate(length(min = 1))]
    pub signature: String,
}

/// Asynchronous gateway webhook payload. The raw body is signed with the
/// webhook secret; the signature arrives in a header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentWebhookPayload {
    pub event_id: String,
    pub booking_id: Uuid,
    pub payment_id: String,
    pub order_id: Option<String>,
    /// Minor units.
    pub amount: i64,
    pub method: Option<String>,
    pub status: String,
}

/// Webhook acknowledgement - the gateway stops redelivering on 200.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub booking_id: Uuid,
    pub status: String,
    pub amount_paid: Decimal,
    pub remaining_amount: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_minor_unit_conversion() {
        assert_eq!(amount_from_minor(100000).unwrap(), dec!(1000.00));
        assert_eq!(amount_from_minor(1).unwrap(), dec!(0.01));
        assert!(amount_from_minor(-5).is_err());
    }

    #[test]
    fn test_minor_unit_roundtrip() {
        let amount = dec!(15999.50);
        let minor = amount_to_minor(amount).unwrap();
        assert_eq!(minor, 1_599_950);
        assert_eq!(amount_from_minor(minor).unwrap(), amount);
    }
}
