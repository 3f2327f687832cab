use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,

    /// Payment gateway credentials
    pub gateway_base_url: String,
    pub gateway_key_id: String,
    pub gateway_key_secret: String,
    pub gateway_webhook_secret: String,

    /// Email delivery
    pub email_api_key: String,
    pub email_from: String,

    /// Reservation hold window for unpaid bookings (minutes)
    pub session_hold_minutes: i64,
    /// Expiry sweep interval (minutes)
    pub expiry_sweep_minutes: u64,
    /// UTC hour at which the auto-cancel sweep runs (0-23)
    pub auto_cancel_hour: u32,

    /// Partial payment: initial tranche as a fraction of total (default 20%)
    pub partial_initial_percent: u32,
    /// Days before departure when the remaining balance falls due
    pub final_due_days: i64,
    /// Flat non-refundable deposit for full-payment bookings
    pub booking_deposit: Decimal,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/trek_backend".to_string()),
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            gateway_base_url: std::env::var("GATEWAY_BASE_URL")
                .unwrap_or_else(|_| "https://api.razorpay.com/v1".to_string()),
            gateway_key_id: std::env::var("GATEWAY_KEY_ID").unwrap_or_default(),
            gateway_key_secret: std::env::var("GATEWAY_KEY_SECRET").unwrap_or_default(),
            gateway_webhook_secret: std::env::var("GATEWAY_WEBHOOK_SECRET").unwrap_or_default(),
            email_api_key: std::env::var("EMAIL_API_KEY").unwrap_or_default(),
            email_from: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "bookings@example.com".to_string()),
            session_hold_minutes: parse_env("SESSION_HOLD_MINUTES", 30),
            expiry_sweep_minutes: parse_env("EXPIRY_SWEEP_MINUTES", 15),
            auto_cancel_hour: parse_env("AUTO_CANCEL_HOUR", 2),
            partial_initial_percent: parse_env("PARTIAL_INITIAL_PERCENT", 20),
            final_due_days: parse_env("FINAL_DUE_DAYS", 30),
            booking_deposit: std::env::var("BOOKING_DEPOSIT")
                .ok()
                .and_then(|v| Decimal::from_str(&v).ok())
                .unwrap_or_else(|| Decimal::new(500, 0)),
        })
    }
}

fn parse_env<T: FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
