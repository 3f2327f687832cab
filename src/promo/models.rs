use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

/// Discount instrument. `used_count` increases by exactly one per distinct
/// successfully verified payment event that referenced the code - never per
/// retry of the same event.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PromoCode {
    pub id: Uuid,
    pub code: String,
    pub discount_type: String,
    pub discount_value: Decimal,
    pub max_uses: Option<i32>,
    pub used_count: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub min_order_value: Decimal,
    pub applicable_treks: Vec<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl PromoCode {
    /// Validity check at booking-creation time. Returns the rejection
    /// reason so callers can surface it verbatim.
    pub fn check_applicable(
        &self,
        trek_id: Uuid,
        order_value: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), &'static str> {
        if !self.is_active {
            return Err("code is inactive");
        }
        if now < self.valid_from {
            return Err("code is not yet valid");
        }
        if now > self.valid_until {
            return Err("code has expired");
        }
        if let Some(max) = self.max_uses {
            if self.used_count >= max {
                return Err("code has been fully redeemed");
            }
        }
        if order_value < self.min_order_value {
            return Err("order below minimum value for this code");
        }
        if !self.applicable_treks.is_empty() && !self.applicable_treks.contains(&trek_id) {
            return Err("code does not apply to this trek");
        }
        Ok(())
    }

    /// Discount for an order, clamped so the payable amount never goes
    /// negative.
    pub fn discount_for(&self, order_value: Decimal) -> Decimal {
        let raw = match self.discount_type.as_str() {
            "percentage" => order_value * self.discount_value / Decimal::new(100, 0),
            _ => self.discount_value,
        };
        raw.min(order_value).max(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn promo(discount_type: &str, value: Decimal) -> PromoCode {
        let now = Utc::now();
        PromoCode {
            id: Uuid::new_v4(),
            code: "TREK10".to_string(),
            discount_type: discount_type.to_string(),
            discount_value: value,
            max_uses: Some(5),
            used_count: 0,
            valid_from: now - chrono::Duration::days(1),
            valid_until: now + chrono::Duration::days(1),
            min_order_value: Decimal::new(1000, 0),
            applicable_treks: vec![],
            is_active: true,
            created_at: now,
        }
    }

    #[test]
    fn test_percentage_discount() {
        let p = promo("percentage", Decimal::new(10, 0));
        assert_eq!(p.discount_for(Decimal::new(5000, 0)), Decimal::new(500, 0));
    }

    #[test]
    fn test_fixed_discount_clamped_to_order() {
        let p = promo("fixed", Decimal::new(2000, 0));
        assert_eq!(p.discount_for(Decimal::new(1500, 0)), Decimal::new(1500, 0));
    }

    #[test]
    fn test_applicability_checks() {
        let now = Utc::now();
        let trek = Uuid::new_v4();
        let mut p = promo("fixed", Decimal::new(100, 0));

        assert!(p.check_applicable(trek, Decimal::new(2000, 0), now).is_ok());
        assert!(p.check_applicable(trek, Decimal::new(500, 0), now).is_err());

        p.used_count = 5;
        assert_eq!(
            p.check_applicable(trek, Decimal::new(2000, 0), now),
            Err("code has been fully redeemed")
        );

        p.used_count = 0;
        p.applicable_treks = vec![Uuid::new_v4()];
        assert_eq!(
            p.check_applicable(trek, Decimal::new(2000, 0), now),
            Err("code does not apply to this trek")
        );
    }
}
