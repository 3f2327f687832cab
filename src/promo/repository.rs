use sqlx::{PgPool, Postgres, Transaction};
use tracing::warn;
use uuid::Uuid;

use super::models::PromoCode;
use crate::error::AppResult;

/// Promo code repository
pub struct PromoRepository {
    pool: PgPool,
}

impl PromoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_by_code(&self, code: &str) -> AppResult<Option<PromoCode>> {
        let promo = sqlx::query_as::<_, PromoCode>("SELECT * FROM promo_codes WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        Ok(promo)
    }

    /// Count one redemption, looked up by id first and by code as a
    /// fallback. Runs inside the payment transaction whose payment-event
    /// insert already deduplicates retries, so this fires exactly once per
    /// distinct verified payment. The max_uses guard is kept in the UPDATE
    /// itself: an exhausted code simply stops counting.
    pub async fn increment_usage(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        promo_id: Uuid,
        code: &str,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE promo_codes
            SET used_count = used_count + 1
            WHERE id = $1 AND (max_uses IS NULL OR used_count < max_uses)
            "#,
        )
        .bind(promo_id)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        // Fallback lookup by code, for bookings created before the code was
        // re-issued under a new id.
        let result = sqlx::query(
            r#"
            UPDATE promo_codes
            SET used_count = used_count + 1
            WHERE code = $1 AND (max_uses IS NULL OR used_count < max_uses)
            "#,
        )
        .bind(code)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            warn!(
                "Promo usage not counted for code {} ({}): missing or fully redeemed",
                code, promo_id
            );
        }

        Ok(())
    }
}
