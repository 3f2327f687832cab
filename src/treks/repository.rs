use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{Batch, BatchStatus, Trek};
use crate::error::{AppError, AppResult, BookingError};

/// Trek and batch catalogue repository
pub struct TrekRepository {
    pool: PgPool,
}

impl TrekRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ========== TREK OPERATIONS ==========

    pub async fn create_trek(
        &self,
        name: &str,
        region: &str,
        duration_days: i32,
        difficulty: &str,
        base_price: Decimal,
    ) -> AppResult<Trek> {
        let trek = sqlx::query_as::<_, Trek>(
            r#"
            INSERT INTO treks (name, region, duration_days, difficulty, base_price)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(region)
        .bind(duration_days)
        .bind(difficulty)
        .bind(base_price)
        .fetch_one(&self.pool)
        .await?;

        Ok(trek)
    }

    pub async fn get_trek(&self, trek_id: Uuid) -> AppResult<Option<Trek>> {
        let trek = sqlx::query_as::<_, Trek>("SELECT * FROM treks WHERE id = $1")
            .bind(trek_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(trek)
    }

    pub async fn list_active_treks(&self) -> AppResult<Vec<Trek>> {
        let treks =
            sqlx::query_as::<_, Trek>("SELECT * FROM treks WHERE is_active = TRUE ORDER BY name")
                .fetch_all(&self.pool)
                .await?;

        Ok(treks)
    }

    // ========== BATCH OPERATIONS ==========

    pub async fn create_batch(
        &self,
        trek_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
        price: Decimal,
        max_participants: i32,
        auto_cancel_overdue: bool,
    ) -> AppResult<Batch> {
        let batch = sqlx::query_as::<_, Batch>(
            r#"
            INSERT INTO batches (trek_id, start_date, end_date, price, max_participants, auto_cancel_overdue)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(trek_id)
        .bind(start_date)
        .bind(end_date)
        .bind(price)
        .bind(max_participants)
        .bind(auto_cancel_overdue)
        .fetch_one(&self.pool)
        .await?;

        Ok(batch)
    }

    pub async fn get_batch(&self, batch_id: Uuid) -> AppResult<Option<Batch>> {
        let batch = sqlx::query_as::<_, Batch>("SELECT * FROM batches WHERE id = $1")
            .bind(batch_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(batch)
    }

    pub async fn list_upcoming_batches(&self, trek_id: Uuid) -> AppResult<Vec<Batch>> {
        let batches = sqlx::query_as::<_, Batch>(
            r#"
            SELECT * FROM batches
            WHERE trek_id = $1 AND status = 'upcoming'
            ORDER BY start_date
            "#,
        )
        .bind(trek_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(batches)
    }

    /// Advance a batch's status, guarded by the transition table and a
    /// conditional update so a concurrent advance cannot double-apply.
    pub async fn update_batch_status(
        &self,
        batch_id: Uuid,
        from: BatchStatus,
        to: BatchStatus,
    ) -> AppResult<Batch> {
        from.validate_transition(to)?;

        let batch = sqlx::query_as::<_, Batch>(
            r#"
            UPDATE batches
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(batch_id)
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await?;

        batch.ok_or_else(|| {
            AppError::Booking(BookingError::InvalidStateTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        })
    }
}
