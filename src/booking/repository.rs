use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{types::Json, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::models::{
    Booking, BookingStatus, CancelActor, FailedBooking, Participant, PaymentMode,
    PromoCodeDetails, RefundStatus,
};
use crate::error::{AppError, AppResult, BookingError};

/// Everything needed to insert a booking row; assembled by the service.
pub struct NewBooking {
    pub user_id: Uuid,
    pub trek_id: Uuid,
    pub batch_id: Uuid,
    pub number_of_participants: i32,
    pub payment_mode: PaymentMode,
    pub total_price: Decimal,
    pub initial_amount: Option<Decimal>,
    pub remaining_amount: Option<Decimal>,
    pub final_payment_due_date: Option<DateTime<Utc>>,
    pub auto_cancel_on_due_date: bool,
    pub session_expires_at: DateTime<Utc>,
    pub promo_code_details: Option<PromoCodeDetails>,
}

/// Booking repository - source of truth for booking rows
pub struct BookingRepository {
    pub pool: PgPool,
}

impl BookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn begin_tx(&self) -> AppResult<Transaction<'_, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    // ========== CREATE / READ ==========

    pub async fn create(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        new: NewBooking,
    ) -> AppResult<Booking> {
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            INSERT INTO bookings (
                user_id, trek_id, batch_id, number_of_participants,
                payment_mode, total_price,
                initial_amount, remaining_amount, final_payment_due_date,
                auto_cancel_on_due_date, session_expires_at, promo_code_details
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(new.user_id)
        .bind(new.trek_id)
        .bind(new.batch_id)
        .bind(new.number_of_participants)
        .bind(new.payment_mode)
        .bind(new.total_price)
        .bind(new.initial_amount)
        .bind(new.remaining_amount)
        .bind(new.final_payment_due_date)
        .bind(new.auto_cancel_on_due_date)
        .bind(new.session_expires_at)
        .bind(new.promo_code_details.map(Json))
        .fetch_one(&mut **tx)
        .await?;

        Ok(booking)
    }

    pub async fn get(&self, booking_id: Uuid) -> AppResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(booking)
    }

    /// Row-locked fetch for the payment path, so a duplicated gateway
    /// callback and a concurrent sweep serialize on the booking.
    pub async fn get_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        booking_id: Uuid,
    ) -> AppResult<Option<Booking>> {
        let booking =
            sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1 FOR UPDATE")
                .bind(booking_id)
                .fetch_optional(&mut **tx)
                .await?;

        Ok(booking)
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<Booking>> {
        let bookings = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(bookings)
    }

    // ========== GUARDED MUTATIONS ==========

    /// Move a booking between states, validated against the transition
    /// table and guarded by `WHERE status = $from` so a lost race surfaces
    /// as InvalidStateTransition instead of a silent double-apply.
    pub async fn update_status(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        booking_id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> AppResult<()> {
        from.validate_transition(to)?;

        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(booking_id)
        .bind(from)
        .bind(to)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Booking(BookingError::InvalidStateTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            }));
        }

        Ok(())
    }

    /// Apply a verified payment's bookkeeping in one statement: status,
    /// cumulative amount paid, recomputed remaining balance, and (for a
    /// final balance) the settlement date stamp.
    #[allow(clippy::too_many_arguments)]
    pub async fn apply_payment(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        booking_id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        amount_paid: Decimal,
        remaining_amount: Option<Decimal>,
        final_payment_date: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        // A same-state update (underpayment re-arm, mid-partial top-up)
        // only moves the amounts; it is not a transition.
        if from != to {
            from.validate_transition(to)?;
        }

        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = $3,
                amount_paid = $4,
                remaining_amount = $5,
                final_payment_date = COALESCE($6, final_payment_date),
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(booking_id)
        .bind(from)
        .bind(to)
        .bind(amount_paid)
        .bind(remaining_amount)
        .bind(final_payment_date)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Booking(BookingError::InvalidStateTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            }));
        }

        Ok(())
    }

    pub async fn set_gateway_order(&self, booking_id: Uuid, order_id: &str) -> AppResult<()> {
        sqlx::query("UPDATE bookings SET gateway_order_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(booking_id)
            .bind(order_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn set_participant_details(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        booking_id: Uuid,
        details: &[Participant],
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE bookings SET participant_details = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(booking_id)
        .bind(Json(details))
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Record a cancellation. Guarded the same way as update_status.
    #[allow(clippy::too_many_arguments)]
    pub async fn mark_cancelled(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        booking_id: Uuid,
        from: BookingStatus,
        reason: &str,
        actor: CancelActor,
        refund_amount: Decimal,
        refund_status: RefundStatus,
    ) -> AppResult<()> {
        from.validate_transition(BookingStatus::Cancelled)?;

        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = 'cancelled',
                cancellation_reason = $3,
                cancelled_at = NOW(),
                cancelled_by = $4,
                refund_amount = $5,
                refund_status = $6,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(booking_id)
        .bind(from)
        .bind(reason)
        .bind(actor)
        .bind(refund_amount)
        .bind(refund_status)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Booking(BookingError::InvalidStateTransition {
                from: from.as_str().to_string(),
                to: BookingStatus::Cancelled.as_str().to_string(),
            }));
        }

        Ok(())
    }

    /// Post-travel advance: when a batch completes, its confirmed bookings
    /// become trek_completed. Set-based; bookings in any other state are
    /// untouched.
    pub async fn complete_for_batch(&self, batch_id: Uuid) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = 'trek_completed', updated_at = NOW()
            WHERE batch_id = $1 AND status = 'confirmed'
            "#,
        )
        .bind(batch_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // ========== PAYMENT EVENT DEDUP ==========

    /// Insert the idempotency marker for a gateway payment. Returns false
    /// when the payment id was seen before - the caller must treat the
    /// whole call as an already-settled no-op.
    pub async fn insert_payment_event(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        booking_id: Uuid,
        gateway_payment_id: &str,
        gateway_order_id: Option<&str>,
        amount: Decimal,
        method: Option<&str>,
        applied_transition: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO payment_events (
                booking_id, gateway_payment_id, gateway_order_id,
                amount, method, applied_transition
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (gateway_payment_id) DO NOTHING
            "#,
        )
        .bind(booking_id)
        .bind(gateway_payment_id)
        .bind(gateway_order_id)
        .bind(amount)
        .bind(method)
        .bind(applied_transition)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    // ========== SWEEP QUERIES ==========

    /// Reservations past their hold window: explicit session expiry passed,
    /// or no stamp and older than the fallback window.
    pub async fn list_expired_pending(&self, fallback_hold_minutes: i64) -> AppResult<Vec<Booking>> {
        let bookings = sqlx::query_as::<_, Booking>(
            r#"
            SELECT * FROM bookings
            WHERE status = 'pending_payment'
              AND (
                session_expires_at <= NOW()
                OR (session_expires_at IS NULL AND created_at <= NOW() - make_interval(mins => $1))
              )
            ORDER BY created_at
            "#,
        )
        .bind(fallback_hold_minutes as i32)
        .fetch_all(&self.pool)
        .await?;

        Ok(bookings)
    }

    /// Partially-paid bookings past their final-payment due date where BOTH
    /// the booking and its batch opt in to auto-cancellation.
    pub async fn list_overdue_partials(&self) -> AppResult<Vec<Booking>> {
        let bookings = sqlx::query_as::<_, Booking>(
            r#"
            SELECT b.* FROM bookings b
            JOIN batches ba ON ba.id = b.batch_id
            WHERE b.payment_mode = 'partial'
              AND b.status = 'payment_confirmed_partial'
              AND b.final_payment_due_date < NOW()
              AND b.auto_cancel_on_due_date = TRUE
              AND ba.auto_cancel_overdue = TRUE
            ORDER BY b.final_payment_due_date
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(bookings)
    }

    // ========== EXPIRY ARCHIVAL ==========

    /// Remove an expired reservation and snapshot it into the archive in
    /// one transaction. The guarded DELETE means a payment that landed
    /// between selection and archival wins the race: zero rows come back
    /// and the sweep skips the booking.
    pub async fn archive_expired(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        booking_id: Uuid,
        failure_reason: &str,
        archived_by: &str,
    ) -> AppResult<Option<Booking>> {
        let deleted = sqlx::query_as::<_, Booking>(
            r#"
            DELETE FROM bookings
            WHERE id = $1 AND status = 'pending_payment'
            RETURNING *
            "#,
        )
        .bind(booking_id)
        .fetch_optional(&mut **tx)
        .await?;

        let Some(booking) = deleted else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            INSERT INTO failed_bookings (
                booking_id, user_id, trek_id, batch_id, number_of_participants,
                payment_mode, total_price, failure_reason, failure_details,
                original_created_at, original_expires_at, archived_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(booking.id)
        .bind(booking.user_id)
        .bind(booking.trek_id)
        .bind(booking.batch_id)
        .bind(booking.number_of_participants)
        .bind(booking.payment_mode)
        .bind(booking.total_price)
        .bind(failure_reason)
        .bind(serde_json::json!({
            "amount_paid": booking.amount_paid,
            "gateway_order_id": booking.gateway_order_id,
        }))
        .bind(booking.created_at)
        .bind(booking.session_expires_at)
        .bind(archived_by)
        .execute(&mut **tx)
        .await?;

        Ok(Some(booking))
    }

    pub async fn list_failed_for_batch(&self, batch_id: Uuid) -> AppResult<Vec<FailedBooking>> {
        let failed = sqlx::query_as::<_, FailedBooking>(
            "SELECT * FROM failed_bookings WHERE batch_id = $1 ORDER BY archived_at DESC",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(failed)
    }
}
