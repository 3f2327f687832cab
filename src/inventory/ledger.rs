use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppResult, LedgerError};

/// Seat inventory ledger - the only code path allowed to mutate
/// `batches.current_participants`.
///
/// Admission is a single atomic conditional update: the capacity check and
/// the increment happen in one statement, so two near-simultaneous bookings
/// cannot both win the last seat, and a concurrent reconcile cannot be
/// interleaved with a half-applied reservation.
pub struct SeatLedger {
    pool: PgPool,
    /// Fallback hold window (minutes) for pending bookings that never got a
    /// session expiry stamped.
    fallback_hold_minutes: i64,
}

/// Proof that seats were reserved; carried back by the booking path so the
/// count released on failure always matches the count reserved.
#[derive(Debug, Clone, Copy)]
pub struct SeatReservation {
    pub batch_id: Uuid,
    pub count: i32,
}

impl SeatLedger {
    pub fn new(pool: PgPool, fallback_hold_minutes: i64) -> Self {
        Self {
            pool,
            fallback_hold_minutes,
        }
    }

    /// Atomically claim `count` seats on a batch. Runs inside the caller's
    /// transaction so the seat claim and the booking row commit together.
    pub async fn reserve(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        batch_id: Uuid,
        count: i32,
    ) -> AppResult<SeatReservation> {
        let result = sqlx::query(
            r#"
            UPDATE batches
            SET current_participants = current_participants + $2, updated_at = NOW()
            WHERE id = $1
              AND status = 'upcoming'
              AND current_participants + $2 <= max_participants
            "#,
        )
        .bind(batch_id)
        .bind(count)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::CapacityExceeded {
                batch_id,
                requested: count,
            }
            .into());
        }

        Ok(SeatReservation { batch_id, count })
    }

    /// Return `count` seats to a batch. Clamped at zero: a counter that
    /// would go negative is a sign of prior drift, so it is logged and the
    /// stored value floored rather than propagated.
    pub async fn release(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        batch_id: Uuid,
        count: i32,
    ) -> AppResult<()> {
        let current: Option<i32> = sqlx::query_scalar(
            "SELECT current_participants FROM batches WHERE id = $1 FOR UPDATE",
        )
        .bind(batch_id)
        .fetch_optional(&mut **tx)
        .await?;

        let current = current.ok_or(LedgerError::BatchNotFound(batch_id))?;

        let new_value = if count > current {
            warn!(
                "Seat release would underflow batch {}: {} held, releasing {}; clamping to 0",
                batch_id, current, count
            );
            0
        } else {
            current - count
        };

        sqlx::query(
            "UPDATE batches SET current_participants = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(batch_id)
        .bind(new_value)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Recompute a batch's participant count from the authoritative set of
    /// bookings and overwrite the stored counter. Used by the expiry sweep
    /// to self-heal drift; not part of the admission path.
    ///
    /// Holding bookings are those that have committed money
    /// (payment_confirmed_partial, payment_completed, confirmed,
    /// trek_completed) plus pending reservations whose hold is still valid.
    pub async fn reconcile(&self, batch_id: Uuid) -> AppResult<i32> {
        let mut tx = self.pool.begin().await?;

        let stored: Option<i32> = sqlx::query_scalar(
            "SELECT current_participants FROM batches WHERE id = $1 FOR UPDATE",
        )
        .bind(batch_id)
        .fetch_optional(&mut *tx)
        .await?;

        let stored = stored.ok_or(LedgerError::BatchNotFound(batch_id))?;

        let recomputed: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(number_of_participants), 0)
            FROM bookings
            WHERE batch_id = $1
              AND (
                status IN ('payment_confirmed_partial', 'payment_completed', 'confirmed', 'trek_completed')
                OR (
                  status = 'pending_payment'
                  AND (
                    session_expires_at > NOW()
                    OR (session_expires_at IS NULL AND created_at > NOW() - make_interval(mins => $2))
                  )
                )
              )
            "#,
        )
        .bind(batch_id)
        .bind(self.fallback_hold_minutes as i32)
        .fetch_one(&mut *tx)
        .await?;

        let recomputed = recomputed as i32;

        if recomputed != stored {
            info!(
                "Reconciled batch {}: participant count {} -> {}",
                batch_id, stored, recomputed
            );
        }

        sqlx::query(
            "UPDATE batches SET current_participants = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(batch_id)
        .bind(recomputed)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(recomputed)
    }

    /// Read model for admission display: (seats taken, capacity).
    pub async fn availability(&self, batch_id: Uuid) -> AppResult<(i32, i32)> {
        let row: Option<(i32, i32)> = sqlx::query_as(
            "SELECT current_participants, max_participants FROM batches WHERE id = $1",
        )
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| LedgerError::BatchNotFound(batch_id).into())
    }
}
