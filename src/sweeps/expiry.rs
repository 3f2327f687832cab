use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::booking::repository::BookingRepository;
use crate::error::AppResult;
use crate::inventory::SeatLedger;

pub const FAILURE_REASON_SESSION_EXPIRED: &str = "session_expired";
const ARCHIVED_BY: &str = "expiry_sweep";

/// Outcome summary for one sweep pass, logged and returned for tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExpirySweepReport {
    pub examined: usize,
    pub archived: usize,
    pub skipped: usize,
    pub batches_reconciled: usize,
}

/// Expiry sweep - archives reservations whose hold window lapsed without
/// payment and reconciles the affected batches' seat counts from the
/// bookings table rather than merely decrementing, so prior drift heals.
///
/// Idempotent: archived bookings no longer exist in live storage, and the
/// guarded delete lets a concurrently-arriving payment win the race.
pub struct ExpirySweep {
    bookings: Arc<BookingRepository>,
    ledger: Arc<SeatLedger>,
    fallback_hold_minutes: i64,
}

impl ExpirySweep {
    pub fn new(
        bookings: Arc<BookingRepository>,
        ledger: Arc<SeatLedger>,
        fallback_hold_minutes: i64,
    ) -> Self {
        Self {
            bookings,
            ledger,
            fallback_hold_minutes,
        }
    }

    pub async fn run(&self) -> AppResult<ExpirySweepReport> {
        let expired = self
            .bookings
            .list_expired_pending(self.fallback_hold_minutes)
            .await?;

        let mut report = ExpirySweepReport {
            examined: expired.len(),
            ..Default::default()
        };

        if expired.is_empty() {
            return Ok(report);
        }

        info!("Expiry sweep: {} stale reservations found", expired.len());

        // Batches are reconciled at most once per pass, however many
        // expired bookings reference them.
        let mut touched_batches: HashSet<Uuid> = HashSet::new();

        for booking in &expired {
            let mut tx = self.bookings.begin_tx().await?;

            match self
                .bookings
                .archive_expired(
                    &mut tx,
                    booking.id,
                    FAILURE_REASON_SESSION_EXPIRED,
                    ARCHIVED_BY,
                )
                .await?
            {
                Some(archived) => {
                    tx.commit().await?;
                    touched_batches.insert(archived.batch_id);
                    report.archived += 1;
                    info!(
                        "Archived expired booking {} (batch {}, {} seats)",
                        archived.id, archived.batch_id, archived.number_of_participants
                    );
                }
                None => {
                    // The booking moved on (payment landed, or another
                    // sweep instance got here first). Nothing to do.
                    report.skipped += 1;
                }
            }
        }

        for batch_id in touched_batches {
            match self.ledger.reconcile(batch_id).await {
                Ok(_) => report.batches_reconciled += 1,
                Err(e) => error!("Reconcile failed for batch {}: {:?}", batch_id, e),
            }
        }

        info!(
            "Expiry sweep complete: {} examined, {} archived, {} skipped, {} batches reconciled",
            report.examined, report.archived, report.skipped, report.batches_reconciled
        );

        Ok(report)
    }
}
