use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::models::{Booking, CancelActor, FailedBooking, Participant, PaymentMode};
use super::service::CreateBookingParams;
use crate::error::{AppError, AppResult};
use crate::server::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub user_id: Uuid,
    pub trek_id: Uuid,
    pub batch_id: Uuid,
    #[validate(range(min = 1, max = 20))]
    pub number_of_participants: i32,
    pub payment_mode: PaymentMode,
    pub promo_code: Option<String>,
    #[serde(default = "default_auto_cancel")]
    pub auto_cancel_on_due_date: bool,
}

fn default_auto_cancel() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CancelBookingRequest {
    pub reason: String,
    #[serde(default = "default_cancel_actor")]
    pub cancelled_by: CancelActor,
}

fn default_cancel_actor() -> CancelActor {
    CancelActor::User
}

#[derive(Debug, Deserialize)]
pub struct ParticipantDetailsRequest {
    pub participants: Vec<Participant>,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub batch_id: Uuid,
    pub current_participants: i32,
    pub max_participants: i32,
    pub seats_left: i32,
}

/// Create a booking with its seat reservation
/// POST /api/v1/bookings
pub async fn create_booking(
    State(state): State<AppState>,
    Json(request): Json<CreateBookingRequest>,
) -> AppResult<Json<Booking>> {
    request
        .validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;

    let booking = state
        .booking_service
        .create_booking(CreateBookingParams {
            user_id: request.user_id,
            trek_id: request.trek_id,
            batch_id: request.batch_id,
            number_of_participants: request.number_of_participants,
            payment_mode: request.payment_mode,
            promo_code: request.promo_code,
            auto_cancel_on_due_date: request.auto_cancel_on_due_date,
        })
        .await?;

    Ok(Json(booking))
}

/// GET /api/v1/bookings/:id
pub async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> AppResult<Json<Booking>> {
    let booking = state.booking_service.get_booking(booking_id).await?;
    Ok(Json(booking))
}

/// GET /api/v1/bookings/user/:user_id
pub async fn list_user_bookings(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Vec<Booking>>> {
    let bookings = state.booking_service.list_user_bookings(user_id).await?;
    Ok(Json(bookings))
}

/// Cancel a booking with a tiered refund
/// POST /api/v1/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(request): Json<CancelBookingRequest>,
) -> AppResult<Json<Booking>> {
    if request.reason.trim().is_empty() {
        return Err(AppError::InvalidInput(
            "cancellation reason must not be empty".to_string(),
        ));
    }

    let booking = state
        .booking_service
        .cancel(booking_id, &request.reason, request.cancelled_by)
        .await?;

    Ok(Json(booking))
}

/// Supply traveller details after payment
/// PUT /api/v1/bookings/:id/participants
pub async fn set_participant_details(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(request): Json<ParticipantDetailsRequest>,
) -> AppResult<Json<Booking>> {
    let booking = state
        .booking_service
        .set_participant_details(booking_id, request.participants)
        .await?;

    Ok(Json(booking))
}

/// Expired-reservation archive for a batch
/// GET /api/v1/admin/batches/:id/failed-bookings
pub async fn list_failed_bookings(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> AppResult<Json<Vec<FailedBooking>>> {
    let failed = state.booking_service.list_failed_bookings(batch_id).await?;
    Ok(Json(failed))
}

/// GET /api/v1/batches/:id/availability
pub async fn get_availability(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> AppResult<Json<AvailabilityResponse>> {
    let (current, max) = state.ledger.availability(batch_id).await?;

    Ok(Json(AvailabilityResponse {
        batch_id,
        current_participants: current,
        max_participants: max,
        seats_left: (max - current).max(0),
    }))
}
