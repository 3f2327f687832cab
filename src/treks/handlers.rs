use axum::{
    extract::{Path, State},
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::models::{Batch, BatchStatus, Trek};
use crate::error::{AppError, AppResult};
use crate::server::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTrekRequest {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub region: String,
    #[validate(range(min = 1))]
    pub duration_days: i32,
    pub difficulty: String,
    pub base_price: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBatchRequest {
    pub trek_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub price: Decimal,
    #[validate(range(min = 1))]
    pub max_participants: i32,
    #[serde(default)]
    pub auto_cancel_overdue: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBatchStatusRequest {
    pub from: BatchStatus,
    pub to: BatchStatus,
}

/// POST /api/v1/admin/treks
pub async fn create_trek(
    State(state): State<AppState>,
    Json(request): Json<CreateTrekRequest>,
) -> AppResult<Json<Trek>> {
    request
        .validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;

    let trek = state
        .treks
        .create_trek(
            &request.name,
            &request.region,
            request.duration_days,
            &request.difficulty,
            request.base_price,
        )
        .await?;

    Ok(Json(trek))
}

/// GET /api/v1/treks
pub async fn list_treks(State(state): State<AppState>) -> AppResult<Json<Vec<Trek>>> {
    Ok(Json(state.treks.list_active_treks().await?))
}

/// GET /api/v1/treks/:id
pub async fn get_trek(
    State(state): State<AppState>,
    Path(trek_id): Path<Uuid>,
) -> AppResult<Json<Trek>> {
    let trek = state
        .treks
        .get_trek(trek_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Trek not found: {}", trek_id)))?;

    Ok(Json(trek))
}

/// POST /api/v1/admin/batches
pub async fn create_batch(
    State(state): State<AppState>,
    Json(request): Json<CreateBatchRequest>,
) -> AppResult<Json<Batch>> {
    request
        .validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;

    if request.end_date < request.start_date {
        return Err(AppError::InvalidInput(
            "end_date must not precede start_date".to_string(),
        ));
    }

    let batch = state
        .treks
        .create_batch(
            request.trek_id,
            request.start_date,
            request.end_date,
            request.price,
            request.max_participants,
            request.auto_cancel_overdue,
        )
        .await?;

    Ok(Json(batch))
}

/// GET /api/v1/treks/:id/batches
pub async fn list_upcoming_batches(
    State(state): State<AppState>,
    Path(trek_id): Path<Uuid>,
) -> AppResult<Json<Vec<Batch>>> {
    Ok(Json(state.treks.list_upcoming_batches(trek_id).await?))
}

/// Administrative batch status advance (by date or manual action)
/// PATCH /api/v1/admin/batches/:id/status
pub async fn update_batch_status(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
    Json(request): Json<UpdateBatchStatusRequest>,
) -> AppResult<Json<Batch>> {
    let batch = state
        .treks
        .update_batch_status(batch_id, request.from, request.to)
        .await?;

    // A completed departure carries its confirmed bookings with it.
    if request.to == BatchStatus::Completed {
        state
            .booking_service
            .complete_batch_bookings(batch_id)
            .await?;
    }

    Ok(Json(batch))
}
