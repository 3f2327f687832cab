use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Booking error: {0}")]
    Booking(#[from] BookingError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External error: {0}")]
    ExternalError(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Booking lifecycle errors
#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Booking not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Batch not found: {0}")]
    BatchNotFound(Uuid),

    #[error("Batch not open for booking: {0}")]
    BatchNotOpen(Uuid),

    #[error("Participant details do not match booking size: expected {expected}, got {got}")]
    ParticipantCountMismatch { expected: i32, got: usize },

    #[error("Promo code invalid: {0}")]
    PromoInvalid(String),
}

/// Payment processing errors
#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Payment event already applied: {0}")]
    AlreadySettled(String),

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Gateway payment not in a capturable state: {0}")]
    PaymentNotCaptured(String),

    #[error("Invalid amount from gateway: {0}")]
    InvalidAmount(String),
}

/// Seat inventory errors
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Capacity exceeded for batch {batch_id}: requested {requested}")]
    CapacityExceeded { batch_id: Uuid, requested: i32 },

    #[error("Batch not found: {0}")]
    BatchNotFound(Uuid),
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            AppError::Ledger(LedgerError::CapacityExceeded { batch_id, requested }) => (
                StatusCode::CONFLICT,
                "CAPACITY_EXCEEDED",
                format!("Not enough seats left on batch {}", batch_id),
                Some(serde_json::json!({
                    "batch_id": batch_id,
                    "requested": requested,
                })),
            ),
            AppError::Ledger(LedgerError::BatchNotFound(id)) => (
                StatusCode::NOT_FOUND,
                "BATCH_NOT_FOUND",
                format!("Batch not found: {}", id),
                None,
            ),
            AppError::Booking(BookingError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                "BOOKING_NOT_FOUND",
                format!("Booking not found: {}", id),
                None,
            ),
            AppError::Booking(BookingError::BatchNotFound(id)) => (
                StatusCode::NOT_FOUND,
                "BATCH_NOT_FOUND",
                format!("Batch not found: {}", id),
                None,
            ),
            AppError::Booking(BookingError::BatchNotOpen(id)) => (
                StatusCode::CONFLICT,
                "BATCH_NOT_OPEN",
                format!("Batch {} is not accepting bookings", id),
                None,
            ),
            AppError::Booking(BookingError::InvalidStateTransition { from, to }) => (
                StatusCode::CONFLICT,
                "INVALID_STATE_TRANSITION",
                format!("Cannot move booking from {} to {}", from, to),
                Some(serde_json::json!({ "from": from, "to": to })),
            ),
            AppError::Booking(BookingError::ParticipantCountMismatch { expected, got }) => (
                StatusCode::BAD_REQUEST,
                "PARTICIPANT_COUNT_MISMATCH",
                format!("Expected {} participants, got {}", expected, got),
                None,
            ),
            AppError::Booking(BookingError::PromoInvalid(reason)) => (
                StatusCode::BAD_REQUEST,
                "PROMO_INVALID",
                format!("Promo code rejected: {}", reason),
                None,
            ),
            AppError::Payment(PaymentError::SignatureInvalid) => (
                StatusCode::UNAUTHORIZED,
                "SIGNATURE_INVALID",
                "Payment signature verification failed".to_string(),
                None,
            ),
            // Idempotent replay of an already-applied payment is a success,
            // not a failure: the gateway must stop retrying.
            AppError::Payment(PaymentError::AlreadySettled(payment_id)) => (
                StatusCode::OK,
                "ALREADY_SETTLED",
                format!("Payment {} already applied", payment_id),
                None,
            ),
            AppError::Payment(PaymentError::GatewayUnavailable(msg)) => (
                StatusCode::BAD_GATEWAY,
                "GATEWAY_UNAVAILABLE",
                format!("Payment gateway unavailable: {}", msg),
                None,
            ),
            AppError::Payment(PaymentError::PaymentNotCaptured(id)) => (
                StatusCode::BAD_REQUEST,
                "PAYMENT_NOT_CAPTURED",
                format!("Payment {} is not captured", id),
                None,
            ),
            AppError::Payment(PaymentError::InvalidAmount(msg)) => (
                StatusCode::BAD_REQUEST,
                "INVALID_AMOUNT",
                format!("Invalid payment amount: {}", msg),
                None,
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg,
                None,
            ),
            AppError::InvalidInput(msg) | AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
                msg,
                None,
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
                None,
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
                None,
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("Error converting: {:?}", error))
    }
}

impl From<rust_decimal::Error> for AppError {
    fn from(error: rust_decimal::Error) -> Self {
        AppError::InvalidInput(format!("Decimal conversion error: {:?}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() {
            AppError::Payment(PaymentError::GatewayUnavailable(error.to_string()))
        } else {
            AppError::ExternalError(format!("HTTP request error: {:?}", error))
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
