use axum::{
    middleware,
    routing::{get, patch, post, put},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::info;

use crate::{
    booking::handlers::{
        cancel_booking, create_booking, get_availability, get_booking, list_failed_bookings,
        list_user_bookings, set_participant_details,
    },
    booking::BookingService,
    inventory::SeatLedger,
    middleware::{write_rate_limit, WriteRateLimiter},
    payment::handlers::{payment_webhook, verify_payment},
    payment::{PaymentGateway, PaymentReconciler},
    treks::handlers::{
        create_batch, create_trek, get_trek, list_treks, list_upcoming_batches,
        update_batch_status,
    },
    treks::TrekRepository,
};

#[derive(Clone)]
pub struct AppState {
    pub booking_service: Arc<BookingService>,
    pub reconciler: Arc<PaymentReconciler>,
    pub treks: Arc<TrekRepository>,
    pub ledger: Arc<SeatLedger>,
    pub gateway: Arc<dyn PaymentGateway>,
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn create_app(state: AppState) -> Router {
    info!("Setting up HTTP routes...");

    // Booking creation and the webhook take the write throttle; reads and
    // the idempotent verify callback do not.
    let limiter = WriteRateLimiter::new(100, 60);
    let throttled = Router::new()
        .route("/bookings", post(create_booking))
        .route("/webhook/payment", post(payment_webhook))
        .route_layer(middleware::from_fn_with_state(limiter, write_rate_limit));

    let api_v1 = Router::new()
        // Booking endpoints
        .route("/bookings/:id", get(get_booking))
        .route("/bookings/:id/cancel", post(cancel_booking))
        .route("/bookings/:id/participants", put(set_participant_details))
        .route("/bookings/user/:user_id", get(list_user_bookings))
        // Payment endpoints
        .route("/payments/verify", post(verify_payment))
        // Catalogue endpoints
        .route("/treks", get(list_treks))
        .route("/treks/:id", get(get_trek))
        .route("/treks/:id/batches", get(list_upcoming_batches))
        .route("/batches/:id/availability", get(get_availability))
        // Admin endpoints
        .route("/admin/treks", post(create_trek))
        .route("/admin/batches", post(create_batch))
        .route("/admin/batches/:id/status", patch(update_batch_status))
        .route("/admin/batches/:id/failed-bookings", get(list_failed_bookings))
        .merge(throttled);

    let app = Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1)
        .layer(CompressionLayer::new())
        .layer(CorsLayer::very_permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("HTTP routes configured");
    app
}

pub async fn run_server(app: Router, bind_address: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("Server listening on: {}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}
