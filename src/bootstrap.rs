use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tracing::info;

use crate::{
    booking::{
        service::{BookingPolicy, BookingService},
        BookingRepository,
    },
    config::Config,
    error::AppResult,
    inventory::SeatLedger,
    notify::{email::EmailClient, Notifier},
    payment::{HttpPaymentGateway, PaymentGateway, PaymentReconciler},
    promo::PromoRepository,
    server::AppState,
    sweeps::{AutoCancelSweep, ExpirySweep, SweepScheduleConfig, SweepScheduler},
    treks::TrekRepository,
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    let pool = initialize_database(&config.database_url).await?;

    // Repositories
    let bookings = Arc::new(BookingRepository::new(pool.clone()));
    let treks = Arc::new(TrekRepository::new(pool.clone()));
    let promos = Arc::new(PromoRepository::new(pool.clone()));
    let ledger = Arc::new(SeatLedger::new(pool.clone(), config.session_hold_minutes));
    info!("Repositories initialized");

    // Payment gateway client
    let gateway: Arc<dyn PaymentGateway> = Arc::new(HttpPaymentGateway::new(
        config.gateway_base_url.clone(),
        config.gateway_key_id.clone(),
        config.gateway_key_secret.clone(),
        config.gateway_webhook_secret.clone(),
    ));
    info!("Payment gateway client initialized");

    // Notifications
    let email = Arc::new(EmailClient::new(
        config.email_api_key.clone(),
        config.email_from.clone(),
    ));
    let notifier = Arc::new(Notifier::new(email));
    info!("Notifier initialized");

    // Booking lifecycle service
    let booking_service = Arc::new(BookingService::new(
        bookings.clone(),
        treks.clone(),
        ledger.clone(),
        promos.clone(),
        gateway.clone(),
        notifier.clone(),
        BookingPolicy {
            session_hold_minutes: config.session_hold_minutes,
            partial_initial_percent: config.partial_initial_percent,
            final_due_days: config.final_due_days,
            booking_deposit: config.booking_deposit,
        },
    ));
    info!("Booking service initialized");

    // Payment reconciler
    let reconciler = Arc::new(PaymentReconciler::new(
        bookings.clone(),
        promos.clone(),
        gateway.clone(),
        notifier.clone(),
    ));
    info!("Payment reconciler initialized");

    // Background sweeps
    let expiry = Arc::new(ExpirySweep::new(
        bookings.clone(),
        ledger.clone(),
        config.session_hold_minutes,
    ));
    let auto_cancel = Arc::new(AutoCancelSweep::new(bookings.clone(), booking_service.clone()));
    let scheduler = SweepScheduler::new(
        SweepScheduleConfig {
            expiry_interval_minutes: config.expiry_sweep_minutes,
            auto_cancel_hour: config.auto_cancel_hour,
        },
        expiry,
        auto_cancel,
    );
    scheduler.start();
    info!(
        "Sweeps started (expiry every {}m, auto-cancel daily at {:02}:00 UTC)",
        config.expiry_sweep_minutes, config.auto_cancel_hour
    );

    Ok(AppState {
        booking_service,
        reconciler,
        treks,
        ledger,
        gateway,
    })
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(50)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("Database initialized");
    Ok(pool)
}
