pub mod gateway;
pub mod handlers;
pub mod models;
pub mod reconciler;

pub use gateway::{HttpPaymentGateway, PaymentGateway};
pub use reconciler::PaymentReconciler;
