//! HTTP adapter for payment endpoints.
//!
//! Exposes checkout creation, status lookup and every provider inbound
//! channel under `/payments`. See [`routes::payment_routes`] for the list.

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{PaymentApiError, PaymentAppState};
pub use routes::{payment_router, payment_routes};
