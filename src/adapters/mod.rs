//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `http` - axum endpoints for clients and provider callbacks
//! - `memory` - In-memory ledger, catalog and activator
//! - `postgres` - PostgreSQL ledger, catalog and activator
//! - `providers` - VNPay, PayPal, ZaloPay and Google Play gateways

pub mod http;
pub mod memory;
pub mod postgres;
pub mod providers;
