//! Package Billing - Payment reconciliation for subscription packages
//!
//! Creates payments for subscription packages, hands the buyer to one of four
//! gateways (VNPay, PayPal, ZaloPay, Google Play), and reconciles whatever the
//! gateways report back into exactly one terminal status per payment and
//! exactly one package activation per successful payment.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
