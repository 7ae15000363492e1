//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, errors)
//! - `payment` - Payment entity, status machine, signals and verification helpers
//! - `subscription` - Package catalog entries and subscription window policy

pub mod foundation;
pub mod payment;
pub mod subscription;
