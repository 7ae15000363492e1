//! Subscription domain module.
//!
//! Package catalog entries and the window a successful payment grants.

mod package;
mod window;

pub use package::Package;
pub use window::{SubscriptionPlan, SubscriptionWindow, LIFETIME_THRESHOLD_DAYS};
