//! Subscription window policy.
//!
//! Maps a package duration to a plan tag and an end date:
//!
//! | Duration (days) | Plan | End |
//! |-----------------|------|-----|
//! | 30 | `monthly` | start + 30 days |
//! | 365 | `yearly` | start + 365 days |
//! | 0 or > 3650 | `lifetime` | none |
//! | anything else | `custom` | start + duration |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

/// Durations above this many days are treated as lifetime access.
pub const LIFETIME_THRESHOLD_DAYS: u32 = 3650;

/// Plan tag written to the user's subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPlan {
    Monthly,
    Yearly,
    Lifetime,
    Custom,
}

impl SubscriptionPlan {
    /// Classifies a package duration.
    pub fn for_duration(duration_days: u32) -> Self {
        match duration_days {
            30 => SubscriptionPlan::Monthly,
            365 => SubscriptionPlan::Yearly,
            0 => SubscriptionPlan::Lifetime,
            d if d > LIFETIME_THRESHOLD_DAYS => SubscriptionPlan::Lifetime,
            _ => SubscriptionPlan::Custom,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionPlan::Monthly => "monthly",
            SubscriptionPlan::Yearly => "yearly",
            SubscriptionPlan::Lifetime => "lifetime",
            SubscriptionPlan::Custom => "custom",
        }
    }
}

impl fmt::Display for SubscriptionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The access period granted by one successful payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionWindow {
    pub plan: SubscriptionPlan,
    pub starts_at: Timestamp,

    /// `None` for lifetime plans.
    pub ends_at: Option<Timestamp>,
}

impl SubscriptionWindow {
    /// Computes the window for a package duration starting at `start`.
    ///
    /// Deterministic in both arguments, so recomputing it for the same payment
    /// yields the same window.
    pub fn compute(duration_days: u32, start: Timestamp) -> Self {
        let plan = SubscriptionPlan::for_duration(duration_days);
        let ends_at = match plan {
            SubscriptionPlan::Lifetime => None,
            _ => Some(start.add_days(i64::from(duration_days))),
        };
        Self {
            plan,
            starts_at: start,
            ends_at,
        }
    }

    pub fn is_lifetime(&self) -> bool {
        self.ends_at.is_none()
    }
}
