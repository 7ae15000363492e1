//! Package activation port.
//!
//! The user-account store is external; this port is the only way the
//! reconciliation flow mutates it.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, PackageId, UserId};
use crate::domain::subscription::SubscriptionWindow;

/// Applies a subscription window to a user.
///
/// Implementations must be idempotent: applying the same window for the same
/// user and package twice leaves the user in the same state as applying it once.
#[async_trait]
pub trait PackageActivator: Send + Sync {
    /// # Errors
    ///
    /// - `ActivationFailed` if the user store refuses the update
    /// - `DatabaseError` on persistence failure
    async fn activate_package(
        &self,
        user_id: &UserId,
        package_id: &PackageId,
        window: &SubscriptionWindow,
    ) -> Result<(), DomainError>;
}
