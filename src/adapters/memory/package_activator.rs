//! In-memory package activator.
//!
//! Keeps one subscription per user, overwritten on each activation, and
//! counts calls so tests can assert exactly-once activation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, PackageId, UserId};
use crate::domain::subscription::SubscriptionWindow;
use crate::ports::PackageActivator;

/// A user's current subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSubscription {
    pub package_id: PackageId,
    pub window: SubscriptionWindow,
}

/// In-memory `PackageActivator`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPackageActivator {
    subscriptions: Arc<RwLock<HashMap<UserId, ActiveSubscription>>>,
    calls: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryPackageActivator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of activation calls received, including failed ones.
    pub fn activation_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Makes subsequent activations fail, simulating a user store outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn subscription_of(&self, user_id: &UserId) -> Option<ActiveSubscription> {
        self.subscriptions.read().await.get(user_id).cloned()
    }
}

#[async_trait]
impl PackageActivator for InMemoryPackageActivator {
    async fn activate_package(
        &self,
        user_id: &UserId,
        package_id: &PackageId,
        window: &SubscriptionWindow,
    ) -> Result<(), DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DomainError::new(
                ErrorCode::ActivationFailed,
                "User store unavailable",
            ));
        }

        self.subscriptions.write().await.insert(
            user_id.clone(),
            ActiveSubscription {
                package_id: package_id.clone(),
                window: *window,
            },
        );
        Ok(())
    }
}
