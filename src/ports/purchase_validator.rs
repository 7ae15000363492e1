//! In-app purchase validation port.
//!
//! Resolves a store purchase token into the purchase record the store keeps.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ProviderError;

/// Store-side validation of a purchase token.
#[async_trait]
pub trait PurchaseValidator: Send + Sync {
    /// Look up the purchase behind `purchase_token` for `product_id`.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` if the store does not know the token
    /// - `ProviderUnavailable` / `Timeout` if the store cannot be reached
    async fn validate(
        &self,
        product_id: &str,
        purchase_token: &str,
    ) -> Result<ProductPurchase, ProviderError>;
}

/// Purchase state reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseState {
    Purchased,
    Canceled,
    Pending,
}

impl PurchaseState {
    /// Decodes Google Play's numeric `purchaseState`.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(PurchaseState::Purchased),
            1 => Some(PurchaseState::Canceled),
            2 => Some(PurchaseState::Pending),
            _ => None,
        }
    }
}

/// A validated one-time product purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPurchase {
    pub purchase_state: PurchaseState,

    /// Store order id, e.g. `GPA.3312-1234-5678-90123`.
    pub order_id: Option<String>,

    /// Account id the app attached to the billing flow.
    pub obfuscated_account_id: Option<String>,
}
