//! Package catalog entry.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{PackageId, ValidationError};

/// A purchasable subscription package as read from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub name: String,

    /// Whole VND.
    pub price: i64,

    /// Subscription length in days; `0` means lifetime.
    pub duration_days: u32,

    pub benefits: Vec<String>,

    /// Google Play product sold for this package, if it is sold in-app.
    #[serde(default)]
    pub store_product_id: Option<String>,
}

impl Package {
    /// Creates a package, rejecting non-positive prices.
    pub fn new(
        id: PackageId,
        name: impl Into<String>,
        price: i64,
        duration_days: u32,
        benefits: Vec<String>,
    ) -> Result<Self, ValidationError> {
        if price <= 0 {
            return Err(ValidationError::not_positive("price", price));
        }
        Ok(Self {
            id,
            name: name.into(),
            price,
            duration_days,
            benefits,
            store_product_id: None,
        })
    }

    pub fn with_store_product_id(mut self, product_id: impl Into<String>) -> Self {
        self.store_product_id = Some(product_id.into());
        self
    }
}
