use serde::{Deserialize, Serialize};

use orderflow_core::{DomainError, Entity, ProductId};

/// A product as seen by the order workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: u64,
    pub active: bool,
}

impl Product {
    /// Build a validated, active product.
    pub fn new(id: ProductId, name: impl Into<String>, unit_price: u64) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("product name cannot be empty"));
        }
        if unit_price == 0 {
            return Err(DomainError::validation("unit_price must be positive"));
        }
        Ok(Self {
            id,
            name,
            unit_price,
            active: true,
        })
    }

    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }

    /// Ensure the product may be placed on a new order.
    pub fn ensure_orderable(&self) -> Result<(), DomainError> {
        if !self.active {
            return Err(DomainError::validation(format!(
                "product {} is not available for sale",
                self.id
            )));
        }
        Ok(())
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
