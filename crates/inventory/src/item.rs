use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orderflow_core::{DomainError, DomainResult, Entity, ProductId};

/// Threshold used when an inventory record is created without one.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;

/// Per-product stock record.
///
/// `stock` is what the business owns, `locked_stock` is what unpaid or unshipped
/// orders have reserved. Every mutator below either succeeds and leaves
/// `0 <= locked_stock <= stock`, or fails and leaves the record untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    product_id: ProductId,
    stock: i64,
    locked_stock: i64,
    low_stock_threshold: i64,
    updated_at: DateTime<Utc>,
}

/// A single conditional update against one inventory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StockMutation {
    Lock { quantity: i64 },
    Release { quantity: i64 },
    Deduct { quantity: i64 },
    Adjust { delta: i64 },
    SetThreshold { threshold: i64 },
    /// Set the threshold back to `to`, only if it still equals `from`.
    RestoreThreshold { from: i64, to: i64 },
}

impl StockMutation {
    pub fn name(&self) -> &'static str {
        match self {
            StockMutation::Lock { .. } => "lock",
            StockMutation::Release { .. } => "release",
            StockMutation::Deduct { .. } => "deduct",
            StockMutation::Adjust { .. } => "adjust",
            StockMutation::SetThreshold { .. } => "set_threshold",
            StockMutation::RestoreThreshold { .. } => "restore_threshold",
        }
    }

    /// Parameter checks that do not depend on the current counters.
    pub fn validate(&self) -> DomainResult<()> {
        match *self {
            StockMutation::Lock { quantity }
            | StockMutation::Release { quantity }
            | StockMutation::Deduct { quantity } => ensure_positive(quantity),
            StockMutation::Adjust { delta } if delta == 0 => {
                Err(DomainError::validation("delta cannot be zero"))
            }
            StockMutation::Adjust { .. } => Ok(()),
            StockMutation::SetThreshold { threshold } if threshold < 0 => Err(
                DomainError::validation("low stock threshold cannot be negative"),
            ),
            StockMutation::SetThreshold { .. } => Ok(()),
            StockMutation::RestoreThreshold { to, .. } if to < 0 => Err(
                DomainError::validation("low stock threshold cannot be negative"),
            ),
            StockMutation::RestoreThreshold { .. } => Ok(()),
        }
    }

    /// Apply to a record. On error the record is unchanged.
    pub fn apply(self, inventory: &mut Inventory, at: DateTime<Utc>) -> DomainResult<()> {
        match self {
            StockMutation::Lock { quantity } => inventory.lock(quantity, at),
            StockMutation::Release { quantity } => inventory.release(quantity, at),
            StockMutation::Deduct { quantity } => inventory.deduct(quantity, at),
            StockMutation::Adjust { delta } => inventory.adjust(delta, at),
            StockMutation::SetThreshold { threshold } => {
                inventory.set_low_stock_threshold(threshold, at)
            }
            StockMutation::RestoreThreshold { from, to } => {
                if inventory.low_stock_threshold != from {
                    return Err(DomainError::conflict(format!(
                        "low stock threshold for product {} is now {}, not {from}",
                        inventory.product_id, inventory.low_stock_threshold
                    )));
                }
                inventory.set_low_stock_threshold(to, at)
            }
        }
    }
}

fn ensure_positive(quantity: i64) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    Ok(())
}

impl Inventory {
    pub fn create(
        product_id: ProductId,
        initial_stock: i64,
        low_stock_threshold: i64,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if initial_stock < 0 {
            return Err(DomainError::validation("initial stock cannot be negative"));
        }
        if low_stock_threshold < 0 {
            return Err(DomainError::validation("low stock threshold cannot be negative"));
        }
        Ok(Self {
            product_id,
            stock: initial_stock,
            locked_stock: 0,
            low_stock_threshold,
            updated_at: at,
        })
    }

    /// Rebuild a record from persisted columns, re-checking the counter invariant.
    pub fn restore(
        product_id: ProductId,
        stock: i64,
        locked_stock: i64,
        low_stock_threshold: i64,
        updated_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if locked_stock < 0 || locked_stock > stock {
            return Err(DomainError::validation(format!(
                "persisted counters for product {product_id} violate 0 <= locked ({locked_stock}) <= stock ({stock})"
            )));
        }
        Ok(Self {
            product_id,
            stock,
            locked_stock,
            low_stock_threshold,
            updated_at,
        })
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub fn locked_stock(&self) -> i64 {
        self.locked_stock
    }

    pub fn low_stock_threshold(&self) -> i64 {
        self.low_stock_threshold
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn available_stock(&self) -> i64 {
        self.stock - self.locked_stock
    }

    /// Read-only pre-check. Non-positive quantities are never "available".
    pub fn has_available(&self, quantity: i64) -> bool {
        quantity > 0 && self.available_stock() >= quantity
    }

    pub fn is_low_stock(&self) -> bool {
        self.available_stock() <= self.low_stock_threshold
    }

    fn lock(&mut self, quantity: i64, at: DateTime<Utc>) -> DomainResult<()> {
        ensure_positive(quantity)?;
        let available = self.available_stock();
        if available < quantity {
            return Err(DomainError::insufficient_stock(
                self.product_id,
                quantity,
                available,
            ));
        }
        self.locked_stock += quantity;
        self.updated_at = at;
        Ok(())
    }

    fn release(&mut self, quantity: i64, at: DateTime<Utc>) -> DomainResult<()> {
        ensure_positive(quantity)?;
        if self.locked_stock < quantity {
            return Err(DomainError::invalid_release(
                self.product_id,
                quantity,
                self.locked_stock,
            ));
        }
        self.locked_stock -= quantity;
        self.updated_at = at;
        Ok(())
    }

    fn deduct(&mut self, quantity: i64, at: DateTime<Utc>) -> DomainResult<()> {
        ensure_positive(quantity)?;
        if self.locked_stock < quantity {
            return Err(DomainError::invalid_release(
                self.product_id,
                quantity,
                self.locked_stock,
            ));
        }
        if self.stock < quantity {
            return Err(DomainError::insufficient_stock(
                self.product_id,
                quantity,
                self.stock,
            ));
        }
        self.stock -= quantity;
        self.locked_stock -= quantity;
        self.updated_at = at;
        Ok(())
    }

    fn adjust(&mut self, delta: i64, at: DateTime<Utc>) -> DomainResult<()> {
        if delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }
        let new_stock = self
            .stock
            .checked_add(delta)
            .ok_or_else(|| DomainError::validation("stock adjustment overflows"))?;
        // Owned stock may never drop below what is already reserved.
        if new_stock < self.locked_stock {
            return Err(DomainError::insufficient_stock(
                self.product_id,
                -delta,
                self.available_stock(),
            ));
        }
        self.stock = new_stock;
        self.updated_at = at;
        Ok(())
    }

    fn set_low_stock_threshold(&mut self, threshold: i64, at: DateTime<Utc>) -> DomainResult<()> {
        if threshold < 0 {
            return Err(DomainError::validation("low stock threshold cannot be negative"));
        }
        self.low_stock_threshold = threshold;
        self.updated_at = at;
        Ok(())
    }
}

impl Entity for Inventory {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.product_id
    }
}
