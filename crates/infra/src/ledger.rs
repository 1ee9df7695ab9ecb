//! Inventory ledger service.
//!
//! Thin orchestration over [`InventoryStore`]: every counter change goes through
//! the store's atomic `apply`, so there is no read-check-write window here.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use orderflow_core::{Clock, DomainError, ProductId};
use orderflow_inventory::{DEFAULT_LOW_STOCK_THRESHOLD, Inventory, StockMutation};

use crate::error::{WorkflowError, WorkflowResult};
use crate::store::{InventoryStore, OrderStore, ProductCatalog, StoreError, Stores};

/// One line of a batch stock adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub product_id: ProductId,
    #[serde(default)]
    pub delta: i64,
    #[serde(default)]
    pub low_stock_threshold: Option<i64>,
}

#[derive(Clone)]
pub struct InventoryLedger {
    catalog: Arc<dyn ProductCatalog>,
    inventory: Arc<dyn InventoryStore>,
    orders: Arc<dyn OrderStore>,
    clock: Arc<dyn Clock>,
    default_threshold: i64,
}

impl InventoryLedger {
    pub fn new(stores: &Stores, clock: Arc<dyn Clock>) -> Self {
        Self {
            catalog: stores.catalog.clone(),
            inventory: stores.inventory.clone(),
            orders: stores.orders.clone(),
            clock,
            default_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
        }
    }

    /// Threshold used by `create_inventory` when none is given.
    pub fn with_default_threshold(mut self, threshold: i64) -> Self {
        self.default_threshold = threshold;
        self
    }

    /// Fast, side-effect-free pre-check. Never errors on missing records or
    /// non-positive quantities; those are simply "not available".
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn check_stock(&self, product_id: ProductId, quantity: i64) -> WorkflowResult<bool> {
        if quantity <= 0 {
            return Ok(false);
        }
        Ok(self
            .inventory
            .get(product_id)
            .await?
            .is_some_and(|inv| inv.has_available(quantity)))
    }

    pub async fn get_availability(&self, product_id: ProductId) -> WorkflowResult<Inventory> {
        self.inventory
            .get(product_id)
            .await?
            .ok_or_else(|| DomainError::not_found("inventory", product_id).into())
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn lock_stock(&self, product_id: ProductId, quantity: i64) -> WorkflowResult<Inventory> {
        self.apply(product_id, StockMutation::Lock { quantity }).await
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn release_stock(&self, product_id: ProductId, quantity: i64) -> WorkflowResult<Inventory> {
        self.apply(product_id, StockMutation::Release { quantity }).await
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn deduct_stock(&self, product_id: ProductId, quantity: i64) -> WorkflowResult<Inventory> {
        self.apply(product_id, StockMutation::Deduct { quantity }).await
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn adjust_stock(&self, product_id: ProductId, delta: i64) -> WorkflowResult<Inventory> {
        self.apply(product_id, StockMutation::Adjust { delta }).await
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn update_low_stock_threshold(
        &self,
        product_id: ProductId,
        threshold: i64,
    ) -> WorkflowResult<Inventory> {
        self.apply(product_id, StockMutation::SetThreshold { threshold })
            .await
    }

    /// Create the stock record for a catalog product.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn create_inventory(
        &self,
        product_id: ProductId,
        initial_stock: Option<i64>,
        low_stock_threshold: Option<i64>,
    ) -> WorkflowResult<Inventory> {
        if self.catalog.get_product(product_id).await?.is_none() {
            return Err(DomainError::not_found("product", product_id).into());
        }
        let inventory = Inventory::create(
            product_id,
            initial_stock.unwrap_or(0),
            low_stock_threshold.unwrap_or(self.default_threshold),
            self.clock.now(),
        )?;
        self.inventory
            .insert(&inventory)
            .await
            .map_err(|err| -> WorkflowError {
                match err {
                    StoreError::Duplicate(_) => DomainError::conflict(format!(
                        "inventory for product {product_id} already exists"
                    ))
                    .into(),
                    other => other.into(),
                }
            })?;
        info!(stock = inventory.stock(), "inventory created");
        Ok(inventory)
    }

    /// Apply several adjustments all-or-nothing.
    ///
    /// Lines run in ascending product order. The first failure stops the batch and
    /// the lines already applied are reverted in reverse order. A threshold is only
    /// put back if it still holds the value this batch set; one changed by another
    /// writer in between is left alone.
    #[instrument(skip(self, adjustments), fields(lines = adjustments.len()), err)]
    pub async fn batch_adjust(&self, adjustments: &[StockAdjustment]) -> WorkflowResult<Vec<Inventory>> {
        let mut lines = validate_batch(adjustments)?;
        lines.sort_by_key(|line| line.product_id);

        let mut undo: Vec<(ProductId, StockMutation)> = Vec::new();
        let mut results = Vec::with_capacity(lines.len());

        for line in &lines {
            match self.apply_adjustment(line, &mut undo).await {
                Ok(inventory) => results.push(inventory),
                Err(err) => {
                    self.revert(undo).await;
                    return Err(err);
                }
            }
        }

        info!(lines = results.len(), "batch adjustment applied");
        Ok(results)
    }

    #[instrument(skip(self), err)]
    pub async fn list_low_stock(&self) -> WorkflowResult<Vec<Inventory>> {
        Ok(self.inventory.list_low_stock().await?)
    }

    /// Remove a stock record that no order refers to and that has nothing
    /// locked. Locks held by a creation still in flight block the delete.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn delete_inventory(&self, product_id: ProductId) -> WorkflowResult<()> {
        if self.orders.references_product(product_id).await? {
            return Err(DomainError::conflict(format!(
                "inventory for product {product_id} is referenced by existing orders"
            ))
            .into());
        }
        self.inventory.delete(product_id).await?;
        info!("inventory deleted");
        Ok(())
    }

    async fn apply(&self, product_id: ProductId, mutation: StockMutation) -> WorkflowResult<Inventory> {
        Ok(self
            .inventory
            .apply(product_id, mutation, self.clock.now())
            .await?)
    }

    async fn apply_adjustment(
        &self,
        line: &StockAdjustment,
        undo: &mut Vec<(ProductId, StockMutation)>,
    ) -> WorkflowResult<Inventory> {
        let mut latest = None;
        if line.delta != 0 {
            let updated = self
                .apply(line.product_id, StockMutation::Adjust { delta: line.delta })
                .await?;
            undo.push((line.product_id, StockMutation::Adjust { delta: -line.delta }));
            latest = Some(updated);
        }
        if let Some(threshold) = line.low_stock_threshold {
            let previous = match &latest {
                Some(inv) => inv.low_stock_threshold(),
                None => self.get_availability(line.product_id).await?.low_stock_threshold(),
            };
            let updated = self
                .apply(line.product_id, StockMutation::SetThreshold { threshold })
                .await?;
            undo.push((
                line.product_id,
                StockMutation::RestoreThreshold {
                    from: threshold,
                    to: previous,
                },
            ));
            latest = Some(updated);
        }
        latest.ok_or_else(|| DomainError::validation("adjustment changes nothing").into())
    }

    async fn revert(&self, undo: Vec<(ProductId, StockMutation)>) {
        for (product_id, mutation) in undo.into_iter().rev() {
            match self.apply(product_id, mutation).await {
                Ok(_) => {}
                Err(WorkflowError::Domain(DomainError::Conflict(reason)))
                    if matches!(mutation, StockMutation::RestoreThreshold { .. }) =>
                {
                    warn!(
                        product_id = %product_id,
                        reason = %reason,
                        "threshold changed by another writer; not reverting it"
                    );
                }
                Err(err) => error!(
                    product_id = %product_id,
                    mutation = mutation.name(),
                    error = %err,
                    "failed to revert batch adjustment line; counters need manual repair"
                ),
            }
        }
    }
}

fn validate_batch(adjustments: &[StockAdjustment]) -> Result<Vec<StockAdjustment>, DomainError> {
    if adjustments.is_empty() {
        return Err(DomainError::validation("batch cannot be empty"));
    }
    let mut seen = HashSet::new();
    for line in adjustments {
        if !seen.insert(line.product_id) {
            return Err(DomainError::validation(format!(
                "product {} appears more than once in the batch",
                line.product_id
            )));
        }
        if line.delta == 0 && line.low_stock_threshold.is_none() {
            return Err(DomainError::validation(format!(
                "adjustment for product {} changes nothing",
                line.product_id
            )));
        }
        if line.low_stock_threshold.is_some_and(|t| t < 0) {
            return Err(DomainError::validation("low stock threshold cannot be negative"));
        }
    }
    Ok(adjustments.to_vec())
}
