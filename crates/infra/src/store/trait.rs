use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use orderflow_catalog::Product;
use orderflow_core::{CustomerId, DomainError, OrderId, ProductId};
use orderflow_delivery::{Delivery, DeliveryStatus, Tracking};
use orderflow_inventory::{Inventory, StockMutation};
use orderflow_orders::{Order, OrderNo, OrderStatus};
use std::sync::Arc;

/// Storage operation error.
///
/// `Domain` carries a rule violation detected at the storage boundary (missing
/// record, a conditional update whose guard did not hold). The other variants are
/// infrastructure failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A unique key already exists (order number, inventory record, ...).
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// A guarded write found a different row than the one it was computed from.
    #[error("stale write: {0}")]
    Stale(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub(crate) fn poisoned() -> Self {
        StoreError::Backend("in-memory store lock poisoned".to_string())
    }
}

/// Product lookup used for existence checks and price snapshots.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Insert or replace a product. Existing orders keep their snapshotted prices.
    async fn upsert_product(&self, product: &Product) -> Result<(), StoreError>;
}

/// Per-product stock counters.
///
/// `apply` is the only way counters change, and it must be a single atomic
/// conditional update: the guard of the mutation and the write happen together,
/// so concurrent callers (in this process or another) can never push
/// `locked_stock` past `stock`.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// `Duplicate` if the product already has a record.
    async fn insert(&self, inventory: &Inventory) -> Result<(), StoreError>;

    async fn get(&self, product_id: ProductId) -> Result<Option<Inventory>, StoreError>;

    /// Apply `mutation` atomically and return the updated record.
    ///
    /// Fails with `Domain(NotFound)` for an unknown product and with the
    /// mutation's own domain error when its guard does not hold.
    async fn apply(
        &self,
        product_id: ProductId,
        mutation: StockMutation,
        at: DateTime<Utc>,
    ) -> Result<Inventory, StoreError>;

    /// Records with `available <= low_stock_threshold`, ascending product id.
    async fn list_low_stock(&self) -> Result<Vec<Inventory>, StoreError>;

    /// Remove a record whose `locked_stock` is zero, checked in the same atomic
    /// step as the delete. `Domain(NotFound)` if absent, `Domain(Conflict)` while
    /// any stock is locked.
    async fn delete(&self, product_id: ProductId) -> Result<(), StoreError>;
}

pub(crate) fn locked_record(product_id: ProductId, locked: i64) -> DomainError {
    DomainError::conflict(format!(
        "inventory for product {product_id} still has {locked} locked"
    ))
}

/// Guarded write of one order and its delivery.
///
/// Both rows are written only if the stored statuses still equal `expected_*`
/// and the stored tracking fields still equal `expected_tracking`; otherwise
/// nothing is written and the store returns `Stale`. Comparing the tracking
/// pre-image stops a stale copy from overwriting a concurrent details edit.
#[derive(Debug, Clone)]
pub struct StatusWrite {
    pub expected_order: OrderStatus,
    pub order: Order,
    pub expected_delivery: DeliveryStatus,
    pub expected_tracking: Tracking,
    pub delivery: Delivery,
}

/// Filter and paging for order listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderQuery {
    pub customer_id: Option<CustomerId>,
    pub status: Option<OrderStatus>,
    pub page: u32,
    pub size: u32,
}

impl OrderQuery {
    pub const MAX_PAGE_SIZE: u32 = 100;

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.page == 0 {
            return Err(DomainError::validation("page starts at 1"));
        }
        if self.size == 0 || self.size > Self::MAX_PAGE_SIZE {
            return Err(DomainError::validation(format!(
                "page size must be between 1 and {}",
                Self::MAX_PAGE_SIZE
            )));
        }
        Ok(())
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.size)
    }
}

impl Default for OrderQuery {
    fn default() -> Self {
        Self {
            customer_id: None,
            status: None,
            page: 1,
            size: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
}

/// Orders, their items and their deliveries.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist order, items and delivery in one atomic write.
    ///
    /// `Duplicate` if the order number is taken; nothing is written in that case.
    async fn create(&self, order: &Order, delivery: &Delivery) -> Result<(), StoreError>;

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>, StoreError>;

    async fn find_by_order_no(&self, order_no: &OrderNo) -> Result<Option<Order>, StoreError>;

    async fn get_delivery(&self, order_id: OrderId) -> Result<Option<Delivery>, StoreError>;

    async fn save_transition(&self, write: &StatusWrite) -> Result<(), StoreError>;

    /// Newest first.
    async fn list(&self, query: &OrderQuery) -> Result<OrderPage, StoreError>;

    /// Whether any order item references the product.
    async fn references_product(&self, product_id: ProductId) -> Result<bool, StoreError>;
}

/// Which cleanup step failed and left counters needing manual repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GapKind {
    /// Releasing an earlier lock after a failed order creation.
    CompensationRelease,
    /// Releasing an item's lock after the order was cancelled.
    CancelRelease,
    /// Turning an item's lock into a deduction after delivery was confirmed.
    CompletionDeduct,
}

impl GapKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GapKind::CompensationRelease => "COMPENSATION_RELEASE",
            GapKind::CancelRelease => "CANCEL_RELEASE",
            GapKind::CompletionDeduct => "COMPLETION_DEDUCT",
        }
    }
}

impl core::str::FromStr for GapKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            GapKind::CompensationRelease,
            GapKind::CancelRelease,
            GapKind::CompletionDeduct,
        ]
        .into_iter()
        .find(|k| k.as_str() == s)
        .ok_or_else(|| StoreError::Backend(format!("unknown reconciliation gap kind: {s}")))
    }
}

/// A stock counter change that should have happened but did not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationGap {
    pub id: Uuid,
    pub kind: GapKind,
    pub order_id: OrderId,
    pub order_no: String,
    pub product_id: ProductId,
    pub quantity: i64,
    pub error: String,
    pub recorded_at: DateTime<Utc>,
}

impl ReconciliationGap {
    pub fn new(
        kind: GapKind,
        order_id: OrderId,
        order_no: &OrderNo,
        product_id: ProductId,
        quantity: i64,
        error: impl ToString,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            order_id,
            order_no: order_no.to_string(),
            product_id,
            quantity,
            error: error.to_string(),
            recorded_at,
        }
    }
}

/// Append-only record of reconciliation gaps for out-of-band repair.
#[async_trait]
pub trait ReconciliationLog: Send + Sync {
    async fn record(&self, gap: ReconciliationGap) -> Result<(), StoreError>;

    /// Oldest first.
    async fn list(&self) -> Result<Vec<ReconciliationGap>, StoreError>;
}

/// Shared handles to every store the services need.
#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn ProductCatalog>,
    pub inventory: Arc<dyn InventoryStore>,
    pub orders: Arc<dyn OrderStore>,
    pub reconciliation: Arc<dyn ReconciliationLog>,
}
