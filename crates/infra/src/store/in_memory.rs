//! In-memory stores for tests and single-process development.
//!
//! Each store keeps its rows behind one `RwLock`; a conditional update takes the
//! write lock, checks its guard and writes, so it is atomic within the process.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use orderflow_catalog::Product;
use orderflow_core::{DomainError, Entity, OrderId, ProductId};
use orderflow_delivery::Delivery;
use orderflow_inventory::{Inventory, StockMutation};
use orderflow_orders::{Order, OrderNo};

use super::r#trait::{
    InventoryStore, OrderPage, OrderQuery, OrderStore, ProductCatalog, ReconciliationGap,
    ReconciliationLog, StatusWrite, StoreError, Stores, locked_record,
};

impl Stores {
    /// Fresh, empty in-memory backend.
    pub fn in_memory() -> Self {
        Self {
            catalog: Arc::new(InMemoryProductCatalog::new()),
            inventory: Arc::new(InMemoryInventoryStore::new()),
            orders: Arc::new(InMemoryOrderStore::new()),
            reconciliation: Arc::new(InMemoryReconciliationLog::new()),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryProductCatalog {
    products: RwLock<HashMap<ProductId, Product>>,
}

impl InMemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>, StoreError> {
        let products = self.products.read().map_err(|_| StoreError::poisoned())?;
        Ok(products.get(&product_id).cloned())
    }

    async fn upsert_product(&self, product: &Product) -> Result<(), StoreError> {
        let mut products = self.products.write().map_err(|_| StoreError::poisoned())?;
        products.insert(*product.id(), product.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    // BTreeMap keeps listings in ascending product order.
    records: RwLock<BTreeMap<ProductId, Inventory>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn insert(&self, inventory: &Inventory) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::poisoned())?;
        if records.contains_key(&inventory.product_id()) {
            return Err(StoreError::Duplicate(format!(
                "inventory for product {} already exists",
                inventory.product_id()
            )));
        }
        records.insert(inventory.product_id(), inventory.clone());
        Ok(())
    }

    async fn get(&self, product_id: ProductId) -> Result<Option<Inventory>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::poisoned())?;
        Ok(records.get(&product_id).cloned())
    }

    async fn apply(
        &self,
        product_id: ProductId,
        mutation: StockMutation,
        at: DateTime<Utc>,
    ) -> Result<Inventory, StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::poisoned())?;
        let record = records
            .get_mut(&product_id)
            .ok_or_else(|| DomainError::not_found("inventory", product_id))?;
        mutation.apply(record, at)?;
        Ok(record.clone())
    }

    async fn list_low_stock(&self) -> Result<Vec<Inventory>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::poisoned())?;
        Ok(records
            .values()
            .filter(|inv| inv.is_low_stock())
            .cloned()
            .collect())
    }

    async fn delete(&self, product_id: ProductId) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::poisoned())?;
        let record = records
            .get(&product_id)
            .ok_or_else(|| DomainError::not_found("inventory", product_id))?;
        if record.locked_stock() != 0 {
            return Err(locked_record(product_id, record.locked_stock()).into());
        }
        records.remove(&product_id);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct OrderTables {
    orders: HashMap<OrderId, Order>,
    by_order_no: HashMap<String, OrderId>,
    deliveries: HashMap<OrderId, Delivery>,
}

#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    tables: RwLock<OrderTables>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: &Order, delivery: &Delivery) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(|_| StoreError::poisoned())?;
        if tables.by_order_no.contains_key(order.order_no().as_str()) {
            return Err(StoreError::Duplicate(format!(
                "order number {} already exists",
                order.order_no()
            )));
        }
        let order_id = order.id_typed();
        if tables.orders.contains_key(&order_id) || tables.deliveries.contains_key(&order_id) {
            return Err(StoreError::Duplicate(format!("order {order_id} already exists")));
        }
        tables
            .by_order_no
            .insert(order.order_no().as_str().to_string(), order_id);
        tables.orders.insert(order_id, order.clone());
        tables.deliveries.insert(order_id, delivery.clone());
        Ok(())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::poisoned())?;
        Ok(tables.orders.get(&order_id).cloned())
    }

    async fn find_by_order_no(&self, order_no: &OrderNo) -> Result<Option<Order>, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::poisoned())?;
        Ok(tables
            .by_order_no
            .get(order_no.as_str())
            .and_then(|id| tables.orders.get(id))
            .cloned())
    }

    async fn get_delivery(&self, order_id: OrderId) -> Result<Option<Delivery>, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::poisoned())?;
        Ok(tables.deliveries.get(&order_id).cloned())
    }

    async fn save_transition(&self, write: &StatusWrite) -> Result<(), StoreError> {
        let order_id = write.order.id_typed();
        let mut tables = self.tables.write().map_err(|_| StoreError::poisoned())?;

        let current_order = tables
            .orders
            .get(&order_id)
            .map(Order::status)
            .ok_or_else(|| DomainError::not_found("order", order_id))?;
        let stored_delivery = tables
            .deliveries
            .get(&order_id)
            .ok_or_else(|| DomainError::not_found("delivery", order_id))?;
        let current_delivery = stored_delivery.status();

        if current_order != write.expected_order || current_delivery != write.expected_delivery {
            return Err(StoreError::Stale(format!(
                "order {order_id}: expected {}/{}, found {current_order}/{current_delivery}",
                write.expected_order, write.expected_delivery
            )));
        }
        if stored_delivery.tracking() != &write.expected_tracking {
            return Err(StoreError::Stale(format!(
                "order {order_id}: delivery details changed since read"
            )));
        }

        tables.orders.insert(order_id, write.order.clone());
        tables.deliveries.insert(order_id, write.delivery.clone());
        Ok(())
    }

    async fn list(&self, query: &OrderQuery) -> Result<OrderPage, StoreError> {
        query.validate()?;
        let tables = self.tables.read().map_err(|_| StoreError::poisoned())?;

        let mut matching: Vec<&Order> = tables
            .orders
            .values()
            .filter(|o| query.customer_id.is_none_or(|c| o.customer_id() == c))
            .filter(|o| query.status.is_none_or(|s| o.status() == s))
            .collect();
        matching.sort_by(|a, b| {
            b.order_time()
                .cmp(&a.order_time())
                .then_with(|| b.id_typed().cmp(&a.id_typed()))
        });

        let total = matching.len() as u64;
        let orders = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.size as usize)
            .cloned()
            .collect();

        Ok(OrderPage {
            orders,
            total,
            page: query.page,
            size: query.size,
        })
    }

    async fn references_product(&self, product_id: ProductId) -> Result<bool, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::poisoned())?;
        Ok(tables
            .orders
            .values()
            .any(|o| o.items().iter().any(|item| item.product_id == product_id)))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryReconciliationLog {
    gaps: RwLock<Vec<ReconciliationGap>>,
}

impl InMemoryReconciliationLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReconciliationLog for InMemoryReconciliationLog {
    async fn record(&self, gap: ReconciliationGap) -> Result<(), StoreError> {
        let mut gaps = self.gaps.write().map_err(|_| StoreError::poisoned())?;
        gaps.push(gap);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ReconciliationGap>, StoreError> {
        let gaps = self.gaps.read().map_err(|_| StoreError::poisoned())?;
        Ok(gaps.clone())
    }
}
