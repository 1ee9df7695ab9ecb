//! Postgres-backed stores.
//!
//! Stock counters change only through single conditional `UPDATE ... WHERE guard
//! RETURNING` statements, so the guard and the write are one atomic step in the
//! database regardless of how many processes share it. Order creation and status
//! transitions run inside transactions.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Database (check constraint violation) | `23514` | `Backend` (a guard should have caught it) |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / RowNotFound / Other | N/A | `Backend` |

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{instrument, warn};
use uuid::Uuid;

use orderflow_catalog::Product;
use orderflow_core::{CustomerId, DeliveryId, DomainError, Entity, OrderId, ProductId};
use orderflow_delivery::{ConsigneeInfo, Delivery, DeliveryStatus, Tracking};
use orderflow_inventory::{Inventory, StockMutation};
use orderflow_orders::{Order, OrderItem, OrderNo, OrderStatus};

use super::r#trait::{
    GapKind, InventoryStore, OrderPage, OrderQuery, OrderStore, ProductCatalog,
    ReconciliationGap, ReconciliationLog, StatusWrite, StoreError, Stores, locked_record,
};

/// Schema applied by [`PostgresStore::migrate`].
pub const SCHEMA: &str = include_str!("../../migrations/0001_orderflow.sql");

/// How often a conditional stock update is retried when the row changed between
/// the failed guard and the diagnostic read.
const STOCK_UPDATE_ATTEMPTS: usize = 3;

const INVENTORY_COLUMNS: &str = "product_id, stock, locked_stock, low_stock_threshold, updated_at";
const ORDER_COLUMNS: &str = "id, order_no, customer_id, order_time, total_amount, status, updated_at";
const DELIVERY_COLUMNS: &str = "id, order_id, status, consignee_name, consignee_phone, \
     delivery_address, remark, tracking_no, shipper, estimate_time, ship_time, delivery_time, \
     created_at, updated_at";

/// Implements every store trait against one connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the schema. Idempotent.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    pub fn into_stores(self) -> Stores {
        let shared = Arc::new(self);
        Stores {
            catalog: shared.clone(),
            inventory: shared.clone(),
            orders: shared.clone(),
            reconciliation: shared,
        }
    }

    async fn fetch_inventory(&self, product_id: ProductId) -> Result<Option<Inventory>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory WHERE product_id = $1"
        ))
        .bind(product_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_inventory", e))?;
        row.as_ref().map(inventory_from_row).transpose()
    }

    async fn load_items(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, product_id, quantity, unit_price, item_amount
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, product_id
            "#,
        )
        .bind(order_ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_items", e))?;

        let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in &rows {
            let item = item_from_row(row)?;
            by_order
                .entry(*item.order_id.as_uuid())
                .or_default()
                .push(item);
        }
        Ok(by_order)
    }

    async fn hydrate_orders(&self, rows: &[PgRow]) -> Result<Vec<Order>, StoreError> {
        let ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("decode_order", e))?;
        let mut items = self.load_items(&ids).await?;
        rows.iter()
            .map(|row| -> Result<Order, StoreError> {
                let id: Uuid = row.try_get("id").map_err(|e| map_sqlx_error("decode_order", e))?;
                order_from_row(row, items.remove(&id).unwrap_or_default())
            })
            .collect()
    }
}

#[async_trait]
impl ProductCatalog for PostgresStore {
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query("SELECT id, name, unit_price, active FROM products WHERE id = $1")
            .bind(product_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;

        row.map(|row| -> Result<Product, StoreError> {
            let decode = |e| map_sqlx_error("decode_product", e);
            let id: Uuid = row.try_get("id").map_err(decode)?;
            let name: String = row.try_get("name").map_err(decode)?;
            let unit_price: i64 = row.try_get("unit_price").map_err(decode)?;
            let active: bool = row.try_get("active").map_err(decode)?;
            let product = Product::new(ProductId::from_uuid(id), name, to_amount(unit_price)?)
                .map_err(corrupt_row)?;
            Ok(if active { product } else { product.deactivated() })
        })
        .transpose()
    }

    #[instrument(skip(self, product), fields(product_id = %product.id()), err)]
    async fn upsert_product(&self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, unit_price, active)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, unit_price = EXCLUDED.unit_price, active = EXCLUDED.active
            "#,
        )
        .bind(product.id().as_uuid())
        .bind(&product.name)
        .bind(to_column(product.unit_price)?)
        .bind(product.active)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_product", e))?;
        Ok(())
    }
}

/// Conditional update for a mutation: `$1` product id, `$2` amount, `$3` timestamp,
/// and `$4` the expected value when the guard compares against one.
fn conditional_update(mutation: StockMutation) -> (String, i64, Option<i64>) {
    let mut expected = None;
    let (set, guard, amount) = match mutation {
        StockMutation::Lock { quantity } => (
            "locked_stock = locked_stock + $2",
            "stock - locked_stock >= $2",
            quantity,
        ),
        StockMutation::Release { quantity } => {
            ("locked_stock = locked_stock - $2", "locked_stock >= $2", quantity)
        }
        StockMutation::Deduct { quantity } => (
            "stock = stock - $2, locked_stock = locked_stock - $2",
            "locked_stock >= $2 AND stock >= $2",
            quantity,
        ),
        StockMutation::Adjust { delta } => ("stock = stock + $2", "stock + $2 >= locked_stock", delta),
        StockMutation::SetThreshold { threshold } => ("low_stock_threshold = $2", "TRUE", threshold),
        StockMutation::RestoreThreshold { from, to } => {
            expected = Some(from);
            ("low_stock_threshold = $2", "low_stock_threshold = $4", to)
        }
    };
    (
        format!(
            "UPDATE inventory SET {set}, updated_at = $3 \
             WHERE product_id = $1 AND {guard} \
             RETURNING {INVENTORY_COLUMNS}"
        ),
        amount,
        expected,
    )
}

#[async_trait]
impl InventoryStore for PostgresStore {
    #[instrument(skip(self, inventory), fields(product_id = %inventory.product_id()), err)]
    async fn insert(&self, inventory: &Inventory) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO inventory ({INVENTORY_COLUMNS}) VALUES ($1, $2, $3, $4, $5)"
        ))
        .bind(inventory.product_id().as_uuid())
        .bind(inventory.stock())
        .bind(inventory.locked_stock())
        .bind(inventory.low_stock_threshold())
        .bind(inventory.updated_at())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_inventory", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn get(&self, product_id: ProductId) -> Result<Option<Inventory>, StoreError> {
        self.fetch_inventory(product_id).await
    }

    #[instrument(
        skip(self),
        fields(product_id = %product_id, mutation = mutation.name()),
        err
    )]
    async fn apply(
        &self,
        product_id: ProductId,
        mutation: StockMutation,
        at: DateTime<Utc>,
    ) -> Result<Inventory, StoreError> {
        mutation.validate()?;
        let (sql, amount, expected) = conditional_update(mutation);

        for attempt in 1..=STOCK_UPDATE_ATTEMPTS {
            let mut query = sqlx::query(&sql)
                .bind(product_id.as_uuid())
                .bind(amount)
                .bind(at);
            if let Some(expected) = expected {
                query = query.bind(expected);
            }
            let updated = query
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("apply_stock_mutation", e))?;
            if let Some(row) = updated {
                return inventory_from_row(&row);
            }

            // The guard did not hold; let the domain rule explain why.
            let Some(mut current) = self.fetch_inventory(product_id).await? else {
                return Err(DomainError::not_found("inventory", product_id).into());
            };
            mutation.apply(&mut current, at)?;
            warn!(attempt, "stock row changed between guard and diagnosis; retrying");
        }

        Err(StoreError::Stale(format!(
            "inventory for product {product_id} kept changing during {}",
            mutation.name()
        )))
    }

    #[instrument(skip(self), err)]
    async fn list_low_stock(&self) -> Result<Vec<Inventory>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory \
             WHERE stock - locked_stock <= low_stock_threshold \
             ORDER BY product_id ASC"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_low_stock", e))?;
        rows.iter().map(inventory_from_row).collect()
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn delete(&self, product_id: ProductId) -> Result<(), StoreError> {
        let result =
            sqlx::query("DELETE FROM inventory WHERE product_id = $1 AND locked_stock = 0")
                .bind(product_id.as_uuid())
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("delete_inventory", e))?;
        if result.rows_affected() == 0 {
            return match self.fetch_inventory(product_id).await? {
                Some(current) => Err(locked_record(product_id, current.locked_stock()).into()),
                None => Err(DomainError::not_found("inventory", product_id).into()),
            };
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    #[instrument(
        skip(self, order, delivery),
        fields(order_id = %order.id_typed(), order_no = %order.order_no()),
        err
    )]
    async fn create(&self, order: &Order, delivery: &Delivery) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(order.id_typed().as_uuid())
        .bind(order.order_no().as_str())
        .bind(order.customer_id().as_uuid())
        .bind(order.order_time())
        .bind(to_column(order.total_amount())?)
        .bind(order.status().as_str())
        .bind(order.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        for item in order.items() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, product_id, quantity, unit_price, item_amount)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(item.order_id.as_uuid())
            .bind(item.product_id.as_uuid())
            .bind(item.quantity)
            .bind(to_column(item.unit_price)?)
            .bind(to_column(item.item_amount)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order_item", e))?;
        }

        insert_delivery(&mut tx, delivery).await?;

        // Dropping `tx` on an early return above rolls everything back.
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_order", e))?;
        match row {
            Some(row) => Ok(self.hydrate_orders(&[row]).await?.pop()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(order_no = %order_no), err)]
    async fn find_by_order_no(&self, order_no: &OrderNo) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_no = $1"))
            .bind(order_no.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_order_no", e))?;
        match row {
            Some(row) => Ok(self.hydrate_orders(&[row]).await?.pop()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    async fn get_delivery(&self, order_id: OrderId) -> Result<Option<Delivery>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE order_id = $1"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_delivery", e))?;
        row.as_ref().map(delivery_from_row).transpose()
    }

    #[instrument(
        skip(self, write),
        fields(
            order_id = %write.order.id_typed(),
            order_status = %write.order.status(),
            delivery_status = %write.delivery.status()
        ),
        err
    )]
    async fn save_transition(&self, write: &StatusWrite) -> Result<(), StoreError> {
        let order_id = write.order.id_typed();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let order_rows = sqlx::query(
            "UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1 AND status = $4",
        )
        .bind(order_id.as_uuid())
        .bind(write.order.status().as_str())
        .bind(write.order.updated_at())
        .bind(write.expected_order.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_order_status", e))?
        .rows_affected();

        let tracking = write.delivery.tracking();
        let expected = &write.expected_tracking;
        let delivery_rows = sqlx::query(
            r#"
            UPDATE deliveries
            SET status = $2, tracking_no = $3, shipper = $4, estimate_time = $5,
                ship_time = $6, delivery_time = $7, updated_at = $8
            WHERE order_id = $1 AND status = $9
              AND tracking_no IS NOT DISTINCT FROM $10
              AND shipper IS NOT DISTINCT FROM $11
              AND estimate_time IS NOT DISTINCT FROM $12
              AND ship_time IS NOT DISTINCT FROM $13
              AND delivery_time IS NOT DISTINCT FROM $14
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(write.delivery.status().as_str())
        .bind(tracking.tracking_no.as_deref())
        .bind(tracking.shipper.as_deref())
        .bind(tracking.estimate_time)
        .bind(tracking.ship_time)
        .bind(tracking.delivery_time)
        .bind(write.delivery.updated_at())
        .bind(write.expected_delivery.as_str())
        .bind(expected.tracking_no.as_deref())
        .bind(expected.shipper.as_deref())
        .bind(expected.estimate_time)
        .bind(expected.ship_time)
        .bind(expected.delivery_time)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_delivery", e))?
        .rows_affected();

        if order_rows != 1 || delivery_rows != 1 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Stale(format!(
                "order {order_id}: expected {}/{} with unchanged delivery details",
                write.expected_order, write.expected_delivery
            )));
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list(&self, query: &OrderQuery) -> Result<OrderPage, StoreError> {
        query.validate()?;
        let customer = query.customer_id.map(|c| *c.as_uuid());
        let status = query.status.map(|s| s.as_str());

        let count_row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total FROM orders
            WHERE ($1::uuid IS NULL OR customer_id = $1)
              AND ($2::text IS NULL OR status = $2)
            "#,
        )
        .bind(customer)
        .bind(status)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_orders", e))?;
        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| map_sqlx_error("count_orders", e))?;

        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE ($1::uuid IS NULL OR customer_id = $1) \
               AND ($2::text IS NULL OR status = $2) \
             ORDER BY order_time DESC, id DESC \
             LIMIT $3 OFFSET $4"
        ))
        .bind(customer)
        .bind(status)
        .bind(i64::from(query.size))
        .bind(query.offset() as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_orders", e))?;

        Ok(OrderPage {
            orders: self.hydrate_orders(&rows).await?,
            total: total.max(0) as u64,
            page: query.page,
            size: query.size,
        })
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn references_product(&self, product_id: ProductId) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM order_items WHERE product_id = $1) AS referenced",
        )
        .bind(product_id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("references_product", e))?;
        row.try_get("referenced")
            .map_err(|e| map_sqlx_error("references_product", e))
    }
}

#[async_trait]
impl ReconciliationLog for PostgresStore {
    #[instrument(skip(self, gap), fields(kind = gap.kind.as_str(), order_id = %gap.order_id), err)]
    async fn record(&self, gap: ReconciliationGap) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO reconciliation_gaps
                (id, kind, order_id, order_no, product_id, quantity, error, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(gap.id)
        .bind(gap.kind.as_str())
        .bind(gap.order_id.as_uuid())
        .bind(&gap.order_no)
        .bind(gap.product_id.as_uuid())
        .bind(gap.quantity)
        .bind(&gap.error)
        .bind(gap.recorded_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("record_gap", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list(&self) -> Result<Vec<ReconciliationGap>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, order_id, order_no, product_id, quantity, error, recorded_at
            FROM reconciliation_gaps
            ORDER BY recorded_at ASC, id ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_gaps", e))?;

        rows.iter()
            .map(|row| -> Result<ReconciliationGap, StoreError> {
                let decode = |e| map_sqlx_error("decode_gap", e);
                let kind: String = row.try_get("kind").map_err(decode)?;
                Ok(ReconciliationGap {
                    id: row.try_get("id").map_err(decode)?,
                    kind: kind.parse::<GapKind>()?,
                    order_id: OrderId::from_uuid(row.try_get("order_id").map_err(decode)?),
                    order_no: row.try_get("order_no").map_err(decode)?,
                    product_id: ProductId::from_uuid(row.try_get("product_id").map_err(decode)?),
                    quantity: row.try_get("quantity").map_err(decode)?,
                    error: row.try_get("error").map_err(decode)?,
                    recorded_at: row.try_get("recorded_at").map_err(decode)?,
                })
            })
            .collect()
    }
}

async fn insert_delivery(
    tx: &mut Transaction<'_, Postgres>,
    delivery: &Delivery,
) -> Result<(), StoreError> {
    let consignee = delivery.consignee();
    let tracking = delivery.tracking();
    sqlx::query(&format!(
        "INSERT INTO deliveries ({DELIVERY_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
    ))
    .bind(delivery.id_typed().as_uuid())
    .bind(delivery.order_id().as_uuid())
    .bind(delivery.status().as_str())
    .bind(&consignee.name)
    .bind(&consignee.phone)
    .bind(&consignee.address)
    .bind(consignee.remark.as_deref())
    .bind(tracking.tracking_no.as_deref())
    .bind(tracking.shipper.as_deref())
    .bind(tracking.estimate_time)
    .bind(tracking.ship_time)
    .bind(tracking.delivery_time)
    .bind(delivery.created_at())
    .bind(delivery.updated_at())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_delivery", e))?;
    Ok(())
}

fn inventory_from_row(row: &PgRow) -> Result<Inventory, StoreError> {
    let decode = |e| map_sqlx_error("decode_inventory", e);
    let product_id: Uuid = row.try_get("product_id").map_err(decode)?;
    Inventory::restore(
        ProductId::from_uuid(product_id),
        row.try_get("stock").map_err(decode)?,
        row.try_get("locked_stock").map_err(decode)?,
        row.try_get("low_stock_threshold").map_err(decode)?,
        row.try_get("updated_at").map_err(decode)?,
    )
    .map_err(corrupt_row)
}

fn item_from_row(row: &PgRow) -> Result<OrderItem, StoreError> {
    let decode = |e| map_sqlx_error("decode_order_item", e);
    Ok(OrderItem {
        order_id: OrderId::from_uuid(row.try_get("order_id").map_err(decode)?),
        product_id: ProductId::from_uuid(row.try_get("product_id").map_err(decode)?),
        quantity: row.try_get("quantity").map_err(decode)?,
        unit_price: to_amount(row.try_get("unit_price").map_err(decode)?)?,
        item_amount: to_amount(row.try_get("item_amount").map_err(decode)?)?,
    })
}

fn order_from_row(row: &PgRow, items: Vec<OrderItem>) -> Result<Order, StoreError> {
    let decode = |e| map_sqlx_error("decode_order", e);
    let order_no: String = row.try_get("order_no").map_err(decode)?;
    let status: String = row.try_get("status").map_err(decode)?;
    Ok(Order::restore(
        OrderId::from_uuid(row.try_get("id").map_err(decode)?),
        OrderNo::parse(order_no).map_err(corrupt_row)?,
        CustomerId::from_uuid(row.try_get("customer_id").map_err(decode)?),
        row.try_get("order_time").map_err(decode)?,
        to_amount(row.try_get("total_amount").map_err(decode)?)?,
        status.parse::<OrderStatus>().map_err(corrupt_row)?,
        items,
        row.try_get("updated_at").map_err(decode)?,
    ))
}

fn delivery_from_row(row: &PgRow) -> Result<Delivery, StoreError> {
    let decode = |e| map_sqlx_error("decode_delivery", e);
    let status: String = row.try_get("status").map_err(decode)?;
    let consignee = ConsigneeInfo {
        name: row.try_get("consignee_name").map_err(decode)?,
        phone: row.try_get("consignee_phone").map_err(decode)?,
        address: row.try_get("delivery_address").map_err(decode)?,
        remark: row.try_get("remark").map_err(decode)?,
    };
    let tracking = Tracking {
        tracking_no: row.try_get("tracking_no").map_err(decode)?,
        shipper: row.try_get("shipper").map_err(decode)?,
        estimate_time: row.try_get("estimate_time").map_err(decode)?,
        ship_time: row.try_get("ship_time").map_err(decode)?,
        delivery_time: row.try_get("delivery_time").map_err(decode)?,
    };
    Ok(Delivery::restore(
        DeliveryId::from_uuid(row.try_get("id").map_err(decode)?),
        OrderId::from_uuid(row.try_get("order_id").map_err(decode)?),
        status.parse::<DeliveryStatus>().map_err(corrupt_row)?,
        consignee,
        tracking,
        row.try_get("created_at").map_err(decode)?,
        row.try_get("updated_at").map_err(decode)?,
    ))
}

fn to_column(amount: u64) -> Result<i64, StoreError> {
    i64::try_from(amount)
        .map_err(|_| DomainError::validation(format!("amount {amount} exceeds storable range")).into())
}

fn to_amount(column: i64) -> Result<u64, StoreError> {
    u64::try_from(column).map_err(|_| StoreError::Backend(format!("negative amount in row: {column}")))
}

fn corrupt_row(err: DomainError) -> StoreError {
    StoreError::Backend(format!("corrupt row: {err}"))
}

/// Map SQLx errors to `StoreError`.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Duplicate(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
