use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orderflow_core::{CustomerId, DeliveryId, OrderId, ProductId};
use orderflow_delivery::{ConsigneeInfo, Delivery, DeliveryStatus, Tracking};
use orderflow_infra::OrderDetail;
use orderflow_infra::store::{OrderPage, OrderQuery};
use orderflow_inventory::Inventory;
use orderflow_orders::{Order, OrderItem, OrderStatus};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersParams {
    pub customer_id: Option<CustomerId>,
    pub status: Option<OrderStatus>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl ListOrdersParams {
    pub fn into_query(self) -> OrderQuery {
        let defaults = OrderQuery::default();
        OrderQuery {
            customer_id: self.customer_id,
            status: self.status,
            page: self.page.unwrap_or(defaults.page),
            size: self.size.unwrap_or(defaults.size),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateInventoryRequest {
    pub product_id: ProductId,
    pub stock: Option<i64>,
    pub low_stock_threshold: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub delta: i64,
}

#[derive(Debug, Deserialize)]
pub struct ThresholdRequest {
    pub low_stock_threshold: i64,
}

#[derive(Debug, Deserialize)]
pub struct CheckStockParams {
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub id: Option<ProductId>,
    pub name: String,
    pub unit_price: u64,
    #[serde(default = "active_by_default")]
    pub active: bool,
}

fn active_by_default() -> bool {
    true
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct InventoryResponse {
    pub product_id: ProductId,
    pub stock: i64,
    pub locked_stock: i64,
    pub available_stock: i64,
    pub low_stock_threshold: i64,
    pub low_stock: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<&Inventory> for InventoryResponse {
    fn from(inv: &Inventory) -> Self {
        Self {
            product_id: inv.product_id(),
            stock: inv.stock(),
            locked_stock: inv.locked_stock(),
            available_stock: inv.available_stock(),
            low_stock_threshold: inv.low_stock_threshold(),
            low_stock: inv.is_low_stock(),
            updated_at: inv.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CheckStockResponse {
    pub product_id: ProductId,
    pub quantity: i64,
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct DeliveryResponse {
    pub id: DeliveryId,
    pub order_id: OrderId,
    pub status: DeliveryStatus,
    pub consignee: ConsigneeInfo,
    #[serde(flatten)]
    pub tracking: Tracking,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Delivery> for DeliveryResponse {
    fn from(d: &Delivery) -> Self {
        Self {
            id: d.id_typed(),
            order_id: d.order_id(),
            status: d.status(),
            consignee: d.consignee().clone(),
            tracking: d.tracking().clone(),
            created_at: d.created_at(),
            updated_at: d.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub order_no: String,
    pub customer_id: CustomerId,
    pub order_time: DateTime<Utc>,
    pub total_amount: u64,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryResponse>,
}

impl From<&Order> for OrderResponse {
    fn from(o: &Order) -> Self {
        Self {
            id: o.id_typed(),
            order_no: o.order_no().to_string(),
            customer_id: o.customer_id(),
            order_time: o.order_time(),
            total_amount: o.total_amount(),
            status: o.status(),
            items: o.items().to_vec(),
            delivery: None,
        }
    }
}

impl From<&OrderDetail> for OrderResponse {
    fn from(detail: &OrderDetail) -> Self {
        Self {
            delivery: Some(DeliveryResponse::from(&detail.delivery)),
            ..OrderResponse::from(&detail.order)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderPageResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
}

impl From<&OrderPage> for OrderPageResponse {
    fn from(page: &OrderPage) -> Self {
        Self {
            orders: page.orders.iter().map(OrderResponse::from).collect(),
            total: page.total,
            page: page.page,
            size: page.size,
        }
    }
}
