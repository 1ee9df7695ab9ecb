//! Order workflow.
//!
//! Orchestrates order creation as a saga over the inventory ledger, the order
//! store and delivery creation, and drives the coupled order/delivery status
//! machines afterwards.
//!
//! ```text
//! create_order
//!   normalize lines (merge duplicates, ascending product id)
//!   snapshot prices, pre-check stock
//!   lock each line            -- failure: release earlier locks, fail
//!   persist order + delivery  -- failure: release all locks, fail
//!
//! status changes
//!   load order + delivery, apply both state machines to copies,
//!   write both rows guarded by the statuses and tracking that were read
//!   then release (cancel) or deduct (completion) per item, best-effort
//! ```
//!
//! Any counter change that should have happened but failed after the point of no
//! return is logged at `error` and recorded in the [`ReconciliationLog`].

mod create;
mod lifecycle;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use orderflow_core::{Clock, CustomerId, DomainError, DomainResult, OrderId, ProductId};
use orderflow_delivery::{ConsigneeInfo, Delivery, parse_estimate_time};
use orderflow_orders::{Order, OrderLineRequest, OrderNo};

use crate::error::{WorkflowError, WorkflowResult};
use crate::id_generator::IdGenerator;
use crate::ledger::InventoryLedger;
use crate::store::{
    GapKind, OrderPage, OrderQuery, OrderStore, ProductCatalog, ReconciliationGap,
    ReconciliationLog, StatusWrite, StoreError, Stores,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: CustomerId,
    /// Caller-chosen order number. Reusing one returns the existing order.
    #[serde(default)]
    pub order_no: Option<String>,
    pub items: Vec<OrderLineRequest>,
    pub consignee: ConsigneeInfo,
    #[serde(default)]
    pub estimate_time: Option<String>,
}

/// Carrier fields supplied on shipment or when editing a delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentRequest {
    #[serde(default)]
    pub tracking_no: Option<String>,
    #[serde(default)]
    pub shipper: Option<String>,
    #[serde(default)]
    pub estimate_time: Option<String>,
}

/// An order together with its delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetail {
    pub order: Order,
    pub delivery: Delivery,
}

#[derive(Clone)]
pub struct OrderWorkflow {
    ledger: InventoryLedger,
    catalog: Arc<dyn ProductCatalog>,
    orders: Arc<dyn OrderStore>,
    reconciliation: Arc<dyn ReconciliationLog>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl OrderWorkflow {
    pub fn new(
        stores: &Stores,
        ledger: InventoryLedger,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            catalog: stores.catalog.clone(),
            orders: stores.orders.clone(),
            reconciliation: stores.reconciliation.clone(),
            ids,
            clock,
        }
    }

    pub fn ledger(&self) -> &InventoryLedger {
        &self.ledger
    }

    pub async fn get_order_detail(&self, order_id: OrderId) -> WorkflowResult<OrderDetail> {
        self.load(order_id).await
    }

    pub async fn get_delivery(&self, order_id: OrderId) -> WorkflowResult<Delivery> {
        self.orders
            .get_delivery(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("delivery", order_id).into())
    }

    pub async fn list_orders(&self, query: &OrderQuery) -> WorkflowResult<OrderPage> {
        query.validate()?;
        Ok(self.orders.list(query).await?)
    }

    pub async fn reconciliation_gaps(&self) -> WorkflowResult<Vec<ReconciliationGap>> {
        Ok(self.reconciliation.list().await?)
    }

    async fn load(&self, order_id: OrderId) -> WorkflowResult<OrderDetail> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_id))?;
        let delivery = self
            .orders
            .get_delivery(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("delivery", order_id))?;
        Ok(OrderDetail { order, delivery })
    }

    /// Apply `step` to copies of the order and its delivery and write both rows,
    /// guarded by the statuses and delivery tracking that were read.
    ///
    /// If another caller changed either row first, `step` is re-run against the
    /// stored state so the caller sees the state machines' verdict; a move that
    /// would still be legal is reported as `Conflict`.
    async fn transition<F>(&self, order_id: OrderId, step: F) -> WorkflowResult<OrderDetail>
    where
        F: Fn(&mut Order, &mut Delivery, DateTime<Utc>) -> DomainResult<()> + Send + Sync,
    {
        let current = self.load(order_id).await?;
        let now = self.clock.now();
        let mut next = current.clone();
        step(&mut next.order, &mut next.delivery, now)?;

        let write = StatusWrite {
            expected_order: current.order.status(),
            order: next.order.clone(),
            expected_delivery: current.delivery.status(),
            expected_tracking: current.delivery.tracking().clone(),
            delivery: next.delivery.clone(),
        };

        match self.orders.save_transition(&write).await {
            Ok(()) => Ok(next),
            Err(StoreError::Stale(reason)) => {
                warn!(order_id = %order_id, reason = %reason, "status write lost a race");
                let mut actual = self.load(order_id).await?;
                step(&mut actual.order, &mut actual.delivery, now)?;
                Err(DomainError::conflict(format!(
                    "order {order_id} was modified concurrently; retry"
                ))
                .into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Parse an optional estimate. Unparseable input is logged and ignored.
    fn parse_estimate(&self, raw: Option<&str>) -> Option<DateTime<Utc>> {
        let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
        match parse_estimate_time(raw) {
            Ok(at) => Some(at),
            Err(err) => {
                warn!(estimate_time = raw, error = %err, "ignoring unparseable estimate time");
                None
            }
        }
    }

    /// Log and persist a counter change that could not be made.
    async fn record_gap(
        &self,
        kind: GapKind,
        order_id: OrderId,
        order_no: &OrderNo,
        product_id: ProductId,
        quantity: i64,
        cause: &WorkflowError,
    ) {
        error!(
            kind = kind.as_str(),
            order_id = %order_id,
            order_no = %order_no,
            product_id = %product_id,
            quantity,
            error = %cause,
            "reconciliation gap: stock counters need manual repair"
        );
        let gap = ReconciliationGap::new(
            kind,
            order_id,
            order_no,
            product_id,
            quantity,
            cause,
            self.clock.now(),
        );
        if let Err(err) = self.reconciliation.record(gap).await {
            error!(
                order_id = %order_id,
                product_id = %product_id,
                error = %err,
                "failed to record reconciliation gap"
            );
        }
    }
}
