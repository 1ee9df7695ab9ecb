use tracing::{info, instrument};

use orderflow_core::{CustomerId, DeliveryId, DomainError, OrderId, ProductId};
use orderflow_delivery::Delivery;
use orderflow_orders::{Order, OrderItem, OrderLineRequest, OrderNo, normalize_lines};

use super::{CreateOrderRequest, OrderDetail, OrderWorkflow};
use crate::error::WorkflowResult;
use crate::store::{GapKind, StoreError};

/// Locks taken so far by one creation attempt, undone in reverse on failure.
struct Compensation {
    order_id: OrderId,
    order_no: OrderNo,
    locked: Vec<(ProductId, i64)>,
}

impl Compensation {
    fn new(order_id: OrderId, order_no: OrderNo) -> Self {
        Self {
            order_id,
            order_no,
            locked: Vec::new(),
        }
    }

    fn record(&mut self, product_id: ProductId, quantity: i64) {
        self.locked.push((product_id, quantity));
    }
}

impl OrderWorkflow {
    /// Create an order: lock stock for every line, snapshot prices, then persist
    /// the order with its items and a PAYING delivery in one write.
    ///
    /// Locks are taken in ascending product id order. If any step fails, every
    /// lock already taken is released and no order is persisted. Reusing an order
    /// number returns the order it already names.
    #[instrument(
        skip(self, request),
        fields(customer_id = %request.customer_id, lines = request.items.len()),
        err
    )]
    pub async fn create_order(&self, request: CreateOrderRequest) -> WorkflowResult<OrderDetail> {
        let lines = normalize_lines(&request.items)?;
        request.consignee.validate()?;
        let order_time = self.clock.now();

        let order_no = match request.order_no.as_deref() {
            Some(raw) => {
                let order_no = OrderNo::parse(raw)?;
                if let Some(existing) = self.orders.find_by_order_no(&order_no).await? {
                    return self.replay(existing, request.customer_id).await;
                }
                order_no
            }
            None => OrderNo::generate(order_time, &self.ids.next_token()),
        };

        let prices = self.snapshot_prices(&lines).await?;

        for line in &lines {
            if !self.ledger.check_stock(line.product_id, line.quantity).await? {
                let inventory = self.ledger.get_availability(line.product_id).await?;
                return Err(DomainError::insufficient_stock(
                    line.product_id,
                    line.quantity,
                    inventory.available_stock(),
                )
                .into());
            }
        }

        let order_id = OrderId::new();
        let mut compensation = Compensation::new(order_id, order_no.clone());
        for line in &lines {
            if let Err(err) = self.ledger.lock_stock(line.product_id, line.quantity).await {
                self.compensate(compensation).await;
                return Err(err);
            }
            compensation.record(line.product_id, line.quantity);
        }

        let estimate_time = self.parse_estimate(request.estimate_time.as_deref());
        let built = lines
            .iter()
            .zip(&prices)
            .map(|(line, price)| OrderItem::priced(order_id, line.product_id, line.quantity, *price))
            .collect::<Result<Vec<_>, _>>()
            .and_then(|items| {
                Order::create(order_id, order_no.clone(), request.customer_id, order_time, items)
            })
            .and_then(|order| {
                Delivery::open(
                    DeliveryId::new(),
                    order_id,
                    request.consignee.clone(),
                    estimate_time,
                    order_time,
                )
                .map(|delivery| (order, delivery))
            });
        let (order, delivery) = match built {
            Ok(pair) => pair,
            Err(err) => {
                self.compensate(compensation).await;
                return Err(err.into());
            }
        };

        match self.orders.create(&order, &delivery).await {
            Ok(()) => {
                info!(
                    order_id = %order_id,
                    order_no = %order_no,
                    total_amount = order.total_amount(),
                    "order created"
                );
                Ok(OrderDetail { order, delivery })
            }
            Err(StoreError::Duplicate(reason)) => {
                // A concurrent request with the same order number won the insert.
                self.compensate(compensation).await;
                match self.orders.find_by_order_no(&order_no).await? {
                    Some(existing) => self.replay(existing, request.customer_id).await,
                    None => Err(DomainError::conflict(reason).into()),
                }
            }
            Err(err) => {
                self.compensate(compensation).await;
                Err(err.into())
            }
        }
    }

    /// Current unit price of each line, in line order. Products must exist and
    /// be orderable.
    async fn snapshot_prices(&self, lines: &[OrderLineRequest]) -> WorkflowResult<Vec<u64>> {
        let mut prices = Vec::with_capacity(lines.len());
        for line in lines {
            let product = self
                .catalog
                .get_product(line.product_id)
                .await?
                .ok_or_else(|| DomainError::not_found("product", line.product_id))?;
            product.ensure_orderable()?;
            prices.push(product.unit_price);
        }
        Ok(prices)
    }

    /// Answer a repeated order number with the order it already names.
    async fn replay(&self, existing: Order, customer_id: CustomerId) -> WorkflowResult<OrderDetail> {
        if existing.customer_id() != customer_id {
            return Err(DomainError::conflict(format!(
                "order number {} is already used by another customer",
                existing.order_no()
            ))
            .into());
        }
        info!(
            order_id = %existing.id_typed(),
            order_no = %existing.order_no(),
            "order number already used; returning existing order"
        );
        let delivery = self.get_delivery(existing.id_typed()).await?;
        Ok(OrderDetail {
            order: existing,
            delivery,
        })
    }

    /// Release every lock in reverse order. Failures become reconciliation gaps.
    async fn compensate(&self, compensation: Compensation) {
        let Compensation {
            order_id,
            order_no,
            locked,
        } = compensation;
        for (product_id, quantity) in locked.into_iter().rev() {
            if let Err(err) = self.ledger.release_stock(product_id, quantity).await {
                self.record_gap(
                    GapKind::CompensationRelease,
                    order_id,
                    &order_no,
                    product_id,
                    quantity,
                    &err,
                )
                .await;
            }
        }
    }
}

