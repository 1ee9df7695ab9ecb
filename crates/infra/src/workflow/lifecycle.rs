use tracing::{info, instrument};

use orderflow_core::{DomainError, OrderId};
use orderflow_delivery::{DeliveryStatus, ShipmentDetails};
use orderflow_orders::{OrderStateMachine, OrderStatus};

use super::{OrderDetail, OrderWorkflow, ShipmentRequest};
use crate::error::WorkflowResult;
use crate::store::GapKind;

impl OrderWorkflow {
    /// CREATED -> PAID, and the delivery PAYING -> SHIPPING.
    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn confirm_payment(&self, order_id: OrderId) -> WorkflowResult<OrderDetail> {
        let detail = self
            .transition(order_id, |order, delivery, at| {
                order.ensure_not_terminal()?;
                order.transition_to(OrderStatus::Paid, at)?;
                delivery.transition_to(DeliveryStatus::Shipping, at)?;
                Ok(())
            })
            .await?;
        info!(order_id = %order_id, "payment confirmed");
        Ok(detail)
    }

    /// PAID -> SHIPPING, and the delivery SHIPPING -> RECEIPTING with carrier
    /// details recorded.
    #[instrument(skip(self, shipment), fields(order_id = %order_id), err)]
    pub async fn ship_order(
        &self,
        order_id: OrderId,
        shipment: ShipmentRequest,
    ) -> WorkflowResult<OrderDetail> {
        let details = self.shipment_details(shipment);
        let detail = self
            .transition(order_id, |order, delivery, at| {
                order.ensure_not_terminal()?;
                order.transition_to(OrderStatus::Shipping, at)?;
                delivery.ship(&details, at)?;
                Ok(())
            })
            .await?;
        info!(order_id = %order_id, "order shipped");
        Ok(detail)
    }

    /// Consignee confirmed receipt: SHIPPING -> COMPLETED, delivery
    /// RECEIPTING -> COMPLETED, then each item's lock becomes a deduction.
    ///
    /// Deductions run after the status write; one that fails is recorded as a
    /// reconciliation gap and the order stays COMPLETED.
    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn confirm_delivery(&self, order_id: OrderId) -> WorkflowResult<OrderDetail> {
        let detail = self
            .transition(order_id, |order, delivery, at| {
                order.ensure_not_terminal()?;
                order.transition_to(OrderStatus::Completed, at)?;
                delivery.confirm_received(at)?;
                Ok(())
            })
            .await?;

        self.deduct_items(&detail).await;
        info!(order_id = %order_id, order_no = %detail.order.order_no(), "order completed");
        Ok(detail)
    }

    /// Cancel the order and its delivery, then release each item's lock.
    ///
    /// The status write commits first. A release that fails does not undo the
    /// cancellation; it is recorded as a reconciliation gap instead.
    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn cancel_order(&self, order_id: OrderId) -> WorkflowResult<OrderDetail> {
        let detail = self
            .transition(order_id, |order, delivery, at| {
                order.ensure_not_terminal()?;
                order.transition_to(OrderStatus::Cancelled, at)?;
                delivery.transition_to(DeliveryStatus::Cancelled, at)?;
                Ok(())
            })
            .await?;

        let order = &detail.order;
        for item in order.items() {
            if let Err(err) = self.ledger.release_stock(item.product_id, item.quantity).await {
                self.record_gap(
                    GapKind::CancelRelease,
                    order_id,
                    order.order_no(),
                    item.product_id,
                    item.quantity,
                    &err,
                )
                .await;
            }
        }
        info!(order_id = %order_id, order_no = %order.order_no(), "order cancelled");
        Ok(detail)
    }

    /// Route a requested order status to the operation that owns it.
    ///
    /// COMPLETED is only reachable through delivery confirmation, so it needs the
    /// delivery to be awaiting receipt. CREATED is never a valid target.
    pub async fn update_order_status(
        &self,
        order_id: OrderId,
        requested: OrderStatus,
    ) -> WorkflowResult<OrderDetail> {
        match requested {
            OrderStatus::Paid => self.confirm_payment(order_id).await,
            OrderStatus::Shipping => self.ship_order(order_id, ShipmentRequest::default()).await,
            OrderStatus::Completed => self.confirm_delivery(order_id).await,
            OrderStatus::Cancelled => self.cancel_order(order_id).await,
            OrderStatus::Created => {
                let current = self.load(order_id).await?;
                current.order.ensure_not_terminal()?;
                Err(DomainError::invalid_transition(
                    OrderStateMachine::MACHINE,
                    current.order.status(),
                    requested,
                )
                .into())
            }
        }
    }

    /// Open an after-sale case on a received delivery: RECEIPTING -> PROCESSING.
    /// The order status is not touched.
    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn apply_after_sale(&self, order_id: OrderId) -> WorkflowResult<OrderDetail> {
        self.transition(order_id, |_, delivery, at| {
            delivery.transition_to(DeliveryStatus::Processing, at)?;
            Ok(())
        })
        .await
    }

    /// Close an after-sale case: delivery PROCESSING -> PROCESSED and the order
    /// SHIPPING -> COMPLETED, then each item's lock becomes a deduction as on
    /// delivery confirmation. Failed deductions are reconciliation gaps.
    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn complete_after_sale(&self, order_id: OrderId) -> WorkflowResult<OrderDetail> {
        let detail = self
            .transition(order_id, |order, delivery, at| {
                delivery.transition_to(DeliveryStatus::Processed, at)?;
                order.transition_to(OrderStatus::Completed, at)?;
                Ok(())
            })
            .await?;

        self.deduct_items(&detail).await;
        info!(
            order_id = %order_id,
            order_no = %detail.order.order_no(),
            "after-sale closed; order completed"
        );
        Ok(detail)
    }

    /// Edit carrier details without changing status. Rejected once the delivery
    /// is terminal.
    #[instrument(skip(self, shipment), fields(order_id = %order_id), err)]
    pub async fn update_delivery_details(
        &self,
        order_id: OrderId,
        shipment: ShipmentRequest,
    ) -> WorkflowResult<OrderDetail> {
        let details = self.shipment_details(shipment);
        if details.is_empty() {
            return Err(DomainError::validation("no delivery details to update").into());
        }
        self.transition(order_id, |_, delivery, at| delivery.update_details(&details, at))
            .await
    }

    /// Turn each item's lock into a deduction. Runs after the status write.
    async fn deduct_items(&self, detail: &OrderDetail) {
        let order = &detail.order;
        for item in order.items() {
            if let Err(err) = self.ledger.deduct_stock(item.product_id, item.quantity).await {
                self.record_gap(
                    GapKind::CompletionDeduct,
                    order.id_typed(),
                    order.order_no(),
                    item.product_id,
                    item.quantity,
                    &err,
                )
                .await;
            }
        }
    }

    fn shipment_details(&self, shipment: ShipmentRequest) -> ShipmentDetails {
        let estimate_time = self.parse_estimate(shipment.estimate_time.as_deref());
        ShipmentDetails::new(shipment.tracking_no, shipment.shipper, estimate_time)
    }
}
