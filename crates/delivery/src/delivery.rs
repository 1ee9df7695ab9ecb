use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orderflow_core::{DeliveryId, DomainError, DomainResult, Entity, OrderId};

use crate::shipment::{ConsigneeInfo, ShipmentDetails, Tracking};
use crate::state_machine::{DeliveryStateMachine, DeliveryStatus};

/// One delivery per order, keyed by `order_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    id: DeliveryId,
    order_id: OrderId,
    status: DeliveryStatus,
    consignee: ConsigneeInfo,
    tracking: Tracking,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Delivery {
    /// New delivery awaiting payment.
    pub fn open(
        id: DeliveryId,
        order_id: OrderId,
        consignee: ConsigneeInfo,
        estimate_time: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        consignee.validate()?;
        Ok(Self {
            id,
            order_id,
            status: DeliveryStatus::Paying,
            consignee,
            tracking: Tracking {
                estimate_time,
                ..Tracking::default()
            },
            created_at: at,
            updated_at: at,
        })
    }

    pub fn restore(
        id: DeliveryId,
        order_id: OrderId,
        status: DeliveryStatus,
        consignee: ConsigneeInfo,
        tracking: Tracking,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            order_id,
            status,
            consignee,
            tracking,
            created_at,
            updated_at,
        }
    }

    pub fn id_typed(&self) -> DeliveryId {
        self.id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn status(&self) -> DeliveryStatus {
        self.status
    }

    pub fn consignee(&self) -> &ConsigneeInfo {
        &self.consignee
    }

    pub fn tracking(&self) -> &Tracking {
        &self.tracking
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Validated status move. Returns the previous status.
    pub fn transition_to(&mut self, requested: DeliveryStatus, at: DateTime<Utc>) -> DomainResult<DeliveryStatus> {
        let previous = self.status;
        self.status = DeliveryStateMachine::transition(previous, requested)?;
        self.updated_at = at;
        Ok(previous)
    }

    /// SHIPPING -> RECEIPTING, recording carrier fields and the ship time.
    pub fn ship(&mut self, details: &ShipmentDetails, at: DateTime<Utc>) -> DomainResult<()> {
        self.transition_to(DeliveryStatus::Receipting, at)?;
        self.apply_details(details);
        self.tracking.ship_time = Some(at);
        Ok(())
    }

    /// RECEIPTING -> COMPLETED, recording the delivery time.
    pub fn confirm_received(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        self.transition_to(DeliveryStatus::Completed, at)?;
        self.tracking.delivery_time = Some(at);
        Ok(())
    }

    /// Edit tracking fields without touching status.
    pub fn update_details(&mut self, details: &ShipmentDetails, at: DateTime<Utc>) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::validation(format!(
                "delivery for order {} is {} and can no longer be edited",
                self.order_id, self.status
            )));
        }
        self.apply_details(details);
        self.updated_at = at;
        Ok(())
    }

    fn apply_details(&mut self, details: &ShipmentDetails) {
        if let Some(no) = &details.tracking_no {
            self.tracking.tracking_no = Some(no.clone());
        }
        if let Some(shipper) = &details.shipper {
            self.tracking.shipper = Some(shipper.clone());
        }
        if let Some(estimate) = details.estimate_time {
            self.tracking.estimate_time = Some(estimate);
        }
    }
}

impl Entity for Delivery {
    type Id = DeliveryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
