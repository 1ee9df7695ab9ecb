use core::str::FromStr;

use serde::{Deserialize, Serialize};

use orderflow_core::{DomainError, DomainResult};

/// Order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    Paid,
    Shipping,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Created,
        OrderStatus::Paid,
        OrderStatus::Shipping,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Paid => "PAID",
            OrderStatus::Shipping => "SHIPPING",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        OrderStateMachine::targets(*self).is_empty()
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation(format!("unknown order status: {s}")))
    }
}

/// Explicit adjacency table for order status.
///
/// COMPLETED and CANCELLED have no outgoing edges. Self-loops and skips
/// (e.g. CREATED -> SHIPPING) are not edges and are rejected.
pub struct OrderStateMachine;

impl OrderStateMachine {
    pub const MACHINE: &'static str = "order";

    pub fn targets(from: OrderStatus) -> &'static [OrderStatus] {
        match from {
            OrderStatus::Created => &[OrderStatus::Paid, OrderStatus::Cancelled],
            OrderStatus::Paid => &[OrderStatus::Shipping, OrderStatus::Cancelled],
            OrderStatus::Shipping => &[OrderStatus::Completed, OrderStatus::Cancelled],
            OrderStatus::Completed | OrderStatus::Cancelled => &[],
        }
    }

    pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
        Self::targets(from).contains(&to)
    }

    /// Validate `current -> requested`, returning the new status.
    pub fn transition(current: OrderStatus, requested: OrderStatus) -> DomainResult<OrderStatus> {
        if Self::can_transition(current, requested) {
            Ok(requested)
        } else {
            Err(DomainError::invalid_transition(Self::MACHINE, current, requested))
        }
    }
}
