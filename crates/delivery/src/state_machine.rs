use core::str::FromStr;

use serde::{Deserialize, Serialize};

use orderflow_core::{DomainError, DomainResult};

/// Delivery status lifecycle. Separate from the order status on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Paying,
    Shipping,
    Receipting,
    Completed,
    Cancelled,
    Processing,
    Processed,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 7] = [
        DeliveryStatus::Paying,
        DeliveryStatus::Shipping,
        DeliveryStatus::Receipting,
        DeliveryStatus::Completed,
        DeliveryStatus::Cancelled,
        DeliveryStatus::Processing,
        DeliveryStatus::Processed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Paying => "PAYING",
            DeliveryStatus::Shipping => "SHIPPING",
            DeliveryStatus::Receipting => "RECEIPTING",
            DeliveryStatus::Completed => "COMPLETED",
            DeliveryStatus::Cancelled => "CANCELLED",
            DeliveryStatus::Processing => "PROCESSING",
            DeliveryStatus::Processed => "PROCESSED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        DeliveryStateMachine::targets(*self).is_empty()
    }
}

impl core::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeliveryStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation(format!("unknown delivery status: {s}")))
    }
}

/// Adjacency table for delivery status.
pub struct DeliveryStateMachine;

impl DeliveryStateMachine {
    pub const MACHINE: &'static str = "delivery";

    pub fn targets(from: DeliveryStatus) -> &'static [DeliveryStatus] {
        use DeliveryStatus::*;
        match from {
            Paying => &[Shipping, Cancelled],
            Shipping => &[Receipting, Cancelled],
            Receipting => &[Completed, Cancelled, Processing],
            Processing => &[Processed],
            Completed | Cancelled | Processed => &[],
        }
    }

    pub fn can_transition(from: DeliveryStatus, to: DeliveryStatus) -> bool {
        Self::targets(from).contains(&to)
    }

    pub fn transition(current: DeliveryStatus, requested: DeliveryStatus) -> DomainResult<DeliveryStatus> {
        if Self::can_transition(current, requested) {
            Ok(requested)
        } else {
            Err(DomainError::invalid_transition(Self::MACHINE, current, requested))
        }
    }
}
