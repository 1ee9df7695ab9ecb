//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is recoverable by the caller and carries the offending
/// identifier so it can be surfaced verbatim. Storage failures live in the infra
/// crate and are never folded into this enum.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. non-positive quantity, empty item list).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced order, product, inventory record or delivery does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A lock (or deduction) asked for more units than are available.
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: String,
        requested: i64,
        available: i64,
    },

    /// A state machine rejected the requested move.
    #[error("invalid {machine} transition: {from} -> {to}")]
    InvalidTransition {
        machine: &'static str,
        from: String,
        to: String,
    },

    /// A release (or deduction) exceeded the locked amount. Indicates a
    /// bookkeeping defect upstream.
    #[error("invalid release for product {product_id}: requested {requested}, locked {locked}")]
    InvalidRelease {
        product_id: String,
        requested: i64,
        locked: i64,
    },

    /// The order is already COMPLETED or CANCELLED.
    #[error("order {order_id} is already {status}")]
    AlreadyTerminal { order_id: String, status: String },

    /// A conflicting write was detected (duplicate record, concurrent status change).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn insufficient_stock(product_id: impl ToString, requested: i64, available: i64) -> Self {
        Self::InsufficientStock {
            product_id: product_id.to_string(),
            requested,
            available,
        }
    }

    pub fn invalid_transition(
        machine: &'static str,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Self::InvalidTransition {
            machine,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn invalid_release(product_id: impl ToString, requested: i64, locked: i64) -> Self {
        Self::InvalidRelease {
            product_id: product_id.to_string(),
            requested,
            locked,
        }
    }

    pub fn already_terminal(order_id: impl ToString, status: impl ToString) -> Self {
        Self::AlreadyTerminal {
            order_id: order_id.to_string(),
            status: status.to_string(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Stable machine-readable code (used by the HTTP layer and in reconciliation records).
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation_error",
            DomainError::InvalidId(_) => "invalid_id",
            DomainError::NotFound { .. } => "not_found",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::InvalidTransition { .. } => "invalid_transition",
            DomainError::InvalidRelease { .. } => "invalid_release",
            DomainError::AlreadyTerminal { .. } => "already_terminal",
            DomainError::Conflict(_) => "conflict",
        }
    }
}
