//! Error type returned by the ledger and the order workflow.

use thiserror::Error;

use orderflow_core::DomainError;

use crate::store::StoreError;

/// Either a rule violation the caller can act on, or an infrastructure failure.
///
/// Domain errors found at the storage boundary (`StoreError::Domain`) are lifted
/// into `Domain` so callers match on one place.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Domain(domain) => WorkflowError::Domain(domain),
            other => WorkflowError::Store(other),
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
