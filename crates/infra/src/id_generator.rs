//! Order-number suffix sources.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Supplies the unique suffix appended to generated order numbers.
pub trait IdGenerator: Send + Sync {
    fn next_token(&self) -> String;
}

/// Time-ordered random token (UUIDv7, hex). Safe across processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn next_token(&self) -> String {
        Uuid::now_v7().simple().to_string()
    }
}

/// Monotonic counter, zero-padded. Deterministic; unique only within one process.
#[derive(Debug)]
pub struct SequenceIdGenerator {
    next: AtomicU64,
}

impl SequenceIdGenerator {
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for SequenceIdGenerator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl IdGenerator for SequenceIdGenerator {
    fn next_token(&self) -> String {
        format!("{:06}", self.next.fetch_add(1, Ordering::Relaxed))
    }
}
