//! Inventory domain module.
//!
//! This crate contains the counter rules for per-product stock, implemented purely
//! as deterministic domain logic (no IO, no storage). Storage adapters apply a
//! [`StockMutation`] inside one atomic read-modify-write so the rules below are
//! the single place where `0 <= locked_stock <= stock` is enforced.

pub mod item;

pub use item::{DEFAULT_LOW_STOCK_THRESHOLD, Inventory, StockMutation};
