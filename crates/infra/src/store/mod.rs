//! Storage boundary.
//!
//! Traits describing what the ledger and the order workflow need from
//! persistence, plus an in-memory backend (tests, single process) and a Postgres
//! backend (shared, multi-process).

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{
    InMemoryInventoryStore, InMemoryOrderStore, InMemoryProductCatalog, InMemoryReconciliationLog,
};
pub use postgres::PostgresStore;
pub use r#trait::{
    GapKind, InventoryStore, OrderPage, OrderQuery, OrderStore, ProductCatalog, ReconciliationGap,
    ReconciliationLog, StatusWrite, StoreError, Stores,
};
