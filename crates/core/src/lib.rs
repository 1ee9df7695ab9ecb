//! `orderflow-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! the shared error taxonomy, strongly-typed identifiers and a clock abstraction
//! so that order time can be pinned in tests.

pub mod clock;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use clock::{Clock, FixedClock, SystemClock};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{CustomerId, DeliveryId, OrderId, ProductId};
pub use value_object::ValueObject;
