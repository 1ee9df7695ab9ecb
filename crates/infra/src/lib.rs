//! Infrastructure layer: storage backends, the inventory ledger and the order
//! workflow that coordinates them.

pub mod error;
pub mod id_generator;
pub mod ledger;
pub mod store;
pub mod workflow;

mod integration_tests;

pub use error::{WorkflowError, WorkflowResult};
pub use id_generator::{IdGenerator, SequenceIdGenerator, UuidIdGenerator};
pub use ledger::{InventoryLedger, StockAdjustment};
pub use workflow::{CreateOrderRequest, OrderDetail, OrderWorkflow, ShipmentRequest};
