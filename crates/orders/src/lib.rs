//! Orders domain module.
//!
//! Orders, their priced line items, the order-number scheme and the order status
//! state machine. Pure domain logic; persistence and the creation saga live in
//! `orderflow-infra`.

pub mod order;
pub mod state_machine;

pub use order::{Order, OrderItem, OrderLineRequest, OrderNo, normalize_lines};
pub use state_machine::{OrderStateMachine, OrderStatus};
