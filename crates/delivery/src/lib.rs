//! Delivery domain module.
//!
//! The delivery record that accompanies every order, its own status machine
//! (independent of the order status) and the shipment/consignee value objects.

pub mod delivery;
pub mod shipment;
pub mod state_machine;

pub use delivery::Delivery;
pub use shipment::{ConsigneeInfo, ShipmentDetails, Tracking, parse_estimate_time};
pub use state_machine::{DeliveryStateMachine, DeliveryStatus};
