//! Product catalog snapshot.
//!
//! The catalog itself is an external collaborator. This crate only defines the
//! view of a product that order creation needs: does it exist, may it be sold,
//! and what does it cost right now.

pub mod product;

pub use product::Product;
