// src/dispatch/mod.rs
//! Semantic dispatch layer
//!
//! Intentions are bound to channels once at setup; requests then name an
//! intention and a pattern, and the controller takes care of device
//! partitioning and dependency arbitration.

pub mod controller;
pub mod dependency;
pub mod intention;

pub use controller::{partition_by_device, DeviceDispatch, IntentionBasedController, PlayReceipt, PlayRequest};
pub use dependency::Arbitration;
pub use intention::Intention;
