// src/hal/mod.rs
//! Hardware Abstraction Layer for stimulation devices

pub mod traits;
pub mod types;
pub mod registry;
pub mod stimulator;
#[cfg(feature = "simulation")]
pub mod simulator;


pub use traits::*;
pub use types::*;
pub use registry::DeviceRegistry;
pub use stimulator::Stimulator;
