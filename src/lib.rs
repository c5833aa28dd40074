//! Stim-Core: multi-channel stimulation scheduling and playback
//!
//! Turns semantic requests ("tease", "pace", "pain") into timed per-channel
//! amplitude streams and plays them on vibration and e-stim hardware:
//!
//! - Immutable waveforms and a library of intensity-scaled patterns
//! - Per-channel schedules with offset and repeat, merged per device
//! - One playback task per device with immediate stop and cancel-safe completion
//! - Intention dispatch with dependency arbitration between shared channels
//! - Layered TOML configuration
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use stim_core::config::ConfigLoader;
//! use stim_core::dispatch::{Intention, IntentionBasedController, PlayRequest};
//! use stim_core::hal::simulator::SimulatedTransport;
//! use stim_core::stimulation::patterns::Tease;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::load_file("config.toml")?;
//!     let controller = IntentionBasedController::from_config(&config)?;
//!     for device in &config.devices {
//!         controller.connect(SimulatedTransport::with_defaults(device.device_info()))?;
//!     }
//!
//!     controller
//!         .play([PlayRequest::new(Intention::Tease, Tease, Duration::from_secs(10))])
//!         .await?;
//!     controller.complete(Intention::Tease).await?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod hal;
pub mod playback;
pub mod stimulation;

// Re-export commonly used types for convenience
pub use dispatch::{Intention, IntentionBasedController, PlayRequest};
pub use error::{StimError, StimResult};
pub use hal::{
    ChannelDependency, ChannelId, DeviceId, DeviceInfo, DeviceRegistry, Frame, OutputTransport, Output,
    Stimulator, TransportError,
};
pub use playback::DevicePlayer;
pub use stimulation::{Intensity, Stimulation, StimulationTarget, StimulationTargets, WaveForm};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn version_info() -> VersionInfo {
    let mut features = vec![
        "Waveform and pattern library".to_string(),
        "Multi-channel merge per device".to_string(),
        "Per-device real-time playback".to_string(),
        "Intention dispatch with dependency arbitration".to_string(),
    ];
    if cfg!(feature = "simulation") {
        features.push("Simulated output transport".to_string());
    }

    VersionInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: "Multi-channel stimulation scheduling and playback engine".to_string(),
        features,
    }
}

/// Library version information
#[derive(Debug, Clone)]
pub struct VersionInfo {
    /// Library name
    pub name: String,
    /// Version string
    pub version: String,
    /// Description
    pub description: String,
    /// List of features
    pub features: Vec<String>,
}
