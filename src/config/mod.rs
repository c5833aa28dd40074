// src/config/mod.rs
//! Engine configuration

pub mod constants;
pub mod loader;

pub use constants::*;
pub use loader::{ConfigError, ConfigLoader};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::dispatch::intention::Intention;
use crate::error::{StimError, StimResult};
use crate::hal::{ChannelId, ChannelSpec, DeviceId, DeviceInfo, DeviceRegistry};

/// Complete engine configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub bindings: Vec<BindingConfig>,
}

/// Dispatcher settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DispatchConfig {
    #[serde(default = "defaults::settle_delay_ms")]
    pub settle_delay_ms: u64,

    #[serde(default = "defaults::default_intensity")]
    pub default_intensity: u8,

    /// Requests with a longer duration or offset are rejected
    #[serde(default = "defaults::max_request_ms")]
    pub max_request_ms: u64,
}

/// Playback loop settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PlaybackConfig {
    #[serde(default = "defaults::late_frame_warning_ms")]
    pub late_frame_warning_ms: u64,
}

/// One physical device and its channel layout
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DeviceConfig {
    pub id: u32,
    pub name: String,
    pub channels: Vec<ChannelSpec>,

    #[cfg(feature = "simulation")]
    #[serde(default)]
    pub simulator: Option<crate::hal::simulator::SimulatorConfig>,
}

/// Intention to channel binding; channels are written as "device/channel"
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BindingConfig {
    pub intention: Intention,
    pub channels: Vec<String>,
}

/// Default value providers using constants
mod defaults {
    use crate::config::constants::*;

    pub fn settle_delay_ms() -> u64 { dispatch::PARTIAL_DEPENDENCY_SETTLE_MS }
    pub fn default_intensity() -> u8 { intensity::DEFAULT }
    pub fn max_request_ms() -> u64 { dispatch::DEFAULT_MAX_REQUEST_MS }
    pub fn late_frame_warning_ms() -> u64 { playback::DEFAULT_LATE_FRAME_WARNING_MS }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: defaults::settle_delay_ms(),
            default_intensity: defaults::default_intensity(),
            max_request_ms: defaults::max_request_ms(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { late_frame_warning_ms: defaults::late_frame_warning_ms() }
    }
}

impl DispatchConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl DeviceConfig {
    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo::new(DeviceId(self.id), self.name.clone(), self.channels.clone())
    }
}

impl EngineConfig {
    /// Validate configuration consistency
    pub fn validate_consistency(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.dispatch.default_intensity > intensity::MAX {
            errors.push(format!(
                "Default intensity {} exceeds maximum {}",
                self.dispatch.default_intensity,
                intensity::MAX
            ));
        }

        if self.dispatch.settle_delay_ms > dispatch::MAX_SETTLE_DELAY_MS {
            errors.push(format!(
                "Settle delay ({} ms) exceeds maximum ({} ms)",
                self.dispatch.settle_delay_ms,
                dispatch::MAX_SETTLE_DELAY_MS
            ));
        }

        if self.dispatch.max_request_ms == 0 || self.dispatch.max_request_ms > dispatch::MAX_REQUEST_MS {
            errors.push(format!(
                "Request limit ({} ms) must be between 1 and {} ms",
                self.dispatch.max_request_ms,
                dispatch::MAX_REQUEST_MS
            ));
        }

        if self.playback.late_frame_warning_ms > playback::MAX_LATE_FRAME_WARNING_MS {
            errors.push(format!(
                "Late frame warning ({} ms) exceeds maximum ({} ms)",
                self.playback.late_frame_warning_ms,
                playback::MAX_LATE_FRAME_WARNING_MS
            ));
        }

        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for device in &self.devices {
            if !ids.insert(device.id) {
                errors.push(format!("Device id {} declared twice", device.id));
            }
            if !names.insert(device.name.as_str()) {
                errors.push(format!("Device name '{}' declared twice", device.name));
            }

            let count = device.channels.len();
            if !(signal::MIN_CHANNEL_COUNT..=signal::MAX_CHANNEL_COUNT).contains(&count) {
                errors.push(format!(
                    "Device '{}' has {} channels, expected {}..={}",
                    device.name,
                    count,
                    signal::MIN_CHANNEL_COUNT,
                    signal::MAX_CHANNEL_COUNT
                ));
            }

            let mut channel_names = HashSet::new();
            for channel in &device.channels {
                if !channel_names.insert(channel.name.as_str()) {
                    errors.push(format!(
                        "Device '{}' declares channel '{}' twice",
                        device.name, channel.name
                    ));
                }
            }
        }

        for binding in &self.bindings {
            if binding.channels.is_empty() {
                errors.push(format!("Binding for {} names no channels", binding.intention));
            }
            for path in &binding.channels {
                if self.lookup(path).is_none() {
                    errors.push(format!(
                        "Binding for {} names unknown channel '{}'",
                        binding.intention, path
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Build the device registry described by the `devices` sections
    pub fn build_registry(&self) -> StimResult<DeviceRegistry> {
        let mut registry = DeviceRegistry::new();
        for device in &self.devices {
            registry.register(device.device_info())?;
        }
        Ok(registry)
    }

    /// Resolve bindings to channel ids
    pub fn resolve_bindings(&self) -> StimResult<Vec<(Intention, Vec<ChannelId>)>> {
        self.bindings
            .iter()
            .map(|binding| {
                let channels = binding
                    .channels
                    .iter()
                    .map(|path| {
                        self.lookup(path).ok_or_else(|| {
                            StimError::configuration(
                                "bindings",
                                format!("unknown channel '{}' for {}", path, binding.intention),
                            )
                        })
                    })
                    .collect::<StimResult<Vec<_>>>()?;
                Ok((binding.intention, channels))
            })
            .collect()
    }

    fn lookup(&self, path: &str) -> Option<ChannelId> {
        let (device_name, channel_name) = path.split_once('/')?;
        let device = self.devices.iter().find(|d| d.name == device_name)?;
        let index = device.channels.iter().position(|c| c.name == channel_name)?;
        Some(ChannelId::new(DeviceId(device.id), index))
    }
}
