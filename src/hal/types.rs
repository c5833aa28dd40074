// src/hal/types.rs
//! Core types for stimulation device abstraction

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::constants::signal;

/// Identity of one physical device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

/// One independently addressable output of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId {
    pub device: DeviceId,
    pub index: usize,
}

impl ChannelId {
    pub fn new(device: DeviceId, index: usize) -> Self {
        Self { device, index }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device-{}", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/ch{}", self.device, self.index)
    }
}

/// Kind of signal a channel produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Output {
    Vibration,
    #[serde(rename = "estim")]
    EStim,
}

/// Whether a channel's signal path can run concurrently with its siblings
///
/// Some hardware exposes several logical channels over one shared physical
/// signal path. The dispatcher reconciles that with the channel list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelDependency {
    Independent,
    PartiallyDependent,
    Dependent,
}

impl Default for ChannelDependency {
    fn default() -> Self {
        ChannelDependency::Independent
    }
}

/// Channel description as exposed by the device driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub output: Output,
    pub dependency: ChannelDependency,
    pub minimal_signal_duration_ms: u64,
}

impl ChannelInfo {
    /// The part of the channel description that patterns depend on
    pub fn capability(&self) -> ChannelCapability {
        ChannelCapability {
            output: self.output,
            minimal_signal_duration_ms: self.minimal_signal_duration_ms,
        }
    }
}

/// Signal properties a pattern is synthesized for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCapability {
    pub output: Output,
    pub minimal_signal_duration_ms: u64,
}

impl ChannelCapability {
    pub fn vibration() -> Self {
        Self {
            output: Output::Vibration,
            minimal_signal_duration_ms: signal::DEFAULT_VIBRATION_MIN_SIGNAL_MS,
        }
    }

    pub fn estim() -> Self {
        Self {
            output: Output::EStim,
            minimal_signal_duration_ms: signal::DEFAULT_ESTIM_MIN_SIGNAL_MS,
        }
    }
}

/// Device information and channel layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub channels: Vec<ChannelInfo>,
}

impl DeviceInfo {
    /// Create a device whose channels are numbered in declaration order
    pub fn new(
        id: DeviceId,
        name: impl Into<String>,
        channels: impl IntoIterator<Item = ChannelSpec>,
    ) -> Self {
        let channels = channels
            .into_iter()
            .enumerate()
            .map(|(index, spec)| ChannelInfo {
                id: ChannelId::new(id, index),
                name: spec.name,
                output: spec.output,
                dependency: spec.dependency,
                minimal_signal_duration_ms: spec.minimal_signal_duration_ms,
            })
            .collect();

        Self { id, name: name.into(), channels }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, id: ChannelId) -> Option<&ChannelInfo> {
        if id.device != self.id {
            return None;
        }
        self.channels.get(id.index)
    }

    pub fn owns(&self, id: ChannelId) -> bool {
        self.channel(id).is_some()
    }
}

/// Channel declaration used to build a [`DeviceInfo`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub name: String,
    pub output: Output,
    #[serde(default)]
    pub dependency: ChannelDependency,
    #[serde(default = "default_minimal_signal_duration_ms")]
    pub minimal_signal_duration_ms: u64,
}

fn default_minimal_signal_duration_ms() -> u64 {
    signal::DEFAULT_VIBRATION_MIN_SIGNAL_MS
}

impl ChannelSpec {
    pub fn new(name: impl Into<String>, output: Output, dependency: ChannelDependency) -> Self {
        let minimal_signal_duration_ms = match output {
            Output::Vibration => signal::DEFAULT_VIBRATION_MIN_SIGNAL_MS,
            Output::EStim => signal::DEFAULT_ESTIM_MIN_SIGNAL_MS,
        };
        Self { name: name.into(), output, dependency, minimal_signal_duration_ms }
    }

    pub fn with_minimal_signal_duration(mut self, ms: u64) -> Self {
        self.minimal_signal_duration_ms = ms;
        self
    }
}

/// One merged output step: every channel's level at `timestamp_ms`
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub timestamp_ms: u64,
    pub levels: Vec<f64>,
}

impl Frame {
    pub fn silent(timestamp_ms: u64, channel_count: usize) -> Self {
        Self { timestamp_ms, levels: vec![0.0; channel_count] }
    }

    pub fn is_silent(&self) -> bool {
        self.levels.iter().all(|&level| level == 0.0)
    }
}
