// src/error.rs
//! Unified error handling for stim-core
//!
//! Every layer has its own error enum (transport, configuration); they all
//! convert into [`StimError`], which is what the dispatcher and the playback
//! layer hand back to callers.

use crate::config::loader::ConfigError;
use crate::dispatch::intention::Intention;
use crate::hal::traits::TransportError;
use crate::hal::types::{ChannelId, DeviceId};
use thiserror::Error;

/// Unified error type for the engine
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StimError {
    /// Invalid setup detected at construction time
    #[error("[CONFIG] {component}: {reason}")]
    Configuration { component: String, reason: String },

    /// A target or channel bound to a device it does not belong to
    #[error("[CONFIG] channel {channel} does not belong to {device}")]
    ForeignChannel { channel: ChannelId, device: DeviceId },

    /// Intention used before any channel was bound to it
    #[error("[CONFIG] intention {0} is not bound to any channel")]
    UnboundIntention(Intention),

    #[error("[CONFIG] unknown device {0}")]
    UnknownDevice(DeviceId),

    #[error("[CONFIG] unknown channel {0}")]
    UnknownChannel(ChannelId),

    /// Target parameters out of range
    #[error("[TARGET] invalid target: {0}")]
    InvalidTarget(String),

    /// Device known to the registry but no transport attached
    #[error("[DEVICE] {0} is not connected")]
    NotConnected(DeviceId),

    /// Hardware write failed; scoped to one device
    #[error("[DEVICE] {device} transport error: {source}")]
    Transport {
        device: DeviceId,
        #[source]
        source: TransportError,
    },

    /// Playback task is gone
    #[error("[DEVICE] playback for {0} terminated")]
    PlaybackTerminated(DeviceId),
}

impl StimError {
    pub fn configuration(component: &str, reason: impl Into<String>) -> Self {
        StimError::Configuration { component: component.to_string(), reason: reason.into() }
    }

    /// Whether the error was raised before any device was touched
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            StimError::Configuration { .. }
                | StimError::ForeignChannel { .. }
                | StimError::UnboundIntention(_)
                | StimError::UnknownDevice(_)
                | StimError::UnknownChannel(_)
                | StimError::InvalidTarget(_)
        )
    }

    /// Device the error is scoped to, if any
    pub fn device(&self) -> Option<DeviceId> {
        match self {
            StimError::ForeignChannel { device, .. } => Some(*device),
            StimError::UnknownDevice(device)
            | StimError::NotConnected(device)
            | StimError::PlaybackTerminated(device) => Some(*device),
            StimError::Transport { device, .. } => Some(*device),
            StimError::UnknownChannel(channel) => Some(channel.device),
            _ => None,
        }
    }
}

impl From<ConfigError> for StimError {
    fn from(err: ConfigError) -> Self {
        StimError::configuration("config", err.to_string())
    }
}

/// Result type alias for engine operations
pub type StimResult<T> = Result<T, StimError>;

/// Attach a device to a transport result
pub trait IntoStimError<T> {
    fn for_device(self, device: DeviceId) -> StimResult<T>;
}

impl<T> IntoStimError<T> for Result<T, TransportError> {
    fn for_device(self, device: DeviceId) -> StimResult<T> {
        self.map_err(|source| StimError::Transport { device, source })
    }
}
