// src/hal/traits.rs
//! Core HAL traits for output device abstraction

use crate::hal::types::{DeviceInfo, Frame};
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a device transport
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    /// Device is not reachable
    #[error("device disconnected")]
    Disconnected,

    /// Frame was rejected by the device
    #[error("write rejected: {0}")]
    WriteRejected(String),

    /// Frame does not match the device's channel layout
    #[error("frame has {actual} levels, device has {expected} channels")]
    ChannelMismatch { expected: usize, actual: usize },

    /// Transport-specific failure
    #[error("transport failure: {0}")]
    Io(String),
}

/// Device-specific adapter that turns amplitude vectors into hardware signals
///
/// One transport is owned by exactly one playback task, so implementations
/// need no internal locking for the write path.
#[async_trait]
pub trait OutputTransport: Send + 'static {
    /// Device this transport drives
    fn device_info(&self) -> &DeviceInfo;

    /// Apply one merged frame to the hardware
    async fn write(&mut self, frame: &Frame) -> Result<(), TransportError>;

    /// Force every channel to amplitude 0
    async fn silence(&mut self) -> Result<(), TransportError> {
        let frame = Frame::silent(0, self.device_info().channel_count());
        self.write(&frame).await
    }
}
