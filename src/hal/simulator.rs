// src/hal/simulator.rs
//! Simulated output transport
//!
//! Records every frame written to it with the playback-clock time of the
//! write, so tests and dry runs can inspect exactly what hardware would have
//! received. Failure injection mirrors a device that drops off the bus.

use crate::hal::traits::{OutputTransport, TransportError};
use crate::hal::types::{DeviceInfo, Frame};
use async_trait::async_trait;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Simulator configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SimulatorConfig {
    /// Fail every write after this many successful writes
    #[serde(default)]
    pub fail_after_writes: Option<usize>,
    /// Artificial latency added to every write
    #[serde(default)]
    pub write_latency_ms: u64,
}

/// A frame as observed by the simulated hardware
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    /// Time since the transport was created
    pub at: Duration,
    pub frame: Frame,
}

/// Shared, cloneable view of everything a [`SimulatedTransport`] received
#[derive(Debug, Clone, Default)]
pub struct FrameLog {
    frames: Arc<Mutex<Vec<RecordedFrame>>>,
}

impl FrameLog {
    pub fn frames(&self) -> Vec<RecordedFrame> {
        self.frames.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    pub fn last(&self) -> Option<RecordedFrame> {
        self.frames.lock().last().cloned()
    }

    /// Time of the first write that energized `channel`
    pub fn first_active(&self, channel: usize) -> Option<Duration> {
        self.frames
            .lock()
            .iter()
            .find(|r| r.frame.levels.get(channel).copied().unwrap_or(0.0) > 0.0)
            .map(|r| r.at)
    }

    pub fn clear(&self) {
        self.frames.lock().clear();
    }

    fn push(&self, frame: RecordedFrame) {
        self.frames.lock().push(frame);
    }
}

/// Transport that stores frames instead of driving hardware
pub struct SimulatedTransport {
    device: DeviceInfo,
    config: SimulatorConfig,
    created: Instant,
    writes: usize,
    log: FrameLog,
    monitor: Option<Sender<RecordedFrame>>,
}

impl SimulatedTransport {
    pub fn new(device: DeviceInfo, config: SimulatorConfig) -> Self {
        Self {
            device,
            config,
            created: Instant::now(),
            writes: 0,
            log: FrameLog::default(),
            monitor: None,
        }
    }

    pub fn with_defaults(device: DeviceInfo) -> Self {
        Self::new(device, SimulatorConfig::default())
    }

    /// Mirror every recorded frame to a channel
    pub fn with_monitor(mut self) -> (Self, Receiver<RecordedFrame>) {
        let (tx, rx) = channel::unbounded();
        self.monitor = Some(tx);
        (self, rx)
    }

    /// Handle for inspecting frames after the transport moved into a player
    pub fn log(&self) -> FrameLog {
        self.log.clone()
    }
}

#[async_trait]
impl OutputTransport for SimulatedTransport {
    fn device_info(&self) -> &DeviceInfo {
        &self.device
    }

    async fn write(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let expected = self.device.channel_count();
        if frame.levels.len() != expected {
            return Err(TransportError::ChannelMismatch { expected, actual: frame.levels.len() });
        }

        if let Some(limit) = self.config.fail_after_writes {
            if self.writes >= limit {
                return Err(TransportError::Disconnected);
            }
        }

        if self.config.write_latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.write_latency_ms)).await;
        }

        self.writes += 1;
        let recorded = RecordedFrame { at: self.created.elapsed(), frame: frame.clone() };
        if let Some(monitor) = &self.monitor {
            // Receiver may be gone; the log still has the frame
            let _ = monitor.send(recorded.clone());
        }
        self.log.push(recorded);
        Ok(())
    }
}
