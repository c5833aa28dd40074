// src/hal/registry.rs
//! Device registry
//!
//! Explicit context value mapping devices and their channels. Owned by the
//! caller and passed to the dispatcher; there is no process-wide instance.

use crate::error::{StimError, StimResult};
use crate::hal::types::{ChannelId, ChannelInfo, DeviceId, DeviceInfo};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<DeviceId, Arc<DeviceInfo>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device; fails if its id is already taken
    pub fn register(&mut self, device: DeviceInfo) -> StimResult<Arc<DeviceInfo>> {
        if self.devices.contains_key(&device.id) {
            return Err(StimError::Configuration {
                component: "registry".to_string(),
                reason: format!("{} registered twice", device.id),
            });
        }

        for (index, channel) in device.channels.iter().enumerate() {
            if channel.id != ChannelId::new(device.id, index) {
                return Err(StimError::ForeignChannel { channel: channel.id, device: device.id });
            }
        }

        let device = Arc::new(device);
        self.devices.insert(device.id, Arc::clone(&device));
        Ok(device)
    }

    pub fn device(&self, id: DeviceId) -> StimResult<&Arc<DeviceInfo>> {
        self.devices.get(&id).ok_or(StimError::UnknownDevice(id))
    }

    /// Resolve a channel to its owning device
    pub fn owner(&self, channel: ChannelId) -> StimResult<&Arc<DeviceInfo>> {
        let device = self
            .devices
            .get(&channel.device)
            .ok_or(StimError::UnknownChannel(channel))?;
        if !device.owns(channel) {
            return Err(StimError::UnknownChannel(channel));
        }
        Ok(device)
    }

    pub fn channel(&self, channel: ChannelId) -> StimResult<&ChannelInfo> {
        self.owner(channel)?
            .channel(channel)
            .ok_or(StimError::UnknownChannel(channel))
    }

    pub fn devices(&self) -> impl Iterator<Item = &Arc<DeviceInfo>> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
