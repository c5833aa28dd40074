// src/dispatch/controller.rs
//! Intention-based dispatcher
//!
//! Maps intentions to channels, turns batches of requests into one
//! [`StimulationTargets`] per device and hands each to that device's player.
//! Devices are dispatched concurrently; dependency waits on one device never
//! hold up another.
//!
//! [`StimulationTargets`]: crate::stimulation::StimulationTargets

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::config::{ConfigError, DispatchConfig, EngineConfig, PlaybackConfig};
use crate::dispatch::dependency::{arbitrate, remaining_duration, strictest, Arbitration};
use crate::dispatch::intention::Intention;
use crate::error::{StimError, StimResult};
use crate::hal::{ChannelId, ChannelInfo, DeviceId, DeviceRegistry, OutputTransport, Stimulator};
use crate::playback::player::CancelGuard;
use crate::playback::DevicePlayer;
use crate::stimulation::{Intensity, Stimulation, StimulationTarget};

/// One `(intention, pattern)` entry of a batch
#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub intention: Intention,
    pub pattern: Arc<dyn Stimulation>,
    pub duration: Duration,
    pub offset: Duration,
}

impl PlayRequest {
    pub fn new(intention: Intention, pattern: impl Stimulation + 'static, duration: Duration) -> Self {
        Self::shared(intention, Arc::new(pattern), duration)
    }

    pub fn shared(intention: Intention, pattern: Arc<dyn Stimulation>, duration: Duration) -> Self {
        Self { intention, pattern, duration, offset: Duration::ZERO }
    }

    pub fn with_offset(mut self, offset: Duration) -> Self {
        self.offset = offset;
        self
    }
}

/// What was published to one device
#[derive(Debug, Clone, PartialEq)]
pub struct PlayReceipt {
    pub device: DeviceId,
    pub generation: u64,
    /// Time spent on dependency arbitration before publishing
    pub waited: Duration,
    /// Channels the batch placed on this device, in request order
    pub channels: Vec<ChannelId>,
}

/// Result of dispatching one device's share of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDispatch {
    pub device: DeviceId,
    pub result: StimResult<PlayReceipt>,
}

#[derive(Debug, Clone)]
struct Placement {
    channel: ChannelInfo,
    pattern: Arc<dyn Stimulation>,
    duration_ms: u64,
    offset_ms: u64,
}

#[derive(Debug)]
struct DeviceSlot {
    player: Arc<DevicePlayer>,
    /// Serializes dispatches to the device, held across dependency waits
    dispatch: tokio::sync::Mutex<()>,
}

/// Group entries by device in order of first appearance, keeping the
/// relative order of entries within each group
pub fn partition_by_device<T>(entries: impl IntoIterator<Item = (DeviceId, T)>) -> Vec<(DeviceId, Vec<T>)> {
    let mut groups: Vec<(DeviceId, Vec<T>)> = Vec::new();
    for (device, entry) in entries {
        match groups.iter_mut().find(|(id, _)| *id == device) {
            Some((_, members)) => members.push(entry),
            None => groups.push((device, vec![entry])),
        }
    }
    groups
}

#[derive(Debug)]
pub struct IntentionBasedController {
    registry: Arc<DeviceRegistry>,
    dispatch: DispatchConfig,
    playback: PlaybackConfig,
    bindings: RwLock<HashMap<Intention, Vec<ChannelId>>>,
    intensity: RwLock<Intensity>,
    devices: RwLock<HashMap<DeviceId, Arc<DeviceSlot>>>,
}

impl IntentionBasedController {
    pub fn new(registry: Arc<DeviceRegistry>, dispatch: DispatchConfig, playback: PlaybackConfig) -> Self {
        let intensity = Intensity::saturating(dispatch.default_intensity);
        Self {
            registry,
            dispatch,
            playback,
            bindings: RwLock::new(HashMap::new()),
            intensity: RwLock::new(intensity),
            devices: RwLock::new(HashMap::new()),
        }
    }

    /// Build registry and bindings from a configuration; devices still need
    /// to be connected
    pub fn from_config(config: &EngineConfig) -> StimResult<Self> {
        config.validate_consistency().map_err(ConfigError::ValidationError)?;

        let registry = Arc::new(config.build_registry()?);
        let controller = Self::new(registry, config.dispatch.clone(), config.playback.clone());
        for (intention, channels) in config.resolve_bindings()? {
            controller.bind(intention, channels)?;
        }
        Ok(controller)
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Bind `intention` to `channels`, replacing any previous binding
    pub fn bind(&self, intention: Intention, channels: impl IntoIterator<Item = ChannelId>) -> StimResult<()> {
        let channels: Vec<_> = channels.into_iter().collect();
        if channels.is_empty() {
            return Err(StimError::configuration(
                "bindings",
                format!("{} must be bound to at least one channel", intention),
            ));
        }
        for &channel in &channels {
            self.registry.channel(channel)?;
        }

        tracing::debug!(%intention, channels = channels.len(), "intention bound");
        self.bindings.write().insert(intention, channels);
        Ok(())
    }

    pub fn binding(&self, intention: Intention) -> StimResult<Vec<ChannelId>> {
        self.bindings
            .read()
            .get(&intention)
            .cloned()
            .ok_or(StimError::UnboundIntention(intention))
    }

    pub fn intensity(&self) -> Intensity {
        *self.intensity.read()
    }

    /// Applies to requests dispatched from now on
    pub fn set_intensity(&self, intensity: Intensity) {
        tracing::debug!(%intensity, "intensity changed");
        *self.intensity.write() = intensity;
    }

    /// Attach a transport and start the device's playback task
    ///
    /// The transport must describe a registered device with the same layout.
    /// Connecting again replaces the previous player, which silences its
    /// device as it shuts down.
    pub fn connect<T: OutputTransport>(&self, transport: T) -> StimResult<()> {
        let info = transport.device_info();
        let registered = self.registry.device(info.id)?;
        if **registered != *info {
            return Err(StimError::configuration(
                "connect",
                format!("transport layout for {} differs from the registry", info.id),
            ));
        }

        let device = info.id;
        let player = Arc::new(DevicePlayer::spawn(transport, &self.playback));
        let slot = Arc::new(DeviceSlot { player, dispatch: tokio::sync::Mutex::new(()) });
        let replaced = self.devices.write().insert(device, slot).is_some();

        tracing::info!(%device, replaced, "device connected");
        Ok(())
    }

    /// Silence a device and drop its player
    pub async fn disconnect(&self, device: DeviceId) -> StimResult<()> {
        let slot = self.devices.write().remove(&device).ok_or(StimError::NotConnected(device))?;
        slot.player.stop().await?;
        tracing::info!(%device, "device disconnected");
        Ok(())
    }

    pub fn player(&self, device: DeviceId) -> StimResult<Arc<DevicePlayer>> {
        Ok(Arc::clone(&self.slot(device)?.player))
    }

    /// Direct handle on one channel, bypassing intentions
    pub fn stimulator(&self, channel: ChannelId) -> StimResult<Stimulator> {
        self.registry.channel(channel)?;
        Stimulator::new(self.player(channel.device)?, channel)
    }

    /// Dispatch a batch of requests
    ///
    /// Every request is resolved before any device is touched, so an unbound
    /// intention or a disconnected device fails the whole batch. After that
    /// each device is dispatched on its own: one device failing does not
    /// affect the others, and results come back per device in order of first
    /// appearance in the batch.
    pub async fn play(
        &self,
        requests: impl IntoIterator<Item = PlayRequest>,
    ) -> StimResult<Vec<DeviceDispatch>> {
        let intensity = self.intensity();

        let mut placements = Vec::new();
        for request in requests {
            let duration = self.bounded_ms(request.intention, "duration", request.duration)?;
            let offset = self.bounded_ms(request.intention, "offset", request.offset)?;
            for channel in self.binding(request.intention)? {
                let info = self.registry.channel(channel)?.clone();
                placements.push((
                    channel.device,
                    Placement {
                        channel: info,
                        pattern: Arc::clone(&request.pattern),
                        duration_ms: duration,
                        offset_ms: offset,
                    },
                ));
            }
        }

        let groups = partition_by_device(placements)
            .into_iter()
            .map(|(device, placements)| Ok((self.slot(device)?, placements)))
            .collect::<StimResult<Vec<_>>>()?;

        let order: Vec<DeviceId> = groups.iter().map(|(slot, _)| slot.player.device_id()).collect();
        let settle_delay = self.dispatch.settle_delay();

        let mut tasks = JoinSet::new();
        for (slot, placements) in groups {
            tasks.spawn(async move {
                let device = slot.player.device_id();
                (device, dispatch_device(slot, placements, intensity, settle_delay).await)
            });
        }

        let mut results = HashMap::with_capacity(order.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((device, result)) => {
                    if let Err(e) = &result {
                        tracing::warn!(%device, error = %e, "dispatch failed");
                    }
                    results.insert(device, result);
                }
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => tracing::error!(error = %e, "dispatch task cancelled"),
            }
        }

        Ok(order
            .into_iter()
            .map(|device| DeviceDispatch {
                device,
                result: results.remove(&device).unwrap_or(Err(StimError::PlaybackTerminated(device))),
            })
            .collect())
    }

    /// Zero the intention's channels; other channels keep playing
    pub async fn stop(&self, intention: Intention) -> StimResult<()> {
        let groups = self.players_for(&self.binding(intention)?);
        tracing::debug!(%intention, devices = groups.len(), "stopping intention");

        let mut first_error = None;
        for (player, channels) in &groups {
            if let Err(e) = player.stop_channels(channels).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Zero every connected device
    pub async fn stop_all(&self) -> StimResult<()> {
        let players = self.players();
        tracing::debug!(devices = players.len(), "stopping all devices");

        let mut first_error = None;
        for player in &players {
            if let Err(e) = player.stop().await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Wait until the intention's channels have played out
    ///
    /// Dropping the future early stops the intention.
    pub async fn complete(&self, intention: Intention) -> StimResult<()> {
        let groups = self.players_for(&self.binding(intention)?);
        tracing::debug!(%intention, devices = groups.len(), "waiting for intention to complete");

        let guard = CancelGuard::new(|| {
            for (player, channels) in &groups {
                if let Err(e) = player.silence_channels(channels) {
                    tracing::warn!(device = %player.device_id(), error = %e, "could not silence intention");
                }
            }
        });

        let mut first_error = None;
        for (player, channels) in &groups {
            if let Err(e) = player.complete_channels(channels).await {
                first_error.get_or_insert(e);
            }
        }
        guard.disarm();
        first_error.map_or(Ok(()), Err)
    }

    /// Wait until every device has played out
    ///
    /// Dropping the future early stops every device.
    pub async fn complete_all(&self) -> StimResult<()> {
        let players = self.players();
        let guard = CancelGuard::new(|| {
            for player in &players {
                player.request_stop();
            }
        });

        let mut first_error = None;
        for player in &players {
            if let Err(e) = player.complete().await {
                first_error.get_or_insert(e);
            }
        }
        guard.disarm();
        first_error.map_or(Ok(()), Err)
    }

    fn bounded_ms(&self, intention: Intention, what: &str, value: Duration) -> StimResult<u64> {
        let ms = duration_ms(value);
        if ms > self.dispatch.max_request_ms {
            return Err(StimError::InvalidTarget(format!(
                "{} {} ms for {} exceeds the {} ms limit",
                what, ms, intention, self.dispatch.max_request_ms
            )));
        }
        Ok(ms)
    }

    fn slot(&self, device: DeviceId) -> StimResult<Arc<DeviceSlot>> {
        self.registry.device(device)?;
        self.devices
            .read()
            .get(&device)
            .cloned()
            .ok_or(StimError::NotConnected(device))
    }

    fn players(&self) -> Vec<Arc<DevicePlayer>> {
        self.devices.read().values().map(|slot| Arc::clone(&slot.player)).collect()
    }

    /// Connected players owning `channels`, each with its share of them
    fn players_for(&self, channels: &[ChannelId]) -> Vec<(Arc<DevicePlayer>, Vec<ChannelId>)> {
        let devices = self.devices.read();
        partition_by_device(channels.iter().map(|&channel| (channel.device, channel)))
            .into_iter()
            .filter_map(|(device, channels)| {
                devices.get(&device).map(|slot| (Arc::clone(&slot.player), channels))
            })
            .collect()
    }
}

async fn dispatch_device(
    slot: Arc<DeviceSlot>,
    placements: Vec<Placement>,
    intensity: Intensity,
    settle_delay: Duration,
) -> StimResult<PlayReceipt> {
    let _serialized = slot.dispatch.lock().await;
    let player = &slot.player;
    let device = player.device_id();

    let dependency = strictest(placements.iter().map(|p| p.channel.dependency));
    let started = Instant::now();
    match arbitrate(dependency, player.is_active(), settle_delay) {
        Arbitration::Immediate => {}
        Arbitration::Settle(delay) => {
            tracing::debug!(%device, delay_ms = duration_ms(delay), "settling before partially dependent start");
            tokio::time::sleep(delay).await;
        }
        Arbitration::AwaitCompletion => {
            tracing::debug!(%device, "waiting for current playback before dependent start");
            player.wait_until_finished().await?;
        }
    }
    let waited = started.elapsed();
    let waited_ms = duration_ms(waited);

    let channels = placements.iter().map(|p| p.channel.id).collect();
    let targets = placements.into_iter().map(|p| {
        let waveform = p.pattern.waveform(&p.channel.capability(), intensity);
        StimulationTarget::with_duration(
            p.channel.id,
            waveform,
            p.offset_ms,
            remaining_duration(p.duration_ms, waited_ms),
        )
    });
    let generation = player.play_over(targets)?;

    tracing::debug!(%device, generation, waited_ms, "batch dispatched");
    Ok(PlayReceipt { device, generation, waited, channels })
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
