// src/hal/stimulator.rs
//! Single-channel handle
//!
//! A [`Stimulator`] drives one channel of a connected device directly,
//! without going through intentions. Other channels of the device keep their
//! schedules whenever this channel is started, extended or stopped.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{StimError, StimResult};
use crate::hal::types::{ChannelDependency, ChannelId, ChannelInfo, DeviceInfo, Output};
use crate::playback::DevicePlayer;
use crate::stimulation::{StimulationTarget, WaveForm};

#[derive(Debug, Clone)]
pub struct Stimulator {
    channel: ChannelInfo,
    player: Arc<DevicePlayer>,
}

impl Stimulator {
    pub fn new(player: Arc<DevicePlayer>, channel: ChannelId) -> StimResult<Self> {
        let channel = player
            .device()
            .channel(channel)
            .cloned()
            .ok_or(StimError::ForeignChannel { channel, device: player.device_id() })?;
        Ok(Self { channel, player })
    }

    pub fn id(&self) -> ChannelId {
        self.channel.id
    }

    pub fn info(&self) -> &ChannelInfo {
        &self.channel
    }

    pub fn device(&self) -> &Arc<DeviceInfo> {
        self.player.device()
    }

    pub fn dependency(&self) -> ChannelDependency {
        self.channel.dependency
    }

    pub fn output(&self) -> Output {
        self.channel.output
    }

    /// Shortest plateau the channel reproduces reliably
    pub fn minimal_signal_duration(&self) -> Duration {
        Duration::from_millis(self.channel.minimal_signal_duration_ms)
    }

    /// Repeat `waveform` for `duration`, scaled down to `max_strength`
    pub fn play(&self, waveform: &WaveForm, duration: Duration, max_strength: f64) -> StimResult<u64> {
        let target = StimulationTarget::with_duration(
            self.channel.id,
            waveform.scaled(max_strength),
            0,
            millis(duration),
        );
        self.player.play_over([target])
    }

    /// Keep the current waveform going for another `duration` after its
    /// scheduled end
    ///
    /// Returns `None` when the channel is idle.
    pub fn extend(&self, duration: Duration) -> StimResult<Option<u64>> {
        let Some(playback) = self.player.current() else {
            return Ok(None);
        };
        let Some(current) = playback.targets.get(self.channel.id) else {
            return Ok(None);
        };
        let remaining = current.slice(playback.elapsed_ms());
        if remaining.is_silent() {
            return Ok(None);
        }

        let extra = StimulationTarget::with_duration(
            self.channel.id,
            Arc::clone(current.waveform()),
            0,
            millis(duration),
        );
        self.player.play_over([remaining.extended(extra.repeat_count())]).map(Some)
    }

    /// Zero this channel
    pub async fn stop(&self) -> StimResult<()> {
        self.player.stop_channels(&[self.channel.id]).await
    }

    /// Wait until this channel has played out; dropping the future stops it
    pub async fn complete(&self) -> StimResult<()> {
        self.player.complete_channels(&[self.channel.id]).await
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
