// src/playback/player.rs
//! Per-device playback task
//!
//! Each connected device gets one tokio task that owns its transport. The
//! dispatcher publishes whole [`StimulationTargets`] into a watch slot; the
//! task walks the merged frame sequence, sleeping until each frame's deadline,
//! and switches over as soon as a new command is published. Publishing "none"
//! silences the device.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::config::PlaybackConfig;
use crate::error::{StimError, StimResult};
use crate::hal::{ChannelId, DeviceId, DeviceInfo, OutputTransport, TransportError};
use crate::stimulation::{StimulationTarget, StimulationTargets};

/// A published schedule and the instant it was anchored to
#[derive(Debug)]
pub struct Playback {
    pub targets: StimulationTargets,
    pub started_at: Instant,
}

impl Playback {
    /// Milliseconds since the schedule's time origin
    pub fn elapsed_ms(&self) -> u64 {
        let elapsed = Instant::now().saturating_duration_since(self.started_at);
        u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
    }

    /// Milliseconds until every channel has played out
    pub fn remaining_ms(&self) -> u64 {
        self.targets.max_duration().saturating_sub(self.elapsed_ms())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackPhase {
    Idle,
    Playing,
    Completed,
    Stopped,
    Failed(TransportError),
}

impl PlaybackPhase {
    /// Whether the generation this phase belongs to is over
    pub fn is_settled(&self) -> bool {
        !matches!(self, PlaybackPhase::Playing)
    }
}

/// Phase of the most recent generation the task picked up
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackStatus {
    pub generation: u64,
    pub phase: PlaybackPhase,
}

#[derive(Debug, Clone, Default)]
struct Command {
    generation: u64,
    playback: Option<Arc<Playback>>,
}

enum Outcome {
    Completed,
    Interrupted,
    Failed(TransportError),
    Closed,
}

/// Handle to one device's playback task
///
/// Dropping the handle silences the device and ends the task.
#[derive(Debug)]
pub struct DevicePlayer {
    device: Arc<DeviceInfo>,
    commands: watch::Sender<Command>,
    status: watch::Receiver<PlaybackStatus>,
    task: JoinHandle<()>,
}

impl DevicePlayer {
    /// Spawn the playback task for `transport` on the current runtime
    pub fn spawn<T: OutputTransport>(transport: T, config: &PlaybackConfig) -> Self {
        let device = Arc::new(transport.device_info().clone());
        let (commands, command_rx) = watch::channel(Command::default());
        let (status_tx, status) =
            watch::channel(PlaybackStatus { generation: 0, phase: PlaybackPhase::Idle });
        let late_threshold = Duration::from_millis(config.late_frame_warning_ms);

        let task = tokio::spawn(run(transport, command_rx, status_tx, late_threshold));
        tracing::debug!(device = %device.id, channels = device.channel_count(), "playback task started");

        Self { device, commands, status, task }
    }

    pub fn device(&self) -> &Arc<DeviceInfo> {
        &self.device
    }

    pub fn device_id(&self) -> DeviceId {
        self.device.id
    }

    /// Replace whatever is playing with `targets`, starting now
    ///
    /// Returns the generation number of the new playback.
    pub fn play(&self, targets: StimulationTargets) -> StimResult<u64> {
        if targets.device_id() != self.device.id {
            return Err(StimError::configuration(
                "player",
                format!("targets for {} sent to {}", targets.device_id(), self.device.id),
            ));
        }
        if self.commands.is_closed() {
            return Err(StimError::PlaybackTerminated(self.device.id));
        }

        let channels = targets.targets().iter().filter(|t| !t.is_silent()).count();
        let playback = Arc::new(Playback { targets, started_at: Instant::now() });
        let mut generation = 0;
        self.commands.send_modify(|command| {
            command.generation += 1;
            command.playback = Some(playback);
            generation = command.generation;
        });

        tracing::debug!(device = %self.device.id, generation, channels, "playback published");
        Ok(generation)
    }

    /// Playback that is published and not yet played out
    pub fn current(&self) -> Option<Arc<Playback>> {
        let command = self.commands.borrow();
        let playback = command.playback.as_ref()?;
        let status = self.status.borrow();
        if status.generation == command.generation && status.phase.is_settled() {
            return None;
        }
        Some(Arc::clone(playback))
    }

    pub fn is_active(&self) -> bool {
        self.current().is_some()
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status.borrow().clone()
    }

    /// Zero every channel and discard the current playback
    ///
    /// Returns once the task has written the silent frame. A no-op when
    /// nothing is playing.
    pub async fn stop(&self) -> StimResult<()> {
        let generation = match self.request_stop() {
            Some(generation) => {
                tracing::debug!(device = %self.device.id, generation, "stop requested");
                generation
            }
            None => self.commands.borrow().generation,
        };
        self.settled(generation).await.map(|_| ())
    }

    /// Wait until the device has played everything out
    ///
    /// Republishes from sibling dispatches or partial stops keep the wait
    /// going; only a full stop or a transport failure ends it early.
    /// Dropping the future stops the device.
    pub async fn complete(&self) -> StimResult<()> {
        let guard = CancelGuard::new(|| {
            if let Some(generation) = self.request_stop() {
                tracing::debug!(device = %self.device.id, generation, "completion abandoned, stopping");
            }
        });
        let finished = self.follow(None).await;
        guard.disarm();
        self.conclude(finished?)
    }

    /// Start `targets` now, keeping the remaining schedule of every other channel
    pub fn play_over(
        &self,
        targets: impl IntoIterator<Item = StimulationTarget>,
    ) -> StimResult<u64> {
        let carried = match self.current() {
            Some(playback) => playback.targets.slice(playback.elapsed_ms()),
            None => StimulationTargets::silent(Arc::clone(&self.device)),
        };
        let merged = StimulationTargets::new(
            Arc::clone(&self.device),
            carried.targets().iter().cloned().chain(targets),
        )?;
        self.play(merged)
    }

    /// Zero `channels` without disturbing the rest of the device
    ///
    /// Publishes the remaining schedule with those channels silenced, or a
    /// full stop when nothing else is left. Returns the published generation,
    /// `None` when nothing was playing.
    pub fn silence_channels(&self, channels: &[ChannelId]) -> StimResult<Option<u64>> {
        let Some(playback) = self.current() else {
            return Ok(None);
        };
        let remaining = playback.targets.slice(playback.elapsed_ms()).without(channels);
        if remaining.is_silent() {
            return Ok(self.request_stop());
        }
        self.play(remaining).map(Some)
    }

    /// [`DevicePlayer::silence_channels`], returning once the zero level is on the hardware
    pub async fn stop_channels(&self, channels: &[ChannelId]) -> StimResult<()> {
        match self.silence_channels(channels)? {
            Some(generation) => self.acknowledged(generation).await,
            None => Ok(()),
        }
    }

    /// Wait until `channels` have played out their schedule
    ///
    /// The end is recomputed whenever the device schedule is republished.
    /// Returns early once the channels are silenced, the device is stopped or
    /// the transport fails. Dropping the future silences the channels.
    pub async fn complete_channels(&self, channels: &[ChannelId]) -> StimResult<()> {
        let guard = CancelGuard::new(|| {
            if let Err(e) = self.silence_channels(channels) {
                tracing::warn!(device = %self.device.id, error = %e, "could not silence abandoned channels");
            }
        });
        let finished = self.follow(Some(channels)).await;
        guard.disarm();
        self.conclude(finished?)
    }

    /// Wait until nothing is playing on the device any more
    ///
    /// Returns the phase the last followed playback settled in, or
    /// [`PlaybackPhase::Stopped`] when it was discarded.
    pub async fn wait_until_finished(&self) -> StimResult<PlaybackPhase> {
        Ok(self.follow(None).await?.map_or(PlaybackPhase::Stopped, |status| status.phase))
    }

    /// Close the command slot and wait for the task to silence the device
    pub async fn shutdown(self) {
        let Self { device, commands, task, .. } = self;
        drop(commands);
        if let Err(e) = task.await {
            tracing::warn!(device = %device.id, error = %e, "playback task ended abnormally");
        }
    }

    /// Publish a stop without waiting for the silent frame
    pub fn request_stop(&self) -> Option<u64> {
        let live = self.is_active();
        let mut stopped = None;
        self.commands.send_if_modified(|command| {
            if !live || command.playback.is_none() {
                return false;
            }
            command.generation += 1;
            command.playback = None;
            stopped = Some(command.generation);
            true
        });
        stopped
    }

    /// Track the device schedule across republishes until `channels` (every
    /// channel when `None`) have played out
    ///
    /// Returns the settled status when a whole generation ended, `None` when
    /// the channels ended earlier or were discarded.
    async fn follow(&self, channels: Option<&[ChannelId]>) -> StimResult<Option<PlaybackStatus>> {
        let mut commands = self.commands.subscribe();
        loop {
            let (generation, playback) = {
                let command = commands.borrow_and_update();
                (command.generation, command.playback.clone())
            };
            let Some(playback) = playback else {
                return Ok(None);
            };

            let whole = playback.targets.max_duration();
            let end = match channels {
                Some(channels) => {
                    let end = channels
                        .iter()
                        .filter_map(|&channel| playback.targets.get(channel))
                        .map(StimulationTarget::span_ms)
                        .max()
                        .unwrap_or(0);
                    if end == 0 {
                        return Ok(None);
                    }
                    end
                }
                None => whole,
            };
            let early = (end < whole).then(|| deadline_after(playback.started_at, end));

            tokio::select! {
                biased;
                changed = commands.changed() => {
                    if changed.is_err() {
                        return Err(StimError::PlaybackTerminated(self.device.id));
                    }
                }
                status = self.settled(generation) => {
                    let status = status?;
                    if status.generation == generation {
                        return Ok(Some(status));
                    }
                }
                _ = sleep_until_some(early) => return Ok(None),
            }
        }
    }

    /// Release a settled generation and turn a failure into an error
    fn conclude(&self, finished: Option<PlaybackStatus>) -> StimResult<()> {
        let Some(PlaybackStatus { generation, phase }) = finished else {
            return Ok(());
        };

        // Clear the slot without waking the task; the hardware is already at 0
        self.commands.send_if_modified(|command| {
            if command.generation == generation {
                command.playback = None;
            }
            false
        });

        match phase {
            PlaybackPhase::Failed(source) => Err(StimError::Transport { device: self.device.id, source }),
            _ => Ok(()),
        }
    }

    /// Wait until the task has put `generation` on the hardware
    async fn acknowledged(&self, generation: u64) -> StimResult<()> {
        let mut status = self.status.clone();
        status
            .wait_for(|s| s.generation >= generation)
            .await
            .map(|_| ())
            .map_err(|_| StimError::PlaybackTerminated(self.device.id))
    }

    async fn settled(&self, generation: u64) -> StimResult<PlaybackStatus> {
        let mut status = self.status.clone();
        let settled = status
            .wait_for(|s| {
                s.generation > generation || (s.generation == generation && s.phase.is_settled())
            })
            .await
            .map(|s| s.clone());
        settled.map_err(|_| StimError::PlaybackTerminated(self.device.id))
    }
}

/// `start + ms`, clamped to a far but representable instant
fn deadline_after(start: Instant, ms: u64) -> Instant {
    start
        .checked_add(Duration::from_millis(ms))
        .unwrap_or_else(|| start + Duration::from_secs(FAR_FUTURE_SECS))
}

const FAR_FUTURE_SECS: u64 = 86_400 * 365 * 30;

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Runs its action if dropped before being disarmed
pub(crate) struct CancelGuard<F: FnOnce()> {
    on_cancel: Option<F>,
}

impl<F: FnOnce()> CancelGuard<F> {
    pub(crate) fn new(on_cancel: F) -> Self {
        Self { on_cancel: Some(on_cancel) }
    }

    pub(crate) fn disarm(mut self) {
        self.on_cancel = None;
    }
}

impl<F: FnOnce()> Drop for CancelGuard<F> {
    fn drop(&mut self) {
        if let Some(on_cancel) = self.on_cancel.take() {
            on_cancel();
        }
    }
}

async fn run<T: OutputTransport>(
    mut transport: T,
    mut commands: watch::Receiver<Command>,
    status: watch::Sender<PlaybackStatus>,
    late_threshold: Duration,
) {
    let device = transport.device_info().id;

    loop {
        let Command { generation, playback } = commands.borrow_and_update().clone();

        match playback {
            Some(playback) => {
                match play(&mut transport, &playback, &mut commands, late_threshold, || {
                    status.send_replace(PlaybackStatus { generation, phase: PlaybackPhase::Playing });
                })
                .await
                {
                    Outcome::Completed => {
                        tracing::debug!(device = %device, generation, "playback completed");
                        status.send_replace(PlaybackStatus { generation, phase: PlaybackPhase::Completed });
                    }
                    Outcome::Interrupted => continue,
                    Outcome::Failed(error) => {
                        tracing::error!(device = %device, generation, error = %error, "transport write failed");
                        if let Err(e) = transport.silence().await {
                            tracing::warn!(device = %device, error = %e, "could not silence device after failure");
                        }
                        status.send_replace(PlaybackStatus {
                            generation,
                            phase: PlaybackPhase::Failed(error),
                        });
                    }
                    Outcome::Closed => break,
                }
            }
            None if generation > 0 => {
                if let Err(e) = transport.silence().await {
                    tracing::warn!(device = %device, error = %e, "could not silence device");
                }
                status.send_replace(PlaybackStatus { generation, phase: PlaybackPhase::Stopped });
            }
            None => {}
        }

        if commands.changed().await.is_err() {
            break;
        }
    }

    if let Err(e) = transport.silence().await {
        tracing::warn!(device = %device, error = %e, "could not silence device on shutdown");
    }
    tracing::debug!(device = %device, "playback task finished");
}

async fn play<T: OutputTransport>(
    transport: &mut T,
    playback: &Playback,
    commands: &mut watch::Receiver<Command>,
    late_threshold: Duration,
    on_first_write: impl FnOnce(),
) -> Outcome {
    let mut on_first_write = Some(on_first_write);
    for frame in playback.targets.samples() {
        let deadline = deadline_after(playback.started_at, frame.timestamp_ms);

        tokio::select! {
            biased;
            changed = commands.changed() => {
                return match changed {
                    Ok(()) => Outcome::Interrupted,
                    Err(_) => Outcome::Closed,
                };
            }
            _ = sleep_until(deadline) => {}
        }

        let lateness = Instant::now().saturating_duration_since(deadline);
        if lateness > late_threshold {
            tracing::warn!(
                device = %playback.targets.device_id(),
                timestamp_ms = frame.timestamp_ms,
                late_ms = lateness.as_millis() as u64,
                "frame written late"
            );
        }

        if let Err(error) = transport.write(&frame).await {
            return Outcome::Failed(error);
        }
        if let Some(announce) = on_first_write.take() {
            announce();
        }
    }
    Outcome::Completed
}
