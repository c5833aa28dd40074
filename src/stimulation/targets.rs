// src/stimulation/targets.rs
//! Per-device channel set and the multi-channel merge
//!
//! [`StimulationTargets`] holds one [`StimulationTarget`] per channel of a
//! device, index-aligned with the device's channel list. [`MergedSamples`]
//! walks all channel cursors in lockstep and yields one [`Frame`] per distinct
//! transition time, with simultaneous transitions grouped into a single frame.

use std::sync::Arc;

use crate::error::{StimError, StimResult};
use crate::hal::{ChannelId, DeviceId, DeviceInfo, Frame};
use crate::stimulation::target::{ChannelCursor, StimulationTarget};

#[derive(Debug, Clone, PartialEq)]
pub struct StimulationTargets {
    device: Arc<DeviceInfo>,
    targets: Vec<StimulationTarget>,
}

impl StimulationTargets {
    /// Place each target in its channel's slot; unfilled slots stay silent
    ///
    /// A later target for the same channel replaces an earlier one. Fails if
    /// any target is bound to a channel the device does not own.
    pub fn new(
        device: Arc<DeviceInfo>,
        targets: impl IntoIterator<Item = StimulationTarget>,
    ) -> StimResult<Self> {
        let mut slots = Self::silent(device);
        for target in targets {
            slots.place(target)?;
        }
        Ok(slots)
    }

    pub fn silent(device: Arc<DeviceInfo>) -> Self {
        let targets = device
            .channels
            .iter()
            .map(|channel| StimulationTarget::silent(channel.id))
            .collect();
        Self { device, targets }
    }

    pub fn device(&self) -> &Arc<DeviceInfo> {
        &self.device
    }

    pub fn device_id(&self) -> DeviceId {
        self.device.id
    }

    pub fn targets(&self) -> &[StimulationTarget] {
        &self.targets
    }

    pub fn get(&self, channel: ChannelId) -> Option<&StimulationTarget> {
        if !self.device.owns(channel) {
            return None;
        }
        self.targets.get(channel.index)
    }

    pub fn channel_count(&self) -> usize {
        self.targets.len()
    }

    /// Longest span over all channels
    pub fn max_duration(&self) -> u64 {
        self.targets
            .iter()
            .reduce(StimulationTarget::max_duration)
            .map_or(0, StimulationTarget::span_ms)
    }

    pub fn is_silent(&self) -> bool {
        self.targets.iter().all(StimulationTarget::is_silent)
    }

    /// Copy with one channel's target swapped out
    pub fn replace(&self, target: StimulationTarget) -> StimResult<Self> {
        let mut next = self.clone();
        next.place(target)?;
        Ok(next)
    }

    /// Copy with the given channels silenced
    pub fn without(&self, channels: &[ChannelId]) -> Self {
        let mut next = self.clone();
        for slot in &mut next.targets {
            if channels.contains(&slot.channel()) {
                *slot = StimulationTarget::silent(slot.channel());
            }
        }
        next
    }

    /// Remaining schedule of every channel after `from_ms` of playback
    pub fn slice(&self, from_ms: u64) -> Self {
        Self {
            device: Arc::clone(&self.device),
            targets: self.targets.iter().map(|target| target.slice(from_ms)).collect(),
        }
    }

    /// Level of every channel at `t`
    pub fn levels_at(&self, t: u64) -> Vec<f64> {
        self.targets.iter().map(|target| target.value_at(t)).collect()
    }

    pub fn samples(&self) -> MergedSamples<'_> {
        MergedSamples::new(&self.targets)
    }

    fn place(&mut self, target: StimulationTarget) -> StimResult<()> {
        let channel = target.channel();
        if !self.device.owns(channel) {
            return Err(StimError::ForeignChannel { channel, device: self.device.id });
        }
        self.targets[channel.index] = target;
        Ok(())
    }
}

/// Lazy merged frame sequence over all channels of a device
///
/// Timestamps are strictly increasing. Channels that did not transition at a
/// frame's timestamp keep their previous level; channels still inside their
/// offset read 0.
#[derive(Debug, Clone)]
pub struct MergedSamples<'a> {
    cursors: Vec<ChannelCursor<'a>>,
    levels: Vec<f64>,
}

impl<'a> MergedSamples<'a> {
    fn new(targets: &'a [StimulationTarget]) -> Self {
        Self {
            cursors: targets.iter().map(StimulationTarget::cursor).collect(),
            levels: vec![0.0; targets.len()],
        }
    }

    /// Timestamp of the next frame without consuming it
    pub fn peek_timestamp(&self) -> Option<u64> {
        self.cursors
            .iter()
            .filter_map(|cursor| cursor.pending())
            .map(|sample| sample.timestamp_ms)
            .min()
    }
}

impl Iterator for MergedSamples<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        let timestamp_ms = self.peek_timestamp()?;

        for (cursor, level) in self.cursors.iter_mut().zip(self.levels.iter_mut()) {
            if let Some(sample) = cursor.pending() {
                if sample.timestamp_ms == timestamp_ms {
                    *level = sample.amplitude;
                    cursor.advance();
                }
            }
        }

        Some(Frame { timestamp_ms, levels: self.levels.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{ChannelDependency, ChannelSpec, Output};
    use crate::stimulation::waveform::WaveForm;

    fn device(id: u32, channels: usize) -> Arc<DeviceInfo> {
        let specs = (0..channels).map(|i| {
            ChannelSpec::new(format!("ch{}", i), Output::EStim, ChannelDependency::Independent)
        });
        Arc::new(DeviceInfo::new(DeviceId(id), format!("device{}", id), specs))
    }

    fn square() -> Arc<WaveForm> {
        Arc::new(WaveForm::from_entries([(1.0, 500), (0.0, 500)]))
    }

    fn frame(timestamp_ms: u64, levels: &[f64]) -> Frame {
        Frame { timestamp_ms, levels: levels.to_vec() }
    }

    #[test]
    fn test_all_silent() {
        let targets = StimulationTargets::silent(device(1, 3));
        assert!(targets.is_silent());
        assert_eq!(targets.max_duration(), 0);

        let frames: Vec<_> = targets.samples().collect();
        assert_eq!(frames, vec![frame(0, &[0.0, 0.0, 0.0])]);
    }

    #[test]
    fn test_identical_channels_group_ties() {
        let device = device(1, 2);
        let targets = StimulationTargets::new(
            Arc::clone(&device),
            (0..2).map(|i| StimulationTarget::with_duration(ChannelId::new(device.id, i), square(), 0, 1_000)),
        )
        .unwrap();

        let frames: Vec<_> = targets.samples().collect();
        assert_eq!(
            frames,
            vec![frame(0, &[1.0, 1.0]), frame(500, &[0.0, 0.0]), frame(1_000, &[0.0, 0.0])]
        );
    }

    #[test]
    fn test_staggered_offsets() {
        let device = device(1, 3);
        let targets = StimulationTargets::new(
            Arc::clone(&device),
            (0..3).map(|i| {
                StimulationTarget::new(ChannelId::new(device.id, i), square(), 1_000 * i as u64, 1)
                    .unwrap()
            }),
        )
        .unwrap();

        let frames: Vec<_> = targets.samples().collect();
        let timestamps: Vec<_> = frames.iter().map(|f| f.timestamp_ms).collect();
        assert_eq!(timestamps, vec![0, 500, 1_000, 1_500, 2_000, 2_500, 3_000]);
        assert_eq!(frames[2], frame(1_000, &[0.0, 1.0, 0.0]));
        assert_eq!(frames[0], frame(0, &[1.0, 0.0, 0.0]));
        assert!(frames.last().unwrap().is_silent());
    }

    #[test]
    fn test_repeat_reemits_transitions() {
        let device = device(1, 1);
        let target = StimulationTarget::with_duration(ChannelId::new(device.id, 0), square(), 0, 2_000);
        let targets = StimulationTargets::new(device, [target]).unwrap();

        let frames: Vec<_> = targets.samples().collect();
        assert_eq!(
            frames,
            vec![
                frame(0, &[1.0]),
                frame(500, &[0.0]),
                frame(1_000, &[1.0]),
                frame(1_500, &[0.0]),
                frame(2_000, &[0.0]),
            ]
        );
    }

    #[test]
    fn test_foreign_channel_rejected() {
        let foreign = StimulationTarget::silent(ChannelId::new(DeviceId(9), 0));
        let result = StimulationTargets::new(device(1, 2), [foreign]);
        assert_eq!(
            result.unwrap_err(),
            StimError::ForeignChannel { channel: ChannelId::new(DeviceId(9), 0), device: DeviceId(1) }
        );

        let out_of_range = StimulationTarget::silent(ChannelId::new(DeviceId(1), 5));
        assert!(StimulationTargets::new(device(1, 2), [out_of_range]).is_err());
    }

    #[test]
    fn test_later_target_wins() {
        let device = device(1, 1);
        let channel = ChannelId::new(device.id, 0);
        let first = StimulationTarget::new(channel, square(), 0, 1).unwrap();
        let second = StimulationTarget::new(channel, square(), 0, 3).unwrap();

        let targets = StimulationTargets::new(device, [first, second]).unwrap();
        assert_eq!(targets.get(channel).unwrap().repeat_count(), 3);
        assert_eq!(targets.max_duration(), 3_000);
    }

    #[test]
    fn test_slice_and_without() {
        let device = device(1, 2);
        let targets = StimulationTargets::new(
            Arc::clone(&device),
            (0..2).map(|i| StimulationTarget::new(ChannelId::new(device.id, i), square(), 0, 2).unwrap()),
        )
        .unwrap();

        let rest = targets.slice(700);
        assert_eq!(rest.max_duration(), 1_300);
        assert_eq!(rest.levels_at(300), targets.levels_at(1_000));

        let trimmed = targets.without(&[ChannelId::new(device.id, 1)]);
        assert!(!trimmed.targets()[0].is_silent());
        assert!(trimmed.targets()[1].is_silent());
    }

    #[test]
    fn test_frames_match_levels() {
        let device = device(1, 2);
        let targets = StimulationTargets::new(
            Arc::clone(&device),
            [
                StimulationTarget::new(ChannelId::new(device.id, 0), square(), 0, 3).unwrap(),
                StimulationTarget::new(ChannelId::new(device.id, 1), square(), 250, 2).unwrap(),
            ],
        )
        .unwrap();

        for frame in targets.samples() {
            assert_eq!(frame.levels, targets.levels_at(frame.timestamp_ms));
        }
    }
}
