// src/stimulation/target.rs
//! Scheduled playback of one channel

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::{StimError, StimResult};
use crate::hal::ChannelId;
use crate::stimulation::waveform::{Sample, WaveForm};

/// A waveform bound to a channel, started after `offset_ms` and played
/// `repeat_count` times back to back
///
/// A target resumed mid-period keeps the original waveform and records how
/// far into the first repetition it starts in `phase_ms`.
#[derive(Debug, Clone, PartialEq)]
pub struct StimulationTarget {
    channel: ChannelId,
    waveform: Arc<WaveForm>,
    offset_ms: u64,
    repeat_count: u32,
    phase_ms: u64,
}

impl StimulationTarget {
    pub fn new(
        channel: ChannelId,
        waveform: impl Into<Arc<WaveForm>>,
        offset_ms: u64,
        repeat_count: u32,
    ) -> StimResult<Self> {
        if repeat_count == 0 {
            return Err(StimError::InvalidTarget(format!(
                "repeat count for {} must be at least 1",
                channel
            )));
        }
        Ok(Self { channel, waveform: waveform.into(), offset_ms, repeat_count, phase_ms: 0 })
    }

    /// Repeat the waveform as many whole times as fit into `duration_ms`, at least once
    pub fn with_duration(
        channel: ChannelId,
        waveform: impl Into<Arc<WaveForm>>,
        offset_ms: u64,
        duration_ms: u64,
    ) -> Self {
        let waveform = waveform.into();
        let repeat_count = match waveform.duration_ms() {
            0 => 1,
            period => u32::try_from(duration_ms / period).unwrap_or(u32::MAX).max(1),
        };
        Self { channel, waveform, offset_ms, repeat_count, phase_ms: 0 }
    }

    /// Idle channel
    pub fn silent(channel: ChannelId) -> Self {
        Self { channel, waveform: Arc::new(WaveForm::empty()), offset_ms: 0, repeat_count: 1, phase_ms: 0 }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn waveform(&self) -> &Arc<WaveForm> {
        &self.waveform
    }

    pub fn offset_ms(&self) -> u64 {
        self.offset_ms
    }

    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    /// Milliseconds of the first repetition already played
    pub fn phase_ms(&self) -> u64 {
        self.phase_ms
    }

    pub fn is_silent(&self) -> bool {
        self.waveform.is_empty()
    }

    /// Time the waveform plays, without the offset
    pub fn playing_ms(&self) -> u64 {
        self.waveform
            .duration_ms()
            .saturating_mul(u64::from(self.repeat_count))
            .saturating_sub(self.phase_ms)
    }

    /// Offset plus every repetition
    pub fn span_ms(&self) -> u64 {
        self.offset_ms.saturating_add(self.playing_ms())
    }

    pub fn value_at(&self, t: u64) -> f64 {
        let Some(local) = t.checked_sub(self.offset_ms) else {
            return 0.0;
        };
        if local >= self.playing_ms() {
            return 0.0;
        }
        self.waveform.value_at((local + self.phase_ms) % self.waveform.duration_ms())
    }

    /// The target with the longer span; `a` on ties
    pub fn max_duration<'a>(a: &'a Self, b: &'a Self) -> &'a Self {
        match a.span_ms().cmp(&b.span_ms()) {
            Ordering::Less => b,
            _ => a,
        }
    }

    /// What is left of this schedule after `from_ms` of playback, rebased to 0
    pub fn slice(&self, from_ms: u64) -> Self {
        if from_ms == 0 {
            return self.clone();
        }
        if from_ms < self.offset_ms {
            return Self { offset_ms: self.offset_ms - from_ms, ..self.clone() };
        }

        let local = from_ms - self.offset_ms;
        if local >= self.playing_ms() {
            return Self::silent(self.channel);
        }

        let period = self.waveform.duration_ms();
        let played = self.phase_ms + local;
        let done = u32::try_from(played / period).unwrap_or(u32::MAX);
        Self {
            offset_ms: 0,
            repeat_count: self.repeat_count - done,
            phase_ms: played % period,
            ..self.clone()
        }
    }

    /// Same schedule with `repeats` more periods after its end
    pub fn extended(&self, repeats: u32) -> Self {
        Self { repeat_count: self.repeat_count.saturating_add(repeats), ..self.clone() }
    }

    /// Same schedule with every amplitude scaled by `factor`
    pub fn scaled(&self, factor: f64) -> Self {
        Self { waveform: Arc::new(self.waveform.scaled(factor)), ..self.clone() }
    }

    pub fn cursor(&self) -> ChannelCursor<'_> {
        ChannelCursor::new(self)
    }
}

/// Pull cursor over one target's absolute-time samples
///
/// Yields each plateau start of every repetition, shifted by the offset,
/// followed by a single terminal 0 at the target's span. The end of one
/// repetition is not emitted separately since the next one starts there.
#[derive(Debug, Clone)]
pub struct ChannelCursor<'a> {
    target: &'a StimulationTarget,
    iteration: u32,
    plateau: usize,
    pending: Option<Sample>,
    terminated: bool,
}

impl<'a> ChannelCursor<'a> {
    fn new(target: &'a StimulationTarget) -> Self {
        let plateau = target
            .waveform
            .plateaus()
            .partition_point(|p| p.start_ms <= target.phase_ms)
            .saturating_sub(1);
        let mut cursor = Self { target, iteration: 0, plateau, pending: None, terminated: false };
        cursor.pending = cursor.pull();
        cursor
    }

    pub fn channel(&self) -> ChannelId {
        self.target.channel
    }

    /// Next sample, `None` once the terminal sample was consumed
    pub fn pending(&self) -> Option<Sample> {
        self.pending
    }

    pub fn is_ended(&self) -> bool {
        self.pending.is_none()
    }

    /// Consume the pending sample
    pub fn advance(&mut self) -> Option<Sample> {
        let current = self.pending.take();
        self.pending = self.pull();
        current
    }

    fn pull(&mut self) -> Option<Sample> {
        if self.terminated {
            return None;
        }

        let plateaus = self.target.waveform.plateaus();
        if !plateaus.is_empty() {
            if self.plateau == plateaus.len() {
                self.iteration += 1;
                self.plateau = 0;
            }
            if self.iteration < self.target.repeat_count {
                let plateau = plateaus[self.plateau];
                self.plateau += 1;
                let local = u64::from(self.iteration)
                    .saturating_mul(self.target.waveform.duration_ms())
                    .saturating_add(plateau.start_ms)
                    .max(self.target.phase_ms);
                return Some(Sample {
                    timestamp_ms: self
                        .target
                        .offset_ms
                        .saturating_add(local - self.target.phase_ms),
                    amplitude: plateau.amplitude,
                });
            }
        }

        self.terminated = true;
        Some(Sample { timestamp_ms: self.target.span_ms(), amplitude: 0.0 })
    }
}

impl Iterator for ChannelCursor<'_> {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        self.advance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::DeviceId;

    fn channel() -> ChannelId {
        ChannelId::new(DeviceId(1), 0)
    }

    fn square() -> WaveForm {
        WaveForm::from_entries([(1.0, 500), (0.0, 500)])
    }

    fn sample(timestamp_ms: u64, amplitude: f64) -> Sample {
        Sample { timestamp_ms, amplitude }
    }

    #[test]
    fn test_repeat_from_duration() {
        let target = StimulationTarget::with_duration(channel(), square(), 0, 2_000);
        assert_eq!(target.repeat_count(), 2);
        assert_eq!(target.span_ms(), 2_000);

        assert_eq!(StimulationTarget::with_duration(channel(), square(), 0, 2_999).repeat_count(), 2);
        assert_eq!(StimulationTarget::with_duration(channel(), square(), 0, 10).repeat_count(), 1);
        assert_eq!(StimulationTarget::with_duration(channel(), WaveForm::empty(), 0, 10).repeat_count(), 1);
    }

    #[test]
    fn test_zero_repeat_rejected() {
        assert!(matches!(
            StimulationTarget::new(channel(), square(), 0, 0),
            Err(StimError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_value_at_with_offset_and_repeats() {
        let target = StimulationTarget::new(channel(), square(), 1_000, 2).unwrap();
        assert_eq!(target.span_ms(), 3_000);
        assert_eq!(target.value_at(999), 0.0);
        assert_eq!(target.value_at(1_000), 1.0);
        assert_eq!(target.value_at(1_500), 0.0);
        assert_eq!(target.value_at(2_000), 1.0);
        assert_eq!(target.value_at(2_999), 0.0);
        assert_eq!(target.value_at(3_000), 0.0);
    }

    #[test]
    fn test_cursor_repeats_interior_transitions() {
        let target = StimulationTarget::with_duration(channel(), square(), 0, 2_000);
        let samples: Vec<_> = target.cursor().collect();
        assert_eq!(
            samples,
            vec![
                sample(0, 1.0),
                sample(500, 0.0),
                sample(1_000, 1.0),
                sample(1_500, 0.0),
                sample(2_000, 0.0),
            ]
        );
    }

    #[test]
    fn test_cursor_offset_and_silent() {
        let offset = StimulationTarget::new(channel(), square(), 250, 1).unwrap();
        let samples: Vec<_> = offset.cursor().collect();
        assert_eq!(samples, vec![sample(250, 1.0), sample(750, 0.0), sample(1_250, 0.0)]);

        let silent = StimulationTarget::silent(channel());
        let mut cursor = silent.cursor();
        assert_eq!(cursor.pending(), Some(sample(0, 0.0)));
        cursor.advance();
        assert!(cursor.is_ended());
        assert_eq!(cursor.advance(), None);
    }

    #[test]
    fn test_max_duration() {
        let short = StimulationTarget::new(channel(), square(), 0, 1).unwrap();
        let long = StimulationTarget::new(channel(), square(), 500, 1).unwrap();
        assert_eq!(StimulationTarget::max_duration(&short, &long), &long);
        assert_eq!(StimulationTarget::max_duration(&long, &short), &long);
    }

    #[test]
    fn test_slice_mid_repeat() {
        let target = StimulationTarget::new(channel(), square(), 0, 3).unwrap();
        let rest = target.slice(1_250);

        assert_eq!(rest.span_ms(), 1_750);
        for t in (0..2_000).step_by(50) {
            assert_eq!(rest.value_at(t), target.value_at(t + 1_250), "mismatch at {}", t);
        }
    }

    #[test]
    fn test_slice_boundaries() {
        let target = StimulationTarget::new(channel(), square(), 400, 2).unwrap();

        let before = target.slice(100);
        assert_eq!(before.offset_ms(), 300);
        assert_eq!(before.repeat_count(), 2);

        let aligned = target.slice(1_400);
        assert_eq!(aligned.offset_ms(), 0);
        assert_eq!(aligned.repeat_count(), 1);
        assert_eq!(aligned.span_ms(), 1_000);

        assert!(target.slice(2_400).is_silent());
        assert!(target.slice(10_000).is_silent());
    }

    #[test]
    fn test_slice_keeps_waveform_periodic() {
        let target = StimulationTarget::with_duration(channel(), square(), 0, 2_000_000_000);
        let rest = target.slice(250);

        assert!(Arc::ptr_eq(rest.waveform(), target.waveform()));
        assert_eq!(rest.phase_ms(), 250);
        assert_eq!(rest.repeat_count(), 2_000_000);
        assert_eq!(rest.span_ms(), target.span_ms() - 250);
        for t in (0..3_000).step_by(125) {
            assert_eq!(rest.value_at(t), target.value_at(t + 250), "mismatch at {}", t);
        }

        let later = rest.slice(1_500);
        assert_eq!(later.phase_ms(), 750);
        assert_eq!(later.repeat_count(), 1_999_999);
        assert_eq!(later.value_at(0), 0.0);
        assert_eq!(later.value_at(250), 1.0);
    }

    #[test]
    fn test_cursor_resumes_mid_period() {
        let target = StimulationTarget::new(channel(), square(), 0, 2).unwrap();
        let samples: Vec<_> = target.slice(250).cursor().collect();
        assert_eq!(
            samples,
            vec![
                sample(0, 1.0),
                sample(250, 0.0),
                sample(750, 1.0),
                sample(1_250, 0.0),
                sample(1_750, 0.0),
            ]
        );

        let quiet: Vec<_> = target.slice(600).cursor().collect();
        assert_eq!(quiet[0], sample(0, 0.0));
        assert_eq!(quiet.last(), Some(&sample(1_400, 0.0)));
    }

    #[test]
    fn test_extended_adds_periods() {
        let target = StimulationTarget::new(channel(), square(), 0, 2).unwrap();
        let rest = target.slice(1_250).extended(3);
        assert_eq!(rest.repeat_count(), 4);
        assert_eq!(rest.span_ms(), 3_750);
        assert_eq!(rest.value_at(3_700), 0.0);
        assert_eq!(rest.value_at(3_500), 0.0);
        assert_eq!(rest.value_at(3_000), 1.0);
    }

    #[test]
    fn test_cursor_saturates_far_offsets() {
        let target = StimulationTarget::new(channel(), square(), u64::MAX - 100, 3).unwrap();
        let samples: Vec<_> = target.cursor().collect();
        assert_eq!(samples.first(), Some(&sample(u64::MAX - 100, 1.0)));
        assert_eq!(samples.last(), Some(&sample(u64::MAX, 0.0)));
        assert!(samples.windows(2).all(|w| w[0].timestamp_ms <= w[1].timestamp_ms));
    }
}
