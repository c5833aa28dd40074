// src/stimulation/waveform.rs
//! Amplitude timelines
//!
//! A [`WaveForm`] is an immutable sequence of constant-amplitude plateaus with
//! absolute start times. Its declared duration is authoritative, and its
//! output is forced to 0 at that point whatever the last plateau's level was.

use crate::config::constants::signal::{MAX_AMPLITUDE, MIN_AMPLITUDE};

/// Constant-amplitude interval starting at `start_ms`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plateau {
    pub amplitude: f64,
    pub start_ms: u64,
}

/// Point-in-time observation of one channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp_ms: u64,
    pub amplitude: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WaveForm {
    plateaus: Vec<Plateau>,
    duration_ms: u64,
}

impl WaveForm {
    pub fn builder() -> WaveFormBuilder {
        WaveFormBuilder::new()
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn constant(amplitude: f64, duration_ms: u64) -> Self {
        Self::builder().add(amplitude, duration_ms).build()
    }

    /// Build from `(amplitude, duration_ms)` pairs
    pub fn from_entries(entries: impl IntoIterator<Item = (f64, u64)>) -> Self {
        entries
            .into_iter()
            .fold(Self::builder(), |builder, (amplitude, duration_ms)| {
                builder.add(amplitude, duration_ms)
            })
            .build()
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn is_empty(&self) -> bool {
        self.duration_ms == 0
    }

    pub fn plateaus(&self) -> &[Plateau] {
        &self.plateaus
    }

    /// Plateaus as `(amplitude, duration_ms)` pairs
    pub fn entries(&self) -> impl Iterator<Item = (f64, u64)> + '_ {
        self.plateaus.iter().enumerate().map(move |(i, plateau)| {
            let end = self
                .plateaus
                .get(i + 1)
                .map_or(self.duration_ms, |next| next.start_ms);
            (plateau.amplitude, end - plateau.start_ms)
        })
    }

    /// Amplitude at `t`; 0 at and after the declared end
    pub fn value_at(&self, t: u64) -> f64 {
        if t >= self.duration_ms {
            return 0.0;
        }
        match self.plateau_index(t) {
            Some(index) => self.plateaus[index].amplitude,
            None => 0.0,
        }
    }

    /// Earliest transition strictly after `t`, `None` once the end has passed
    ///
    /// The forced de-assert at the declared end counts as a transition.
    pub fn next_transition(&self, t: u64) -> Option<u64> {
        if t >= self.duration_ms {
            return None;
        }
        let next = self.plateaus.partition_point(|p| p.start_ms <= t);
        Some(self.plateaus.get(next).map_or(self.duration_ms, |p| p.start_ms))
    }

    /// One sample per plateau start, then `(duration, 0.0)`
    pub fn samples(&self) -> Samples<'_> {
        Samples { waveform: self, next: 0, finished: false }
    }

    /// Remaining portion from `from_ms` onward, rebased to start at 0
    pub fn slice(&self, from_ms: u64) -> WaveForm {
        if from_ms == 0 {
            return self.clone();
        }
        if from_ms >= self.duration_ms {
            return WaveForm::empty();
        }

        let first = self.plateau_index(from_ms).unwrap_or(0);
        let plateaus = self.plateaus[first..]
            .iter()
            .map(|p| Plateau {
                amplitude: p.amplitude,
                start_ms: p.start_ms.saturating_sub(from_ms),
            })
            .collect();

        WaveForm { plateaus, duration_ms: self.duration_ms - from_ms }
    }

    /// Prepend an off-plateau of `offset_ms`
    pub fn delayed(&self, offset_ms: u64) -> WaveForm {
        if offset_ms == 0 {
            return self.clone();
        }
        Self::from_entries(std::iter::once((0.0, offset_ms)).chain(self.entries()))
    }

    /// Scale every plateau by `factor`, clamped into the amplitude range
    pub fn scaled(&self, factor: f64) -> WaveForm {
        Self::from_entries(self.entries().map(|(amplitude, d)| (amplitude * factor, d)))
    }

    /// This waveform played `count` times back to back
    pub fn repeated(&self, count: u32) -> WaveForm {
        let entries: Vec<_> = self.entries().collect();
        Self::from_entries((0..count).flat_map(|_| entries.iter().copied()))
    }

    fn plateau_index(&self, t: u64) -> Option<usize> {
        self.plateaus.partition_point(|p| p.start_ms <= t).checked_sub(1)
    }
}

/// Lazy, finite, restartable sample sequence of a [`WaveForm`]
#[derive(Debug, Clone)]
pub struct Samples<'a> {
    waveform: &'a WaveForm,
    next: usize,
    finished: bool,
}

impl Iterator for Samples<'_> {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        if let Some(plateau) = self.waveform.plateaus.get(self.next) {
            self.next += 1;
            return Some(Sample { timestamp_ms: plateau.start_ms, amplitude: plateau.amplitude });
        }
        if self.finished {
            return None;
        }
        self.finished = true;
        Some(Sample { timestamp_ms: self.waveform.duration_ms, amplitude: 0.0 })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.waveform.plateaus.len().saturating_sub(self.next)
            + usize::from(!self.finished);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Samples<'_> {}

/// Appends plateaus at the running cumulative time
///
/// Amplitudes are clamped into `[0, 1]`, zero-length plateaus are skipped and
/// adjacent plateaus with equal amplitude are merged, so every plateau start
/// is a real transition.
#[derive(Debug, Clone, Default)]
pub struct WaveFormBuilder {
    plateaus: Vec<Plateau>,
    elapsed_ms: u64,
    minimal_duration_ms: u64,
}

impl WaveFormBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stretch every plateau to at least `ms`
    pub fn minimal_duration(mut self, ms: u64) -> Self {
        self.minimal_duration_ms = ms;
        self
    }

    pub fn add(mut self, amplitude: f64, duration_ms: u64) -> Self {
        self.push(amplitude, duration_ms);
        self
    }

    /// Append in place, for loops
    pub fn push(&mut self, amplitude: f64, duration_ms: u64) {
        if duration_ms == 0 {
            return;
        }
        let duration_ms = duration_ms.max(self.minimal_duration_ms);
        let amplitude = clamp_amplitude(amplitude);

        let continues_last = self
            .plateaus
            .last()
            .is_some_and(|last| last.amplitude == amplitude);
        if !continues_last {
            self.plateaus.push(Plateau { amplitude, start_ms: self.elapsed_ms });
        }
        self.elapsed_ms += duration_ms;
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn build(self) -> WaveForm {
        WaveForm { plateaus: self.plateaus, duration_ms: self.elapsed_ms }
    }
}

fn clamp_amplitude(amplitude: f64) -> f64 {
    if amplitude.is_nan() {
        MIN_AMPLITUDE
    } else {
        amplitude.clamp(MIN_AMPLITUDE, MAX_AMPLITUDE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> WaveForm {
        WaveForm::from_entries([(1.0, 500), (0.0, 500)])
    }

    #[test]
    fn test_square_wave_values() {
        let wave = square();
        assert_eq!(wave.duration_ms(), 1000);
        assert_eq!(wave.value_at(0), 1.0);
        assert_eq!(wave.value_at(499), 1.0);
        assert_eq!(wave.value_at(500), 0.0);
        assert_eq!(wave.value_at(999), 0.0);
        assert_eq!(wave.value_at(1000), 0.0);
    }

    #[test]
    fn test_forced_zero_at_end() {
        let wave = WaveForm::constant(0.8, 300);
        assert_eq!(wave.value_at(299), 0.8);
        assert_eq!(wave.value_at(300), 0.0);

        let samples: Vec<_> = wave.samples().collect();
        assert_eq!(
            samples,
            vec![
                Sample { timestamp_ms: 0, amplitude: 0.8 },
                Sample { timestamp_ms: 300, amplitude: 0.0 },
            ]
        );
    }

    #[test]
    fn test_samples_restartable() {
        let wave = square();
        let first: Vec<_> = wave.samples().collect();
        let second: Vec<_> = wave.samples().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert_eq!(wave.samples().len(), 3);
    }

    #[test]
    fn test_next_transition() {
        let wave = square();
        assert_eq!(wave.next_transition(0), Some(500));
        assert_eq!(wave.next_transition(499), Some(500));
        assert_eq!(wave.next_transition(500), Some(1000));
        assert_eq!(wave.next_transition(1000), None);
    }

    #[test]
    fn test_builder_merges_and_clamps() {
        let wave = WaveForm::builder()
            .add(0.5, 100)
            .add(0.5, 100)
            .add(2.0, 0)
            .add(2.0, 50)
            .add(f64::NAN, 10)
            .build();

        assert_eq!(wave.duration_ms(), 260);
        assert_eq!(
            wave.plateaus(),
            &[
                Plateau { amplitude: 0.5, start_ms: 0 },
                Plateau { amplitude: 1.0, start_ms: 200 },
                Plateau { amplitude: 0.0, start_ms: 250 },
            ]
        );
    }

    #[test]
    fn test_minimal_duration() {
        let wave = WaveForm::builder().minimal_duration(50).add(1.0, 10).add(0.0, 200).build();
        assert_eq!(wave.entries().collect::<Vec<_>>(), vec![(1.0, 50), (0.0, 200)]);
    }

    #[test]
    fn test_slice() {
        let wave = WaveForm::from_entries([(1.0, 500), (0.5, 250), (0.0, 250)]);

        let tail = wave.slice(600);
        assert_eq!(tail.duration_ms(), 400);
        assert_eq!(tail.entries().collect::<Vec<_>>(), vec![(0.5, 150), (0.0, 250)]);

        assert_eq!(wave.slice(0), wave);
        assert!(wave.slice(1000).is_empty());
        assert!(wave.slice(5000).is_empty());
    }

    #[test]
    fn test_delayed() {
        let wave = square().delayed(200);
        assert_eq!(wave.duration_ms(), 1200);
        assert_eq!(wave.value_at(199), 0.0);
        assert_eq!(wave.value_at(200), 1.0);
        assert_eq!(wave.next_transition(0), Some(200));

        // leading silence merges with an existing off-plateau
        let off_first = WaveForm::from_entries([(0.0, 100), (1.0, 100)]).delayed(50);
        assert_eq!(off_first.entries().collect::<Vec<_>>(), vec![(0.0, 150), (1.0, 100)]);
    }

    #[test]
    fn test_scaled_and_repeated() {
        let wave = square().scaled(0.5);
        assert_eq!(wave.value_at(0), 0.5);

        let twice = square().repeated(2);
        assert_eq!(twice.duration_ms(), 2000);
        assert_eq!(twice.value_at(1000), 1.0);
        assert_eq!(twice.plateaus().len(), 4);

        assert!(square().repeated(0).is_empty());
    }

    #[test]
    fn test_empty_waveform() {
        let wave = WaveForm::empty();
        assert_eq!(wave.duration_ms(), 0);
        assert_eq!(wave.value_at(0), 0.0);
        assert_eq!(wave.next_transition(0), None);
        assert_eq!(
            wave.samples().collect::<Vec<_>>(),
            vec![Sample { timestamp_ms: 0, amplitude: 0.0 }]
        );
    }
}
