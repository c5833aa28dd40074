// tests/merge_properties.rs
//! Waveform and multi-channel merge behaviour
//!
//! Fixed fixtures for the documented merge cases, plus proptest properties
//! over arbitrary waveforms and schedules.

use std::sync::Arc;

use proptest::prelude::*;
use stim_core::hal::{ChannelDependency, ChannelId, ChannelSpec, DeviceId, DeviceInfo, Frame, Output};
use stim_core::stimulation::{StimulationTarget, StimulationTargets, WaveForm};

fn device(channels: usize) -> Arc<DeviceInfo> {
    Arc::new(DeviceInfo::new(
        DeviceId(1),
        "bench",
        (0..channels).map(|i| ChannelSpec::new(format!("ch{}", i), Output::Vibration, ChannelDependency::Independent)),
    ))
}

fn channel(index: usize) -> ChannelId {
    ChannelId::new(DeviceId(1), index)
}

fn square() -> Arc<WaveForm> {
    Arc::new(WaveForm::from_entries([(1.0, 500), (0.0, 500)]))
}

fn frames(targets: &StimulationTargets) -> Vec<(u64, Vec<f64>)> {
    targets.samples().map(|Frame { timestamp_ms, levels }| (timestamp_ms, levels)).collect()
}

#[test]
fn test_square_wave_fixture() {
    let wave = square();
    assert_eq!(wave.duration_ms(), 1_000);
    for (t, expected) in [(0, 1.0), (499, 1.0), (500, 0.0), (999, 0.0), (1_000, 0.0)] {
        assert_eq!(wave.value_at(t), expected, "value at {}", t);
    }
}

#[test]
fn test_all_silent_device() {
    let targets = StimulationTargets::silent(device(4));
    assert_eq!(frames(&targets), vec![(0, vec![0.0; 4])]);
}

#[test]
fn test_two_identical_square_channels() {
    let targets = StimulationTargets::new(
        device(2),
        (0..2).map(|i| StimulationTarget::with_duration(channel(i), square(), 0, 1_000)),
    )
    .unwrap();

    assert_eq!(
        frames(&targets),
        vec![(0, vec![1.0, 1.0]), (500, vec![0.0, 0.0]), (1_000, vec![0.0, 0.0])]
    );
}

#[test]
fn test_three_offset_channels() {
    let targets = StimulationTargets::new(
        device(3),
        (0..3).map(|i| StimulationTarget::new(channel(i), square(), 1_000 * i as u64, 1).unwrap()),
    )
    .unwrap();

    let merged = frames(&targets);
    let timestamps: Vec<_> = merged.iter().map(|(t, _)| *t).collect();
    assert_eq!(timestamps, vec![0, 500, 1_000, 1_500, 2_000, 2_500, 3_000]);

    let at_1000 = &merged.iter().find(|(t, _)| *t == 1_000).unwrap().1;
    assert_eq!(at_1000, &vec![0.0, 1.0, 0.0]);
}

#[test]
fn test_repeat_expansion() {
    let targets = StimulationTargets::new(
        device(1),
        [StimulationTarget::with_duration(channel(0), square(), 0, 2_000)],
    )
    .unwrap();

    let merged = frames(&targets);
    let first_period: Vec<_> = merged.iter().filter(|(t, _)| *t < 1_000).cloned().collect();
    let second_period: Vec<_> = merged
        .iter()
        .filter(|(t, _)| (1_000..2_000).contains(t))
        .map(|(t, levels)| (t - 1_000, levels.clone()))
        .collect();

    assert_eq!(first_period, second_period);
    assert_eq!(merged.last(), Some(&(2_000, vec![0.0])));
}

fn waveform_entries() -> impl Strategy<Value = Vec<(f64, u64)>> {
    prop::collection::vec((0.0f64..=1.0, 1u64..400), 0..8)
}

fn schedule() -> impl Strategy<Value = (Vec<(f64, u64)>, u64, u32)> {
    (waveform_entries(), 0u64..1_500, 1u32..4)
}

proptest! {
    #[test]
    fn prop_duration_is_sum_of_entries(entries in waveform_entries()) {
        let wave = WaveForm::from_entries(entries.iter().copied());
        prop_assert_eq!(wave.duration_ms(), entries.iter().map(|(_, d)| d).sum::<u64>());
    }

    #[test]
    fn prop_zero_outside_duration(entries in waveform_entries(), past in 0u64..10_000) {
        let wave = WaveForm::from_entries(entries);
        prop_assert_eq!(wave.value_at(wave.duration_ms() + past), 0.0);
    }

    #[test]
    fn prop_next_transition_advances(entries in waveform_entries()) {
        let wave = WaveForm::from_entries(entries);
        let mut previous = 0;
        for t in 0..=wave.duration_ms() {
            if let Some(next) = wave.next_transition(t) {
                prop_assert!(next > t);
                prop_assert!(next >= previous);
                previous = next;
            }
        }
    }

    #[test]
    fn prop_samples_match_value_at(entries in waveform_entries()) {
        let wave = WaveForm::from_entries(entries);
        for sample in wave.samples() {
            prop_assert_eq!(sample.amplitude, wave.value_at(sample.timestamp_ms));
        }
    }

    #[test]
    fn prop_merge_is_monotonic_and_exact(schedules in prop::collection::vec(schedule(), 1..5)) {
        let device = device(schedules.len());
        let targets = StimulationTargets::new(
            Arc::clone(&device),
            schedules.iter().enumerate().map(|(i, (entries, offset, repeats))| {
                StimulationTarget::new(channel(i), WaveForm::from_entries(entries.iter().copied()), *offset, *repeats)
                    .unwrap()
            }),
        )
        .unwrap();

        let merged: Vec<_> = targets.samples().collect();
        prop_assert!(!merged.is_empty());
        for pair in merged.windows(2) {
            prop_assert!(pair[0].timestamp_ms < pair[1].timestamp_ms);
        }
        for frame in &merged {
            prop_assert_eq!(&frame.levels, &targets.levels_at(frame.timestamp_ms));
        }

        let last = merged.last().unwrap();
        prop_assert!(last.is_silent());
        prop_assert_eq!(last.timestamp_ms, targets.max_duration());
    }

    #[test]
    fn prop_slice_preserves_remaining_levels(plan in schedule(), cut in 0u64..4_000) {
        let (entries, offset, repeats) = plan;
        let target = StimulationTarget::new(channel(0), WaveForm::from_entries(entries), offset, repeats).unwrap();
        let rest = target.slice(cut);

        prop_assert_eq!(rest.span_ms(), target.span_ms().saturating_sub(cut));
        for t in (0..rest.span_ms()).step_by(37) {
            prop_assert_eq!(rest.value_at(t), target.value_at(t + cut));
        }
    }
}
