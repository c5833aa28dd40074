// benches/merge_benchmarks.rs
//! Merge, slicing and pattern synthesis throughput

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use stim_core::hal::{ChannelCapability, ChannelDependency, ChannelId, ChannelSpec, DeviceId, DeviceInfo, Output};
use stim_core::stimulation::patterns::{self, BurstSquareWave};
use stim_core::stimulation::{Intensity, Stimulation, StimulationTarget, StimulationTargets, WaveForm};

const CHANNEL_COUNTS: &[usize] = &[1, 4, 8, 16, 32];
const SCHEDULE_MS: u64 = 60_000;

fn device(channels: usize) -> Arc<DeviceInfo> {
    Arc::new(DeviceInfo::new(
        DeviceId(1),
        "bench",
        (0..channels).map(|i| ChannelSpec::new(format!("ch{}", i), Output::Vibration, ChannelDependency::Independent)),
    ))
}

/// Every channel gets a differently phased burst so ties are rare
fn schedule(channels: usize) -> StimulationTargets {
    let device = device(channels);
    let targets = (0..channels).map(|i| {
        let wave = BurstSquareWave::new(3, 40 + i as u64, 60, 300)
            .waveform(&ChannelCapability::vibration(), Intensity::default());
        StimulationTarget::with_duration(ChannelId::new(DeviceId(1), i), wave, 7 * i as u64, SCHEDULE_MS)
    });
    match StimulationTargets::new(device, targets) {
        Ok(targets) => targets,
        Err(e) => panic!("bench schedule rejected: {}", e),
    }
}

fn benchmark_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");

    for &channels in CHANNEL_COUNTS {
        let targets = schedule(channels);
        let frames = targets.samples().count() as u64;
        group.throughput(Throughput::Elements(frames));

        group.bench_with_input(BenchmarkId::new("samples", channels), &targets, |b, targets| {
            b.iter(|| {
                let mut last = 0;
                for frame in black_box(targets).samples() {
                    last = frame.timestamp_ms;
                }
                last
            });
        });

        group.bench_with_input(BenchmarkId::new("slice", channels), &targets, |b, targets| {
            b.iter(|| black_box(targets).slice(black_box(SCHEDULE_MS / 3)));
        });
    }

    group.finish();
}

fn benchmark_waveform(c: &mut Criterion) {
    let mut group = c.benchmark_group("waveform");
    let wave = WaveForm::from_entries((0..256).map(|i| ((i % 11) as f64 / 10.0, 25)));

    group.bench_function("value_at", |b| {
        b.iter(|| {
            (0..wave.duration_ms()).step_by(13).map(|t| wave.value_at(black_box(t))).sum::<f64>()
        });
    });

    group.bench_function("repeated", |b| {
        b.iter(|| black_box(&wave).repeated(black_box(16)));
    });

    group.finish();
}

fn benchmark_patterns(c: &mut Criterion) {
    let mut group = c.benchmark_group("patterns");

    for name in patterns::LIBRARY {
        let Some(pattern) = patterns::by_name(name) else { continue };
        for capability in [ChannelCapability::vibration(), ChannelCapability::estim()] {
            let id = format!("{}_{:?}", name, capability.output);
            group.bench_with_input(BenchmarkId::new("synthesize", id), &capability, |b, capability| {
                b.iter(|| pattern.waveform(black_box(capability), black_box(Intensity::MAX)));
            });
        }
    }

    group.finish();
}

criterion_group!(benches, benchmark_merge, benchmark_waveform, benchmark_patterns);
criterion_main!(benches);
