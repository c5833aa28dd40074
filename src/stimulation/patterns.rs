// src/stimulation/patterns.rs
//! Built-in stimulation patterns
//!
//! Every pattern builds its waveform with the channel's minimal signal
//! duration as the plateau floor, so short pulses get stretched rather than
//! dropped by slow actuators.

use std::sync::Arc;

use crate::hal::{ChannelCapability, Output};
use crate::stimulation::pattern::{spread, spread_ms, Intensity, Stimulation};
use crate::stimulation::waveform::{WaveForm, WaveFormBuilder};

fn builder_for(capability: &ChannelCapability) -> WaveFormBuilder {
    WaveForm::builder().minimal_duration(capability.minimal_signal_duration_ms)
}

/// Peak level for intensity-scaled patterns
///
/// Vibration motors get softer at low intensity, e-stim outputs keep their
/// full level since the device's own strength setting governs them.
fn peak_level(capability: &ChannelCapability, intensity: Intensity) -> f64 {
    match capability.output {
        Output::Vibration => spread(0.5, 1.0, intensity),
        Output::EStim => 1.0,
    }
}

/// One step of a pace: on for a growing share of the period, then off
fn step(capability: &ChannelCapability, intensity: Intensity, period_ms: u64) -> WaveForm {
    let on_ms = (period_ms as f64 * spread(0.2, 0.6, intensity)).round() as u64;
    builder_for(capability)
        .add(peak_level(capability, intensity), on_ms)
        .add(0.0, period_ms.saturating_sub(on_ms))
        .build()
}

pub mod pace {
    pub const WALK_PERIOD_MS: u64 = 1_000;
    pub const TROT_PERIOD_MS: u64 = 600;
    pub const RUN_PERIOD_MS: u64 = 400;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Walk;

impl Stimulation for Walk {
    fn name(&self) -> &'static str {
        "walk"
    }

    fn waveform(&self, capability: &ChannelCapability, intensity: Intensity) -> WaveForm {
        step(capability, intensity, pace::WALK_PERIOD_MS)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Trot;

impl Stimulation for Trot {
    fn name(&self) -> &'static str {
        "trot"
    }

    fn waveform(&self, capability: &ChannelCapability, intensity: Intensity) -> WaveForm {
        step(capability, intensity, pace::TROT_PERIOD_MS)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Run;

impl Stimulation for Run {
    fn name(&self) -> &'static str {
        "run"
    }

    fn waveform(&self, capability: &ChannelCapability, intensity: Intensity) -> WaveForm {
        step(capability, intensity, pace::RUN_PERIOD_MS)
    }
}

/// Short full-strength strokes, more of them at higher intensity
#[derive(Debug, Clone, Copy, Default)]
pub struct Whip;

impl Stimulation for Whip {
    fn name(&self) -> &'static str {
        "whip"
    }

    fn waveform(&self, capability: &ChannelCapability, intensity: Intensity) -> WaveForm {
        let strokes = spread(1.0, 3.0, intensity).round() as u32;
        let stroke_ms = spread_ms(100, 250, intensity);

        let mut builder = builder_for(capability);
        for _ in 0..strokes {
            builder.push(1.0, stroke_ms);
            builder.push(0.0, 400);
        }
        builder.push(0.0, 600);
        builder.build()
    }
}

/// One long full-strength pulse
#[derive(Debug, Clone, Copy, Default)]
pub struct Punish;

impl Stimulation for Punish {
    fn name(&self) -> &'static str {
        "punish"
    }

    fn waveform(&self, capability: &ChannelCapability, intensity: Intensity) -> WaveForm {
        builder_for(capability)
            .add(1.0, spread_ms(1_000, 3_000, intensity))
            .add(0.0, 500)
            .build()
    }
}

/// Three rising pulses with shrinking gaps
#[derive(Debug, Clone, Copy, Default)]
pub struct Tease;

impl Stimulation for Tease {
    fn name(&self) -> &'static str {
        "tease"
    }

    fn waveform(&self, capability: &ChannelCapability, intensity: Intensity) -> WaveForm {
        let peak = peak_level(capability, intensity);
        let pulse_ms = spread_ms(100, 300, intensity);
        let gap_ms = spread_ms(600, 300, intensity);

        let mut builder = builder_for(capability);
        for share in [0.3, 0.6, 1.0] {
            builder.push(peak * share, pulse_ms);
            builder.push(0.0, gap_ms);
        }
        builder.build()
    }
}

/// Double tap followed by a pause
#[derive(Debug, Clone, Copy, Default)]
pub struct Attention;

impl Stimulation for Attention {
    fn name(&self) -> &'static str {
        "attention"
    }

    fn waveform(&self, capability: &ChannelCapability, intensity: Intensity) -> WaveForm {
        let peak = peak_level(capability, intensity);
        let tap_ms = spread_ms(50, 200, intensity);

        builder_for(capability)
            .add(peak, tap_ms)
            .add(0.0, 200)
            .add(peak, tap_ms)
            .add(0.0, 1_000)
            .build()
    }
}

/// Sustained full-strength signal, longer at higher intensity
#[derive(Debug, Clone, Copy, Default)]
pub struct Cum;

impl Stimulation for Cum {
    fn name(&self) -> &'static str {
        "cum"
    }

    fn waveform(&self, capability: &ChannelCapability, intensity: Intensity) -> WaveForm {
        builder_for(capability)
            .add(1.0, spread_ms(5_000, 15_000, intensity))
            .build()
    }
}

/// Fixed level for a fixed time; intensity is ignored
#[derive(Debug, Clone, Copy)]
pub struct ConstantWave {
    pub amplitude: f64,
    pub duration_ms: u64,
}

impl ConstantWave {
    pub fn new(amplitude: f64, duration_ms: u64) -> Self {
        Self { amplitude, duration_ms }
    }
}

impl Stimulation for ConstantWave {
    fn name(&self) -> &'static str {
        "constant"
    }

    fn waveform(&self, capability: &ChannelCapability, _intensity: Intensity) -> WaveForm {
        builder_for(capability).add(self.amplitude, self.duration_ms).build()
    }
}

/// One on/off period at the intensity-scaled peak level
#[derive(Debug, Clone, Copy)]
pub struct SquareWave {
    pub on_ms: u64,
    pub off_ms: u64,
}

impl SquareWave {
    pub fn new(on_ms: u64, off_ms: u64) -> Self {
        Self { on_ms, off_ms }
    }
}

impl Stimulation for SquareWave {
    fn name(&self) -> &'static str {
        "square"
    }

    fn waveform(&self, capability: &ChannelCapability, intensity: Intensity) -> WaveForm {
        builder_for(capability)
            .add(peak_level(capability, intensity), self.on_ms)
            .add(0.0, self.off_ms)
            .build()
    }
}

/// `bursts` square periods followed by a pause
#[derive(Debug, Clone, Copy)]
pub struct BurstSquareWave {
    pub bursts: u32,
    pub on_ms: u64,
    pub off_ms: u64,
    pub pause_ms: u64,
}

impl BurstSquareWave {
    pub fn new(bursts: u32, on_ms: u64, off_ms: u64, pause_ms: u64) -> Self {
        Self { bursts, on_ms, off_ms, pause_ms }
    }
}

impl Stimulation for BurstSquareWave {
    fn name(&self) -> &'static str {
        "burst"
    }

    fn waveform(&self, capability: &ChannelCapability, intensity: Intensity) -> WaveForm {
        let peak = peak_level(capability, intensity);
        let mut builder = builder_for(capability);
        for _ in 0..self.bursts {
            builder.push(peak, self.on_ms);
            builder.push(0.0, self.off_ms);
        }
        builder.push(0.0, self.pause_ms);
        builder.build()
    }
}

/// Look up a parameterless library pattern by name
pub fn by_name(name: &str) -> Option<Arc<dyn Stimulation>> {
    let pattern: Arc<dyn Stimulation> = match name {
        "walk" => Arc::new(Walk),
        "trot" => Arc::new(Trot),
        "run" => Arc::new(Run),
        "whip" => Arc::new(Whip),
        "punish" => Arc::new(Punish),
        "tease" => Arc::new(Tease),
        "attention" => Arc::new(Attention),
        "cum" => Arc::new(Cum),
        _ => return None,
    };
    Some(pattern)
}

/// Names accepted by [`by_name`]
pub const LIBRARY: [&str; 8] = ["walk", "trot", "run", "whip", "punish", "tease", "attention", "cum"];
