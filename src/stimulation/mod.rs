// src/stimulation/mod.rs
//! Waveforms, patterns and per-channel schedules

pub mod pattern;
pub mod patterns;
pub mod target;
pub mod targets;
pub mod waveform;

pub use pattern::{spread, Intensity, Stimulation};
pub use target::{ChannelCursor, StimulationTarget};
pub use targets::{MergedSamples, StimulationTargets};
pub use waveform::{Plateau, Sample, WaveForm, WaveFormBuilder};
