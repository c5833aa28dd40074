// src/stimulation/pattern.rs
//! Pattern abstraction and the intensity knob

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::constants::intensity;
use crate::error::StimError;
use crate::hal::ChannelCapability;
use crate::stimulation::waveform::WaveForm;

/// User-facing strength knob, `0..=10`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Intensity(u8);

impl Intensity {
    pub const MIN: Intensity = Intensity(intensity::MIN);
    pub const MAX: Intensity = Intensity(intensity::MAX);

    pub fn new(value: u8) -> Result<Self, StimError> {
        if value > intensity::MAX {
            return Err(StimError::InvalidTarget(format!(
                "intensity {} exceeds maximum {}",
                value,
                intensity::MAX
            )));
        }
        Ok(Self(value))
    }

    /// Clamp out-of-range values instead of rejecting them
    pub fn saturating(value: u8) -> Self {
        Self(value.min(intensity::MAX))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Position in the range as a fraction in `[0, 1]`
    pub fn fraction(self) -> f64 {
        f64::from(self.0) / f64::from(intensity::MAX)
    }
}

impl Default for Intensity {
    fn default() -> Self {
        Self(intensity::DEFAULT)
    }
}

impl TryFrom<u8> for Intensity {
    type Error = StimError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Intensity> for u8 {
    fn from(intensity: Intensity) -> u8 {
        intensity.0
    }
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, intensity::MAX)
    }
}

/// Linear interpolation of a parameter across the intensity range
pub fn spread(from: f64, to: f64, intensity: Intensity) -> f64 {
    from + (to - from) * intensity.fraction()
}

/// [`spread`] for millisecond parameters
pub fn spread_ms(from: u64, to: u64, intensity: Intensity) -> u64 {
    spread(from as f64, to as f64, intensity).round() as u64
}

/// Named stimulation pattern
///
/// Synthesis is pure: the same capability and intensity always produce the
/// same waveform.
pub trait Stimulation: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn waveform(&self, capability: &ChannelCapability, intensity: Intensity) -> WaveForm;
}
