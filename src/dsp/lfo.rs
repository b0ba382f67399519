//! Tempo-synced sine LFOs
//!
//! The rate selector names a note value relative to the beat: `1/4` runs one
//! cycle per beat, `1/8` two, `1/16` four and `1/2` one cycle every two
//! beats.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LoopError;

/// LFO rate as a note value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModulationRate {
    #[serde(rename = "1/2")]
    Half,
    #[default]
    #[serde(rename = "1/4")]
    Quarter,
    #[serde(rename = "1/8")]
    Eighth,
    #[serde(rename = "1/16")]
    Sixteenth,
}

impl ModulationRate {
    /// Cycles per beat
    pub fn beat_multiplier(self) -> f64 {
        match self {
            ModulationRate::Half => 0.5,
            ModulationRate::Quarter => 1.0,
            ModulationRate::Eighth => 2.0,
            ModulationRate::Sixteenth => 4.0,
        }
    }

    /// LFO frequency in Hz at a tempo
    pub fn frequency_hz(self, bpm: f64) -> f64 {
        bpm / 60.0 * self.beat_multiplier()
    }

    fn label(self) -> &'static str {
        match self {
            ModulationRate::Half => "1/2",
            ModulationRate::Quarter => "1/4",
            ModulationRate::Eighth => "1/8",
            ModulationRate::Sixteenth => "1/16",
        }
    }
}

impl fmt::Display for ModulationRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ModulationRate {
    type Err = LoopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1/2" => Ok(ModulationRate::Half),
            "1/4" => Ok(ModulationRate::Quarter),
            "1/8" => Ok(ModulationRate::Eighth),
            "1/16" => Ok(ModulationRate::Sixteenth),
            other => Err(LoopError::invalid_param(
                "modulation_rate",
                other,
                "one of 1/2, 1/4, 1/8, 1/16",
            )),
        }
    }
}

/// Sine oscillator starting at phase zero on the clip's first sample
#[derive(Debug, Clone, Copy)]
pub struct SineLfo {
    angular_step: f64,
}

impl SineLfo {
    pub fn new(frequency_hz: f64, sample_rate: u32) -> Self {
        Self {
            angular_step: 2.0 * PI * frequency_hz / sample_rate as f64,
        }
    }

    /// Tempo-synced oscillator
    pub fn synced(rate: ModulationRate, bpm: f64, sample_rate: u32) -> Self {
        Self::new(rate.frequency_hz(bpm), sample_rate)
    }

    /// Bipolar value in [-1, 1] at sample `index`
    #[inline]
    pub fn bipolar(&self, index: usize) -> f64 {
        (self.angular_step * index as f64).sin()
    }

    /// Unipolar value in [0, 1] at sample `index`
    #[inline]
    pub fn unipolar(&self, index: usize) -> f64 {
        (self.bipolar(index) + 1.0) * 0.5
    }
}
