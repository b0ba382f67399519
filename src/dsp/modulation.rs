//! Auto-pan and tremolo stage
//!
//! Both share one tempo-synced sine LFO. Pan scales left by `(1 - p) / 2`
//! and right by `(1 + p) / 2` where `p = lfo * pan_depth`. Tremolo scales
//! both channels by `(1 - d) + d * (lfo + 1) / 2`.

use crate::dsp::effect::{Effect, EffectParams};
use crate::dsp::lfo::{ModulationRate, SineLfo};
use crate::engine::AudioBuffer;
use crate::impl_effect_common;
use serde_json::{json, Value};

/// Tempo-synced pan and level modulation
///
/// Depths are fractions in `[0, 1]`; construct from percentages with
/// [`PanLevelModulation::from_percent`].
#[derive(Debug, Clone)]
pub struct PanLevelModulation {
    params: EffectParams,
    pan_depth: f64,
    level_depth: f64,
    rate: ModulationRate,
    bpm: f64,
}

impl PanLevelModulation {
    pub fn new(pan_depth: f64, level_depth: f64, rate: ModulationRate, bpm: f64) -> Self {
        Self {
            params: EffectParams::default(),
            pan_depth: pan_depth.clamp(0.0, 1.0),
            level_depth: level_depth.clamp(0.0, 1.0),
            rate,
            bpm,
        }
    }

    /// Build from depths given in percent (0..=100)
    pub fn from_percent(pan_pct: f64, level_pct: f64, rate: ModulationRate, bpm: f64) -> Self {
        Self::new(pan_pct / 100.0, level_pct / 100.0, rate, bpm)
    }

    /// True when either depth would change the signal
    pub fn is_active(&self) -> bool {
        self.pan_depth > 0.0 || self.level_depth > 0.0
    }
}

impl Effect for PanLevelModulation {
    impl_effect_common!(PanLevelModulation, "pan_level_modulation", "Pan / Level Modulation");

    fn process(&mut self, buffer: &mut AudioBuffer) {
        if !self.params.enabled || !self.is_active() || buffer.is_empty() {
            return;
        }

        buffer.ensure_stereo();
        let lfo = SineLfo::synced(self.rate, self.bpm, buffer.sample_rate);
        let (pan_depth, level_depth) = (self.pan_depth, self.level_depth);

        let (left, rest) = buffer.samples.split_at_mut(1);
        let (left, right) = (&mut left[0], &mut rest[0]);

        for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
            let sine = lfo.bipolar(i);

            if pan_depth > 0.0 {
                let pan = sine * pan_depth;
                *l = (*l as f64 * (1.0 - pan) * 0.5) as f32;
                *r = (*r as f64 * (1.0 + pan) * 0.5) as f32;
            }

            if level_depth > 0.0 {
                let gain = (1.0 - level_depth) + level_depth * (sine + 1.0) * 0.5;
                *l = (*l as f64 * gain) as f32;
                *r = (*r as f64 * gain) as f32;
            }
        }
    }

    fn get_params(&self) -> Value {
        json!({
            "pan_depth": self.pan_depth,
            "level_depth": self.level_depth,
            "rate": self.rate.to_string(),
            "bpm": self.bpm,
            "enabled": self.params.enabled
        })
    }
}
