//! Peak normalization stage

use crate::dsp::effect::{Effect, EffectParams};
use crate::engine::buffer::{db_to_linear, peak_amplitude};
use crate::engine::AudioBuffer;
use crate::impl_effect_common;
use serde_json::{json, Value};

/// Peaks below this are treated as silence and left alone
const SILENCE_PEAK: f32 = 1e-9;

/// Scale a clip so its absolute peak lands on a target level
///
/// Targets at or above 0 dBFS disable the stage. The result is hard-clipped
/// to `[-1, 1]`.
#[derive(Debug, Clone)]
pub struct PeakNormalizer {
    params: EffectParams,
    target_dbfs: f64,
}

impl PeakNormalizer {
    pub fn new(target_dbfs: f64) -> Self {
        Self {
            params: EffectParams::default(),
            target_dbfs,
        }
    }

    pub fn target_dbfs(&self) -> f64 {
        self.target_dbfs
    }

    pub fn is_active(&self) -> bool {
        self.target_dbfs < 0.0
    }
}

impl Effect for PeakNormalizer {
    impl_effect_common!(PeakNormalizer, "peak_normalize", "Peak Normalize");

    fn process(&mut self, buffer: &mut AudioBuffer) {
        if !self.params.enabled || !self.is_active() {
            return;
        }

        let peak = peak_amplitude(buffer);
        if peak < SILENCE_PEAK {
            return;
        }

        let gain = db_to_linear(self.target_dbfs) / peak as f64;
        buffer.apply_linear_gain(gain as f32);
        buffer.clamp();
    }

    fn get_params(&self) -> Value {
        json!({
            "target_dbfs": self.target_dbfs,
            "enabled": self.params.enabled
        })
    }
}
