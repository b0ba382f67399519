//! Fragment edge shaping
//!
//! Loops get a symmetric linear crossfade at both ends so they repeat
//! without clicks. One-shots get a short attack-to-sustain gain envelope and
//! a fixed 5 ms fade-out.

use crate::dsp::effect::{Effect, EffectParams};
use crate::engine::buffer::db_to_linear;
use crate::engine::AudioBuffer;
use crate::impl_effect_common;
use serde_json::{json, Value};

// ============================================================================
// Constants
// ============================================================================

/// Length of the attack-to-sustain ramp (seconds)
pub const ENVELOPE_RAMP_SECS: f64 = 0.010;

/// Fade-out appended to every one-shot (milliseconds)
pub const ONE_SHOT_FADE_OUT_MS: f64 = 5.0;

// ============================================================================
// Helper Functions
// ============================================================================

/// Milliseconds to whole samples, truncating
#[inline]
pub fn ms_to_samples(ms: f64, sample_rate: u32) -> usize {
    if !ms.is_finite() || ms <= 0.0 {
        return 0;
    }
    (ms / 1000.0 * sample_rate as f64) as usize
}

/// Value `i` of an `n`-point linear ramp from `from` to `to`, endpoints included
#[inline]
fn ramp(from: f64, to: f64, i: usize, n: usize) -> f64 {
    if n <= 1 {
        return from;
    }
    from + (to - from) * i as f64 / (n - 1) as f64
}

/// Linear fade-in and fade-out over `min(fade_samples, len / 2)` samples
///
/// A zero-length fade leaves the buffer bit-identical.
pub fn apply_crossfade(buffer: &mut AudioBuffer, fade_samples: usize) {
    let n = fade_samples.min(buffer.len() / 2);
    if n == 0 {
        return;
    }

    let len = buffer.len();
    for channel in &mut buffer.samples {
        for i in 0..n {
            channel[i] *= ramp(0.0, 1.0, i, n) as f32;
            channel[len - n + i] *= ramp(1.0, 0.0, i, n) as f32;
        }
    }
}

/// Linear fade-out over the last `min(fade_samples, len)` samples
pub fn apply_fade_out(buffer: &mut AudioBuffer, fade_samples: usize) {
    let n = fade_samples.min(buffer.len());
    if n == 0 {
        return;
    }

    let len = buffer.len();
    for channel in &mut buffer.samples {
        for i in 0..n {
            channel[len - n + i] *= ramp(1.0, 0.0, i, n) as f32;
        }
    }
}

/// Ramp from the attack gain to the sustain gain, then hold the sustain gain
///
/// The ramp lasts 10 ms, shortened to half the clip for very short clips.
pub fn apply_envelope(buffer: &mut AudioBuffer, attack_db: f64, sustain_db: f64) {
    let len = buffer.len();
    if len == 0 {
        return;
    }

    let attack = db_to_linear(attack_db);
    let sustain = db_to_linear(sustain_db);
    let ramp_len = ((ENVELOPE_RAMP_SECS * buffer.sample_rate as f64) as usize).min(len / 2);

    for channel in &mut buffer.samples {
        for (i, sample) in channel.iter_mut().enumerate() {
            let gain = if i < ramp_len {
                ramp(attack, sustain, i, ramp_len)
            } else {
                sustain
            };
            *sample = (*sample as f64 * gain) as f32;
        }
    }
}

// ============================================================================
// Crossfade Stage
// ============================================================================

/// Loop-edge crossfade
#[derive(Debug, Clone)]
pub struct Crossfade {
    params: EffectParams,
    fade_ms: f64,
}

impl Crossfade {
    pub fn new(fade_ms: f64) -> Self {
        Self {
            params: EffectParams::default(),
            fade_ms: fade_ms.max(0.0),
        }
    }

    pub fn fade_ms(&self) -> f64 {
        self.fade_ms
    }
}

impl Effect for Crossfade {
    impl_effect_common!(Crossfade, "crossfade", "Loop Crossfade");

    fn process(&mut self, buffer: &mut AudioBuffer) {
        if !self.params.enabled {
            return;
        }
        let fade_samples = ms_to_samples(self.fade_ms, buffer.sample_rate);
        apply_crossfade(buffer, fade_samples);
    }

    fn get_params(&self) -> Value {
        json!({
            "fade_ms": self.fade_ms,
            "enabled": self.params.enabled
        })
    }
}

// ============================================================================
// One-Shot Envelope Stage
// ============================================================================

/// Attack/sustain envelope followed by the fixed one-shot fade-out
#[derive(Debug, Clone)]
pub struct OneShotEnvelope {
    params: EffectParams,
    attack_db: f64,
    sustain_db: f64,
}

impl OneShotEnvelope {
    pub fn new(attack_db: f64, sustain_db: f64) -> Self {
        Self {
            params: EffectParams::default(),
            attack_db,
            sustain_db,
        }
    }
}

impl Effect for OneShotEnvelope {
    impl_effect_common!(OneShotEnvelope, "one_shot_envelope", "One-Shot Envelope");

    fn process(&mut self, buffer: &mut AudioBuffer) {
        if !self.params.enabled {
            return;
        }
        apply_envelope(buffer, self.attack_db, self.sustain_db);
        apply_fade_out(buffer, ms_to_samples(ONE_SHOT_FADE_OUT_MS, buffer.sample_rate));
    }

    fn get_params(&self) -> Value {
        json!({
            "attack_db": self.attack_db,
            "sustain_db": self.sustain_db,
            "fade_out_ms": ONE_SHOT_FADE_OUT_MS,
            "enabled": self.params.enabled
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ones(len: usize, sample_rate: u32) -> AudioBuffer {
        AudioBuffer::from_channels(vec![vec![1.0; len], vec![1.0; len]], sample_rate).unwrap()
    }

    #[test]
    fn test_zero_crossfade_is_bit_identical() {
        let original = AudioBuffer::from_mono(vec![0.3, -0.7, 0.123_456_7, 0.9], 44_100);
        let mut buffer = original.clone();
        apply_crossfade(&mut buffer, 0);
        assert_eq!(buffer, original);

        let mut staged = original.clone();
        Crossfade::new(0.0).process(&mut staged);
        assert_eq!(staged, original);
    }

    #[test]
    fn test_crossfade_ramps_both_ends() {
        let mut buffer = ones(100, 1000);
        apply_crossfade(&mut buffer, 11);
        let ch = buffer.channel(0);
        assert_eq!(ch[0], 0.0);
        assert_relative_eq!(ch[5], 0.5);
        assert_eq!(ch[10], 1.0);
        assert_eq!(ch[50], 1.0);
        assert_eq!(ch[89], 1.0);
        assert_relative_eq!(ch[94], 0.5);
        assert_eq!(ch[99], 0.0);
        assert_eq!(buffer.channel(0), buffer.channel(1));
    }

    #[test]
    fn test_crossfade_limited_to_half_length() {
        let mut buffer = ones(10, 1000);
        apply_crossfade(&mut buffer, 1000);
        let ch = buffer.channel(0);
        assert_eq!(ch[0], 0.0);
        assert_eq!(ch[4], 1.0);
        assert_eq!(ch[5], 1.0);
        assert_eq!(ch[9], 0.0);
    }

    #[test]
    fn test_crossfade_stage_converts_ms() {
        // 10 ms at 1 kHz is 10 samples
        let mut buffer = ones(100, 1000);
        Crossfade::new(10.0).process(&mut buffer);
        assert_eq!(buffer.channel(0)[0], 0.0);
        assert_eq!(buffer.channel(0)[9], 1.0);
        assert_eq!(buffer.channel(0)[99], 0.0);
    }

    #[test]
    fn test_envelope_on_empty_buffer() {
        let mut buffer = AudioBuffer::from_mono(Vec::new(), 44_100);
        apply_envelope(&mut buffer, -12.0, 0.0);
        OneShotEnvelope::new(-6.0, -3.0).process(&mut buffer);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_envelope_ramps_then_holds() {
        // 10 ms at 1 kHz: 10-sample ramp from -20 dB (0.1) to 0 dB (1.0)
        let mut buffer = ones(100, 1000);
        apply_envelope(&mut buffer, -20.0, 0.0);
        let ch = buffer.channel(0);
        assert_relative_eq!(ch[0], 0.1, epsilon = 1e-6);
        assert_relative_eq!(ch[9], 1.0, epsilon = 1e-6);
        assert_relative_eq!(ch[50], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_envelope_sustain_gain_held() {
        let mut buffer = ones(100, 1000);
        apply_envelope(&mut buffer, 0.0, -6.0);
        assert_relative_eq!(buffer.channel(0)[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(buffer.channel(1)[80], 0.501_187, epsilon = 1e-5);
    }

    #[test]
    fn test_one_shot_stage_fades_out() {
        // 5 ms at 1 kHz is 5 samples
        let mut buffer = ones(100, 1000);
        OneShotEnvelope::new(0.0, 0.0).process(&mut buffer);
        let ch = buffer.channel(0);
        assert_relative_eq!(ch[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(ch[94], 1.0, epsilon = 1e-6);
        assert_relative_eq!(ch[95], 1.0, epsilon = 1e-6);
        assert_relative_eq!(ch[97], 0.5, epsilon = 1e-6);
        assert_eq!(ch[99], 0.0);
    }

    #[test]
    fn test_ms_to_samples() {
        assert_eq!(ms_to_samples(10.0, 44_100), 441);
        assert_eq!(ms_to_samples(5.0, 48_000), 240);
        assert_eq!(ms_to_samples(0.0, 48_000), 0);
        assert_eq!(ms_to_samples(-3.0, 48_000), 0);
    }
}
