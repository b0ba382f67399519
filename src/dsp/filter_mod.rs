//! LFO-swept low/high-pass filter stage
//!
//! The cutoff follows `base + unipolar_lfo * depth`, clamped to
//! `[20 Hz, nyquist - 100 Hz]`. Coefficients are recomputed once per
//! 512-sample frame from the frame's mean cutoff; filter memory carries
//! across frame boundaries so a static cutoff produces the same output as a
//! single whole-clip pass.

use crate::dsp::biquad::{BiquadCoeffs, FilterKind, FilterState};
use crate::dsp::effect::{Effect, EffectParams};
use crate::dsp::lfo::{ModulationRate, SineLfo};
use crate::engine::AudioBuffer;
use crate::impl_effect_common;
use serde_json::{json, Value};

// ============================================================================
// Constants
// ============================================================================

/// Samples per coefficient update
pub const FILTER_FRAME_SIZE: usize = 512;

/// Lowest cutoff the sweep may reach (Hz)
pub const MIN_CUTOFF_HZ: f64 = 20.0;

/// Distance kept below Nyquist (Hz)
pub const NYQUIST_MARGIN_HZ: f64 = 100.0;

/// Cutoff used when the first frame cannot be designed
const SAFE_CUTOFF_HZ: f64 = 20.0;

// ============================================================================
// Filter Modulation Effect
// ============================================================================

/// Time-varying Butterworth filter synced to tempo
///
/// # Parameters
/// - `kind`: low-pass or high-pass
/// - `base_cutoff_hz`: cutoff with the LFO at its trough
/// - `depth_hz`: sweep range above the base; 0 gives a static filter
/// - `rate`: LFO note value
#[derive(Debug, Clone)]
pub struct FilterModulation {
    params: EffectParams,
    kind: FilterKind,
    base_cutoff_hz: f64,
    depth_hz: f64,
    rate: ModulationRate,
    bpm: f64,
}

impl FilterModulation {
    pub fn new(
        kind: FilterKind,
        base_cutoff_hz: f64,
        depth_hz: f64,
        rate: ModulationRate,
        bpm: f64,
    ) -> Self {
        Self {
            params: EffectParams::default(),
            kind,
            base_cutoff_hz,
            depth_hz: depth_hz.max(0.0),
            rate,
            bpm,
        }
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    /// Cutoff at one sample, clamped into the designable range
    fn cutoff_at(&self, lfo: &SineLfo, index: usize, upper: f64) -> f64 {
        let raw = self.base_cutoff_hz + lfo.unipolar(index) * self.depth_hz;
        raw.max(MIN_CUTOFF_HZ).min(upper)
    }

    /// Coefficients for every frame of a clip
    ///
    /// A frame whose design fails reuses the previous frame's coefficients.
    /// If the first frame fails, a 20 Hz section is tried, then a
    /// pass-through.
    pub fn frame_coefficients(&self, num_samples: usize, sample_rate: u32) -> Vec<BiquadCoeffs> {
        let sr = sample_rate as f64;
        let upper = (sr / 2.0 - NYQUIST_MARGIN_HZ).max(MIN_CUTOFF_HZ);
        let lfo = SineLfo::synced(self.rate, self.bpm, sample_rate);

        let mut plan: Vec<BiquadCoeffs> = Vec::with_capacity(num_samples / FILTER_FRAME_SIZE + 1);
        let mut start = 0;

        while start < num_samples {
            let end = (start + FILTER_FRAME_SIZE).min(num_samples);
            let mean_cutoff = (start..end)
                .map(|i| self.cutoff_at(&lfo, i, upper))
                .sum::<f64>()
                / (end - start) as f64;

            let coeffs = match BiquadCoeffs::butterworth(self.kind, mean_cutoff, sr) {
                Ok(coeffs) => coeffs,
                Err(e) => {
                    log::warn!("Filter frame at sample {}: {}", start, e);
                    match plan.last() {
                        Some(previous) => *previous,
                        None => BiquadCoeffs::butterworth(self.kind, SAFE_CUTOFF_HZ, sr)
                            .unwrap_or_else(|_| BiquadCoeffs::identity()),
                    }
                }
            };

            plan.push(coeffs);
            start = end;
        }

        plan
    }
}

impl Effect for FilterModulation {
    impl_effect_common!(FilterModulation, "filter_modulation", "Filter Modulation");

    fn process(&mut self, buffer: &mut AudioBuffer) {
        if !self.params.enabled || buffer.is_empty() {
            return;
        }

        buffer.ensure_stereo();
        let plan = self.frame_coefficients(buffer.len(), buffer.sample_rate);

        for channel in 0..buffer.channels() {
            let mut state = FilterState::default();
            let samples = buffer.channel_mut(channel);
            for (frame, coeffs) in samples.chunks_mut(FILTER_FRAME_SIZE).zip(plan.iter()) {
                state.process_block(frame, coeffs);
            }
        }
    }

    fn get_params(&self) -> Value {
        json!({
            "kind": self.kind,
            "base_cutoff_hz": self.base_cutoff_hz,
            "depth_hz": self.depth_hz,
            "rate": self.rate.to_string(),
            "bpm": self.bpm,
            "enabled": self.params.enabled
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::generate_test_tone;

    fn mixed_signal(sample_rate: u32) -> Vec<f32> {
        let low = generate_test_tone(200.0, 1.0, sample_rate);
        let high = generate_test_tone(6000.0, 1.0, sample_rate);
        low.channel(0)
            .iter()
            .zip(high.channel(0))
            .map(|(a, b)| 0.5 * a + 0.5 * b)
            .collect()
    }

    #[test]
    fn test_static_filter_matches_single_pass() {
        let sr = 44_100;
        let signal = mixed_signal(sr);
        let mut buffer = AudioBuffer::from_mono(signal.clone(), sr);

        let mut stage =
            FilterModulation::new(FilterKind::LowPass, 1000.0, 0.0, ModulationRate::Quarter, 120.0);
        stage.process(&mut buffer);

        let coeffs = BiquadCoeffs::butterworth(FilterKind::LowPass, 1000.0, sr as f64).unwrap();
        let mut reference = signal;
        FilterState::default().process_block(&mut reference, &coeffs);

        assert_eq!(buffer.channels(), 2);
        for (a, b) in buffer.channel(0).iter().zip(reference.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
        assert_eq!(buffer.channel(0), buffer.channel(1));
    }

    #[test]
    fn test_frame_plan_length() {
        let stage =
            FilterModulation::new(FilterKind::HighPass, 500.0, 2000.0, ModulationRate::Eighth, 120.0);
        assert_eq!(stage.frame_coefficients(1024, 44_100).len(), 2);
        assert_eq!(stage.frame_coefficients(1025, 44_100).len(), 3);
        assert!(stage.frame_coefficients(0, 44_100).is_empty());
    }

    #[test]
    fn test_sweep_changes_coefficients() {
        let stage =
            FilterModulation::new(FilterKind::LowPass, 500.0, 5000.0, ModulationRate::Quarter, 120.0);
        let plan = stage.frame_coefficients(44_100, 44_100);
        let first = plan[0];
        assert!(plan.iter().any(|c| (c.b0 - first.b0).abs() > 1e-6));
    }

    #[test]
    fn test_cutoff_above_nyquist_is_clamped() {
        // 8 kHz audio: Nyquist 4 kHz, so a 10 kHz base clamps to 3.9 kHz
        let stage =
            FilterModulation::new(FilterKind::LowPass, 10_000.0, 0.0, ModulationRate::Quarter, 120.0);
        let plan = stage.frame_coefficients(600, 8000);
        let expected = BiquadCoeffs::butterworth(FilterKind::LowPass, 3900.0, 8000.0).unwrap();
        assert_eq!(plan[0], expected);
    }

    #[test]
    fn test_low_pass_attenuates_highs() {
        let sr = 44_100;
        let mut buffer = AudioBuffer::from_mono(generate_test_tone(8000.0, 0.5, sr).samples.remove(0), sr);
        let mut stage =
            FilterModulation::new(FilterKind::LowPass, 300.0, 200.0, ModulationRate::Half, 120.0);
        stage.process(&mut buffer);

        let tail = &buffer.channel(0)[4410..];
        let peak = tail.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(peak < 0.05, "peak {}", peak);
    }

    #[test]
    fn test_disabled_is_noop() {
        let sr = 22_050;
        let original = AudioBuffer::from_mono(mixed_signal(sr), sr);
        let mut buffer = original.clone();
        let mut stage =
            FilterModulation::new(FilterKind::HighPass, 1000.0, 0.0, ModulationRate::Quarter, 120.0);
        stage.set_enabled(false);
        stage.process(&mut buffer);
        assert_eq!(buffer, original);
    }
}
