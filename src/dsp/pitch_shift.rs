//! Duration-preserving pitch transposition
//!
//! The default transposer time-stretches by `2^(-n/12)` with a phase
//! vocoder, then sinc-resamples the stretched signal back to the input
//! length.
//! Alternative back-ends plug in through the [`Transposer`] trait.

use std::f64::consts::PI;
use std::sync::Arc;

use rubato::{
    calculate_cutoff, Resampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde_json::{json, Value};

use crate::dsp::effect::{Effect, EffectParams};
use crate::engine::stft::{Stft, DEFAULT_HOP, DEFAULT_N_FFT};
use crate::engine::AudioBuffer;
use crate::error::{LoopError, Result};
use crate::impl_effect_common;

/// Largest accepted shift in either direction
pub const MAX_TRANSPOSE_SEMITONES: i32 = 12;

/// Window-sum floor for the overlap-add normalization
const WINDOW_SUM_FLOOR: f64 = 1e-10;

/// Taps of the resampling filter
const SINC_LEN: usize = 256;

// ============================================================================
// Transposer Trait
// ============================================================================

/// Shift pitch by whole semitones without changing duration
pub trait Transposer: Send + Sync {
    /// Return a transposed copy with the same length, channel count and rate
    ///
    /// # Errors
    /// `InvalidParameter` for shifts beyond ±12 semitones, `ProcessingError`
    /// if the back-end fails.
    fn transpose(&self, buffer: &AudioBuffer, semitones: i32) -> Result<AudioBuffer>;

    /// Back-end name for logs and reports
    fn name(&self) -> &str;
}

// ============================================================================
// Phase Vocoder
// ============================================================================

/// STFT phase-vocoder transposer
#[derive(Clone)]
pub struct PhaseVocoderTransposer {
    stft: Stft,
    inverse: Arc<dyn Fft<f64>>,
}

impl std::fmt::Debug for PhaseVocoderTransposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseVocoderTransposer")
            .field("stft", &self.stft)
            .finish()
    }
}

impl Default for PhaseVocoderTransposer {
    fn default() -> Self {
        Self::new(DEFAULT_N_FFT, DEFAULT_HOP)
    }
}

impl PhaseVocoderTransposer {
    pub fn new(n_fft: usize, hop: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            stft: Stft::new(n_fft, hop),
            inverse: planner.plan_fft_inverse(n_fft),
        }
    }

    /// Change duration by `1 / rate` while keeping pitch
    ///
    /// `rate < 1` lengthens the signal. Output length is `round(len / rate)`.
    pub fn time_stretch(&self, signal: &[f32], rate: f64) -> Vec<f32> {
        let target_len = (signal.len() as f64 / rate).round() as usize;
        if signal.is_empty() || target_len == 0 {
            return vec![0.0; target_len];
        }

        let n_fft = self.stft.n_fft();
        let hop = self.stft.hop();
        let num_bins = self.stft.num_bins();
        let frames = self.stft.complex_frames(signal);
        let silent = vec![Complex::new(0.0, 0.0); num_bins];

        let phase_advance: Vec<f64> = (0..num_bins)
            .map(|k| 2.0 * PI * hop as f64 * k as f64 / n_fft as f64)
            .collect();
        let mut phase: Vec<f64> = frames[0].iter().map(|c| c.arg()).collect();

        let mut stretched = Vec::new();
        let mut step = 0.0_f64;
        while (step as usize) < frames.len() {
            let index = step as usize;
            let alpha = step - index as f64;
            let left = &frames[index];
            let right = frames.get(index + 1).unwrap_or(&silent);

            let frame: Vec<Complex<f64>> = (0..num_bins)
                .map(|k| {
                    let magnitude = (1.0 - alpha) * left[k].norm() + alpha * right[k].norm();
                    Complex::from_polar(magnitude, phase[k])
                })
                .collect();
            stretched.push(frame);

            for k in 0..num_bins {
                let mut delta = right[k].arg() - left[k].arg() - phase_advance[k];
                delta -= 2.0 * PI * (delta / (2.0 * PI)).round();
                phase[k] += phase_advance[k] + delta;
            }

            step += rate;
        }

        self.overlap_add(&stretched, target_len)
    }

    /// Inverse STFT with squared-window normalization, trimmed to `len`
    fn overlap_add(&self, frames: &[Vec<Complex<f64>>], len: usize) -> Vec<f32> {
        let n_fft = self.stft.n_fft();
        let hop = self.stft.hop();
        let window = self.stft.window();
        let total = n_fft + hop * frames.len().saturating_sub(1);

        let mut output = vec![0.0_f64; total];
        let mut window_sum = vec![0.0_f64; total];
        let mut scratch = vec![Complex::new(0.0, 0.0); self.inverse.get_inplace_scratch_len()];
        let mut spectrum = vec![Complex::new(0.0, 0.0); n_fft];

        for (t, frame) in frames.iter().enumerate() {
            for (k, bin) in spectrum.iter_mut().enumerate() {
                *bin = if k < frame.len() {
                    frame[k]
                } else {
                    frame[n_fft - k].conj()
                };
            }
            self.inverse.process_with_scratch(&mut spectrum, &mut scratch);

            let offset = t * hop;
            for (j, (bin, &w)) in spectrum.iter().zip(window).enumerate() {
                output[offset + j] += w * bin.re / n_fft as f64;
                window_sum[offset + j] += w * w;
            }
        }

        let pad = n_fft / 2;
        (0..len)
            .map(|i| {
                let idx = pad + i;
                match (output.get(idx), window_sum.get(idx)) {
                    (Some(&y), Some(&ws)) if ws > WINDOW_SUM_FLOOR => (y / ws) as f32,
                    (Some(&y), Some(_)) => y as f32,
                    _ => 0.0,
                }
            })
            .collect()
    }
}

impl Transposer for PhaseVocoderTransposer {
    fn transpose(&self, buffer: &AudioBuffer, semitones: i32) -> Result<AudioBuffer> {
        if semitones.abs() > MAX_TRANSPOSE_SEMITONES {
            return Err(LoopError::invalid_param(
                "transpose_semitones",
                semitones,
                "-12 to 12",
            ));
        }
        if semitones == 0 || buffer.is_empty() {
            return Ok(buffer.clone());
        }

        let rate = 2.0_f64.powf(-(semitones as f64) / 12.0);
        let len = buffer.len();

        let samples = buffer
            .samples
            .iter()
            .map(|channel| {
                let stretched = self.time_stretch(channel, rate);
                let mut shifted = resample_sinc(&stretched, rate)?;
                shifted.resize(len, 0.0);
                Ok(shifted)
            })
            .collect::<Result<Vec<_>>>()?;

        let shifted = AudioBuffer {
            samples,
            sample_rate: buffer.sample_rate,
        };
        if !shifted.is_finite() {
            return Err(LoopError::ProcessingError {
                reason: format!("transpose by {} produced non-finite samples", semitones),
            });
        }
        Ok(shifted)
    }

    fn name(&self) -> &str {
        "phase_vocoder"
    }
}

/// Band-limited resampling by `ratio` (output/input length)
///
/// Output length is `round(len * ratio)`. The signal is padded by one
/// filter length so the sinc delay can be trimmed off the front.
///
/// # Errors
/// `ProcessingError` if the resampler rejects the ratio or the input.
pub fn resample_sinc(samples: &[f32], ratio: f64) -> Result<Vec<f32>> {
    if samples.is_empty() || !ratio.is_finite() || ratio <= 0.0 {
        return Ok(Vec::new());
    }
    let target_len = ((samples.len() as f64) * ratio).round() as usize;

    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: calculate_cutoff(SINC_LEN, window),
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window,
    };

    let padded_len = samples.len() + SINC_LEN;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, padded_len, 1).map_err(|e| {
        LoopError::ProcessingError {
            reason: format!("resampler setup failed: {}", e),
        }
    })?;
    let delay = resampler.output_delay();

    let mut input = samples.to_vec();
    input.resize(padded_len, 0.0);
    let output = resampler
        .process(&[input], None)
        .map_err(|e| LoopError::ProcessingError {
            reason: format!("resampling failed: {}", e),
        })?;

    let mut resampled: Vec<f32> = output
        .into_iter()
        .next()
        .unwrap_or_default()
        .into_iter()
        .skip(delay)
        .take(target_len)
        .collect();
    resampled.resize(target_len, 0.0);
    Ok(resampled)
}

// ============================================================================
// Transpose Stage
// ============================================================================

/// Chain stage wrapping a [`Transposer`]
///
/// A failed transpose leaves the clip untouched and logs a warning.
#[derive(Clone)]
pub struct Transpose {
    params: EffectParams,
    semitones: i32,
    transposer: Arc<dyn Transposer>,
}

impl std::fmt::Debug for Transpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transpose")
            .field("semitones", &self.semitones)
            .field("transposer", &self.transposer.name())
            .finish()
    }
}

impl Transpose {
    pub fn new(semitones: i32, transposer: Arc<dyn Transposer>) -> Self {
        Self {
            params: EffectParams::default(),
            semitones,
            transposer,
        }
    }

    pub fn semitones(&self) -> i32 {
        self.semitones
    }
}

impl Effect for Transpose {
    impl_effect_common!(Transpose, "transpose", "Transpose");

    fn process(&mut self, buffer: &mut AudioBuffer) {
        if !self.params.enabled || self.semitones == 0 {
            return;
        }
        match self.transposer.transpose(buffer, self.semitones) {
            Ok(shifted) => *buffer = shifted,
            Err(e) => log::warn!("Transpose by {} skipped: {}", self.semitones, e),
        }
    }

    fn get_params(&self) -> Value {
        json!({
            "semitones": self.semitones,
            "transposer": self.transposer.name(),
            "enabled": self.params.enabled
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::pitch::dominant_pitches;
    use crate::engine::io::{generate_stereo_test_tone, generate_test_tone};

    fn rms(signal: &[f32]) -> f64 {
        let sum: f64 = signal.iter().map(|&x| (x as f64) * (x as f64)).sum();
        (sum / signal.len() as f64).sqrt()
    }

    fn median_pitch(signal: &[f32], sample_rate: u32) -> f64 {
        let stft = Stft::default();
        let mut pitches: Vec<f64> = dominant_pitches(signal, sample_rate, &stft)
            .into_iter()
            .filter(|&p| p > 0.0)
            .collect();
        pitches.sort_by(|a, b| a.partial_cmp(b).unwrap());
        pitches[pitches.len() / 2]
    }

    #[test]
    fn test_zero_shift_is_clone() {
        let tone = generate_test_tone(440.0, 0.2, 22_050);
        let shifted = PhaseVocoderTransposer::default().transpose(&tone, 0).unwrap();
        assert_eq!(shifted, tone);
    }

    #[test]
    fn test_octave_up_doubles_pitch() {
        let sr = 22_050;
        let tone = generate_test_tone(220.0, 1.0, sr);
        let shifted = PhaseVocoderTransposer::default().transpose(&tone, 12).unwrap();

        assert_eq!(shifted.len(), tone.len());
        let pitch = median_pitch(shifted.channel(0), sr);
        assert!((pitch - 440.0).abs() < 440.0 * 0.03, "pitch {}", pitch);
    }

    #[test]
    fn test_octave_down_halves_pitch() {
        let sr = 22_050;
        let tone = generate_test_tone(880.0, 1.0, sr);
        let shifted = PhaseVocoderTransposer::default().transpose(&tone, -12).unwrap();

        assert_eq!(shifted.len(), tone.len());
        let pitch = median_pitch(shifted.channel(0), sr);
        assert!((pitch - 440.0).abs() < 440.0 * 0.03, "pitch {}", pitch);
    }

    #[test]
    fn test_stereo_shape_preserved() {
        let tone = generate_stereo_test_tone(330.0, 330.0, 0.3, 22_050);
        let shifted = PhaseVocoderTransposer::default().transpose(&tone, 3).unwrap();
        assert_eq!(shifted.channels(), 2);
        assert_eq!(shifted.len(), tone.len());
        assert_eq!(shifted.sample_rate, 22_050);
    }

    #[test]
    fn test_out_of_range_shift_rejected() {
        let tone = generate_test_tone(440.0, 0.1, 22_050);
        assert!(PhaseVocoderTransposer::default().transpose(&tone, 13).is_err());
        assert!(PhaseVocoderTransposer::default().transpose(&tone, -13).is_err());
    }

    #[test]
    fn test_time_stretch_length() {
        let vocoder = PhaseVocoderTransposer::default();
        let signal = vec![0.1_f32; 10_000];
        assert_eq!(vocoder.time_stretch(&signal, 0.5).len(), 20_000);
        assert_eq!(vocoder.time_stretch(&signal, 2.0).len(), 5_000);
    }

    #[test]
    fn test_resample_sinc_lengths() {
        let samples = vec![0.25_f32; 1000];
        assert_eq!(resample_sinc(&samples, 2.0).unwrap().len(), 2000);
        assert_eq!(resample_sinc(&samples, 0.5).unwrap().len(), 500);
        assert!(resample_sinc(&[], 2.0).unwrap().is_empty());
    }

    #[test]
    fn test_resample_sinc_keeps_level_in_band() {
        // 100 Hz at 8 kHz, doubled to 16 kHz
        let tone = generate_test_tone(100.0, 1.0, 8_000);
        let up = resample_sinc(tone.channel(0), 2.0).unwrap();

        let source_rms = rms(&tone.channel(0)[1000..7000]);
        let resampled_rms = rms(&up[2000..14_000]);
        assert!(
            (resampled_rms - source_rms).abs() < source_rms * 0.02,
            "{} vs {}",
            resampled_rms,
            source_rms
        );
    }

    #[test]
    fn test_stage_leaves_clip_on_failure() {
        let tone = generate_test_tone(440.0, 0.1, 22_050);
        let mut buffer = tone.clone();
        let mut stage = Transpose::new(20, Arc::new(PhaseVocoderTransposer::default()));
        stage.process(&mut buffer);
        assert_eq!(buffer, tone);
    }
}
