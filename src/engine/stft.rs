//! Short-time Fourier transform
//!
//! Centered, Hann-windowed frames shared by chroma, onset and pitch
//! analysis and by the phase vocoder.

use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Default analysis window length in samples
pub const DEFAULT_N_FFT: usize = 2048;

/// Default hop between frames in samples
pub const DEFAULT_HOP: usize = 512;

/// Periodic Hann window of length `n`
pub fn hann_window(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / n as f64).cos()))
        .collect()
}

/// Forward STFT with a fixed window and hop
#[derive(Clone)]
pub struct Stft {
    n_fft: usize,
    hop: usize,
    window: Vec<f64>,
    fft: Arc<dyn Fft<f64>>,
}

impl std::fmt::Debug for Stft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stft")
            .field("n_fft", &self.n_fft)
            .field("hop", &self.hop)
            .finish()
    }
}

impl Default for Stft {
    fn default() -> Self {
        Self::new(DEFAULT_N_FFT, DEFAULT_HOP)
    }
}

impl Stft {
    /// Plan a transform for `n_fft`-sample frames spaced `hop` samples apart
    pub fn new(n_fft: usize, hop: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n_fft);
        Self {
            n_fft,
            hop: hop.max(1),
            window: hann_window(n_fft),
            fft,
        }
    }

    /// Window length in samples
    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    /// Hop length in samples
    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Analysis window
    pub fn window(&self) -> &[f64] {
        &self.window
    }

    /// Number of positive-frequency bins per frame
    pub fn num_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Center frequency of bin `k` in Hz
    pub fn bin_frequency(&self, k: usize, sample_rate: u32) -> f64 {
        k as f64 * sample_rate as f64 / self.n_fft as f64
    }

    /// Number of frames produced for a signal of `len` samples
    ///
    /// Frames are centered, so frame `t` covers samples around `t * hop`.
    pub fn num_frames(&self, len: usize) -> usize {
        1 + len / self.hop
    }

    /// Complex spectra for every frame (`frames x num_bins`)
    pub fn complex_frames(&self, signal: &[f32]) -> Vec<Vec<Complex<f64>>> {
        let pad = self.n_fft / 2;
        let mut padded = vec![0.0_f64; signal.len() + 2 * pad];
        for (dst, &src) in padded[pad..].iter_mut().zip(signal) {
            *dst = src as f64;
        }

        let num_bins = self.num_bins();
        let mut scratch = vec![Complex::new(0.0, 0.0); self.fft.get_inplace_scratch_len()];

        (0..self.num_frames(signal.len()))
            .map(|t| {
                let start = t * self.hop;
                let mut frame: Vec<Complex<f64>> = padded[start..start + self.n_fft]
                    .iter()
                    .zip(&self.window)
                    .map(|(&s, &w)| Complex::new(s * w, 0.0))
                    .collect();
                self.fft.process_with_scratch(&mut frame, &mut scratch);
                frame.truncate(num_bins);
                frame
            })
            .collect()
    }

    /// Magnitude spectra for every frame (`frames x num_bins`)
    pub fn magnitudes(&self, signal: &[f32]) -> Vec<Vec<f64>> {
        self.complex_frames(signal)
            .into_iter()
            .map(|frame| frame.iter().map(|c| c.norm()).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::generate_test_tone;

    #[test]
    fn test_frame_count_is_centered() {
        let stft = Stft::new(2048, 512);
        assert_eq!(stft.num_frames(0), 1);
        assert_eq!(stft.num_frames(22_050), 44);
        assert_eq!(stft.magnitudes(&vec![0.0; 22_050]).len(), 44);
    }

    #[test]
    fn test_sine_peaks_at_expected_bin() {
        let sr = 22_050;
        let stft = Stft::default();
        let tone = generate_test_tone(1000.0, 0.5, sr);
        let mags = stft.magnitudes(tone.channel(0));

        let frame = &mags[mags.len() / 2];
        let (peak_bin, _) = frame
            .iter()
            .enumerate()
            .fold((0, 0.0), |best, (i, &m)| if m > best.1 { (i, m) } else { best });

        let peak_hz = stft.bin_frequency(peak_bin, sr);
        assert!((peak_hz - 1000.0).abs() < 11.0, "peak at {} Hz", peak_hz);
    }

    #[test]
    fn test_hann_window_endpoints() {
        let w = hann_window(8);
        assert_eq!(w[0], 0.0);
        assert!((w[4] - 1.0).abs() < 1e-12);
    }
}
