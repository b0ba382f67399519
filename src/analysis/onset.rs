//! Onset detection for one-shot slicing
//!
//! Spectral flux of the log-power spectrogram gives an onset strength
//! envelope. Peaks are picked with moving max/mean windows, a minimum
//! height above the local mean (`delta`) and a minimum gap (`wait`), then
//! optionally pulled back to the preceding local minimum of the envelope.

use crate::engine::stft::{Stft, DEFAULT_HOP, DEFAULT_N_FFT};

/// Power floor before taking logs
const POWER_FLOOR: f64 = 1e-10;

/// Dynamic range kept below the loudest spectrogram cell
const TOP_DB: f64 = 80.0;

/// Peak-picking parameters, all windows in frames
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnsetParams {
    /// Frames before `n` searched for a larger value
    pub pre_max: usize,
    /// Frames after `n` (exclusive) searched for a larger value
    pub post_max: usize,
    /// Frames before `n` in the local mean
    pub pre_avg: usize,
    /// Frames after `n` (exclusive) in the local mean
    pub post_avg: usize,
    /// Required height above the local mean (envelope normalized to [0, 1])
    pub delta: f64,
    /// Minimum frames between consecutive onsets
    pub wait: usize,
    /// Pull each onset back to the preceding envelope minimum
    pub backtrack: bool,
}

impl OnsetParams {
    /// Parameters for a one-shot sensitivity in [0, 1]
    ///
    /// Higher sensitivity lowers the peak threshold and the minimum gap:
    /// `delta = 0.5 * (1 - s)` and `wait = 0.1 * (1 - s)` seconds.
    pub fn from_sensitivity(sensitivity: f64, sample_rate: u32, hop: usize) -> Self {
        let s = sensitivity.clamp(0.0, 1.0);
        let frames = |secs: f64| (secs * sample_rate as f64 / hop as f64).floor() as usize;

        Self {
            pre_max: frames(0.03),
            post_max: frames(0.0) + 1,
            pre_avg: frames(0.10),
            post_avg: frames(0.10) + 1,
            delta: 0.5 * (1.0 - s),
            wait: frames(0.1 * (1.0 - s)),
            backtrack: true,
        }
    }
}

/// Onset strength envelope, one value per STFT frame
///
/// Frame `t` holds the mean positive change in log power from frame `t-1`;
/// frame 0 is always zero.
pub fn onset_strength(mono: &[f32], stft: &Stft) -> Vec<f64> {
    let spectrogram: Vec<Vec<f64>> = stft
        .magnitudes(mono)
        .into_iter()
        .map(|frame| {
            frame
                .into_iter()
                .map(|m| 10.0 * (m * m).max(POWER_FLOOR).log10())
                .collect()
        })
        .collect();

    let loudest = spectrogram
        .iter()
        .flat_map(|frame| frame.iter())
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);
    let floor = loudest - TOP_DB;

    let mut envelope = vec![0.0_f64; spectrogram.len()];
    for t in 1..spectrogram.len() {
        let (prev, cur) = (&spectrogram[t - 1], &spectrogram[t]);
        let flux: f64 = prev
            .iter()
            .zip(cur)
            .map(|(&p, &c)| (c.max(floor) - p.max(floor)).max(0.0))
            .sum();
        envelope[t] = flux / cur.len() as f64;
    }

    envelope
}

/// Pick peak frames from an onset envelope
///
/// Frame `n` is kept when it is the maximum of its max window, is at least
/// `delta` above the mean of its averaging window, is strictly positive,
/// and comes more than `wait` frames after the previous kept peak.
pub fn peak_pick(envelope: &[f64], params: &OnsetParams) -> Vec<usize> {
    let len = envelope.len();
    let mut peaks = Vec::new();
    let mut last: Option<usize> = None;

    for n in 0..len {
        let value = envelope[n];
        if value <= 0.0 {
            continue;
        }

        let max_window = &envelope[n.saturating_sub(params.pre_max)..(n + params.post_max).min(len)];
        if max_window.iter().any(|&v| v > value) {
            continue;
        }

        let avg_window = &envelope[n.saturating_sub(params.pre_avg)..(n + params.post_avg).min(len)];
        let mean = avg_window.iter().sum::<f64>() / avg_window.len() as f64;
        if value < mean + params.delta {
            continue;
        }

        if last.map_or(true, |prev| n > prev + params.wait) {
            peaks.push(n);
            last = Some(n);
        }
    }

    peaks
}

/// Move each onset back to the nearest envelope minimum at or before it
///
/// Frame 0 always counts as a minimum.
pub fn backtrack(onsets: &[usize], energy: &[f64]) -> Vec<usize> {
    let mut minima = vec![0_usize];
    for i in 1..energy.len().saturating_sub(1) {
        if energy[i] <= energy[i - 1] && energy[i] < energy[i + 1] {
            minima.push(i);
        }
    }

    onsets
        .iter()
        .map(|&onset| {
            let idx = minima.partition_point(|&m| m <= onset);
            minima[idx.saturating_sub(1)]
        })
        .collect()
}

/// Detect onsets in a mono signal
///
/// # Arguments
/// * `mono` - Mono samples
/// * `sample_rate` - Sample rate in Hz
/// * `sensitivity` - One-shot sensitivity in [0, 1]
///
/// # Returns
/// Ascending, de-duplicated onset positions in samples
pub fn detect_onsets(mono: &[f32], sample_rate: u32, sensitivity: f64) -> Vec<usize> {
    if mono.is_empty() {
        return Vec::new();
    }

    let stft = Stft::new(DEFAULT_N_FFT, DEFAULT_HOP);
    let mut envelope = onset_strength(mono, &stft);

    let min = envelope.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = envelope.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !(max - min).is_finite() || max - min <= f64::EPSILON {
        log::debug!("Flat onset envelope, no onsets");
        return Vec::new();
    }
    for value in envelope.iter_mut() {
        *value = (*value - min) / (max - min);
    }

    let params = OnsetParams::from_sensitivity(sensitivity, sample_rate, stft.hop());
    let mut frames = peak_pick(&envelope, &params);
    if params.backtrack {
        frames = backtrack(&frames, &envelope);
    }
    frames.dedup();

    log::debug!(
        "Detected {} onsets (delta {:.2}, wait {} frames)",
        frames.len(),
        params.delta,
        params.wait
    );

    frames
        .into_iter()
        .map(|frame| (frame * stft.hop()).min(mono.len()))
        .collect()
}
