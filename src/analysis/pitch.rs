//! Per-frame pitch tracking and melody extraction
//!
//! Each STFT frame is searched for spectral peaks between 150 Hz and
//! 4 kHz that rise above a tenth of the frame's strongest bin. Peaks are
//! refined by parabolic interpolation and the strongest one is the frame's
//! dominant pitch. Consecutive frames on the same MIDI note merge into one
//! note event.

use crate::engine::stft::{Stft, DEFAULT_HOP, DEFAULT_N_FFT};
use crate::midi::NoteEvent;

// ============================================================================
// Constants
// ============================================================================

/// Lowest frequency searched for pitch peaks (Hz)
pub const PITCH_FMIN_HZ: f64 = 150.0;

/// Upper bound (exclusive) of the pitch search (Hz)
pub const PITCH_FMAX_HZ: f64 = 4000.0;

/// Peaks below this fraction of the frame maximum are ignored
pub const PITCH_THRESHOLD: f64 = 0.1;

/// Frequencies below this map to "no pitch"
pub const MIN_PITCHED_HZ: f64 = 32.0;

/// Merged runs shorter than this many frames are dropped
pub const MIN_NOTE_FRAMES: usize = 2;

// ============================================================================
// Conversion
// ============================================================================

/// Convert a frequency to the nearest MIDI note number
///
/// Returns 0 ("no pitch") for non-positive or sub-32 Hz input.
pub fn freq_to_midi(freq_hz: f64) -> u8 {
    if !freq_hz.is_finite() || freq_hz <= 0.0 || freq_hz < MIN_PITCHED_HZ {
        return 0;
    }
    let note = (69.0 + 12.0 * (freq_hz / 440.0).log2()).round();
    note.clamp(0.0, 127.0) as u8
}

// ============================================================================
// Tracking
// ============================================================================

/// Dominant pitch of every frame in Hz (0.0 where nothing qualifies)
pub fn dominant_pitches(mono: &[f32], sample_rate: u32, stft: &Stft) -> Vec<f64> {
    let bin_hz = sample_rate as f64 / stft.n_fft() as f64;

    stft.magnitudes(mono)
        .iter()
        .map(|frame| frame_pitch(frame, bin_hz))
        .collect()
}

/// Strongest interpolated peak in one magnitude frame
fn frame_pitch(frame: &[f64], bin_hz: f64) -> f64 {
    let frame_max = frame.iter().cloned().fold(0.0_f64, f64::max);
    if frame_max <= 0.0 {
        return 0.0;
    }
    let reference = PITCH_THRESHOLD * frame_max;
    let gated = |k: usize| if frame[k] > reference { frame[k] } else { 0.0 };

    let mut best_mag = 0.0_f64;
    let mut best_pitch = 0.0_f64;

    for k in 1..frame.len().saturating_sub(1) {
        let freq = k as f64 * bin_hz;
        if freq < PITCH_FMIN_HZ {
            continue;
        }
        if freq >= PITCH_FMAX_HZ {
            break;
        }

        let value = gated(k);
        if value <= 0.0 || value <= gated(k - 1) || value < gated(k + 1) {
            continue;
        }

        let avg = 0.5 * (frame[k + 1] - frame[k - 1]);
        let curvature = 2.0 * frame[k] - frame[k + 1] - frame[k - 1];
        let shift = if curvature.abs() < f64::MIN_POSITIVE {
            avg
        } else {
            avg / curvature
        };

        let magnitude = frame[k] + 0.5 * avg * shift;
        if magnitude > best_mag {
            best_mag = magnitude;
            best_pitch = (k as f64 + shift) * bin_hz;
        }
    }

    best_pitch
}

/// Transcribe the dominant melody of a mono signal
///
/// # Returns
/// Notes ordered by start time. Frames without a pitch split notes and are
/// never emitted; runs shorter than [`MIN_NOTE_FRAMES`] are dropped.
pub fn extract_melody(mono: &[f32], sample_rate: u32) -> Vec<NoteEvent> {
    if mono.is_empty() || sample_rate == 0 {
        return Vec::new();
    }

    let stft = Stft::new(DEFAULT_N_FFT, DEFAULT_HOP);
    let frame_secs = stft.hop() as f64 / sample_rate as f64;
    let midi_frames: Vec<u8> = dominant_pitches(mono, sample_rate, &stft)
        .into_iter()
        .map(freq_to_midi)
        .collect();

    let mut notes = Vec::new();
    let mut run_start = 0;

    for i in 1..=midi_frames.len() {
        if i < midi_frames.len() && midi_frames[i] == midi_frames[run_start] {
            continue;
        }

        let pitch = midi_frames[run_start];
        let frames = i - run_start;
        if pitch != 0 && frames >= MIN_NOTE_FRAMES {
            notes.push(NoteEvent {
                midi_pitch: pitch,
                start_sec: run_start as f64 * frame_secs,
                duration_sec: frames as f64 * frame_secs,
            });
        }
        run_start = i;
    }

    log::debug!(
        "Melody: {} notes from {} frames",
        notes.len(),
        midi_frames.len()
    );
    notes
}
