//! Key and mode estimation
//!
//! A 12-bin chroma histogram of the whole clip is correlated against the
//! Krumhansl-Schmuckler major and minor profiles at all twelve rotations.
//! The best (profile, rotation) pair names the key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::stft::Stft;
use crate::error::LoopError;

// ============================================================================
// Constants
// ============================================================================

/// Krumhansl-Schmuckler major key profile, indexed from the tonic
pub const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

/// Krumhansl-Schmuckler minor key profile, indexed from the tonic
pub const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// Chroma octave weighting: center octave above A0 and its spread
const CHROMA_CENTER_OCTAVE: f64 = 5.0;
const CHROMA_OCTAVE_WIDTH: f64 = 2.0;

/// Bins below this frequency carry no usable pitch information
const CHROMA_MIN_HZ: f64 = 27.5;

/// Correlations closer than this are treated as equal
const SCORE_TOLERANCE: f64 = 1e-12;

// ============================================================================
// Pitch classes and modes
// ============================================================================

/// One of the twelve equal-tempered pitch classes, spelled with sharps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl PitchClass {
    /// All pitch classes in chromatic order starting at C
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Semitones above C
    pub fn index(self) -> usize {
        self as usize
    }

    /// Pitch class for any semitone offset from C (wraps modulo 12)
    pub fn from_index(index: i64) -> Self {
        Self::ALL[index.rem_euclid(12) as usize]
    }

    /// Shift by a signed number of semitones
    pub fn transpose(self, semitones: i32) -> Self {
        Self::from_index(self.index() as i64 + semitones as i64)
    }

    /// Sharp spelling used in key labels and file names
    pub fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::CSharp => "C#",
            PitchClass::D => "D",
            PitchClass::DSharp => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::FSharp => "F#",
            PitchClass::G => "G",
            PitchClass::GSharp => "G#",
            PitchClass::A => "A",
            PitchClass::ASharp => "A#",
            PitchClass::B => "B",
        }
    }

    /// Parse a note name, accepting sharp and flat spellings
    pub fn parse(name: &str) -> Option<Self> {
        let mut chars = name.trim().chars();
        let letter = chars.next()?.to_ascii_uppercase();
        let natural: i64 = match letter {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };
        let accidental: i64 = match chars.as_str() {
            "" => 0,
            "#" | "♯" => 1,
            "b" | "♭" => -1,
            _ => return None,
        };
        Some(Self::from_index(natural + accidental))
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Major or minor tonality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Major,
    Minor,
}

impl Mode {
    /// Short suffix used in labels ("Maj" / "Min")
    pub fn suffix(self) -> &'static str {
        match self {
            Mode::Major => "Maj",
            Mode::Minor => "Min",
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Mode::Major => Mode::Minor,
            Mode::Minor => Mode::Major,
        }
    }
}

// ============================================================================
// Key label
// ============================================================================

/// Estimated key of a clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyLabel {
    Known { root: PitchClass, mode: Mode },
    Unknown,
}

impl KeyLabel {
    pub fn new(root: PitchClass, mode: Mode) -> Self {
        KeyLabel::Known { root, mode }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, KeyLabel::Known { .. })
    }

    /// Compact tag embedded in fragment file names
    ///
    /// `"C Maj"` becomes `"CMaj"`. A non-zero transpose shifts the root and
    /// marks the tag, so `"C Maj"` up two semitones becomes `"DMajShift"`.
    /// Unknown keys always tag as `"UnknownKey"`.
    pub fn file_tag(&self, transpose_semitones: i32) -> String {
        match *self {
            KeyLabel::Unknown => "UnknownKey".to_string(),
            KeyLabel::Known { root, mode } if transpose_semitones == 0 => {
                format!("{}{}", root, mode.suffix())
            }
            KeyLabel::Known { root, mode } => {
                format!("{}{}Shift", root.transpose(transpose_semitones), mode.suffix())
            }
        }
    }
}

impl fmt::Display for KeyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyLabel::Known { root, mode } => write!(f, "{} {}", root, mode.suffix()),
            KeyLabel::Unknown => f.write_str("Unknown Key"),
        }
    }
}

impl FromStr for KeyLabel {
    type Err = LoopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("unknown key") || trimmed.eq_ignore_ascii_case("unknown") {
            return Ok(KeyLabel::Unknown);
        }

        let invalid = || LoopError::invalid_param("key", trimmed, "'<root> Maj' or '<root> Min'");

        let (root, mode) = trimmed.split_once(' ').ok_or_else(invalid)?;
        let root = PitchClass::parse(root).ok_or_else(invalid)?;
        let mode = match mode.trim().to_ascii_lowercase().as_str() {
            "maj" | "major" => Mode::Major,
            "min" | "minor" => Mode::Minor,
            _ => return Err(invalid()),
        };

        Ok(KeyLabel::Known { root, mode })
    }
}

// ============================================================================
// Estimation
// ============================================================================

/// Estimate the key of a mono signal
///
/// # Arguments
/// * `mono` - Mono samples
/// * `sample_rate` - Sample rate in Hz
///
/// # Returns
/// The best-correlating key, or `KeyLabel::Unknown` for digital silence
pub fn estimate_key(mono: &[f32], sample_rate: u32) -> KeyLabel {
    let chroma = chroma_profile(mono, sample_rate);
    estimate_key_from_chroma(&chroma)
}

/// Pick the key whose rotated profile best matches a chroma histogram
///
/// Equal major and minor scores resolve to major.
pub fn estimate_key_from_chroma(chroma: &[f64; 12]) -> KeyLabel {
    let total: f64 = chroma.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return KeyLabel::Unknown;
    }

    let normalized: Vec<f64> = chroma.iter().map(|c| c / total).collect();
    let major = l1_normalize(&MAJOR_PROFILE);
    let minor = l1_normalize(&MINOR_PROFILE);

    let (major_root, major_score) = best_rotation(&normalized, &major);
    let (minor_root, minor_score) = best_rotation(&normalized, &minor);

    log::debug!(
        "Key correlation: {} Maj {:.5} vs {} Min {:.5}",
        major_root,
        major_score,
        minor_root,
        minor_score
    );

    if major_score + SCORE_TOLERANCE >= minor_score {
        KeyLabel::new(major_root, Mode::Major)
    } else {
        KeyLabel::new(minor_root, Mode::Minor)
    }
}

/// L1-normalized chroma histogram summed over the whole signal
///
/// Each frame's chroma is scaled so its strongest bin is 1 before summing,
/// so loud passages do not dominate. Silence yields all zeros.
pub fn chroma_profile(mono: &[f32], sample_rate: u32) -> [f64; 12] {
    let mut chroma = [0.0_f64; 12];
    if mono.is_empty() || sample_rate == 0 {
        return chroma;
    }

    let stft = Stft::default();
    let bin_map: Vec<Option<(usize, f64)>> = (0..stft.num_bins())
        .map(|k| chroma_bin(stft.bin_frequency(k, sample_rate)))
        .collect();

    for frame in stft.magnitudes(mono) {
        let mut frame_chroma = [0.0_f64; 12];
        for (mag, mapping) in frame.iter().zip(&bin_map) {
            if let Some((pc, weight)) = mapping {
                frame_chroma[*pc] += mag * mag * weight;
            }
        }

        let frame_max = frame_chroma.iter().cloned().fold(0.0_f64, f64::max);
        if frame_max > f64::MIN_POSITIVE {
            for (acc, value) in chroma.iter_mut().zip(frame_chroma) {
                *acc += value / frame_max;
            }
        }
    }

    let total: f64 = chroma.iter().sum();
    if total > 0.0 {
        for value in chroma.iter_mut() {
            *value /= total;
        }
    }

    chroma
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Pitch class and octave weight for an FFT bin frequency
fn chroma_bin(freq: f64) -> Option<(usize, f64)> {
    if freq < CHROMA_MIN_HZ {
        return None;
    }

    let midi = 69.0 + 12.0 * (freq / 440.0).log2();
    let pitch_class = (midi.round() as i64).rem_euclid(12) as usize;

    let octaves_above_a0 = (freq / CHROMA_MIN_HZ).log2();
    let weight = (-0.5 * ((octaves_above_a0 - CHROMA_CENTER_OCTAVE) / CHROMA_OCTAVE_WIDTH).powi(2))
        .exp();

    Some((pitch_class, weight))
}

fn l1_normalize(profile: &[f64; 12]) -> [f64; 12] {
    let total: f64 = profile.iter().sum();
    let mut out = *profile;
    for value in out.iter_mut() {
        *value /= total;
    }
    out
}

/// Highest dot product over the twelve circular rotations of `template`
///
/// Rotation `r` places the template's tonic at pitch class `r`. Equal scores
/// keep the lowest rotation.
fn best_rotation(chroma: &[f64], template: &[f64; 12]) -> (PitchClass, f64) {
    let mut best = (PitchClass::C, f64::NEG_INFINITY);

    for rotation in 0..12 {
        let score: f64 = chroma
            .iter()
            .enumerate()
            .map(|(pc, &c)| c * template[(pc + 12 - rotation) % 12])
            .sum();

        if score > best.1 + SCORE_TOLERANCE {
            best = (PitchClass::ALL[rotation], score);
        }
    }

    best
}

// ============================================================================
// Tests
// ============================================================================
