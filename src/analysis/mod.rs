//! Musical analysis
//!
//! - Key and mode estimation
//! - Camelot wheel lookups and harmonic recommendations
//! - Onset detection for one-shot slicing
//! - Pitch tracking for melody transcription

pub mod camelot;
pub mod key;
pub mod onset;
pub mod pitch;

pub use camelot::{harmonic_recommendations, harmonic_recommendations_for, CamelotCode, CamelotLetter};
pub use key::{estimate_key, KeyLabel, Mode, PitchClass};
pub use onset::{detect_onsets, OnsetParams};
pub use pitch::{extract_melody, freq_to_midi};
