//! Slicing and FX configuration
//!
//! `SliceConfig` is the validated parameter set for one run. It loads from
//! JSON (missing fields take their defaults) and every numeric field is
//! range-checked by [`SliceConfig::validate`] before any audio is touched.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dsp::biquad::FilterKind;
use crate::dsp::chain::FxSettings;
use crate::dsp::lfo::ModulationRate;
use crate::error::{LoopError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Longest loop-edge crossfade (ms)
pub const MAX_CROSSFADE_MS: f64 = 50.0;

/// Normalization target range (dBFS); 0 disables normalization
pub const MIN_TARGET_PEAK_DBFS: f64 = -24.0;

/// Upper bound for modulation depths (percent)
pub const MAX_DEPTH_PCT: f64 = 100.0;

/// Envelope gains outside this range (dB) are rejected
pub const ENVELOPE_GAIN_RANGE_DB: (f64, f64) = (-96.0, 24.0);

// ============================================================================
// Enumerated fields
// ============================================================================

/// Supported meters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeSignature {
    #[default]
    #[serde(rename = "4/4")]
    FourFour,
    #[serde(rename = "3/4")]
    ThreeFour,
}

impl TimeSignature {
    pub fn beats_per_bar(self) -> u32 {
        match self {
            TimeSignature::FourFour => 4,
            TimeSignature::ThreeFour => 3,
        }
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSignature::FourFour => f.write_str("4/4"),
            TimeSignature::ThreeFour => f.write_str("3/4"),
        }
    }
}

impl FromStr for TimeSignature {
    type Err = LoopError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "4/4" => Ok(TimeSignature::FourFour),
            "3/4" => Ok(TimeSignature::ThreeFour),
            other => Err(LoopError::invalid_param("time_signature", other, "4/4 or 3/4")),
        }
    }
}

/// Slicing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LoopType {
    #[serde(rename = "1-bar")]
    OneBar,
    #[serde(rename = "2-bar")]
    TwoBar,
    #[default]
    #[serde(rename = "4-bar")]
    FourBar,
    #[serde(rename = "one-shot", alias = "one-shots")]
    OneShot,
}

impl LoopType {
    /// Bars per loop, or `None` for one-shot slicing
    pub fn bars(self) -> Option<u32> {
        match self {
            LoopType::OneBar => Some(1),
            LoopType::TwoBar => Some(2),
            LoopType::FourBar => Some(4),
            LoopType::OneShot => None,
        }
    }

    pub fn is_one_shot(self) -> bool {
        self == LoopType::OneShot
    }
}

impl fmt::Display for LoopType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LoopType::OneBar => "1-bar",
            LoopType::TwoBar => "2-bar",
            LoopType::FourBar => "4-bar",
            LoopType::OneShot => "one-shot",
        };
        f.write_str(label)
    }
}

impl FromStr for LoopType {
    type Err = LoopError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1-bar" | "1bar" | "1" => Ok(LoopType::OneBar),
            "2-bar" | "2bar" | "2" => Ok(LoopType::TwoBar),
            "4-bar" | "4bar" | "4" => Ok(LoopType::FourBar),
            "one-shot" | "one-shots" | "oneshot" => Ok(LoopType::OneShot),
            _ => Err(LoopError::invalid_param(
                "loop_type",
                s,
                "1-bar, 2-bar, 4-bar or one-shot",
            )),
        }
    }
}

/// Filter-modulation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterMode {
    #[default]
    None,
    LowPass,
    HighPass,
}

impl FilterMode {
    pub fn kind(self) -> Option<FilterKind> {
        match self {
            FilterMode::None => None,
            FilterMode::LowPass => Some(FilterKind::LowPass),
            FilterMode::HighPass => Some(FilterKind::HighPass),
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FilterMode::None => "none",
            FilterMode::LowPass => "low-pass",
            FilterMode::HighPass => "high-pass",
        };
        f.write_str(label)
    }
}

impl FromStr for FilterMode {
    type Err = LoopError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(FilterMode::None),
            "low-pass" | "lowpass" | "lpf" => Ok(FilterMode::LowPass),
            "high-pass" | "highpass" | "hpf" => Ok(FilterMode::HighPass),
            _ => Err(LoopError::invalid_param(
                "filter_mode",
                s,
                "none, low-pass or high-pass",
            )),
        }
    }
}

// ============================================================================
// SliceConfig
// ============================================================================

/// Parameters for slicing, FX and packaging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SliceConfig {
    pub bpm: f64,
    pub time_signature: TimeSignature,
    pub loop_type: LoopType,
    /// 0 = fewest onsets, 1 = most
    pub one_shot_sensitivity: f64,
    pub crossfade_ms: f64,
    pub transpose_semitones: i32,
    pub target_peak_dbfs: f64,
    /// Percent
    pub pan_depth: f64,
    /// Percent
    pub level_depth: f64,
    pub modulation_rate: ModulationRate,
    pub filter_mode: FilterMode,
    pub filter_base_hz: f64,
    pub filter_depth_hz: f64,
    pub attack_gain_db: f64,
    pub sustain_gain_db: f64,
    pub include_midi: bool,
    pub pack_name: String,
    pub artist_name: Option<String>,
    pub description: Option<String>,
}

impl Default for SliceConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            time_signature: TimeSignature::FourFour,
            loop_type: LoopType::FourBar,
            one_shot_sensitivity: 0.5,
            crossfade_ms: 10.0,
            transpose_semitones: 0,
            target_peak_dbfs: -1.0,
            pan_depth: 0.0,
            level_depth: 0.0,
            modulation_rate: ModulationRate::Quarter,
            filter_mode: FilterMode::None,
            filter_base_hz: 5000.0,
            filter_depth_hz: 0.0,
            attack_gain_db: 0.0,
            sustain_gain_db: 0.0,
            include_midi: true,
            pack_name: "Loop_Architect_Pack".to_string(),
            artist_name: None,
            description: None,
        }
    }
}

/// Reject values outside `[min, max]` (and non-finite values)
fn check_range(param: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(LoopError::invalid_param(
            param,
            value,
            format!("{} to {}", min, max),
        ))
    }
}

impl SliceConfig {
    /// Load and validate a JSON config file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LoopError::FileNotFound {
                path: path.display().to_string(),
                source: None,
            });
        }
        let text = std::fs::read_to_string(path)?;
        let config: SliceConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty JSON
    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Check every field against its legal range
    ///
    /// # Errors
    /// `InvalidParameter` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !self.bpm.is_finite() || self.bpm <= 0.0 {
            return Err(LoopError::invalid_param("bpm", self.bpm, "a positive number"));
        }
        check_range("one_shot_sensitivity", self.one_shot_sensitivity, 0.0, 1.0)?;
        check_range("crossfade_ms", self.crossfade_ms, 0.0, MAX_CROSSFADE_MS)?;
        if self.transpose_semitones.abs() > 12 {
            return Err(LoopError::invalid_param(
                "transpose_semitones",
                self.transpose_semitones,
                "-12 to 12",
            ));
        }
        check_range("target_peak_dbfs", self.target_peak_dbfs, MIN_TARGET_PEAK_DBFS, 0.0)?;
        check_range("pan_depth", self.pan_depth, 0.0, MAX_DEPTH_PCT)?;
        check_range("level_depth", self.level_depth, 0.0, MAX_DEPTH_PCT)?;

        if self.filter_mode != FilterMode::None {
            if !self.filter_base_hz.is_finite() || self.filter_base_hz <= 0.0 {
                return Err(LoopError::invalid_param(
                    "filter_base_hz",
                    self.filter_base_hz,
                    "a positive frequency",
                ));
            }
            check_range("filter_depth_hz", self.filter_depth_hz, 0.0, f64::MAX)?;
        }

        let (min_db, max_db) = ENVELOPE_GAIN_RANGE_DB;
        check_range("attack_gain_db", self.attack_gain_db, min_db, max_db)?;
        check_range("sustain_gain_db", self.sustain_gain_db, min_db, max_db)?;

        let name = self.pack_name.trim();
        let has_separator = name.contains(|c| c == '/' || c == '\\');
        if name.is_empty() || has_separator || name == "." || name == ".." {
            return Err(LoopError::invalid_param(
                "pack_name",
                &self.pack_name,
                "a non-empty folder name without path separators",
            ));
        }

        Ok(())
    }

    /// Loop length in samples, `round(60 / bpm * beats_per_bar * bars * sample_rate)`
    ///
    /// `None` in one-shot mode.
    pub fn loop_duration_samples(&self, sample_rate: u32) -> Option<usize> {
        let bars = self.loop_type.bars()?;
        let secs = 60.0 / self.bpm * self.time_signature.beats_per_bar() as f64 * bars as f64;
        Some((secs * sample_rate as f64).round() as usize)
    }

    /// Tempo as written in file names
    pub fn bpm_tag(&self) -> u32 {
        self.bpm.round() as u32
    }

    /// Stage parameters for the FX chain
    pub fn fx_settings(&self) -> FxSettings {
        FxSettings {
            bpm: self.bpm,
            transpose_semitones: self.transpose_semitones,
            filter: self.filter_mode.kind(),
            filter_base_hz: self.filter_base_hz,
            filter_depth_hz: self.filter_depth_hz,
            modulation_rate: self.modulation_rate,
            pan_depth_pct: self.pan_depth,
            level_depth_pct: self.level_depth,
            target_peak_dbfs: self.target_peak_dbfs,
            crossfade_ms: self.crossfade_ms,
            attack_gain_db: self.attack_gain_db,
            sustain_gain_db: self.sustain_gain_db,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use test_case::test_case;

    #[test]
    fn test_default_is_valid() {
        SliceConfig::default().validate().unwrap();
    }

    #[test_case(120.0, TimeSignature::FourFour, LoopType::FourBar, 44_100, 352_800 ; "4 bars at 120")]
    #[test_case(120.0, TimeSignature::ThreeFour, LoopType::OneBar, 44_100, 66_150 ; "waltz bar")]
    #[test_case(90.0, TimeSignature::FourFour, LoopType::TwoBar, 48_000, 256_000 ; "2 bars at 90")]
    #[test_case(137.0, TimeSignature::FourFour, LoopType::OneBar, 44_100, 77_255 ; "rounded")]
    fn test_loop_duration_samples(
        bpm: f64,
        time_signature: TimeSignature,
        loop_type: LoopType,
        sample_rate: u32,
        expected: usize,
    ) {
        let config = SliceConfig {
            bpm,
            time_signature,
            loop_type,
            ..SliceConfig::default()
        };
        assert_eq!(config.loop_duration_samples(sample_rate), Some(expected));
    }

    #[test]
    fn test_one_shot_has_no_loop_length() {
        let config = SliceConfig {
            loop_type: LoopType::OneShot,
            ..SliceConfig::default()
        };
        assert_eq!(config.loop_duration_samples(44_100), None);
    }

    #[test]
    fn test_validate_names_field() {
        let cases = [
            (SliceConfig { bpm: 0.0, ..SliceConfig::default() }, "bpm"),
            (SliceConfig { crossfade_ms: 51.0, ..SliceConfig::default() }, "crossfade_ms"),
            (SliceConfig { transpose_semitones: -13, ..SliceConfig::default() }, "transpose_semitones"),
            (SliceConfig { target_peak_dbfs: -30.0, ..SliceConfig::default() }, "target_peak_dbfs"),
            (SliceConfig { pan_depth: 101.0, ..SliceConfig::default() }, "pan_depth"),
            (SliceConfig { one_shot_sensitivity: 1.5, ..SliceConfig::default() }, "one_shot_sensitivity"),
            (SliceConfig { pack_name: "a/b".into(), ..SliceConfig::default() }, "pack_name"),
            (
                SliceConfig {
                    filter_mode: FilterMode::LowPass,
                    filter_base_hz: -5.0,
                    ..SliceConfig::default()
                },
                "filter_base_hz",
            ),
        ];

        for (config, field) in cases {
            match config.validate() {
                Err(LoopError::InvalidParameter { param, .. }) => assert_eq!(param, field),
                other => panic!("expected InvalidParameter for {}, got {:?}", field, other),
            }
        }
    }

    #[test]
    fn test_filter_fields_ignored_when_off() {
        let config = SliceConfig {
            filter_base_hz: -5.0,
            ..SliceConfig::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_json_defaults_missing_fields() {
        let config: SliceConfig =
            serde_json::from_str(r#"{"bpm": 95.5, "loop_type": "one-shot", "filter_mode": "high-pass"}"#)
                .unwrap();
        assert_eq!(config.bpm, 95.5);
        assert_eq!(config.loop_type, LoopType::OneShot);
        assert_eq!(config.filter_mode, FilterMode::HighPass);
        assert_eq!(config.time_signature, TimeSignature::FourFour);
        assert_eq!(config.bpm_tag(), 96);
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = SliceConfig {
            bpm: 100.0,
            modulation_rate: ModulationRate::Sixteenth,
            artist_name: Some("Someone".into()),
            ..SliceConfig::default()
        };
        config.to_json_file(&path).unwrap();
        assert_eq!(SliceConfig::from_json_file(&path).unwrap(), config);
    }

    #[test]
    fn test_json_file_rejects_invalid_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"level_depth": 150}"#).unwrap();
        assert!(matches!(
            SliceConfig::from_json_file(&path),
            Err(LoopError::InvalidParameter { .. })
        ));
        assert!(matches!(
            SliceConfig::from_json_file(&dir.path().join("missing.json")),
            Err(LoopError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("4-Bar".parse::<LoopType>().unwrap(), LoopType::FourBar);
        assert_eq!("One-Shot".parse::<LoopType>().unwrap(), LoopType::OneShot);
        assert_eq!("Low-pass".parse::<FilterMode>().unwrap(), FilterMode::LowPass);
        assert_eq!("3/4".parse::<TimeSignature>().unwrap(), TimeSignature::ThreeFour);
        assert!("5/4".parse::<TimeSignature>().is_err());
        assert!("8-bar".parse::<LoopType>().is_err());
        assert_eq!(LoopType::TwoBar.to_string(), "2-bar");
        assert_eq!(FilterMode::HighPass.to_string(), "high-pass");
    }

    #[test]
    fn test_fx_settings_mapping() {
        let config = SliceConfig {
            filter_mode: FilterMode::HighPass,
            pan_depth: 40.0,
            ..SliceConfig::default()
        };
        let fx = config.fx_settings();
        assert_eq!(fx.filter, Some(FilterKind::HighPass));
        assert_eq!(fx.pan_depth_pct, 40.0);
        assert_eq!(fx.target_peak_dbfs, -1.0);
    }
}
