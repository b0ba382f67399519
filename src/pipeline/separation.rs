//! Stem separation boundary
//!
//! Slicing does not care how stems were produced. A separator takes the
//! full mix and returns named stem buffers; real ML back-ends plug in here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::AudioBuffer;
use crate::error::{LoopError, Result};

/// Identifies which stem is being referred to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemKind {
    Vocals,
    Drums,
    Bass,
    Other,
    Guitar,
    Piano,
}

impl StemKind {
    /// All stem kinds, in processing order
    pub const ALL: [StemKind; 6] = [
        StemKind::Vocals,
        StemKind::Drums,
        StemKind::Bass,
        StemKind::Other,
        StemKind::Guitar,
        StemKind::Piano,
    ];

    /// Lower-case name used in file names
    pub fn name(self) -> &'static str {
        match self {
            StemKind::Vocals => "vocals",
            StemKind::Drums => "drums",
            StemKind::Bass => "bass",
            StemKind::Other => "other",
            StemKind::Guitar => "guitar",
            StemKind::Piano => "piano",
        }
    }
}

impl fmt::Display for StemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StemKind {
    type Err = LoopError;

    fn from_str(s: &str) -> Result<Self> {
        StemKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                LoopError::invalid_param(
                    "stem",
                    s,
                    "vocals, drums, bass, other, guitar or piano",
                )
            })
    }
}

/// Splits a mix into named stems
pub trait StemSeparator: Send + Sync {
    /// Return `(stem_name, buffer)` pairs in a stable order
    fn separate(&self, mix: &AudioBuffer) -> Result<Vec<(String, AudioBuffer)>>;

    /// Back-end name for logs and reports
    fn name(&self) -> &str;
}

/// Copies the full mix into every stem slot
///
/// Stands in for a real separator so the rest of the pipeline can run
/// end to end.
#[derive(Debug, Clone)]
pub struct PassthroughSeparator {
    stems: Vec<StemKind>,
}

impl PassthroughSeparator {
    pub fn new(stems: Vec<StemKind>) -> Self {
        Self { stems }
    }

    pub fn stems(&self) -> &[StemKind] {
        &self.stems
    }
}

impl Default for PassthroughSeparator {
    fn default() -> Self {
        Self::new(StemKind::ALL.to_vec())
    }
}

impl StemSeparator for PassthroughSeparator {
    fn separate(&self, mix: &AudioBuffer) -> Result<Vec<(String, AudioBuffer)>> {
        mix.validate()?;
        log::debug!(
            "Passthrough separation into {} stems",
            self.stems.len()
        );
        Ok(self
            .stems
            .iter()
            .map(|kind| (kind.name().to_string(), mix.clone()))
            .collect())
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::generate_test_tone;

    #[test]
    fn test_passthrough_copies_mix() {
        let mix = generate_test_tone(440.0, 0.1, 22_050);
        let stems = PassthroughSeparator::default().separate(&mix).unwrap();

        let names: Vec<&str> = stems.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["vocals", "drums", "bass", "other", "guitar", "piano"]);
        assert!(stems.iter().all(|(_, audio)| *audio == mix));
    }

    #[test]
    fn test_passthrough_subset() {
        let mix = generate_test_tone(440.0, 0.1, 22_050);
        let separator = PassthroughSeparator::new(vec![StemKind::Drums, StemKind::Bass]);
        let stems = separator.separate(&mix).unwrap();
        assert_eq!(stems.len(), 2);
        assert_eq!(stems[1].0, "bass");
    }

    #[test]
    fn test_passthrough_rejects_empty_mix() {
        let mix = AudioBuffer::from_mono(Vec::new(), 22_050);
        assert!(PassthroughSeparator::default().separate(&mix).is_err());
    }

    #[test]
    fn test_stem_kind_parse() {
        assert_eq!("Vocals".parse::<StemKind>().unwrap(), StemKind::Vocals);
        assert_eq!(StemKind::Piano.to_string(), "piano");
        assert!("kazoo".parse::<StemKind>().is_err());
    }
}
