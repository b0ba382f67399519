//! Fragments cut from a stem and their file names

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::AudioBuffer;

/// Loop or one-shot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    Loop { bars: u32 },
    OneShot,
}

impl FragmentKind {
    /// Tag used in file names: `4Bar` or `OneShot`
    pub fn tag(&self) -> String {
        match self {
            FragmentKind::Loop { bars } => format!("{}Bar", bars),
            FragmentKind::OneShot => "OneShot".to_string(),
        }
    }
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FragmentKind::Loop { bars } => write!(f, "{}-bar loop", bars),
            FragmentKind::OneShot => f.write_str("one-shot"),
        }
    }
}

/// A sample range of one stem plus the tags that name it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// 1-based ordinal
    pub index: usize,
    pub kind: FragmentKind,
    pub start_sample: usize,
    /// Exclusive
    pub end_sample: usize,
    pub stem_name: String,
    /// Key without spaces, e.g. `AMin` or `BMajShift`
    pub key_tag: String,
    pub bpm_tag: u32,
}

impl Fragment {
    pub fn len(&self) -> usize {
        self.end_sample.saturating_sub(self.start_sample)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `<stem>_<NBar|OneShot>_<###>_<KeyTag>_<BPM>BPM.wav`
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{:03}_{}_{}BPM.wav",
            self.stem_name,
            self.kind.tag(),
            self.index,
            self.key_tag,
            self.bpm_tag
        )
    }
}

/// File name of a stem's melody transcription
pub fn midi_file_name(stem_name: &str, key_tag: &str, bpm_tag: u32) -> String {
    format!("{}_MELODY_{}_{}BPM.mid", stem_name, key_tag, bpm_tag)
}

/// A fragment with its processed audio
#[derive(Debug, Clone)]
pub struct RenderedFragment {
    pub fragment: Fragment,
    pub audio: AudioBuffer,
}
