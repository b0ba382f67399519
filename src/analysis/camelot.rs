//! Camelot wheel lookups and harmonic mixing recommendations
//!
//! Both directions of the key/code mapping are fixed tables. The reverse
//! table keeps enharmonic spellings together ("F# Maj / Gb Maj") instead of
//! inverting the forward table and losing one of them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::key::KeyLabel;
use crate::error::LoopError;

/// Returned in place of recommendations when the key has no Camelot code
pub const UNKNOWN_KEY_RECOMMENDATION: &str =
    "N/A (Key not recognized or 'Unknown Key' detected.)";

/// Wheel ring: `A` holds minor keys, `B` holds major keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CamelotLetter {
    A,
    B,
}

impl CamelotLetter {
    fn opposite(self) -> Self {
        match self {
            CamelotLetter::A => CamelotLetter::B,
            CamelotLetter::B => CamelotLetter::A,
        }
    }
}

/// Position on the Camelot wheel, e.g. `8B` for C major
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CamelotCode {
    number: u8,
    letter: CamelotLetter,
}

const fn code(number: u8, letter: CamelotLetter) -> CamelotCode {
    CamelotCode { number, letter }
}

use CamelotLetter::{A, B};

/// Key spelling to wheel position, sharps and common flat spellings
static KEY_TO_CAMELOT: &[(&str, CamelotCode)] = &[
    ("C Maj", code(8, B)),
    ("G Maj", code(9, B)),
    ("D Maj", code(10, B)),
    ("A Maj", code(11, B)),
    ("E Maj", code(12, B)),
    ("B Maj", code(1, B)),
    ("F# Maj", code(2, B)),
    ("C# Maj", code(3, B)),
    ("G# Maj", code(4, B)),
    ("D# Maj", code(5, B)),
    ("A# Maj", code(6, B)),
    ("F Maj", code(7, B)),
    ("Gb Maj", code(2, B)),
    ("Db Maj", code(3, B)),
    ("Ab Maj", code(4, B)),
    ("Eb Maj", code(5, B)),
    ("Bb Maj", code(6, B)),
    ("Cb Maj", code(1, B)),
    ("A Min", code(8, A)),
    ("E Min", code(9, A)),
    ("B Min", code(10, A)),
    ("F# Min", code(11, A)),
    ("C# Min", code(12, A)),
    ("G# Min", code(1, A)),
    ("D# Min", code(2, A)),
    ("A# Min", code(3, A)),
    ("F Min", code(4, A)),
    ("C Min", code(5, A)),
    ("G Min", code(6, A)),
    ("D Min", code(7, A)),
    ("Gb Min", code(11, A)),
    ("Db Min", code(12, A)),
    ("Ab Min", code(1, A)),
    ("Eb Min", code(2, A)),
    ("Bb Min", code(3, A)),
];

/// Display names indexed by `number - 1`, minor ring then major ring
static MINOR_NAMES: [&str; 12] = [
    "G# Min / Ab Min",
    "D# Min / Eb Min",
    "Bb Min / A# Min",
    "F Min",
    "C Min",
    "G Min",
    "D Min",
    "A Min",
    "E Min",
    "B Min",
    "F# Min / Gb Min",
    "C# Min / Db Min",
];

static MAJOR_NAMES: [&str; 12] = [
    "B Maj / Cb Maj",
    "F# Maj / Gb Maj",
    "Db Maj / C# Maj",
    "Ab Maj / G# Maj",
    "Eb Maj / D# Maj",
    "Bb Maj / A# Maj",
    "F Maj",
    "C Maj",
    "G Maj",
    "D Maj",
    "A Maj",
    "E Maj",
];

impl CamelotCode {
    /// Build a code, returning `None` outside 1-12
    pub fn new(number: u8, letter: CamelotLetter) -> Option<Self> {
        (1..=12).contains(&number).then_some(CamelotCode { number, letter })
    }

    pub fn number(self) -> u8 {
        self.number
    }

    pub fn letter(self) -> CamelotLetter {
        self.letter
    }

    /// Every code on the wheel, 1A..12A then 1B..12B
    pub fn all() -> impl Iterator<Item = CamelotCode> {
        [A, B]
            .into_iter()
            .flat_map(|letter| (1..=12).map(move |number| code(number, letter)))
    }

    /// Look up the code for a key spelling such as `"Eb Maj"`
    pub fn for_key_name(name: &str) -> Option<Self> {
        let name = name.trim();
        KEY_TO_CAMELOT
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, code)| *code)
    }

    /// Look up the code for an estimated key
    pub fn for_key(key: &KeyLabel) -> Option<Self> {
        match key {
            KeyLabel::Known { .. } => Self::for_key_name(&key.to_string()),
            KeyLabel::Unknown => None,
        }
    }

    /// Same number, other ring
    pub fn relative(self) -> Self {
        code(self.number, self.letter.opposite())
    }

    /// One step clockwise (12 wraps to 1)
    pub fn step_up(self) -> Self {
        code(self.number % 12 + 1, self.letter)
    }

    /// One step counter-clockwise (1 wraps to 12)
    pub fn step_down(self) -> Self {
        let number = if self.number == 1 { 12 } else { self.number - 1 };
        code(number, self.letter)
    }

    /// Key name(s) for this position
    pub fn display_name(self) -> &'static str {
        let index = (self.number as usize).saturating_sub(1).min(11);
        match self.letter {
            CamelotLetter::A => MINOR_NAMES[index],
            CamelotLetter::B => MAJOR_NAMES[index],
        }
    }
}

impl fmt::Display for CamelotCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self.letter {
            CamelotLetter::A => 'A',
            CamelotLetter::B => 'B',
        };
        write!(f, "{}{}", self.number, letter)
    }
}

impl FromStr for CamelotCode {
    type Err = LoopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || LoopError::invalid_param("camelot_code", s, "1A-12A or 1B-12B");

        let letter = match s.chars().last() {
            Some('A') | Some('a') => CamelotLetter::A,
            Some('B') | Some('b') => CamelotLetter::B,
            _ => return Err(invalid()),
        };
        let number: u8 = s[..s.len() - 1].parse().map_err(|_| invalid())?;

        CamelotCode::new(number, letter).ok_or_else(invalid)
    }
}

/// Three harmonically compatible keys for a key spelling
///
/// The relative key comes first, then one step up and one step down the
/// wheel in the same mode, joined as `"Name (code) | Name (code) | ..."`.
/// Unrecognized keys yield [`UNKNOWN_KEY_RECOMMENDATION`].
pub fn harmonic_recommendations(key_name: &str) -> String {
    match CamelotCode::for_key_name(key_name) {
        Some(code) => format_recommendations(code),
        None => UNKNOWN_KEY_RECOMMENDATION.to_string(),
    }
}

/// [`harmonic_recommendations`] for an estimated key
pub fn harmonic_recommendations_for(key: &KeyLabel) -> String {
    match CamelotCode::for_key(key) {
        Some(code) => format_recommendations(code),
        None => UNKNOWN_KEY_RECOMMENDATION.to_string(),
    }
}

fn format_recommendations(code: CamelotCode) -> String {
    [code.relative(), code.step_up(), code.step_down()]
        .iter()
        .map(|c| format!("{} ({})", c.display_name(), c))
        .collect::<Vec<_>>()
        .join(" | ")
}
