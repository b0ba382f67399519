//! Stem slicing
//!
//! Configuration, fragment naming and the engine that cuts loops and
//! one-shots from a stem.

pub mod config;
pub mod engine;
pub mod fragment;

pub use config::{FilterMode, LoopType, SliceConfig, TimeSignature};
pub use engine::{is_melodic_stem, SlicingEngine, StemOutput, StemSlices};
pub use fragment::{midi_file_name, Fragment, FragmentKind, RenderedFragment};
