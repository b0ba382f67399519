//! Loop Architect - stem slicing and sample-pack engine
//!
//! Turns a song into a DAW-ready sample pack:
//! 1. Key estimation and Camelot-wheel harmonic recommendations
//! 2. Tempo-aligned loop slicing and onset-based one-shot extraction
//! 3. Tempo-synced FX (transpose, filter sweep, pan/tremolo, normalize, fades)
//! 4. Melody transcription to Standard MIDI Files
//!
//! # Architecture
//!
//! - `engine`: audio buffers, WAV I/O, STFT
//! - `analysis`: key, onsets, pitch
//! - `dsp`: the FX stages and the chain that orders them
//! - `midi`: SMF encoding
//! - `slicer`: configuration and the per-stem slicing engine
//! - `pipeline`: stem separation, parallel batch runs and pack assembly

pub mod analysis;
pub mod cli;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod midi;
pub mod pipeline;
pub mod slicer;

pub use error::{LoopError, Result};
