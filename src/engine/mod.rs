//! Audio Engine Module
//!
//! Core audio plumbing shared by every stage:
//! - Audio buffer management
//! - WAV file I/O
//! - Short-time Fourier transform

pub mod buffer;
pub mod io;
pub mod stft;

pub use buffer::{AudioBuffer, ChannelLayout};
pub use io::{
    export_audio, generate_stereo_test_tone, generate_test_tone, import_audio, ExportFormat,
};
pub use stft::Stft;
