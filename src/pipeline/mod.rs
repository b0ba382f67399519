//! Whole-mix processing
//!
//! Stem separation, parallel batch slicing, waveform previews and
//! sample-pack assembly.

pub mod batch;
pub mod pack;
pub mod preview;
pub mod separation;

pub use batch::{BatchProcessor, BatchReport, ProgressCallback, StemReport, StemStatus};
pub use pack::{PackBuilder, PackFile, PackSummary};
pub use preview::{render_waveform_svg, write_waveform_preview};
pub use separation::{PassthroughSeparator, StemKind, StemSeparator};
