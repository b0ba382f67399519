//! Batch processing of a whole mix
//!
//! Validates the mix, estimates its key once, separates stems and slices
//! every stem in parallel. Each stem is isolated: an error or panic in one
//! stem yields an empty file list for it and the rest still complete.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::preview::{preview_file_name, write_waveform_preview};
use super::separation::{PassthroughSeparator, StemSeparator};
use crate::analysis::camelot::harmonic_recommendations_for;
use crate::analysis::key::{estimate_key, KeyLabel};
use crate::engine::AudioBuffer;
use crate::error::{LoopError, Result};
use crate::slicer::{SliceConfig, SlicingEngine};

/// Name of the JSON report written into each run directory
pub const REPORT_FILE_NAME: &str = "batch_report.json";

/// Progress callback: `(fraction_complete, message)`
pub type ProgressCallback = Arc<dyn Fn(f64, &str) + Send + Sync>;

// ============================================================================
// Reports
// ============================================================================

/// Outcome of one stem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StemStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Files and status for one stem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StemReport {
    pub stem_name: String,
    pub status: StemStatus,
    pub wav_files: Vec<PathBuf>,
    pub midi_file: Option<PathBuf>,
    pub preview: Option<PathBuf>,
    pub error: Option<String>,
}

impl StemReport {
    fn empty(stem_name: &str, status: StemStatus, error: Option<String>) -> Self {
        Self {
            stem_name: stem_name.to_string(),
            status,
            wav_files: Vec::new(),
            midi_file: None,
            preview: None,
            error,
        }
    }
}

/// Result of one batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub run_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sample_rate: u32,
    pub duration_secs: f64,
    pub key: String,
    pub harmonic_recommendations: String,
    pub separator: String,
    pub config: SliceConfig,
    /// Stages and parameters applied to every stem
    pub fx_chain: serde_json::Value,
    pub stems: Vec<StemReport>,
}

impl BatchReport {
    /// All WAV fragments, in stem order
    pub fn wav_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.stems.iter().flat_map(|s| s.wav_files.iter())
    }

    /// All MIDI files, in stem order
    pub fn midi_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.stems.iter().filter_map(|s| s.midi_file.as_ref())
    }

    /// All preview images, in stem order
    pub fn previews(&self) -> impl Iterator<Item = &PathBuf> {
        self.stems.iter().filter_map(|s| s.preview.as_ref())
    }

    pub fn failed_stems(&self) -> Vec<&str> {
        self.stems
            .iter()
            .filter(|s| s.status == StemStatus::Failed)
            .map(|s| s.stem_name.as_str())
            .collect()
    }

    pub fn is_cancelled(&self) -> bool {
        self.stems.iter().any(|s| s.status == StemStatus::Cancelled)
    }

    /// Write the report as pretty JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

// ============================================================================
// Batch Processor
// ============================================================================

/// Runs the full slicing pipeline over a mix
pub struct BatchProcessor {
    engine: SlicingEngine,
    separator: Arc<dyn StemSeparator>,
    output_root: PathBuf,
    progress: Option<ProgressCallback>,
    cancel: Option<Arc<AtomicBool>>,
    write_previews: bool,
}

impl BatchProcessor {
    /// Create a processor writing runs under `output_root`
    ///
    /// # Errors
    /// `InvalidParameter` if the config fails validation.
    pub fn new(config: SliceConfig, output_root: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            engine: SlicingEngine::new(config)?,
            separator: Arc::new(PassthroughSeparator::default()),
            output_root: output_root.into(),
            progress: None,
            cancel: None,
            write_previews: true,
        })
    }

    /// Replace the slicing engine (e.g. to use another transposer)
    pub fn with_engine(mut self, engine: SlicingEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_separator(mut self, separator: Arc<dyn StemSeparator>) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Flag checked before each stem starts
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn with_previews(mut self, enabled: bool) -> Self {
        self.write_previews = enabled;
        self
    }

    pub fn config(&self) -> &SliceConfig {
        self.engine.config()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Process a mix end to end
    ///
    /// # Errors
    /// Only whole-run failures: an invalid mix, a failed separation or an
    /// unwritable run directory. Per-stem failures are reported in
    /// [`BatchReport::stems`].
    pub fn run(&self, mix: &AudioBuffer) -> Result<BatchReport> {
        mix.validate()?;
        let started_at = Utc::now();

        let key = estimate_key(&mix.to_mono(), mix.sample_rate);
        let harmonic_recommendations = harmonic_recommendations_for(&key);
        log::info!("Estimated key: {} ({})", key, harmonic_recommendations);

        let stems = self.separator.separate(mix)?;

        let run_id = Uuid::new_v4();
        let run_dir = self.output_root.join(format!("run-{}", run_id));
        std::fs::create_dir_all(&run_dir)?;
        log::info!(
            "Run {}: {} stems via {} into {}",
            run_id,
            stems.len(),
            self.separator.name(),
            run_dir.display()
        );

        let total = stems.len();
        let completed = AtomicUsize::new(0);

        let reports: Vec<StemReport> = stems
            .par_iter()
            .map(|(stem_name, audio)| {
                let report = self.run_stem(stem_name, audio, &key, &run_dir);

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(callback) = &self.progress {
                    let message = match report.status {
                        StemStatus::Completed => format!("Processed {}", stem_name),
                        StemStatus::Failed => format!("Failed {}", stem_name),
                        StemStatus::Cancelled => format!("Skipped {}", stem_name),
                    };
                    callback(done as f64 / total as f64, &message);
                }
                report
            })
            .collect();

        let report = BatchReport {
            run_id,
            run_dir: run_dir.clone(),
            started_at,
            finished_at: Utc::now(),
            sample_rate: mix.sample_rate,
            duration_secs: mix.duration_secs(),
            key: key.to_string(),
            harmonic_recommendations,
            separator: self.separator.name().to_string(),
            config: self.engine.config().clone(),
            fx_chain: self.engine.fx_chain_json(),
            stems: reports,
        };
        report.write_json(&run_dir.join(REPORT_FILE_NAME))?;

        log::info!(
            "Run {} finished: {} WAV, {} MIDI, {} failed stems",
            run_id,
            report.wav_files().count(),
            report.midi_files().count(),
            report.failed_stems().len()
        );
        Ok(report)
    }

    /// Slice one stem; never fails, never panics
    fn run_stem(&self, stem_name: &str, audio: &AudioBuffer, key: &KeyLabel, run_dir: &Path) -> StemReport {
        if self.is_cancelled() {
            log::info!("Stem '{}' skipped: run cancelled", stem_name);
            let reason = LoopError::Cancelled {
                stem: stem_name.to_string(),
            };
            return StemReport::empty(stem_name, StemStatus::Cancelled, Some(reason.to_string()));
        }

        let stem_dir = run_dir.join(stem_name);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.engine.process_stem(stem_name, audio, key, &stem_dir)
        }));

        let result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(LoopError::StemFailed {
                    stem: stem_name.to_string(),
                    reason,
                })
            }
        };

        match result {
            Ok((slices, output)) => {
                let preview = if self.write_previews {
                    let path = stem_dir.join(preview_file_name(stem_name));
                    match write_waveform_preview(&slices.processed, &path) {
                        Ok(()) => Some(path),
                        Err(e) => {
                            log::warn!("Preview for '{}' skipped: {}", stem_name, e);
                            None
                        }
                    }
                } else {
                    None
                };

                StemReport {
                    stem_name: stem_name.to_string(),
                    status: StemStatus::Completed,
                    wav_files: output.wav_files,
                    midi_file: output.midi_file,
                    preview,
                    error: None,
                }
            }
            Err(e) => {
                log::warn!("Stem '{}' produced no output: {}", stem_name, e);
                discard_partial_output(&stem_dir);
                StemReport::empty(stem_name, StemStatus::Failed, Some(e.to_string()))
            }
        }
    }
}

/// Remove whatever a failed stem managed to write
fn discard_partial_output(stem_dir: &Path) {
    if !stem_dir.exists() {
        return;
    }
    match std::fs::remove_dir_all(stem_dir) {
        Ok(()) => log::debug!("Removed partial output in {}", stem_dir.display()),
        Err(e) => log::warn!(
            "Could not remove partial output in {}: {}",
            stem_dir.display(),
            e
        ),
    }
}
