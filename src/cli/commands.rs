//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::analysis::{estimate_key, harmonic_recommendations_for, CamelotCode};
use crate::engine::import_audio;
use crate::pipeline::preview::{preview_file_name, write_waveform_preview};
use crate::pipeline::{BatchProcessor, PackBuilder};
use crate::slicer::{SliceConfig, SlicingEngine};

/// Print the estimated key, its Camelot code and compatible keys.
pub fn analyze(input: &Path) -> Result<()> {
    info!("Analyzing: {}", input.display());

    let audio = import_audio(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let key = estimate_key(&audio.to_mono(), audio.sample_rate);

    println!("File:        {}", input.display());
    println!("Duration:    {:.2} s @ {} Hz", audio.duration_secs(), audio.sample_rate);
    println!("Key:         {}", key);
    match CamelotCode::for_key(&key) {
        Some(code) => println!("Camelot:     {}", code),
        None => println!("Camelot:     -"),
    }
    println!("Compatible:  {}", harmonic_recommendations_for(&key));

    Ok(())
}

/// Slice one stem file into `output`.
pub fn slice(input: &Path, stem: &str, output: &Path, config: SliceConfig) -> Result<()> {
    info!("Slicing stem '{}' from {}", stem, input.display());

    let audio = import_audio(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let key = estimate_key(&audio.to_mono(), audio.sample_rate);
    let engine = SlicingEngine::new(config).context("invalid slicing configuration")?;

    let (slices, written) = engine
        .process_stem(stem, &audio, &key, output)
        .with_context(|| format!("failed to slice stem '{}'", stem))?;

    let preview = output.join(preview_file_name(stem));
    if let Err(e) = write_waveform_preview(&slices.processed, &preview) {
        warn!("Preview skipped: {}", e);
    }

    println!("Key: {}", key);
    println!("Wrote {} files to {}:", written.file_count(), output.display());
    for path in written.wav_files.iter().chain(written.midi_file.iter()) {
        println!("  {}", path.display());
    }

    Ok(())
}

/// Run the full batch on a mix and assemble the pack.
pub fn pack(
    input: &Path,
    output: &Path,
    config: SliceConfig,
    keep_intermediate: bool,
    previews: bool,
) -> Result<()> {
    info!("Building pack from: {}", input.display());

    let mix = import_audio(input)
        .with_context(|| format!("failed to read {}", input.display()))?;

    let processor = BatchProcessor::new(config, output.join("runs"))
        .context("invalid slicing configuration")?
        .with_previews(previews)
        .with_progress(Arc::new(|fraction: f64, message: &str| {
            info!("[{:>3.0}%] {}", fraction * 100.0, message);
        }));

    let report = processor.run(&mix).context("batch processing failed")?;
    for stem in report.stems.iter().filter(|s| s.error.is_some()) {
        warn!(
            "Stem '{}': {}",
            stem.stem_name,
            stem.error.as_deref().unwrap_or_default()
        );
    }

    let mut builder = PackBuilder::new(output);
    if keep_intermediate {
        builder = builder.keep_intermediate();
    }
    let summary = builder.build(&report).context("failed to build pack")?;

    println!("Pack:  {}", summary.root.display());
    println!("Key:   {} ({})", report.key, report.harmonic_recommendations);
    println!(
        "Files: {} WAV, {} MIDI, {} previews",
        summary.wav_files.len(),
        summary.midi_files.len(),
        summary.previews.len()
    );
    let failed = report.failed_stems();
    if !failed.is_empty() {
        println!("Failed stems: {}", failed.join(", "));
    }

    Ok(())
}
