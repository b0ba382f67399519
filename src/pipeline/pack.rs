//! Sample pack assembly
//!
//! Gathers a batch run's output into a distributable folder:
//!
//! ```text
//! <pack_name>/
//!   WAV/        loops and one-shots
//!   MIDI/       melodic transcriptions
//!   Previews/   waveform images
//!   README.md
//!   metadata.txt
//! ```
//!
//! A pack is a plain folder; archiving it is left to the caller. Building
//! replaces any earlier pack of the same name, so the folder always matches
//! its `metadata.txt`.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use super::batch::BatchReport;
use crate::error::{LoopError, Result};

pub const WAV_DIR: &str = "WAV";
pub const MIDI_DIR: &str = "MIDI";
pub const PREVIEWS_DIR: &str = "Previews";
pub const README_FILE: &str = "README.md";
pub const METADATA_FILE: &str = "metadata.txt";

/// One file placed in the pack
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackFile {
    /// Path relative to the pack root, e.g. `WAV/drums_4Bar_001_CMaj_120BPM.wav`
    pub relative_path: PathBuf,
    pub sha256: String,
    pub size_bytes: u64,
}

/// A finished pack on disk
#[derive(Debug, Clone, Serialize)]
pub struct PackSummary {
    pub root: PathBuf,
    pub created_at: DateTime<Utc>,
    pub wav_files: Vec<PackFile>,
    pub midi_files: Vec<PackFile>,
    pub previews: Vec<PackFile>,
}

impl PackSummary {
    pub fn file_count(&self) -> usize {
        self.wav_files.len() + self.midi_files.len() + self.previews.len()
    }

    pub fn readme_path(&self) -> PathBuf {
        self.root.join(README_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }
}

/// SHA-256 of a file as lower-case hex
pub fn sha256_file(path: &Path) -> Result<String> {
    let content = fs::read(path)?;
    let hash = Sha256::digest(&content);
    Ok(format!("{:x}", hash))
}

/// Every regular file under `root`, sorted
pub fn list_pack_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.path().to_path_buf())
        .collect();
    files.sort();
    files
}

/// Builds a pack from a [`BatchReport`]
#[derive(Debug, Clone)]
pub struct PackBuilder {
    output_dir: PathBuf,
    remove_intermediate: bool,
}

impl PackBuilder {
    /// Packs are created as `<output_dir>/<pack_name>`
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            remove_intermediate: true,
        }
    }

    /// Keep the per-run directory after a successful build
    pub fn keep_intermediate(mut self) -> Self {
        self.remove_intermediate = false;
        self
    }

    /// Assemble the pack
    ///
    /// An existing folder at the pack root is replaced. The run directory
    /// is removed only after every pack file has been written and the
    /// folder has been checked against the file list.
    ///
    /// # Errors
    /// `PackError` if the run produced no WAV fragments, if the run
    /// directory lies inside the pack root, or if the finished folder does
    /// not match its file list. `Io` on any copy or write failure.
    pub fn build(&self, report: &BatchReport) -> Result<PackSummary> {
        if report.wav_files().next().is_none() {
            return Err(LoopError::PackError {
                reason: "batch run produced no audio fragments".to_string(),
            });
        }

        let root = self.output_dir.join(&report.config.pack_name);
        if report.run_dir.starts_with(&root) {
            return Err(LoopError::PackError {
                reason: format!(
                    "run directory {} is inside the pack root {}",
                    report.run_dir.display(),
                    root.display()
                ),
            });
        }
        if root.exists() {
            log::info!("Replacing existing pack at {}", root.display());
            fs::remove_dir_all(&root)?;
        }
        let created_at = Utc::now();

        let wav_files = copy_into(&root, WAV_DIR, report.wav_files())?;
        let midi_files = copy_into(&root, MIDI_DIR, report.midi_files())?;
        let previews = copy_into(&root, PREVIEWS_DIR, report.previews())?;

        let summary = PackSummary {
            root,
            created_at,
            wav_files,
            midi_files,
            previews,
        };

        fs::write(summary.readme_path(), render_readme(report))?;
        fs::write(summary.metadata_path(), render_metadata(report, &summary))?;
        verify_pack(&summary)?;

        log::info!(
            "Pack '{}' built at {} ({} files)",
            report.config.pack_name,
            summary.root.display(),
            summary.file_count()
        );

        if self.remove_intermediate && report.run_dir.exists() {
            fs::remove_dir_all(&report.run_dir)?;
            log::debug!("Removed intermediate files in {}", report.run_dir.display());
        }

        Ok(summary)
    }
}

/// Check that the pack folder holds exactly the listed files
fn verify_pack(summary: &PackSummary) -> Result<()> {
    let on_disk: BTreeSet<PathBuf> = list_pack_files(&summary.root)
        .into_iter()
        .filter_map(|path| {
            path.strip_prefix(&summary.root)
                .ok()
                .map(Path::to_path_buf)
        })
        .collect();

    let expected: BTreeSet<PathBuf> = summary
        .wav_files
        .iter()
        .chain(&summary.midi_files)
        .chain(&summary.previews)
        .map(|file| file.relative_path.clone())
        .chain([PathBuf::from(README_FILE), PathBuf::from(METADATA_FILE)])
        .collect();

    if on_disk != expected {
        let missing: Vec<String> = expected
            .difference(&on_disk)
            .map(|p| p.display().to_string())
            .collect();
        let unexpected: Vec<String> = on_disk
            .difference(&expected)
            .map(|p| p.display().to_string())
            .collect();
        return Err(LoopError::PackError {
            reason: format!(
                "pack folder does not match its file list (missing: [{}], unexpected: [{}])",
                missing.join(", "),
                unexpected.join(", ")
            ),
        });
    }
    Ok(())
}

fn copy_into<'a>(
    root: &Path,
    folder: &str,
    sources: impl Iterator<Item = &'a PathBuf>,
) -> Result<Vec<PackFile>> {
    let dir = root.join(folder);
    fs::create_dir_all(&dir)?;

    let mut files = Vec::new();
    for source in sources {
        let file_name = source.file_name().ok_or_else(|| LoopError::PackError {
            reason: format!("not a file path: {}", source.display()),
        })?;
        let dest = dir.join(file_name);
        let size_bytes = fs::copy(source, &dest)?;

        files.push(PackFile {
            relative_path: Path::new(folder).join(file_name),
            sha256: sha256_file(&dest)?,
            size_bytes,
        });
    }
    Ok(files)
}

fn render_readme(report: &BatchReport) -> String {
    let config = &report.config;
    let mut content = format!(
        "# {name}

## Pack Information

- **BPM**: {bpm}
- **Key**: {key}
- **Time Signature**: {ts}
- **Harmonic Recommendations**: {recs}

## Contents

### WAV Folder
Sliced audio loops and one-shots, 16-bit PCM.

### MIDI Folder
Melodies transcribed from melodic stems.

### Previews Folder
Waveform images of each processed stem.

## Usage

1. Drag and drop WAV files into your DAW project
2. Import MIDI files and assign them to instruments

File names carry the BPM and key of every fragment.

---

Generated by Loop Architect
",
        name = config.pack_name,
        bpm = config.bpm_tag(),
        key = report.key,
        ts = config.time_signature,
        recs = report.harmonic_recommendations,
    );

    if let Some(artist) = &config.artist_name {
        content.push_str(&format!("\nArtist: {}\n", artist));
    }
    if let Some(description) = &config.description {
        content.push_str(&format!("\nDescription: {}\n", description));
    }
    content
}

fn render_metadata(report: &BatchReport, summary: &PackSummary) -> String {
    let config = &report.config;
    let filter = match config.filter_mode.kind() {
        Some(_) => format!(
            "{} ({} Hz, depth {} Hz)",
            config.filter_mode, config.filter_base_hz, config.filter_depth_hz
        ),
        None => config.filter_mode.to_string(),
    };

    let mut content = String::new();
    content.push_str("Loop Architect Pack Metadata\n");
    content.push_str("=============================\n");
    content.push('\n');
    content.push_str(&format!("Pack Name: {}\n", config.pack_name));
    content.push_str(&format!("Created: {}\n", summary.created_at.to_rfc3339()));
    content.push_str(&format!("BPM: {}\n", config.bpm_tag()));
    content.push_str(&format!("Key: {}\n", report.key));
    content.push_str(&format!("Time Signature: {}\n", config.time_signature));
    content.push_str(&format!("Harmonic Recommendations: {}\n", report.harmonic_recommendations));
    content.push('\n');
    content.push_str("Configuration:\n");
    content.push_str(&format!("- Separation: {}\n", report.separator));
    content.push_str(&format!("- Loop Type: {}\n", config.loop_type));
    content.push_str(&format!("- Transpose: {} semitones\n", config.transpose_semitones));
    content.push_str(&format!("- Normalization: {} dBFS\n", config.target_peak_dbfs));
    content.push_str(&format!("- Crossfade: {} ms\n", config.crossfade_ms));
    content.push_str(&format!("- Filter: {}\n", filter));
    content.push_str(&format!("- Modulation Rate: {}\n", config.modulation_rate));
    content.push('\n');
    content.push_str("FX Chain:\n");
    for stage in report.fx_chain["clip"]["effects"].as_array().into_iter().flatten() {
        let state = if stage["enabled"].as_bool().unwrap_or(false) {
            "on"
        } else {
            "off"
        };
        let name = stage["name"].as_str().unwrap_or("unnamed");
        content.push_str(&format!("- {}: {}\n", name, state));
    }
    content.push('\n');
    content.push_str("Generated Files:\n");
    content.push_str(&format!("- WAV Files: {}\n", summary.wav_files.len()));
    content.push_str(&format!("- MIDI Files: {}\n", summary.midi_files.len()));
    content.push_str(&format!("- Previews: {}\n", summary.previews.len()));
    content.push_str(&format!("- Stems: {}\n", report.stems.len()));

    let failed = report.failed_stems();
    if !failed.is_empty() {
        content.push_str(&format!("- Failed Stems: {}\n", failed.join(", ")));
    }

    content.push('\n');
    content.push_str("Checksums (SHA-256):\n");
    for file in summary
        .wav_files
        .iter()
        .chain(&summary.midi_files)
        .chain(&summary.previews)
    {
        content.push_str(&format!("{}  {}\n", file.sha256, file.relative_path.display()));
    }

    if let Some(artist) = &config.artist_name {
        content.push_str(&format!("\nArtist: {}", artist));
    }
    if let Some(description) = &config.description {
        content.push_str(&format!("\nDescription: {}", description));
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::generate_stereo_test_tone;
    use crate::engine::AudioBuffer;
    use crate::pipeline::batch::BatchProcessor;
    use crate::pipeline::separation::{PassthroughSeparator, StemKind, StemSeparator};
    use crate::slicer::{LoopType, SliceConfig};
    use std::sync::Arc;
    use tempfile::tempdir;

    struct SilentFailureSeparator;

    impl StemSeparator for SilentFailureSeparator {
        fn separate(&self, mix: &AudioBuffer) -> Result<Vec<(String, AudioBuffer)>> {
            Ok(vec![(
                "drums".to_string(),
                AudioBuffer::from_mono(Vec::new(), mix.sample_rate),
            )])
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn config() -> SliceConfig {
        SliceConfig {
            loop_type: LoopType::OneBar,
            pack_name: "Test_Pack".to_string(),
            artist_name: Some("Nobody".to_string()),
            ..SliceConfig::default()
        }
    }

    fn run(work: &Path, stems: Vec<StemKind>) -> BatchReport {
        let mix = generate_stereo_test_tone(440.0, 440.0, 2.5, 22_050);
        BatchProcessor::new(config(), work)
            .unwrap()
            .with_separator(Arc::new(PassthroughSeparator::new(stems)))
            .run(&mix)
            .unwrap()
    }

    #[test]
    fn test_pack_layout() {
        let work = tempdir().unwrap();
        let out = tempdir().unwrap();
        let report = run(work.path(), vec![StemKind::Drums, StemKind::Piano]);

        let summary = PackBuilder::new(out.path()).build(&report).unwrap();

        assert_eq!(summary.root, out.path().join("Test_Pack"));
        assert_eq!(summary.wav_files.len(), 2);
        assert_eq!(summary.midi_files.len(), 1);
        assert_eq!(summary.previews.len(), 2);
        assert!(summary
            .wav_files
            .iter()
            .all(|f| f.relative_path.starts_with(WAV_DIR) && summary.root.join(&f.relative_path).exists()));
        assert!(summary.readme_path().exists());

        let readme = fs::read_to_string(summary.readme_path()).unwrap();
        assert!(readme.starts_with("# Test_Pack"));
        assert!(readme.contains("**BPM**: 120"));
        assert!(readme.contains("Artist: Nobody"));
    }

    #[test]
    fn test_metadata_checksums_match_files() {
        let work = tempdir().unwrap();
        let out = tempdir().unwrap();
        let report = run(work.path(), vec![StemKind::Bass]);
        let summary = PackBuilder::new(out.path()).build(&report).unwrap();

        let metadata = fs::read_to_string(summary.metadata_path()).unwrap();
        assert!(metadata.starts_with("Loop Architect Pack Metadata"));
        assert!(metadata.contains("Time Signature: 4/4"));
        assert!(metadata.contains("- Loop Type: 1-bar"));

        for file in summary.wav_files.iter().chain(&summary.midi_files) {
            let on_disk = sha256_file(&summary.root.join(&file.relative_path)).unwrap();
            assert_eq!(on_disk, file.sha256);
            assert_eq!(file.sha256.len(), 64);
            assert!(metadata.contains(&format!(
                "{}  {}",
                file.sha256,
                file.relative_path.display()
            )));
        }
    }

    #[test]
    fn test_intermediate_removed_after_success() {
        let work = tempdir().unwrap();
        let out = tempdir().unwrap();
        let report = run(work.path(), vec![StemKind::Drums]);
        assert!(report.run_dir.exists());

        PackBuilder::new(out.path()).build(&report).unwrap();
        assert!(!report.run_dir.exists());
    }

    #[test]
    fn test_keep_intermediate() {
        let work = tempdir().unwrap();
        let out = tempdir().unwrap();
        let report = run(work.path(), vec![StemKind::Drums]);

        PackBuilder::new(out.path())
            .keep_intermediate()
            .build(&report)
            .unwrap();
        assert!(report.run_dir.exists());
    }

    #[test]
    fn test_empty_run_is_rejected_and_kept() {
        let work = tempdir().unwrap();
        let out = tempdir().unwrap();
        let mix = generate_stereo_test_tone(440.0, 440.0, 2.5, 22_050);
        let report = BatchProcessor::new(config(), work.path())
            .unwrap()
            .with_separator(Arc::new(SilentFailureSeparator))
            .run(&mix)
            .unwrap();

        let result = PackBuilder::new(out.path()).build(&report);
        assert!(matches!(result, Err(LoopError::PackError { .. })));
        assert!(report.run_dir.exists());
        assert!(list_pack_files(out.path()).is_empty());
    }

    #[test]
    fn test_rebuild_replaces_stale_files() {
        let out = tempdir().unwrap();

        let work = tempdir().unwrap();
        let first = run(work.path(), vec![StemKind::Drums, StemKind::Piano]);
        let stale = PackBuilder::new(out.path()).build(&first).unwrap();
        fs::write(stale.root.join(WAV_DIR).join("leftover.wav"), b"old").unwrap();

        let work = tempdir().unwrap();
        let second = run(work.path(), vec![StemKind::Drums]);
        let summary = PackBuilder::new(out.path()).build(&second).unwrap();

        let on_disk = list_pack_files(&summary.root);
        assert_eq!(on_disk.len(), summary.file_count() + 2);
        assert!(!summary.root.join(WAV_DIR).join("leftover.wav").exists());
        assert!(list_pack_files(&summary.root.join(MIDI_DIR)).is_empty());
        let metadata = fs::read_to_string(summary.metadata_path()).unwrap();
        assert!(metadata.contains("- WAV Files: 1"));
    }

    #[test]
    fn test_run_dir_inside_pack_root_is_rejected() {
        let out = tempdir().unwrap();
        let report = run(&out.path().join("Test_Pack").join("runs"), vec![StemKind::Drums]);

        let result = PackBuilder::new(out.path()).build(&report);
        assert!(matches!(result, Err(LoopError::PackError { .. })));
        assert!(report.run_dir.exists());
    }

    #[test]
    fn test_metadata_lists_fx_chain() {
        let work = tempdir().unwrap();
        let out = tempdir().unwrap();
        let report = run(work.path(), vec![StemKind::Drums]);
        let summary = PackBuilder::new(out.path()).build(&report).unwrap();

        let metadata = fs::read_to_string(summary.metadata_path()).unwrap();
        assert!(metadata.contains("FX Chain:\n- Transpose: off\n"));
        assert!(metadata.contains("- Peak Normalize: on\n"));
    }

    #[test]
    fn test_list_pack_files_is_sorted() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b").join("x.wav"), b"x").unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let files = list_pack_files(dir.path());
        assert_eq!(files, vec![dir.path().join("a.txt"), dir.path().join("b").join("x.wav")]);
    }

    #[test]
    fn test_sha256_of_known_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
