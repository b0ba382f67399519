//! Slicing engine
//!
//! Turns one stem into fragments:
//! 1. Validate the buffer and run the clip-level FX stages once
//! 2. Cut tempo-aligned loops, or one-shots between detected onsets
//! 3. Shape each fragment's edges
//! 4. Optionally transcribe the melody of melodic stems (loop mode only)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::config::SliceConfig;
use super::fragment::{midi_file_name, Fragment, FragmentKind, RenderedFragment};
use crate::analysis::key::KeyLabel;
use crate::analysis::onset::detect_onsets;
use crate::analysis::pitch::extract_melody;
use crate::dsp::chain::FxChain;
use crate::dsp::pitch_shift::{PhaseVocoderTransposer, Transposer};
use crate::engine::{export_audio, AudioBuffer, ExportFormat};
use crate::error::Result;
use crate::midi::{write_midi_file, NoteEvent};

// ============================================================================
// Constants
// ============================================================================

/// Loops cut per stem at most
pub const MAX_LOOPS_PER_STEM: usize = 16;

/// Onset pairs considered per stem at most
pub const MAX_ONE_SHOTS_PER_STEM: usize = 40;

/// One-shots shorter than this are treated as noise
pub const MIN_ONE_SHOT_SAMPLES: usize = 100;

/// Stems whose content is transcribed to MIDI
pub const MELODIC_STEMS: [&str; 5] = ["vocals", "bass", "guitar", "piano", "other"];

/// Whether a stem carries pitched material worth transcribing
pub fn is_melodic_stem(stem_name: &str) -> bool {
    MELODIC_STEMS
        .iter()
        .any(|name| name.eq_ignore_ascii_case(stem_name))
}

// ============================================================================
// Results
// ============================================================================

/// Everything produced from one stem, held in memory
#[derive(Debug, Clone)]
pub struct StemSlices {
    pub stem_name: String,
    /// Key as written in file names
    pub key_tag: String,
    pub fragments: Vec<RenderedFragment>,
    /// Transcribed notes, when a non-empty melody was found
    pub melody: Option<Vec<NoteEvent>>,
    /// The stem after the clip-level FX stages
    pub processed: AudioBuffer,
}

/// Files written for one stem
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StemOutput {
    pub stem_name: String,
    pub wav_files: Vec<PathBuf>,
    pub midi_file: Option<PathBuf>,
}

impl StemOutput {
    pub fn file_count(&self) -> usize {
        self.wav_files.len() + usize::from(self.midi_file.is_some())
    }
}

// ============================================================================
// Slicing Engine
// ============================================================================

/// Slices stems according to a validated [`SliceConfig`]
#[derive(Clone)]
pub struct SlicingEngine {
    config: SliceConfig,
    transposer: Arc<dyn Transposer>,
}

impl std::fmt::Debug for SlicingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlicingEngine")
            .field("config", &self.config)
            .field("transposer", &self.transposer.name())
            .finish()
    }
}

impl SlicingEngine {
    /// Create an engine with the phase-vocoder transposer
    ///
    /// # Errors
    /// `InvalidParameter` if the config fails validation.
    pub fn new(config: SliceConfig) -> Result<Self> {
        Self::with_transposer(config, Arc::new(PhaseVocoderTransposer::default()))
    }

    /// Create an engine with a custom transposer
    pub fn with_transposer(config: SliceConfig, transposer: Arc<dyn Transposer>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, transposer })
    }

    pub fn config(&self) -> &SliceConfig {
        &self.config
    }

    /// The FX chain this engine applies, with every stage's parameters
    pub fn fx_chain_json(&self) -> serde_json::Value {
        FxChain::new(&self.config.fx_settings(), Arc::clone(&self.transposer)).to_json()
    }

    /// Sample ranges of the loops cut from a clip of `len` samples
    ///
    /// Loops are back to back from sample 0; a trailing partial loop is
    /// dropped and at most 16 are returned.
    pub fn plan_loops(&self, len: usize, sample_rate: u32) -> Vec<(usize, usize)> {
        let loop_len = match self.config.loop_duration_samples(sample_rate) {
            Some(n) if n > 0 => n,
            _ => return Vec::new(),
        };
        let count = (len / loop_len).min(MAX_LOOPS_PER_STEM);
        (0..count)
            .map(|i| (i * loop_len, (i + 1) * loop_len))
            .collect()
    }

    /// Ordinal and sample range of each one-shot in a mono clip
    ///
    /// The end of the clip acts as a final onset. Ordinals count onset
    /// pairs, so a pair dropped as noise leaves a gap.
    pub fn plan_one_shots(&self, mono: &[f32], sample_rate: u32) -> Vec<(usize, usize, usize)> {
        let mut onsets = detect_onsets(mono, sample_rate, self.config.one_shot_sensitivity);
        onsets.push(mono.len());

        onsets
            .windows(2)
            .take(MAX_ONE_SHOTS_PER_STEM)
            .enumerate()
            .filter(|(_, pair)| pair[1].saturating_sub(pair[0]) >= MIN_ONE_SHOT_SAMPLES)
            .map(|(i, pair)| (i + 1, pair[0], pair[1]))
            .collect()
    }

    /// Process one stem in memory
    ///
    /// # Errors
    /// Input validation errors for an empty or malformed buffer. Numeric
    /// trouble inside the FX stages is recovered and never returned.
    pub fn slice_stem(
        &self,
        stem_name: &str,
        audio: &AudioBuffer,
        key: &KeyLabel,
    ) -> Result<StemSlices> {
        audio.validate()?;

        let sample_rate = audio.sample_rate;
        let key_tag = key.file_tag(self.config.transpose_semitones);
        let bpm_tag = self.config.bpm_tag();

        let mut chain = FxChain::new(&self.config.fx_settings(), Arc::clone(&self.transposer));
        let mut processed = audio.clone();
        chain.process_clip(&mut processed);

        let make_fragment = |index: usize, kind: FragmentKind, start: usize, end: usize| Fragment {
            index,
            kind,
            start_sample: start,
            end_sample: end,
            stem_name: stem_name.to_string(),
            key_tag: key_tag.clone(),
            bpm_tag,
        };

        let mut fragments = Vec::new();
        let mut melody = None;

        match self.config.loop_type.bars() {
            Some(bars) => {
                for (i, (start, end)) in self
                    .plan_loops(processed.len(), sample_rate)
                    .into_iter()
                    .enumerate()
                {
                    let mut clip = processed.slice(start, end);
                    chain.finish_loop(&mut clip);
                    fragments.push(RenderedFragment {
                        fragment: make_fragment(i + 1, FragmentKind::Loop { bars }, start, end),
                        audio: clip,
                    });
                }

                if self.config.include_midi && is_melodic_stem(stem_name) {
                    let notes = extract_melody(&processed.to_mono(), sample_rate);
                    if !notes.is_empty() {
                        melody = Some(notes);
                    }
                }
            }
            None => {
                let mono = processed.to_mono();
                for (ordinal, start, end) in self.plan_one_shots(&mono, sample_rate) {
                    let mut clip = processed.slice(start, end);
                    chain.finish_one_shot(&mut clip);
                    fragments.push(RenderedFragment {
                        fragment: make_fragment(ordinal, FragmentKind::OneShot, start, end),
                        audio: clip,
                    });
                }
            }
        }

        log::info!(
            "Stem '{}': {} fragments, {} melody notes",
            stem_name,
            fragments.len(),
            melody.as_ref().map_or(0, |notes: &Vec<NoteEvent>| notes.len())
        );

        Ok(StemSlices {
            stem_name: stem_name.to_string(),
            key_tag,
            fragments,
            melody,
            processed,
        })
    }

    /// Write a stem's fragments (16-bit WAV) and melody (MIDI) into `dir`
    pub fn write_stem(&self, slices: &StemSlices, dir: &Path) -> Result<StemOutput> {
        std::fs::create_dir_all(dir)?;

        let mut output = StemOutput {
            stem_name: slices.stem_name.clone(),
            ..StemOutput::default()
        };

        for rendered in &slices.fragments {
            let path = dir.join(rendered.fragment.file_name());
            export_audio(&rendered.audio, &path, ExportFormat::pcm16())?;
            output.wav_files.push(path);
        }

        if let Some(notes) = &slices.melody {
            let path = dir.join(midi_file_name(
                &slices.stem_name,
                &slices.key_tag,
                self.config.bpm_tag(),
            ));
            // An unencodable melody drops the .mid file, not the stem
            match write_midi_file(notes, self.config.bpm, &path) {
                Ok(()) => output.midi_file = Some(path),
                Err(e) => {
                    log::warn!("MIDI for stem '{}' skipped: {}", slices.stem_name, e);
                    if path.exists() {
                        std::fs::remove_file(&path)?;
                    }
                }
            }
        }

        log::debug!(
            "Wrote {} files for stem '{}' to {}",
            output.file_count(),
            slices.stem_name,
            dir.display()
        );
        Ok(output)
    }

    /// Slice one stem and write its files
    pub fn process_stem(
        &self,
        stem_name: &str,
        audio: &AudioBuffer,
        key: &KeyLabel,
        dir: &Path,
    ) -> Result<(StemSlices, StemOutput)> {
        let slices = self.slice_stem(stem_name, audio, key)?;
        let output = self.write_stem(&slices, dir)?;
        Ok((slices, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::key::{Mode, PitchClass};
    use crate::engine::io::{generate_stereo_test_tone, generate_test_tone};
    use crate::error::LoopError;
    use crate::slicer::config::{LoopType, TimeSignature};
    use std::f64::consts::PI;
    use tempfile::tempdir;
    use test_case::test_case;

    fn engine(config: SliceConfig) -> SlicingEngine {
        SlicingEngine::new(config).unwrap()
    }

    fn c_major() -> KeyLabel {
        KeyLabel::new(PitchClass::C, Mode::Major)
    }

    fn bursts(starts: &[usize], len: usize, sample_rate: u32) -> Vec<f32> {
        let mut signal = vec![0.0_f32; len];
        let burst_len = sample_rate as usize / 5;
        for &start in starts {
            for i in 0..burst_len.min(len - start) {
                let t = i as f64 / sample_rate as f64;
                let env = (-t * 25.0).exp();
                signal[start + i] += (0.8 * env * (2.0 * PI * 880.0 * t).sin()) as f32;
            }
        }
        signal
    }

    #[test_case(120.0, LoopType::FourBar, 10.0, 1 ; "ten seconds of four bars")]
    #[test_case(120.0, LoopType::OneBar, 10.0, 5 ; "one bar loops")]
    #[test_case(120.0, LoopType::OneBar, 60.0, 16 ; "capped at sixteen")]
    #[test_case(120.0, LoopType::FourBar, 7.9, 0 ; "shorter than a loop")]
    #[test_case(95.0, LoopType::TwoBar, 30.0, 5 ; "odd tempo")]
    fn test_plan_loops_count(bpm: f64, loop_type: LoopType, secs: f64, expected: usize) {
        let sr = 44_100;
        let config = SliceConfig {
            bpm,
            loop_type,
            ..SliceConfig::default()
        };
        let len = (secs * sr as f64) as usize;
        let plan = engine(config).plan_loops(len, sr);
        assert_eq!(plan.len(), expected);
        for pair in plan.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
    }

    #[test]
    fn test_three_four_loop_length() {
        let config = SliceConfig {
            time_signature: TimeSignature::ThreeFour,
            loop_type: LoopType::OneBar,
            ..SliceConfig::default()
        };
        let plan = engine(config).plan_loops(200_000, 44_100);
        assert_eq!(plan[0], (0, 66_150));
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn test_end_to_end_four_bar_loop() {
        let sr = 44_100;
        let audio = generate_stereo_test_tone(220.0, 220.0, 10.0, sr);
        let slices = engine(SliceConfig::default())
            .slice_stem("drums", &audio, &c_major())
            .unwrap();

        assert_eq!(slices.fragments.len(), 1);
        let first = &slices.fragments[0];
        assert_eq!(first.fragment.file_name(), "drums_4Bar_001_CMaj_120BPM.wav");
        assert_eq!(first.audio.len(), 352_800);
        assert_eq!(first.audio.channels(), 2);
        assert_eq!(first.audio.channel(0)[0], 0.0);
        assert!(slices.melody.is_none());
    }

    #[test]
    fn test_transposed_key_tag() {
        let config = SliceConfig {
            transpose_semitones: 2,
            loop_type: LoopType::OneBar,
            include_midi: false,
            ..SliceConfig::default()
        };
        let audio = generate_test_tone(220.0, 2.5, 22_050);
        let slices = engine(config).slice_stem("bass", &audio, &c_major()).unwrap();
        assert_eq!(slices.fragments.len(), 1);
        assert_eq!(slices.fragments[0].fragment.key_tag, "DMajShift");
        assert!(slices.melody.is_none());
    }

    #[test]
    fn test_melodic_stem_gets_melody() {
        let config = SliceConfig {
            loop_type: LoopType::OneBar,
            ..SliceConfig::default()
        };
        let audio = generate_test_tone(440.0, 2.5, 22_050);
        let slices = engine(config).slice_stem("piano", &audio, &c_major()).unwrap();

        let melody = slices.melody.expect("piano should be transcribed");
        assert!(!melody.is_empty());
        assert!(melody.iter().all(|n| n.midi_pitch == 69));
    }

    #[test]
    fn test_drums_get_no_melody() {
        let config = SliceConfig {
            loop_type: LoopType::OneBar,
            ..SliceConfig::default()
        };
        let audio = generate_test_tone(440.0, 2.5, 22_050);
        let slices = engine(config).slice_stem("drums", &audio, &c_major()).unwrap();
        assert!(slices.melody.is_none());
    }

    #[test]
    fn test_one_shots_follow_onsets() {
        let sr = 22_050;
        let audio = AudioBuffer::from_mono(bursts(&[11_025, 22_050, 33_075], 44_100, sr), sr);
        let config = SliceConfig {
            loop_type: LoopType::OneShot,
            ..SliceConfig::default()
        };
        let slices = engine(config).slice_stem("drums", &audio, &c_major()).unwrap();

        let count = slices.fragments.len();
        assert!((3..=6).contains(&count), "{} one-shots", count);
        assert!(slices.melody.is_none());

        let ordinals: Vec<usize> = slices.fragments.iter().map(|r| r.fragment.index).collect();
        assert!(ordinals.windows(2).all(|w| w[0] < w[1]), "{:?}", ordinals);

        for rendered in &slices.fragments {
            assert!(rendered.fragment.len() >= MIN_ONE_SHOT_SAMPLES);
            assert_eq!(rendered.audio.len(), rendered.fragment.len());
            assert_eq!(*rendered.audio.channel(0).last().unwrap(), 0.0);
            assert!(rendered.fragment.file_name().contains("_OneShot_"));
        }
        let last = &slices.fragments[count - 1].fragment;
        assert_eq!(last.end_sample, 44_100);
    }

    #[test]
    fn test_one_shots_of_silence_is_empty() {
        let sr = 22_050;
        let audio = AudioBuffer::from_mono(vec![0.0; 5000], sr);
        let config = SliceConfig {
            loop_type: LoopType::OneShot,
            ..SliceConfig::default()
        };
        let plan = engine(config).plan_one_shots(audio.channel(0), sr);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_empty_audio_is_rejected() {
        let audio = AudioBuffer::from_mono(Vec::new(), 44_100);
        let result = engine(SliceConfig::default()).slice_stem("drums", &audio, &c_major());
        assert!(matches!(result, Err(LoopError::EmptyAudio)));
    }

    #[test]
    fn test_invalid_config_rejected_up_front() {
        let config = SliceConfig {
            bpm: -1.0,
            ..SliceConfig::default()
        };
        assert!(SlicingEngine::new(config).is_err());
    }

    #[test]
    fn test_write_stem_files() {
        let dir = tempdir().unwrap();
        let config = SliceConfig {
            loop_type: LoopType::OneBar,
            ..SliceConfig::default()
        };
        let audio = generate_test_tone(440.0, 4.5, 22_050);
        let (_, output) = engine(config)
            .process_stem("vocals", &audio, &c_major(), dir.path())
            .unwrap();

        assert_eq!(output.wav_files.len(), 2);
        for path in &output.wav_files {
            assert!(path.exists());
        }
        let midi = output.midi_file.as_ref().expect("vocals should produce MIDI");
        assert!(midi.ends_with("vocals_MELODY_CMaj_120BPM.mid"));
        assert_eq!(&std::fs::read(midi).unwrap()[..4], b"MThd");
        assert_eq!(output.file_count(), 3);
    }

    #[test]
    fn test_very_slow_tempo_still_writes_midi() {
        // One 4/4 bar at 3 BPM lasts 80 s
        let dir = tempdir().unwrap();
        let config = SliceConfig {
            bpm: 3.0,
            loop_type: LoopType::OneBar,
            ..SliceConfig::default()
        };
        let audio = generate_test_tone(440.0, 81.0, 8_000);
        let (_, output) = engine(config)
            .process_stem("vocals", &audio, &c_major(), dir.path())
            .unwrap();

        assert_eq!(output.wav_files.len(), 1);
        assert!(output.wav_files[0].ends_with("vocals_1Bar_001_CMaj_3BPM.wav"));
        let midi = output.midi_file.as_ref().expect("vocals should produce MIDI");
        assert!(midi.ends_with("vocals_MELODY_CMaj_3BPM.mid"));
        let bytes = std::fs::read(midi).unwrap();
        assert_eq!(&bytes[26..29], &[0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_fx_chain_json_follows_config() {
        let config = SliceConfig {
            transpose_semitones: -3,
            ..SliceConfig::default()
        };
        let json = engine(config).fx_chain_json();
        let transpose = &json["clip"]["effects"][0];
        assert_eq!(transpose["type"], "transpose");
        assert_eq!(transpose["enabled"], true);
    }

    #[test]
    fn test_melodic_stem_names() {
        assert!(is_melodic_stem("vocals"));
        assert!(is_melodic_stem("Piano"));
        assert!(!is_melodic_stem("drums"));
    }
}
