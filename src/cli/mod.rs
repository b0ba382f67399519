//! CLI Module
//!
//! Command-line interface for the Loop Architect slicer.

pub mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::dsp::ModulationRate;
use crate::slicer::{FilterMode, LoopType, SliceConfig, TimeSignature};

/// Loop Architect - turn a song into a sample pack
#[derive(Parser, Debug)]
#[command(name = "looparch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Estimate the key of a WAV file and suggest compatible keys
    #[command(name = "analyze")]
    Analyze {
        /// Input WAV file
        input: PathBuf,
    },

    /// Slice a single stem into loops or one-shots
    #[command(name = "slice")]
    Slice {
        /// Stem WAV file
        input: PathBuf,

        /// Stem name used in output file names (e.g. drums, vocals)
        #[arg(long)]
        stem: String,

        /// Output directory
        #[arg(short, long, default_value = "looparch-out")]
        output: PathBuf,

        #[command(flatten)]
        options: ConfigArgs,
    },

    /// Process a full mix and build a sample pack
    #[command(name = "pack")]
    Pack {
        /// Mix WAV file
        input: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "looparch-out")]
        output: PathBuf,

        /// Keep the per-run working directory
        #[arg(long)]
        keep_intermediate: bool,

        /// Skip waveform previews
        #[arg(long)]
        no_previews: bool,

        #[command(flatten)]
        options: ConfigArgs,
    },
}

/// Slicing options; flags override values from `--config`
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Tempo in beats per minute
    #[arg(long)]
    pub bpm: Option<f64>,

    /// 1-bar, 2-bar, 4-bar or one-shot
    #[arg(long)]
    pub loop_type: Option<LoopType>,

    /// 4/4 or 3/4
    #[arg(long)]
    pub time_signature: Option<TimeSignature>,

    /// Pitch shift in semitones (-12..=12)
    #[arg(long, allow_negative_numbers = true)]
    pub transpose: Option<i32>,

    /// none, low-pass or high-pass
    #[arg(long)]
    pub filter: Option<FilterMode>,

    /// 1/2, 1/4, 1/8 or 1/16
    #[arg(long)]
    pub modulation_rate: Option<ModulationRate>,

    /// Pack folder name
    #[arg(long)]
    pub pack_name: Option<String>,

    /// Skip MIDI melody extraction
    #[arg(long)]
    pub no_midi: bool,
}

impl ConfigArgs {
    /// Load the config file (or defaults) and apply flag overrides
    pub fn resolve(&self) -> crate::error::Result<SliceConfig> {
        let mut config = match &self.config {
            Some(path) => SliceConfig::from_json_file(path)?,
            None => SliceConfig::default(),
        };

        if let Some(bpm) = self.bpm {
            config.bpm = bpm;
        }
        if let Some(loop_type) = self.loop_type {
            config.loop_type = loop_type;
        }
        if let Some(time_signature) = self.time_signature {
            config.time_signature = time_signature;
        }
        if let Some(semitones) = self.transpose {
            config.transpose_semitones = semitones;
        }
        if let Some(filter) = self.filter {
            config.filter_mode = filter;
        }
        if let Some(rate) = self.modulation_rate {
            config.modulation_rate = rate;
        }
        if let Some(name) = &self.pack_name {
            config.pack_name = name.clone();
        }
        if self.no_midi {
            config.include_midi = false;
        }

        config.validate()?;
        Ok(config)
    }
}
