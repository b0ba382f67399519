//! FX chain management
//!
//! Stages run in a fixed order (index 0 first):
//! 1. Transpose
//! 2. Filter modulation
//! 3. Pan / level modulation
//! 4. Peak normalization
//! 5. Edge shaping: crossfade for loops, envelope + fade-out for one-shots
//!
//! Stages 1-4 run once over a whole stem clip. Edge shaping runs on every
//! fragment cut from it, so LFO phase is continuous across fragments.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::biquad::FilterKind;
use super::effect::Effect;
use super::fade::{Crossfade, OneShotEnvelope};
use super::filter_mod::FilterModulation;
use super::lfo::ModulationRate;
use super::modulation::PanLevelModulation;
use super::normalize::PeakNormalizer;
use super::pitch_shift::{Transpose, Transposer};
use crate::engine::AudioBuffer;

/// Order priority of chain stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StagePosition {
    Transpose = 0,
    FilterModulation = 1,
    PanLevel = 2,
    Normalize = 3,
    EdgeShape = 4,
}

impl StagePosition {
    /// Get the position for an effect type
    pub fn for_effect_type(effect_type: &str) -> Self {
        match effect_type {
            "transpose" => StagePosition::Transpose,
            "filter_modulation" => StagePosition::FilterModulation,
            "pan_level_modulation" => StagePosition::PanLevel,
            "peak_normalize" => StagePosition::Normalize,
            _ => StagePosition::EdgeShape,
        }
    }
}

/// Ordered chain of stages
#[derive(Clone, Default)]
pub struct EffectChain {
    effects: Vec<Box<dyn Effect>>,
}

impl EffectChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an effect at its fixed position
    pub fn add(&mut self, effect: Box<dyn Effect>) {
        let position = self.insert_index(effect.effect_type());
        self.effects.insert(position, effect);
    }

    /// Run every enabled stage in order
    pub fn process(&mut self, buffer: &mut AudioBuffer) {
        for effect in &mut self.effects {
            if effect.is_enabled() {
                effect.process(buffer);
            }
        }
    }

    /// Iterate over effects
    pub fn iter(&self) -> impl Iterator<Item = &dyn Effect> {
        self.effects.iter().map(|e| e.as_ref())
    }

    fn insert_index(&self, effect_type: &str) -> usize {
        let priority = StagePosition::for_effect_type(effect_type);
        self.effects
            .iter()
            .position(|e| StagePosition::for_effect_type(e.effect_type()) > priority)
            .unwrap_or(self.effects.len())
    }

    /// Serialize chain state to JSON
    pub fn to_json(&self) -> serde_json::Value {
        let effects: Vec<serde_json::Value> = self
            .iter()
            .map(|e| {
                serde_json::json!({
                    "type": e.effect_type(),
                    "name": e.display_name(),
                    "enabled": e.is_enabled(),
                    "params": e.get_params(),
                })
            })
            .collect();
        serde_json::json!({ "effects": effects })
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Parameters of every stage, in user-facing units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxSettings {
    pub bpm: f64,
    pub transpose_semitones: i32,
    pub filter: Option<FilterKind>,
    pub filter_base_hz: f64,
    pub filter_depth_hz: f64,
    pub modulation_rate: ModulationRate,
    /// Percent, 0..=100
    pub pan_depth_pct: f64,
    /// Percent, 0..=100
    pub level_depth_pct: f64,
    /// 0 disables normalization
    pub target_peak_dbfs: f64,
    pub crossfade_ms: f64,
    pub attack_gain_db: f64,
    pub sustain_gain_db: f64,
}

impl Default for FxSettings {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            transpose_semitones: 0,
            filter: None,
            filter_base_hz: 5000.0,
            filter_depth_hz: 0.0,
            modulation_rate: ModulationRate::Quarter,
            pan_depth_pct: 0.0,
            level_depth_pct: 0.0,
            target_peak_dbfs: -1.0,
            crossfade_ms: 10.0,
            attack_gain_db: 0.0,
            sustain_gain_db: 0.0,
        }
    }
}

// ============================================================================
// FX Chain
// ============================================================================

/// Clip stages plus the two fragment edge shapers
#[derive(Clone)]
pub struct FxChain {
    clip: EffectChain,
    loop_edges: Crossfade,
    one_shot_edges: OneShotEnvelope,
}

impl FxChain {
    /// Build the chain; stages that would not change the signal are disabled
    pub fn new(settings: &FxSettings, transposer: Arc<dyn Transposer>) -> Self {
        let mut clip = EffectChain::new();

        let mut transpose = Transpose::new(settings.transpose_semitones, transposer);
        transpose.set_enabled(settings.transpose_semitones != 0);
        clip.add(Box::new(transpose));

        if let Some(kind) = settings.filter {
            clip.add(Box::new(FilterModulation::new(
                kind,
                settings.filter_base_hz,
                settings.filter_depth_hz,
                settings.modulation_rate,
                settings.bpm,
            )));
        }

        let mut pan_level = PanLevelModulation::from_percent(
            settings.pan_depth_pct,
            settings.level_depth_pct,
            settings.modulation_rate,
            settings.bpm,
        );
        pan_level.set_enabled(pan_level.is_active());
        clip.add(Box::new(pan_level));

        let mut normalizer = PeakNormalizer::new(settings.target_peak_dbfs);
        normalizer.set_enabled(normalizer.is_active());
        clip.add(Box::new(normalizer));

        let mut loop_edges = Crossfade::new(settings.crossfade_ms);
        loop_edges.set_enabled(settings.crossfade_ms > 0.0);

        Self {
            clip,
            loop_edges,
            one_shot_edges: OneShotEnvelope::new(settings.attack_gain_db, settings.sustain_gain_db),
        }
    }

    /// Transpose, filter, pan/level and normalize a whole clip
    pub fn process_clip(&mut self, buffer: &mut AudioBuffer) {
        self.clip.process(buffer);
    }

    /// Crossfade one loop fragment
    pub fn finish_loop(&mut self, fragment: &mut AudioBuffer) {
        if self.loop_edges.is_enabled() {
            self.loop_edges.process(fragment);
        }
    }

    /// Envelope and fade out one one-shot fragment
    pub fn finish_one_shot(&mut self, fragment: &mut AudioBuffer) {
        self.one_shot_edges.process(fragment);
    }

    /// Every stage with its parameters, as recorded in run reports
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "clip": self.clip.to_json(),
            "loop_edges": self.loop_edges.get_params(),
            "one_shot_edges": self.one_shot_edges.get_params(),
        })
    }
}
