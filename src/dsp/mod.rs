//! DSP stages of the fragment FX chain
//!
//! Every stage implements the `Effect` trait for uniform processing.

pub mod biquad;
pub mod chain;
pub mod effect;
pub mod fade;
pub mod filter_mod;
pub mod lfo;
pub mod modulation;
pub mod normalize;
pub mod pitch_shift;

pub use biquad::{BiquadCoeffs, FilterKind, FilterState};
pub use chain::{EffectChain, FxChain, FxSettings, StagePosition};
pub use effect::{Effect, EffectParams};
pub use fade::{apply_crossfade, apply_envelope, apply_fade_out, Crossfade, OneShotEnvelope};
pub use filter_mod::FilterModulation;
pub use lfo::{ModulationRate, SineLfo};
pub use modulation::PanLevelModulation;
pub use normalize::PeakNormalizer;
pub use pitch_shift::{PhaseVocoderTransposer, Transpose, Transposer};
