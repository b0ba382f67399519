//! Second-order Butterworth sections
//!
//! Coefficients follow the Audio EQ Cookbook low/high-pass formulas with
//! Q = 1/sqrt(2), which is the bilinear-transform Butterworth response.
//! `FilterState` is the transposed direct form II memory, so a block can be
//! split anywhere and filtered piecewise with identical output.

use std::f64::consts::{FRAC_1_SQRT_2, PI};

use serde::{Deserialize, Serialize};

use crate::error::{LoopError, Result};

/// Response shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Remove above the cutoff
    LowPass,
    /// Remove below the cutoff
    HighPass,
}

/// Biquad filter coefficients
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    /// Pass-through section
    pub fn identity() -> Self {
        BiquadCoeffs {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }

    /// 2nd-order Butterworth low/high-pass
    ///
    /// # Errors
    /// `ProcessingError` if the cutoff is not strictly between 0 and Nyquist
    /// or the resulting coefficients are not finite.
    pub fn butterworth(kind: FilterKind, cutoff_hz: f64, sample_rate: f64) -> Result<Self> {
        let nyquist = sample_rate / 2.0;
        if !cutoff_hz.is_finite() || cutoff_hz <= 0.0 || cutoff_hz >= nyquist {
            return Err(LoopError::ProcessingError {
                reason: format!(
                    "cutoff {:.1} Hz outside (0, {:.1}) Hz",
                    cutoff_hz, nyquist
                ),
            });
        }

        let w0 = 2.0 * PI * cutoff_hz / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * FRAC_1_SQRT_2);

        let (b0, b1, b2) = match kind {
            FilterKind::LowPass => ((1.0 - cos_w0) / 2.0, 1.0 - cos_w0, (1.0 - cos_w0) / 2.0),
            FilterKind::HighPass => ((1.0 + cos_w0) / 2.0, -(1.0 + cos_w0), (1.0 + cos_w0) / 2.0),
        };
        let (a0, a1, a2) = (1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha);

        let coeffs = BiquadCoeffs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        };

        if coeffs.is_finite() {
            Ok(coeffs)
        } else {
            Err(LoopError::ProcessingError {
                reason: format!("non-finite coefficients at {:.1} Hz", cutoff_hz),
            })
        }
    }

    fn is_finite(&self) -> bool {
        [self.b0, self.b1, self.b2, self.a1, self.a2]
            .iter()
            .all(|c| c.is_finite())
    }
}

/// Two delay registers of one channel's section
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FilterState {
    z1: f64,
    z2: f64,
}

impl FilterState {
    /// Filter one sample and advance the state
    #[inline]
    pub fn process(&mut self, input: f64, coeffs: &BiquadCoeffs) -> f64 {
        let output = coeffs.b0 * input + self.z1;
        self.z1 = coeffs.b1 * input - coeffs.a1 * output + self.z2;
        self.z2 = coeffs.b2 * input - coeffs.a2 * output;
        output
    }

    /// Filter a block in place, carrying state across calls
    pub fn process_block(&mut self, samples: &mut [f32], coeffs: &BiquadCoeffs) {
        for sample in samples.iter_mut() {
            *sample = self.process(*sample as f64, coeffs) as f32;
        }
    }
}
