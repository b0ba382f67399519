//! Audio Buffer Management
//!
//! Provides the core audio buffer type shared by the analysis, FX and slicing
//! stages. Buffers keep the native sample rate of the decoded stem; nothing
//! is resampled on the way in.

use crate::error::{LoopError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Lowest sample rate accepted at the input boundary
pub const MIN_SAMPLE_RATE: u32 = 8_000;

/// Highest sample rate accepted at the input boundary
pub const MAX_SAMPLE_RATE: u32 = 192_000;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
///
/// # Arguments
/// * `db` - Value in decibels
///
/// # Returns
/// Linear amplitude, `10^(db/20)`
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// # Returns
/// Value in decibels. Returns -inf for zero input.
#[inline]
pub fn linear_to_db(linear: f64) -> f64 {
    if linear <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Peak absolute sample value across all channels (linear)
pub fn peak_amplitude(buffer: &AudioBuffer) -> f32 {
    buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| s.abs())
        .fold(0.0_f32, f32::max)
}

/// RMS level across all channels (linear)
pub fn rms_amplitude(buffer: &AudioBuffer) -> f32 {
    let total_samples = buffer.channels() * buffer.len();
    if total_samples == 0 {
        return 0.0;
    }

    let sum_squares: f64 = buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| (s as f64) * (s as f64))
        .sum();

    (sum_squares / total_samples as f64).sqrt() as f32
}

// ============================================================================
// Channel Layout
// ============================================================================

/// Audio channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelLayout {
    /// Single channel (mono)
    Mono,
    /// Two channels (stereo: left, right)
    #[default]
    Stereo,
}

impl ChannelLayout {
    /// Returns the number of channels for this layout
    pub fn num_channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    /// Create a ChannelLayout from a channel count
    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(ChannelLayout::Mono),
            2 => Some(ChannelLayout::Stereo),
            _ => None,
        }
    }
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Decoded audio for one stem or one fragment
///
/// Stores audio as non-interleaved 32-bit floating point samples, one
/// `Vec<f32>` per channel. Only mono and stereo are supported.
///
/// # Example
/// ```
/// use looparch::engine::buffer::{AudioBuffer, ChannelLayout};
///
/// let buffer = AudioBuffer::new(44_100, ChannelLayout::Stereo, 44_100);
/// assert_eq!(buffer.channels(), 2);
/// assert_eq!(buffer.len(), 44_100);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a silent buffer with the given length, layout and rate
    pub fn new(num_samples: usize, layout: ChannelLayout, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_samples]; layout.num_channels()],
            sample_rate,
        }
    }

    /// Wrap a single channel of samples
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: vec![samples],
            sample_rate,
        }
    }

    /// Build a buffer from per-channel vectors
    ///
    /// # Errors
    /// * `UnsupportedFormat` - channel count other than 1 or 2
    /// * `InvalidAudio` - channels of different lengths
    pub fn from_channels(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if ChannelLayout::from_count(channels.len()).is_none() {
            return Err(LoopError::UnsupportedFormat {
                format: format!("{}-channel audio (only mono/stereo supported)", channels.len()),
            });
        }

        let len = channels[0].len();
        if channels.iter().any(|ch| ch.len() != len) {
            return Err(LoopError::InvalidAudio {
                reason: "channels have different lengths".to_string(),
                source: None,
            });
        }

        Ok(Self {
            samples: channels,
            sample_rate,
        })
    }

    /// Create an audio buffer from interleaved sample data
    ///
    /// # Arguments
    /// * `interleaved` - Interleaved sample data (L, R, L, R, ... for stereo)
    /// * `layout` - Channel configuration
    /// * `sample_rate` - Sample rate in Hz
    pub fn from_interleaved(
        interleaved: &[f32],
        layout: ChannelLayout,
        sample_rate: u32,
    ) -> Result<Self> {
        let num_channels = layout.num_channels();

        if interleaved.len() % num_channels != 0 {
            return Err(LoopError::InvalidAudio {
                reason: format!(
                    "Interleaved data length {} is not divisible by channel count {}",
                    interleaved.len(),
                    num_channels
                ),
                source: None,
            });
        }

        let num_samples = interleaved.len() / num_channels;
        let mut samples = vec![Vec::with_capacity(num_samples); num_channels];

        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Convert the buffer to interleaved format
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut interleaved = Vec::with_capacity(self.channels() * self.len());

        for sample_idx in 0..self.len() {
            for channel in &self.samples {
                interleaved.push(channel[sample_idx]);
            }
        }

        interleaved
    }

    /// Get the number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Get the number of samples per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer is empty (no samples)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Get the channel layout
    pub fn channel_layout(&self) -> Option<ChannelLayout> {
        ChannelLayout::from_count(self.channels())
    }

    /// Get immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Get mutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.samples[index]
    }

    /// Average all channels into one
    pub fn to_mono(&self) -> Vec<f32> {
        match self.channels() {
            0 => Vec::new(),
            1 => self.samples[0].clone(),
            n => (0..self.len())
                .map(|i| self.samples.iter().map(|ch| ch[i]).sum::<f32>() / n as f32)
                .collect(),
        }
    }

    /// Duplicate a mono buffer into two identical channels
    ///
    /// Stereo buffers are left untouched.
    pub fn ensure_stereo(&mut self) {
        if self.channels() == 1 {
            let left = self.samples[0].clone();
            self.samples.push(left);
        }
    }

    /// Copy the half-open sample range `[start, end)` into a new buffer
    ///
    /// The range is clamped to the buffer length.
    pub fn slice(&self, start: usize, end: usize) -> AudioBuffer {
        let end = end.min(self.len());
        let start = start.min(end);
        AudioBuffer {
            samples: self
                .samples
                .iter()
                .map(|ch| ch[start..end].to_vec())
                .collect(),
            sample_rate: self.sample_rate,
        }
    }

    /// Check the buffer is usable as pipeline input
    ///
    /// # Errors
    /// * `EmptyAudio` - no samples
    /// * `UnsupportedFormat` - channel count or sample rate out of range
    /// * `InvalidAudio` - ragged channels or non-finite samples
    pub fn validate(&self) -> Result<()> {
        if self.channel_layout().is_none() {
            return Err(LoopError::UnsupportedFormat {
                format: format!("{}-channel audio (only mono/stereo supported)", self.channels()),
            });
        }

        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(LoopError::UnsupportedFormat {
                format: format!(
                    "{} Hz sample rate (supported {}-{} Hz)",
                    self.sample_rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
                ),
            });
        }

        let len = self.len();
        if self.samples.iter().any(|ch| ch.len() != len) {
            return Err(LoopError::InvalidAudio {
                reason: "channels have different lengths".to_string(),
                source: None,
            });
        }

        if len == 0 {
            return Err(LoopError::EmptyAudio);
        }

        if !self.is_finite() {
            return Err(LoopError::InvalidAudio {
                reason: "buffer contains NaN or infinite samples".to_string(),
                source: None,
            });
        }

        Ok(())
    }

    /// Check if all samples are finite (not NaN or Infinity)
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .all(|s| s.is_finite())
    }

    /// Clamp all samples to the valid range [-1.0, 1.0]
    pub fn clamp(&mut self) {
        for channel in &mut self.samples {
            for sample in channel.iter_mut() {
                *sample = sample.clamp(-1.0, 1.0);
            }
        }
    }

    /// Multiply every sample by a linear gain
    pub fn apply_linear_gain(&mut self, gain: f32) {
        for channel in &mut self.samples {
            for sample in channel.iter_mut() {
                *sample *= gain;
            }
        }
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::new(0, ChannelLayout::Stereo, 44_100)
    }
}

// ============================================================================
// Tests
// ============================================================================
