//! Error handling for looparch
//!
//! Every error carries a stable code and recovery suggestions so the CLI and
//! batch report can surface something actionable.

use thiserror::Error;

/// Result type alias for looparch operations
pub type Result<T> = std::result::Result<T, LoopError>;

/// Main error type for looparch operations
#[derive(Error, Debug)]
pub enum LoopError {
    // File Errors
    #[error("File not found: {path}")]
    FileNotFound {
        path: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Invalid audio: {reason}")]
    InvalidAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Audio contains no samples")]
    EmptyAudio,

    // Parameter Errors
    #[error("Invalid parameter '{param}': got {value}, expected {expected}")]
    InvalidParameter {
        param: String,
        value: String,
        expected: String,
    },

    // Processing Errors
    #[error("Processing error: {reason}")]
    ProcessingError { reason: String },

    #[error("MIDI encoding error: {reason}")]
    MidiEncoding { reason: String },

    #[error("Stem '{stem}' failed: {reason}")]
    StemFailed { stem: String, reason: String },

    #[error("Run cancelled before stem '{stem}'")]
    Cancelled { stem: String },

    #[error("Pack build failed: {reason}")]
    PackError { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LoopError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            LoopError::FileNotFound { .. } => "FILE_NOT_FOUND",
            LoopError::InvalidAudio { .. } => "INVALID_AUDIO",
            LoopError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            LoopError::EmptyAudio => "EMPTY_AUDIO",
            LoopError::InvalidParameter { .. } => "INVALID_PARAMETER",
            LoopError::ProcessingError { .. } => "PROCESSING_ERROR",
            LoopError::MidiEncoding { .. } => "MIDI_ENCODING",
            LoopError::StemFailed { .. } => "STEM_FAILED",
            LoopError::Cancelled { .. } => "CANCELLED",
            LoopError::PackError { .. } => "PACK_ERROR",
            LoopError::Io(_) => "IO_ERROR",
            LoopError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors affect a single stem or a single request; the
    /// remaining work in a batch can continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LoopError::StemFailed { .. }
                | LoopError::MidiEncoding { .. }
                | LoopError::ProcessingError { .. }
                | LoopError::InvalidParameter { .. }
                | LoopError::Cancelled { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            LoopError::FileNotFound { .. } => vec![
                "Check the file path is correct",
                "Verify the file hasn't been moved or deleted",
            ],
            LoopError::InvalidAudio { .. } => vec![
                "Try converting the file to WAV format first",
                "Check if the file plays in another application",
            ],
            LoopError::UnsupportedFormat { .. } => vec![
                "Convert to a mono or stereo WAV file",
                "Supported sample formats: 8/16/24/32-bit integer, 32-bit float",
            ],
            LoopError::EmptyAudio => vec!["Provide a stem with at least one sample"],
            LoopError::InvalidParameter { .. } => vec![
                "Check the parameter against its documented range",
                "Remove the field from the config file to use the default",
            ],
            LoopError::ProcessingError { .. } => vec!["Try less extreme FX settings"],
            LoopError::MidiEncoding { .. } => vec![
                "Check the tempo is within 4-999 BPM",
                "Disable MIDI generation with include_midi = false",
            ],
            LoopError::StemFailed { .. } => vec![
                "Other stems were still processed",
                "Re-run with --verbose to see the failing stage",
            ],
            LoopError::Cancelled { .. } => vec!["Re-run the batch to process the remaining stems"],
            LoopError::PackError { .. } => vec![
                "Intermediate files were kept in the run directory",
                "Check free disk space and write permissions",
            ],
            LoopError::Io(_) => vec![
                "Check file permissions",
                "Verify the output directory exists",
            ],
            LoopError::Serialization(_) => vec!["Check the config file is valid JSON"],
        }
    }

    /// Build an `InvalidParameter` error
    pub fn invalid_param(
        param: impl Into<String>,
        value: impl ToString,
        expected: impl Into<String>,
    ) -> Self {
        LoopError::InvalidParameter {
            param: param.into(),
            value: value.to_string(),
            expected: expected.into(),
        }
    }
}

impl From<hound::Error> for LoopError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(io) => LoopError::Io(io),
            other => LoopError::InvalidAudio {
                reason: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(LoopError::EmptyAudio.error_code(), "EMPTY_AUDIO");
        assert_eq!(
            LoopError::invalid_param("bpm", -1.0, "> 0").error_code(),
            "INVALID_PARAMETER"
        );
    }

    #[test]
    fn test_invalid_param_message() {
        let err = LoopError::invalid_param("crossfade_ms", 80, "0-50 ms");
        assert_eq!(
            err.to_string(),
            "Invalid parameter 'crossfade_ms': got 80, expected 0-50 ms"
        );
    }

    #[test]
    fn test_stem_failures_are_recoverable() {
        let err = LoopError::StemFailed {
            stem: "bass".to_string(),
            reason: "boom".to_string(),
        };
        assert!(err.is_recoverable());
        assert!(!LoopError::EmptyAudio.is_recoverable());
    }

    #[test]
    fn test_every_error_has_suggestions() {
        let errors = vec![
            LoopError::EmptyAudio,
            LoopError::PackError {
                reason: "x".to_string(),
            },
            LoopError::Io(std::io::Error::new(std::io::ErrorKind::Other, "x")),
        ];
        for err in errors {
            assert!(!err.recovery_suggestions().is_empty(), "{:?}", err);
        }
    }

    #[test]
    fn test_hound_io_error_maps_to_io() {
        let err: LoopError =
            hound::Error::IoError(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")).into();
        assert_eq!(err.error_code(), "IO_ERROR");
    }
}
