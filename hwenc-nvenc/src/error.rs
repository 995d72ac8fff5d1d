//! Error types for the submission pipeline

use hwenc_video::{ConvertError, FormatTag};
use std::time::Duration;
use thiserror::Error;

/// Status reported by an encoder backend call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("Encoder device lost")]
    DeviceLost,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Encoder out of memory")]
    OutOfMemory,

    #[error("Unsupported by encoder: {0}")]
    Unsupported(String),

    #[error("Invalid handle {0}")]
    InvalidHandle(u64),

    /// Encoder temporarily unable to accept work
    #[error("Encoder busy")]
    Busy,

    #[error("Encoder error {code}: {message}")]
    Other { code: i32, message: String },
}

impl BackendError {
    /// Worth retrying the same call after a short wait
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Busy)
    }

    pub fn is_fatal(&self) -> bool {
        !self.is_transient()
    }
}

/// Rejected pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Zero frame dimension {width}x{height}")]
    ZeroDimension { width: usize, height: usize },

    #[error("Frame {width}x{height} exceeds maximum {max_width}x{max_height}")]
    ExceedsMaximum {
        width: usize,
        height: usize,
        max_width: usize,
        max_height: usize,
    },

    #[error("{format:?} needs even dimensions, got {width}x{height}")]
    OddDimensions {
        format: FormatTag,
        width: usize,
        height: usize,
    },

    #[error("GOP length must be non-zero")]
    ZeroGopLength,

    #[error("Slot pool size must be non-zero")]
    ZeroPoolSize,

    #[error("No conversion writes buffer format {0:?}")]
    UnsupportedBufferFormat(FormatTag),

    #[error("Bitrate must be non-zero")]
    ZeroBitrate,
}

/// Output side failure
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sink receiver disconnected")]
    Disconnected,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Conversion error: {0}")]
    Convert(#[from] ConvertError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("No free {pool} slot after {timeout:?}")]
    SlotTimeout {
        pool: &'static str,
        timeout: Duration,
    },

    #[error("Frame {frame_index} not completed after {timeout:?}")]
    CompletionTimeout { frame_index: u64, timeout: Duration },

    #[error("Frame {frame_index} not accepted after {attempts} attempts")]
    SubmitRetriesExhausted { frame_index: u64, attempts: u32 },

    #[error("Source {width}x{height} does not match session {expected_width}x{expected_height}")]
    FrameSizeMismatch {
        width: usize,
        height: usize,
        expected_width: usize,
        expected_height: usize,
    },

    #[error("Pipeline already flushed")]
    Flushed,

    #[error("Pipeline aborted: {reason}")]
    Aborted { reason: String },

    #[error("Drain worker unavailable")]
    WorkerUnavailable,

    #[error("Failed to spawn drain worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

impl PipelineError {
    /// Ends the stream; later calls report `Aborted`
    pub fn is_fatal(&self) -> bool {
        match self {
            PipelineError::Backend(err) => err.is_fatal(),
            PipelineError::Sink(_)
            | PipelineError::CompletionTimeout { .. }
            | PipelineError::Aborted { .. }
            | PipelineError::WorkerUnavailable => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_classification() {
        assert!(BackendError::Busy.is_transient());
        assert!(BackendError::DeviceLost.is_fatal());
        assert!(BackendError::InvalidParameter("qp".into()).is_fatal());
    }

    #[test]
    fn test_pipeline_classification() {
        assert!(PipelineError::from(BackendError::DeviceLost).is_fatal());
        assert!(!PipelineError::from(BackendError::Busy).is_fatal());
        assert!(!PipelineError::from(ConfigError::ZeroGopLength).is_fatal());
        assert!(!PipelineError::SlotTimeout {
            pool: "input",
            timeout: Duration::from_millis(5)
        }
        .is_fatal());
        assert!(!PipelineError::Flushed.is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = PipelineError::from(ConvertError::EmptySurface {
            width: 0,
            height: 4,
        });
        assert!(err.to_string().starts_with("Conversion error"));
        assert_eq!(
            PipelineError::Aborted {
                reason: "Encoder device lost".into()
            }
            .to_string(),
            "Pipeline aborted: Encoder device lost"
        );
    }
}
