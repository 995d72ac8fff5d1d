//! Conversion error types

use crate::capabilities::Tier;
use crate::dispatch::Disqualification;
use crate::types::FormatTag;
use thiserror::Error;

/// Errors reported before any kernel runs
///
/// Kernels themselves never fail; everything here is caught while validating
/// the surfaces or resolving the conversion pair.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    /// No kernel converts between these layouts
    #[error("Unsupported conversion: {src:?} -> {dst:?}")]
    UnsupportedConversion { src: FormatTag, dst: FormatTag },

    /// Source and destination disagree on image size
    #[error("Dimension mismatch: {src_width}x{src_height} vs {dst_width}x{dst_height}")]
    DimensionMismatch {
        src_width: usize,
        src_height: usize,
        dst_width: usize,
        dst_height: usize,
    },

    #[error("Empty surface: {width}x{height}")]
    EmptySurface { width: usize, height: usize },

    #[error("Plane {plane} stride {stride} is smaller than its row size {row_bytes}")]
    StrideTooSmall {
        plane: usize,
        stride: usize,
        row_bytes: usize,
    },

    #[error("Plane {plane} holds {len} bytes, geometry needs {needed}")]
    PlaneTooSmall {
        plane: usize,
        len: usize,
        needed: usize,
    },

    /// Plane size arithmetic does not fit in `usize`
    #[error("Plane {plane} geometry overflows: {width}x{height} with stride {stride}")]
    GeometryOverflow {
        plane: usize,
        width: usize,
        height: usize,
        stride: usize,
    },

    /// The requested tier is not available on this CPU
    #[error("{tier:?} tier is not supported by this CPU")]
    TierUnavailable { tier: Tier },

    /// The requested tier cannot run on these buffers
    #[error("{tier:?} tier cannot run on these buffers: {reason}")]
    TierIneligible { tier: Tier, reason: Disqualification },

    /// Frame allocation size overflowed
    #[error("Frame {width}x{height} of {format:?} is too large to allocate")]
    FrameTooLarge {
        format: FormatTag,
        width: usize,
        height: usize,
    },
}
