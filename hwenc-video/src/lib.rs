//! Frame preparation for hardware video encoders
//!
//! Converts raw frames between chroma-subsampled layouts and float RGB into
//! the buffer layouts encoders accept.
//!
//! Key pieces:
//! - Capability detection that queries the CPU once and hands out plain values
//! - Format predicates classifying every layout tag
//! - Conversion kernels in scalar, SSE4.1 and AVX2 tiers with identical output
//! - Dispatch that picks the widest tier the buffers qualify for
//! - Cache-line aligned frames that qualify for every tier

pub mod capabilities;
pub mod color_matrix;
pub mod dispatch;
pub mod error;
pub mod format_conversion;
pub mod format_predicates;
pub mod frame_buffer;
pub mod types;

pub use capabilities::*;
pub use color_matrix::*;
pub use dispatch::*;
pub use error::*;
pub use format_conversion::{
    convert, convert_with_tier, prepare, ConversionKind, KernelFn, KernelParams,
};
pub use frame_buffer::*;
pub use types::*;
