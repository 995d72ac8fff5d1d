//! Frame submission pipeline for hardware video encoders
//!
//! Converts each source frame into an encoder-owned input surface, submits
//! it and drains the encoded bitstream on a dedicated worker thread.
//!
//! Key pieces:
//! - `EncoderBackend` trait at the seam to the vendor encoder API
//! - Fixed FIFO pools of input surfaces and bitstream buffers
//! - Sync and async completion, drained strictly in submission order
//! - Local retry of `NeedMoreInput`, sticky abort on fatal errors

pub mod backend;
pub mod completion;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod sink;
pub mod slot_pool;
mod worker;

#[cfg(test)]
mod mock;

pub use backend::*;
pub use completion::CompletionEvent;
pub use config::*;
pub use error::*;
pub use pipeline::{EncodePipeline, FrameState, PipelineStats};
pub use sink::*;
pub use slot_pool::{InputSurfaceSlot, OutputBitstreamSlot, PoolStats, SlotPool};
