//! Seam between the pipeline and a hardware encoder session
//!
//! A backend owns device-side resources addressed by opaque handles. The
//! pipeline creates a fixed set of input surfaces and bitstream buffers up
//! front, cycles them through its pools and destroys them on drop.

use crate::completion::CompletionEvent;
use crate::config::{FieldMode, ReconfigureRequest};
use crate::error::BackendError;
use hwenc_video::{FormatTag, PixelSurface};
use std::sync::Arc;

/// Device input surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputHandle(pub u64);

/// Device bitstream buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PictureType {
    /// Instantaneous decoder refresh; starts a GOP
    Idr,
    P,
    #[default]
    EncoderDecides,
}

/// One picture handed to the encoder
#[derive(Debug, Clone)]
pub struct PictureParams<'a> {
    pub input: InputHandle,
    pub output: OutputHandle,
    /// Converted staging contents backing `input`
    pub frame: PixelSurface<'a>,
    pub frame_index: u64,
    pub timestamp: u64,
    pub picture_type: PictureType,
    pub field_mode: FieldMode,
    /// Present in async mode; the backend signals it once `output` is ready
    pub completion: Option<Arc<CompletionEvent>>,
}

impl PictureParams<'_> {
    pub fn format(&self) -> FormatTag {
        self.frame.format
    }

    pub fn width(&self) -> usize {
        self.frame.width
    }

    pub fn height(&self) -> usize {
        self.frame.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    Accepted,
    /// Not a failure: resubmit the same frame
    NeedMoreInput,
}

/// Encoded bytes copied out of a locked bitstream buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedBitstream {
    pub data: Vec<u8>,
    /// `EncoderDecides` when the backend does not report the coded type
    pub picture_type: PictureType,
}

pub trait EncoderBackend: Send + Sync {
    fn create_input_surface(
        &self,
        format: FormatTag,
        width: usize,
        height: usize,
    ) -> Result<InputHandle, BackendError>;

    fn create_bitstream_buffer(&self) -> Result<OutputHandle, BackendError>;

    fn destroy_input_surface(&self, handle: InputHandle);

    fn destroy_bitstream_buffer(&self, handle: OutputHandle);

    fn reconfigure(&self, request: &ReconfigureRequest) -> Result<(), BackendError>;

    fn submit_picture(&self, picture: &PictureParams<'_>) -> Result<SubmitStatus, BackendError>;

    fn lock_bitstream(&self, handle: OutputHandle) -> Result<LockedBitstream, BackendError>;

    fn unlock_bitstream(&self, handle: OutputHandle) -> Result<(), BackendError>;

    /// Drain any pictures the encoder is still holding
    fn end_of_stream(&self) -> Result<(), BackendError>;
}
