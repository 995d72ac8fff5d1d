//! Scripted in-memory encoder for pipeline tests

use crate::backend::{
    EncoderBackend, InputHandle, LockedBitstream, OutputHandle, PictureParams, PictureType,
    SubmitStatus,
};
use crate::config::{FieldMode, ReconfigureRequest};
use crate::error::BackendError;
use hwenc_video::FormatTag;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// What the encoder saw for one accepted picture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub frame_index: u64,
    pub timestamp: u64,
    pub picture_type: PictureType,
    pub field_mode: FieldMode,
    pub format: FormatTag,
    pub width: usize,
    pub height: usize,
    pub first_luma: u8,
}

#[derive(Default)]
struct MockState {
    need_more_input: HashMap<u64, u32>,
    busy: HashMap<u64, u32>,
    completion_delays: HashMap<u64, Duration>,
    fail_at: Option<(u64, BackendError)>,
    lock_failure: Option<BackendError>,
    outputs: HashMap<OutputHandle, LockedBitstream>,
    submissions: Vec<Submission>,
    reconfigures: Vec<ReconfigureRequest>,
    end_of_stream: bool,
}

#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
    next_handle: AtomicU64,
    live_inputs: AtomicUsize,
    live_outputs: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `NeedMoreInput` to the first `times` attempts at `frame_index`
    pub fn need_more_input(self, frame_index: u64, times: u32) -> Self {
        self.state.lock().need_more_input.insert(frame_index, times);
        self
    }

    /// Answer `Busy` to the first `times` attempts at `frame_index`
    pub fn busy(self, frame_index: u64, times: u32) -> Self {
        self.state.lock().busy.insert(frame_index, times);
        self
    }

    /// Signal the completion event of `frame_index` only after `delay`
    pub fn delay_completion(self, frame_index: u64, delay: Duration) -> Self {
        self.state.lock().completion_delays.insert(frame_index, delay);
        self
    }

    pub fn fail_at(self, frame_index: u64, err: BackendError) -> Self {
        self.state.lock().fail_at = Some((frame_index, err));
        self
    }

    /// Fail every `lock_bitstream` call with `err`
    pub fn fail_lock(self, err: BackendError) -> Self {
        self.state.lock().lock_failure = Some(err);
        self
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().submissions.clone()
    }

    pub fn picture_types(&self) -> Vec<PictureType> {
        self.submissions().iter().map(|s| s.picture_type).collect()
    }

    pub fn reconfigures(&self) -> Vec<ReconfigureRequest> {
        self.state.lock().reconfigures.clone()
    }

    pub fn saw_end_of_stream(&self) -> bool {
        self.state.lock().end_of_stream
    }

    /// Input surfaces and bitstream buffers not yet destroyed
    pub fn live_handles(&self) -> (usize, usize) {
        (
            self.live_inputs.load(Ordering::SeqCst),
            self.live_outputs.load(Ordering::SeqCst),
        )
    }

    fn handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }
}

impl EncoderBackend for MockBackend {
    fn create_input_surface(
        &self,
        _format: FormatTag,
        _width: usize,
        _height: usize,
    ) -> Result<InputHandle, BackendError> {
        self.live_inputs.fetch_add(1, Ordering::SeqCst);
        Ok(InputHandle(self.handle()))
    }

    fn create_bitstream_buffer(&self) -> Result<OutputHandle, BackendError> {
        self.live_outputs.fetch_add(1, Ordering::SeqCst);
        Ok(OutputHandle(self.handle()))
    }

    fn destroy_input_surface(&self, _handle: InputHandle) {
        self.live_inputs.fetch_sub(1, Ordering::SeqCst);
    }

    fn destroy_bitstream_buffer(&self, _handle: OutputHandle) {
        self.live_outputs.fetch_sub(1, Ordering::SeqCst);
    }

    fn reconfigure(&self, request: &ReconfigureRequest) -> Result<(), BackendError> {
        self.state.lock().reconfigures.push(*request);
        Ok(())
    }

    fn submit_picture(&self, picture: &PictureParams<'_>) -> Result<SubmitStatus, BackendError> {
        let mut state = self.state.lock();

        if let Some((frame_index, err)) = &state.fail_at {
            if *frame_index == picture.frame_index {
                return Err(err.clone());
            }
        }

        if let Some(remaining) = state.busy.get_mut(&picture.frame_index) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BackendError::Busy);
            }
        }

        if let Some(remaining) = state.need_more_input.get_mut(&picture.frame_index) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(SubmitStatus::NeedMoreInput);
            }
        }

        let first_luma = picture.frame.planes[0].first().copied().unwrap_or(0);
        let mut data = picture.frame_index.to_le_bytes().to_vec();
        data.push(first_luma);

        state.outputs.insert(
            picture.output,
            LockedBitstream {
                data,
                picture_type: picture.picture_type,
            },
        );
        state.submissions.push(Submission {
            frame_index: picture.frame_index,
            timestamp: picture.timestamp,
            picture_type: picture.picture_type,
            field_mode: picture.field_mode,
            format: picture.format(),
            width: picture.width(),
            height: picture.height(),
            first_luma,
        });

        if let Some(event) = &picture.completion {
            let delay = state
                .completion_delays
                .get(&picture.frame_index)
                .copied()
                .unwrap_or_default();
            if delay.is_zero() {
                event.signal();
            } else {
                let event = event.clone();
                thread::spawn(move || {
                    thread::sleep(delay);
                    event.signal();
                });
            }
        }

        Ok(SubmitStatus::Accepted)
    }

    fn lock_bitstream(&self, handle: OutputHandle) -> Result<LockedBitstream, BackendError> {
        let mut state = self.state.lock();
        if let Some(err) = &state.lock_failure {
            return Err(err.clone());
        }
        state
            .outputs
            .remove(&handle)
            .ok_or(BackendError::InvalidHandle(handle.0))
    }

    fn unlock_bitstream(&self, _handle: OutputHandle) -> Result<(), BackendError> {
        Ok(())
    }

    fn end_of_stream(&self) -> Result<(), BackendError> {
        self.state.lock().end_of_stream = true;
        Ok(())
    }
}
