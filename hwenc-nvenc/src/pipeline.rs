//! Frame submission pipeline
//!
//! One caller thread submits, one drain worker completes. Each frame moves
//! through `Queued -> Converting -> Submitted -> Completed -> Released`:
//! a free input and output slot are taken from their pools, the source is
//! converted into the input slot's staging frame, the pair is handed to the
//! encoder and queued to the worker, and the worker returns both slots once
//! the bitstream has been copied out.

use crate::backend::{EncoderBackend, PictureParams, PictureType, SubmitStatus};
use crate::completion::CompletionEvent;
use crate::config::{EncodeFrameConfig, PipelineConfig, ReconfigureRequest};
use crate::error::PipelineError;
use crate::sink::BitstreamSink;
use crate::slot_pool::{InputSurfaceSlot, OutputBitstreamSlot, PoolStats, SlotPool};
use crate::worker::{DrainWorker, PendingFrame, Shared, WorkItem};
use crossbeam::channel::{self, Sender};
use hwenc_video::{convert, AlignedFrame, ConversionCapabilities, Tier};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Lifecycle of one submitted frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Queued,
    Converting,
    Submitted,
    Completed,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub submitted: u64,
    pub completed: u64,
    pub need_more_input_retries: u64,
    pub in_flight: usize,
    pub input_pool: PoolStats,
    pub output_pool: PoolStats,
}

pub struct EncodePipeline {
    config: PipelineConfig,
    caps: ConversionCapabilities,
    backend: Arc<dyn EncoderBackend>,
    input_pool: SlotPool<InputSurfaceSlot>,
    output_pool: SlotPool<OutputBitstreamSlot>,
    shared: Arc<Shared>,

    // Thread control
    work_tx: Option<Sender<WorkItem>>,
    worker: Option<JoinHandle<()>>,

    frame_index: u64,
    width: usize,
    height: usize,
    last_tier: Option<Tier>,
    /// Set by a reconfigure, cleared once a frame is accepted
    pending_idr: bool,
    flushed: bool,
}

impl EncodePipeline {
    /// Create encoder resources and start the drain worker
    pub fn new(
        config: PipelineConfig,
        backend: Arc<dyn EncoderBackend>,
        sink: Box<dyn BitstreamSink>,
    ) -> Result<Self, PipelineError> {
        Self::with_capabilities(config, ConversionCapabilities::detect(), backend, sink)
    }

    /// As `new`, converting with a restricted set of kernel tiers
    pub fn with_capabilities(
        config: PipelineConfig,
        caps: ConversionCapabilities,
        backend: Arc<dyn EncoderBackend>,
        sink: Box<dyn BitstreamSink>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let (inputs, outputs) = create_slots(&config, backend.as_ref())?;
        let input_pool = SlotPool::new("input", inputs);
        let output_pool = SlotPool::new("output", outputs);
        let shared = Arc::new(Shared::default());

        let (work_tx, work_rx) = channel::unbounded();
        let worker = DrainWorker {
            backend: backend.clone(),
            sink,
            input_pool: input_pool.clone(),
            output_pool: output_pool.clone(),
            shared: shared.clone(),
            async_mode: config.async_mode,
            completion_timeout: config.completion_timeout,
            core: config.worker_core,
            failed: false,
        };

        let worker = match worker.spawn(work_rx) {
            Ok(handle) => handle,
            Err(err) => {
                destroy_slots(backend.as_ref(), &input_pool, &output_pool);
                return Err(err);
            }
        };

        log::info!(
            "Encode pipeline started: {}x{} {:?}, {} slots, {} mode",
            config.width,
            config.height,
            config.buffer_format,
            config.pool_size,
            if config.async_mode { "async" } else { "sync" }
        );

        Ok(EncodePipeline {
            config,
            caps,
            backend,
            input_pool,
            output_pool,
            shared,
            work_tx: Some(work_tx),
            worker: Some(worker),
            frame_index: 0,
            width: config.width,
            height: config.height,
            last_tier: None,
            pending_idr: false,
            flushed: false,
        })
    }

    /// Convert one frame into a free input slot and hand it to the encoder
    ///
    /// Blocks while a slot pool is empty, up to `slot_timeout` if set. A
    /// `NeedMoreInput` or busy answer resubmits the same frame without
    /// advancing the frame index. Fatal backend errors abort the stream.
    pub fn submit(&mut self, frame: EncodeFrameConfig<'_>) -> Result<(), PipelineError> {
        self.check_open()?;

        let request = frame.reconfigure.filter(|r| !r.is_empty());
        if let Some(request) = &request {
            request.validate(&self.config)?;
        }

        // The source must already match the resolution it brings
        let (expected_width, expected_height) = request
            .and_then(|r| r.resolution)
            .unwrap_or((self.width, self.height));

        let source = &frame.source;
        if source.width != expected_width || source.height != expected_height {
            return Err(PipelineError::FrameSizeMismatch {
                width: source.width,
                height: source.height,
                expected_width,
                expected_height,
            });
        }

        if let Some(request) = request {
            self.apply_reconfigure(&request)?;
            self.pending_idr = true;
        }

        let mut input = self.input_pool.acquire(self.config.slot_timeout)?;
        let output = match self.output_pool.acquire(self.config.slot_timeout) {
            Ok(output) => output,
            Err(err) => {
                self.input_pool.release(input);
                return Err(err);
            }
        };
        self.trace(FrameState::Queued);

        let picture_type = self.picture_type(frame.force_idr || self.pending_idr);
        if let Err(err) = self.encode(&frame, &mut input, &output, picture_type) {
            self.input_pool.release(input);
            self.output_pool.release(output);
            if err.is_fatal() {
                log::error!("Frame {} aborted the stream: {}", self.frame_index, err);
                self.shared.abort(err.to_string());
            }
            return Err(err);
        }

        let pending = PendingFrame {
            frame_index: self.frame_index,
            timestamp: frame.timestamp,
            picture_type,
            input,
            output,
        };
        self.frame_index += 1;
        self.pending_idr = false;
        self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        self.shared.in_flight.fetch_add(1, Ordering::AcqRel);

        self.queue(pending)
    }

    /// Signal end of stream and wait until every submitted frame has drained
    ///
    /// Later submissions fail with `Flushed`. Flushing twice is a no-op.
    pub fn flush(&mut self) -> Result<(), PipelineError> {
        if self.flushed {
            return Ok(());
        }
        let tx = self.work_tx.as_ref().ok_or(PipelineError::WorkerUnavailable)?;

        if !self.shared.is_aborted() {
            if let Err(err) = self.backend.end_of_stream() {
                self.shared.abort(err.to_string());
            }
        }

        let (reply_tx, reply_rx) = channel::bounded(1);
        tx.send(WorkItem::Flush(reply_tx))
            .map_err(|_| PipelineError::WorkerUnavailable)?;
        reply_rx.recv().map_err(|_| PipelineError::WorkerUnavailable)?;
        self.flushed = true;

        if let Some(reason) = self.shared.fault() {
            return Err(PipelineError::Aborted { reason });
        }

        log::info!(
            "Encode pipeline flushed after {} frames",
            self.shared.completed.load(Ordering::Relaxed)
        );
        Ok(())
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            submitted: self.shared.submitted.load(Ordering::Relaxed),
            completed: self.shared.completed.load(Ordering::Relaxed),
            need_more_input_retries: self.shared.need_more_input_retries.load(Ordering::Relaxed),
            in_flight: self.shared.in_flight.load(Ordering::Acquire),
            input_pool: self.input_pool.stats(),
            output_pool: self.output_pool.stats(),
        }
    }

    /// Index the next accepted frame will carry
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Current session resolution
    pub fn resolution(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Kernel tier used for the most recent conversion
    pub fn last_tier(&self) -> Option<Tier> {
        self.last_tier
    }

    pub fn is_aborted(&self) -> bool {
        self.shared.is_aborted()
    }

    /// Stop the drain worker after it empties its queue and release encoder resources
    pub fn shutdown(&mut self) {
        self.work_tx = None;

        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::error!("Drain worker panicked");
            }
            destroy_slots(self.backend.as_ref(), &self.input_pool, &self.output_pool);
        }
    }

    fn check_open(&self) -> Result<(), PipelineError> {
        if let Some(reason) = self.shared.fault() {
            return Err(PipelineError::Aborted { reason });
        }
        if self.flushed {
            return Err(PipelineError::Flushed);
        }
        if self.work_tx.is_none() {
            return Err(PipelineError::WorkerUnavailable);
        }
        Ok(())
    }

    fn apply_reconfigure(&mut self, request: &ReconfigureRequest) -> Result<(), PipelineError> {
        if let Err(err) = self.backend.reconfigure(request) {
            if err.is_fatal() {
                self.shared.abort(err.to_string());
            }
            return Err(err.into());
        }

        if let Some((width, height)) = request.resolution {
            self.width = width;
            self.height = height;
        }

        log::debug!(
            "Reconfigured at frame {}: {}x{}, bitrate {:?}, max bitrate {:?}",
            self.frame_index,
            self.width,
            self.height,
            request.bitrate,
            request.max_bitrate
        );
        Ok(())
    }

    fn picture_type(&self, force_idr: bool) -> PictureType {
        if force_idr {
            PictureType::Idr
        } else if self.config.picture_type_by_encoder {
            PictureType::EncoderDecides
        } else if self.frame_index % u64::from(self.config.gop_length) == 0 {
            PictureType::Idr
        } else {
            PictureType::P
        }
    }

    /// Convert into the staging frame, then submit until the encoder accepts
    fn encode(
        &mut self,
        frame: &EncodeFrameConfig<'_>,
        input: &mut InputSurfaceSlot,
        output: &OutputBitstreamSlot,
        picture_type: PictureType,
    ) -> Result<(), PipelineError> {
        let (width, height) = (self.width, self.height);

        self.trace(FrameState::Converting);
        let mut staging = input.frame.surface_mut_at(width, height)?;
        let tier = convert(&self.caps, &frame.source, &mut staging, self.config.color_matrix)?;
        if self.last_tier != Some(tier) {
            log::debug!("Converting {:?} frames on {} tier", frame.source.format, tier.name());
            self.last_tier = Some(tier);
        }

        let completion = self.config.async_mode.then(|| {
            output.completion.reset();
            output.completion.clone()
        });

        let picture = PictureParams {
            input: input.handle,
            output: output.handle,
            frame: input.frame.surface_at(width, height)?,
            frame_index: self.frame_index,
            timestamp: frame.timestamp,
            picture_type,
            field_mode: frame.field_mode,
            completion,
        };

        self.submit_with_retry(&picture)?;
        self.trace(FrameState::Submitted);
        Ok(())
    }

    fn submit_with_retry(&self, picture: &PictureParams<'_>) -> Result<(), PipelineError> {
        let max_retries = self.config.max_submit_retries;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.backend.submit_picture(picture) {
                Ok(SubmitStatus::Accepted) => return Ok(()),
                Ok(SubmitStatus::NeedMoreInput) => {
                    self.shared
                        .need_more_input_retries
                        .fetch_add(1, Ordering::Relaxed);
                    log::warn!(
                        "Frame {} needs more input, resubmitting ({}/{})",
                        picture.frame_index,
                        attempts,
                        max_retries
                    );
                }
                Err(err) if err.is_transient() => {
                    log::warn!(
                        "Encoder busy on frame {}, resubmitting ({}/{})",
                        picture.frame_index,
                        attempts,
                        max_retries
                    );
                }
                Err(err) => return Err(err.into()),
            }

            if attempts > max_retries {
                return Err(PipelineError::SubmitRetriesExhausted {
                    frame_index: picture.frame_index,
                    attempts,
                });
            }
            if !self.config.retry_backoff.is_zero() {
                thread::sleep(self.config.retry_backoff);
            }
        }
    }

    fn queue(&self, pending: PendingFrame) -> Result<(), PipelineError> {
        let Some(tx) = self.work_tx.as_ref() else {
            return Err(PipelineError::WorkerUnavailable);
        };

        if let Err(channel::SendError(item)) = tx.send(WorkItem::Frame(pending)) {
            if let WorkItem::Frame(pending) = item {
                self.input_pool.release(pending.input);
                self.output_pool.release(pending.output);
                self.shared.in_flight.fetch_sub(1, Ordering::AcqRel);
            }
            self.shared.abort(PipelineError::WorkerUnavailable.to_string());
            return Err(PipelineError::WorkerUnavailable);
        }
        Ok(())
    }

    fn trace(&self, state: FrameState) {
        log::trace!("Frame {} {:?}", self.frame_index, state);
    }
}

impl Drop for EncodePipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Create `pool_size` input surfaces with staging frames and as many bitstream buffers
fn create_slots(
    config: &PipelineConfig,
    backend: &dyn EncoderBackend,
) -> Result<(Vec<InputSurfaceSlot>, Vec<OutputBitstreamSlot>), PipelineError> {
    let mut inputs = Vec::with_capacity(config.pool_size);
    let mut outputs = Vec::with_capacity(config.pool_size);

    if let Err(err) = fill_slots(config, backend, &mut inputs, &mut outputs) {
        log::error!("Failed to create encoder slots: {}", err);
        for slot in inputs {
            backend.destroy_input_surface(slot.handle);
        }
        for slot in outputs {
            backend.destroy_bitstream_buffer(slot.handle);
        }
        return Err(err);
    }

    Ok((inputs, outputs))
}

fn fill_slots(
    config: &PipelineConfig,
    backend: &dyn EncoderBackend,
    inputs: &mut Vec<InputSurfaceSlot>,
    outputs: &mut Vec<OutputBitstreamSlot>,
) -> Result<(), PipelineError> {
    let (format, width, height) = (config.buffer_format, config.max_width, config.max_height);

    for index in 0..config.pool_size {
        let frame = AlignedFrame::new(format, width, height)?;
        let handle = backend.create_input_surface(format, width, height)?;
        inputs.push(InputSurfaceSlot {
            index,
            handle,
            frame,
        });

        let handle = backend.create_bitstream_buffer()?;
        outputs.push(OutputBitstreamSlot {
            index,
            handle,
            completion: Arc::new(CompletionEvent::new()),
        });
    }
    Ok(())
}

fn destroy_slots(
    backend: &dyn EncoderBackend,
    input_pool: &SlotPool<InputSurfaceSlot>,
    output_pool: &SlotPool<OutputBitstreamSlot>,
) {
    let inputs = input_pool.drain();
    let outputs = output_pool.drain();

    let input_capacity = input_pool.stats().capacity;
    let output_capacity = output_pool.stats().capacity;
    if inputs.len() != input_capacity || outputs.len() != output_capacity {
        log::warn!(
            "Leaked slots at shutdown: {}/{} input, {}/{} output returned",
            inputs.len(),
            input_capacity,
            outputs.len(),
            output_capacity
        );
    }

    for slot in inputs {
        backend.destroy_input_surface(slot.handle);
    }
    for slot in outputs {
        backend.destroy_bitstream_buffer(slot.handle);
    }
}
