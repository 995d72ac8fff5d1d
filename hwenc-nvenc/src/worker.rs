//! Drain worker
//!
//! Takes submitted frames off a FIFO channel, waits for the encoder to
//! finish each one, copies the bitstream to the sink and returns both slots
//! to their pools. Drain order is submission order regardless of the order
//! in which completion events fire.

use crate::backend::{EncoderBackend, PictureType};
use crate::error::PipelineError;
use crate::pipeline::FrameState;
use crate::sink::{BitstreamSink, EncodedPacket};
use crate::slot_pool::{InputSurfaceSlot, OutputBitstreamSlot, SlotPool};
use crossbeam::channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A frame accepted by the encoder and awaiting its bitstream
pub(crate) struct PendingFrame {
    pub frame_index: u64,
    pub timestamp: u64,
    pub picture_type: PictureType,
    pub input: InputSurfaceSlot,
    pub output: OutputBitstreamSlot,
}

pub(crate) enum WorkItem {
    Frame(PendingFrame),
    /// Acknowledged once every earlier frame has drained
    Flush(Sender<()>),
}

/// Counters and abort state shared between the caller and the worker
#[derive(Default)]
pub(crate) struct Shared {
    pub submitted: AtomicU64,
    pub completed: AtomicU64,
    pub need_more_input_retries: AtomicU64,
    pub in_flight: AtomicUsize,
    aborted: AtomicBool,
    fault: Mutex<Option<String>>,
}

impl Shared {
    /// First reason wins
    pub fn abort(&self, reason: String) {
        let mut fault = self.fault.lock();
        if fault.is_none() {
            *fault = Some(reason);
        }
        self.aborted.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    pub fn fault(&self) -> Option<String> {
        self.fault.lock().clone()
    }
}

pub(crate) struct DrainWorker {
    pub backend: Arc<dyn EncoderBackend>,
    pub sink: Box<dyn BitstreamSink>,
    pub input_pool: SlotPool<InputSurfaceSlot>,
    pub output_pool: SlotPool<OutputBitstreamSlot>,
    pub shared: Arc<Shared>,
    pub async_mode: bool,
    pub completion_timeout: Duration,
    pub core: Option<usize>,
    pub failed: bool,
}

impl DrainWorker {
    pub fn spawn(self, rx: Receiver<WorkItem>) -> Result<JoinHandle<()>, PipelineError> {
        thread::Builder::new()
            .name("hwenc-drain".to_string())
            .spawn(move || self.run(rx))
            .map_err(PipelineError::WorkerSpawn)
    }

    fn run(mut self, rx: Receiver<WorkItem>) {
        if let Some(core) = self.core {
            pin_to_core(core);
        }

        // Ends once the pipeline drops its sender and the queue is empty
        for item in rx.iter() {
            match item {
                WorkItem::Frame(frame) => self.drain(frame),
                WorkItem::Flush(reply) => {
                    if let Err(err) = self.sink.flush() {
                        self.fail(PipelineError::from(err));
                    }
                    let _ = reply.send(());
                }
            }
        }

        log::info!("Drain worker exiting");
    }

    fn drain(&mut self, frame: PendingFrame) {
        let frame_index = frame.frame_index;

        if self.failed {
            log::warn!("Discarding frame {} after drain failure", frame_index);
        } else if let Err(err) = self.complete(&frame) {
            log::error!("Frame {} failed to drain: {}", frame_index, err);
            self.fail(err);
        }

        self.input_pool.release(frame.input);
        self.output_pool.release(frame.output);
        self.shared.in_flight.fetch_sub(1, Ordering::AcqRel);
        log::trace!("Frame {} {:?}", frame_index, FrameState::Released);
    }

    fn complete(&mut self, frame: &PendingFrame) -> Result<(), PipelineError> {
        if self.async_mode && !frame.output.completion.wait_timeout(self.completion_timeout) {
            return Err(PipelineError::CompletionTimeout {
                frame_index: frame.frame_index,
                timeout: self.completion_timeout,
            });
        }
        log::trace!("Frame {} {:?}", frame.frame_index, FrameState::Completed);

        let handle = frame.output.handle;
        let locked = self.backend.lock_bitstream(handle)?;
        self.backend.unlock_bitstream(handle)?;

        let picture_type = match locked.picture_type {
            PictureType::EncoderDecides => frame.picture_type,
            coded => coded,
        };

        self.sink.write_packet(EncodedPacket {
            frame_index: frame.frame_index,
            timestamp: frame.timestamp,
            picture_type,
            data: locked.data,
        })?;

        self.shared.completed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn fail(&mut self, err: PipelineError) {
        self.failed = true;
        self.shared.abort(err.to_string());
    }
}

fn pin_to_core(core: usize) {
    let pinned = core_affinity::get_core_ids()
        .and_then(|ids| ids.into_iter().find(|id| id.id == core))
        .map(core_affinity::set_for_current)
        .unwrap_or(false);

    if pinned {
        log::debug!("Drain worker pinned to core {}", core);
    } else {
        log::warn!("Could not pin drain worker to core {}", core);
    }
}
