//! Fixed-size FIFO pools of encoder slots
//!
//! A slot is a plain value: acquiring moves it out of the pool, releasing
//! moves it back. Nothing else can reach a slot while it is checked out.

use crate::backend::{InputHandle, OutputHandle};
use crate::completion::CompletionEvent;
use crate::error::PipelineError;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use hwenc_video::AlignedFrame;
use std::sync::Arc;
use std::time::Duration;

/// Encoder input surface with its host staging frame
#[derive(Debug)]
pub struct InputSurfaceSlot {
    pub index: usize,
    pub handle: InputHandle,
    pub frame: AlignedFrame,
}

/// Encoder bitstream buffer with its completion event
#[derive(Debug)]
pub struct OutputBitstreamSlot {
    pub index: usize,
    pub handle: OutputHandle,
    pub completion: Arc<CompletionEvent>,
}

pub struct SlotPool<T> {
    name: &'static str,
    tx: Sender<T>,
    rx: Receiver<T>,
    capacity: usize,
}

impl<T> Clone for SlotPool<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            capacity: self.capacity,
        }
    }
}

impl<T> SlotPool<T> {
    pub fn new(name: &'static str, slots: Vec<T>) -> Self {
        let capacity = slots.len();
        let (tx, rx) = channel::bounded(capacity.max(1));
        for slot in slots {
            // Cannot fail: the channel holds exactly `capacity` items
            let _ = tx.try_send(slot);
        }

        SlotPool {
            name,
            tx,
            rx,
            capacity,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Take the oldest free slot, waiting up to `timeout` (forever if `None`)
    pub fn acquire(&self, timeout: Option<Duration>) -> Result<T, PipelineError> {
        match timeout {
            // The pool holds its own sender, so recv only ends with a slot
            None => self.rx.recv().map_err(|_| PipelineError::WorkerUnavailable),
            Some(timeout) => self.rx.recv_timeout(timeout).map_err(|err| match err {
                RecvTimeoutError::Timeout => PipelineError::SlotTimeout {
                    pool: self.name,
                    timeout,
                },
                RecvTimeoutError::Disconnected => PipelineError::WorkerUnavailable,
            }),
        }
    }

    pub fn try_acquire(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn release(&self, slot: T) {
        if self.tx.try_send(slot).is_err() {
            log::warn!("{} pool over capacity, dropping slot", self.name);
        }
    }

    /// Remove every free slot, for teardown
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }

    pub fn stats(&self) -> PoolStats {
        let available = self.rx.len();
        PoolStats {
            capacity: self.capacity,
            in_use: self.capacity.saturating_sub(available),
            available,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub capacity: usize,
    pub in_use: usize,
    pub available: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_pool_is_fifo() {
        let pool = SlotPool::new("test", vec![0, 1, 2]);
        assert_eq!(pool.try_acquire(), Some(0));
        pool.release(0);
        assert_eq!(pool.try_acquire(), Some(1));
        assert_eq!(pool.try_acquire(), Some(2));
        assert_eq!(pool.try_acquire(), Some(0));
        assert_eq!(pool.try_acquire(), None);
    }

    #[test]
    fn test_pool_stats() {
        let pool = SlotPool::new("test", vec![(); 4]);
        let a = pool.try_acquire().unwrap();
        let _b = pool.try_acquire().unwrap();

        let stats = pool.stats();
        assert_eq!(stats.capacity, 4);
        assert_eq!(stats.in_use, 2);
        assert_eq!(stats.available, 2);

        pool.release(a);
        assert_eq!(pool.stats().in_use, 1);
    }

    #[test]
    fn test_bounded_acquire_times_out() {
        let pool = SlotPool::new("input", vec![7]);
        let _held = pool.acquire(None).unwrap();

        let start = Instant::now();
        let err = pool.acquire(Some(Duration::from_millis(20))).unwrap_err();
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(matches!(err, PipelineError::SlotTimeout { pool: "input", .. }));
    }

    #[test]
    fn test_blocking_acquire_wakes_on_release() {
        let pool = SlotPool::new("output", vec![1u32]);
        let held = pool.acquire(None).unwrap();

        let releaser = {
            let pool = pool.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                pool.release(held);
            })
        };

        assert_eq!(pool.acquire(None).unwrap(), 1);
        releaser.join().unwrap();
    }

    #[test]
    fn test_drain_empties_pool() {
        let pool = SlotPool::new("test", vec![1, 2, 3]);
        let _held = pool.try_acquire();
        assert_eq!(pool.drain(), vec![2, 3]);
        assert_eq!(pool.stats().available, 0);
    }
}
