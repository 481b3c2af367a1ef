//! Bounded frame queue between the driver thread and the render thread

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam::utils::CachePadded;
use ringbuf::{traits::*, HeapRb};
use tracing::trace;

use crate::capture::frame::FrameSample;
use crate::pipeline::pool::FramePool;

/// Fixed-capacity FIFO of [`FrameSample`]s that keeps the most recent
/// `limit` frames. Overflow evicts the oldest sample back into the pool.
///
/// Besides plain FIFO access the queue keeps a per-tick "current frame"
/// slot: the first [`has_frame`](Self::has_frame) call of a tick dequeues
/// into the slot and every later call in the same tick returns the cached
/// answer, so all consumers of that tick observe the same frame.
pub struct BoundedFrameQueue {
    ring: Mutex<HeapRb<FrameSample>>,
    current: Mutex<TickSlot>,
    pool: Arc<FramePool>,
    limit: usize,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct TickSlot {
    tick: Option<u64>,
    has: bool,
    sample: Option<FrameSample>,
}

#[derive(Default)]
struct Stats {
    frames_written: AtomicU64,
    frames_read: AtomicU64,
    frames_dropped: AtomicU64,
}

/// Snapshot of queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub written: u64,
    pub read: u64,
    pub dropped: u64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BoundedFrameQueue {
    pub fn new(limit: usize, pool: Arc<FramePool>) -> Self {
        let limit = limit.max(1);
        Self {
            ring: Mutex::new(HeapRb::new(limit)),
            current: Mutex::new(TickSlot::default()),
            pool,
            limit,
            stats: CachePadded::new(Stats::default()),
        }
    }

    /// Producer: append a sample, evicting the oldest one when full.
    ///
    /// Returns the timestamp of the evicted sample, if any.
    pub fn enqueue(&self, sample: FrameSample) -> Option<u64> {
        let evicted = lock(&self.ring).push_overwrite(sample);
        self.stats.frames_written.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("mrc_frames_enqueued_total").increment(1);

        let evicted = evicted?;
        let timestamp = evicted.timestamp;
        self.pool.put(evicted);
        self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("mrc_frames_evicted_total").increment(1);
        trace!(timestamp, "Evicted oldest frame");
        Some(timestamp)
    }

    /// Consumer: remove the oldest sample and hand it to `f`.
    ///
    /// The sample goes back to the pool as soon as `f` returns.
    pub fn dequeue_with<R>(&self, f: impl FnOnce(&FrameSample) -> R) -> Option<R> {
        let sample = lock(&self.ring).try_pop()?;
        self.stats.frames_read.fetch_add(1, Ordering::Relaxed);
        let result = f(&sample);
        self.pool.put(sample);
        Some(result)
    }

    /// Whether a new frame is current for render tick `tick`.
    ///
    /// Idempotent within a tick: only the first call dequeues.
    pub fn has_frame(&self, tick: u64) -> bool {
        let mut slot = lock(&self.current);
        if slot.tick == Some(tick) {
            return slot.has;
        }
        slot.tick = Some(tick);

        let next = lock(&self.ring).try_pop();
        let Some(sample) = next else {
            slot.has = false;
            return false;
        };

        self.stats.frames_read.fetch_add(1, Ordering::Relaxed);
        let stale = slot.sample.replace(sample);
        slot.has = true;
        drop(slot);

        if let Some(stale) = stale {
            self.pool.put(stale);
        }
        true
    }

    /// Read the sample made current by the latest [`has_frame`](Self::has_frame).
    pub fn with_current_frame<R>(&self, f: impl FnOnce(&FrameSample) -> R) -> Option<R> {
        lock(&self.current).sample.as_ref().map(f)
    }

    /// Timestamps of queued samples, oldest first.
    pub fn timestamps(&self) -> Vec<u64> {
        lock(&self.ring).iter().map(|s| s.timestamp).collect()
    }

    /// Return every queued sample, and the current one, to the pool.
    pub fn clear(&self) -> usize {
        let mut released = Vec::new();
        {
            let mut slot = lock(&self.current);
            released.extend(slot.sample.take());
            *slot = TickSlot::default();

            let mut ring = lock(&self.ring);
            while let Some(sample) = ring.try_pop() {
                released.push(sample);
            }
        }

        let count = released.len();
        for sample in released {
            self.pool.put(sample);
        }
        count
    }

    pub fn len(&self) -> usize {
        lock(&self.ring).occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn pool(&self) -> &Arc<FramePool> {
        &self.pool
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            written: self.stats.frames_written.load(Ordering::Relaxed),
            read: self.stats.frames_read.load(Ordering::Relaxed),
            dropped: self.stats.frames_dropped.load(Ordering::Relaxed),
        }
    }
}
