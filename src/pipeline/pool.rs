//! Recycling arena for [`FrameSample`]s.
//!
//! Samples move out of the pool on [`FramePool::get`] and back in on
//! [`FramePool::put`]; ownership guarantees a sample is never held by two
//! queues at once. The pool grows on demand, so `get` never fails.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::capture::frame::FrameSample;

/// Counters describing pool occupancy and churn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Instances currently owned by the pool or handed out.
    pub created: usize,
    /// Instances idle in the free list.
    pub available: usize,
    /// Total `get` calls.
    pub issued: u64,
    /// Total `put` calls.
    pub returned: u64,
    /// Instances allocated beyond `max_live`.
    pub overflow: u64,
}

struct PoolInner {
    free: Vec<FrameSample>,
    stats: PoolStats,
}

pub struct FramePool {
    inner: Mutex<PoolInner>,
    frame_capacity: usize,
    max_live: usize,
}

impl FramePool {
    /// Pre-allocate `init_count` samples of `frame_capacity` bytes each.
    ///
    /// `max_live` caps retained instances; beyond it the pool still hands out
    /// samples but warns and sheds the surplus as they come back.
    pub fn new(init_count: usize, frame_capacity: usize, max_live: usize) -> Self {
        let max_live = max_live.max(init_count);
        debug!(init_count, frame_capacity, max_live, "Creating frame pool");

        let free = (0..init_count)
            .map(|_| FrameSample::with_capacity(frame_capacity))
            .collect();

        Self {
            inner: Mutex::new(PoolInner {
                free,
                stats: PoolStats {
                    created: init_count,
                    available: init_count,
                    ..PoolStats::default()
                },
            }),
            frame_capacity,
            max_live,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand out a reusable sample, allocating if the free list is empty.
    pub fn get(&self) -> FrameSample {
        let mut inner = self.lock();
        inner.stats.issued += 1;

        if let Some(sample) = inner.free.pop() {
            inner.stats.available = inner.free.len();
            return sample;
        }

        inner.stats.created += 1;
        if inner.stats.created > self.max_live {
            inner.stats.overflow += 1;
            let created = inner.stats.created;
            drop(inner);
            warn!(
                created,
                max_live = self.max_live,
                "Frame pool above its live cap; producer is outrunning the consumer"
            );
            metrics::counter!("mrc_pool_overflow_total").increment(1);
        }

        FrameSample::with_capacity(self.frame_capacity)
    }

    /// Return a sample for reuse.
    pub fn put(&self, mut sample: FrameSample) {
        sample.reset();

        let mut inner = self.lock();
        inner.stats.returned += 1;

        if inner.stats.created > self.max_live {
            // shed the surplus so the pool shrinks back under its cap
            inner.stats.created -= 1;
            return;
        }

        inner.free.push(sample);
        inner.stats.available = inner.free.len();
    }

    pub fn stats(&self) -> PoolStats {
        self.lock().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_preallocates() {
        let pool = FramePool::new(4, 64, 8);
        let stats = pool.stats();
        assert_eq!(stats.created, 4);
        assert_eq!(stats.available, 4);
        assert!(pool.get().capacity() >= 64);
    }

    #[test]
    fn test_pool_grows_on_demand() {
        let pool = FramePool::new(1, 8, 4);
        let a = pool.get();
        let b = pool.get();
        assert_eq!(pool.stats().created, 2);

        pool.put(a);
        pool.put(b);
        let stats = pool.stats();
        assert_eq!(stats.available, 2);
        assert_eq!(stats.returned, 2);
    }

    #[test]
    fn test_reissued_sample_has_no_stale_data() {
        let pool = FramePool::new(1, 8, 1);
        let mut sample = pool.get();
        sample.timestamp = 42;
        sample.fill(&[7; 8]);
        pool.put(sample);

        let mut reused = pool.get();
        assert_eq!(reused.timestamp, 0);
        assert!(reused.pixels().is_empty());

        reused.fill(&[1, 2]);
        assert_eq!(reused.pixels(), &[1, 2]);
    }

    #[test]
    fn test_overflow_is_shed_on_return() {
        let pool = FramePool::new(1, 8, 1);
        let a = pool.get();
        let b = pool.get();
        let stats = pool.stats();
        assert_eq!(stats.created, 2);
        assert_eq!(stats.overflow, 1);

        pool.put(a);
        pool.put(b);
        let stats = pool.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.available, 1);
    }
}
