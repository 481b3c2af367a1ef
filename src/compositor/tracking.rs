//! Timestamp-keyed pose lookup

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use glam::Vec3;
use tracing::trace;

use crate::compositor::rig::{EyeView, Pose, Projection, StereoViews};

/// Historical scene poses, queried by camera capture time.
pub trait TrackingSource: Send + Sync {
    /// Pose at `timestamp`, or `None` when the history cannot answer.
    fn pose_at(&self, timestamp: u64) -> Option<Pose>;

    /// Per-eye views at `timestamp` for stereo capture.
    fn eye_views_at(&self, timestamp: u64) -> Option<StereoViews> {
        let _ = timestamp;
        None
    }
}

impl<T: TrackingSource + ?Sized> TrackingSource for Arc<T> {
    fn pose_at(&self, timestamp: u64) -> Option<Pose> {
        (**self).pose_at(timestamp)
    }

    fn eye_views_at(&self, timestamp: u64) -> Option<StereoViews> {
        (**self).eye_views_at(timestamp)
    }
}

/// Eye layout used to derive [`StereoViews`] from a head pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoRig {
    /// Interpupillary distance in metres.
    pub eye_separation: f32,
    pub projection: Projection,
}

impl Default for StereoRig {
    fn default() -> Self {
        Self {
            eye_separation: 0.064,
            projection: Projection::default(),
        }
    }
}

/// Bounded, timestamp-ordered pose samples.
///
/// Lookups between two samples interpolate (lerp position, slerp rotation).
/// Timestamps outside the recorded range are not extrapolated.
pub struct PoseHistory {
    samples: Mutex<VecDeque<(u64, Pose)>>,
    capacity: usize,
    stereo: Option<StereoRig>,
}

impl PoseHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            stereo: None,
        }
    }

    pub fn with_stereo(mut self, rig: StereoRig) -> Self {
        self.stereo = Some(rig);
        self
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<(u64, Pose)>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a sample. Samples older than the newest one are rejected; a
    /// repeated timestamp replaces the stored pose.
    pub fn record(&self, timestamp: u64, pose: Pose) -> bool {
        let mut samples = self.lock();
        match samples.back_mut() {
            Some((last, stored)) if *last == timestamp => {
                *stored = pose;
                return true;
            }
            Some((last, _)) if *last > timestamp => {
                trace!(timestamp, newest = *last, "Out-of-order pose rejected");
                return false;
            }
            _ => {}
        }
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back((timestamp, pose));
        true
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn latest(&self) -> Option<(u64, Pose)> {
        self.lock().back().copied()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl TrackingSource for PoseHistory {
    fn pose_at(&self, timestamp: u64) -> Option<Pose> {
        let samples = self.lock();
        let idx = samples.partition_point(|(ts, _)| *ts < timestamp);
        let (after_ts, after) = *samples.get(idx)?;
        if after_ts == timestamp {
            return Some(after);
        }
        let (before_ts, before) = *samples.get(idx.checked_sub(1)?)?;

        let t = (timestamp - before_ts) as f64 / (after_ts - before_ts) as f64;
        Some(before.interpolate(&after, t as f32))
    }

    fn eye_views_at(&self, timestamp: u64) -> Option<StereoViews> {
        let rig = self.stereo?;
        let head = self.pose_at(timestamp)?;
        let half = rig.eye_separation * 0.5;
        Some(StereoViews {
            left: EyeView {
                pose: head.offset_local(Vec3::new(-half, 0.0, 0.0)),
                projection: rig.projection,
            },
            right: EyeView {
                pose: head.offset_local(Vec3::new(half, 0.0, 0.0)),
                projection: rig.projection,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_x(x: f32) -> Pose {
        Pose::new(Vec3::new(x, 0.0, 0.0), Pose::IDENTITY.rotation)
    }

    #[test]
    fn test_interpolates_between_samples() {
        let history = PoseHistory::new(8);
        history.record(100, at_x(0.0));
        history.record(200, at_x(1.0));

        let pose = history.pose_at(125).expect("inside range");
        assert!((pose.position.x - 0.25).abs() < 1e-6);
        assert_eq!(history.pose_at(200), Some(at_x(1.0)));
    }

    #[test]
    fn test_outside_range_is_a_miss() {
        let history = PoseHistory::new(8);
        assert_eq!(history.pose_at(10), None);

        history.record(100, at_x(0.0));
        history.record(200, at_x(1.0));
        assert_eq!(history.pose_at(99), None);
        assert_eq!(history.pose_at(201), None);
    }

    #[test]
    fn test_capacity_and_ordering() {
        let history = PoseHistory::new(2);
        assert!(history.record(1, at_x(1.0)));
        assert!(history.record(2, at_x(2.0)));
        assert!(history.record(3, at_x(3.0)));
        assert!(!history.record(2, at_x(9.0)));

        assert_eq!(history.len(), 2);
        assert_eq!(history.pose_at(1), None);
        assert_eq!(history.latest(), Some((3, at_x(3.0))));
    }

    #[test]
    fn test_eye_views_straddle_head() {
        let history = PoseHistory::new(4).with_stereo(StereoRig {
            eye_separation: 0.2,
            projection: Projection::default(),
        });
        history.record(5, at_x(1.0));

        let views = history.eye_views_at(5).expect("stereo configured");
        assert!((views.left.pose.position.x - 0.9).abs() < 1e-6);
        assert!((views.right.pose.position.x - 1.1).abs() < 1e-6);
        assert!(PoseHistory::new(4).eye_views_at(5).is_none());
    }
}
