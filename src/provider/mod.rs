//! Uniform frame sources for the compositor.
//!
//! Every provider republishes frames as [`UniversalFrame`]s through the
//! callback handed to [`FrameProvider::tick`], whatever the underlying
//! pixel layout or whether a camera exists at all.

pub mod editor;
pub mod live;
pub mod placeholder;

pub use editor::EditorFrameProvider;
pub use live::LiveFrameProvider;
pub use placeholder::NullFrameProvider;

use crate::capture::frame::{TextureType, UniversalFrame};
use crate::error::Result;

/// Receives each published frame; the frame is only valid during the call.
pub type OnFrame<'a> = dyn FnMut(&UniversalFrame<'_>) -> Result<()> + 'a;

pub trait FrameProvider: Send {
    /// Plane family of the frames this provider publishes.
    fn texture_type(&self) -> TextureType;

    /// Start producing. Idempotent.
    fn play(&mut self) -> Result<()>;

    /// Stop producing. Idempotent.
    fn stop(&mut self);

    /// Publish at most one frame for render tick `tick`.
    ///
    /// Returns whether `on_frame` was invoked. Errors from the callback are
    /// propagated unchanged.
    fn tick(&mut self, tick: u64, on_frame: &mut OnFrame<'_>) -> Result<bool>;

    /// Detach from every timer and consumer. No frame is published afterwards.
    fn release(&mut self);
}

/// Enforces non-decreasing timestamps within one provider.
#[derive(Debug, Default)]
pub(crate) struct MonotonicClock {
    last: Option<u64>,
}

impl MonotonicClock {
    /// Accept `timestamp` if it does not go backwards.
    pub(crate) fn admit(&mut self, timestamp: u64) -> bool {
        if self.last.is_some_and(|last| timestamp < last) {
            return false;
        }
        self.last = Some(timestamp);
        true
    }

    /// Clamp `timestamp` so it never goes backwards.
    pub(crate) fn stamp(&mut self, timestamp: u64) -> u64 {
        let stamped = self.last.map_or(timestamp, |last| timestamp.max(last));
        self.last = Some(stamped);
        stamped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admit_rejects_regression() {
        let mut clock = MonotonicClock::default();
        assert!(clock.admit(10));
        assert!(clock.admit(10));
        assert!(!clock.admit(9));
        assert!(clock.admit(11));
    }

    #[test]
    fn test_stamp_clamps() {
        let mut clock = MonotonicClock::default();
        assert_eq!(clock.stamp(5), 5);
        assert_eq!(clock.stamp(3), 5);
        assert_eq!(clock.stamp(8), 8);
    }
}
