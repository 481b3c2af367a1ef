//! Fixed-rate placeholder source for targets without a camera

use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver};
use tracing::{debug, info};

use crate::capture::frame::{FramePlanes, Plane, TextureType, UniversalFrame};
use crate::error::{Error, Result};
use crate::provider::{FrameProvider, MonotonicClock, OnFrame};

const PLACEHOLDER_GRAY: u8 = 128;

/// Republishes a static RGB image at a fixed rate, stamped with the time
/// each timer tick fired.
pub struct NullFrameProvider {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
    period: Duration,
    ticker: Option<Receiver<Instant>>,
    epoch: Instant,
    clock: MonotonicClock,
    released: bool,
}

impl NullFrameProvider {
    /// Mid-gray placeholder of the given size.
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        let len = width as usize * height as usize * 3;
        Self::with_image(width, height, vec![PLACEHOLDER_GRAY; len], fps)
    }

    /// Placeholder showing a packed RGB24 image.
    pub fn with_image(width: u32, height: u32, rgb: Vec<u8>, fps: u32) -> Self {
        Self {
            width,
            height,
            rgb,
            period: Duration::from_secs(1) / fps.max(1),
            ticker: None,
            epoch: Instant::now(),
            clock: MonotonicClock::default(),
            released: false,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl FrameProvider for NullFrameProvider {
    fn texture_type(&self) -> TextureType {
        TextureType::Rgb
    }

    fn play(&mut self) -> Result<()> {
        if self.released {
            return Err(Error::InvalidState("provider released"));
        }
        if self.ticker.is_none() {
            self.ticker = Some(channel::tick(self.period));
            info!(
                width = self.width,
                height = self.height,
                period_ms = self.period.as_millis() as u64,
                "Placeholder provider playing"
            );
        }
        Ok(())
    }

    fn stop(&mut self) {
        if self.ticker.take().is_some() {
            debug!("Placeholder provider stopped");
        }
    }

    fn tick(&mut self, _tick: u64, on_frame: &mut OnFrame<'_>) -> Result<bool> {
        let Some(ticker) = &self.ticker else {
            return Ok(false);
        };
        // collapse backlog: only the most recent timer tick is published
        let Some(fired) = ticker.try_iter().last() else {
            return Ok(false);
        };

        let elapsed = fired.saturating_duration_since(self.epoch);
        let timestamp = self
            .clock
            .stamp(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX));

        let frame = UniversalFrame {
            timestamp,
            gain: 0,
            exposure_time: 0,
            width: self.width,
            height: self.height,
            planes: FramePlanes::Rgb([Plane {
                data: &self.rgb,
                width: self.width,
                height: self.height,
                channels: 3,
            }]),
        };
        on_frame(&frame)?;
        Ok(true)
    }

    fn release(&mut self) {
        self.ticker = None;
        self.released = true;
    }
}
