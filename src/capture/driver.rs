//! Native camera driver boundary

use crate::capture::frame::CameraFormat;
use crate::capture::session::FrameSink;
use crate::error::Result;

/// One buffer as handed over by a driver callback.
#[derive(Debug, Clone, Copy)]
pub struct DriverFrame<'a> {
    pub data: &'a [u8],
    /// Device clock, nanoseconds.
    pub timestamp: u64,
    pub gain: u32,
    pub exposure_time: u32,
    pub native_handle: usize,
}

/// Control surface of a physical (or synthetic) camera.
///
/// Drivers push frames from their own thread through the [`FrameSink`]
/// received in [`start_capture`](Self::start_capture); everything else is
/// called from the thread owning the session.
pub trait CameraDriver: Send {
    fn name(&self) -> &str;

    /// Modes the hardware offers. Queried once per session.
    fn supported_formats(&mut self) -> Result<Vec<CameraFormat>>;

    fn set_image_format(&mut self, format: CameraFormat) -> Result<()>;

    fn start_capture(&mut self, sink: FrameSink) -> Result<()>;

    fn pause_capture(&mut self) -> Result<()>;

    fn resume_capture(&mut self) -> Result<()>;

    /// Stop delivering frames. Must not return while a delivery is in flight.
    fn stop_capture(&mut self) -> Result<()>;

    /// Release the underlying device handle.
    fn release(&mut self);
}
