//! Synthetic camera driver for running without hardware.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info};

use crate::capture::decoder::rgba_to_i420;
use crate::capture::driver::{CameraDriver, DriverFrame};
use crate::capture::frame::{CameraFormat, PixelFormat};
use crate::capture::session::{Delivery, FrameSink};
use crate::error::{Error, Result};

/// Test pattern types for synthetic frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// Eight vertical colour bars.
    ColorBars,
    /// Solid RGB colour.
    Solid([u8; 3]),
}

/// Snapshot of how often each driver entry point was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverCalls {
    pub starts: usize,
    pub pauses: usize,
    pub resumes: usize,
    pub stops: usize,
    pub releases: usize,
    pub format_queries: usize,
}

/// Call counters and a delivery hook shared with the driver.
#[derive(Default)]
pub struct DriverProbe {
    starts: AtomicUsize,
    pauses: AtomicUsize,
    resumes: AtomicUsize,
    stops: AtomicUsize,
    releases: AtomicUsize,
    format_queries: AtomicUsize,
    state: Mutex<ProbeState>,
}

#[derive(Default)]
struct ProbeState {
    sink: Option<FrameSink>,
    format: Option<CameraFormat>,
    frame: Vec<u8>,
}

impl DriverProbe {
    pub fn calls(&self) -> DriverCalls {
        DriverCalls {
            starts: self.starts.load(Ordering::SeqCst),
            pauses: self.pauses.load(Ordering::SeqCst),
            resumes: self.resumes.load(Ordering::SeqCst),
            stops: self.stops.load(Ordering::SeqCst),
            releases: self.releases.load(Ordering::SeqCst),
            format_queries: self.format_queries.load(Ordering::SeqCst),
        }
    }

    /// Deliver one pattern frame through the last sink the driver received,
    /// as a driver callback would.
    pub fn emit(&self, timestamp: u64) -> Option<Delivery> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let sink = state.sink.as_ref()?;
        Some(sink.deliver(DriverFrame {
            data: &state.frame,
            timestamp,
            gain: 100,
            exposure_time: 8_000,
            native_handle: 0,
        }))
    }

    /// Deliver arbitrary bytes through the driver's sink.
    pub fn emit_raw(&self, data: &[u8], timestamp: u64) -> Option<Delivery> {
        let sink = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sink
            .clone()?;
        Some(sink.deliver(DriverFrame {
            data,
            timestamp,
            gain: 0,
            exposure_time: 0,
            native_handle: 0,
        }))
    }

    pub fn format(&self) -> Option<CameraFormat> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .format
    }
}

enum Command {
    Pause,
    Resume,
    Stop,
}

struct Streamer {
    commands: Sender<Command>,
    handle: JoinHandle<()>,
}

/// Camera driver producing generated frames.
///
/// In manual mode frames are only delivered through [`DriverProbe::emit`];
/// in streaming mode a thread delivers at the negotiated frame rate.
pub struct SyntheticDriver {
    formats: Vec<CameraFormat>,
    pattern: TestPattern,
    streaming: bool,
    epoch: Instant,
    probe: Arc<DriverProbe>,
    streamer: Option<Streamer>,
}

impl SyntheticDriver {
    pub fn new(formats: Vec<CameraFormat>) -> Self {
        Self {
            formats,
            pattern: TestPattern::ColorBars,
            streaming: false,
            epoch: Instant::now(),
            probe: Arc::new(DriverProbe::default()),
            streamer: None,
        }
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }

    #[must_use]
    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    /// Stamp streamed frames relative to `epoch` instead of driver creation.
    #[must_use]
    pub fn with_epoch(mut self, epoch: Instant) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn probe(&self) -> Arc<DriverProbe> {
        Arc::clone(&self.probe)
    }

    fn stop_streamer(&mut self) {
        if let Some(streamer) = self.streamer.take() {
            let _ = streamer.commands.send(Command::Stop);
            let _ = streamer.handle.join();
        }
    }
}

impl CameraDriver for SyntheticDriver {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn supported_formats(&mut self) -> Result<Vec<CameraFormat>> {
        self.probe.format_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.formats.clone())
    }

    fn set_image_format(&mut self, format: CameraFormat) -> Result<()> {
        if !self.formats.contains(&format) {
            return Err(Error::Driver(format!("unsupported mode {format:?}")));
        }
        let mut state = self.probe.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.frame = generate_frame(&format, self.pattern);
        state.format = Some(format);
        Ok(())
    }

    fn start_capture(&mut self, sink: FrameSink) -> Result<()> {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        let (format, frame) = {
            let mut state = self.probe.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.sink = Some(sink.clone());
            (state.format, state.frame.clone())
        };

        if self.streaming {
            let format = format.ok_or(Error::InvalidState("format not set before start"))?;
            let epoch = self.epoch;
            let (commands, rx) = flume::unbounded();
            let handle = std::thread::Builder::new()
                .name("synthetic-camera".into())
                .spawn(move || stream_frames(sink, format, frame, epoch, rx))?;
            self.streamer = Some(Streamer { commands, handle });
            info!(fps = format.fps, "Synthetic camera streaming");
        }
        Ok(())
    }

    fn pause_capture(&mut self) -> Result<()> {
        self.probe.pauses.fetch_add(1, Ordering::SeqCst);
        if let Some(streamer) = &self.streamer {
            let _ = streamer.commands.send(Command::Pause);
        }
        Ok(())
    }

    fn resume_capture(&mut self) -> Result<()> {
        self.probe.resumes.fetch_add(1, Ordering::SeqCst);
        if let Some(streamer) = &self.streamer {
            let _ = streamer.commands.send(Command::Resume);
        }
        Ok(())
    }

    fn stop_capture(&mut self) -> Result<()> {
        self.probe.stops.fetch_add(1, Ordering::SeqCst);
        self.stop_streamer();
        Ok(())
    }

    fn release(&mut self) {
        self.probe.releases.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for SyntheticDriver {
    fn drop(&mut self) {
        self.stop_streamer();
    }
}

fn stream_frames(
    sink: FrameSink,
    format: CameraFormat,
    frame: Vec<u8>,
    epoch: Instant,
    commands: Receiver<Command>,
) {
    let period = Duration::from_secs(1) / format.fps.max(1);
    let mut paused = false;

    loop {
        match commands.recv_timeout(period) {
            Ok(Command::Pause) => paused = true,
            Ok(Command::Resume) => paused = false,
            Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) if !paused => {
                let timestamp = u64::try_from(epoch.elapsed().as_nanos()).unwrap_or(u64::MAX);
                sink.deliver(DriverFrame {
                    data: &frame,
                    timestamp,
                    gain: 100,
                    exposure_time: 8_000,
                    native_handle: 0,
                });
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
    debug!("Synthetic camera thread exiting");
}

/// Generate one frame of `pattern` in `format`'s layout.
pub fn generate_frame(format: &CameraFormat, pattern: TestPattern) -> Vec<u8> {
    let (w, h) = (format.width as usize, format.height as usize);
    let mut rgba = vec![255u8; w * h * 4];

    const BARS: [[u8; 3]; 8] = [
        [255, 255, 255],
        [255, 255, 0],
        [0, 255, 255],
        [0, 255, 0],
        [255, 0, 255],
        [255, 0, 0],
        [0, 0, 255],
        [0, 0, 0],
    ];
    let bar_width = (w / 8).max(1);

    for y in 0..h {
        for x in 0..w {
            let color = match pattern {
                TestPattern::ColorBars => BARS[(x / bar_width).min(7)],
                TestPattern::Solid(color) => color,
            };
            let idx = (y * w + x) * 4;
            rgba[idx..idx + 3].copy_from_slice(&color);
        }
    }

    match format.pixel_format {
        PixelFormat::Rgba32 => rgba,
        PixelFormat::Rgb24 => rgba
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect(),
        PixelFormat::Yuv420 => {
            let mut out = Vec::new();
            rgba_to_i420(&rgba, format.width, format.height, &mut out);
            out
        }
    }
}
