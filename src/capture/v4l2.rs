//! V4L2 camera driver with memory-mapped capture on a dedicated thread

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{error, info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::framesize::FrameSizeEnum;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::capture::driver::{CameraDriver, DriverFrame};
use crate::capture::frame::{CameraFormat, PixelFormat};
use crate::capture::session::FrameSink;
use crate::error::{Error, Result};
use crate::CaptureConfig;

fn fourcc(format: PixelFormat) -> FourCC {
    match format {
        PixelFormat::Rgb24 => FourCC::new(b"RGB3"),
        PixelFormat::Rgba32 => FourCC::new(b"AB24"),
        PixelFormat::Yuv420 => FourCC::new(b"YU12"),
    }
}

fn pixel_format(fourcc: FourCC) -> Option<PixelFormat> {
    match &fourcc.repr {
        b"RGB3" => Some(PixelFormat::Rgb24),
        b"AB24" => Some(PixelFormat::Rgba32),
        b"YU12" => Some(PixelFormat::Yuv420),
        _ => None,
    }
}

fn io_err(e: std::io::Error) -> Error {
    Error::Driver(e.to_string())
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Camera driver over a V4L2 capture device
pub struct V4l2Driver {
    device: Device,
    config: CaptureConfig,
    format: Option<CameraFormat>,
    paused: Arc<AtomicBool>,
    worker: Option<Worker>,
}

impl V4l2Driver {
    pub fn open(config: CaptureConfig) -> Result<Self> {
        info!("Opening V4L2 device: {}", config.device);

        let device = Device::with_path(&config.device).map_err(io_err)?;
        let caps = device.query_caps().map_err(io_err)?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(Error::CaptureUnavailable(
                "device doesn't support video capture".into(),
            ));
        }

        Ok(Self {
            device,
            config,
            format: None,
            paused: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }

    fn stop_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop.store(true, Ordering::Release);
            if worker.handle.join().is_err() {
                error!("V4L2 capture thread panicked");
            }
        }
    }
}

impl CameraDriver for V4l2Driver {
    fn name(&self) -> &str {
        "v4l2"
    }

    fn supported_formats(&mut self) -> Result<Vec<CameraFormat>> {
        let mut modes = Vec::new();
        for desc in self.device.enum_formats().map_err(io_err)? {
            let Some(format) = pixel_format(desc.fourcc) else {
                continue;
            };
            for size in self.device.enum_framesizes(desc.fourcc).map_err(io_err)? {
                if let FrameSizeEnum::Discrete(d) = size.size {
                    modes.push(CameraFormat::new(d.width, d.height, self.config.fps, format));
                }
            }
        }
        info!(count = modes.len(), "Enumerated V4L2 modes");
        Ok(modes)
    }

    fn set_image_format(&mut self, format: CameraFormat) -> Result<()> {
        let mut fmt = self.device.format().map_err(io_err)?;
        fmt.width = format.width;
        fmt.height = format.height;
        fmt.fourcc = fourcc(format.pixel_format);
        let actual = self.device.set_format(&fmt).map_err(io_err)?;

        if actual.width != format.width || actual.height != format.height {
            return Err(Error::Driver(format!(
                "driver chose {}x{} instead of {}x{}",
                actual.width, actual.height, format.width, format.height
            )));
        }
        self.format = Some(format);
        Ok(())
    }

    #[instrument(skip(self, sink))]
    fn start_capture(&mut self, sink: FrameSink) -> Result<()> {
        let format = self
            .format
            .ok_or(Error::InvalidState("format not set before start"))?;
        let path = self.config.device.clone();
        let buffer_count = self.config.buffer_count;
        let stop = Arc::new(AtomicBool::new(false));
        let paused = Arc::clone(&self.paused);
        paused.store(false, Ordering::Release);

        let thread_stop = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("v4l2-capture".into())
            .spawn(move || {
                if let Err(e) = capture_loop(&path, buffer_count, &sink, &thread_stop, &paused) {
                    error!("V4L2 capture loop failed: {}", e);
                }
            })?;

        self.worker = Some(Worker { stop, handle });
        info!(
            "Capture stream started with {} buffers at {}x{}",
            buffer_count, format.width, format.height
        );
        Ok(())
    }

    fn pause_capture(&mut self) -> Result<()> {
        self.paused.store(true, Ordering::Release);
        Ok(())
    }

    fn resume_capture(&mut self) -> Result<()> {
        self.paused.store(false, Ordering::Release);
        Ok(())
    }

    fn stop_capture(&mut self) -> Result<()> {
        self.stop_worker();
        Ok(())
    }

    fn release(&mut self) {
        self.stop_worker();
        self.format = None;
    }
}

impl Drop for V4l2Driver {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

fn capture_loop(
    path: &str,
    buffer_count: u32,
    sink: &FrameSink,
    stop: &AtomicBool,
    paused: &AtomicBool,
) -> std::io::Result<()> {
    let device = Device::with_path(path)?;
    let mut stream = MmapStream::with_buffers(&device, Type::VideoCapture, buffer_count)?;

    while !stop.load(Ordering::Acquire) {
        let (buf, meta) = stream.next()?;
        if paused.load(Ordering::Acquire) {
            continue;
        }

        let timestamp = Duration::from_secs(meta.timestamp.sec as u64)
            + Duration::from_micros(meta.timestamp.usec as u64);
        let used = (meta.bytesused as usize).min(buf.len());
        let delivery = sink.deliver(DriverFrame {
            data: &buf[..used],
            timestamp: u64::try_from(timestamp.as_nanos()).unwrap_or(u64::MAX),
            gain: 0,
            exposure_time: 0,
            native_handle: meta.sequence as usize,
        });
        if delivery != crate::capture::Delivery::Accepted {
            warn!(?delivery, "V4L2 frame not accepted");
        }
    }
    Ok(())
}
