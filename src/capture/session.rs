//! Reference-counted lifecycle owner of one physical camera stream

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, instrument, warn};

use crate::capture::driver::{CameraDriver, DriverFrame};
use crate::capture::frame::{CameraFormat, FrameSample};
use crate::error::Result;
use crate::pipeline::{BoundedFrameQueue, FramePool};
use crate::{utils, Metrics, PipelineConfig};

const STOPPED: u8 = 0;
const PLAYING: u8 = 1;
const PAUSED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Playing,
    /// Playing with delivery suspended.
    Paused,
}

impl SessionState {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            PLAYING => Self::Playing,
            PAUSED => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

/// Identity of a registered consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerId(u64);

/// Outcome of one driver delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Accepted,
    /// Session was stopped: the driver kept delivering after `stop_capture`.
    RejectedStopped,
    /// Session was paused; late frames are dropped quietly.
    RejectedPaused,
    /// Empty buffer or a size that does not match the negotiated format.
    Malformed,
}

/// State shared between the session and driver threads.
struct Shared {
    state: AtomicU8,
    queue: BoundedFrameQueue,
    expected_len: AtomicUsize,
    rejected: AtomicU64,
}

/// Producer-side handle given to drivers. Cloneable and `Send`.
#[derive(Clone)]
pub struct FrameSink {
    shared: Arc<Shared>,
}

impl FrameSink {
    /// Copy one driver buffer into a pooled sample and enqueue it.
    ///
    /// Never blocks beyond the queue's critical section and never fails:
    /// contract violations are logged and the frame is dropped.
    pub fn deliver(&self, frame: DriverFrame<'_>) -> Delivery {
        let shared = &self.shared;

        match shared.state.load(Ordering::Acquire) {
            STOPPED => {
                shared.rejected.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("mrc_driver_contract_violations_total").increment(1);
                error!(
                    timestamp = frame.timestamp,
                    "Driver delivered a frame while the session is stopped; dropping it"
                );
                return Delivery::RejectedStopped;
            }
            PAUSED => {
                debug!(timestamp = frame.timestamp, "Dropping frame delivered while paused");
                return Delivery::RejectedPaused;
            }
            _ => {}
        }

        let expected = shared.expected_len.load(Ordering::Relaxed);
        if frame.data.is_empty() || (expected != 0 && frame.data.len() != expected) {
            shared.rejected.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("mrc_driver_contract_violations_total").increment(1);
            error!(
                size = frame.data.len(),
                expected,
                "Driver delivered a malformed buffer; dropping it"
            );
            return Delivery::Malformed;
        }

        let mut sample = shared.queue.pool().get();
        sample.timestamp = frame.timestamp;
        sample.gain = frame.gain;
        sample.exposure_time = frame.exposure_time;
        sample.native_handle = frame.native_handle;
        sample.fill(frame.data);
        shared.queue.enqueue(sample);

        Delivery::Accepted
    }
}

struct Control {
    driver: Box<dyn CameraDriver>,
    /// Driver started and not yet released.
    driver_live: bool,
    requested: Option<CameraFormat>,
    format_locked: bool,
    supported: Option<Vec<CameraFormat>>,
    negotiated: Option<CameraFormat>,
    consumers: HashSet<ConsumerId>,
    paused_consumers: HashSet<ConsumerId>,
    stop_pending: bool,
}

/// Owns one camera driver and the queue its frames land in.
///
/// Several consumers may share the session. [`stop`](Self::stop) only takes
/// effect once no consumer is registered; until then it is deferred, and the
/// last [`remove`](Self::remove) completes it.
pub struct CameraCaptureSession {
    shared: Arc<Shared>,
    control: Mutex<Control>,
    default_format: CameraFormat,
    next_consumer: AtomicU64,
}

impl CameraCaptureSession {
    pub fn new(
        driver: Box<dyn CameraDriver>,
        default_format: CameraFormat,
        pipeline: &PipelineConfig,
    ) -> Self {
        let pool = Arc::new(FramePool::new(
            pipeline.pool_init_count,
            default_format.frame_len(),
            pipeline.pool_max_live,
        ));

        info!(
            driver = driver.name(),
            queue_limit = pipeline.queue_limit,
            "Creating camera capture session"
        );

        Self {
            shared: Arc::new(Shared {
                state: AtomicU8::new(STOPPED),
                queue: BoundedFrameQueue::new(pipeline.queue_limit, pool),
                expected_len: AtomicUsize::new(0),
                rejected: AtomicU64::new(0),
            }),
            control: Mutex::new(Control {
                driver,
                driver_live: false,
                requested: None,
                format_locked: false,
                supported: None,
                negotiated: None,
                consumers: HashSet::new(),
                paused_consumers: HashSet::new(),
                stop_pending: false,
            }),
            default_format,
            next_consumer: AtomicU64::new(1),
        }
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: u8) {
        self.shared.state.store(state, Ordering::Release);
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_raw(self.shared.state.load(Ordering::Acquire))
    }

    /// Handle for the driver thread.
    pub fn sink(&self) -> FrameSink {
        FrameSink {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Request a camera mode. Only the first request before the first
    /// [`play`](Self::play) is honoured; returns whether it was accepted.
    pub fn set_image_format(&self, format: CameraFormat) -> bool {
        let mut control = self.control();
        if control.format_locked {
            warn!(?format, "Image format is fixed for this session; ignoring request");
            return false;
        }
        control.requested = Some(format);
        control.format_locked = true;
        info!(?format, "Image format requested");
        true
    }

    /// Start streaming. A no-op while already playing or paused.
    #[instrument(skip(self))]
    pub fn play(&self) -> Result<()> {
        let mut control = self.control();
        if self.state() != SessionState::Stopped {
            debug!("Session already playing");
            return Ok(());
        }

        let format = match control.negotiated {
            Some(format) => format,
            None => self.negotiate(&mut control)?,
        };

        control.stop_pending = false;
        self.set_state(PLAYING);
        if let Err(e) = control.driver.start_capture(self.sink()) {
            self.set_state(STOPPED);
            return Err(e);
        }
        control.driver_live = true;

        info!(
            width = format.width,
            height = format.height,
            fps = format.fps,
            pixel_format = ?format.pixel_format,
            "Camera session playing"
        );
        Ok(())
    }

    fn negotiate(&self, control: &mut Control) -> Result<CameraFormat> {
        if control.supported.is_none() {
            control.supported = Some(control.driver.supported_formats()?);
        }
        let supported = control.supported.as_deref().unwrap_or_default();
        let requested = control.requested.unwrap_or(self.default_format);
        let format = utils::select_format(supported, &requested)?;

        control.driver.set_image_format(format)?;
        control.negotiated = Some(format);
        control.format_locked = true;
        self.shared
            .expected_len
            .store(format.frame_len(), Ordering::Relaxed);
        Ok(format)
    }

    pub fn pause(&self) -> Result<()> {
        let mut control = self.control();
        self.pause_locked(&mut control)
    }

    fn pause_locked(&self, control: &mut Control) -> Result<()> {
        if self.state() != SessionState::Playing {
            return Ok(());
        }
        control.driver.pause_capture()?;
        self.set_state(PAUSED);
        debug!("Camera session paused");
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        let mut control = self.control();
        self.resume_locked(&mut control)
    }

    fn resume_locked(&self, control: &mut Control) -> Result<()> {
        if self.state() != SessionState::Paused {
            return Ok(());
        }
        control.driver.resume_capture()?;
        self.set_state(PLAYING);
        debug!("Camera session resumed");
        Ok(())
    }

    /// Stop streaming once no consumer is registered.
    ///
    /// Returns `true` if the session stopped now, `false` if the stop was
    /// deferred to the last consumer's removal.
    pub fn stop(&self) -> bool {
        let mut control = self.control();
        if !control.consumers.is_empty() {
            control.stop_pending = true;
            debug!(
                consumers = control.consumers.len(),
                "Stop deferred until all consumers are removed"
            );
            return false;
        }
        shutdown(&self.shared, &mut control);
        true
    }

    pub fn new_consumer_id(&self) -> ConsumerId {
        ConsumerId(self.next_consumer.fetch_add(1, Ordering::Relaxed))
    }

    /// Register an active consumer. Idempotent.
    ///
    /// A paused session resumes, since the new consumer is not paused.
    pub fn regist(&self, id: ConsumerId) -> Result<bool> {
        let mut control = self.control();
        let added = control.consumers.insert(id);
        if added {
            debug!(?id, consumers = control.consumers.len(), "Consumer registered");
            if !control.paused_consumers.contains(&id) {
                self.resume_locked(&mut control)?;
            }
        }
        Ok(added)
    }

    /// Deregister a consumer. Completes a deferred stop when it was the last.
    pub fn remove(&self, id: ConsumerId) -> bool {
        let mut control = self.control();
        control.paused_consumers.remove(&id);
        if !control.consumers.remove(&id) {
            return false;
        }
        debug!(?id, consumers = control.consumers.len(), "Consumer removed");

        if control.consumers.is_empty() {
            if control.stop_pending {
                shutdown(&self.shared, &mut control);
            }
        } else if control.paused_consumers.len() == control.consumers.len() {
            if let Err(e) = self.pause_locked(&mut control) {
                error!("Failed to pause capture after consumer removal: {}", e);
            }
        }
        true
    }

    /// Mark one consumer paused; the driver pauses once all of them are.
    pub fn pause_consumer(&self, id: ConsumerId) -> Result<()> {
        let mut control = self.control();
        if !control.consumers.contains(&id) {
            return Ok(());
        }
        control.paused_consumers.insert(id);
        if control.paused_consumers.len() == control.consumers.len() {
            self.pause_locked(&mut control)?;
        }
        Ok(())
    }

    pub fn resume_consumer(&self, id: ConsumerId) -> Result<()> {
        let mut control = self.control();
        if control.paused_consumers.remove(&id) {
            self.resume_locked(&mut control)?;
        }
        Ok(())
    }

    pub fn consumer_count(&self) -> usize {
        self.control().consumers.len()
    }

    pub fn negotiated_format(&self) -> Option<CameraFormat> {
        self.control().negotiated
    }

    /// See [`BoundedFrameQueue::has_frame`]. Always false unless playing.
    pub fn has_frame(&self, tick: u64) -> bool {
        self.state() == SessionState::Playing && self.shared.queue.has_frame(tick)
    }

    pub fn with_current_frame<R>(&self, f: impl FnOnce(&FrameSample) -> R) -> Option<R> {
        self.shared.queue.with_current_frame(f)
    }

    pub fn queue(&self) -> &BoundedFrameQueue {
        &self.shared.queue
    }

    pub fn metrics(&self) -> Metrics {
        let queue = self.shared.queue.stats();
        Metrics {
            frames_enqueued: queue.written,
            frames_consumed: queue.read,
            frames_dropped: queue.dropped,
            frames_rejected: self.shared.rejected.load(Ordering::Relaxed),
            pool: self.shared.queue.pool().stats(),
        }
    }
}

impl Drop for CameraCaptureSession {
    fn drop(&mut self) {
        let control = self.control.get_mut().unwrap_or_else(PoisonError::into_inner);
        if control.driver_live {
            warn!("Camera session dropped while streaming; releasing driver");
            control.consumers.clear();
            shutdown(&self.shared, control);
        }
    }
}

fn shutdown(shared: &Shared, control: &mut Control) {
    control.stop_pending = false;
    shared.state.store(STOPPED, Ordering::Release);
    if !control.driver_live {
        return;
    }

    if let Err(e) = control.driver.stop_capture() {
        error!("Failed to stop capture: {}", e);
    }
    control.driver.release();
    control.driver_live = false;

    let released = shared.queue.clear();
    info!(released, "Camera session stopped, driver released");
}
