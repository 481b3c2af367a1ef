//! Photo and video capture orchestration on top of the compositor output

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use flume::{Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::compositor::Composite;
use crate::error::{Error, Result};
use crate::output::encoder::{AudioChannel, MediaGallery, PhotoEncoder, PhotoFormat, VideoEncoder};
use crate::utils::unix_millis;
use crate::{CaptureParameters, RecorderConfig};

pub type PhotoCallback = Box<dyn FnOnce(Result<Bytes>) + Send>;

/// One pending asynchronous photo request, consumed exactly once.
pub struct CaptureTask {
    pub id: u64,
    pub width: u32,
    pub height: u32,
    pub format: PhotoFormat,
    pixels: Vec<u8>,
    completion: PhotoCallback,
}

impl CaptureTask {
    fn complete(self, result: Result<Bytes>) {
        (self.completion)(result);
    }
}

/// Outcome of a deferred media-gallery insertion.
pub struct GalleryInsert {
    rx: Receiver<Result<()>>,
}

impl GalleryInsert {
    /// Block until the insertion has run.
    pub fn wait(self) -> Result<()> {
        self.rx.recv().unwrap_or(Err(Error::Cancelled))
    }

    pub async fn wait_async(self) -> Result<()> {
        self.rx.recv_async().await.unwrap_or(Err(Error::Cancelled))
    }
}

/// Encodes photos and files them into the gallery.
struct Publisher {
    photo: Arc<dyn PhotoEncoder>,
    gallery: Arc<dyn MediaGallery>,
    folder: String,
    save_photos: bool,
}

impl Publisher {
    fn photo(&self, width: u32, height: u32, rgba: &[u8], format: PhotoFormat) -> Result<Bytes> {
        let bytes = self.photo.encode(width, height, rgba, format)?;
        if self.save_photos {
            let name = format!("mrc_{}.{}", unix_millis(), format.extension());
            self.gallery.insert_image(&bytes, &name, &self.folder)?;
        }
        metrics::counter!("mrc_photos_total").increment(1);
        Ok(bytes)
    }
}

struct Readback {
    tx: Option<Sender<CaptureTask>>,
    /// Kept so queued tasks can be cancelled before the worker reaches them.
    rx: Receiver<CaptureTask>,
    worker: Option<JoinHandle<()>>,
    pending: Arc<AtomicUsize>,
}

fn readback_worker(
    rx: Receiver<CaptureTask>,
    publisher: Arc<Publisher>,
    pending: Arc<AtomicUsize>,
) {
    while let Ok(task) = rx.recv() {
        let result = publisher.photo(task.width, task.height, &task.pixels, task.format);
        match &result {
            Ok(bytes) => debug!(id = task.id, bytes = bytes.len(), "Async photo captured"),
            Err(e) => warn!(id = task.id, error = %e, "Async photo capture failed"),
        }
        task.complete(result);
        pending.fetch_sub(1, Ordering::AcqRel);
    }
    debug!("Readback worker exiting");
}

/// Photo request parked until the next composited frame.
struct PhotoRequest {
    id: u64,
    format: PhotoFormat,
    completion: PhotoCallback,
}

/// Drives photo and video capture from composited frames.
///
/// Recording start and stop are independent of the camera session; the
/// camera may keep running for preview after a recording ends.
pub struct CaptureBehaviour {
    params: CaptureParameters,
    recorder: RecorderConfig,
    video: Box<dyn VideoEncoder>,
    publisher: Arc<Publisher>,
    readback: Option<Readback>,
    requests: Vec<PhotoRequest>,
    recording: Option<PathBuf>,
    next_task: u64,
    frames_committed: u64,
}

impl CaptureBehaviour {
    pub fn new(
        params: CaptureParameters,
        recorder: RecorderConfig,
        video: Box<dyn VideoEncoder>,
        photo: Arc<dyn PhotoEncoder>,
        gallery: Arc<dyn MediaGallery>,
    ) -> Self {
        let publisher = Arc::new(Publisher {
            photo,
            gallery,
            folder: recorder.gallery_folder.clone(),
            save_photos: recorder.save_photos,
        });

        let readback = if recorder.async_readback && recorder.photo_supported {
            spawn_readback(Arc::clone(&publisher))
        } else {
            None
        };

        Self {
            params,
            recorder,
            video,
            publisher,
            readback,
            requests: Vec::new(),
            recording: None,
            next_task: 0,
            frames_committed: 0,
        }
    }

    pub fn params(&self) -> &CaptureParameters {
        &self.params
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    pub fn frames_committed(&self) -> u64 {
        self.frames_committed
    }

    /// Asynchronous photo requests waiting for a frame, queued, or in flight.
    pub fn pending_tasks(&self) -> usize {
        let queued = self
            .readback
            .as_ref()
            .map_or(0, |rb| rb.pending.load(Ordering::Acquire));
        self.requests.len() + queued
    }

    /// Whether photos are encoded off the calling thread.
    pub fn has_async_readback(&self) -> bool {
        self.readback.is_some()
    }

    /// Hand one composited frame to the active capture shapes.
    pub fn on_frame(&mut self, composite: &Composite<'_>) -> Result<()> {
        if !self.requests.is_empty() {
            self.dispatch_photos(composite);
        }
        if self.recording.is_some() {
            self.video.commit(composite.target, composite.timestamp)?;
            self.frames_committed += 1;
        }
        Ok(())
    }

    pub fn start_video(&mut self) -> Result<PathBuf> {
        if !self.recorder.video_supported {
            return Err(Error::CaptureUnavailable(
                "video capture is not supported on this device".into(),
            ));
        }
        if self.recording.is_some() {
            return Err(Error::InvalidState("already recording"));
        }

        let name = format!("mrc_{}.{}", unix_millis(), self.video.extension());
        let path = self.recorder.output_dir.join(name);
        self.video.set_output_path(&path)?;
        self.video.set_volume(AudioChannel::Microphone, volume(self.params.record_microphone));
        self.video.set_volume(AudioChannel::Application, volume(self.params.record_app_audio));

        let width = self.params.blend_mode.output_width(self.params.width);
        self.video.start(width, self.params.height, self.params.fps)?;

        info!(path = %path.display(), width, height = self.params.height, "Video capture started");
        self.recording = Some(path.clone());
        self.frames_committed = 0;
        Ok(path)
    }

    /// Finish the recording and schedule its gallery insertion after the
    /// configured grace delay.
    pub fn stop_video(&mut self) -> Result<GalleryInsert> {
        if self.recording.take().is_none() {
            return Err(Error::InvalidState("not recording"));
        }
        let path = self.video.finish()?;
        info!(path = %path.display(), frames = self.frames_committed, "Video capture stopped");
        Ok(self.schedule_gallery_insert(path))
    }

    fn schedule_gallery_insert(&self, path: PathBuf) -> GalleryInsert {
        let (tx, rx) = flume::bounded(1);
        let gallery = Arc::clone(&self.publisher.gallery);
        let folder = self.publisher.folder.clone();
        let delay = Duration::from_millis(self.recorder.gallery_delay_ms);

        let insert = move || {
            let display_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("mrc_{}", unix_millis()));
            let result = gallery.insert_video(&path, &display_name, &folder);
            if let Err(e) = &result {
                error!(path = %path.display(), error = %e, "Gallery insertion failed");
            }
            let _ = tx.send(result);
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = tokio::task::spawn_blocking(insert).await {
                        error!(error = %e, "Gallery insertion task failed");
                    }
                });
            }
            Err(_) => {
                let spawned = std::thread::Builder::new()
                    .name("mrc-gallery".into())
                    .spawn(move || {
                        std::thread::sleep(delay);
                        insert();
                    });
                if let Err(e) = spawned {
                    error!(error = %e, "Could not schedule gallery insertion");
                }
            }
        }
        GalleryInsert { rx }
    }

    /// Encode `composite` on the calling thread.
    pub fn capture_photo_sync(
        &self,
        composite: &Composite<'_>,
        format: PhotoFormat,
    ) -> Result<Bytes> {
        self.check_photo()?;
        info!(timestamp = composite.timestamp, ?format, "Capturing photo");
        let target = composite.target;
        self.publisher.photo(target.width(), target.height(), target.pixels(), format)
    }

    /// Request a photo of the next composited frame.
    ///
    /// The frame is copied during the next [`on_frame`](Self::on_frame) and
    /// encoded on the readback worker. Without a worker it is encoded inline
    /// in that call and `completion` runs there.
    pub fn capture_photo_async(
        &mut self,
        format: PhotoFormat,
        completion: impl FnOnce(Result<Bytes>) + Send + 'static,
    ) -> Result<u64> {
        self.check_photo()?;
        let id = self.next_task;
        self.next_task += 1;
        self.requests.push(PhotoRequest {
            id,
            format,
            completion: Box::new(completion),
        });
        debug!(id, ?format, "Photo requested");
        Ok(id)
    }

    fn dispatch_photos(&mut self, composite: &Composite<'_>) {
        let target = composite.target;
        for request in std::mem::take(&mut self.requests) {
            let task = CaptureTask {
                id: request.id,
                width: target.width(),
                height: target.height(),
                format: request.format,
                pixels: target.pixels().to_vec(),
                completion: request.completion,
            };
            debug!(id = task.id, timestamp = composite.timestamp, "Photo frame captured");
            self.submit(task);
        }
    }

    fn submit(&self, task: CaptureTask) {
        let task = match self.readback.as_ref() {
            Some(Readback { tx: Some(tx), pending, .. }) => {
                pending.fetch_add(1, Ordering::AcqRel);
                match tx.send(task) {
                    Ok(()) => return,
                    Err(flume::SendError(task)) => {
                        pending.fetch_sub(1, Ordering::AcqRel);
                        warn!(id = task.id, "Readback worker gone; capturing synchronously");
                        task
                    }
                }
            }
            _ => task,
        };
        let result = self.publisher.photo(task.width, task.height, &task.pixels, task.format);
        task.complete(result);
    }

    fn check_photo(&self) -> Result<()> {
        if !self.recorder.photo_supported {
            return Err(Error::CaptureUnavailable(
                "photo capture is not supported on this device".into(),
            ));
        }
        Ok(())
    }

    /// Cancel photo requests the worker has not started. Each completion
    /// receives [`Error::Cancelled`].
    pub fn cancel_pending(&mut self) -> usize {
        let mut cancelled = 0;
        for request in std::mem::take(&mut self.requests) {
            warn!(id = request.id, "Photo request cancelled before its frame");
            (request.completion)(Err(Error::Cancelled));
            cancelled += 1;
        }
        if let Some(rb) = &self.readback {
            for task in rb.rx.try_iter() {
                warn!(id = task.id, "Photo task cancelled before readback");
                task.complete(Err(Error::Cancelled));
                rb.pending.fetch_sub(1, Ordering::AcqRel);
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Finish any recording and let queued photo tasks complete.
    ///
    /// Requests still waiting for a frame fail with [`Error::NoFrame`].
    /// Must run before the frame provider and camera are released.
    pub fn shutdown(&mut self) -> Result<()> {
        let video = if self.recording.is_some() {
            warn!("Shutting down while recording; finishing video");
            self.stop_video().map(drop)
        } else {
            Ok(())
        };

        for request in std::mem::take(&mut self.requests) {
            warn!(id = request.id, "No frame arrived for photo request");
            (request.completion)(Err(Error::NoFrame));
        }

        if let Some(mut rb) = self.readback.take() {
            let outstanding = rb.pending.load(Ordering::Acquire);
            if outstanding > 0 {
                warn!(outstanding, "Waiting for outstanding photo tasks before release");
            }
            drop(rb.tx.take());
            if let Some(worker) = rb.worker.take() {
                if worker.join().is_err() {
                    error!("Readback worker panicked");
                }
            }
        }
        video
    }
}

impl Drop for CaptureBehaviour {
    fn drop(&mut self) {
        if self.recording.is_some() || self.readback.is_some() || !self.requests.is_empty() {
            if let Err(e) = self.shutdown() {
                error!(error = %e, "Capture shutdown on drop failed");
            }
        }
    }
}

fn spawn_readback(publisher: Arc<Publisher>) -> Option<Readback> {
    let (tx, rx) = flume::unbounded();
    let pending = Arc::new(AtomicUsize::new(0));
    let worker_rx = rx.clone();
    let worker_pending = Arc::clone(&pending);

    match std::thread::Builder::new()
        .name("mrc-readback".into())
        .spawn(move || readback_worker(worker_rx, publisher, worker_pending))
    {
        Ok(worker) => Some(Readback {
            tx: Some(tx),
            rx,
            worker: Some(worker),
            pending,
        }),
        Err(e) => {
            warn!(error = %e, "Readback worker unavailable; photos will be synchronous");
            None
        }
    }
}

const fn volume(enabled: bool) -> f32 {
    if enabled {
        1.0
    } else {
        0.0
    }
}
