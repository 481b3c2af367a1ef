//! Mixed-reality capture demo: camera → compositor → recorder

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use color_eyre::Result;
use tracing::{error, info, warn};

use mrcapture::capture::mock::SyntheticDriver;
use mrcapture::capture::{CameraCaptureSession, CameraDriver, FrameConsumer};
use glam::{Quat, Vec3};
use mrcapture::compositor::{Compositor, Pose, PoseHistory, StereoRig, SyntheticScene};
use mrcapture::output::{
    CaptureBehaviour, DirectoryGallery, ImagePhotoEncoder, PhotoFormat, Y4mWriter,
};
use mrcapture::provider::{EditorFrameProvider, FrameProvider, LiveFrameProvider};
use mrcapture::{CaptureParameters, Config, Metrics};

const RUN_SECONDS: u64 = 3;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter("mrcapture=debug")
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("mrcapture launching...");

    // Load configuration
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    mrcapture::CONFIG.store(Arc::new(config.clone()));
    let params = CaptureParameters::from_config(&config);
    info!(?params, "Capture parameters");

    // Camera frames and tracked poses share this clock origin
    let epoch = Instant::now();
    let driver = open_driver(&config, epoch);
    let session = Arc::new(CameraCaptureSession::new(
        driver,
        config.capture.camera_format(),
        &config.pipeline,
    ));

    let mut provider: Box<dyn FrameProvider> = match &config.placeholder.image {
        Some(path) => Box::new(EditorFrameProvider::from_path(path, config.placeholder.fps)?),
        None => Box::new(LiveFrameProvider::new(FrameConsumer::new(Arc::clone(&session)))),
    };

    let tracking = Arc::new(PoseHistory::new(256).with_stereo(StereoRig::default()));
    let mut compositor = Compositor::new(params, SyntheticScene::default(), Arc::clone(&tracking));

    let mut behaviour = CaptureBehaviour::new(
        params,
        config.recorder.clone(),
        Box::new(Y4mWriter::new()),
        Arc::new(ImagePhotoEncoder::default()),
        Arc::new(DirectoryGallery::new(config.recorder.gallery_dir.clone())),
    );

    provider.play()?;
    let recording = match behaviour.start_video() {
        Ok(path) => Some(path),
        Err(e) => {
            warn!("Video capture unavailable: {}", e);
            None
        }
    };

    let period = Duration::from_secs(1) / config.pipeline.tick_rate_hz.max(1);
    let mut ticker = tokio::time::interval(period);
    let deadline = tokio::time::sleep(Duration::from_secs(RUN_SECONDS));
    tokio::pin!(deadline);

    let mut tick = 0u64;
    let mut photo_requested = false;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }

        // Simulated head tracker: slow yaw sweep on the camera clock
        let now = u64::try_from(epoch.elapsed().as_nanos()).unwrap_or(u64::MAX);
        let yaw = (epoch.elapsed().as_secs_f32() * 0.5).sin() * 0.3;
        tracking.record(now, Pose::new(Vec3::ZERO, Quat::from_axis_angle(Vec3::Y, yaw)));

        let published = provider.tick(tick, &mut |frame| {
            let composite = compositor.compose(frame)?;
            behaviour.on_frame(&composite)
        });
        if let Err(e) = published {
            error!("Frame processing failed: {}", e);
            break;
        }

        let warmed_up = epoch.elapsed() > Duration::from_secs(1);
        if !photo_requested && warmed_up && compositor.frames_composited() > 0 {
            photo_requested = true;
            let requested = behaviour.capture_photo_async(PhotoFormat::Png, |result| match result {
                Ok(bytes) => info!(bytes = bytes.len(), "Photo captured"),
                Err(e) => error!("Photo capture failed: {}", e),
            });
            if let Err(e) = requested {
                warn!("Photo capture unavailable: {}", e);
            }
        }
        tick += 1;
    }

    // Shutdown order: behaviour, then provider, then its consumer
    if recording.is_some() {
        match behaviour.stop_video() {
            Ok(insert) => {
                if let Err(e) = insert.wait_async().await {
                    error!("Gallery insertion failed: {}", e);
                }
            }
            Err(e) => error!("Stopping video failed: {}", e),
        }
    }
    behaviour.shutdown()?;
    provider.stop();
    provider.release();
    drop(provider);

    let metrics: Metrics = session.metrics();
    info!(
        composited = compositor.frames_composited(),
        enqueued = metrics.frames_enqueued,
        dropped = metrics.frames_dropped,
        rejected = metrics.frames_rejected,
        pool_created = metrics.pool.created,
        "mrcapture shutting down"
    );
    Ok(())
}

fn open_driver(config: &Config, epoch: Instant) -> Box<dyn CameraDriver> {
    #[cfg(feature = "v4l2")]
    match mrcapture::capture::V4l2Driver::open(config.capture.clone()) {
        Ok(driver) => return Box::new(driver),
        Err(e) => warn!("V4L2 camera unavailable, using synthetic camera: {}", e),
    }

    info!("Using synthetic camera");
    Box::new(
        SyntheticDriver::new(vec![config.capture.camera_format()])
            .with_epoch(epoch)
            .streaming(),
    )
}
