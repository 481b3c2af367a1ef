//! End-to-end pipeline scenarios: driver → session → consumer → provider →
//! compositor.

use std::sync::{Arc, Mutex};

use glam::Vec3;
use mrcapture::capture::mock::{DriverProbe, SyntheticDriver, TestPattern};
use mrcapture::capture::{
    CameraCaptureSession, CameraFormat, Delivery, FrameConsumer, FrameSample, PixelFormat,
    SessionState,
};
use mrcapture::compositor::{
    BlendMode, CaptureSide, Compositor, Pose, PoseHistory, Projection, RenderTarget, VirtualCamera,
};
use mrcapture::pipeline::{BoundedFrameQueue, FramePool};
use mrcapture::provider::{FrameProvider, LiveFrameProvider};
use mrcapture::{CaptureParameters, Error, PipelineConfig};

fn format(pixel_format: PixelFormat) -> CameraFormat {
    CameraFormat::new(4, 2, 30, pixel_format)
}

fn session_with(pixel_format: PixelFormat) -> (Arc<CameraCaptureSession>, Arc<DriverProbe>) {
    let driver = SyntheticDriver::new(vec![format(pixel_format)])
        .with_pattern(TestPattern::Solid([200, 40, 40]));
    let probe = driver.probe();
    let session = Arc::new(CameraCaptureSession::new(
        Box::new(driver),
        format(pixel_format),
        &PipelineConfig::default(),
    ));
    (session, probe)
}

fn params(mode: BlendMode, pixel_format: PixelFormat) -> CaptureParameters {
    CaptureParameters {
        width: 4,
        height: 2,
        fps: 30,
        pixel_format,
        blend_mode: mode,
        record_microphone: false,
        record_app_audio: false,
        capture_side: CaptureSide::Single,
        lock_roll: false,
    }
}

/// Virtual camera that logs every pose applied to it.
struct RecordingCamera {
    pose: Pose,
    projection: Projection,
    applied: Arc<Mutex<Vec<Pose>>>,
}

impl VirtualCamera for RecordingCamera {
    fn pose(&self) -> Pose {
        self.pose
    }

    fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
        self.applied.lock().unwrap().push(pose);
    }

    fn projection(&self) -> Projection {
        self.projection
    }

    fn set_projection(&mut self, projection: Projection) {
        self.projection = projection;
    }

    fn render(&mut self, target: &mut RenderTarget) -> mrcapture::Result<()> {
        target.fill([0, 255, 0, 128]);
        Ok(())
    }
}

#[test]
fn overflow_keeps_most_recent_frames_in_order() {
    let pool = Arc::new(FramePool::new(2, 16, 64));
    let queue = BoundedFrameQueue::new(5, Arc::clone(&pool));

    for ts in 100..108 {
        let mut sample = pool.get();
        sample.timestamp = ts;
        sample.fill(&[ts as u8; 16]);
        queue.enqueue(sample);
    }

    assert_eq!(queue.timestamps(), vec![103, 104, 105, 106, 107]);
    assert_eq!(queue.stats().dropped, 3);
    assert_eq!(pool.stats().returned, 3);

    let mut drained = Vec::new();
    while let Some(ts) = queue.dequeue_with(|s| s.timestamp) {
        drained.push(ts);
    }
    assert_eq!(drained, vec![103, 104, 105, 106, 107]);
}

#[test]
fn has_frame_is_stable_within_a_tick() {
    let pool = Arc::new(FramePool::new(2, 4, 8));
    let queue = BoundedFrameQueue::new(5, Arc::clone(&pool));
    let mut sample = pool.get();
    sample.timestamp = 1;
    queue.enqueue(sample);

    assert!(queue.has_frame(1));
    assert!(queue.has_frame(1));
    assert!(queue.is_empty());
    assert!(!queue.has_frame(2));
    assert!(!queue.has_frame(3));
}

#[test]
fn recycled_sample_never_leaks_previous_bytes() {
    let pool = FramePool::new(1, 8, 4);
    let mut sample = pool.get();
    sample.fill(&[9; 8]);
    pool.put(sample);

    let mut reused: FrameSample = pool.get();
    assert!(reused.pixels().is_empty());
    reused.fill(&[1, 2, 3]);
    assert_eq!(reused.pixels(), &[1, 2, 3]);
    assert_eq!(pool.stats().created, 1);
}

#[test]
fn play_twice_starts_driver_once() {
    let (session, probe) = session_with(PixelFormat::Rgb24);
    session.play().expect("play should succeed");
    session.play().expect("second play should be a no-op");

    let calls = probe.calls();
    assert_eq!(calls.starts, 1);
    assert_eq!(calls.format_queries, 1);
    assert_eq!(session.state(), SessionState::Playing);
}

#[test]
fn session_outlives_stop_until_last_consumer_leaves() {
    let (session, probe) = session_with(PixelFormat::Rgb24);
    let mut preview = FrameConsumer::new(Arc::clone(&session));
    let mut recorder = FrameConsumer::new(Arc::clone(&session));
    preview.play().expect("play should succeed");
    recorder.play().expect("play should succeed");

    assert!(!session.stop());
    assert_eq!(session.state(), SessionState::Playing);

    preview.stop();
    assert_eq!(session.state(), SessionState::Playing);
    assert_eq!(probe.calls().releases, 0);

    recorder.stop();
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(probe.calls().releases, 1);

    drop(preview);
    drop(recorder);
    assert_eq!(probe.calls().releases, 1);
}

#[test]
fn delivery_after_stop_is_rejected_without_leaking() {
    let (session, probe) = session_with(PixelFormat::Rgb24);
    let mut consumer = FrameConsumer::new(Arc::clone(&session));
    consumer.play().expect("play should succeed");
    consumer.stop();
    assert_eq!(session.state(), SessionState::Stopped);

    let before = session.queue().pool().stats();
    assert_eq!(probe.emit(42), Some(Delivery::RejectedStopped));
    assert_eq!(session.queue().pool().stats(), before);
    assert_eq!(session.metrics().frames_rejected, 1);
    assert!(session.queue().is_empty());
}

#[test]
fn two_consumers_see_the_same_frame_in_one_tick() {
    let (session, probe) = session_with(PixelFormat::Rgb24);
    let mut a = FrameConsumer::new(Arc::clone(&session));
    let mut b = FrameConsumer::new(Arc::clone(&session));
    a.play().expect("play should succeed");
    b.play().expect("play should succeed");

    assert_eq!(probe.emit(7), Some(Delivery::Accepted));
    assert!(a.update(1));
    assert!(b.update(1));
    assert_eq!(a.with_current_frame(|s| s.timestamp), Some(7));
    assert_eq!(b.with_current_frame(|s| s.timestamp), Some(7));

    assert!(!a.update(2));
    assert!(!b.update(2));
    assert!(!b.did_update_this_frame());
}

#[test]
fn widescreen_with_yuv_fails_before_blit() {
    let (session, probe) = session_with(PixelFormat::Yuv420);
    let mut provider = LiveFrameProvider::new(FrameConsumer::new(Arc::clone(&session)));
    provider.play().expect("play should succeed");
    assert_eq!(probe.emit(10), Some(Delivery::Accepted));

    let applied = Arc::new(Mutex::new(Vec::new()));
    let camera = RecordingCamera {
        pose: Pose::IDENTITY,
        projection: Projection::default(),
        applied: Arc::clone(&applied),
    };
    let mut compositor = Compositor::new(
        params(BlendMode::WidescreenBlend, PixelFormat::Yuv420),
        camera,
        PoseHistory::new(8),
    );

    let result = provider.tick(0, &mut |frame| compositor.compose(frame).map(drop));
    assert!(matches!(result, Err(Error::UnsupportedConfiguration(_))));
    assert_eq!(compositor.frames_composited(), 0);
    assert!(compositor.output().pixels().is_empty());
    assert!(applied.lock().unwrap().is_empty());
}

#[test]
fn same_timestamp_applies_identical_pose() {
    let (session, probe) = session_with(PixelFormat::Rgb24);
    let mut provider = LiveFrameProvider::new(FrameConsumer::new(Arc::clone(&session)));
    provider.play().expect("play should succeed");

    let history = Arc::new(PoseHistory::new(8));
    history.record(0, Pose::IDENTITY);
    history.record(1_000, Pose::new(Vec3::new(0.5, 0.0, 1.0), Pose::IDENTITY.rotation));

    let applied = Arc::new(Mutex::new(Vec::new()));
    let camera = RecordingCamera {
        pose: Pose::IDENTITY,
        projection: Projection::default(),
        applied: Arc::clone(&applied),
    };
    let mut compositor = Compositor::new(
        params(BlendMode::Blend, PixelFormat::Rgb24),
        camera,
        Arc::clone(&history),
    );

    let mut outputs = Vec::new();
    for tick in 0..2 {
        assert_eq!(probe.emit(333), Some(Delivery::Accepted));
        let published = provider
            .tick(tick, &mut |frame| {
                let composite = compositor.compose(frame)?;
                outputs.push(composite.target.pixels().to_vec());
                Ok(())
            })
            .expect("tick should succeed");
        assert!(published);
    }

    let applied = applied.lock().unwrap();
    assert_eq!(applied.len(), 2);
    assert_eq!(applied[0], applied[1]);
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(compositor.frames_composited(), 2);
}

#[test]
fn session_pause_and_resume_gate_delivery() {
    let (session, probe) = session_with(PixelFormat::Rgb24);
    session.pause().expect("pause while stopped is a no-op");
    assert_eq!(session.state(), SessionState::Stopped);

    session.play().expect("play should succeed");
    session.pause().expect("pause should succeed");
    assert_eq!(session.state(), SessionState::Paused);
    assert_eq!(probe.emit(1), Some(Delivery::RejectedPaused));
    assert!(session.queue().is_empty());

    session.resume().expect("resume should succeed");
    assert_eq!(session.state(), SessionState::Playing);
    assert_eq!(probe.emit(2), Some(Delivery::Accepted));

    let calls = probe.calls();
    assert_eq!((calls.pauses, calls.resumes), (1, 1));
    // paused deliveries are not contract violations
    assert_eq!(session.metrics().frames_rejected, 0);
}

#[test]
fn driver_pauses_only_when_every_consumer_pauses() {
    let (session, probe) = session_with(PixelFormat::Rgb24);
    let mut preview = FrameConsumer::new(Arc::clone(&session));
    let mut recorder = FrameConsumer::new(Arc::clone(&session));
    preview.play().expect("play should succeed");
    recorder.play().expect("play should succeed");

    preview.pause().expect("pause should succeed");
    assert_eq!(session.state(), SessionState::Playing);
    assert_eq!(probe.calls().pauses, 0);

    recorder.pause().expect("pause should succeed");
    assert_eq!(session.state(), SessionState::Paused);
    assert_eq!(probe.calls().pauses, 1);

    preview.resume().expect("resume should succeed");
    assert_eq!(session.state(), SessionState::Playing);
    assert_eq!(probe.calls().resumes, 1);
}

#[test]
fn joining_consumer_resumes_a_paused_session() {
    let (session, probe) = session_with(PixelFormat::Rgb24);
    let mut preview = FrameConsumer::new(Arc::clone(&session));
    preview.play().expect("play should succeed");
    preview.pause().expect("pause should succeed");
    assert_eq!(session.state(), SessionState::Paused);

    let mut recorder = FrameConsumer::new(Arc::clone(&session));
    recorder.play().expect("play should succeed");
    assert_eq!(session.state(), SessionState::Playing);
    assert_eq!(probe.emit(1), Some(Delivery::Accepted));
    assert!(recorder.update(1));
    assert_eq!(probe.calls().starts, 1);
}

#[test]
fn removing_last_active_consumer_pauses_the_driver() {
    let (session, probe) = session_with(PixelFormat::Rgb24);
    let mut preview = FrameConsumer::new(Arc::clone(&session));
    let mut recorder = FrameConsumer::new(Arc::clone(&session));
    preview.play().expect("play should succeed");
    recorder.play().expect("play should succeed");

    preview.pause().expect("pause should succeed");
    recorder.stop();
    assert_eq!(session.consumer_count(), 1);
    assert_eq!(session.state(), SessionState::Paused);
    assert_eq!(probe.calls().pauses, 1);
    assert_eq!(probe.emit(1), Some(Delivery::RejectedPaused));

    preview.resume().expect("resume should succeed");
    assert_eq!(probe.emit(2), Some(Delivery::Accepted));
}

#[test]
fn late_image_format_request_is_ignored() {
    let (session, probe) = session_with(PixelFormat::Rgb24);
    assert!(session.set_image_format(format(PixelFormat::Rgb24)));
    assert!(!session.set_image_format(CameraFormat::new(8, 8, 30, PixelFormat::Rgb24)));

    session.play().expect("play should succeed");
    assert!(!session.set_image_format(format(PixelFormat::Yuv420)));
    assert_eq!(session.negotiated_format(), Some(format(PixelFormat::Rgb24)));
    assert_eq!(probe.format(), Some(format(PixelFormat::Rgb24)));
}

#[test]
fn malformed_buffers_are_dropped() {
    let (session, probe) = session_with(PixelFormat::Rgb24);
    session.play().expect("play should succeed");
    let before = session.queue().pool().stats();

    assert_eq!(probe.emit_raw(&[], 1), Some(Delivery::Malformed));
    assert_eq!(probe.emit_raw(&[0; 5], 2), Some(Delivery::Malformed));
    assert_eq!(session.metrics().frames_rejected, 2);
    assert!(session.queue().is_empty());
    assert_eq!(session.queue().pool().stats(), before);

    let frame_len = format(PixelFormat::Rgb24).frame_len();
    assert_eq!(probe.emit_raw(&vec![1; frame_len], 3), Some(Delivery::Accepted));
}
