//! Pose-synchronized compositing of camera and virtual frames.
//!
//! For every camera frame the compositor looks up the scene pose at the
//! frame's capture timestamp, renders the virtual camera from there and
//! merges both images according to the session's [`BlendMode`].

pub mod blend;
pub mod rig;
pub mod scene;
pub mod target;
pub mod tracking;

pub use blend::{BlendInputs, BlendMode, BlendOp};
pub use rig::{EyeView, Pose, Projection, RigGuard, StereoViews, VirtualCamera};
pub use scene::SyntheticScene;
pub use target::RenderTarget;
pub use tracking::{PoseHistory, StereoRig, TrackingSource};

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use crate::capture::decoder;
use crate::capture::frame::{TextureType, UniversalFrame};
use crate::error::{Error, Result};
use crate::CaptureParameters;

/// Which eyes the virtual camera renders for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptureSide {
    Single,
    /// Left and right eye, merged side by side.
    Both,
}

/// One composited output frame, borrowed from the compositor until the next
/// call to [`Compositor::compose`].
#[derive(Debug, Clone, Copy)]
pub struct Composite<'a> {
    pub target: &'a RenderTarget,
    pub timestamp: u64,
}

pub struct Compositor<C, T> {
    params: CaptureParameters,
    camera: C,
    tracking: T,
    last_pose: Option<Pose>,
    camera_target: RenderTarget,
    virtual_target: RenderTarget,
    eye_targets: [RenderTarget; 2],
    output: RenderTarget,
    frames: u64,
}

impl<C: VirtualCamera, T: TrackingSource> Compositor<C, T> {
    pub fn new(params: CaptureParameters, camera: C, tracking: T) -> Self {
        Self {
            params,
            camera,
            tracking,
            last_pose: None,
            camera_target: RenderTarget::default(),
            virtual_target: RenderTarget::default(),
            eye_targets: [RenderTarget::default(), RenderTarget::default()],
            output: RenderTarget::default(),
            frames: 0,
        }
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.params.blend_mode
    }

    pub fn parameters(&self) -> &CaptureParameters {
        &self.params
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut C {
        &mut self.camera
    }

    pub fn tracking(&self) -> &T {
        &self.tracking
    }

    /// Pose most recently applied to the virtual camera.
    pub fn last_pose(&self) -> Option<Pose> {
        self.last_pose
    }

    /// Frames composited so far. Diagnostic only.
    pub fn frames_composited(&self) -> u64 {
        self.frames
    }

    /// Output of the most recent [`compose`](Self::compose).
    pub fn output(&self) -> &RenderTarget {
        &self.output
    }

    /// Composite `frame` with the virtual scene as seen at its timestamp.
    #[instrument(level = "trace", skip_all, fields(timestamp = frame.timestamp))]
    pub fn compose(&mut self, frame: &UniversalFrame<'_>) -> Result<Composite<'_>> {
        let mode = self.params.blend_mode;
        if mode == BlendMode::WidescreenBlend && frame.texture_type() == TextureType::Yuv {
            error!("WidescreenBlend cannot combine planar YUV camera frames");
            return Err(Error::UnsupportedConfiguration(
                "WidescreenBlend requires RGB camera frames".into(),
            ));
        }

        let started = Instant::now();
        let (width, height) = (self.params.width, self.params.height);

        if mode.needs_virtual() {
            self.apply_pose(frame.timestamp);
            self.render_virtual(frame.timestamp, width, height)?;
        }
        if mode.needs_camera() {
            self.camera_target.resize(width, height);
            decoder::decode_to_rgba(frame, self.camera_target.pixels_mut(), width, height)?;
        }

        self.output.resize(mode.output_width(width), height);
        let inputs = BlendInputs {
            camera: &self.camera_target,
            virtual_scene: &self.virtual_target,
        };
        (mode.op())(&inputs, &mut self.output);

        self.frames += 1;
        metrics::counter!("mrc_frames_composited_total").increment(1);
        metrics::histogram!("mrc_compose_us").record(started.elapsed().as_micros() as f64);

        Ok(Composite {
            target: &self.output,
            timestamp: frame.timestamp,
        })
    }

    fn apply_pose(&mut self, timestamp: u64) {
        let pose = match self.tracking.pose_at(timestamp) {
            Some(pose) if self.params.lock_roll => pose.without_roll(),
            Some(pose) => pose,
            None => {
                debug!(timestamp, "No pose at capture time; reusing last known pose");
                match self.last_pose {
                    Some(pose) => pose,
                    None => return,
                }
            }
        };
        self.camera.set_pose(pose);
        self.last_pose = Some(pose);
    }

    fn render_virtual(&mut self, timestamp: u64, width: u32, height: u32) -> Result<()> {
        self.virtual_target.resize(width, height);

        if self.params.capture_side == CaptureSide::Both {
            if let Some(views) = self.tracking.eye_views_at(timestamp) {
                return self.render_stereo(&views, width, height);
            }
            warn!(timestamp, "No eye views at capture time; rendering single view");
        }
        self.camera.render(&mut self.virtual_target)
    }

    fn render_stereo(&mut self, views: &StereoViews, width: u32, height: u32) -> Result<()> {
        let left_width = (width / 2).max(1);
        let [left, right] = &mut self.eye_targets;
        left.resize(left_width, height);
        right.resize(width.saturating_sub(left_width).max(1), height);

        {
            let mut rig = RigGuard::acquire(&mut self.camera);
            rig.apply(&views.left);
            rig.render(left)?;
            rig.apply(&views.right);
            rig.render(right)?;
        }

        left.copy_into(&mut self.virtual_target, 0);
        right.copy_into(&mut self.virtual_target, left_width);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::{FramePlanes, PixelFormat, Plane};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Log {
        poses: Vec<Pose>,
        renders: usize,
    }

    struct RecordingCamera {
        pose: Pose,
        projection: Projection,
        color: [u8; 4],
        log: Arc<Mutex<Log>>,
    }

    impl RecordingCamera {
        fn new(color: [u8; 4]) -> (Self, Arc<Mutex<Log>>) {
            let log = Arc::new(Mutex::new(Log::default()));
            let camera = Self {
                pose: Pose::IDENTITY,
                projection: Projection::default(),
                color,
                log: Arc::clone(&log),
            };
            (camera, log)
        }
    }

    impl VirtualCamera for RecordingCamera {
        fn pose(&self) -> Pose {
            self.pose
        }
        fn set_pose(&mut self, pose: Pose) {
            self.pose = pose;
            self.log.lock().unwrap().poses.push(pose);
        }
        fn projection(&self) -> Projection {
            self.projection
        }
        fn set_projection(&mut self, projection: Projection) {
            self.projection = projection;
        }
        fn render(&mut self, target: &mut RenderTarget) -> Result<()> {
            self.log.lock().unwrap().renders += 1;
            target.fill(self.color);
            Ok(())
        }
    }

    fn params(mode: BlendMode) -> CaptureParameters {
        CaptureParameters {
            width: 4,
            height: 2,
            fps: 30,
            pixel_format: PixelFormat::Rgb24,
            blend_mode: mode,
            record_microphone: false,
            record_app_audio: false,
            capture_side: CaptureSide::Single,
            lock_roll: false,
        }
    }

    fn rgb_frame(rgb: &[u8], timestamp: u64) -> UniversalFrame<'_> {
        UniversalFrame {
            timestamp,
            gain: 0,
            exposure_time: 0,
            width: 4,
            height: 2,
            planes: FramePlanes::Rgb([Plane {
                data: rgb,
                width: 4,
                height: 2,
                channels: 3,
            }]),
        }
    }

    #[test]
    fn test_rgb_only_skips_virtual_render() {
        let (camera, log) = RecordingCamera::new([255, 0, 0, 255]);
        let mut compositor =
            Compositor::new(params(BlendMode::RGBOnly), camera, PoseHistory::new(4));
        let rgb = [7u8; 24];

        let composite = compositor.compose(&rgb_frame(&rgb, 1)).expect("compose should succeed");
        assert_eq!(composite.target.pixel(3, 1), Some([7, 7, 7, 255]));
        assert_eq!(log.lock().unwrap().renders, 0);
        assert_eq!(compositor.frames_composited(), 1);
    }

    #[test]
    fn test_widescreen_rejects_yuv_before_rendering() {
        let (camera, log) = RecordingCamera::new([0, 0, 0, 0]);
        let mut compositor =
            Compositor::new(params(BlendMode::WidescreenBlend), camera, PoseHistory::new(4));
        let y = [16u8; 8];
        let uv = [128u8; 2];
        fn plane(data: &[u8], width: u32, height: u32) -> Plane<'_> {
            Plane {
                data,
                width,
                height,
                channels: 1,
            }
        }
        let frame = UniversalFrame {
            timestamp: 1,
            gain: 0,
            exposure_time: 0,
            width: 4,
            height: 2,
            planes: FramePlanes::Yuv([plane(&y, 4, 2), plane(&uv, 2, 1), plane(&uv, 2, 1)]),
        };

        let err = compositor.compose(&frame).expect_err("YUV widescreen must fail");
        assert!(matches!(err, Error::UnsupportedConfiguration(_)));
        assert_eq!(log.lock().unwrap().renders, 0);
        assert_eq!(compositor.frames_composited(), 0);
    }

    #[test]
    fn test_missing_pose_reuses_last() {
        let (camera, log) = RecordingCamera::new([0, 0, 0, 0]);
        let history = Arc::new(PoseHistory::new(4));
        let pose = Pose::new(glam::Vec3::new(1.0, 2.0, 3.0), Pose::IDENTITY.rotation);
        history.record(10, pose);
        let mut compositor =
            Compositor::new(params(BlendMode::VirtualOnly), camera, Arc::clone(&history));
        let rgb = [0u8; 24];

        compositor.compose(&rgb_frame(&rgb, 10)).expect("compose should succeed");
        compositor.compose(&rgb_frame(&rgb, 50)).expect("compose should succeed");

        assert_eq!(compositor.camera().pose(), pose);
        assert_eq!(log.lock().unwrap().renders, 2);
    }

    #[test]
    fn test_stereo_renders_both_eyes_and_restores_rig() {
        let (camera, log) = RecordingCamera::new([9, 9, 9, 255]);
        let history = PoseHistory::new(4).with_stereo(StereoRig::default());
        history.record(10, Pose::IDENTITY);
        let mut p = params(BlendMode::VirtualOnly);
        p.capture_side = CaptureSide::Both;
        let mut compositor = Compositor::new(p, camera, history);
        let rgb = [0u8; 24];

        let composite = compositor.compose(&rgb_frame(&rgb, 10)).expect("compose should succeed");
        assert_eq!(composite.target.pixel(0, 0), Some([9, 9, 9, 255]));
        assert_eq!(composite.target.pixel(3, 1), Some([9, 9, 9, 255]));
        assert_eq!(log.lock().unwrap().renders, 2);
        assert_eq!(compositor.camera().pose(), Pose::IDENTITY);
    }
}
