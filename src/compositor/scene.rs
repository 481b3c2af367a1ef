//! Minimal software-rendered scene for running without an engine

use glam::Vec3;

use crate::compositor::rig::{Pose, Projection, VirtualCamera};
use crate::compositor::target::RenderTarget;
use crate::error::Result;

/// A single translucent marker floating at a fixed world position.
///
/// The marker is projected through the camera pose so it visibly swims
/// when poses and camera frames fall out of sync.
pub struct SyntheticScene {
    pose: Pose,
    projection: Projection,
    marker: Vec3,
    radius: f32,
    color: [u8; 4],
}

impl SyntheticScene {
    pub fn new(marker: Vec3, radius: f32, color: [u8; 4]) -> Self {
        Self {
            pose: Pose::IDENTITY,
            projection: Projection::default(),
            marker,
            radius,
            color,
        }
    }

    /// Marker centre in normalized device coordinates, if in front of the
    /// camera.
    fn project(&self) -> Option<([f32; 2], f32)> {
        let view = self.pose.rotation.inverse() * (self.marker - self.pose.position);
        let (x, y, z) = (view.x, view.y, view.z);
        if z <= self.projection.near || z >= self.projection.far {
            return None;
        }

        let f = 1.0 / (self.projection.fov_y_degrees.to_radians() * 0.5).tan();
        let ndc = [f * x / (z * self.projection.aspect), f * y / z];
        Some((ndc, f * self.radius / z))
    }
}

impl Default for SyntheticScene {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 2.0), 0.25, [40, 200, 255, 200])
    }
}

impl VirtualCamera for SyntheticScene {
    fn pose(&self) -> Pose {
        self.pose
    }

    fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    fn projection(&self) -> Projection {
        self.projection
    }

    fn set_projection(&mut self, projection: Projection) {
        self.projection = projection;
    }

    fn render(&mut self, target: &mut RenderTarget) -> Result<()> {
        target.fill([0, 0, 0, 0]);
        let Some((centre, radius)) = self.project() else {
            return Ok(());
        };

        let (w, h) = (target.width() as f32, target.height() as f32);
        let cx = (centre[0] + 1.0) * 0.5 * w;
        let cy = (1.0 - centre[1]) * 0.5 * h;
        let r = radius * 0.5 * h;
        let r2 = r * r;

        let width = target.width() as usize;
        for (i, px) in target.pixels_mut().chunks_exact_mut(4).enumerate() {
            let dx = (i % width) as f32 + 0.5 - cx;
            let dy = (i / width) as f32 + 0.5 - cy;
            if dx * dx + dy * dy <= r2 {
                px.copy_from_slice(&self.color);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn test_marker_centred_when_facing_it() {
        let mut scene = SyntheticScene::default();
        let mut target = RenderTarget::new(16, 16);
        scene.render(&mut target).expect("render should succeed");

        assert_eq!(target.pixel(8, 8).map(|p| p[3]), Some(200));
        assert_eq!(target.pixel(0, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_marker_behind_camera_is_culled() {
        let mut scene = SyntheticScene::default();
        scene.set_pose(Pose::new(
            Vec3::ZERO,
            Quat::from_axis_angle(Vec3::Y, std::f32::consts::PI),
        ));
        let mut target = RenderTarget::new(8, 8);
        scene.render(&mut target).expect("render should succeed");
        assert!(target.pixels().iter().all(|&b| b == 0));
    }
}
