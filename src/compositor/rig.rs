//! Virtual camera rig and pose math

use glam::{EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::compositor::target::RenderTarget;
use crate::error::Result;

/// Rigid transform: position in metres, rotation as a unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub const fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Interpolate towards `other`: linear in position, slerp in rotation.
    pub fn interpolate(&self, other: &Pose, t: f32) -> Pose {
        let t = t.clamp(0.0, 1.0);
        Pose {
            position: self.position.lerp(other.position, t),
            rotation: self.rotation.slerp(other.rotation, t),
        }
    }

    /// Translate along the pose's own axes.
    pub fn offset_local(&self, local: Vec3) -> Pose {
        Pose {
            position: self.position + self.rotation * local,
            rotation: self.rotation,
        }
    }

    /// Same position and viewing direction with the roll removed.
    pub fn without_roll(&self) -> Pose {
        // yaw about Y, then pitch about X, then roll about the view axis
        let (yaw, pitch, _roll) = self.rotation.to_euler(EulerRot::YXZ);
        Pose {
            position: self.position,
            rotation: Quat::from_euler(EulerRot::YXZ, yaw, pitch, 0.0),
        }
    }
}

/// Perspective projection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            fov_y_degrees: 60.0,
            aspect: 4.0 / 3.0,
            near: 0.05,
            far: 100.0,
        }
    }
}

/// Pose and projection of one eye at a capture instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeView {
    pub pose: Pose,
    pub projection: Projection,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoViews {
    pub left: EyeView,
    pub right: EyeView,
}

/// The virtual-scene camera the compositor positions and renders.
pub trait VirtualCamera: Send {
    fn pose(&self) -> Pose;

    fn set_pose(&mut self, pose: Pose);

    fn projection(&self) -> Projection;

    fn set_projection(&mut self, projection: Projection);

    /// Render the scene from the current pose into `target`, RGBA with
    /// coverage in alpha.
    fn render(&mut self, target: &mut RenderTarget) -> Result<()>;
}

/// Exclusive, scoped hold on a [`VirtualCamera`] for temporary re-posing.
///
/// The pose and projection captured at acquisition are restored on drop,
/// including when a render fails or panics.
pub struct RigGuard<'a, C: VirtualCamera + ?Sized> {
    camera: &'a mut C,
    pose: Pose,
    projection: Projection,
}

impl<'a, C: VirtualCamera + ?Sized> RigGuard<'a, C> {
    pub fn acquire(camera: &'a mut C) -> Self {
        let pose = camera.pose();
        let projection = camera.projection();
        Self {
            camera,
            pose,
            projection,
        }
    }

    pub fn apply(&mut self, view: &EyeView) {
        self.camera.set_pose(view.pose);
        self.camera.set_projection(view.projection);
    }

    pub fn render(&mut self, target: &mut RenderTarget) -> Result<()> {
        self.camera.render(target)
    }
}

impl<C: VirtualCamera + ?Sized> Drop for RigGuard<'_, C> {
    fn drop(&mut self) {
        self.camera.set_pose(self.pose);
        self.camera.set_projection(self.projection);
    }
}
