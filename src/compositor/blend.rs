//! Per-mode pixel combine operations

use serde::{Deserialize, Serialize};

use crate::compositor::target::RenderTarget;

/// Which sources contribute to the output pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendMode {
    /// Camera passthrough only.
    RGBOnly,
    VirtualOnly,
    /// Camera as background, virtual content over it by coverage.
    Blend,
    /// Camera on the left half, virtual on the right half of a double-wide
    /// output.
    WidescreenBlend,
}

/// Camera and virtual inputs of one combine pass, both RGBA.
pub struct BlendInputs<'a> {
    pub camera: &'a RenderTarget,
    pub virtual_scene: &'a RenderTarget,
}

pub type BlendOp = fn(&BlendInputs<'_>, &mut RenderTarget);

impl BlendMode {
    pub const fn needs_virtual(self) -> bool {
        !matches!(self, Self::RGBOnly)
    }

    pub const fn needs_camera(self) -> bool {
        !matches!(self, Self::VirtualOnly)
    }

    /// Output width for a configured capture width.
    pub const fn output_width(self, width: u32) -> u32 {
        match self {
            Self::WidescreenBlend => width * 2,
            _ => width,
        }
    }

    pub fn op(self) -> BlendOp {
        match self {
            Self::RGBOnly => camera_only,
            Self::VirtualOnly => virtual_only,
            Self::Blend => alpha_over,
            Self::WidescreenBlend => side_by_side,
        }
    }
}

fn camera_only(inputs: &BlendInputs<'_>, out: &mut RenderTarget) {
    inputs.camera.copy_into(out, 0);
}

fn virtual_only(inputs: &BlendInputs<'_>, out: &mut RenderTarget) {
    inputs.virtual_scene.copy_into(out, 0);
}

fn alpha_over(inputs: &BlendInputs<'_>, out: &mut RenderTarget) {
    let dst = out.pixels_mut();
    let pixels = inputs
        .camera
        .pixels()
        .chunks_exact(4)
        .zip(inputs.virtual_scene.pixels().chunks_exact(4));
    for (px, (cam, virt)) in dst.chunks_exact_mut(4).zip(pixels) {
        let a = u32::from(virt[3]);
        for c in 0..3 {
            let v = u32::from(virt[c]) * a + u32::from(cam[c]) * (255 - a);
            px[c] = ((v + 127) / 255) as u8;
        }
        px[3] = 255;
    }
}

fn side_by_side(inputs: &BlendInputs<'_>, out: &mut RenderTarget) {
    inputs.camera.copy_into(out, 0);
    inputs.virtual_scene.copy_into(out, inputs.camera.width());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, rgba: [u8; 4]) -> RenderTarget {
        let mut t = RenderTarget::new(w, h);
        t.fill(rgba);
        t
    }

    #[test]
    fn test_alpha_over_mixes_by_coverage() {
        let camera = solid(2, 1, [0, 0, 200, 255]);
        let mut virtual_scene = solid(2, 1, [200, 0, 0, 255]);
        virtual_scene.pixels_mut()[7] = 0;
        let mut out = RenderTarget::new(2, 1);

        BlendMode::Blend.op()(
            &BlendInputs {
                camera: &camera,
                virtual_scene: &virtual_scene,
            },
            &mut out,
        );
        assert_eq!(out.pixel(0, 0), Some([200, 0, 0, 255]));
        assert_eq!(out.pixel(1, 0), Some([0, 0, 200, 255]));
    }

    #[test]
    fn test_widescreen_halves() {
        let camera = solid(2, 1, [1, 1, 1, 255]);
        let virtual_scene = solid(2, 1, [2, 2, 2, 0]);
        let mut out = RenderTarget::new(BlendMode::WidescreenBlend.output_width(2), 1);

        BlendMode::WidescreenBlend.op()(
            &BlendInputs {
                camera: &camera,
                virtual_scene: &virtual_scene,
            },
            &mut out,
        );
        assert_eq!(out.pixel(1, 0), Some([1, 1, 1, 255]));
        assert_eq!(out.pixel(2, 0), Some([2, 2, 2, 0]));
    }

    #[test]
    fn test_mode_requirements() {
        assert!(!BlendMode::RGBOnly.needs_virtual());
        assert!(!BlendMode::VirtualOnly.needs_camera());
        assert!(BlendMode::Blend.needs_camera() && BlendMode::Blend.needs_virtual());
        assert_eq!(BlendMode::Blend.output_width(640), 640);
    }
}
