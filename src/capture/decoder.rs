//! Pixel conversion between camera plane layouts and packed RGBA.
//!
//! Colour math is ITU-R BT.601, full range.

use crate::capture::frame::{FramePlanes, Plane, UniversalFrame};
use crate::error::{Error, Result};

/// Convert one YUV triple to RGB.
#[inline]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = f32::from(y);
    let u = f32::from(u) - 128.0;
    let v = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v, y);
    let g = 0.714_14f32.mul_add(-v, 0.344_14f32.mul_add(-u, y));
    let b = 1.772f32.mul_add(u, y);

    [clamp(r), clamp(g), clamp(b)]
}

/// Convert one RGB triple to YUV.
#[inline]
pub fn rgb_to_yuv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
    let y = 0.299f32.mul_add(r, 0.587f32.mul_add(g, 0.114 * b));
    let u = 0.5f32.mul_add(b, (-0.168_736f32).mul_add(r, -0.331_264 * g)) + 128.0;
    let v = 0.5f32.mul_add(r, (-0.418_688f32).mul_add(g, -0.081_312 * b)) + 128.0;
    [clamp(y), clamp(u), clamp(v)]
}

#[inline]
fn clamp(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Convert packed RGBA into planar I420, writing into `out`.
///
/// `out` is resized to the I420 frame length; chroma is taken from the
/// top-left pixel of each 2x2 block.
pub fn rgba_to_i420(rgba: &[u8], width: u32, height: u32, out: &mut Vec<u8>) {
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
    out.resize(w * h + 2 * cw * ch, 0);

    let (y_plane, chroma) = out.split_at_mut(w * h);
    let (u_plane, v_plane) = chroma.split_at_mut(cw * ch);

    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) * 4;
            let Some(px) = rgba.get(idx..idx + 3) else {
                continue;
            };
            let [luma, u, v] = rgb_to_yuv(px[0], px[1], px[2]);
            y_plane[y * w + x] = luma;

            if y % 2 == 0 && x % 2 == 0 {
                let uv_idx = (y / 2) * cw + (x / 2);
                u_plane[uv_idx] = u;
                v_plane[uv_idx] = v;
            }
        }
    }
}

/// Decode a camera frame into a `dst_width` x `dst_height` RGBA buffer,
/// scaling with nearest-neighbour sampling. Output alpha is opaque.
pub fn decode_to_rgba(
    frame: &UniversalFrame<'_>,
    dst: &mut [u8],
    dst_width: u32,
    dst_height: u32,
) -> Result<()> {
    let (dw, dh) = (dst_width as usize, dst_height as usize);
    if dst.len() < dw * dh * 4 {
        return Err(Error::InvalidState("destination smaller than its dimensions"));
    }
    if frame.width == 0 || frame.height == 0 {
        return Err(Error::InvalidState("empty camera frame"));
    }

    let (sw, sh) = (frame.width as usize, frame.height as usize);
    match &frame.planes {
        FramePlanes::Rgb([plane]) => {
            check_plane(plane, sw, sh, 3)?;
            let channels = plane.channels as usize;
            for y in 0..dh {
                let sy = y * sh / dh;
                for x in 0..dw {
                    let sx = x * sw / dw;
                    let src = sy * plane.stride() + sx * channels;
                    let out = (y * dw + x) * 4;
                    dst[out..out + 3].copy_from_slice(&plane.data[src..src + 3]);
                    dst[out + 3] = 255;
                }
            }
        }
        FramePlanes::Yuv([luma, u_plane, v_plane]) => {
            check_plane(luma, sw, sh, 1)?;
            check_plane(u_plane, 1, 1, 1)?;
            check_plane(v_plane, u_plane.width as usize, u_plane.height as usize, 1)?;
            for y in 0..dh {
                let sy = y * sh / dh;
                let cy = (sy / 2).min(u_plane.height as usize - 1);
                for x in 0..dw {
                    let sx = x * sw / dw;
                    let cx = (sx / 2).min(u_plane.width as usize - 1);
                    let rgb = yuv_to_rgb(
                        luma.data[sy * luma.stride() + sx],
                        u_plane.data[cy * u_plane.stride() + cx],
                        v_plane.data[cy * v_plane.stride() + cx],
                    );
                    let out = (y * dw + x) * 4;
                    dst[out..out + 3].copy_from_slice(&rgb);
                    dst[out + 3] = 255;
                }
            }
        }
    }
    Ok(())
}

/// Reject planes that sampling at `width` x `height` would read past.
fn check_plane(plane: &Plane<'_>, width: usize, height: usize, channels: u8) -> Result<()> {
    if (plane.width as usize) < width.max(1)
        || (plane.height as usize) < height.max(1)
        || plane.channels < channels
    {
        return Err(Error::InvalidState("camera plane smaller than its frame"));
    }
    if plane.data.len() < plane.stride() * plane.height as usize {
        return Err(Error::InvalidState("camera plane shorter than its dimensions"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gray_round_trips() {
        let [y, u, v] = rgb_to_yuv(128, 128, 128);
        assert_eq!((u, v), (128, 128));
        assert_eq!(yuv_to_rgb(y, u, v), [128, 128, 128]);
    }

    #[test]
    fn test_primary_red_survives_conversion() {
        let [y, u, v] = rgb_to_yuv(255, 0, 0);
        let [r, g, b] = yuv_to_rgb(y, u, v);
        assert!(r > 245, "r = {r}");
        assert!(g < 10 && b < 10, "g = {g}, b = {b}");
    }

    #[test]
    fn test_decode_rgb_scales_nearest() {
        // 2x1 source: red, blue
        let src = [255, 0, 0, 0, 0, 255];
        let frame = UniversalFrame {
            timestamp: 0,
            gain: 0,
            exposure_time: 0,
            width: 2,
            height: 1,
            planes: FramePlanes::Rgb([Plane {
                data: &src,
                width: 2,
                height: 1,
                channels: 3,
            }]),
        };

        let mut dst = vec![0; 4 * 4];
        decode_to_rgba(&frame, &mut dst, 4, 1).expect("decode should succeed");
        assert_eq!(&dst[0..4], &[255, 0, 0, 255]);
        assert_eq!(&dst[4..8], &[255, 0, 0, 255]);
        assert_eq!(&dst[8..12], &[0, 0, 255, 255]);
    }

    #[test]
    fn test_plane_narrower_than_frame_is_rejected() {
        let src = [0u8; 6];
        let mut frame = UniversalFrame {
            timestamp: 0,
            gain: 0,
            exposure_time: 0,
            width: 4,
            height: 1,
            planes: FramePlanes::Rgb([Plane {
                data: &src,
                width: 2,
                height: 1,
                channels: 3,
            }]),
        };
        let mut dst = vec![0; 4 * 4];
        assert!(matches!(
            decode_to_rgba(&frame, &mut dst, 4, 1),
            Err(Error::InvalidState(_))
        ));

        // a single-channel plane cannot back an RGB frame
        frame.width = 2;
        frame.planes = FramePlanes::Rgb([Plane {
            data: &src,
            width: 6,
            height: 1,
            channels: 1,
        }]);
        assert!(matches!(
            decode_to_rgba(&frame, &mut dst, 4, 1),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_i420_planes_have_expected_layout() {
        let rgba = [255u8, 255, 255, 255].repeat(4 * 2);
        let mut out = Vec::new();
        rgba_to_i420(&rgba, 4, 2, &mut out);
        assert_eq!(out.len(), 8 + 2 + 2);
        assert!(out[..8].iter().all(|&y| y == 255));
        assert!(out[8..].iter().all(|&c| c == 128));
    }
}
