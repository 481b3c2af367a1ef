use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

use crate::capture::frame::CameraFormat;
use crate::error::{Error, Result};

/// Pick the driver mode closest to `requested`.
///
/// Prefers an exact match, then the same pixel format with the nearest pixel
/// area (ties go to the nearest frame rate).
pub fn select_format(supported: &[CameraFormat], requested: &CameraFormat) -> Result<CameraFormat> {
    if let Some(exact) = supported.iter().find(|f| *f == requested) {
        info!("Found exact camera mode: {:?}", exact);
        return Ok(*exact);
    }

    let area = |f: &CameraFormat| i64::from(f.width) * i64::from(f.height);
    let wanted = area(requested);

    supported
        .iter()
        .filter(|f| f.pixel_format == requested.pixel_format)
        .min_by_key(|f| {
            (
                (area(f) - wanted).abs(),
                (i64::from(f.fps) - i64::from(requested.fps)).abs(),
            )
        })
        .copied()
        .map(|f| {
            info!("Using nearest camera mode {:?} for {:?}", f, requested);
            f
        })
        .ok_or_else(|| Error::FormatNegotiation(format!("{requested:?}")))
}

/// Milliseconds since the Unix epoch, for media display names.
pub fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::PixelFormat;

    fn modes() -> Vec<CameraFormat> {
        vec![
            CameraFormat::new(640, 480, 30, PixelFormat::Yuv420),
            CameraFormat::new(1280, 720, 30, PixelFormat::Yuv420),
            CameraFormat::new(1280, 720, 60, PixelFormat::Rgb24),
        ]
    }

    #[test]
    fn test_exact_match_wins() {
        let wanted = CameraFormat::new(1280, 720, 60, PixelFormat::Rgb24);
        assert_eq!(select_format(&modes(), &wanted).expect("should match"), wanted);
    }

    #[test]
    fn test_nearest_area_same_format() {
        let wanted = CameraFormat::new(1024, 768, 30, PixelFormat::Yuv420);
        let picked = select_format(&modes(), &wanted).expect("should match");
        assert_eq!((picked.width, picked.height), (1280, 720));
    }

    #[test]
    fn test_no_matching_pixel_format() {
        let wanted = CameraFormat::new(640, 480, 30, PixelFormat::Rgba32);
        assert!(matches!(
            select_format(&modes(), &wanted),
            Err(Error::FormatNegotiation(_))
        ));
    }
}
