use std::io::Cursor;

use bytes::Bytes;
use image::{codecs::jpeg::JpegEncoder, DynamicImage, ImageFormat, RgbaImage};
use tracing::debug;

use crate::error::{Error, Result};
use crate::output::encoder::{PhotoEncoder, PhotoFormat};

/// [`PhotoEncoder`] backed by the `image` crate.
#[derive(Debug, Clone)]
pub struct ImagePhotoEncoder {
    jpeg_quality: u8,
}

impl Default for ImagePhotoEncoder {
    fn default() -> Self {
        Self { jpeg_quality: 90 }
    }
}

impl ImagePhotoEncoder {
    pub fn with_jpeg_quality(quality: u8) -> Self {
        Self {
            jpeg_quality: quality.clamp(1, 100),
        }
    }
}

impl PhotoEncoder for ImagePhotoEncoder {
    fn encode(&self, width: u32, height: u32, rgba: &[u8], format: PhotoFormat) -> Result<Bytes> {
        let image = RgbaImage::from_raw(width, height, rgba.to_vec()).ok_or_else(|| {
            Error::Encoder(format!("{width}x{height} RGBA does not fit {} bytes", rgba.len()))
        })?;

        let mut out = Vec::new();
        match format {
            PhotoFormat::Png => image.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?,
            PhotoFormat::Jpeg => {
                // JPEG has no alpha channel
                let rgb = DynamicImage::ImageRgba8(image).to_rgb8();
                JpegEncoder::new_with_quality(&mut out, self.jpeg_quality).encode_image(&rgb)?;
            }
        }
        debug!(width, height, ?format, bytes = out.len(), "Photo encoded");
        Ok(Bytes::from(out))
    }
}
