use serde::{Deserialize, Serialize};

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Packed 8-bit RGB, one plane.
    Rgb24,
    /// Packed 8-bit RGBA, one plane.
    Rgba32,
    /// Planar I420: full-size Y followed by quarter-size U and V.
    Yuv420,
}

/// Plane family of a camera format, as seen by the compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureType {
    Rgb,
    Yuv,
}

/// Geometry of one plane of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneSpec {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

impl PlaneSpec {
    pub const fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }
}

impl PixelFormat {
    pub const fn texture_type(self) -> TextureType {
        match self {
            Self::Rgb24 | Self::Rgba32 => TextureType::Rgb,
            Self::Yuv420 => TextureType::Yuv,
        }
    }

    pub const fn plane_count(self) -> usize {
        match self.texture_type() {
            TextureType::Rgb => 1,
            TextureType::Yuv => 3,
        }
    }

    /// Plane geometry for a `width` x `height` frame, in storage order.
    pub fn plane_specs(self, width: u32, height: u32) -> impl Iterator<Item = PlaneSpec> {
        let chroma = PlaneSpec {
            width: width.div_ceil(2),
            height: height.div_ceil(2),
            channels: 1,
        };
        let specs = match self {
            Self::Rgb24 => [PlaneSpec { width, height, channels: 3 }; 3],
            Self::Rgba32 => [PlaneSpec { width, height, channels: 4 }; 3],
            Self::Yuv420 => [PlaneSpec { width, height, channels: 1 }, chroma, chroma],
        };
        specs.into_iter().take(self.plane_count())
    }

    /// Total bytes of one frame in this format.
    pub fn frame_len(self, width: u32, height: u32) -> usize {
        self.plane_specs(width, height).map(|p| p.byte_len()).sum()
    }
}

/// A camera mode: resolution, rate and pixel layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub pixel_format: PixelFormat,
}

impl CameraFormat {
    pub const fn new(width: u32, height: u32, fps: u32, pixel_format: PixelFormat) -> Self {
        Self {
            width,
            height,
            fps,
            pixel_format,
        }
    }

    pub fn frame_len(&self) -> usize {
        self.pixel_format.frame_len(self.width, self.height)
    }
}

/// One camera-driver delivery, owned by whichever queue slot holds it.
///
/// Samples are recycled through [`crate::pipeline::FramePool`]: the pixel
/// buffer keeps its allocation across reuse and is only reallocated when the
/// incoming frame is larger than anything it held before.
#[derive(Debug, Default)]
pub struct FrameSample {
    /// Device clock, nanoseconds.
    pub timestamp: u64,
    pub gain: u32,
    pub exposure_time: u32,
    /// Opaque driver token for the buffer this sample was copied from.
    pub native_handle: usize,
    pixels: Vec<u8>,
}

impl FrameSample {
    pub fn with_capacity(byte_capacity: usize) -> Self {
        Self {
            pixels: Vec::with_capacity(byte_capacity),
            ..Self::default()
        }
    }

    /// Copy `data` in as this sample's pixels.
    ///
    /// The previous contents are discarded entirely, so a shorter frame never
    /// exposes bytes from a longer predecessor.
    pub fn fill(&mut self, data: &[u8]) {
        self.pixels.clear();
        self.pixels.extend_from_slice(data);
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn capacity(&self) -> usize {
        self.pixels.capacity()
    }

    /// Reset metadata for pool reuse. Pixel storage is kept.
    pub fn reset(&mut self) {
        self.timestamp = 0;
        self.gain = 0;
        self.exposure_time = 0;
        self.native_handle = 0;
        self.pixels.clear();
    }
}

/// Borrowed view of one image plane.
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

impl Plane<'_> {
    pub const fn stride(&self) -> usize {
        self.width as usize * self.channels as usize
    }
}

/// Plane set of a [`UniversalFrame`], tagged by family.
#[derive(Debug, Clone, Copy)]
pub enum FramePlanes<'a> {
    Rgb([Plane<'a>; 1]),
    /// Y, U, V in that order.
    Yuv([Plane<'a>; 3]),
}

/// Format-agnostic frame handed from a provider to the compositor.
///
/// Borrowed for the duration of one provider callback only.
#[derive(Debug, Clone, Copy)]
pub struct UniversalFrame<'a> {
    pub timestamp: u64,
    pub gain: u32,
    pub exposure_time: u32,
    pub width: u32,
    pub height: u32,
    pub planes: FramePlanes<'a>,
}

impl<'a> UniversalFrame<'a> {
    pub const fn texture_type(&self) -> TextureType {
        match self.planes {
            FramePlanes::Rgb(_) => TextureType::Rgb,
            FramePlanes::Yuv(_) => TextureType::Yuv,
        }
    }

    pub fn planes(&self) -> &[Plane<'a>] {
        match &self.planes {
            FramePlanes::Rgb(p) => p,
            FramePlanes::Yuv(p) => p,
        }
    }
}
