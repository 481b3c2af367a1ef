//! Development provider showing a fixed image instead of a camera

use std::path::Path;

use tracing::info;

use crate::capture::frame::TextureType;
use crate::error::Result;
use crate::provider::{FrameProvider, NullFrameProvider, OnFrame};

/// A [`NullFrameProvider`] preloaded with a still image.
pub struct EditorFrameProvider {
    inner: NullFrameProvider,
}

impl EditorFrameProvider {
    /// Load any image format the `image` crate decodes.
    pub fn from_path(path: &Path, fps: u32) -> Result<Self> {
        let image = image::open(path)?.to_rgb8();
        let (width, height) = image.dimensions();
        info!(path = %path.display(), width, height, "Loaded editor placeholder image");
        Ok(Self::from_rgb(width, height, image.into_raw(), fps))
    }

    pub fn from_rgb(width: u32, height: u32, rgb: Vec<u8>, fps: u32) -> Self {
        Self {
            inner: NullFrameProvider::with_image(width, height, rgb, fps),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }
}

impl FrameProvider for EditorFrameProvider {
    fn texture_type(&self) -> TextureType {
        self.inner.texture_type()
    }

    fn play(&mut self) -> Result<()> {
        self.inner.play()
    }

    fn stop(&mut self) {
        self.inner.stop();
    }

    fn tick(&mut self, tick: u64, on_frame: &mut OnFrame<'_>) -> Result<bool> {
        self.inner.tick(tick, on_frame)
    }

    fn release(&mut self) {
        self.inner.release();
    }
}
