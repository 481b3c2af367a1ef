//! Encoder and media-gallery seams

use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::compositor::RenderTarget;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioChannel {
    Microphone,
    Application,
}

/// Still image container for photo capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhotoFormat {
    Png,
    Jpeg,
}

impl PhotoFormat {
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

/// Continuous video sink fed one composited frame at a time.
pub trait VideoEncoder: Send {
    /// File extension of the container this encoder writes.
    fn extension(&self) -> &'static str;

    /// Destination of the next recording. Only valid while not recording.
    fn set_output_path(&mut self, path: &Path) -> Result<()>;

    fn start(&mut self, width: u32, height: u32, fps: u32) -> Result<()>;

    /// Append one composited frame captured at `timestamp` (nanoseconds).
    fn commit(&mut self, frame: &RenderTarget, timestamp: u64) -> Result<()>;

    /// Gain for one audio channel, `0.0` mutes it.
    fn set_volume(&mut self, channel: AudioChannel, volume: f32);

    /// Flush and close the output, returning the written file.
    fn finish(&mut self) -> Result<PathBuf>;
}

pub trait PhotoEncoder: Send + Sync {
    /// Encode a packed RGBA image.
    fn encode(&self, width: u32, height: u32, rgba: &[u8], format: PhotoFormat) -> Result<Bytes>;
}

/// Device media library the finished captures are published to.
pub trait MediaGallery: Send + Sync {
    fn insert_video(&self, path: &Path, display_name: &str, folder: &str) -> Result<()>;

    fn insert_image(&self, bytes: &[u8], display_name: &str, folder: &str) -> Result<()>;
}
