pub mod capture;
pub mod compositor;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod provider;
pub mod utils;

use std::path::{Path, PathBuf};

use arc_swap::ArcSwap;
use capture::frame::{CameraFormat, PixelFormat};
use compositor::{BlendMode, CaptureSide};
use serde::{Deserialize, Serialize};

pub use error::{Error, Result};

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub pipeline: PipelineConfig,
    pub compositor: CompositorConfig,
    pub recorder: RecorderConfig,
    pub placeholder: PlaceholderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Device path, used by the V4L2 driver.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: PixelFormat,
    pub buffer_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frames kept by the bounded queue before the oldest is evicted.
    pub queue_limit: usize,
    pub pool_init_count: usize,
    /// Warn and shed pooled samples beyond this many live instances.
    pub pool_max_live: usize,
    /// Render loop rate of the binary.
    pub tick_rate_hz: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    pub blend_mode: BlendMode,
    pub capture_side: CaptureSide,
    pub lock_roll: bool,
    pub record_microphone: bool,
    pub record_app_audio: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub output_dir: PathBuf,
    pub gallery_dir: PathBuf,
    pub gallery_folder: String,
    /// Grace period between stopping a recording and inserting it into the
    /// media gallery.
    pub gallery_delay_ms: u64,
    pub save_photos: bool,
    pub photo_supported: bool,
    pub video_supported: bool,
    pub async_readback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaceholderConfig {
    pub fps: u32,
    /// Optional image shown by the editor provider.
    pub image: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".into(),
            width: 640,
            height: 480,
            fps: 30,
            format: PixelFormat::Yuv420,
            buffer_count: 4,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_limit: 5,
            pool_init_count: 8,
            pool_max_live: 32,
            tick_rate_hz: 60,
        }
    }
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            blend_mode: BlendMode::Blend,
            capture_side: CaptureSide::Single,
            lock_roll: false,
            record_microphone: true,
            record_app_audio: true,
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("captures"),
            gallery_dir: PathBuf::from("gallery"),
            gallery_folder: "MixedReality".into(),
            gallery_delay_ms: 500,
            save_photos: true,
            photo_supported: true,
            video_supported: true,
            async_readback: true,
        }
    }
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        Self { fps: 30, image: None }
    }
}

impl CaptureConfig {
    pub fn camera_format(&self) -> CameraFormat {
        CameraFormat::new(self.width, self.height, self.fps, self.format)
    }
}

impl Config {
    /// Load from an optional TOML file, then `MRCAPTURE__SECTION__KEY`
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("MRCAPTURE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }
}

/// Immutable per-session capture settings derived from [`Config`].
///
/// A new session is required to change any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureParameters {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub pixel_format: PixelFormat,
    pub blend_mode: BlendMode,
    pub record_microphone: bool,
    pub record_app_audio: bool,
    pub capture_side: CaptureSide,
    pub lock_roll: bool,
}

impl CaptureParameters {
    pub fn from_config(config: &Config) -> Self {
        Self {
            width: config.capture.width,
            height: config.capture.height,
            fps: config.capture.fps,
            pixel_format: config.capture.format,
            blend_mode: config.compositor.blend_mode,
            record_microphone: config.compositor.record_microphone,
            record_app_audio: config.compositor.record_app_audio,
            capture_side: config.compositor.capture_side,
            lock_roll: config.compositor.lock_roll,
        }
    }
}

/// Performance counters collected throughout the pipeline
#[derive(Debug, Default, Clone, Copy)]
pub struct Metrics {
    pub frames_enqueued: u64,
    pub frames_consumed: u64,
    pub frames_dropped: u64,
    pub frames_rejected: u64,
    pub pool: pipeline::PoolStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tempdir should succeed");
        let path = dir.path().join("mrcapture.toml");
        std::fs::write(
            &path,
            "[compositor]\nblend_mode = \"WidescreenBlend\"\n[pipeline]\nqueue_limit = 3\n",
        )
        .expect("write should succeed");

        let config = Config::load(Some(&path)).expect("load should succeed");
        assert_eq!(config.compositor.blend_mode, BlendMode::WidescreenBlend);
        assert_eq!(config.pipeline.queue_limit, 3);
        assert_eq!(config.capture.width, 640);
    }

    #[test]
    fn test_parameters_follow_config() {
        let config = Config::default();
        let params = CaptureParameters::from_config(&config);
        assert_eq!(params.blend_mode, BlendMode::Blend);
        assert_eq!(params.capture_side, CaptureSide::Single);
        assert_eq!((params.width, params.height), (640, 480));
    }
}
