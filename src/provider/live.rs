//! Provider backed by a live camera consumer

use tracing::{debug, warn};

use crate::capture::consumer::{FrameConsumer, FrameTextures};
use crate::capture::frame::{FramePlanes, TextureType, UniversalFrame};
use crate::error::Result;
use crate::provider::{FrameProvider, MonotonicClock, OnFrame};

/// Packed single-plane colour.
struct RgbAdapter;

/// Planar luma/chroma, three planes.
struct YuvAdapter;

impl RgbAdapter {
    fn frame<'a>(&self, textures: &'a FrameTextures) -> Option<UniversalFrame<'a>> {
        Some(universal(textures, FramePlanes::Rgb([textures.plane(0)?])))
    }
}

impl YuvAdapter {
    fn frame<'a>(&self, textures: &'a FrameTextures) -> Option<UniversalFrame<'a>> {
        let planes = [textures.plane(0)?, textures.plane(1)?, textures.plane(2)?];
        Some(universal(textures, FramePlanes::Yuv(planes)))
    }
}

fn universal<'a>(textures: &FrameTextures, planes: FramePlanes<'a>) -> UniversalFrame<'a> {
    let format = textures.format();
    UniversalFrame {
        timestamp: textures.timestamp,
        gain: textures.gain,
        exposure_time: textures.exposure_time,
        width: format.width,
        height: format.height,
        planes,
    }
}

enum FrameAdapter {
    Rgb(RgbAdapter),
    Yuv(YuvAdapter),
}

impl FrameAdapter {
    fn for_type(texture_type: TextureType) -> Self {
        match texture_type {
            TextureType::Rgb => Self::Rgb(RgbAdapter),
            TextureType::Yuv => Self::Yuv(YuvAdapter),
        }
    }

    fn texture_type(&self) -> TextureType {
        match self {
            Self::Rgb(_) => TextureType::Rgb,
            Self::Yuv(_) => TextureType::Yuv,
        }
    }

    fn frame<'a>(&self, textures: &'a FrameTextures) -> Option<UniversalFrame<'a>> {
        match self {
            Self::Rgb(adapter) => adapter.frame(textures),
            Self::Yuv(adapter) => adapter.frame(textures),
        }
    }
}

/// Republishes each new camera sample seen by a [`FrameConsumer`].
pub struct LiveFrameProvider {
    consumer: FrameConsumer,
    adapter: Option<FrameAdapter>,
    clock: MonotonicClock,
    released: bool,
}

impl LiveFrameProvider {
    pub fn new(consumer: FrameConsumer) -> Self {
        Self {
            consumer,
            adapter: None,
            clock: MonotonicClock::default(),
            released: false,
        }
    }

    pub fn consumer(&self) -> &FrameConsumer {
        &self.consumer
    }

    pub fn pause(&mut self) -> Result<()> {
        self.consumer.pause()
    }

    pub fn resume(&mut self) -> Result<()> {
        self.consumer.resume()
    }
}

impl FrameProvider for LiveFrameProvider {
    fn texture_type(&self) -> TextureType {
        if let Some(adapter) = &self.adapter {
            return adapter.texture_type();
        }
        self.consumer
            .session()
            .negotiated_format()
            .map_or(TextureType::Rgb, |f| f.pixel_format.texture_type())
    }

    fn play(&mut self) -> Result<()> {
        if self.released {
            return Err(crate::Error::InvalidState("provider released"));
        }
        self.consumer.play()?;
        if let Some(format) = self.consumer.textures().map(FrameTextures::format) {
            let texture_type = format.pixel_format.texture_type();
            debug!(?texture_type, "Live provider selected adapter");
            self.adapter = Some(FrameAdapter::for_type(texture_type));
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.consumer.stop();
    }

    fn tick(&mut self, tick: u64, on_frame: &mut OnFrame<'_>) -> Result<bool> {
        if self.released || !self.consumer.update(tick) {
            return Ok(false);
        }
        let (Some(adapter), Some(textures)) = (&self.adapter, self.consumer.textures()) else {
            return Ok(false);
        };
        let Some(frame) = adapter.frame(textures) else {
            return Ok(false);
        };

        if !self.clock.admit(frame.timestamp) {
            warn!(timestamp = frame.timestamp, "Camera timestamp went backwards; skipping frame");
            return Ok(false);
        }

        on_frame(&frame)?;
        Ok(true)
    }

    fn release(&mut self) {
        self.consumer.stop();
        self.adapter = None;
        self.released = true;
    }
}
