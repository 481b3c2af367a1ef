//! Per-viewer cursor over a shared capture session

use std::sync::Arc;

use tracing::{debug, warn};

use crate::capture::frame::{CameraFormat, FrameSample, Plane, PlaneSpec};
use crate::capture::session::{CameraCaptureSession, ConsumerId};
use crate::error::Result;

/// Per-plane texture storage, re-filled in place every update.
#[derive(Debug)]
pub struct FrameTextures {
    format: CameraFormat,
    planes: Vec<(PlaneSpec, Vec<u8>)>,
    pub timestamp: u64,
    pub gain: u32,
    pub exposure_time: u32,
}

impl FrameTextures {
    pub fn new(format: CameraFormat) -> Self {
        let planes = format
            .pixel_format
            .plane_specs(format.width, format.height)
            .map(|spec| (spec, vec![0; spec.byte_len()]))
            .collect();

        Self {
            format,
            planes,
            timestamp: 0,
            gain: 0,
            exposure_time: 0,
        }
    }

    /// Split a sample's bytes into the format's planes.
    pub fn upload(&mut self, sample: &FrameSample) -> bool {
        let bytes = sample.pixels();
        let mut offset = 0;
        for (spec, data) in &mut self.planes {
            let end = offset + spec.byte_len();
            let Some(src) = bytes.get(offset..end) else {
                warn!(
                    size = bytes.len(),
                    expected = self.format.frame_len(),
                    "Sample too short for its format; skipping upload"
                );
                return false;
            };
            data.copy_from_slice(src);
            offset = end;
        }

        self.timestamp = sample.timestamp;
        self.gain = sample.gain;
        self.exposure_time = sample.exposure_time;
        true
    }

    pub fn format(&self) -> CameraFormat {
        self.format
    }

    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    pub fn plane(&self, index: usize) -> Option<Plane<'_>> {
        self.planes.get(index).map(|(spec, data)| Plane {
            data,
            width: spec.width,
            height: spec.height,
            channels: spec.channels,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Stopped,
    Playing,
    Paused,
}

/// One viewer of a [`CameraCaptureSession`].
///
/// Call [`update`](Self::update) once per render tick. Consumers sharing a
/// session all observe the same frame within a tick.
pub struct FrameConsumer {
    id: ConsumerId,
    session: Arc<CameraCaptureSession>,
    state: ConsumerState,
    last_tick: Option<u64>,
    updated: bool,
    textures: Option<FrameTextures>,
}

impl FrameConsumer {
    pub fn new(session: Arc<CameraCaptureSession>) -> Self {
        Self {
            id: session.new_consumer_id(),
            session,
            state: ConsumerState::Stopped,
            last_tick: None,
            updated: false,
            textures: None,
        }
    }

    pub fn id(&self) -> ConsumerId {
        self.id
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn session(&self) -> &Arc<CameraCaptureSession> {
        &self.session
    }

    /// Register with the session and start it if needed.
    pub fn play(&mut self) -> Result<()> {
        match self.state {
            ConsumerState::Playing => return Ok(()),
            ConsumerState::Paused => return self.resume(),
            ConsumerState::Stopped => {}
        }

        if let Err(e) = self.session.regist(self.id).and_then(|_| self.session.play()) {
            self.session.remove(self.id);
            return Err(e);
        }

        if let Some(format) = self.session.negotiated_format() {
            if self.textures.as_ref().map(FrameTextures::format) != Some(format) {
                self.textures = Some(FrameTextures::new(format));
            }
        }
        self.state = ConsumerState::Playing;
        debug!(id = ?self.id, "Consumer playing");
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.state == ConsumerState::Playing {
            self.session.pause_consumer(self.id)?;
            self.state = ConsumerState::Paused;
            self.updated = false;
        }
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.state == ConsumerState::Paused {
            self.session.resume_consumer(self.id)?;
            self.state = ConsumerState::Playing;
        }
        Ok(())
    }

    /// Deregister; the session stops once its last consumer is gone.
    pub fn stop(&mut self) {
        if self.state == ConsumerState::Stopped {
            return;
        }
        self.session.remove(self.id);
        self.session.stop();
        self.state = ConsumerState::Stopped;
        self.updated = false;
        self.last_tick = None;
        debug!(id = ?self.id, "Consumer stopped");
    }

    /// Per-tick hook: pull the tick's frame and upload it into the textures.
    pub fn update(&mut self, tick: u64) -> bool {
        if self.state != ConsumerState::Playing {
            self.updated = false;
            return false;
        }
        if self.last_tick == Some(tick) {
            return self.updated;
        }
        self.last_tick = Some(tick);
        self.updated = self.session.has_frame(tick);

        if self.updated {
            if let Some(textures) = self.textures.as_mut() {
                self.updated = self
                    .session
                    .with_current_frame(|sample| textures.upload(sample))
                    .unwrap_or(false);
            }
        }
        self.updated
    }

    pub fn did_update_this_frame(&self) -> bool {
        self.updated
    }

    /// Read the tick's current sample without retaining it.
    pub fn with_current_frame<R>(&self, f: impl FnOnce(&FrameSample) -> R) -> Option<R> {
        if self.state == ConsumerState::Stopped {
            return None;
        }
        self.session.with_current_frame(f)
    }

    pub fn textures(&self) -> Option<&FrameTextures> {
        self.textures.as_ref()
    }
}

impl Drop for FrameConsumer {
    fn drop(&mut self) {
        self.stop();
    }
}
