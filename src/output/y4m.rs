//! YUV4MPEG2 video writer

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::capture::decoder;
use crate::compositor::RenderTarget;
use crate::error::{Error, Result};
use crate::output::encoder::{AudioChannel, VideoEncoder};

/// Writes composited frames as uncompressed 4:2:0 YUV4MPEG2.
///
/// The container carries no audio; channel volumes are kept so callers can
/// query what a muxing encoder would have applied.
pub struct Y4mWriter {
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    width: u32,
    height: u32,
    volumes: [f32; 2],
    frames: u64,
    last_timestamp: Option<u64>,
    i420: Vec<u8>,
}

impl Default for Y4mWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Y4mWriter {
    pub fn new() -> Self {
        Self {
            path: None,
            writer: None,
            width: 0,
            height: 0,
            volumes: [1.0; 2],
            frames: 0,
            last_timestamp: None,
            i420: Vec::new(),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.writer.is_some()
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    pub fn volume(&self, channel: AudioChannel) -> f32 {
        self.volumes[channel_index(channel)]
    }
}

fn channel_index(channel: AudioChannel) -> usize {
    match channel {
        AudioChannel::Microphone => 0,
        AudioChannel::Application => 1,
    }
}

impl VideoEncoder for Y4mWriter {
    fn extension(&self) -> &'static str {
        "y4m"
    }

    fn set_output_path(&mut self, path: &Path) -> Result<()> {
        if self.is_recording() {
            return Err(Error::InvalidState("output path changed while recording"));
        }
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    fn start(&mut self, width: u32, height: u32, fps: u32) -> Result<()> {
        if self.is_recording() {
            return Err(Error::InvalidState("recording already started"));
        }
        let path = self
            .path
            .as_ref()
            .ok_or(Error::InvalidState("no output path set"))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "YUV4MPEG2 W{width} H{height} F{}:1 Ip A1:1 C420jpeg", fps.max(1))?;
        info!(path = %path.display(), width, height, fps, "Y4M recording started");

        self.writer = Some(writer);
        self.width = width;
        self.height = height;
        self.frames = 0;
        self.last_timestamp = None;
        Ok(())
    }

    fn commit(&mut self, frame: &RenderTarget, timestamp: u64) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(Error::InvalidState("commit without an open recording"));
        };
        if frame.width() != self.width || frame.height() != self.height {
            return Err(Error::Encoder(format!(
                "frame is {}x{}, recording is {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }
        if self.last_timestamp.is_some_and(|last| timestamp < last) {
            warn!(timestamp, "Out-of-order frame committed to recording");
        }

        decoder::rgba_to_i420(frame.pixels(), self.width, self.height, &mut self.i420);
        writer.write_all(b"FRAME\n")?;
        writer.write_all(&self.i420)?;

        self.frames += 1;
        self.last_timestamp = Some(timestamp);
        Ok(())
    }

    fn set_volume(&mut self, channel: AudioChannel, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        debug!(?channel, volume, "Recording volume set");
        self.volumes[channel_index(channel)] = volume;
    }

    fn finish(&mut self) -> Result<PathBuf> {
        let mut writer = self
            .writer
            .take()
            .ok_or(Error::InvalidState("finish without an open recording"))?;
        writer.flush()?;
        let path = self
            .path
            .clone()
            .ok_or(Error::InvalidState("no output path set"))?;
        info!(path = %path.display(), frames = self.frames, "Y4M recording finished");
        Ok(path)
    }
}
