use std::io::Cursor;

use anyhow::{bail, Context, Result};
use image::{ImageFormat, RgbaImage};
use retouch_contracts::events::{payload, EventKind, EventWriter};
use serde_json::json;

use crate::media::MediaFile;

pub const CAMERA_ACCESS_ERROR: &str =
    "Could not access the camera. Please ensure permissions are granted.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacingMode {
    User,
    #[default]
    Environment,
}

impl FacingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FacingMode::User => "user",
            FacingMode::Environment => "environment",
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            FacingMode::User => FacingMode::Environment,
            FacingMode::Environment => FacingMode::User,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// A live, video-only stream. `stop` gives the hardware back.
pub trait MediaStream {
    fn current_frame(&mut self) -> Result<VideoFrame>;
    fn stop(&mut self);
}

pub trait CameraDevice {
    /// Fails when permission is denied or no camera is available.
    fn open(&mut self, facing: FacingMode) -> Result<Box<dyn MediaStream>>;
}

/// Holds at most one live stream and releases it exactly once, whichever
/// way the session ends: a capture, `close`, or drop.
pub struct CameraSession {
    device: Box<dyn CameraDevice>,
    stream: Option<Box<dyn MediaStream>>,
    facing: FacingMode,
    error: Option<String>,
    events: Option<EventWriter>,
}

impl CameraSession {
    pub fn open(
        device: Box<dyn CameraDevice>,
        facing: FacingMode,
        events: Option<EventWriter>,
    ) -> Self {
        let mut session = Self {
            device,
            stream: None,
            facing,
            error: None,
            events,
        };
        session.start();
        session
    }

    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    /// Inline error for the capture view, if the last open failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn retry(&mut self) {
        self.start();
    }

    pub fn switch_facing(&mut self) {
        self.facing = self.facing.flipped();
        self.start();
    }

    /// Snapshots the current frame as a PNG and ends the stream.
    pub fn capture(&mut self) -> Result<MediaFile> {
        let Some(stream) = self.stream.as_mut() else {
            bail!(self
                .error
                .clone()
                .unwrap_or_else(|| "Camera is not streaming.".to_string()));
        };
        let frame = stream.current_frame()?;
        let bytes = encode_png(frame)?;
        self.release();
        let file_name = format!("capture-{}.png", chrono::Utc::now().timestamp_millis());
        Ok(MediaFile::original(file_name, "image/png", bytes))
    }

    pub fn close(&mut self) {
        self.release();
    }

    fn start(&mut self) {
        self.release();
        match self.device.open(self.facing) {
            Ok(stream) => {
                self.stream = Some(stream);
                self.error = None;
                self.record(EventKind::CameraOpened, None);
            }
            Err(err) => {
                self.error = Some(CAMERA_ACCESS_ERROR.to_string());
                self.record(EventKind::CameraOpenFailed, Some(format!("{err:#}")));
            }
        }
    }

    fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            self.record(EventKind::CameraReleased, None);
        }
    }

    fn record(&self, kind: EventKind, error: Option<String>) {
        if let Some(events) = &self.events {
            events.record(
                kind,
                payload(json!({
                    "facing": self.facing.as_str(),
                    "error": error,
                })),
            );
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.release();
    }
}

fn encode_png(frame: VideoFrame) -> Result<Vec<u8>> {
    let VideoFrame {
        width,
        height,
        rgba,
    } = frame;
    let Some(image) = RgbaImage::from_raw(width, height, rgba) else {
        bail!("camera frame does not match {width}x{height} RGBA");
    };
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .context("failed encoding camera frame")?;
    Ok(out.into_inner())
}
