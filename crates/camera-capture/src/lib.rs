//! Camera Capture Library for the drowsiness monitor
//!
//! Provides the cabin camera frame sequence:
//! - Directory replay of captured stills (jpg/png/bmp)
//! - MJPEG byte streams (a file, a FIFO, or stdin fed by `ffmpeg -f v4l2 ... -f mjpeg -`)
//! - Capture devices through OpenCV (`device` feature)
//! - A lazy, non-restartable [`Frames`] iterator that releases the source on every exit path

#[cfg(feature = "device")]
pub mod device;
pub mod frame;
pub mod mjpeg;
pub mod source;
pub mod stream;

#[cfg(feature = "device")]
pub use device::DeviceSource;
pub use frame::VideoFrame;
pub use mjpeg::MjpegSource;
pub use source::{DirectorySource, FrameSource};
pub use stream::Frames;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Frame decode failed: {0}")]
    Decode(String),

    #[error("Streaming error: {0}")]
    Stream(String),
}

/// Where frames come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Directory of still images replayed in lexical order
    Directory,
    /// Concatenated JPEG byte stream ("-" reads stdin)
    Mjpeg,
    /// Capture device opened by index (`device` feature)
    Device,
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Source kind
    pub source: SourceKind,
    /// Directory or stream path
    pub path: PathBuf,
    /// Restart a directory replay from the first image when exhausted
    pub looping: bool,
    /// Target FPS (0 = as fast as the source delivers)
    pub fps: u32,
    /// Scale applied to every captured frame before analysis
    pub frame_scale: f32,
    /// Capture device index
    pub device_index: i32,
    /// Requested device resolution; the driver may pick the nearest mode
    pub capture_width: u32,
    pub capture_height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Mjpeg,
            path: PathBuf::from("-"),
            looping: false,
            fps: 0,
            frame_scale: 0.8,
            device_index: 1,
            capture_width: 1280,
            capture_height: 720,
        }
    }
}

impl CameraConfig {
    /// Open the configured source as a boxed [`FrameSource`]
    pub fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        match self.source {
            SourceKind::Directory => Ok(Box::new(DirectorySource::open(
                &self.path,
                self.looping,
                self.fps,
            )?)),
            SourceKind::Mjpeg => Ok(Box::new(MjpegSource::open(&self.path)?)),
            #[cfg(feature = "device")]
            SourceKind::Device => Ok(Box::new(DeviceSource::open(
                self.device_index,
                self.capture_width,
                self.capture_height,
            )?)),
            #[cfg(not(feature = "device"))]
            SourceKind::Device => Err(CameraError::Open(format!(
                "device {}: built without the `device` feature",
                self.device_index
            ))),
        }
    }
}
