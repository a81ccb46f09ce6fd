//! Capture devices through OpenCV videoio

use std::time::Instant;

use opencv::core::Mat;
use opencv::imgproc;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};
use tracing::{debug, info, warn};

use crate::frame::VideoFrame;
use crate::source::FrameSource;
use crate::CameraError;

/// A webcam or other videoio device opened by index
pub struct DeviceSource {
    index: i32,
    capture: VideoCapture,
    opened_at: Instant,
    sequence: u32,
    closed: bool,
}

impl DeviceSource {
    /// Open device `index` and request a `width` x `height` mode
    pub fn open(index: i32, width: u32, height: u32) -> Result<Self, CameraError> {
        let open_err = |e: opencv::Error| CameraError::Open(format!("device {}: {}", index, e));

        let mut capture = VideoCapture::new(index, videoio::CAP_ANY).map_err(open_err)?;
        if !capture.is_opened().map_err(open_err)? {
            return Err(CameraError::Open(format!("device {}: not available", index)));
        }

        for (prop, value) in [
            (videoio::CAP_PROP_FRAME_WIDTH, width),
            (videoio::CAP_PROP_FRAME_HEIGHT, height),
        ] {
            if !capture.set(prop, value as f64).map_err(open_err)? {
                warn!("Device {} ignored capture property {} = {}", index, prop, value);
            }
        }

        info!(
            "Opened capture device {} (requested {}x{}, got {}x{})",
            index,
            width,
            height,
            capture.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or(0.0),
            capture.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0),
        );

        Ok(Self {
            index,
            capture,
            opened_at: Instant::now(),
            sequence: 0,
            closed: false,
        })
    }

    /// Convert a BGR capture into an RGB frame
    fn to_frame(&self, bgr: &Mat) -> Result<VideoFrame, CameraError> {
        let decode_err = |e: opencv::Error| CameraError::Decode(e.to_string());

        let mut rgb = Mat::default();
        imgproc::cvt_color_def(bgr, &mut rgb, imgproc::COLOR_BGR2RGB).map_err(decode_err)?;

        let (width, height) = (rgb.cols(), rgb.rows());
        if width <= 0 || height <= 0 {
            return Err(CameraError::Decode(format!(
                "device {}: empty {}x{} capture",
                self.index, width, height
            )));
        }
        let data = rgb.data_bytes().map_err(decode_err)?.to_vec();

        Ok(VideoFrame::new(
            data,
            width as u32,
            height as u32,
            self.opened_at.elapsed().as_nanos() as u64,
            self.sequence,
        ))
    }
}

impl FrameSource for DeviceSource {
    fn read_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        if self.closed {
            return Ok(None);
        }

        let mut bgr = Mat::default();
        let grabbed = self
            .capture
            .read(&mut bgr)
            .map_err(|e| CameraError::Stream(format!("device {}: {}", self.index, e)))?;
        if !grabbed || bgr.empty() {
            // Unplugged, or the driver stopped delivering
            info!("Device {} stopped delivering frames", self.index);
            return Ok(None);
        }

        let frame = self.to_frame(&bgr)?;
        debug!("Captured frame {} from device {}", self.sequence, self.index);
        self.sequence = self.sequence.wrapping_add(1);
        Ok(Some(frame))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.capture.release() {
            warn!("Failed to release device {}: {}", self.index, e);
        }
        info!("Closed capture device {}", self.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_device() {
        assert!(matches!(
            DeviceSource::open(9999, 640, 480),
            Err(CameraError::Open(_))
        ));
    }
}
