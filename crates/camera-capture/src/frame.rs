//! Video frame types and processing

use image::{imageops, GrayImage, RgbImage};

use crate::CameraError;

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds since the source was opened)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Wrap an RGB image
    pub fn from_rgb_image(img: RgbImage, timestamp_ns: u64, sequence: u32) -> Self {
        let (width, height) = img.dimensions();
        Self::new(img.into_raw(), width, height, timestamp_ns, sequence)
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        self.data
            .get(idx..idx + 3)
            .map(|p| [p[0], p[1], p[2]])
    }

    /// Borrow the pixel data as an RGB image
    pub fn to_rgb_image(&self) -> Result<RgbImage, CameraError> {
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            CameraError::Format(format!(
                "buffer of {} bytes does not hold a {}x{} RGB frame",
                self.data.len(),
                self.width,
                self.height
            ))
        })
    }

    /// Convert to grayscale
    pub fn to_grayscale(&self) -> Result<GrayImage, CameraError> {
        let mut gray = Vec::with_capacity((self.width * self.height) as usize);
        for pixel in self.data.chunks_exact(3) {
            // Luminance formula: 0.299*R + 0.587*G + 0.114*B
            let y = pixel[0] as f32 * 0.299 + pixel[1] as f32 * 0.587 + pixel[2] as f32 * 0.114;
            gray.push(y.round().min(255.0) as u8);
        }
        GrayImage::from_raw(self.width, self.height, gray).ok_or_else(|| {
            CameraError::Format(format!(
                "{}x{} frame has a short pixel buffer",
                self.width, self.height
            ))
        })
    }

    /// Rescale the frame by `factor` using bilinear interpolation
    pub fn scale(&self, factor: f32) -> Result<VideoFrame, CameraError> {
        if !(factor > 0.0) || !factor.is_finite() {
            return Err(CameraError::Format(format!("invalid scale factor {}", factor)));
        }
        if (factor - 1.0).abs() < f32::EPSILON {
            return Ok(self.clone());
        }

        let new_width = ((self.width as f32 * factor).round() as u32).max(1);
        let new_height = ((self.height as f32 * factor).round() as u32).max(1);
        let img = self.to_rgb_image()?;
        let resized = imageops::resize(&img, new_width, new_height, imageops::FilterType::Triangle);

        Ok(VideoFrame::from_rgb_image(resized, self.timestamp_ns, self.sequence))
    }
}

/// Decode a JPEG (MJPEG) frame to RGB
pub fn decode_jpeg(jpeg: &[u8], timestamp_ns: u64, sequence: u32) -> Result<VideoFrame, CameraError> {
    let img = image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg)
        .map_err(|e| CameraError::Decode(e.to_string()))?;

    Ok(VideoFrame::from_rgb_image(img.to_rgb8(), timestamp_ns, sequence))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> VideoFrame {
        let data = rgb.iter().copied().cycle().take((width * height * 3) as usize).collect();
        VideoFrame::new(data, width, height, 0, 0)
    }

    #[test]
    fn test_get_pixel_bounds() {
        let frame = solid(4, 3, [10, 20, 30]);
        assert_eq!(frame.get_pixel(3, 2), Some([10, 20, 30]));
        assert_eq!(frame.get_pixel(4, 0), None);
        assert_eq!(frame.get_pixel(0, 3), None);
    }

    #[test]
    fn test_grayscale_luminance() {
        let white = solid(2, 2, [255, 255, 255]).to_grayscale().unwrap();
        assert!(white.pixels().all(|p| p[0] == 255));

        let red = solid(2, 2, [255, 0, 0]).to_grayscale().unwrap();
        assert!(red.pixels().all(|p| p[0] == 76));
    }

    #[test]
    fn test_short_buffer_rejected() {
        let frame = VideoFrame::new(vec![0; 5], 2, 2, 0, 0);
        assert!(frame.to_rgb_image().is_err());
        assert!(frame.to_grayscale().is_err());
    }

    #[test]
    fn test_scale_dimensions() {
        let frame = solid(1280, 720, [1, 2, 3]);
        let scaled = frame.scale(0.8).unwrap();
        assert_eq!((scaled.width, scaled.height), (1024, 576));
        assert_eq!(scaled.data.len(), 1024 * 576 * 3);

        assert!(frame.scale(0.0).is_err());
        assert!(frame.scale(f32::NAN).is_err());
    }

    #[test]
    fn test_jpeg_roundtrip_decodes() {
        let img = RgbImage::from_pixel(16, 8, image::Rgb([120, 120, 120]));
        let mut jpeg = Vec::new();
        image::codecs::jpeg::JpegEncoder::new(&mut jpeg)
            .encode_image(&img)
            .unwrap();

        let frame = decode_jpeg(&jpeg, 42, 7).unwrap();
        assert_eq!((frame.width, frame.height), (16, 8));
        assert_eq!(frame.sequence, 7);
        assert!(decode_jpeg(&[0xFF, 0xD8, 0x00], 0, 0).is_err());
    }
}
