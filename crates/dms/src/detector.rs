//! Face localization and eye classification capabilities

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::landmarks::LandmarkSet;
use crate::normalizer::NormalizedEyeCrop;
use crate::DmsError;

/// Face bounding box (pixels)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union
    pub fn iou(&self, other: &FaceBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Finds faces and their 68-point landmarks in a grayscale frame
pub trait FaceLocalizer: Send {
    /// Zero or more faces
    fn detect_faces(&self, gray: &GrayImage) -> Result<Vec<FaceBox>, DmsError>;

    /// Landmarks for one detected face
    fn locate_landmarks(&self, gray: &GrayImage, face: &FaceBox) -> Result<LandmarkSet, DmsError>;
}

/// Scores a normalized eye crop; higher means more likely open
pub trait EyeClassifier: Send {
    fn score_openness(&self, crop: &NormalizedEyeCrop) -> Result<f32, DmsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32, y: f32, size: f32) -> FaceBox {
        FaceBox {
            x,
            y,
            width: size,
            height: size,
            confidence: 0.9,
        }
    }

    #[test]
    fn test_iou() {
        let a = face(0.0, 0.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&face(20.0, 20.0, 10.0)), 0.0);

        // Half overlap along x: 50 / 150
        let b = face(5.0, 0.0, 10.0);
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_box_has_zero_iou() {
        let a = face(0.0, 0.0, 0.0);
        assert_eq!(a.iou(&a), 0.0);
    }
}
