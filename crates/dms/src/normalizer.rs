//! Eye crop normalization
//!
//! Turns a six-point eye contour into the classifier input: a margin-padded,
//! aspect-corrected box around the contour, cropped from the grayscale frame,
//! resized to 34x26, mirrored for the right eye and scaled to `[0, 1]`.

use image::{imageops, GrayImage};
use ndarray::{s, Array4};
use serde::{Deserialize, Serialize};

use crate::landmarks::{EyeSide, Point, EYE_POINTS};
use crate::DmsError;

/// Classifier input width
pub const EYE_WIDTH: u32 = 34;
/// Classifier input height
pub const EYE_HEIGHT: u32 = 26;
/// Horizontal margin factor applied to the contour width
pub const EYE_MARGIN: f32 = 1.2;

/// Floating-point eye box; its aspect ratio always matches the classifier input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeBox {
    pub center: Point,
    pub width: f32,
    pub height: f32,
}

impl EyeBox {
    pub fn from_landmarks(points: &[Point; EYE_POINTS]) -> Self {
        let (mut min_x, mut min_y) = (f32::INFINITY, f32::INFINITY);
        let (mut max_x, mut max_y) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }

        let width = (max_x - min_x) * EYE_MARGIN;
        let height = width * EYE_HEIGHT as f32 / EYE_WIDTH as f32;

        Self {
            center: Point::new((min_x + max_x) / 2.0, (min_y + max_y) / 2.0),
            width,
            height,
        }
    }

    /// Height over width
    pub fn aspect_ratio(&self) -> f32 {
        self.height / self.width
    }

    /// Round to whole pixels
    pub fn to_region(&self) -> EyeRegion {
        let (half_w, half_h) = (self.width / 2.0, self.height / 2.0);
        EyeRegion {
            min_x: (self.center.x - half_w).round() as i32,
            min_y: (self.center.y - half_h).round() as i32,
            max_x: (self.center.x + half_w).round() as i32,
            max_y: (self.center.y + half_h).round() as i32,
        }
    }
}

/// Integer eye rectangle, `max` exclusive. Used for cropping and overlay drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EyeRegion {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl EyeRegion {
    pub fn width(&self) -> i32 {
        self.max_x.saturating_sub(self.min_x)
    }

    pub fn height(&self) -> i32 {
        self.max_y.saturating_sub(self.min_y)
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Clamp to a `width` x `height` frame; an empty result is a degenerate region
    pub fn clamp_to(&self, width: u32, height: u32) -> Result<EyeRegion, DmsError> {
        let (w, h) = (width as i32, height as i32);
        let clamped = EyeRegion {
            min_x: self.min_x.clamp(0, w),
            min_y: self.min_y.clamp(0, h),
            max_x: self.max_x.clamp(0, w),
            max_y: self.max_y.clamp(0, h),
        };
        if clamped.is_empty() {
            return Err(DmsError::DegenerateEyeRegion(*self));
        }
        Ok(clamped)
    }
}

/// Crop `region` out of the frame and resize it to the classifier resolution
pub fn crop_eye(gray: &GrayImage, region: &EyeRegion) -> Result<GrayImage, DmsError> {
    let region = region.clamp_to(gray.width(), gray.height())?;
    let patch = imageops::crop_imm(
        gray,
        region.min_x as u32,
        region.min_y as u32,
        region.width() as u32,
        region.height() as u32,
    )
    .to_image();

    Ok(imageops::resize(
        &patch,
        EYE_WIDTH,
        EYE_HEIGHT,
        imageops::FilterType::Triangle,
    ))
}

/// Classifier-ready eye patch, shaped `(1, 26, 34, 1)` with values in `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEyeCrop {
    tensor: Array4<f32>,
}

impl NormalizedEyeCrop {
    pub fn from_gray(img: &GrayImage) -> Result<Self, DmsError> {
        if img.dimensions() != (EYE_WIDTH, EYE_HEIGHT) {
            return Err(DmsError::ImageProcessing(format!(
                "eye crop is {:?}, expected {}x{}",
                img.dimensions(),
                EYE_WIDTH,
                EYE_HEIGHT
            )));
        }

        let data: Vec<f32> = img.pixels().map(|p| f32::from(p[0]) / 255.0).collect();
        let tensor = Array4::from_shape_vec((1, EYE_HEIGHT as usize, EYE_WIDTH as usize, 1), data)
            .map_err(|e| DmsError::ImageProcessing(e.to_string()))?;

        Ok(Self { tensor })
    }

    pub fn tensor(&self) -> &Array4<f32> {
        &self.tensor
    }

    /// Row-major copy for model input
    pub fn to_vec(&self) -> Vec<f32> {
        self.tensor.iter().copied().collect()
    }

    /// Value at `(row, col)`
    pub fn at(&self, row: usize, col: usize) -> f32 {
        self.tensor[[0, row, col, 0]]
    }

    /// Horizontally mirrored copy
    pub fn mirrored(&self) -> Self {
        Self {
            tensor: self.tensor.slice(s![.., .., ..;-1, ..]).to_owned(),
        }
    }
}

/// A normalized crop together with the rectangle it was taken from
#[derive(Debug, Clone)]
pub struct EyePatch {
    pub crop: NormalizedEyeCrop,
    /// Crop rectangle, clamped to the frame
    pub region: EyeRegion,
}

/// Run the full normalization for one eye
pub fn normalize_eye(
    gray: &GrayImage,
    points: &[Point; EYE_POINTS],
    side: EyeSide,
) -> Result<EyePatch, DmsError> {
    let region = EyeBox::from_landmarks(points)
        .to_region()
        .clamp_to(gray.width(), gray.height())?;
    let mut resized = crop_eye(gray, &region)?;
    if side.is_mirrored() {
        imageops::flip_horizontal_in_place(&mut resized);
    }

    Ok(EyePatch {
        crop: NormalizedEyeCrop::from_gray(&resized)?,
        region,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use proptest::prelude::*;

    /// Horizontal and vertical gradients so mirroring is observable
    fn gradient(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            Luma([((x * 7 + y * 3) % 256) as u8])
        })
    }

    fn eye_at(cx: f32, cy: f32, half_w: f32, half_h: f32) -> [Point; EYE_POINTS] {
        [
            Point::new(cx - half_w, cy),
            Point::new(cx - half_w / 3.0, cy - half_h),
            Point::new(cx + half_w / 3.0, cy - half_h),
            Point::new(cx + half_w, cy),
            Point::new(cx + half_w / 3.0, cy + half_h),
            Point::new(cx - half_w / 3.0, cy + half_h),
        ]
    }

    #[test]
    fn test_box_geometry() {
        let eye_box = EyeBox::from_landmarks(&eye_at(100.0, 50.0, 10.0, 4.0));
        assert_eq!(eye_box.center, Point::new(100.0, 50.0));
        assert!((eye_box.width - 24.0).abs() < 1e-5);
        assert!((eye_box.height - 24.0 * 26.0 / 34.0).abs() < 1e-4);

        let region = eye_box.to_region();
        assert_eq!(region, EyeRegion { min_x: 88, min_y: 41, max_x: 112, max_y: 59 });
    }

    #[test]
    fn test_partial_overlap_is_clamped() {
        let region = EyeRegion { min_x: -5, min_y: 10, max_x: 20, max_y: 30 };
        let clamped = region.clamp_to(100, 100).unwrap();
        assert_eq!(clamped.min_x, 0);
        assert_eq!(clamped.width(), 20);
    }

    #[test]
    fn test_region_outside_frame_is_degenerate() {
        let gray = gradient(64, 48);
        let points = eye_at(200.0, 200.0, 10.0, 4.0);
        assert!(matches!(
            normalize_eye(&gray, &points, EyeSide::Left),
            Err(DmsError::DegenerateEyeRegion(_))
        ));
    }

    #[test]
    fn test_huge_contour_yields_frame_sized_region() {
        let gray = gradient(64, 48);
        let points = eye_at(0.0, 24.0, 2.0e9, 4.0);

        let patch = normalize_eye(&gray, &points, EyeSide::Left).unwrap();
        assert_eq!(patch.region, EyeRegion { min_x: 0, min_y: 0, max_x: 64, max_y: 48 });
        assert_eq!((patch.region.width(), patch.region.height()), (64, 48));
    }

    #[test]
    fn test_extreme_region_size_saturates() {
        let region = EyeRegion { min_x: i32::MIN, min_y: i32::MIN, max_x: i32::MAX, max_y: i32::MAX };
        assert_eq!(region.width(), i32::MAX);
        assert_eq!(region.height(), i32::MAX);
        assert!(!region.is_empty());
    }

    #[test]
    fn test_collapsed_contour_is_degenerate() {
        let gray = gradient(64, 48);
        let points = [Point::new(30.0, 20.0); EYE_POINTS];
        assert!(normalize_eye(&gray, &points, EyeSide::Right).is_err());
    }

    #[test]
    fn test_normalized_range_and_shape() {
        let gray = GrayImage::from_pixel(80, 60, Luma([255]));
        let patch = normalize_eye(&gray, &eye_at(40.0, 30.0, 12.0, 5.0), EyeSide::Left).unwrap();

        assert_eq!(patch.crop.tensor().shape(), &[1, 26, 34, 1]);
        assert!(patch.crop.tensor().iter().all(|v| (*v - 1.0).abs() < 1e-6));
        assert_eq!(patch.crop.to_vec().len(), 26 * 34);
    }

    #[test]
    fn test_wrong_size_crop_rejected() {
        let img = GrayImage::new(10, 10);
        assert!(NormalizedEyeCrop::from_gray(&img).is_err());
    }

    proptest! {
        #[test]
        fn prop_aspect_ratio_matches_classifier_input(
            cx in 40.0f32..160.0,
            cy in 40.0f32..120.0,
            half_w in 3.0f32..30.0,
            half_h in 0.5f32..12.0,
        ) {
            let eye_box = EyeBox::from_landmarks(&eye_at(cx, cy, half_w, half_h));
            let expected = EYE_HEIGHT as f32 / EYE_WIDTH as f32;
            prop_assert!((eye_box.aspect_ratio() - expected).abs() < 1e-5);
        }

        #[test]
        fn prop_right_eye_is_mirror_of_unmirrored(
            cx in 40.0f32..160.0,
            cy in 40.0f32..120.0,
            half_w in 3.0f32..30.0,
            half_h in 0.5f32..12.0,
        ) {
            let gray = gradient(200, 160);
            let points = eye_at(cx, cy, half_w, half_h);

            let left = normalize_eye(&gray, &points, EyeSide::Left).unwrap();
            let right = normalize_eye(&gray, &points, EyeSide::Right).unwrap();

            prop_assert_eq!(left.region, right.region);
            prop_assert_eq!(right.crop, left.crop.mirrored());
        }
    }
}
