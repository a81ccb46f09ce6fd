//! 68-point facial landmark geometry

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::DmsError;

/// Points per landmark set
pub const LANDMARK_COUNT: usize = 68;

/// Points per eye contour
pub const EYE_POINTS: usize = 6;

/// Left-eye contour indices
pub const LEFT_EYE: Range<usize> = 36..42;

/// Right-eye contour indices
pub const RIGHT_EYE: Range<usize> = 42..48;

/// 2D image point (pixels)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Which eye
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EyeSide {
    Left,
    Right,
}

impl EyeSide {
    fn indices(self) -> Range<usize> {
        match self {
            EyeSide::Left => LEFT_EYE,
            EyeSide::Right => RIGHT_EYE,
        }
    }

    /// The classifier sees both eyes in left-eye orientation
    pub fn is_mirrored(self) -> bool {
        self == EyeSide::Right
    }
}

/// Ordered landmarks of one detected face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSet {
    points: Vec<Point>,
}

impl LandmarkSet {
    /// Build a landmark set; anything but 68 points is rejected
    pub fn new(points: Vec<Point>) -> Result<Self, DmsError> {
        if points.len() != LANDMARK_COUNT {
            return Err(DmsError::LandmarkCount(points.len()));
        }
        if let Some(index) = points.iter().position(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(DmsError::NonFiniteLandmark { index });
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// The six contour points of one eye, in localizer order
    pub fn eye(&self, side: EyeSide) -> [Point; EYE_POINTS] {
        let mut eye = [Point::default(); EYE_POINTS];
        eye.copy_from_slice(&self.points[side.indices()]);
        eye
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered() -> Vec<Point> {
        (0..LANDMARK_COUNT).map(|i| Point::new(i as f32, 0.0)).collect()
    }

    #[test]
    fn test_eye_subsets() {
        let set = LandmarkSet::new(numbered()).unwrap();

        let left = set.eye(EyeSide::Left);
        assert_eq!(left.first().map(|p| p.x), Some(36.0));
        assert_eq!(left.last().map(|p| p.x), Some(41.0));

        let right = set.eye(EyeSide::Right);
        assert_eq!(right.first().map(|p| p.x), Some(42.0));
        assert_eq!(right.last().map(|p| p.x), Some(47.0));
    }

    #[test]
    fn test_wrong_count_rejected() {
        let mut points = numbered();
        points.pop();
        assert!(matches!(
            LandmarkSet::new(points),
            Err(DmsError::LandmarkCount(67))
        ));
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut points = numbered();
        points[40].y = f32::NAN;
        assert!(matches!(
            LandmarkSet::new(points),
            Err(DmsError::NonFiniteLandmark { index: 40 })
        ));
    }

    #[test]
    fn test_only_right_eye_is_mirrored() {
        assert!(EyeSide::Right.is_mirrored());
        assert!(!EyeSide::Left.is_mirrored());
    }
}
