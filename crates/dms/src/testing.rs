//! Scripted capabilities for exercising the pipeline without models

use image::GrayImage;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::detector::{EyeClassifier, FaceBox, FaceLocalizer};
use crate::landmarks::{LandmarkSet, Point, LANDMARK_COUNT, LEFT_EYE, RIGHT_EYE};
use crate::normalizer::NormalizedEyeCrop;
use crate::DmsError;

/// Horizontal offset of each eye centre from the face centre
const EYE_OFFSET: f32 = 20.0;

/// A 68-point face centred on `(cx, cy)` with open-looking eye contours
pub fn face_landmarks(cx: f32, cy: f32) -> LandmarkSet {
    let mut points = vec![Point::new(cx, cy); LANDMARK_COUNT];

    // Contour order: corner, two upper lid points, corner, two lower lid points
    let contour = [
        (-10.0, 0.0),
        (-4.0, -3.0),
        (4.0, -3.0),
        (10.0, 0.0),
        (4.0, 3.0),
        (-4.0, 3.0),
    ];
    for (range, ex) in [(LEFT_EYE, cx - EYE_OFFSET), (RIGHT_EYE, cx + EYE_OFFSET)] {
        for (i, (dx, dy)) in range.zip(contour) {
            points[i] = Point::new(ex + dx, cy + dy);
        }
    }

    // Points are constructed finite and complete
    match LandmarkSet::new(points) {
        Ok(set) => set,
        Err(e) => panic!("synthetic landmarks rejected: {e}"),
    }
}

fn bounding_box(landmarks: &LandmarkSet) -> FaceBox {
    let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
    let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
    for p in landmarks.points() {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    FaceBox {
        x: min_x,
        y: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
        confidence: 1.0,
    }
}

/// Localizer that reports the same faces on every frame
pub struct ScriptedLocalizer {
    faces: Vec<(FaceBox, LandmarkSet)>,
    fail: bool,
}

impl ScriptedLocalizer {
    pub fn always(faces: Vec<LandmarkSet>) -> Self {
        Self {
            faces: faces.into_iter().map(|l| (bounding_box(&l), l)).collect(),
            fail: false,
        }
    }

    /// Every detection call fails
    pub fn failing() -> Self {
        Self {
            faces: Vec::new(),
            fail: true,
        }
    }
}

impl FaceLocalizer for ScriptedLocalizer {
    fn detect_faces(&self, _gray: &GrayImage) -> Result<Vec<FaceBox>, DmsError> {
        if self.fail {
            return Err(DmsError::Inference("scripted detector failure".into()));
        }
        Ok(self.faces.iter().map(|(face, _)| *face).collect())
    }

    fn locate_landmarks(&self, _gray: &GrayImage, face: &FaceBox) -> Result<LandmarkSet, DmsError> {
        self.faces
            .iter()
            .find(|(candidate, _)| candidate == face)
            .map(|(_, landmarks)| landmarks.clone())
            .ok_or_else(|| DmsError::Inference("unknown face".into()))
    }
}

/// Classifier that cycles through a fixed list of scores, one per call
pub struct SequenceClassifier {
    scores: Vec<f32>,
    next: AtomicUsize,
}

impl SequenceClassifier {
    pub fn new(scores: Vec<f32>) -> Self {
        assert!(!scores.is_empty(), "at least one score is required");
        Self {
            scores,
            next: AtomicUsize::new(0),
        }
    }

    /// Number of crops scored so far
    pub fn calls(&self) -> usize {
        self.next.load(Ordering::Relaxed)
    }
}

impl EyeClassifier for SequenceClassifier {
    fn score_openness(&self, _crop: &NormalizedEyeCrop) -> Result<f32, DmsError> {
        let i = self.next.fetch_add(1, Ordering::Relaxed);
        Ok(self.scores[i % self.scores.len()])
    }
}
