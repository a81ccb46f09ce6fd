//! ONNX-backed localizer and eye classifier
//!
//! Face detection expects an UltraFace-style model (`1x3x240x320` input,
//! `scores [1, N, 2]` and corner-form `boxes [1, N, 4]` normalized outputs).
//! Landmarks come from a PFLD-style regressor (`1x3x112x112` input, 136
//! normalized coordinates relative to the face crop). The eye classifier is a
//! Keras-layout binary CNN taking `(1, 26, 34, 1)` and returning one
//! probability.

use image::{imageops, GrayImage};
use inference_engine::{ModelOutput, OnnxModel};
use tracing::{debug, info};

use crate::detector::{EyeClassifier, FaceBox, FaceLocalizer};
use crate::landmarks::{LandmarkSet, Point, LANDMARK_COUNT};
use crate::normalizer::{NormalizedEyeCrop, EYE_HEIGHT, EYE_WIDTH};
use crate::{DmsConfig, DmsError};

const DETECTOR_WIDTH: u32 = 320;
const DETECTOR_HEIGHT: u32 = 240;
const LANDMARK_SIZE: u32 = 112;
/// Side of the square landmark crop relative to the larger face box side
const LANDMARK_CROP_SCALE: f32 = 1.1;

/// Face detector plus landmark regressor
pub struct OnnxFaceLocalizer {
    detector: OnnxModel,
    landmarker: OnnxModel,
    confidence_threshold: f32,
    nms_iou: f32,
}

impl OnnxFaceLocalizer {
    pub fn new(config: &DmsConfig) -> Result<Self, DmsError> {
        let face_path = config
            .face_model_path
            .as_ref()
            .ok_or_else(|| DmsError::ModelLoad("face model path not configured".into()))?;
        let landmark_path = config
            .landmark_model_path
            .as_ref()
            .ok_or_else(|| DmsError::ModelLoad("landmark model path not configured".into()))?;

        info!("Loading face detection model from {}", face_path.display());
        let detector = OnnxModel::load(
            face_path,
            &[1, 3, DETECTOR_HEIGHT as usize, DETECTOR_WIDTH as usize],
        )?;

        info!("Loading landmark model from {}", landmark_path.display());
        let landmarker = OnnxModel::load(
            landmark_path,
            &[1, 3, LANDMARK_SIZE as usize, LANDMARK_SIZE as usize],
        )?;

        Ok(Self {
            detector,
            landmarker,
            confidence_threshold: config.face_confidence,
            nms_iou: config.nms_iou,
        })
    }
}

/// Replicate a grayscale image into a planar 3-channel tensor
fn planar_rgb(gray: &GrayImage, normalize: impl Fn(u8) -> f32) -> Vec<f32> {
    let plane: Vec<f32> = gray.pixels().map(|p| normalize(p[0])).collect();
    let mut data = Vec::with_capacity(plane.len() * 3);
    for _ in 0..3 {
        data.extend_from_slice(&plane);
    }
    data
}

fn find_output<'a>(outputs: &'a [ModelOutput], last_dim: usize) -> Option<&'a ModelOutput> {
    outputs
        .iter()
        .find(|o| o.shape.last() == Some(&last_dim) && o.shape.len() >= 2)
}

/// Turn detector outputs into pixel-space face boxes above `threshold`
pub fn decode_detections(
    scores: &ModelOutput,
    boxes: &ModelOutput,
    frame_width: u32,
    frame_height: u32,
    threshold: f32,
) -> Result<Vec<FaceBox>, DmsError> {
    let anchors = scores.len() / 2;
    if boxes.len() != anchors * 4 {
        return Err(DmsError::Inference(format!(
            "detector produced {} scores but {} box values",
            scores.len(),
            boxes.len()
        )));
    }

    let (fw, fh) = (frame_width as f32, frame_height as f32);
    let faces = (0..anchors)
        .filter_map(|i| {
            let confidence = scores.data[i * 2 + 1];
            if confidence < threshold {
                return None;
            }
            let b = &boxes.data[i * 4..i * 4 + 4];
            let x1 = (b[0] * fw).clamp(0.0, fw);
            let y1 = (b[1] * fh).clamp(0.0, fh);
            let x2 = (b[2] * fw).clamp(0.0, fw);
            let y2 = (b[3] * fh).clamp(0.0, fh);
            (x2 > x1 && y2 > y1).then_some(FaceBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence,
            })
        })
        .collect();

    Ok(faces)
}

/// Greedy non-maximum suppression, highest confidence first
pub fn non_max_suppression(mut faces: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    faces.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<FaceBox> = Vec::with_capacity(faces.len());
    for face in faces {
        if kept.iter().all(|k| k.iou(&face) <= iou_threshold) {
            kept.push(face);
        }
    }
    kept
}

/// Square crop around a face, clamped to the frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

pub fn landmark_crop(face: &FaceBox, frame_width: u32, frame_height: u32) -> Option<CropRect> {
    let side = face.width.max(face.height) * LANDMARK_CROP_SCALE;
    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;

    let x1 = (cx - side / 2.0).round().max(0.0) as u32;
    let y1 = (cy - side / 2.0).round().max(0.0) as u32;
    let x2 = ((cx + side / 2.0).round().max(0.0) as u32).min(frame_width);
    let y2 = ((cy + side / 2.0).round().max(0.0) as u32).min(frame_height);

    (x2 > x1 && y2 > y1).then_some(CropRect {
        x: x1,
        y: y1,
        width: x2 - x1,
        height: y2 - y1,
    })
}

/// Map crop-relative normalized coordinates back to frame pixels
pub fn decode_landmarks(values: &[f32], crop: &CropRect) -> Result<LandmarkSet, DmsError> {
    if values.len() != LANDMARK_COUNT * 2 {
        return Err(DmsError::LandmarkCount(values.len() / 2));
    }

    let points = values
        .chunks_exact(2)
        .map(|xy| {
            Point::new(
                crop.x as f32 + xy[0] * crop.width as f32,
                crop.y as f32 + xy[1] * crop.height as f32,
            )
        })
        .collect();

    LandmarkSet::new(points)
}

impl FaceLocalizer for OnnxFaceLocalizer {
    fn detect_faces(&self, gray: &GrayImage) -> Result<Vec<FaceBox>, DmsError> {
        let resized = imageops::resize(
            gray,
            DETECTOR_WIDTH,
            DETECTOR_HEIGHT,
            imageops::FilterType::Triangle,
        );
        let input = planar_rgb(&resized, |v| (f32::from(v) - 127.0) / 128.0);
        let outputs = self.detector.run(&input)?;

        let scores = find_output(&outputs, 2)
            .ok_or_else(|| DmsError::Inference("detector has no scores output".into()))?;
        let boxes = find_output(&outputs, 4)
            .ok_or_else(|| DmsError::Inference("detector has no boxes output".into()))?;

        let candidates = decode_detections(
            scores,
            boxes,
            gray.width(),
            gray.height(),
            self.confidence_threshold,
        )?;
        let faces = non_max_suppression(candidates, self.nms_iou);
        debug!("Detected {} faces", faces.len());
        Ok(faces)
    }

    fn locate_landmarks(&self, gray: &GrayImage, face: &FaceBox) -> Result<LandmarkSet, DmsError> {
        let crop = landmark_crop(face, gray.width(), gray.height())
            .ok_or_else(|| DmsError::ImageProcessing("face box outside frame".into()))?;

        let patch = imageops::crop_imm(gray, crop.x, crop.y, crop.width, crop.height).to_image();
        let resized = imageops::resize(
            &patch,
            LANDMARK_SIZE,
            LANDMARK_SIZE,
            imageops::FilterType::Triangle,
        );
        let input = planar_rgb(&resized, |v| f32::from(v) / 255.0);
        let outputs = self.landmarker.run(&input)?;

        let landmarks = outputs
            .iter()
            .find(|o| o.len() == LANDMARK_COUNT * 2)
            .ok_or_else(|| DmsError::Inference("landmark model has no 136-value output".into()))?;

        decode_landmarks(&landmarks.data, &crop)
    }
}

/// Binary open/closed eye classifier
pub struct OnnxEyeClassifier {
    model: OnnxModel,
}

impl OnnxEyeClassifier {
    pub fn new(config: &DmsConfig) -> Result<Self, DmsError> {
        let path = config
            .eye_model_path
            .as_ref()
            .ok_or_else(|| DmsError::ModelLoad("eye model path not configured".into()))?;

        info!("Loading eye model from {}", path.display());
        let model = OnnxModel::load(path, &[1, EYE_HEIGHT as usize, EYE_WIDTH as usize, 1])?;
        Ok(Self { model })
    }
}

/// Validate a raw classifier output as an openness score
pub fn openness_from_output(outputs: &[ModelOutput]) -> Result<f32, DmsError> {
    let value = outputs
        .first()
        .and_then(|o| o.data.first())
        .copied()
        .ok_or_else(|| DmsError::Inference("eye model returned no output".into()))?;

    if !value.is_finite() {
        return Err(DmsError::Inference(format!("eye model returned {}", value)));
    }
    Ok(value.clamp(0.0, 1.0))
}

impl EyeClassifier for OnnxEyeClassifier {
    fn score_openness(&self, crop: &NormalizedEyeCrop) -> Result<f32, DmsError> {
        let outputs = self.model.run(&crop.to_vec())?;
        openness_from_output(&outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn output(shape: &[usize], data: Vec<f32>) -> ModelOutput {
        ModelOutput {
            shape: shape.to_vec(),
            data,
        }
    }

    #[test]
    fn test_decode_detections_thresholds_and_scales() {
        let scores = output(&[1, 3, 2], vec![0.9, 0.1, 0.2, 0.8, 0.05, 0.95]);
        let boxes = output(
            &[1, 3, 4],
            vec![
                0.0, 0.0, 0.5, 0.5, // below threshold
                0.25, 0.25, 0.75, 0.75, //
                0.5, 0.5, 1.2, 1.0, // clamped to frame
            ],
        );

        let faces = decode_detections(&scores, &boxes, 640, 480, 0.7).unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!((faces[0].x, faces[0].y, faces[0].width), (160.0, 120.0, 320.0));
        assert_eq!(faces[1].width, 320.0);
        assert_eq!(faces[1].confidence, 0.95);
    }

    #[test]
    fn test_decode_detections_shape_mismatch() {
        let scores = output(&[1, 2, 2], vec![0.0; 4]);
        let boxes = output(&[1, 1, 4], vec![0.0; 4]);
        assert!(decode_detections(&scores, &boxes, 10, 10, 0.5).is_err());
    }

    #[test]
    fn test_nms_keeps_best_of_overlapping() {
        let face = |x: f32, confidence: f32| FaceBox {
            x,
            y: 0.0,
            width: 100.0,
            height: 100.0,
            confidence,
        };
        let kept = non_max_suppression(vec![face(0.0, 0.8), face(5.0, 0.95), face(300.0, 0.75)], 0.3);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.95);
        assert_eq!(kept[1].x, 300.0);
    }

    #[test]
    fn test_landmark_crop_is_square_and_clamped() {
        let face = FaceBox {
            x: 100.0,
            y: 100.0,
            width: 100.0,
            height: 80.0,
            confidence: 1.0,
        };
        let crop = landmark_crop(&face, 640, 480).unwrap();
        assert_eq!((crop.width, crop.height), (110, 110));

        let edge = FaceBox { x: 600.0, ..face };
        let crop = landmark_crop(&edge, 640, 480).unwrap();
        assert_eq!(crop.x + crop.width, 640);

        let outside = FaceBox { x: 1000.0, ..face };
        assert!(landmark_crop(&outside, 640, 480).is_none());
    }

    #[test]
    fn test_decode_landmarks_maps_to_frame() {
        let crop = CropRect {
            x: 10,
            y: 20,
            width: 100,
            height: 50,
        };
        let mut values = vec![0.0; LANDMARK_COUNT * 2];
        values[36 * 2] = 0.5;
        values[36 * 2 + 1] = 1.0;

        let set = decode_landmarks(&values, &crop).unwrap();
        assert_eq!(set.points()[36], Point::new(60.0, 70.0));
        assert_eq!(set.points()[0], Point::new(10.0, 20.0));

        assert!(decode_landmarks(&values[..100], &crop).is_err());
    }

    #[test]
    fn test_openness_output_validation() {
        assert_eq!(openness_from_output(&[output(&[1, 1], vec![0.42])]).unwrap(), 0.42);
        assert_eq!(openness_from_output(&[output(&[1, 1], vec![1.3])]).unwrap(), 1.0);
        assert!(openness_from_output(&[output(&[1, 1], vec![f32::NAN])]).is_err());
        assert!(openness_from_output(&[]).is_err());
    }

    #[test]
    fn test_missing_models_fail_at_startup() {
        let config = DmsConfig::default();
        assert!(matches!(OnnxEyeClassifier::new(&config), Err(DmsError::ModelLoad(_))));
        assert!(matches!(OnnxFaceLocalizer::new(&config), Err(DmsError::ModelLoad(_))));

        let config = DmsConfig {
            eye_model_path: Some(PathBuf::from("/nonexistent/eye.onnx")),
            ..Default::default()
        };
        assert!(matches!(OnnxEyeClassifier::new(&config), Err(DmsError::ModelLoad(_))));
    }
}
