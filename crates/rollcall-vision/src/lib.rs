//! rollcall-vision: ONNX face analysis backend.
//!
//! SCRFD detection plus ArcFace descriptors, exposed to the matching engine
//! through [`rollcall_core::FaceAnalyzer`].

pub mod alignment;
pub mod detector;
pub mod recognizer;

pub use alignment::{align_face, Landmarks, Similarity, REFERENCE_LANDMARKS_112};
pub use detector::{Detection, DetectorError, FaceDetector};
pub use recognizer::{FaceRecognizer, RecognizerError, ARCFACE_DESCRIPTOR_DIM};

use image::RgbImage;
use rollcall_core::{AnalyzerError, DetectedFace, Descriptor, FaceAnalyzer};
use std::path::Path;

pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Recognizer(#[from] RecognizerError),
}

/// Detector and recognizer pair loaded from a model directory.
pub struct OnnxAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxAnalyzer {
    /// Load `det_10g.onnx` and `w600k_r50.onnx` from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, LoadError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;
        Ok(Self { detector, recognizer })
    }

    pub fn new(detector: FaceDetector, recognizer: FaceRecognizer) -> Self {
        Self { detector, recognizer }
    }
}

impl FaceAnalyzer for OnnxAnalyzer {
    fn detect_and_embed(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, AnalyzerError> {
        let detections = self
            .detector
            .detect(image)
            .map_err(|e| AnalyzerError::Detection(Box::new(e)))?;

        let mut faces = Vec::with_capacity(detections.len());
        for detection in detections {
            let Some(landmarks) = detection.landmarks else {
                tracing::debug!(bbox = ?detection.bbox, "detection without landmarks skipped");
                continue;
            };
            let embedded = self.recognizer.embed(image, &landmarks);
            let Some(descriptor) = usable_descriptor(embedded).map_err(|e| AnalyzerError::Embedding(Box::new(e)))?
            else {
                tracing::debug!(bbox = ?detection.bbox, "detection with degenerate landmarks skipped");
                continue;
            };
            faces.push(DetectedFace {
                bbox: detection.bbox,
                descriptor,
            });
        }
        Ok(faces)
    }
}

/// A face that cannot be aligned is dropped; inference failures are errors.
fn usable_descriptor(embedded: Result<Descriptor, RecognizerError>) -> Result<Option<Descriptor>, RecognizerError> {
    match embedded {
        Ok(descriptor) => Ok(Some(descriptor)),
        Err(RecognizerError::DegenerateLandmarks) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_model_dir() {
        let err = OnnxAnalyzer::load(Path::new("/nonexistent/rollcall-models")).err().unwrap();
        assert!(matches!(err, LoadError::Detector(DetectorError::ModelNotFound(_))));
    }

    #[test]
    fn test_degenerate_landmarks_skip_only_that_face() {
        let descriptor = Descriptor::new(vec![0.5, 0.5]).unwrap();
        assert_eq!(usable_descriptor(Ok(descriptor.clone())).unwrap(), Some(descriptor));
        assert_eq!(usable_descriptor(Err(RecognizerError::DegenerateLandmarks)).unwrap(), None);
    }

    #[test]
    fn test_inference_failure_is_still_an_error() {
        let err = usable_descriptor(Err(RecognizerError::InferenceFailed("bad output".into()))).unwrap_err();
        assert!(matches!(err, RecognizerError::InferenceFailed(_)));
    }
}
