//! ArcFace descriptor extraction via ONNX Runtime.
//!
//! Produces 512-dimensional L2-normalized descriptors from aligned
//! 112×112 RGB crops (w600k_r50 model).

use crate::alignment::{self, Landmarks, ALIGNED_SIZE};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use rollcall_core::{Descriptor, DescriptorError};
use std::path::Path;
use thiserror::Error;

// Symmetric normalization, unlike SCRFD's 128.0 divisor.
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5;
pub const ARCFACE_DESCRIPTOR_DIM: usize = 512;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0} (download w600k_r50.onnx from insightface)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("landmarks are degenerate, face cannot be aligned")]
    DegenerateLandmarks,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

/// ArcFace-based face recognizer.
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Compute the descriptor of the face at `landmarks` in `image`.
    pub fn embed(&mut self, image: &RgbImage, landmarks: &Landmarks) -> Result<Descriptor, RecognizerError> {
        let aligned = alignment::align_face(image, landmarks).ok_or(RecognizerError::DegenerateLandmarks)?;
        let input = preprocess(&aligned);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("descriptor extraction: {e}")))?;

        if raw.len() != ARCFACE_DESCRIPTOR_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {ARCFACE_DESCRIPTOR_DIM}-dim descriptor, got {}",
                raw.len()
            )));
        }

        Ok(Descriptor::new(l2_normalize(raw))?)
    }
}

/// Aligned RGB crop → NCHW tensor normalized to [-1, 1].
fn preprocess(aligned: &RgbImage) -> Array4<f32> {
    let side = ALIGNED_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in aligned.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (f32::from(pixel[c]) - ARCFACE_MEAN) / ARCFACE_STD;
        }
    }
    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_preprocess_shape_and_range() {
        let crop = RgbImage::from_fn(ALIGNED_SIZE, ALIGNED_SIZE, |x, _| {
            if x == 0 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let tensor = preprocess(&crop);
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
        assert!((tensor[[0, 0, 5, 0]] + 1.0).abs() < 1e-6);
        assert!((tensor[[0, 2, 5, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_keeps_channel_order() {
        let crop = RgbImage::from_pixel(ALIGNED_SIZE, ALIGNED_SIZE, Rgb([255, 0, 127]));
        let tensor = preprocess(&crop);
        assert!(tensor[[0, 0, 0, 0]] > 0.99);
        assert!(tensor[[0, 1, 0, 0]] < -0.99);
        assert!(tensor[[0, 2, 0, 0]].abs() < 0.01);
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(&[3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_load_missing_model() {
        let err = FaceRecognizer::load(Path::new("/nonexistent/w600k_r50.onnx")).err().unwrap();
        assert!(matches!(err, RecognizerError::ModelNotFound(_)));
    }
}
