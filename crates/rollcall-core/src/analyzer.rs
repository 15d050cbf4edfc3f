//! Seam to the external face detection and descriptor extraction capability.

use crate::descriptor::Descriptor;
use crate::types::BoundingBox;
use image::RgbImage;
use thiserror::Error;

/// Boxed error from an external collaborator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("face detection failed: {0}")]
    Detection(#[source] BoxError),
    #[error("descriptor extraction failed: {0}")]
    Embedding(#[source] BoxError),
}

/// A detected face and its descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub descriptor: Descriptor,
}

/// Detects faces in an image and embeds each one.
///
/// Returning no faces is a valid outcome, not an error. Implementations
/// order faces by their own preference (e.g. detector confidence); callers
/// that keep a single face take the first.
pub trait FaceAnalyzer {
    fn detect_and_embed(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, AnalyzerError>;
}

impl<A: FaceAnalyzer + ?Sized> FaceAnalyzer for &mut A {
    fn detect_and_embed(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, AnalyzerError> {
        (**self).detect_and_embed(image)
    }
}

impl<A: FaceAnalyzer + ?Sized> FaceAnalyzer for Box<A> {
    fn detect_and_embed(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, AnalyzerError> {
        (**self).detect_and_embed(image)
    }
}

/// Load and decode an image file into 8-bit RGB.
pub fn load_image(path: &std::path::Path) -> Result<RgbImage, image::ImageError> {
    Ok(image::open(path)?.to_rgb8())
}
