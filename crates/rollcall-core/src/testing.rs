//! Fake collaborators shared by the unit tests.

use crate::analyzer::{AnalyzerError, DetectedFace, FaceAnalyzer};
use crate::descriptor::Descriptor;
use crate::types::BoundingBox;
use image::{Rgb, RgbImage};
use std::path::Path;

/// Treats each 8×8 tile of a solid color as one face.
///
/// Black tiles (a blank wall) contain no face. A face's descriptor is its
/// tile color scaled to [0, 1], so two images of the same color enroll to
/// (nearly) the same descriptor even after lossy JPEG encoding.
pub struct ColorAnalyzer {
    pub calls: usize,
}

pub const TILE: u32 = 8;

impl ColorAnalyzer {
    pub fn new() -> Self {
        Self { calls: 0 }
    }
}

impl FaceAnalyzer for ColorAnalyzer {
    fn detect_and_embed(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, AnalyzerError> {
        self.calls += 1;
        let mut faces = Vec::new();
        for ty in 0..image.height() / TILE {
            for tx in 0..image.width() / TILE {
                let Rgb([r, g, b]) = *image.get_pixel(tx * TILE + TILE / 2, ty * TILE + TILE / 2);
                if u16::from(r) + u16::from(g) + u16::from(b) < 30 {
                    continue;
                }
                let values = [r, g, b].iter().map(|&c| f32::from(c) / 255.0).collect();
                faces.push(DetectedFace {
                    bbox: BoundingBox {
                        x: (tx * TILE) as f32,
                        y: (ty * TILE) as f32,
                        width: TILE as f32,
                        height: TILE as f32,
                        confidence: 0.99,
                    },
                    descriptor: Descriptor::new(values).unwrap(),
                });
            }
        }
        Ok(faces)
    }
}

/// Always fails, to exercise error paths.
pub struct FailingAnalyzer;

impl FaceAnalyzer for FailingAnalyzer {
    fn detect_and_embed(&mut self, _image: &RgbImage) -> Result<Vec<DetectedFace>, AnalyzerError> {
        Err(AnalyzerError::Detection("model exploded".into()))
    }
}

/// Image made of horizontal tiles, one per color.
pub fn tiled_image(colors: &[[u8; 3]]) -> RgbImage {
    let width = TILE * colors.len().max(1) as u32;
    RgbImage::from_fn(width, TILE, |x, _| {
        colors.get((x / TILE) as usize).map(|&c| Rgb(c)).unwrap_or(Rgb([0, 0, 0]))
    })
}

pub fn write_image(path: &Path, colors: &[[u8; 3]]) {
    tiled_image(colors).save(path).unwrap();
}

pub const BLACK: [u8; 3] = [0, 0, 0];
pub const RED: [u8; 3] = [220, 20, 20];
pub const GREEN: [u8; 3] = [20, 220, 20];
pub const BLUE: [u8; 3] = [20, 20, 220];
