//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes the RGB input to 640×640, decodes the three stride levels
//! (anchor-free distance regression, two anchors per cell), then applies NMS.

use crate::alignment::Landmarks;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use rollcall_core::BoundingBox;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.4;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} (download det_10g.onnx from insightface)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A detected face with its five landmarks, in source image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub landmarks: Option<Landmarks>,
}

/// Mapping between letterboxed model space and the source image.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: u32, height: u32) -> (Self, u32, u32) {
        let side = SCRFD_INPUT_SIZE as f32;
        let scale = (side / width as f32).min(side / height as f32);
        let new_w = ((width as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE);
        let letterbox = Self {
            scale,
            pad_x: ((SCRFD_INPUT_SIZE - new_w) / 2) as f32,
            pad_y: ((SCRFD_INPUT_SIZE - new_h) / 2) as f32,
        };
        (letterbox, new_w, new_h)
    }

    fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor positions (score, bbox, kps) per stride, in stride order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutputLayout([(usize, usize, usize); 3]);

impl OutputLayout {
    /// Use `score_8`/`bbox_8`/`kps_8`-style names when every one is present,
    /// otherwise the standard export order: scores, then bboxes, then kps.
    fn from_names(names: &[String]) -> Self {
        let position = |kind: &str, stride: usize| {
            let wanted = format!("{kind}_{stride}");
            names.iter().position(|n| *n == wanted)
        };

        let mut named = [(0, 0, 0); 3];
        for (slot, &stride) in named.iter_mut().zip(SCRFD_STRIDES.iter()) {
            match (position("score", stride), position("bbox", stride), position("kps", stride)) {
                (Some(s), Some(b), Some(k)) => *slot = (s, b, k),
                _ => {
                    tracing::debug!(?names, "SCRFD outputs not named by stride; using positional layout");
                    return Self([(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
                }
            }
        }
        Self(named)
    }
}

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    layout: OutputLayout,
    score_threshold: f32,
    nms_threshold: f32,
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        tracing::info!(path = %model_path.display(), outputs = ?output_names, "loaded SCRFD model");

        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        Ok(Self {
            session,
            layout: OutputLayout::from_names(&output_names),
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
        })
    }

    pub fn with_thresholds(mut self, score: f32, nms: f32) -> Self {
        self.score_threshold = score;
        self.nms_threshold = nms;
        self
    }

    /// Detect faces, most confident first.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let (input, letterbox) = preprocess(image);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (&stride, &(score_idx, bbox_idx, kps_idx)) in SCRFD_STRIDES.iter().zip(self.layout.0.iter()) {
            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;
            let (_, kps) = outputs[kps_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("kps stride {stride}: {e}")))?;

            candidates.extend(decode_stride(scores, bboxes, kps, stride, &letterbox, self.score_threshold));
        }

        let kept = nms(candidates, self.nms_threshold);
        tracing::debug!(faces = kept.len(), "SCRFD detections");
        Ok(kept)
    }
}

/// Letterbox an RGB image into a normalized NCHW tensor.
///
/// Padding is left at 0.0, which is the normalized value of the mean.
fn preprocess(image: &RgbImage) -> (Array4<f32>, Letterbox) {
    let (letterbox, new_w, new_h) = Letterbox::fit(image.width(), image.height());
    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let side = SCRFD_INPUT_SIZE as usize;
    let (off_x, off_y) = (letterbox.pad_x as usize, letterbox.pad_y as usize);
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));

    for (x, y, pixel) in resized.enumerate_pixels() {
        let (tx, ty) = (x as usize + off_x, y as usize + off_y);
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (f32::from(pixel[c]) - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, letterbox)
}

/// Decode detections for a single stride level.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<Detection> {
    let grid = SCRFD_INPUT_SIZE as usize / stride;
    let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    scores
        .iter()
        .take(anchors)
        .enumerate()
        .filter(|&(_, &score)| score > threshold)
        .filter_map(|(idx, &score)| {
            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let cx = (cell % grid) as f32 * step;
            let cy = (cell / grid) as f32 * step;

            let d = bboxes.get(idx * 4..idx * 4 + 4)?;
            let (x1, y1) = letterbox.to_source(cx - d[0] * step, cy - d[1] * step);
            let (x2, y2) = letterbox.to_source(cx + d[2] * step, cy + d[3] * step);

            let landmarks = kps.get(idx * 10..idx * 10 + 10).map(|k| {
                std::array::from_fn(|i| letterbox.to_source(cx + k[i * 2] * step, cy + k[i * 2 + 1] * step))
            });

            Some(Detection {
                bbox: BoundingBox {
                    x: x1,
                    y: y1,
                    width: x2 - x1,
                    height: y2 - y1,
                    confidence: score,
                },
                landmarks,
            })
        })
        .collect()
}

/// Greedy non-maximum suppression. Output is sorted by confidence, descending.
fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.bbox.confidence.total_cmp(&a.bbox.confidence));

    let mut kept: Vec<Detection> = Vec::new();
    for det in detections {
        if kept.iter().all(|k| iou(&k.bbox, &det.bbox) <= iou_threshold) {
            kept.push(det);
        }
    }
    kept
}

/// Intersection-over-Union of two boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let inter_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = inter_w * inter_h;
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn det(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> Detection {
        Detection {
            bbox: BoundingBox { x, y, width: w, height: h, confidence },
            landmarks: None,
        }
    }

    #[test]
    fn test_iou_identical() {
        let a = det(0.0, 0.0, 100.0, 100.0, 1.0).bbox;
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = det(0.0, 0.0, 10.0, 10.0, 1.0).bbox;
        let b = det(5.0, 0.0, 10.0, 10.0, 1.0).bbox;
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = det(0.0, 0.0, 10.0, 10.0, 1.0).bbox;
        let b = det(20.0, 20.0, 10.0, 10.0, 1.0).bbox;
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn test_nms_keeps_most_confident_of_overlap() {
        let kept = nms(
            vec![
                det(5.0, 5.0, 100.0, 100.0, 0.8),
                det(200.0, 200.0, 50.0, 50.0, 0.7),
                det(0.0, 0.0, 100.0, 100.0, 0.9),
            ],
            0.4,
        );
        let confidences: Vec<f32> = kept.iter().map(|d| d.bbox.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.7]);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_letterbox_maps_back_to_source() {
        let (lb, new_w, new_h) = Letterbox::fit(320, 240);
        assert_eq!((new_w, new_h), (640, 480));
        assert_eq!((lb.pad_x, lb.pad_y), (0.0, 80.0));

        let (x, y) = lb.to_source(100.0 * lb.scale + lb.pad_x, 50.0 * lb.scale + lb.pad_y);
        assert!((x - 100.0).abs() < 1e-3 && (y - 50.0).abs() < 1e-3, "({x}, {y})");
    }

    #[test]
    fn test_preprocess_pads_with_zero() {
        let image = RgbImage::from_pixel(320, 240, Rgb([255, 0, 128]));
        let (tensor, _) = preprocess(&image);
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        // Top padding band.
        assert_eq!(tensor[[0, 0, 10, 320]], 0.0);
        // Inside the image, channels stay in RGB order.
        let r = tensor[[0, 0, 320, 320]];
        let g = tensor[[0, 1, 320, 320]];
        assert!((r - (255.0 - SCRFD_MEAN) / SCRFD_STD).abs() < 1e-3);
        assert!((g - (0.0 - SCRFD_MEAN) / SCRFD_STD).abs() < 1e-3);
    }

    #[test]
    fn test_decode_stride_single_anchor() {
        let stride = 32;
        let grid = 640 / stride;
        let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; anchors];
        let mut bboxes = vec![0.0f32; anchors * 4];
        let kps = vec![0.0f32; anchors * 10];

        // Cell (2, 1) → anchor centre (64, 32); box extends 1 stride each way.
        let idx = (grid + 2) * SCRFD_ANCHORS_PER_CELL;
        scores[idx] = 0.9;
        bboxes[idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);

        let identity = Letterbox { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };
        let dets = decode_stride(&scores, &bboxes, &kps, stride, &identity, 0.5);

        assert_eq!(dets.len(), 1);
        let b = dets[0].bbox;
        assert_eq!((b.x, b.y, b.width, b.height), (32.0, 0.0, 64.0, 64.0));
        assert_eq!(dets[0].landmarks.unwrap()[0], (64.0, 32.0));
    }

    #[test]
    fn test_output_layout_named() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8", "bbox_16", "kps_16", "score_16", "bbox_32", "kps_32", "score_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(OutputLayout::from_names(&names), OutputLayout([(2, 0, 1), (5, 3, 4), (8, 6, 7)]));
    }

    #[test]
    fn test_output_layout_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i: usize| (i + 400).to_string()).collect();
        assert_eq!(OutputLayout::from_names(&names), OutputLayout([(0, 3, 6), (1, 4, 7), (2, 5, 8)]));
    }
}
