//! Face alignment via a 4-DOF similarity transform.
//!
//! Maps the five detected landmarks onto the ArcFace reference positions
//! (closed-form least squares) and warps the face into a 112×112 RGB crop.

use image::{Rgb, RgbImage};

/// Five-point landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
pub type Landmarks = [(f32, f32); 5];

/// ArcFace reference landmarks for a 112×112 crop.
pub const REFERENCE_LANDMARKS_112: Landmarks = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

pub const ALIGNED_SIZE: u32 = 112;

/// `p' = [a -b; b a] p + t`: uniform scale, rotation and translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Similarity {
    /// Least-squares similarity taking `src` onto `dst`.
    ///
    /// `None` if the source points are (numerically) all coincident.
    pub fn estimate(src: &Landmarks, dst: &Landmarks) -> Option<Self> {
        let n = src.len() as f32;
        let mean = |pts: &Landmarks| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
            (sx / n, sy / n)
        };
        let (msx, msy) = mean(src);
        let (mdx, mdy) = mean(dst);

        let mut var = 0.0f32;
        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
            let (sx, sy) = (sx - msx, sy - msy);
            let (dx, dy) = (dx - mdx, dy - mdy);
            var += sx * sx + sy * sy;
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
        }
        if var < 1e-6 {
            return None;
        }

        let a = dot / var;
        let b = cross / var;
        Some(Self {
            a,
            b,
            tx: mdx - (a * msx - b * msy),
            ty: mdy - (b * msx + a * msy),
        })
    }

    pub fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    pub fn inverse(&self) -> Option<Self> {
        let k = self.a * self.a + self.b * self.b;
        if k < 1e-12 {
            return None;
        }
        let a = self.a / k;
        let b = -self.b / k;
        Some(Self {
            a,
            b,
            tx: -(a * self.tx - b * self.ty),
            ty: -(b * self.tx + a * self.ty),
        })
    }
}

/// Warp the face described by `landmarks` into a canonical 112×112 crop.
///
/// Pixels falling outside the source image are black.
pub fn align_face(image: &RgbImage, landmarks: &Landmarks) -> Option<RgbImage> {
    let forward = Similarity::estimate(landmarks, &REFERENCE_LANDMARKS_112)?;
    let back = forward.inverse()?;

    Some(RgbImage::from_fn(ALIGNED_SIZE, ALIGNED_SIZE, |u, v| {
        let (x, y) = back.apply((u as f32, v as f32));
        sample_bilinear(image, x, y)
    }))
}

fn sample_bilinear(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 || x < 0.0 || y < 0.0 || x > (w - 1) as f32 || y > (h - 1) as f32 {
        return Rgb([0, 0, 0]);
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let (tl, tr) = (image.get_pixel(x0, y0), image.get_pixel(x1, y0));
    let (bl, br) = (image.get_pixel(x0, y1), image.get_pixel(x1, y1));

    let mut out = [0u8; 3];
    for (c, slot) in out.iter_mut().enumerate() {
        let top = f32::from(tl[c]) * (1.0 - fx) + f32::from(tr[c]) * fx;
        let bottom = f32::from(bl[c]) * (1.0 - fx) + f32::from(br[c]) * fx;
        *slot = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_estimate_identity() {
        let t = Similarity::estimate(&REFERENCE_LANDMARKS_112, &REFERENCE_LANDMARKS_112).unwrap();
        assert!(close(t.a, 1.0) && close(t.b, 0.0), "{t:?}");
        assert!(close(t.tx, 0.0) && close(t.ty, 0.0), "{t:?}");
    }

    #[test]
    fn test_estimate_recovers_known_transform() {
        // Scale 2, rotate 90°, translate (10, -5): a = 0, b = 2.
        let truth = Similarity { a: 0.0, b: 2.0, tx: 10.0, ty: -5.0 };
        let src = REFERENCE_LANDMARKS_112;
        let dst: Landmarks = std::array::from_fn(|i| truth.apply(src[i]));

        let t = Similarity::estimate(&src, &dst).unwrap();
        assert!(close(t.a, truth.a) && close(t.b, truth.b), "{t:?}");
        assert!(close(t.tx, truth.tx) && close(t.ty, truth.ty), "{t:?}");
    }

    #[test]
    fn test_inverse_undoes_transform() {
        let t = Similarity { a: 0.8, b: -0.3, tx: 4.0, ty: 12.0 };
        let inv = t.inverse().unwrap();
        let (x, y) = inv.apply(t.apply((37.0, 81.0)));
        assert!(close(x, 37.0) && close(y, 81.0), "({x}, {y})");
    }

    #[test]
    fn test_estimate_degenerate_points() {
        let src = [(5.0, 5.0); 5];
        assert!(Similarity::estimate(&src, &REFERENCE_LANDMARKS_112).is_none());
    }

    #[test]
    fn test_align_face_at_reference_is_identity_crop() {
        let image = RgbImage::from_fn(ALIGNED_SIZE, ALIGNED_SIZE, |x, y| Rgb([x as u8, y as u8, 50]));
        let aligned = align_face(&image, &REFERENCE_LANDMARKS_112).unwrap();
        assert_eq!(aligned.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
        for (x, y) in [(1, 1), (56, 56), (100, 20)] {
            let p = aligned.get_pixel(x, y);
            let q = image.get_pixel(x, y);
            for c in 0..3 {
                assert!((i16::from(p[c]) - i16::from(q[c])).abs() <= 1, "({x},{y}): {p:?} vs {q:?}");
            }
        }
    }

    #[test]
    fn test_align_face_outside_source_is_black() {
        let image = RgbImage::from_pixel(4, 4, Rgb([255, 255, 255]));
        // Landmarks far outside the tiny image.
        let lms: Landmarks = std::array::from_fn(|i| {
            let (x, y) = REFERENCE_LANDMARKS_112[i];
            (x + 500.0, y + 500.0)
        });
        let aligned = align_face(&image, &lms).unwrap();
        assert_eq!(aligned.get_pixel(56, 56), &Rgb([0, 0, 0]));
    }
}
