//! Frame type and pixel-format conversion to packed RGB.

use image::RgbImage;

/// A captured camera frame, packed RGB (3 bytes per pixel).
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    pub fn into_image(self) -> Result<RgbImage, FrameError> {
        let expected = rgb_len(self.width, self.height);
        let actual = self.data.len();
        RgbImage::from_raw(self.width, self.height, self.data)
            .ok_or(FrameError::InvalidLength { expected, actual })
    }
}

fn rgb_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// BT.601 limited-range YCbCr → RGB, fixed point.
fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let c = 298 * (i32::from(y) - 16);
    let d = i32::from(cb) - 128;
    let e = i32::from(cr) - 128;
    [
        clamp_u8((c + 409 * e + 128) >> 8),
        clamp_u8((c - 100 * d - 208 * e + 128) >> 8),
        clamp_u8((c + 516 * d + 128) >> 8),
    ]
}

/// Convert packed YUYV (4:2:2) to RGB.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = width as usize * height as usize * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity(rgb_len(width, height));
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
    }
    Ok(rgb)
}

/// Replicate an 8-bit grayscale buffer into RGB.
pub fn grey_to_rgb(gray: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = width as usize * height as usize;
    if gray.len() < pixels {
        return Err(FrameError::InvalidLength {
            expected: pixels,
            actual: gray.len(),
        });
    }
    Ok(gray[..pixels].iter().flat_map(|&p| [p, p, p]).collect())
}

/// 16-bit little-endian grayscale, keeping the high byte, into RGB.
pub fn y16_to_rgb(buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = width as usize * height as usize;
    if buf.len() < pixels * 2 {
        return Err(FrameError::InvalidLength {
            expected: pixels * 2,
            actual: buf.len(),
        });
    }
    let gray: Vec<u8> = buf[..pixels * 2].chunks_exact(2).map(|px| px[1]).collect();
    grey_to_rgb(&gray, width, height)
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_black_and_white() {
        // 2x1 image: Y0=16 (black), Y1=235 (white), neutral chroma.
        let yuyv = vec![16, 128, 235, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb, vec![0, 0, 0, 255, 255, 255]);
    }

    #[test]
    fn test_yuyv_red_dominant() {
        // BT.601 red: Y=81, Cb=90, Cr=240.
        let yuyv = vec![81, 90, 81, 240];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert!(rgb[0] > 240 && rgb[1] < 20 && rgb[2] < 20, "got {rgb:?}");
        assert_eq!(&rgb[..3], &rgb[3..]);
    }

    #[test]
    fn test_yuyv_output_length() {
        let yuyv = vec![128u8; 4 * 2 * 2];
        let rgb = yuyv_to_rgb(&yuyv, 4, 2).unwrap();
        assert_eq!(rgb.len(), 4 * 2 * 3);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let result = yuyv_to_rgb(&[100, 128], 2, 1);
        assert!(matches!(result, Err(FrameError::InvalidLength { expected: 4, actual: 2 })));
    }

    #[test]
    fn test_grey_to_rgb() {
        let rgb = grey_to_rgb(&[7, 200], 2, 1).unwrap();
        assert_eq!(rgb, vec![7, 7, 7, 200, 200, 200]);
    }

    #[test]
    fn test_y16_keeps_high_byte() {
        let buf = vec![0xFF, 0x12, 0x00, 0xAB];
        let rgb = y16_to_rgb(&buf, 2, 1).unwrap();
        assert_eq!(rgb, vec![0x12, 0x12, 0x12, 0xAB, 0xAB, 0xAB]);
    }

    #[test]
    fn test_frame_into_image() {
        let frame = Frame {
            data: vec![1, 2, 3, 4, 5, 6],
            width: 2,
            height: 1,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        };
        let image = frame.into_image().unwrap();
        assert_eq!(image.get_pixel(1, 0).0, [4, 5, 6]);
    }

    #[test]
    fn test_frame_into_image_short_buffer() {
        let frame = Frame {
            data: vec![0; 5],
            width: 2,
            height: 1,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        };
        assert!(frame.into_image().is_err());
    }
}
