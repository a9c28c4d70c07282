//! Frame type and pixel conversion — YUYV/MJPEG to RGB, dark detection.

use image::{ImageFormat, Rgb, RgbImage};
use std::path::Path;
use std::time::Instant;

/// A captured RGB camera frame.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub timestamp: Instant,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u32) -> Self {
        let is_dark = is_dark_frame(&image, 0.95);
        Self {
            image,
            timestamp: Instant::now(),
            sequence,
            is_dark,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Average luma (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        let n = self.image.width() as usize * self.image.height() as usize;
        if n == 0 {
            return 0.0;
        }
        self.image.pixels().map(|p| luma(p) as f32).sum::<f32>() / n as f32
    }

    /// Pixels packed as `0x00RRGGBB`, the layout preview windows expect.
    pub fn to_argb(&self) -> Vec<u32> {
        self.image
            .pixels()
            .map(|Rgb([r, g, b])| (u32::from(*r) << 16) | (u32::from(*g) << 8) | u32::from(*b))
            .collect()
    }

    /// Write the frame as a JPEG file.
    pub fn save_jpeg(&self, path: &Path) -> Result<(), FrameError> {
        self.image.save_with_format(path, ImageFormat::Jpeg)?;
        Ok(())
    }
}

/// BT.601 luma of an RGB pixel.
fn luma(Rgb([r, g, b]): &Rgb<u8>) -> u8 {
    let y = 0.299 * *r as f32 + 0.587 * *g as f32 + 0.114 * *b as f32;
    y.round().clamp(0.0, 255.0) as u8
}

/// Convert packed YUYV (4:2:2) to RGB.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
    }

    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected,
        actual: yuyv.len(),
    })
}

fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let cb = u as f32 - 128.0;
    let cr = v as f32 - 128.0;
    let clamp = |c: f32| c.round().clamp(0.0, 255.0) as u8;
    [
        clamp(y + 1.402 * cr),
        clamp(y - 0.344_136 * cb - 0.714_136 * cr),
        clamp(y + 1.772 * cb),
    ]
}

/// Decode one MJPEG buffer.
pub fn mjpeg_to_rgb(buf: &[u8]) -> Result<RgbImage, FrameError> {
    Ok(image::load_from_memory_with_format(buf, ImageFormat::Jpeg)?.to_rgb8())
}

/// True if more than `threshold_pct` of pixels have luma below 32.
pub fn is_dark_frame(image: &RgbImage, threshold_pct: f32) -> bool {
    let total = image.width() as usize * image.height() as usize;
    if total == 0 {
        return true;
    }
    let dark = image.pixels().filter(|p| luma(p) < 32).count();
    (dark as f32 / total as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_neutral_chroma_is_gray() {
        // 2x1 image: [Y0=100, U=128, Y1=200, V=128]
        let rgb = yuyv_to_rgb(&[100, 128, 200, 128], 2, 1).unwrap();
        assert_eq!(rgb.get_pixel(0, 0).0, [100, 100, 100]);
        assert_eq!(rgb.get_pixel(1, 0).0, [200, 200, 200]);
    }

    #[test]
    fn test_yuyv_red_chroma() {
        // High V pushes red up and green down.
        let rgb = yuyv_to_rgb(&[128, 128, 128, 228], 2, 1).unwrap();
        let [r, g, b] = rgb.get_pixel(0, 0).0;
        assert!(r > 250 && g < 60 && b == 128, "({r}, {g}, {b})");
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(matches!(
            yuyv_to_rgb(&[100, 128], 2, 1),
            Err(FrameError::InvalidLength { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_dark_frame_all_black() {
        assert!(is_dark_frame(&RgbImage::new(40, 25), 0.95));
    }

    #[test]
    fn test_dark_frame_normal() {
        assert!(!is_dark_frame(&RgbImage::from_pixel(40, 25, Rgb([128, 128, 128])), 0.95));
    }

    #[test]
    fn test_dark_frame_empty() {
        assert!(is_dark_frame(&RgbImage::new(0, 0), 0.95));
    }

    #[test]
    fn test_dark_frame_borderline() {
        // 100 pixels: 96 dark → dark; 94 dark → not dark
        let mut img = RgbImage::from_pixel(100, 1, Rgb([10, 10, 10]));
        for x in 96..100 {
            img.put_pixel(x, 0, Rgb([200, 200, 200]));
        }
        assert!(is_dark_frame(&img, 0.95));
        for x in 94..96 {
            img.put_pixel(x, 0, Rgb([200, 200, 200]));
        }
        assert!(!is_dark_frame(&img, 0.95));
    }

    #[test]
    fn test_to_argb_packing() {
        let frame = Frame::new(RgbImage::from_pixel(1, 1, Rgb([0x12, 0x34, 0x56])), 0);
        assert_eq!(frame.to_argb(), vec![0x0012_3456]);
        assert!(!frame.is_dark);
    }

    #[test]
    fn test_save_jpeg_writes_decodable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("captured.jpg");
        let frame = Frame::new(RgbImage::from_pixel(16, 8, Rgb([180, 90, 40])), 7);

        frame.save_jpeg(&path).unwrap();

        let decoded = mjpeg_to_rgb(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(decoded.dimensions(), (16, 8));
    }
}
