//! Crop geometry and pixel extraction.
//!
//! Capture crops are always square. When the ideal square around a face
//! would leave the frame, it shrinks around the face center; if that loses
//! too much, the square is slid back inside the frame instead (and, failing
//! that, centered on the frame at the largest size that fits).

use emocap_models::{BoundingBox, CropRegion};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};
use std::io::Write;
use std::path::Path;

use crate::error::{VisionError, VisionResult};

/// Capture crop parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropConfig {
    /// Ideal square side as a multiple of the face box height
    pub scale_factor: f64,
    /// Below this fraction of the ideal side, re-center instead of shrinking
    pub min_fill_ratio: f64,
    /// Margin added around a face before classification
    pub face_padding: i32,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            scale_factor: 3.0,
            min_fill_ratio: 0.8,
            face_padding: 10,
        }
    }
}

/// Square capture region for a face inside a `width` x `height` frame.
pub fn capture_region(bbox: &BoundingBox, width: u32, height: u32, config: &CropConfig) -> VisionResult<CropRegion> {
    if bbox.is_degenerate() {
        return Err(VisionError::invalid_geometry(format!(
            "degenerate face box {}x{}",
            bbox.width, bbox.height
        )));
    }
    if width == 0 || height == 0 {
        return Err(VisionError::invalid_geometry("empty frame"));
    }

    let (w, h) = (width as i32, height as i32);
    let (mut cx, mut cy) = bbox.center();
    let ideal = (bbox.height as f64 * config.scale_factor) as i32;

    let max_around_center = 2 * cx.min(w - cx).min(cy).min(h - cy);
    let mut size = ideal.min(max_around_center);

    if (size as f64) < ideal as f64 * config.min_fill_ratio {
        let half = ideal / 2;
        if half <= w - half && half <= h - half {
            cx = cx.clamp(half, w - half);
            cy = cy.clamp(half, h - half);
            size = ideal;
        } else {
            cx = w / 2;
            cy = h / 2;
            size = w.min(h);
        }
    }

    let region = CropRegion::square(cx, cy, size);
    if region.is_empty() || !region.fits_within(width, height) {
        return Err(VisionError::invalid_geometry(format!(
            "no usable square for face at ({}, {}) in {}x{}",
            cx, cy, width, height
        )));
    }
    Ok(region)
}

/// Copy a region out of a frame.
pub fn crop_image(frame: &RgbImage, region: &CropRegion) -> VisionResult<RgbImage> {
    if region.is_empty() || !region.fits_within(frame.width(), frame.height()) {
        return Err(VisionError::invalid_geometry(format!(
            "region {:?} outside {}x{} frame",
            region,
            frame.width(),
            frame.height()
        )));
    }
    Ok(image::imageops::crop_imm(
        frame,
        region.x1 as u32,
        region.y1 as u32,
        region.width() as u32,
        region.height() as u32,
    )
    .to_image())
}

/// Padded face crop handed to the emotion classifier.
pub fn extract_face(frame: &RgbImage, bbox: &BoundingBox, padding: i32) -> VisionResult<RgbImage> {
    let region = bbox
        .padded_within(padding, frame.width(), frame.height())
        .ok_or_else(|| VisionError::invalid_geometry("face box outside frame"))?;
    crop_image(frame, &region)
}

/// Encode as JPEG.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> VisionResult<Vec<u8>> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality).encode(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgb8,
    )?;
    Ok(bytes)
}

/// Encode and write a JPEG.
pub fn save_jpeg(image: &RgbImage, path: &Path, quality: u8) -> VisionResult<()> {
    let bytes = encode_jpeg(image, quality)?;
    let mut file = std::fs::File::create(path)?;
    file.write_all(&bytes)?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(bbox: BoundingBox, w: u32, h: u32) -> CropRegion {
        capture_region(&bbox, w, h, &CropConfig::default()).unwrap()
    }

    #[test]
    fn test_centered_face_gets_ideal_square() {
        let r = region(BoundingBox::new(300, 200, 40, 40), 640, 480);
        assert_eq!(r, CropRegion::square(320, 220, 120));
        assert_eq!(r.width(), 120);
    }

    #[test]
    fn test_slight_edge_shrinks_around_center() {
        // Center (60, 240): max square around it is 120, ideal 135 (89%)
        let r = region(BoundingBox::new(38, 218, 45, 45), 640, 480);
        assert_eq!(r.x1, 0);
        assert_eq!(r.width(), 120);
        assert!(r.is_square());
    }

    #[test]
    fn test_corner_face_recenters() {
        // Center (20, 20): max around it is 40, far below the 120 ideal
        let r = region(BoundingBox::new(0, 0, 40, 40), 640, 480);
        assert_eq!(r, CropRegion::new(0, 0, 120, 120));
    }

    #[test]
    fn test_huge_face_falls_back_to_frame_center() {
        let r = region(BoundingBox::new(100, 50, 200, 200), 640, 480);
        assert_eq!(r.width(), 480);
        assert_eq!(r, CropRegion::new(80, 0, 560, 480));
    }

    #[test]
    fn test_square_invariant_over_grid() {
        let config = CropConfig::default();
        for (w, h) in [(640u32, 480u32), (333, 517), (50, 50), (1, 7)] {
            for x in (-30..w as i32 + 30).step_by(37) {
                for y in (-30..h as i32 + 30).step_by(41) {
                    for size in [1, 9, 40, 101, 400] {
                        let bbox = BoundingBox::new(x, y, size, size + 3);
                        if let Ok(r) = capture_region(&bbox, w, h, &config) {
                            assert!(r.is_square(), "{:?} for {:?} in {}x{}", r, bbox, w, h);
                            assert!(r.fits_within(w, h), "{:?} for {:?} in {}x{}", r, bbox, w, h);
                            assert!(!r.is_empty());
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_degenerate_box_rejected() {
        let err = capture_region(&BoundingBox::new(10, 10, 0, 20), 100, 100, &CropConfig::default()).unwrap_err();
        assert!(err.is_geometry());
    }

    #[test]
    fn test_extract_face_and_encode() {
        let frame = RgbImage::from_pixel(64, 48, image::Rgb([10, 20, 30]));
        let face = extract_face(&frame, &BoundingBox::new(5, 5, 20, 20), 10).unwrap();
        assert_eq!(face.dimensions(), (35, 35));

        let jpeg = encode_jpeg(&face, 90).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        assert!(extract_face(&frame, &BoundingBox::new(500, 500, 10, 10), 10).is_err());
    }
}
