//! Frame annotation: per-face boxes in the emotion colour and the capture
//! highlight. Text is left to the UI.

use emocap_models::{CropRegion, FaceReport};
use image::{Rgb, RgbImage};

const FACE_THICKNESS: u32 = 2;
const HIGHLIGHT_THICKNESS: u32 = 4;
const HIGHLIGHT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Draw every face box and, if present, the capture highlight.
pub fn annotate(frame: &mut RgbImage, faces: &[FaceReport], highlight: Option<&CropRegion>) {
    for face in faces {
        let region = CropRegion::new(face.bbox.x, face.bbox.y, face.bbox.x2(), face.bbox.y2());
        draw_rect(frame, &region, Rgb(face.label.color()), FACE_THICKNESS);
    }
    if let Some(region) = highlight {
        draw_rect(frame, region, HIGHLIGHT_COLOR, HIGHLIGHT_THICKNESS);
    }
}

/// Hollow rectangle, clipped to the frame.
pub fn draw_rect(frame: &mut RgbImage, region: &CropRegion, color: Rgb<u8>, thickness: u32) {
    let (w, h) = (frame.width() as i64, frame.height() as i64);
    let (x1, y1, x2, y2) = (region.x1 as i64, region.y1 as i64, region.x2 as i64, region.y2 as i64);
    if x2 <= x1 || y2 <= y1 {
        return;
    }
    let t = thickness.max(1) as i64;

    for y in y1.max(0)..y2.min(h) {
        for x in x1.max(0)..x2.min(w) {
            let on_border = x < x1 + t || x >= x2 - t || y < y1 + t || y >= y2 - t;
            if on_border {
                frame.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emocap_models::{BoundingBox, EmotionLabel, IdentityId};

    #[test]
    fn test_draw_rect_border_only() {
        let mut frame = RgbImage::new(20, 20);
        draw_rect(&mut frame, &CropRegion::new(2, 2, 12, 12), Rgb([9, 9, 9]), 1);
        assert_eq!(frame.get_pixel(2, 2), &Rgb([9, 9, 9]));
        assert_eq!(frame.get_pixel(11, 5), &Rgb([9, 9, 9]));
        assert_eq!(frame.get_pixel(6, 6), &Rgb([0, 0, 0]));
        assert_eq!(frame.get_pixel(12, 12), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_rect_clips() {
        let mut frame = RgbImage::new(10, 10);
        draw_rect(&mut frame, &CropRegion::new(-5, -5, 50, 50), Rgb([1, 1, 1]), 2);
        draw_rect(&mut frame, &CropRegion::new(5, 5, 5, 9), Rgb([1, 1, 1]), 2);
        assert_eq!(frame.get_pixel(4, 4), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_annotate_uses_label_colour() {
        let mut frame = RgbImage::new(40, 40);
        let mut face = FaceReport::pending(IdentityId(0), BoundingBox::new(5, 5, 10, 10));
        face.label = EmotionLabel::Sad;
        annotate(&mut frame, &[face], Some(&CropRegion::new(20, 20, 40, 40)));

        assert_eq!(frame.get_pixel(5, 5).0, EmotionLabel::Sad.color());
        assert_eq!(frame.get_pixel(39, 39), &HIGHLIGHT_COLOR);
    }
}
