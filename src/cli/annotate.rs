use crate::core::FaceBox;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

const HIGH_CONF: Rgb<u8> = Rgb([0, 255, 0]);
const MED_CONF: Rgb<u8> = Rgb([255, 255, 0]);
const LOW_CONF: Rgb<u8> = Rgb([255, 0, 0]);
const ACCEPTED: Rgb<u8> = Rgb([0, 255, 255]);

/// Draw raw detections colored by confidence, and the faces that passed filtering in cyan.
pub fn annotate_detections(image: &DynamicImage, all_faces: &[FaceBox], accepted: &[FaceBox]) -> DynamicImage {
    let mut img = image.to_rgb8();

    for face in all_faces {
        let color = if face.confidence > 0.7 {
            HIGH_CONF
        } else if face.confidence > 0.5 {
            MED_CONF
        } else {
            LOW_CONF
        };
        draw_box(&mut img, face, 0.0, color);
    }

    for face in accepted {
        draw_box(&mut img, face, 2.0, ACCEPTED);
    }

    DynamicImage::ImageRgb8(img)
}

fn draw_box(img: &mut RgbImage, face: &FaceBox, pad: f32, color: Rgb<u8>) {
    if face.width() <= 0.0 || face.height() <= 0.0 {
        return;
    }

    let x1 = (face.x1 - pad).max(0.0) as i32;
    let y1 = (face.y1 - pad).max(0.0) as i32;
    let x2 = (face.x2 + pad).min(img.width() as f32) as i32;
    let y2 = (face.y2 + pad).min(img.height() as f32) as i32;
    if x2 <= x1 || y2 <= y1 {
        return;
    }

    draw_hollow_rect_mut(img, Rect::at(x1, y1).of_size((x2 - x1) as u32, (y2 - y1) as u32), color);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    #[test]
    fn test_accepted_face_outlined_in_cyan() {
        let blank = DynamicImage::ImageLuma8(ImageBuffer::from_pixel(40, 40, Luma([0u8])));
        let face = FaceBox { x1: 10.0, y1: 10.0, x2: 30.0, y2: 30.0, confidence: 0.9 };

        let annotated = annotate_detections(&blank, &[face.clone()], &[face]).to_rgb8();

        assert_eq!(*annotated.get_pixel(10, 10), HIGH_CONF);
        assert_eq!(*annotated.get_pixel(8, 8), ACCEPTED);
        assert_eq!(*annotated.get_pixel(20, 20), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_degenerate_boxes_are_ignored() {
        let blank = DynamicImage::ImageLuma8(ImageBuffer::from_pixel(10, 10, Luma([0u8])));
        let face = FaceBox { x1: 5.0, y1: 5.0, x2: 5.0, y2: 9.0, confidence: 0.9 };
        let annotated = annotate_detections(&blank, &[face], &[]).to_rgb8();
        assert!(annotated.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }
}
