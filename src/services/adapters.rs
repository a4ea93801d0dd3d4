//! Capability adapter seams for the detection and recognition models.
//!
//! Both adapters are constructed once per process and shared by every worker
//! through `Arc`, so implementations must tolerate concurrent calls.

use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Axis-aligned box in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Integer pixel rectangle `(x, y, width, height)` clipped to the image.
    /// `None` when nothing of the box lies inside.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let clip = |v: f32, max: u32| -> u32 {
            if v.is_nan() || v <= 0.0 {
                0
            } else {
                (v as u32).min(max)
            }
        };
        let (x1, x2) = (clip(self.x1, width), clip(self.x2, width));
        let (y1, y2) = (clip(self.y1, height), clip(self.y2, height));
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }
}

/// Single detection returned by the detector.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Everything one detector call produces for an image.
#[derive(Debug, Clone)]
pub struct DetectionOutput {
    pub detections: Vec<Detection>,
    pub visualization: DynamicImage,
}

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("detector request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("detector returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("detector unavailable: {0}")]
    Unavailable(String),
}

impl DetectionError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ModelUnavailable
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("recognizer request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("recognizer returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("recognized text {0:?} is not an account number")]
    NotNumeric(String),

    #[error("recognizer unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, image: &DynamicImage) -> Result<DetectionOutput, DetectionError>;
}

#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Read the text printed in one cropped region.
    async fn recognize(&self, region: &DynamicImage) -> Result<String, RecognitionError>;
}

const BOX_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);

/// Draw every detection box onto a copy of `image`.
pub fn annotate(image: &DynamicImage, detections: &[Detection]) -> DynamicImage {
    let mut canvas = image.to_rgba8();
    for detection in detections {
        if let Some((x, y, w, h)) = detection.bbox.clamp_to(canvas.width(), canvas.height()) {
            draw_rectangle(&mut canvas, x, y, x + w - 1, y + h - 1, BOX_COLOR);
        }
    }
    DynamicImage::ImageRgba8(canvas)
}

fn draw_rectangle(image: &mut RgbaImage, left: u32, top: u32, right: u32, bottom: u32, color: Rgba<u8>) {
    for x in left..=right {
        image.put_pixel(x, top, color);
        image.put_pixel(x, bottom, color);
    }
    for y in top..=bottom {
        image.put_pixel(left, y, color);
        image.put_pixel(right, y, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_is_clipped_to_the_image() {
        let bbox = BoundingBox::new(-5.0, 2.9, 150.0, 40.2);
        assert_eq!(bbox.clamp_to(100, 30), Some((0, 2, 100, 28)));
    }

    #[test]
    fn degenerate_boxes_have_no_area() {
        assert_eq!(BoundingBox::new(10.0, 10.0, 10.0, 20.0).clamp_to(50, 50), None);
        assert_eq!(BoundingBox::new(60.0, 0.0, 80.0, 10.0).clamp_to(50, 50), None);
        assert_eq!(BoundingBox::new(f32::NAN, 0.0, 5.0, 5.0).clamp_to(50, 50), Some((0, 0, 5, 5)));
    }

    #[test]
    fn annotate_outlines_boxes_and_leaves_the_rest() {
        let image = DynamicImage::new_rgb8(20, 20);
        let detections = vec![Detection {
            label: "payee".into(),
            confidence: 0.9,
            bbox: BoundingBox::new(2.0, 2.0, 10.0, 8.0),
        }];
        let annotated = annotate(&image, &detections).to_rgba8();
        assert_eq!(*annotated.get_pixel(2, 2), BOX_COLOR);
        assert_eq!(*annotated.get_pixel(9, 7), BOX_COLOR);
        assert_eq!(*annotated.get_pixel(5, 5), Rgba([0, 0, 0, 255]));
        assert_eq!(*annotated.get_pixel(15, 15), Rgba([0, 0, 0, 255]));
    }
}
