use crate::common::{Config, FaceDashError, Result};
use crate::core::session_builder;
use ort::{Environment, Session, Value};
use std::path::Path;
use std::sync::Arc;
use image::{DynamicImage, imageops::FilterType};
use ndarray::{Array4, CowArray};

#[derive(Debug, Clone)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// YOLO-style single-class face detector.
pub struct FaceDetector {
    session: Session,
    _environment: Arc<Environment>,
    input_width: u32,
    input_height: u32,
    confidence: f32,
    nms_iou: f32,
}

impl FaceDetector {
    pub fn new(config: &Config, models_base: &Path) -> Result<Self> {
        let mut model_path = config.models.detector_path.clone();
        if model_path.is_relative() {
            model_path = models_base.join(&model_path);
        }

        let environment = Arc::new(
            Environment::builder()
                .with_name("face_detector")
                .build()
                .map_err(|e| FaceDashError::Model(format!("Failed to create environment: {}", e)))?
        );

        if !model_path.exists() {
            return Err(FaceDashError::Model(
                format!("Detector model not found at: {:?}", model_path)
            ));
        }

        let session = session_builder(&environment, config.performance.optimization_level)?
            .with_model_from_file(model_path)?;

        Ok(Self {
            session,
            _environment: environment,
            input_width: config.detector.input_width,
            input_height: config.detector.input_height,
            confidence: config.detector.detection_confidence,
            nms_iou: config.detector.nms_iou_threshold,
        })
    }

    /// Faces above the confidence threshold, best first, in original image coordinates.
    pub fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        let (_, filtered) = self.detect_all(image)?;
        Ok(filtered)
    }

    /// Every raw candidate box plus the thresholded, de-duplicated set.
    pub fn detect_all(&self, image: &DynamicImage) -> Result<(Vec<FaceBox>, Vec<FaceBox>)> {
        let orig_width = image.width() as f32;
        let orig_height = image.height() as f32;

        let img_array = if image.width() == self.input_width && image.height() == self.input_height {
            self.image_to_array(image)
        } else {
            let resized = image.resize_exact(self.input_width, self.input_height, FilterType::Nearest);
            self.image_to_array(&resized)
        };

        let cow_array = CowArray::from(img_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let mut all_faces = self.parse_detections(&outputs)?;

        let scale_x = orig_width / self.input_width as f32;
        let scale_y = orig_height / self.input_height as f32;
        for face in &mut all_faces {
            face.x1 *= scale_x;
            face.x2 *= scale_x;
            face.y1 *= scale_y;
            face.y2 *= scale_y;
        }

        // NMS before thresholding so duplicates of a strong box are removed first
        let mut filtered = apply_nms(all_faces.clone(), self.nms_iou);
        filtered.retain(|face| face.confidence >= self.confidence);
        filtered.truncate(5);

        all_faces.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        all_faces.truncate(20);

        Ok((all_faces, filtered))
    }

    fn image_to_array(&self, img: &DynamicImage) -> Array4<f32> {
        // Grayscale replicated across three channels; works for both IR and colour sensors
        let gray = img.to_luma8();
        let width = img.width() as usize;
        let height = img.height() as usize;
        let mut array = Array4::<f32>::zeros((1, 3, height, width));

        let norm_factor = 1.0 / 255.0;
        for (x, y, pixel) in gray.enumerate_pixels() {
            let value = pixel[0] as f32 * norm_factor;
            let (x, y) = (x as usize, y as usize);
            array[[0, 0, y, x]] = value;
            array[[0, 1, y, x]] = value;
            array[[0, 2, y, x]] = value;
        }

        array
    }

    fn parse_detections(&self, outputs: &[Value]) -> Result<Vec<FaceBox>> {
        let mut faces = Vec::new();

        let Some(first) = outputs.first() else {
            return Ok(faces);
        };
        let output = first.try_extract::<f32>()?.view().to_owned();
        let shape = output.shape().to_vec();
        let values: Vec<f32> = output.iter().copied().collect();

        // [1, N, 5] or transposed [1, 5, N]; each prediction is cx, cy, w, h, score
        let (num_predictions, prediction_length, is_transposed) = if shape.len() >= 3 {
            if shape[2] > shape[1] && shape[1] <= 10 {
                (shape[2], shape[1], true)
            } else {
                (shape[1], shape[2], false)
            }
        } else if shape.len() == 2 {
            (shape[0], shape[1], false)
        } else {
            tracing::warn!("Unexpected detector output shape: {:?}", shape);
            return Ok(faces);
        };

        if prediction_length < 5 {
            tracing::warn!("Detector output has no confidence column: {:?}", shape);
            return Ok(faces);
        }

        let at = |i: usize, field: usize| -> f32 {
            if is_transposed {
                values[field * num_predictions + i]
            } else {
                values[i * prediction_length + field]
            }
        };

        for i in 0..num_predictions {
            let confidence = at(i, 4);
            if confidence <= 0.001 {
                continue;
            }

            let (cx, cy, w, h) = (at(i, 0), at(i, 1), at(i, 2), at(i, 3));
            let scale = if cx > 1.0 || cy > 1.0 || w > 1.0 || h > 1.0 {
                1.0
            } else {
                self.input_width as f32
            };

            let (cx, cy, w, h) = (cx * scale, cy * scale, w * scale, h * scale);
            let x1 = (cx - w / 2.0).max(0.0);
            let y1 = (cy - h / 2.0).max(0.0);
            let x2 = (cx + w / 2.0).min(self.input_width as f32);
            let y2 = (cy + h / 2.0).min(self.input_height as f32);

            if x2 - x1 > 10.0 && y2 - y1 > 10.0 {
                faces.push(FaceBox { x1, y1, x2, y2, confidence });
            }
        }

        Ok(faces)
    }
}

pub fn apply_nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|kept| calculate_iou(kept, &candidate) < iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

pub fn calculate_iou(box1: &FaceBox, box2: &FaceBox) -> f32 {
    let x1 = box1.x1.max(box2.x1);
    let y1 = box1.y1.max(box2.y1);
    let x2 = box1.x2.min(box2.x2);
    let y2 = box1.y2.min(box2.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = box1.width() * box1.height() + box2.width() * box2.height() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
