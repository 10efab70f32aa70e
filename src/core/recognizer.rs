use crate::common::{Config, FaceDashError, Result};
use crate::core::descriptor::{l2_normalize, Descriptor, DescriptorExtractor};
use crate::core::detector::{FaceBox, FaceDetector};
use crate::core::session_builder;
use ort::{Environment, Session, Value};
use std::path::Path;
use std::sync::Arc;
use image::{DynamicImage, imageops::FilterType};
use ndarray::{Array4, CowArray};

/// Embedding model run on a single detected face crop.
pub struct FaceRecognizer {
    session: Session,
    _environment: Arc<Environment>,
    input_size: u32,
    normalization_value: f32,
}

impl FaceRecognizer {
    pub fn new(config: &Config, models_base: &Path) -> Result<Self> {
        let mut model_path = config.models.recognizer_path.clone();
        if model_path.is_relative() {
            model_path = models_base.join(&model_path);
        }

        let environment = Arc::new(
            Environment::builder()
                .with_name("face_recognizer")
                .build()
                .map_err(|e| FaceDashError::Model(format!("Failed to create environment: {}", e)))?
        );

        if !model_path.exists() {
            return Err(FaceDashError::Model(
                format!("Recognition model not found at: {:?}", model_path)
            ));
        }

        let session = session_builder(&environment, config.performance.optimization_level)?
            .with_model_from_file(model_path)?;

        Ok(Self {
            session,
            _environment: environment,
            input_size: config.recognizer.input_size,
            normalization_value: config.recognizer.normalization_value,
        })
    }

    pub fn get_embedding(&self, image: &DynamicImage, face: &FaceBox) -> Result<Descriptor> {
        let face_img = crop_face(image, face);
        let resized = face_img.resize_exact(self.input_size, self.input_size, FilterType::Triangle);

        let input_array = self.preprocess_face(&resized);
        let cow_array = CowArray::from(input_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;

        let outputs = self.session.run(vec![input_tensor])?;
        let output = outputs
            .first()
            .ok_or_else(|| FaceDashError::Model("Recognizer produced no output".into()))?;

        let embedding: Descriptor = output.try_extract::<f32>()?.view().iter().copied().collect();
        Ok(embedding)
    }

    fn preprocess_face(&self, img: &DynamicImage) -> Array4<f32> {
        // Single-channel input, ArcFace-style (p - n) / n scaling
        let gray = img.to_luma8();
        let size = self.input_size as usize;
        let norm_val = self.normalization_value;
        let mut array = Array4::<f32>::zeros((1, 1, size, size));

        for (x, y, pixel) in gray.enumerate_pixels() {
            array[[0, 0, y as usize, x as usize]] = (pixel[0] as f32 - norm_val) / norm_val;
        }

        array
    }
}

fn crop_face(image: &DynamicImage, face: &FaceBox) -> DynamicImage {
    let x = face.x1.max(0.0) as u32;
    let y = face.y1.max(0.0) as u32;
    let width = face.width().max(1.0) as u32;
    let height = face.height().max(1.0) as u32;

    image.crop_imm(x, y, width, height)
}

/// Detector + recognizer pair used as the production [`DescriptorExtractor`].
///
/// The most confident face in the image is embedded; other faces are ignored.
pub struct OnnxExtractor {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    normalize: bool,
}

impl OnnxExtractor {
    pub fn new(config: &Config, models_base: &Path) -> Result<Self> {
        Ok(Self {
            detector: FaceDetector::new(config, models_base)?,
            recognizer: FaceRecognizer::new(config, models_base)?,
            normalize: config.recognizer.normalize_descriptors,
        })
    }

    pub fn detector(&self) -> &FaceDetector {
        &self.detector
    }
}

impl DescriptorExtractor for OnnxExtractor {
    fn extract(&self, image: &DynamicImage) -> Result<Option<Descriptor>> {
        let faces = self.detector.detect(image)?;
        let Some(face) = faces.first() else {
            return Ok(None);
        };

        tracing::debug!("Embedding face with confidence {:.3}", face.confidence);
        let embedding = self.recognizer.get_embedding(image, face)?;

        if self.normalize {
            Ok(Some(l2_normalize(embedding)))
        } else {
            Ok(Some(embedding))
        }
    }
}
