use crate::common::{AuthConfig, Result};
use crate::core::descriptor::{Descriptor, DescriptorExtractor};
use async_trait::async_trait;
use image::DynamicImage;
use std::time::Duration;
use thiserror::Error;

/// An exclusive camera-like device.
///
/// `release` must be safe to call more than once and after a failed `acquire`.
#[async_trait]
pub trait FrameSource: Send {
    async fn acquire(&mut self) -> Result<()>;
    async fn grab(&mut self) -> Result<DynamicImage>;
    fn release(&mut self);
}

/// Holds a [`FrameSource`] between acquire and release.
///
/// The device is released when the guard drops, including when the future
/// owning it is dropped mid-capture.
pub struct CameraGuard<'a, S: FrameSource + ?Sized> {
    source: &'a mut S,
}

impl<'a, S: FrameSource + ?Sized> CameraGuard<'a, S> {
    pub async fn acquire(source: &'a mut S) -> Result<CameraGuard<'a, S>> {
        if let Err(e) = source.acquire().await {
            source.release();
            return Err(e);
        }
        tracing::debug!("Camera acquired");
        Ok(Self { source })
    }

    pub async fn grab(&mut self) -> Result<DynamicImage> {
        self.source.grab().await
    }
}

impl<S: FrameSource + ?Sized> Drop for CameraGuard<'_, S> {
    fn drop(&mut self) {
        self.source.release();
        tracing::debug!("Camera released");
    }
}

/// Descriptors from one login attempt, one per captured frame.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveCaptureSet(Vec<Descriptor>);

impl LiveCaptureSet {
    /// `None` for an empty set.
    pub fn new(descriptors: Vec<Descriptor>) -> Option<Self> {
        if descriptors.is_empty() {
            None
        } else {
            Some(Self(descriptors))
        }
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No face detected in frame {frame}")]
    NoFaceDetected { frame: usize },

    #[error("Camera unavailable: {0}")]
    Device(String),

    #[error("Face extraction failed: {0}")]
    Extractor(String),
}

pub struct CaptureController<X> {
    extractor: X,
    frame_count: usize,
    interval: Duration,
}

impl<X: DescriptorExtractor> CaptureController<X> {
    pub fn new(extractor: X, frame_count: usize, interval: Duration) -> Self {
        Self {
            extractor,
            frame_count: frame_count.max(1),
            interval,
        }
    }

    pub fn from_config(extractor: X, auth: &AuthConfig) -> Self {
        Self::new(extractor, auth.capture_count, Duration::from_millis(auth.capture_interval_ms))
    }

    /// Grab `frame_count` frames and extract a descriptor from each.
    ///
    /// The first faceless frame aborts the whole capture; nothing captured so far is kept.
    pub async fn capture<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
    ) -> std::result::Result<LiveCaptureSet, CaptureError> {
        let mut camera = CameraGuard::acquire(source)
            .await
            .map_err(|e| CaptureError::Device(e.to_string()))?;

        let mut descriptors = Vec::with_capacity(self.frame_count);

        for i in 0..self.frame_count {
            let frame = camera
                .grab()
                .await
                .map_err(|e| CaptureError::Device(e.to_string()))?;

            match self.extractor.extract(&frame) {
                Ok(Some(descriptor)) => descriptors.push(descriptor),
                Ok(None) => {
                    tracing::info!("No face in frame {}/{}", i + 1, self.frame_count);
                    return Err(CaptureError::NoFaceDetected { frame: i + 1 });
                }
                Err(e) => return Err(CaptureError::Extractor(e.to_string())),
            }

            if i + 1 < self.frame_count && !self.interval.is_zero() {
                tokio::time::sleep(self.interval).await;
            }
        }

        drop(camera);

        LiveCaptureSet::new(descriptors)
            .ok_or(CaptureError::NoFaceDetected { frame: 1 })
    }
}
