use crate::common::config::CameraConfig;
use crate::common::{Config, FaceDashError, Result};
use crate::core::capture::FrameSource;
use async_trait::async_trait;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};
use image::{DynamicImage, ImageBuffer, ImageFormat, Luma};
use std::fs;
use std::time::Duration;

/// Special `device_index` asking for grayscale (IR) camera auto-detection.
pub const AUTO_DETECT_INDEX: u32 = 999;

#[derive(Debug, Clone)]
pub struct CameraInfo {
    pub index: u32,
    pub name: String,
    pub features: Vec<String>,
    pub grayscale: bool,
    pub likely_ir: bool,
}

/// V4L2 camera. The device is only open between `acquire` and `release`.
///
/// One mmap stream lives for the whole acquisition, so warm-up happens once
/// and every grab pulls the next buffer from the running stream.
pub struct Camera {
    config: CameraConfig,
    device: Option<Device>,
    stream: Option<Stream<'static>>,
    format: Option<v4l::Format>,
}

impl Camera {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.camera.clone(),
            device: None,
            stream: None,
            format: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    /// Every `/dev/video*` device that answers a capability query, sorted by index.
    pub fn list_all_cameras() -> Result<Vec<CameraInfo>> {
        let mut cameras = Vec::new();

        for entry in fs::read_dir("/dev")? {
            let path = entry?.path();
            let Some(index) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("video"))
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };

            let Ok(device) = Device::new(index as usize) else { continue };
            let Ok(caps) = device.query_caps() else { continue };

            let mut features = Vec::new();
            let mut grayscale = false;
            if caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                features.push("VIDEO_CAPTURE".to_string());
            } else if caps.capabilities.contains(v4l::capability::Flags::META_CAPTURE) {
                features.push("METADATA_CAPTURE (may work for IR)".to_string());
            }

            for fmt in device.enum_formats().unwrap_or_default() {
                match &fmt.fourcc.repr {
                    b"GREY" | b"Y8  " | b"Y16 " => {
                        features.push(format!("Grayscale ({})", fmt.fourcc));
                        grayscale = true;
                    }
                    b"MJPG" | b"YUYV" => features.push(format!("Color ({})", fmt.fourcc)),
                    _ => {}
                }
            }

            let likely_ir = grayscale
                || caps.card.contains("BRIO")
                || caps.card.contains("IR")
                || caps.card.contains("Infrared");

            cameras.push(CameraInfo { index, name: caps.card.clone(), features, grayscale, likely_ir });
        }

        cameras.sort_by_key(|c| c.index);
        Ok(cameras)
    }

    /// Prefer a grayscale capture device, then anything that looks like IR, else device 0.
    pub fn detect_ir_camera() -> Result<u32> {
        let cameras = Self::list_all_cameras()?;
        let capture_capable = |c: &&CameraInfo| c.features.iter().any(|f| f == "VIDEO_CAPTURE");

        let selected = cameras
            .iter()
            .filter(capture_capable)
            .find(|c| c.grayscale)
            .or_else(|| cameras.iter().filter(capture_capable).find(|c| c.likely_ir));

        match selected {
            Some(camera) => {
                tracing::info!("Selected camera: /dev/video{} ({})", camera.index, camera.name);
                Ok(camera.index)
            }
            None => {
                tracing::warn!("No IR camera detected, falling back to default camera (device 0)");
                Ok(0)
            }
        }
    }

    fn open(&mut self) -> Result<()> {
        let index = if self.config.device_index == AUTO_DETECT_INDEX {
            Self::detect_ir_camera()?
        } else {
            self.config.device_index
        };

        let device = Device::new(index as usize)
            .map_err(|e| FaceDashError::Camera(format!("Failed to open camera {}: {}", index, e)))?;

        let caps = device.query_caps()
            .map_err(|e| FaceDashError::Camera(format!("Failed to query capabilities: {}", e)))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            // Some IR devices report only metadata capture but still stream frames
            tracing::warn!("Device {} may not support standard video capture: {:?}", index, caps.capabilities);
        }

        let mut fmt = device.format()
            .map_err(|e| FaceDashError::Camera(format!("Failed to get format: {}", e)))?;
        fmt.width = self.config.width;
        fmt.height = self.config.height;
        if &fmt.fourcc.repr != b"GREY" {
            fmt.fourcc = FourCC::new(b"MJPG");
        }

        if let Err(e) = device.set_format(&fmt) {
            tracing::warn!("Could not set exact format: {}. Using device defaults.", e);
        }

        let actual = device.format()
            .map_err(|e| FaceDashError::Camera(format!("Failed to get final format: {}", e)))?;
        if actual.width != self.config.width || actual.height != self.config.height {
            tracing::warn!(
                "Camera resolution {}x{} differs from requested {}x{}",
                actual.width, actual.height, self.config.width, self.config.height
            );
        }
        tracing::info!("Opened /dev/video{} at {}x{} {}", index, actual.width, actual.height, actual.fourcc);

        self.device = Some(device);
        self.format = Some(actual);
        Ok(())
    }

    /// Start streaming and discard the warm-up frames the IR emitter needs.
    fn start_stream(&mut self) -> Result<()> {
        let Some(device) = self.device.as_ref() else {
            return Err(FaceDashError::Camera("Camera is not open".into()));
        };

        let mut stream = Stream::with_buffers(device, Type::VideoCapture, 4)
            .map_err(|e| FaceDashError::Camera(format!("Failed to create stream: {}", e)))?;

        for i in 0..self.config.warmup_frames {
            stream.next()
                .map_err(|e| FaceDashError::Camera(format!("Failed to capture warmup frame {}: {}", i, e)))?;
            std::thread::sleep(Duration::from_millis(self.config.warmup_delay_ms));
        }
        tracing::debug!("Camera stream ready after {} warmup frames", self.config.warmup_frames);

        self.stream = Some(stream);
        Ok(())
    }

    fn grab_blocking(&mut self) -> Result<DynamicImage> {
        let (Some(stream), Some(format)) = (self.stream.as_mut(), self.format.as_ref()) else {
            return Err(FaceDashError::Camera("Camera is not acquired".into()));
        };

        let (buf, _meta) = stream.next()
            .map_err(|e| FaceDashError::Camera(format!("Failed to capture: {}", e)))?;
        decode_frame(buf, format)
    }

    fn open_streaming(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        if self.device.is_none() {
            self.open()?;
        }
        self.start_stream()
    }

    /// Acquire, grab one frame, release.
    pub fn capture_frame(&mut self) -> Result<DynamicImage> {
        let frame = self.open_streaming().and_then(|_| self.grab_blocking());
        self.close();
        frame
    }

    fn close(&mut self) {
        // Stream first: it turns streaming off on the still-open device
        self.stream = None;
        self.device = None;
        self.format = None;
    }
}

fn decode_frame(data: &[u8], format: &v4l::Format) -> Result<DynamicImage> {
    let (width, height) = (format.width, format.height);
    let pixels = (width * height) as usize;

    match &format.fourcc.repr {
        b"GREY" => {
            let luma = data.get(..pixels)
                .ok_or_else(|| FaceDashError::Camera("Short GREY frame".into()))?;
            let img = ImageBuffer::<Luma<u8>, _>::from_raw(width, height, luma.to_vec())
                .ok_or_else(|| FaceDashError::Camera("Failed to create grayscale image buffer".into()))?;
            Ok(DynamicImage::ImageLuma8(img))
        }
        b"YUYV" => {
            // Y0 U Y1 V: keep the luma samples only
            let luma: Vec<u8> = data.iter().step_by(2).take(pixels).copied().collect();
            let img = ImageBuffer::<Luma<u8>, _>::from_raw(width, height, luma)
                .ok_or_else(|| FaceDashError::Camera("Short YUYV frame".into()))?;
            Ok(DynamicImage::ImageLuma8(img))
        }
        b"MJPG" => Ok(image::load_from_memory_with_format(data, ImageFormat::Jpeg)?),
        _ => Err(FaceDashError::Camera(format!("Unsupported format {}", format.fourcc))),
    }
}

// V4L2 calls block; the login flow runs one attempt at a time so they run inline.
#[async_trait]
impl FrameSource for Camera {
    async fn acquire(&mut self) -> Result<()> {
        self.open_streaming()
    }

    async fn grab(&mut self) -> Result<DynamicImage> {
        self.grab_blocking()
    }

    fn release(&mut self) {
        if self.device.is_some() {
            tracing::debug!("Closing camera device");
        }
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
[camera]
device_index = 0
width = 640
height = 480
warmup_frames = 3

[models]
detector_path = "face_detector.onnx"
recognizer_path = "face_recognizer.onnx"

[detector]
input_width = 640
input_height = 640
detection_confidence = 0.5

[recognizer]
input_size = 112
normalization_value = 127.5

[sheet]
base_url = "https://sheetdb.io/api/v1/example"

[faces]
source = "local"
dir = "faces"
"#;

    #[tokio::test]
    async fn test_grab_needs_an_acquired_stream() {
        let mut camera = Camera::new(&Config::from_toml(CONFIG).unwrap());

        assert!(matches!(camera.grab().await, Err(FaceDashError::Camera(_))));

        camera.release();
        camera.release();
        assert!(!camera.is_open());
        assert!(!camera.is_streaming());
    }

    fn format(fourcc: &[u8; 4], width: u32, height: u32) -> v4l::Format {
        v4l::Format::new(width, height, FourCC::new(fourcc))
    }

    #[test]
    fn test_decode_grey() {
        let img = decode_frame(&[10, 20, 30, 40, 99], &format(b"GREY", 2, 2)).unwrap();
        assert_eq!(img.to_luma8().into_raw(), vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_decode_yuyv_keeps_luma() {
        let img = decode_frame(&[10, 128, 20, 128, 30, 128, 40, 128], &format(b"YUYV", 2, 2)).unwrap();
        assert_eq!(img.to_luma8().into_raw(), vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_decode_rejects_short_and_unknown_frames() {
        assert!(decode_frame(&[1, 2], &format(b"GREY", 2, 2)).is_err());
        assert!(decode_frame(&[0; 16], &format(b"RGB3", 2, 2)).is_err());
    }
}
