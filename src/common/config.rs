use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::common::error::{FaceDashError, Result};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub camera: CameraConfig,
    pub models: ModelConfig,
    pub detector: DetectorConfig,
    pub recognizer: RecognizerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub sheet: SheetConfig,
    pub faces: FaceSourceConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CameraConfig {
    /// 999 means auto-detect a grayscale (IR) camera.
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    pub warmup_frames: u32,
    #[serde(default = "default_warmup_delay")]
    pub warmup_delay_ms: u64,
}

fn default_warmup_delay() -> u64 {
    50
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    pub detector_path: PathBuf,
    pub recognizer_path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    pub input_width: u32,
    pub input_height: u32,
    pub detection_confidence: f32,
    #[serde(default = "default_nms_iou")]
    pub nms_iou_threshold: f32,
}

fn default_nms_iou() -> f32 { 0.45 }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecognizerConfig {
    pub input_size: u32,
    pub normalization_value: f32,
    #[serde(default = "default_true")]
    pub normalize_descriptors: bool,
}

fn default_true() -> bool { true }

/// Face-login knobs: frame count, inter-frame delay and acceptance threshold.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_capture_count")]
    pub capture_count: usize,
    #[serde(default = "default_capture_interval")]
    pub capture_interval_ms: u64,
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f32,
}

fn default_capture_count() -> usize { 3 }
fn default_capture_interval() -> u64 { 300 }
fn default_distance_threshold() -> f32 { 0.5 }

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            capture_count: default_capture_count(),
            capture_interval_ms: default_capture_interval(),
            distance_threshold: default_distance_threshold(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SheetConfig {
    pub base_url: String,
    #[serde(default = "default_users_sheet")]
    pub users_sheet: String,
    /// Leading data rows that hold column descriptions rather than users.
    #[serde(default = "default_header_rows")]
    pub header_rows: usize,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_users_sheet() -> String { "Users".to_string() }
fn default_header_rows() -> usize { 1 }
fn default_timeout() -> u64 { 10 }

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum FaceSourceConfig {
    Local {
        dir: PathBuf,
    },
    Github {
        owner: String,
        repo: String,
        #[serde(default = "default_faces_folder")]
        folder: String,
        #[serde(default = "default_branch")]
        branch: String,
        #[serde(default = "default_token_env")]
        token_env: String,
        #[serde(default = "default_github_api")]
        api_base: String,
    },
}

fn default_faces_folder() -> String { "faces".to_string() }
fn default_branch() -> String { "main".to_string() }
fn default_token_env() -> String { "GITHUB_TOKEN".to_string() }
fn default_github_api() -> String { "https://api.github.com".to_string() }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PerformanceConfig {
    #[serde(default = "default_optimization_level")]
    pub optimization_level: u32,
}

fn default_optimization_level() -> u32 { 3 }

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { optimization_level: default_optimization_level() }
    }
}

impl Config {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FaceDashError::Config(format!(
                "Config file not found: {}. Please create it from configs/facedash.toml.", path.display()
            )));
        }

        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| FaceDashError::Config(format!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.width > 4096 {
            return Err(FaceDashError::Config(format!(
                "Camera width must be between 1 and 4096, got {}", self.camera.width
            )));
        }
        if self.camera.height == 0 || self.camera.height > 4096 {
            return Err(FaceDashError::Config(format!(
                "Camera height must be between 1 and 4096, got {}", self.camera.height
            )));
        }

        if self.detector.detection_confidence < 0.0 || self.detector.detection_confidence > 1.0 {
            return Err(FaceDashError::Config(format!(
                "Detection confidence must be between 0.0 and 1.0, got {}",
                self.detector.detection_confidence
            )));
        }
        if self.detector.input_width == 0 || self.detector.input_width > 4096
            || self.detector.input_height == 0 || self.detector.input_height > 4096
        {
            return Err(FaceDashError::Config(format!(
                "Detector input must be between 1x1 and 4096x4096, got {}x{}",
                self.detector.input_width, self.detector.input_height
            )));
        }
        if self.recognizer.input_size == 0 || self.recognizer.input_size > 1024 {
            return Err(FaceDashError::Config(format!(
                "Recognizer input size must be between 1 and 1024, got {}",
                self.recognizer.input_size
            )));
        }
        if self.recognizer.normalization_value <= 0.0 {
            return Err(FaceDashError::Config(format!(
                "Recognizer normalization value must be positive, got {}",
                self.recognizer.normalization_value
            )));
        }

        if self.auth.capture_count == 0 || self.auth.capture_count > 10 {
            return Err(FaceDashError::Config(format!(
                "Capture count must be between 1 and 10, got {}", self.auth.capture_count
            )));
        }
        if self.auth.capture_interval_ms > 5000 {
            return Err(FaceDashError::Config(format!(
                "Capture interval must be at most 5000ms, got {}", self.auth.capture_interval_ms
            )));
        }
        if !self.auth.distance_threshold.is_finite() || self.auth.distance_threshold <= 0.0 {
            return Err(FaceDashError::Config(format!(
                "Distance threshold must be a positive number, got {}",
                self.auth.distance_threshold
            )));
        }

        if !self.sheet.base_url.starts_with("http://") && !self.sheet.base_url.starts_with("https://") {
            return Err(FaceDashError::Config(format!(
                "Sheet base_url must be an http(s) URL, got {:?}", self.sheet.base_url
            )));
        }
        if self.sheet.timeout_seconds < 1 || self.sheet.timeout_seconds > 120 {
            return Err(FaceDashError::Config(format!(
                "Sheet timeout must be between 1 and 120 seconds, got {}",
                self.sheet.timeout_seconds
            )));
        }

        if let FaceSourceConfig::Github { owner, repo, .. } = &self.faces {
            if owner.is_empty() || repo.is_empty() {
                return Err(FaceDashError::Config(
                    "GitHub face source needs both owner and repo".to_string()
                ));
            }
        }

        Ok(())
    }
}
