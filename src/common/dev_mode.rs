use std::path::{Path, PathBuf};
use std::fs;
use directories::ProjectDirs;
use crate::common::error::{FaceDashError, Result};
use crate::common::paths;

/// Where this process keeps captures, debug images and the session record.
///
/// In dev mode everything lives under `./dev_data`; otherwise under the
/// platform data directory.
#[derive(Debug, Clone)]
pub struct DevMode {
    enabled: bool,
    base_dir: PathBuf,
}

impl DevMode {
    pub fn new(enabled: bool) -> Result<Self> {
        let base_dir = if enabled {
            PathBuf::from("./dev_data")
        } else {
            ProjectDirs::from("com", "facedash", "FaceDash")
                .ok_or_else(|| FaceDashError::Config("Failed to get project dirs".into()))?
                .data_dir()
                .to_path_buf()
        };

        Self::with_base_dir(enabled, base_dir)
    }

    pub fn with_base_dir(enabled: bool, base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir)?;
        fs::create_dir_all(base_dir.join("captures"))?;
        fs::create_dir_all(base_dir.join("debug"))?;

        if enabled {
            println!("📁 Development mode enabled - data will be saved to: {}",
                     base_dir.display());
        }

        Ok(Self { enabled, base_dir })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn captures_dir(&self) -> PathBuf {
        self.base_dir.join("captures")
    }

    pub fn debug_dir(&self) -> PathBuf {
        self.base_dir.join("debug")
    }

    pub fn session_file(&self) -> PathBuf {
        self.base_dir.join("session.json")
    }

    pub fn config_file(&self) -> PathBuf {
        if self.enabled {
            paths::dev_config_file()
        } else {
            paths::system_config_file()
        }
    }

    pub fn models_dir(&self) -> PathBuf {
        if self.enabled {
            paths::dev_models_dir()
        } else {
            paths::system_models_dir()
        }
    }

    pub fn get_capture_path(&self, prefix: &str) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        self.captures_dir().join(format!("{}_{}.jpg", prefix, timestamp))
    }

    pub fn get_debug_path(&self, prefix: &str) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        self.debug_dir().join(format!("{}_{}.jpg", prefix, timestamp))
    }
}
