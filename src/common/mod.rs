pub mod config;
pub mod dev_mode;
pub mod error;
pub mod paths;

pub use config::{Config, AuthConfig, FaceSourceConfig};
pub use dev_mode::DevMode;
pub use error::{FaceDashError, Result};
pub use paths::{system_config_file, system_models_dir};
