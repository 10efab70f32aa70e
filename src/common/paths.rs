use std::path::PathBuf;

// System locations used outside dev mode. Dev mode keeps everything under ./dev_data.

pub fn system_config_file() -> PathBuf {
    PathBuf::from("/etc/facedash/facedash.toml")
}

pub fn system_models_dir() -> PathBuf {
    PathBuf::from("/usr/share/facedash/models")
}

pub fn dev_config_file() -> PathBuf {
    PathBuf::from("configs/facedash.toml")
}

pub fn dev_models_dir() -> PathBuf {
    PathBuf::from("models")
}
