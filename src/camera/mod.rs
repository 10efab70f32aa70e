pub mod v4l2;

pub use v4l2::{Camera, CameraInfo, AUTO_DETECT_INDEX};
