pub mod annotate;
pub mod prompt;

pub use annotate::annotate_detections;
pub use prompt::read_hidden;
