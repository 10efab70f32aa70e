// Core modules
pub mod core;
pub mod camera;
pub mod storage;
pub mod common;
pub mod cli;

// Re-export commonly used types
pub use common::{Config, DevMode, FaceDashError, Result};
pub use crate::core::{
    CaptureController, Descriptor, DescriptorExtractor, FaceLogin, FrameSource, LiveCaptureSet,
    LoginOutcome, MatchEngine, MatchResult, OnnxExtractor, RejectReason, Session, SessionFile,
};
pub use crate::camera::Camera;
pub use storage::{ReferenceImageSource, SheetClient, UserRecord, UserStore};
