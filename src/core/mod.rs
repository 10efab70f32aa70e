pub mod capture;
pub mod descriptor;
pub mod detector;
pub mod login;
pub mod matcher;
pub mod password;
pub mod recognizer;
pub mod session;

pub use capture::{CameraGuard, CaptureController, CaptureError, FrameSource, LiveCaptureSet};
pub use descriptor::{aggregate_distance, euclidean_distance, Descriptor, DescriptorExtractor};
pub use detector::{FaceBox, FaceDetector};
pub use login::{decide, establish_session, password_login, Decision, FaceLogin, LoginOutcome, LoginState, PasswordLoginError, RejectReason};
pub use matcher::{MatchEngine, MatchResult};
pub use recognizer::{FaceRecognizer, OnnxExtractor};
pub use session::{LoginMethod, Session, SessionFile};

use crate::common::Result;
use ort::{Environment, GraphOptimizationLevel, SessionBuilder};
use std::sync::Arc;

pub(crate) fn session_builder(environment: &Arc<Environment>, optimization_level: u32) -> Result<SessionBuilder> {
    let opt_level = match optimization_level {
        0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    };
    Ok(SessionBuilder::new(environment)?.with_optimization_level(opt_level)?)
}
