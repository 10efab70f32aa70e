use crate::common::AuthConfig;
use crate::core::capture::{CaptureController, CaptureError, FrameSource};
use crate::core::descriptor::DescriptorExtractor;
use crate::core::matcher::{MatchEngine, MatchResult};
use crate::core::password::{is_bcrypt_hash, verify_password};
use crate::core::session::{LoginMethod, Session};
use crate::storage::{ReferenceImageSource, UserPatch, UserRecord, UserStore};
use chrono::Utc;
use std::future::Future;
use thiserror::Error;
use tracing::{info, warn};

/// Where a face login attempt currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Idle,
    Capturing,
    Matching,
    SessionEstablished,
}

/// Why a face login attempt ended without a session. Each reason has its own message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RejectReason {
    #[error("No face detected in frame {frame}. Make sure lighting is good and move slightly.")]
    NoFaceDetected { frame: usize },

    #[error("Cannot access camera: {0}")]
    CameraUnavailable(String),

    #[error("Face detection failed: {0}")]
    ExtractorFailed(String),

    #[error("Could not load users: {0}")]
    StoreUnavailable(String),

    #[error("No enrolled user has a usable reference photo.")]
    NoCandidates,

    #[error("No matching face found (best distance {best_distance:.3}, threshold {threshold:.3}).")]
    NoAcceptableMatch { best_distance: f32, threshold: f32 },

    #[error("Face login cancelled.")]
    Cancelled,
}

impl From<CaptureError> for RejectReason {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::NoFaceDetected { frame } => RejectReason::NoFaceDetected { frame },
            CaptureError::Device(msg) => RejectReason::CameraUnavailable(msg),
            CaptureError::Extractor(msg) => RejectReason::ExtractorFailed(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Accept(MatchResult),
    Reject(RejectReason),
}

/// Accept iff there is a match and its distance is at most `threshold`.
pub fn decide(result: Option<MatchResult>, threshold: f32) -> Decision {
    match result {
        None => Decision::Reject(RejectReason::NoCandidates),
        Some(m) if m.distance <= threshold => Decision::Accept(m),
        Some(m) => Decision::Reject(RejectReason::NoAcceptableMatch {
            best_distance: m.distance,
            threshold,
        }),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    Accepted(Session),
    Rejected(RejectReason),
}

/// Stamp `last_login` and build the session.
///
/// The store update is best-effort: a failure is logged and the login still succeeds.
pub async fn establish_session<U: UserStore + ?Sized>(
    store: &U,
    mut user: UserRecord,
    method: LoginMethod,
) -> Session {
    let now = Utc::now();

    if let Err(e) = store.update(&user.email, &UserPatch::last_login(now)).await {
        warn!("Failed to update last login for {}: {}", user.email, e);
    }

    user.last_login = Some(now);
    info!("Session established for {} ({:?})", user.email, method);

    Session {
        user,
        method,
        established_at: now,
    }
}

/// One face login workflow: capture, match against every enrolled user, decide.
pub struct FaceLogin<'a, X: ?Sized, R: ?Sized, U: ?Sized> {
    extractor: &'a X,
    images: &'a R,
    store: &'a U,
    auth: AuthConfig,
    state: LoginState,
}

impl<'a, X, R, U> FaceLogin<'a, X, R, U>
where
    X: DescriptorExtractor + ?Sized,
    R: ReferenceImageSource + ?Sized,
    U: UserStore + ?Sized,
{
    pub fn new(extractor: &'a X, images: &'a R, store: &'a U, auth: AuthConfig) -> Self {
        Self {
            extractor,
            images,
            store,
            auth,
            state: LoginState::Idle,
        }
    }

    pub fn state(&self) -> LoginState {
        self.state
    }

    /// Run one attempt to completion. Rejections leave the workflow `Idle`.
    pub async fn attempt<S: FrameSource + ?Sized>(&mut self, camera: &mut S) -> LoginOutcome {
        self.transition(LoginState::Capturing);

        let controller = CaptureController::from_config(self.extractor, &self.auth);
        let live = match controller.capture(camera).await {
            Ok(live) => live,
            Err(e) => return self.reject(e.into()),
        };

        self.transition(LoginState::Matching);

        let candidates = match self.store.list().await {
            Ok(users) => users,
            Err(e) => return self.reject(RejectReason::StoreUnavailable(e.to_string())),
        };

        let engine = MatchEngine::new(self.extractor, self.images);
        let result = engine.best_match(&live, &candidates).await;

        match decide(result, self.auth.distance_threshold) {
            Decision::Accept(m) => {
                info!("Face matched {} at distance {:.4}", m.user.email, m.distance);
                let method = LoginMethod::Face { distance: m.distance };
                let session = establish_session(self.store, m.user, method).await;
                self.transition(LoginState::SessionEstablished);
                LoginOutcome::Accepted(session)
            }
            Decision::Reject(reason) => self.reject(reason),
        }
    }

    /// Like [`attempt`](Self::attempt), but gives up as soon as `cancel` completes.
    ///
    /// Cancelling drops the in-flight capture or match, which releases the camera.
    pub async fn attempt_until<S, C>(&mut self, camera: &mut S, cancel: C) -> LoginOutcome
    where
        S: FrameSource + ?Sized,
        C: Future<Output = ()>,
    {
        let finished = tokio::select! {
            outcome = self.attempt(camera) => Some(outcome),
            _ = cancel => None,
        };

        match finished {
            Some(outcome) => outcome,
            None => self.reject(RejectReason::Cancelled),
        }
    }

    fn transition(&mut self, next: LoginState) {
        tracing::debug!("Login state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn reject(&mut self, reason: RejectReason) -> LoginOutcome {
        info!("Face login rejected: {}", reason);
        self.transition(LoginState::Idle);
        LoginOutcome::Rejected(reason)
    }
}

#[derive(Error, Debug)]
pub enum PasswordLoginError {
    #[error("Enter email and password!")]
    MissingCredentials,

    #[error("Could not load users: {0}")]
    StoreUnavailable(String),

    #[error("User not found!")]
    UserNotFound,

    #[error("Account blocked!")]
    Blocked,

    #[error("Wrong password!")]
    WrongPassword,

    #[error("Stored password is not hashed; an administrator must reset it")]
    ResetRequired,

    #[error("Password check failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

/// Email + password login. Both fields are trimmed; email matching is then exact and case-sensitive.
pub async fn password_login<U: UserStore + ?Sized>(
    store: &U,
    email: &str,
    password: &str,
) -> Result<Session, PasswordLoginError> {
    let (email, password) = (email.trim(), password.trim());
    if email.is_empty() || password.is_empty() {
        return Err(PasswordLoginError::MissingCredentials);
    }

    let users = store
        .list()
        .await
        .map_err(|e| PasswordLoginError::StoreUnavailable(e.to_string()))?;

    let user = users
        .into_iter()
        .find(|u| u.email == email)
        .ok_or(PasswordLoginError::UserNotFound)?;

    if user.is_blocked {
        return Err(PasswordLoginError::Blocked);
    }

    if !is_bcrypt_hash(&user.password_hash) {
        warn!("Refusing cleartext password entry for {}", user.email);
        return Err(PasswordLoginError::ResetRequired);
    }
    if !verify_password(password, &user.password_hash)? {
        return Err(PasswordLoginError::WrongPassword);
    }

    Ok(establish_session(store, user, LoginMethod::Password).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Role;

    fn result(distance: f32) -> Option<MatchResult> {
        Some(MatchResult {
            user: UserRecord {
                email: "ana@shop.kh".to_string(),
                password_hash: String::new(),
                role: Role::Staff,
                is_blocked: false,
                last_login: None,
                face_image_file: Some("ana_shop_kh.jpg".to_string()),
            },
            distance,
        })
    }

    #[test]
    fn test_threshold_is_inclusive() {
        assert!(matches!(decide(result(0.5), 0.5), Decision::Accept(_)));
        assert!(matches!(decide(result(0.0), 0.5), Decision::Accept(_)));
    }

    #[test]
    fn test_above_threshold_rejects() {
        for distance in [0.50001, 0.51] {
            match decide(result(distance), 0.5) {
                Decision::Reject(RejectReason::NoAcceptableMatch { best_distance, threshold }) => {
                    assert_eq!(best_distance, distance);
                    assert_eq!(threshold, 0.5);
                }
                other => panic!("expected rejection for {}, got {:?}", distance, other),
            }
        }
    }

    #[test]
    fn test_no_result_is_no_candidates() {
        assert_eq!(decide(None, 0.5), Decision::Reject(RejectReason::NoCandidates));
    }

    #[test]
    fn test_capture_errors_map_to_distinct_reasons() {
        assert_eq!(
            RejectReason::from(CaptureError::NoFaceDetected { frame: 2 }),
            RejectReason::NoFaceDetected { frame: 2 }
        );
        assert!(matches!(
            RejectReason::from(CaptureError::Device("busy".into())),
            RejectReason::CameraUnavailable(_)
        ));
        assert_ne!(
            RejectReason::NoCandidates.to_string(),
            RejectReason::NoAcceptableMatch { best_distance: 0.7, threshold: 0.5 }.to_string()
        );
    }
}
