use crate::common::Result;
use crate::storage::UserRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LoginMethod {
    Face { distance: f32 },
    Password,
}

/// The logged-in user as established by one successful login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Full record, `last_login` already refreshed.
    pub user: UserRecord,
    pub method: LoginMethod,
    pub established_at: DateTime<Utc>,
}

/// Client-side session record stored as JSON on disk.
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(session)?)?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path)?;
        Ok(Some(serde_json::from_slice(&data)?))
    }

    /// Returns whether a session was present.
    pub fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Role;

    #[test]
    fn test_save_load_clear() {
        let path = std::env::temp_dir()
            .join(format!("facedash-session-{}", std::process::id()))
            .join("session.json");
        let file = SessionFile::new(&path);
        assert_eq!(file.load().unwrap(), None);

        let now = Utc::now();
        let session = Session {
            user: UserRecord {
                email: "ana@shop.kh".to_string(),
                password_hash: String::new(),
                role: Role::Admin,
                is_blocked: false,
                last_login: Some(now),
                face_image_file: Some("ana_shop_kh.jpg".to_string()),
            },
            method: LoginMethod::Face { distance: 0.25 },
            established_at: now,
        };

        file.save(&session).unwrap();
        assert_eq!(file.load().unwrap(), Some(session));
        assert!(file.clear().unwrap());
        assert!(!file.clear().unwrap());
    }
}
