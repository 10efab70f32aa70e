use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account role. Unknown values from the sheet are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    Staff,
    Other(String),
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.trim() {
            "" | "Staff" => Role::Staff,
            "Admin" => Role::Admin,
            other => Role::Other(other.to_string()),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "Admin"),
            Role::Staff => write!(f, "Staff"),
            Role::Other(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_blocked: bool,
    pub last_login: Option<DateTime<Utc>>,
    /// Reference photo name; users without one cannot log in by face.
    pub face_image_file: Option<String>,
}

/// One row of the users sheet exactly as the service returns it.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SheetUserRow {
    #[serde(rename = "Email", default)]
    pub email: Option<String>,
    #[serde(rename = "PasswordHash", default)]
    pub password_hash: Option<String>,
    #[serde(rename = "Role", default)]
    pub role: Option<String>,
    #[serde(rename = "IsBlocked", default)]
    pub is_blocked: Option<String>,
    #[serde(rename = "LastLogin", default)]
    pub last_login: Option<String>,
    #[serde(rename = "FaceImageFile", default)]
    pub face_image_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    MissingEmail,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowError::MissingEmail => write!(f, "row has no Email"),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl TryFrom<SheetUserRow> for UserRecord {
    type Error = RowError;

    fn try_from(row: SheetUserRow) -> Result<Self, Self::Error> {
        let email = non_blank(row.email).ok_or(RowError::MissingEmail)?;

        // Only the sheet's exact boolean "TRUE" blocks; anything else reads as unblocked
        let is_blocked = row.is_blocked.as_deref() == Some("TRUE");

        let last_login = non_blank(row.last_login).and_then(|raw| {
            match DateTime::parse_from_rfc3339(&raw) {
                Ok(ts) => Some(ts.with_timezone(&Utc)),
                Err(e) => {
                    tracing::warn!("Ignoring unparseable LastLogin {:?} for {}: {}", raw, email, e);
                    None
                }
            }
        });

        Ok(UserRecord {
            role: Role::from(row.role.unwrap_or_default()),
            password_hash: row.password_hash.unwrap_or_default(),
            face_image_file: non_blank(row.face_image_file),
            email,
            is_blocked,
            last_login,
        })
    }
}

/// Partial update for one user row. Only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserPatch {
    #[serde(rename = "LastLogin", skip_serializing_if = "Option::is_none")]
    pub last_login: Option<String>,
}

impl UserPatch {
    pub fn last_login(at: DateTime<Utc>) -> Self {
        Self {
            last_login: Some(at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        }
    }
}
