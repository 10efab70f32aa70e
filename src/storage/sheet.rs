use crate::common::config::SheetConfig;
use crate::common::{FaceDashError, Result};
use crate::storage::user::{SheetUserRow, UserPatch, UserRecord};
use crate::storage::UserStore;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Users sheet of a SheetDB-style spreadsheet API.
pub struct SheetClient {
    http: Client,
    base_url: String,
    users_sheet: String,
    header_rows: usize,
}

#[derive(Serialize)]
struct DataEnvelope<'a, T> {
    data: [&'a T; 1],
}

impl SheetClient {
    pub fn new(config: &SheetConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self::with_client(http, config))
    }

    pub fn with_client(http: Client, config: &SheetConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            users_sheet: config.users_sheet.clone(),
            header_rows: config.header_rows,
        }
    }

    pub fn list_url(&self) -> String {
        format!("{}?sheet={}", self.base_url, urlencoding::encode(&self.users_sheet))
    }

    pub fn row_url(&self, email: &str) -> String {
        format!(
            "{}/Email/{}?sheet={}",
            self.base_url,
            urlencoding::encode(email),
            urlencoding::encode(&self.users_sheet)
        )
    }

    /// Drop header rows and anything that does not parse into a user.
    pub fn parse_rows(&self, rows: Vec<SheetUserRow>) -> Vec<UserRecord> {
        rows.into_iter()
            .skip(self.header_rows)
            .enumerate()
            .filter_map(|(i, row)| match UserRecord::try_from(row) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!("Skipping users row {}: {}", i + self.header_rows + 1, e);
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl UserStore for SheetClient {
    async fn list(&self) -> Result<Vec<UserRecord>> {
        let response = self.http.get(self.list_url()).send().await?;

        if !response.status().is_success() {
            return Err(FaceDashError::Store(format!(
                "Listing users failed with status {}", response.status()
            )));
        }

        let rows: Vec<SheetUserRow> = response.json().await?;
        let users = self.parse_rows(rows);
        debug!("Fetched {} users", users.len());
        Ok(users)
    }

    async fn update(&self, email: &str, patch: &UserPatch) -> Result<()> {
        let response = self
            .http
            .patch(self.row_url(email))
            .json(&DataEnvelope { data: [patch] })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FaceDashError::Store(format!(
                "Updating {} failed with status {}: {}", email, status, body
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(header_rows: usize) -> SheetClient {
        SheetClient::with_client(
            Client::new(),
            &SheetConfig {
                base_url: "https://sheetdb.io/api/v1/abc123/".to_string(),
                users_sheet: "Users".to_string(),
                header_rows,
                timeout_seconds: 10,
            },
        )
    }

    fn raw(email: &str) -> SheetUserRow {
        SheetUserRow {
            email: Some(email.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_urls() {
        let sheet = client(1);
        assert_eq!(sheet.list_url(), "https://sheetdb.io/api/v1/abc123?sheet=Users");
        assert_eq!(
            sheet.row_url("ana+ops@shop.kh"),
            "https://sheetdb.io/api/v1/abc123/Email/ana%2Bops%40shop.kh?sheet=Users"
        );
    }

    #[test]
    fn test_parse_rows_skips_header_and_bad_rows_keeping_order() {
        let rows = vec![raw("Email of the user"), raw("b@x.kh"), raw(""), raw("a@x.kh")];
        let emails: Vec<String> = client(1)
            .parse_rows(rows)
            .into_iter()
            .map(|u| u.email)
            .collect();

        assert_eq!(emails, vec!["b@x.kh", "a@x.kh"]);
    }

    #[test]
    fn test_patch_envelope_shape() {
        let patch = UserPatch { last_login: Some("2024-05-01T08:30:00.000Z".to_string()) };
        let body = serde_json::to_value(DataEnvelope { data: [&patch] }).unwrap();
        assert_eq!(body, serde_json::json!({ "data": [{ "LastLogin": "2024-05-01T08:30:00.000Z" }] }));
    }
}
