use crate::common::{FaceDashError, FaceSourceConfig, Result};
use async_trait::async_trait;
use base64::Engine;
use image::DynamicImage;
use reqwest::Client;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Resolves a user's `face_image_file` to a decoded reference image.
#[async_trait]
pub trait ReferenceImageSource: Send + Sync {
    async fn load(&self, face_image_file: &str) -> Result<DynamicImage>;
}

#[async_trait]
impl<T: ReferenceImageSource + ?Sized> ReferenceImageSource for Arc<T> {
    async fn load(&self, face_image_file: &str) -> Result<DynamicImage> {
        (**self).load(face_image_file).await
    }
}

/// Reference names are bare file names; anything that could walk out of the folder is refused.
fn check_file_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(FaceDashError::Store(format!("Invalid face image name: {:?}", name)));
    }
    Ok(())
}

/// Reference photos kept in a folder on this host.
pub struct LocalFaceDir {
    dir: PathBuf,
}

impl LocalFaceDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ReferenceImageSource for LocalFaceDir {
    async fn load(&self, face_image_file: &str) -> Result<DynamicImage> {
        check_file_name(face_image_file)?;
        let bytes = tokio::fs::read(self.dir.join(face_image_file)).await?;
        Ok(image::load_from_memory(&bytes)?)
    }
}

/// Reference photos committed to a repository, read through the contents API.
pub struct GitHubContents {
    http: Client,
    api_base: String,
    owner: String,
    repo: String,
    folder: String,
    branch: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct ContentsResponse {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
}

impl GitHubContents {
    pub fn new(
        http: Client,
        api_base: &str,
        owner: &str,
        repo: &str,
        folder: &str,
        branch: &str,
        token: Option<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            folder: folder.trim_matches('/').to_string(),
            branch: branch.to_string(),
            token,
        }
    }

    pub fn contents_url(&self, face_image_file: &str) -> String {
        let path = if self.folder.is_empty() {
            face_image_file.to_string()
        } else {
            format!("{}/{}", self.folder, face_image_file)
        };
        format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            self.api_base, self.owner, self.repo, path, urlencoding::encode(&self.branch)
        )
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .http
            .get(url)
            .header(reqwest::header::USER_AGENT, "facedash")
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");

        match &self.token {
            Some(token) => builder.header(reqwest::header::AUTHORIZATION, format!("token {}", token)),
            None => builder,
        }
    }

    async fn fetch_bytes(&self, face_image_file: &str) -> Result<Vec<u8>> {
        let url = self.contents_url(face_image_file);
        let response = self.request(&url).send().await?;
        if !response.status().is_success() {
            return Err(FaceDashError::Store(format!(
                "Fetching {} failed with status {}", face_image_file, response.status()
            )));
        }

        let contents: ContentsResponse = response.json().await?;
        if let Some(bytes) = decode_contents(&contents)? {
            return Ok(bytes);
        }

        // Files over the API's inline size limit come back without content
        let download_url = contents.download_url.ok_or_else(|| {
            FaceDashError::Store(format!("No content or download URL for {}", face_image_file))
        })?;
        let response = self.request(&download_url).send().await?;
        if !response.status().is_success() {
            return Err(FaceDashError::Store(format!(
                "Downloading {} failed with status {}", face_image_file, response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

fn decode_contents(contents: &ContentsResponse) -> Result<Option<Vec<u8>>> {
    let Some(content) = contents.content.as_deref().filter(|c| !c.trim().is_empty()) else {
        return Ok(None);
    };
    if let Some(encoding) = contents.encoding.as_deref() {
        if encoding != "base64" {
            return Ok(None);
        }
    }

    // The API wraps base64 at 60 columns
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map(Some)
        .map_err(|e| FaceDashError::Store(format!("Invalid base64 content: {}", e)))
}

#[async_trait]
impl ReferenceImageSource for GitHubContents {
    async fn load(&self, face_image_file: &str) -> Result<DynamicImage> {
        check_file_name(face_image_file)?;
        let bytes = self.fetch_bytes(face_image_file).await?;
        Ok(image::load_from_memory(&bytes)?)
    }
}

/// Build the configured reference image source.
pub fn from_config(config: &FaceSourceConfig, http: Client) -> Arc<dyn ReferenceImageSource> {
    match config {
        FaceSourceConfig::Local { dir } => Arc::new(LocalFaceDir::new(dir.clone())),
        FaceSourceConfig::Github { owner, repo, folder, branch, token_env, api_base } => {
            let token = std::env::var(token_env).ok().filter(|t| !t.is_empty());
            if token.is_none() {
                tracing::warn!("{} is not set; reading face images anonymously", token_env);
            }
            Arc::new(GitHubContents::new(http, api_base, owner, repo, folder, branch, token))
        }
    }
}
