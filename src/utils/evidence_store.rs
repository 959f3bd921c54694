use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use thiserror::Error;
use url::Url;

use crate::error::AppError;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid endpoint: {0}")]
    Url(#[from] url::ParseError),

    #[error("storage rejected upload ({status}): {body}")]
    Rejected { status: u16, body: String },
}

impl From<UploadError> for AppError {
    fn from(e: UploadError) -> Self {
        AppError::Upload(e.to_string())
    }
}

/// Durable storage for check-in/check-out photos.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Stores `bytes` under `object_name` and returns the URL it is served at.
    async fn upload(
        &self,
        object_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, UploadError>;
}

/// Writes evidence below a local directory.
pub struct LocalEvidenceStore {
    root: PathBuf,
    public_url: String,
}

impl LocalEvidenceStore {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl EvidenceStore for LocalEvidenceStore {
    async fn upload(
        &self,
        object_name: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, UploadError> {
        let path = self.root.join(object_name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        tracing::debug!(path = %path.display(), "Evidence stored locally");
        Ok(format!("{}/{}", self.public_url, object_name))
    }
}

/// Uploads evidence to an object-storage bucket over HTTP
/// (`POST {endpoint}/storage/v1/object/{bucket}/{name}`, multipart body).
pub struct HttpEvidenceStore {
    http_client: reqwest::Client,
    endpoint: String,
    bucket: String,
    api_key: String,
}

impl HttpEvidenceStore {
    pub fn new(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        api_key: impl Into<String>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            api_key: api_key.into(),
        }
    }

    pub fn public_url(&self, object_name: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.endpoint, self.bucket, object_name
        )
    }
}

#[async_trait]
impl EvidenceStore for HttpEvidenceStore {
    async fn upload(
        &self,
        object_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, UploadError> {
        let mut url = Url::parse(&self.endpoint)?;
        url.set_path(&format!("/storage/v1/object/{}/{}", self.bucket, object_name));

        let file_name = object_name
            .rsplit('/')
            .next()
            .unwrap_or(object_name)
            .to_string();
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(content_type)?;
        let form = Form::new().part("file", part);

        let response = self
            .http_client
            .post(url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", &self.api_key))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(self.public_url(object_name))
    }
}
