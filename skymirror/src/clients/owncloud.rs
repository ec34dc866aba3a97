//! ownCloud WebDAV storage client
//!
//! Folder existence via `PROPFIND`, creation via `MKCOL`. A 405 from MKCOL
//! means the collection already exists and is reported as such, never as an
//! error, so creation stays idempotent under retries.

use async_trait::async_trait;
use reqwest::Method;
use std::time::Duration;

use skymirror_common::{Error, Result};

/// Result of one remote folder-creation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// Folder was created
    Created,
    /// Folder was already present
    AlreadyExists,
    /// Connectivity or server-side failure; worth retrying
    Transient(String),
    /// Auth/permission/malformed-path failure; retrying cannot help
    Permanent(String),
}

/// Storage operations consumed by the upload orchestrator
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Whether the folder at `path` (relative to the user root) exists
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Create the folder at `path`; every ancestor must already exist
    async fn create_folder(&self, path: &str) -> Result<CreateOutcome>;
}

/// WebDAV client for an ownCloud files endpoint
pub struct OwnCloudClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    token: String,
    user_id: String,
}

impl OwnCloudClient {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        token: impl Into<String>,
        user_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            token: token.into(),
            user_id: user_id.into(),
        })
    }

    fn folder_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.user_id, path)
    }
}

#[async_trait]
impl StorageClient for OwnCloudClient {
    async fn exists(&self, path: &str) -> Result<bool> {
        let method = Method::from_bytes(b"PROPFIND")
            .map_err(|e| Error::Internal(format!("PROPFIND method: {}", e)))?;
        let response = self
            .http
            .request(method, format!("{}/", self.folder_url(path)))
            .basic_auth(&self.username, Some(&self.token))
            .send()
            .await?;

        let status = response.status();
        match status.as_u16() {
            200 | 207 => Ok(true),
            404 => Ok(false),
            _ => match response.error_for_status() {
                Ok(_) => Err(Error::Internal(format!(
                    "unexpected status {} from PROPFIND {}",
                    status, path
                ))),
                Err(e) => Err(Error::Http(e)),
            },
        }
    }

    async fn create_folder(&self, path: &str) -> Result<CreateOutcome> {
        let method = Method::from_bytes(b"MKCOL")
            .map_err(|e| Error::Internal(format!("MKCOL method: {}", e)))?;
        let response = match self
            .http
            .request(method, self.folder_url(path))
            .basic_auth(&self.username, Some(&self.token))
            .send()
            .await
        {
            Ok(response) => response,
            // Connectivity failures surface as an outcome so the retry
            // policy, not the transport, decides what happens next.
            Err(e) => return Ok(CreateOutcome::Transient(format!("request failed: {}", e))),
        };

        let status = response.status();
        match status.as_u16() {
            201 => {
                tracing::info!(path = %path, "folder created");
                Ok(CreateOutcome::Created)
            }
            405 => {
                tracing::debug!(path = %path, "folder already exists");
                Ok(CreateOutcome::AlreadyExists)
            }
            401 | 403 => Ok(CreateOutcome::Permanent(format!(
                "unauthorized ({}): check storage username or token",
                status
            ))),
            s if status.is_server_error() => {
                Ok(CreateOutcome::Transient(format!("server error {}", s)))
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Ok(CreateOutcome::Permanent(format!(
                    "unexpected status {}: {}",
                    status,
                    body.chars().take(200).collect::<String>()
                )))
            }
        }
    }
}
