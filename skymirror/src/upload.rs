//! Idempotent folder-creation orchestration
//!
//! Walks a folder path root-to-leaf, confirming each prefix exists before
//! touching its child. Transient storage failures are retried with
//! exponential backoff; exhausting the budget escalates to a permanent
//! failure for the path.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::clients::{CreateOutcome, StorageClient};
use crate::folder_path::FolderPath;

/// Upload failure, split by whether a later tick may succeed
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("transient storage failure at {path}: {message}")]
    Transient { path: String, message: String },

    #[error("permanent storage failure at {path}: {message}")]
    Permanent { path: String, message: String },
}

/// Exponential backoff policy for transient storage failures
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Total attempts per folder, first try included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the retry following attempt number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        self.base_delay.mul_f64(factor)
    }
}

/// Ensures folder hierarchies exist on the remote storage service
pub struct UploadOrchestrator<S> {
    storage: Arc<S>,
    backoff: BackoffPolicy,
    /// Prefixes confirmed present this run; re-checking them would be
    /// wasted round-trips since nothing else deletes folders
    confirmed: HashSet<String>,
}

impl<S: StorageClient> UploadOrchestrator<S> {
    pub fn new(storage: Arc<S>, backoff: BackoffPolicy) -> Self {
        Self {
            storage,
            backoff,
            confirmed: HashSet::new(),
        }
    }

    /// Ensure every ancestor and the leaf of `path` exist.
    ///
    /// Safe to call repeatedly with the same path; "already exists" is
    /// success, and confirmed prefixes are skipped outright.
    pub async fn ensure_path(&mut self, path: &FolderPath) -> Result<(), UploadError> {
        for prefix in path.prefixes() {
            if self.confirmed.contains(&prefix) {
                continue;
            }
            self.ensure_one(&prefix).await?;
            self.confirmed.insert(prefix);
        }
        Ok(())
    }

    async fn ensure_one(&self, path: &str) -> Result<(), UploadError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_once(path).await {
                Ok(()) => return Ok(()),
                Err(UploadError::Transient { message, .. })
                    if attempt < self.backoff.max_attempts =>
                {
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        path = %path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        message = %message,
                        "transient storage failure, will retry after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(UploadError::Transient { path, message }) => {
                    error!(
                        path = %path,
                        attempts = attempt,
                        "retries exhausted for folder creation"
                    );
                    return Err(UploadError::Permanent {
                        path,
                        message: format!("retries exhausted after {} attempts: {}", attempt, message),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_once(&self, path: &str) -> Result<(), UploadError> {
        match self.storage.exists(path).await {
            Ok(true) => {
                debug!(path = %path, "folder present");
                return Ok(());
            }
            Ok(false) => {}
            Err(e) if e.is_transient() => {
                return Err(UploadError::Transient {
                    path: path.to_string(),
                    message: e.to_string(),
                })
            }
            Err(e) => {
                return Err(UploadError::Permanent {
                    path: path.to_string(),
                    message: e.to_string(),
                })
            }
        }

        match self.storage.create_folder(path).await {
            Ok(CreateOutcome::Created) | Ok(CreateOutcome::AlreadyExists) => Ok(()),
            Ok(CreateOutcome::Transient(message)) => Err(UploadError::Transient {
                path: path.to_string(),
                message,
            }),
            Ok(CreateOutcome::Permanent(message)) => Err(UploadError::Permanent {
                path: path.to_string(),
                message,
            }),
            Err(e) if e.is_transient() => Err(UploadError::Transient {
                path: path.to_string(),
                message: e.to_string(),
            }),
            Err(e) => Err(UploadError::Permanent {
                path: path.to_string(),
                message: e.to_string(),
            }),
        }
    }
}
