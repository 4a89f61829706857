//! Backup and restore of the local journal database against the WebDAV backup folder.
//!
//! The client itself never retries; this layer does, with exponential backoff
//! and jitter, for failures that can plausibly go away on their own.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::models::{contents, RemoteEntry};
use crate::services::id_generator::{ClockRewindError, SnowflakeGenerator, SnowflakeId};
use crate::services::webdav::{WebDAVError, WebDAVService};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// delay = initial * multiplier^attempt * (0.9..1.1), capped at `max_delay_ms`.
    /// The jitter keeps several clients from retrying in lockstep.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponential = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let jitter = 0.9 + rand::random::<f64>() * 0.2;
        let jittered = (exponential * jitter) as u64;
        Duration::from_millis(jittered.min(self.max_delay_ms))
    }
}

/// Whether retrying could change the outcome
fn is_retryable(error: &WebDAVError) -> bool {
    if error.is_precondition() {
        return false;
    }
    match error {
        WebDAVError::Status { status, .. } => {
            status.is_server_error() || status.as_u16() == 429 || status.as_u16() == 408
        }
        WebDAVError::MalformedResponse(_) | WebDAVError::InvalidMethod(_) => false,
        _ => true,
    }
}

/// What to do with one backup file, given what exists locally and remotely.
/// Conflicts are reported, not resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BackupDecision {
    /// Only the local file exists
    UploadLocal,
    /// Only the remote file exists
    RestoreRemote { remote: RemoteEntry },
    /// Both exist; the user has to pick one
    BothPresent { remote: RemoteEntry },
    NothingToDo,
}

pub struct BackupCoordinator {
    webdav: WebDAVService,
    ids: Arc<SnowflakeGenerator>,
    retry: RetryConfig,
}

impl BackupCoordinator {
    pub fn new(webdav: WebDAVService, ids: Arc<SnowflakeGenerator>, retry: RetryConfig) -> Self {
        Self { webdav, ids, retry }
    }

    pub fn webdav(&self) -> &WebDAVService {
        &self.webdav
    }

    /// MKCOL on the backup folder; `false` is inconclusive (it may already exist)
    pub async fn ensure_backup_directory(&self) -> bool {
        self.webdav.make_directory("").await
    }

    /// Files in the backup folder, without the folder's own entry
    pub async fn remote_backups(&self) -> Vec<RemoteEntry> {
        let listing = self.webdav.list("").await;
        contents(&listing)
            .iter()
            .filter(|entry| entry.is_file())
            .cloned()
            .collect()
    }

    pub async fn decide(&self, local_file: &Path, remote_name: &str) -> BackupDecision {
        let local_exists = fs::metadata(local_file)
            .await
            .map(|metadata| metadata.is_file())
            .unwrap_or(false);

        let remote = self
            .remote_backups()
            .await
            .into_iter()
            .find(|entry| entry.decoded_file_name() == remote_name);

        let decision = match (local_exists, remote) {
            (true, None) => BackupDecision::UploadLocal,
            (false, Some(remote)) => BackupDecision::RestoreRemote { remote },
            (true, Some(remote)) => BackupDecision::BothPresent { remote },
            (false, None) => BackupDecision::NothingToDo,
        };
        info!("🧭 Backup decision for '{}': {:?}", remote_name, decision);
        decision
    }

    /// Uploads `local_file` as `remote_name`, retrying transient failures
    pub async fn back_up(&self, local_file: &Path, remote_name: &str) -> bool {
        let result = self
            .with_retry("upload", || self.webdav.try_upload(local_file, remote_name))
            .await;
        result.is_ok()
    }

    /// Downloads `remote_name` over `destination`, retrying transient failures
    pub async fn restore(&self, remote_name: &str, destination: &Path) -> bool {
        let result = self
            .with_retry("download", || self.webdav.try_download(remote_name, destination))
            .await;
        result.is_ok()
    }

    /// Fresh, time-ordered name for a new backup file
    pub fn next_backup_name(&self) -> Result<String, ClockRewindError> {
        Ok(backup_file_name(self.ids.next_id()?))
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut attempt_fn: F) -> Result<T, WebDAVError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, WebDAVError>>,
    {
        let mut attempt = 0;
        loop {
            match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(e) if !is_retryable(&e) || attempt >= self.retry.max_retries => {
                    warn!("❌ {} failed after {} attempt(s): {}", operation, attempt + 1, e);
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        "{} failed: {}, retrying in {}ms (attempt {}/{})",
                        operation,
                        e,
                        delay.as_millis(),
                        attempt + 1,
                        self.retry.max_retries
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

pub fn backup_file_name(id: SnowflakeId) -> String {
    format!("journal_backup_{}.zip", id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_retry_delay_with_jitter() {
        let retry = RetryConfig {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        };

        for attempt in 0..5 {
            let delay = retry.delay_for_attempt(attempt).as_millis() as u64;
            let base = 1_000.0 * 2.0_f64.powi(attempt as i32);
            let min = ((base * 0.9) as u64).min(10_000);
            let max = ((base * 1.1) as u64).min(10_000);
            assert!(delay >= min && delay <= max, "attempt {}: {}ms not in {}..={}", attempt, delay, min, max);
        }
    }

    #[test]
    fn test_backup_file_name() {
        assert_eq!(backup_file_name(SnowflakeId::from_i64(42)), "journal_backup_42.zip");
    }

    #[test]
    fn test_retryable_classification() {
        let status = |code: u16| WebDAVError::Status {
            method: "PUT".to_string(),
            url: "https://cloud.example.com/dav/journal/a.zip".to_string(),
            status: StatusCode::from_u16(code).unwrap(),
        };

        assert!(is_retryable(&status(503)));
        assert!(is_retryable(&status(429)));
        assert!(!is_retryable(&status(401)));
        assert!(!is_retryable(&status(404)));
        assert!(!is_retryable(&WebDAVError::MissingCredentials));
        assert!(is_retryable(&WebDAVError::Io(std::io::Error::other("disk hiccup"))));
    }
}
