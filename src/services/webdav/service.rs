use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method, StatusCode};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::{Credentials, CredentialsProvider, RemoteEntry};
use crate::webdav_xml_parser::{parse_propfind_response, PROPFIND_BODY};

use super::common::{basic_auth_header, build_user_agent, dav_method};
use super::config::WebDAVConfig;
use super::error::WebDAVError;

/// WebDAV client for the backup folder.
///
/// Holds no state besides configuration: credentials are fetched from the
/// provider on every call and dropped afterwards. Requests are never retried
/// and carry no timeout; both are left to the calling layer.
#[derive(Clone)]
pub struct WebDAVService {
    client: Client,
    config: WebDAVConfig,
    credentials: Arc<dyn CredentialsProvider>,
}

impl WebDAVService {
    pub fn new(config: WebDAVConfig, credentials: Arc<dyn CredentialsProvider>) -> Result<Self> {
        config.validate()?;

        let client = Client::builder().build()?;

        Ok(Self {
            client,
            config,
            credentials,
        })
    }

    pub fn get_config(&self) -> &WebDAVConfig {
        &self.config
    }

    // ============================================================================
    // Request plumbing
    // ============================================================================

    fn require_credentials(&self) -> Result<Credentials, WebDAVError> {
        let credentials = self.credentials.credentials();
        if !credentials.is_complete() {
            return Err(WebDAVError::MissingCredentials);
        }
        Ok(credentials)
    }

    /// Server URL from the credential store if it has one, else the configured one
    fn effective_server_url<'a>(&'a self, credentials: &'a Credentials) -> &'a str {
        if credentials.server_url.trim().is_empty() {
            &self.config.server_url
        } else {
            &credentials.server_url
        }
    }

    /// Turns a path into a request URL.
    ///
    /// Full URLs are used as-is, hrefs starting with `/` are joined to the
    /// server origin (that is how listings report them), anything else is
    /// relative to the backup folder.
    pub fn resolve_url(&self, credentials: &Credentials, path: &str) -> Result<String, WebDAVError> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(path.to_string());
        }

        let server_url = self.effective_server_url(credentials);

        if path.starts_with('/') {
            let normalized = WebDAVConfig::normalize_server_url(server_url);
            let base = url::Url::parse(&normalized).map_err(|e| WebDAVError::InvalidUrl {
                url: normalized.clone(),
                reason: e.to_string(),
            })?;
            let joined = base.join(path).map_err(|e| WebDAVError::InvalidUrl {
                url: path.to_string(),
                reason: e.to_string(),
            })?;
            return Ok(joined.to_string());
        }

        Ok(format!(
            "{}{}",
            self.config.backup_url_for(server_url),
            path.trim_start_matches("./")
        ))
    }

    fn request(&self, method: Method, url: &str, credentials: &Credentials) -> reqwest::RequestBuilder {
        debug!("🌐 {} {} (user: {})", method, url, credentials.username);
        self.client
            .request(method, url)
            .header(AUTHORIZATION, basic_auth_header(&credentials.username, &credentials.password))
            .header(USER_AGENT, build_user_agent())
    }

    // ============================================================================
    // Typed operations
    // ============================================================================

    /// Depth-1 PROPFIND of `path`. The first entry is the directory itself.
    pub async fn try_list(&self, path: &str) -> Result<Vec<RemoteEntry>, WebDAVError> {
        let credentials = self.require_credentials()?;
        let url = self.resolve_url(&credentials, path)?;
        let request_id = Uuid::new_v4();

        info!("[{}] 📂 Listing '{}'", request_id, url);

        let response = self
            .request(dav_method("PROPFIND")?, &url, &credentials)
            .header("Depth", "1")
            .header(CONTENT_TYPE, "text/xml")
            .body(PROPFIND_BODY)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WebDAVError::Status {
                method: "PROPFIND".to_string(),
                url,
                status,
            });
        }

        let body = response.text().await?;
        debug!("[{}] PROPFIND response: {} bytes", request_id, body.len());

        let entries = parse_propfind_response(&body)?;
        info!("[{}] ✅ Listed '{}': {} entries", request_id, url, entries.len());
        Ok(entries)
    }

    /// MKCOL `path`. Any HTTP answer counts as completion; the status is returned
    /// for callers that care (405 usually means the collection already exists).
    pub async fn try_make_directory(&self, path: &str) -> Result<StatusCode, WebDAVError> {
        let credentials = self.require_credentials()?;
        let url = self.resolve_url(&credentials, path)?;

        let response = self
            .request(dav_method("MKCOL")?, &url, &credentials)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!("📁 Created collection '{}'", url);
        } else {
            debug!("MKCOL '{}' answered {}", url, status);
        }
        Ok(status)
    }

    /// PUT the bytes of `local_file` as `remote_name`; succeeds on 201 or 204
    pub async fn try_upload(&self, local_file: &Path, remote_name: &str) -> Result<(), WebDAVError> {
        match fs::metadata(local_file).await {
            Ok(metadata) if metadata.is_file() => {}
            _ => return Err(WebDAVError::LocalFileMissing(local_file.to_path_buf())),
        }

        let credentials = self.require_credentials()?;
        let url = self.resolve_url(&credentials, remote_name)?;

        let content = fs::read(local_file).await?;
        let size = content.len();
        info!("⬆️ Uploading '{}' ({} bytes) to '{}'", local_file.display(), size, url);

        // Content-Length is set from the in-memory body
        let response = self
            .request(Method::PUT, &url, &credentials)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(content)
            .send()
            .await?;

        match response.status() {
            StatusCode::CREATED | StatusCode::NO_CONTENT => {
                info!("✅ Uploaded {} bytes to '{}'", size, url);
                Ok(())
            }
            status => Err(WebDAVError::Status {
                method: "PUT".to_string(),
                url,
                status,
            }),
        }
    }

    /// GET `remote_name` into `destination`, returning the number of bytes written.
    ///
    /// The body is streamed into `<destination>.part` and renamed over the
    /// destination only once complete, so a failed transfer leaves any
    /// previous file untouched.
    pub async fn try_download(&self, remote_name: &str, destination: &Path) -> Result<u64, WebDAVError> {
        let credentials = self.require_credentials()?;
        let url = self.resolve_url(&credentials, remote_name)?;

        info!("⬇️ Downloading '{}' to '{}'", url, destination.display());

        let mut response = self.request(Method::GET, &url, &credentials).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WebDAVError::Status {
                method: "GET".to_string(),
                url,
                status,
            });
        }

        let part_path = partial_path(destination);
        let result = async {
            let mut file = fs::File::create(&part_path).await?;
            let mut written: u64 = 0;
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            file.sync_all().await?;
            drop(file);

            fs::rename(&part_path, destination).await?;
            Ok::<u64, WebDAVError>(written)
        }
        .await;

        match &result {
            Ok(written) => info!("✅ Downloaded {} bytes to '{}'", written, destination.display()),
            Err(e) => {
                error!("❌ Download of '{}' failed: {}", url, e);
                if let Err(cleanup) = fs::remove_file(&part_path).await {
                    debug!("No partial file to clean up at '{}': {}", part_path.display(), cleanup);
                }
            }
        }
        result
    }

    // ============================================================================
    // Lenient operations
    // ============================================================================

    /// Listing that never fails: missing credentials, transport errors and
    /// undecodable bodies all come back as an empty listing. Use [`try_list`]
    /// to tell a failed listing from an empty folder.
    ///
    /// [`try_list`]: Self::try_list
    pub async fn list(&self, path: &str) -> Vec<RemoteEntry> {
        match self.try_list(path).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("⚠️ Listing '{}' failed, treating it as empty: {}", path, e);
                Vec::new()
            }
        }
    }

    /// True if the MKCOL request completed. Not idempotent across servers, so
    /// `false` means "inconclusive" rather than "the folder does not exist".
    pub async fn make_directory(&self, path: &str) -> bool {
        match self.try_make_directory(path).await {
            Ok(_) => true,
            Err(e) => {
                warn!("⚠️ Creating directory '{}' failed: {}", path, e);
                false
            }
        }
    }

    pub async fn upload(&self, local_file: &Path, remote_name: &str) -> bool {
        match self.try_upload(local_file, remote_name).await {
            Ok(()) => true,
            Err(e) => {
                warn!("⚠️ Upload of '{}' as '{}' failed: {}", local_file.display(), remote_name, e);
                false
            }
        }
    }

    pub async fn download(&self, remote_name: &str, destination: &Path) -> bool {
        match self.try_download(remote_name, destination).await {
            Ok(_) => true,
            Err(e) => {
                warn!("⚠️ Download of '{}' failed: {}", remote_name, e);
                false
            }
        }
    }
}

/// `<destination>.part`, next to the destination so the final rename stays on one filesystem
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StaticCredentials;

    fn service_with(credentials: Credentials) -> WebDAVService {
        let config = WebDAVConfig::new("https://cloud.example.com");
        WebDAVService::new(config, Arc::new(StaticCredentials(credentials)))
            .expect("Failed to create WebDAV service")
    }

    #[test]
    fn test_resolve_url_variants() {
        let creds = Credentials::new("", "alice", "secret");
        let service = service_with(creds.clone());

        assert_eq!(
            service.resolve_url(&creds, "journal_db_backup.zip").unwrap(),
            "https://cloud.example.com/dav/journal/journal_db_backup.zip"
        );
        assert_eq!(
            service.resolve_url(&creds, "").unwrap(),
            "https://cloud.example.com/dav/journal/"
        );
        assert_eq!(
            service.resolve_url(&creds, "/dav/journal/sub%20dir/").unwrap(),
            "https://cloud.example.com/dav/journal/sub%20dir/"
        );
        assert_eq!(
            service.resolve_url(&creds, "http://other.example.com/x").unwrap(),
            "http://other.example.com/x"
        );
    }

    #[test]
    fn test_credential_server_url_takes_precedence() {
        let creds = Credentials::new("https://moved.example.org/", "alice", "secret");
        let service = service_with(creds.clone());

        assert_eq!(
            service.resolve_url(&creds, "a.zip").unwrap(),
            "https://moved.example.org/dav/journal/a.zip"
        );
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/tmp/restore/journal.zip")),
            PathBuf::from("/tmp/restore/journal.zip.part")
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = WebDAVService::new(
            WebDAVConfig::new(""),
            Arc::new(StaticCredentials(Credentials::default())),
        );
        assert!(result.is_err());
    }
}
