use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Where the backup files live on the WebDAV server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebDAVConfig {
    /// Scheme and host, optionally with a path prefix, e.g. `https://cloud.example.com`
    pub server_url: String,
    /// Fixed DAV root below the server URL, e.g. `dav/`
    pub root_path: String,
    /// Subdirectory of the root reserved for this app's backups
    pub backup_dir: String,
}

impl Default for WebDAVConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            root_path: "dav/".to_string(),
            backup_dir: "journal".to_string(),
        }
    }
}

/// Sibling folder listings allowed in flight while building a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub max_concurrent_listings: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_listings: 4,
        }
    }
}

impl WebDAVConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    /// Rejects URLs that cannot be joined with request paths later on
    pub fn validate(&self) -> Result<()> {
        if self.server_url.trim().is_empty() {
            return Err(anyhow!("WebDAV server URL is empty"));
        }

        let normalized = Self::normalize_server_url(&self.server_url);
        let parsed = url::Url::parse(&normalized)
            .map_err(|e| anyhow!("Invalid WebDAV server URL '{}': {}", self.server_url, e))?;

        if parsed.cannot_be_a_base() || parsed.host_str().is_none() {
            return Err(anyhow!("WebDAV server URL '{}' has no host", self.server_url));
        }
        if self.backup_dir.trim_matches('/').is_empty() {
            return Err(anyhow!("Backup directory must not be empty"));
        }
        Ok(())
    }

    /// Adds `https://` when no scheme is given and strips trailing slashes
    pub fn normalize_server_url(url: &str) -> String {
        let trimmed = url.trim();
        let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("https://{}", trimmed)
        };
        with_scheme.trim_end_matches('/').to_string()
    }

    /// `<server>/<root>/`, the DAV root of the server
    pub fn webdav_url(&self) -> String {
        Self::webdav_url_for(&self.server_url, &self.root_path)
    }

    pub(crate) fn webdav_url_for(server_url: &str, root_path: &str) -> String {
        let base = Self::normalize_server_url(server_url);
        let root = root_path.trim_matches('/');
        if root.is_empty() {
            format!("{}/", base)
        } else {
            format!("{}/{}/", base, root)
        }
    }

    /// `<server>/<root>/<backup_dir>/`, the folder every relative path is resolved against
    pub fn backup_url(&self) -> String {
        self.backup_url_for(&self.server_url)
    }

    pub(crate) fn backup_url_for(&self, server_url: &str) -> String {
        format!(
            "{}{}/",
            Self::webdav_url_for(server_url, &self.root_path),
            self.backup_dir.trim_matches('/')
        )
    }
}
