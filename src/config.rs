use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};

use crate::services::webdav::{ConcurrencyConfig, WebDAVConfig};

/// Non-secret settings. Credentials are not stored here; they are read
/// through a `CredentialsProvider` on every request.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub webdav: WebDAVConfig,
    pub datacenter_id: u16,
    pub concurrency: ConcurrencyConfig,
    /// Deadline the CLI puts around each remote operation
    pub timeout_seconds: u64,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => info!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => debug!("No .env file found"),
            Err(e) => return Err(anyhow!("Failed to load .env: {}", e)),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, falling back to defaults for
    /// everything except the server URL
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let server_url = get("DAVSYNC_SERVER_URL")
            .ok_or_else(|| anyhow!("DAVSYNC_SERVER_URL must be set"))?;

        let defaults = WebDAVConfig::default();
        let webdav = WebDAVConfig {
            server_url,
            root_path: get("DAVSYNC_ROOT_PATH").unwrap_or(defaults.root_path),
            backup_dir: get("DAVSYNC_BACKUP_DIR").unwrap_or(defaults.backup_dir),
        };
        webdav.validate()?;

        let datacenter_id = match get("DAVSYNC_DATACENTER_ID") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("DAVSYNC_DATACENTER_ID '{}' is not a number", raw))?,
            None => 1,
        };
        if datacenter_id > crate::services::id_generator::MAX_DATACENTER_ID {
            return Err(anyhow!("DAVSYNC_DATACENTER_ID must be below 1024, got {}", datacenter_id));
        }

        let max_concurrent_listings = match get("DAVSYNC_MAX_CONCURRENT_LISTINGS") {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("DAVSYNC_MAX_CONCURRENT_LISTINGS '{}' is not a number", raw))?,
            None => ConcurrencyConfig::default().max_concurrent_listings,
        };
        if max_concurrent_listings == 0 {
            return Err(anyhow!("DAVSYNC_MAX_CONCURRENT_LISTINGS must be at least 1"));
        }

        let timeout_seconds = match get("DAVSYNC_TIMEOUT_SECONDS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("DAVSYNC_TIMEOUT_SECONDS '{}' is not a number", raw))?,
            None => 300,
        };

        Ok(Self {
            webdav,
            datacenter_id,
            concurrency: ConcurrencyConfig { max_concurrent_listings },
            timeout_seconds,
        })
    }
}
