//! Command line front end for the journal backup folder.
//!
//! Usage: davsync <COMMAND>
//!
//! Settings come from the environment (or a `.env` file): `DAVSYNC_SERVER_URL`,
//! `DAVSYNC_USERNAME`, `DAVSYNC_PASSWORD` and the optional `DAVSYNC_*` tuning
//! variables. Every remote operation runs under `DAVSYNC_TIMEOUT_SECONDS`.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use davsync::models::{contents, EnvCredentials};
use davsync::{
    BackupCoordinator, Config, DirectoryTreeBuilder, RemoteEntry, RetryConfig, SnowflakeGenerator,
    WebDAVService,
};

#[derive(Parser)]
#[command(name = "davsync")]
#[command(about = "Back up and restore journal files over WebDAV")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List a remote folder (defaults to the backup folder)
    List {
        #[arg(default_value = "")]
        path: String,
    },
    /// Print the full remote tree below a folder
    Tree {
        #[arg(default_value = "")]
        path: String,
        /// Print the tree as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a remote folder
    Mkdir { path: String },
    /// Upload a local file into the backup folder
    Upload {
        file: PathBuf,
        /// Remote file name (defaults to a fresh journal_backup_<id>.zip)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Download a remote file, replacing the destination only on success
    Download { remote: String, destination: PathBuf },
    /// Decide whether a local file should be uploaded or restored
    Plan { file: PathBuf, remote: String },
    /// Print new snowflake ids
    NextId {
        #[arg(short, long, default_value_t = 1)]
        count: usize,
    },
}

async fn with_deadline<T>(seconds: u64, operation: impl Future<Output = T>) -> Result<T> {
    tokio::time::timeout(Duration::from_secs(seconds), operation)
        .await
        .map_err(|_| anyhow!("Operation timed out after {}s", seconds))
}

/// Creates the backup folder if needed, then uploads; each request gets its own deadline
async fn upload_backup(coordinator: &BackupCoordinator, file: &Path, remote_name: &str, deadline: u64) -> Result<()> {
    with_deadline(deadline, coordinator.ensure_backup_directory()).await?;
    if !with_deadline(deadline, coordinator.back_up(file, remote_name)).await? {
        bail!("Upload of '{}' failed", file.display());
    }
    Ok(())
}

fn print_tree(entry: &RemoteEntry, depth: usize) {
    let marker = if entry.is_folder() { "/" } else { "" };
    println!("{}{}{}", "  ".repeat(depth), entry.decoded_file_name(), marker);
    if let Some(children) = &entry.children {
        for child in children {
            print_tree(child, depth + 1);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    let deadline = config.timeout_seconds;

    let ids = Arc::new(SnowflakeGenerator::new(config.datacenter_id)?);
    let webdav = WebDAVService::new(config.webdav.clone(), Arc::new(EnvCredentials))?;

    match args.command {
        Command::List { path } => {
            let listing = with_deadline(deadline, webdav.try_list(&path)).await??;
            for entry in contents(&listing) {
                let marker = if entry.is_folder() { "/" } else { "" };
                println!("{}{}", entry.decoded_file_name(), marker);
            }
        }
        Command::Tree { path, json } => {
            let builder = DirectoryTreeBuilder::with_concurrency(Arc::new(webdav), config.concurrency);
            let tree = with_deadline(deadline, builder.build_tree_for(&path)).await??;
            if json {
                println!("{}", serde_json::to_string_pretty(&tree)?);
            } else {
                print_tree(&tree, 0);
            }
        }
        Command::Mkdir { path } => {
            let status = with_deadline(deadline, webdav.try_make_directory(&path)).await??;
            println!("MKCOL {}: {}", path, status);
        }
        Command::Upload { file, name } => {
            let coordinator = BackupCoordinator::new(webdav, ids, RetryConfig::default());
            let remote_name = match name {
                Some(name) => name,
                None => coordinator.next_backup_name()?,
            };
            upload_backup(&coordinator, &file, &remote_name, deadline).await?;
            info!("Uploaded '{}' as '{}'", file.display(), remote_name);
            println!("{}", remote_name);
        }
        Command::Download { remote, destination } => {
            let coordinator = BackupCoordinator::new(webdav, ids, RetryConfig::default());
            if !with_deadline(deadline, coordinator.restore(&remote, &destination)).await? {
                bail!("Download of '{}' failed", remote);
            }
            println!("{}", destination.display());
        }
        Command::Plan { file, remote } => {
            let coordinator = BackupCoordinator::new(webdav, ids, RetryConfig::none());
            let decision = with_deadline(deadline, coordinator.decide(&file, &remote)).await?;
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
        Command::NextId { count } => {
            for _ in 0..count {
                println!("{}", ids.next_id()?);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use davsync::models::{Credentials, StaticCredentials};
    use davsync::WebDAVConfig;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_hung_mkcol_hits_the_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("MKCOL"))
            .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let webdav = WebDAVService::new(
            WebDAVConfig::new(server.uri()),
            Arc::new(StaticCredentials(Credentials::new("", "user", "pass"))),
        )
        .unwrap();
        let coordinator = BackupCoordinator::new(webdav, Arc::new(SnowflakeGenerator::new(1).unwrap()), RetryConfig::none());

        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("journal.db");
        std::fs::write(&file, b"db").unwrap();

        let err = upload_backup(&coordinator, &file, "backup.zip", 1).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
