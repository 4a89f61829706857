//! WebDAV backup synchronization for journal records.
//!
//! - [`webdav_xml_parser`] turns PROPFIND multistatus bodies into [`models::RemoteEntry`] values
//! - [`services::webdav`] lists, creates, uploads and downloads against the server and
//!   expands listings into trees
//! - [`services::id_generator`] issues time-ordered 64-bit ids for new records
//! - [`services::backup_coordinator`] decides between local and remote copies

pub mod config;
pub mod models;
pub mod services;
pub mod webdav_xml_parser;


pub use config::Config;
pub use models::{Credentials, CredentialsProvider, RemoteEntry};
pub use services::backup_coordinator::{BackupCoordinator, BackupDecision, RetryConfig};
pub use services::id_generator::{ClockRewindError, SnowflakeGenerator, SnowflakeId};
pub use services::webdav::{DirectoryTreeBuilder, WebDAVConfig, WebDAVError, WebDAVService};
