// WebDAV client, configuration and directory tree expansion

pub mod common;
pub mod config;
pub mod error;
pub mod service;
pub mod tree;

// Re-export main types for convenience
pub use config::{ConcurrencyConfig, WebDAVConfig};
pub use error::WebDAVError;
pub use service::WebDAVService;
pub use tree::{DirectoryLister, DirectoryTreeBuilder, TreeError};
