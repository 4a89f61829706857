use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

use crate::webdav_xml_parser::XmlParseError;

/// Failure of a single WebDAV operation
#[derive(Debug, Error)]
pub enum WebDAVError {
    /// Username or password is empty; no request was made
    #[error("WebDAV username and password must both be configured")]
    MissingCredentials,

    /// The file to upload does not exist; no request was made
    #[error("local file not found: {}", .0.display())]
    LocalFileMissing(PathBuf),

    #[error("invalid request URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid HTTP method {0}")]
    InvalidMethod(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{method} {url} returned HTTP {status}")]
    Status {
        method: String,
        url: String,
        status: StatusCode,
    },

    #[error("malformed PROPFIND response: {0}")]
    MalformedResponse(#[from] XmlParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WebDAVError {
    /// Caller misuse, as opposed to an environmental failure worth retrying
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::MissingCredentials | Self::LocalFileMissing(_) | Self::InvalidUrl { .. })
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_classification() {
        assert!(WebDAVError::MissingCredentials.is_precondition());
        assert!(WebDAVError::LocalFileMissing(PathBuf::from("/tmp/x")).is_precondition());

        let status = WebDAVError::Status {
            method: "PUT".to_string(),
            url: "https://cloud.example.com/dav/journal/a.zip".to_string(),
            status: StatusCode::FORBIDDEN,
        };
        assert!(!status.is_precondition());
        assert_eq!(status.status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(
            status.to_string(),
            "PUT https://cloud.example.com/dav/journal/a.zip returned HTTP 403 Forbidden"
        );
    }
}
