//! Common utilities and shared functions for WebDAV requests
use base64ct::{Base64, Encoding};
use reqwest::Method;

use super::error::WebDAVError;

/// Build the User-Agent string sent with every WebDAV request
pub fn build_user_agent() -> String {
    format!("davsync/{} (WebDAV-Backup)", env!("CARGO_PKG_VERSION"))
}

/// `Basic base64(username:password)` for the Authorization header
pub fn basic_auth_header(username: &str, password: &str) -> String {
    let token = Base64::encode_string(format!("{}:{}", username, password).as_bytes());
    format!("Basic {}", token)
}

/// Extension methods such as PROPFIND and MKCOL are not predefined in `http`
pub fn dav_method(name: &str) -> Result<Method, WebDAVError> {
    Method::from_bytes(name.as_bytes())
        .map_err(|e| WebDAVError::InvalidMethod(format!("{}: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_format() {
        let user_agent = build_user_agent();
        assert!(user_agent.starts_with("davsync/"));
        assert!(user_agent.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_basic_auth_header() {
        assert_eq!(basic_auth_header("user", "pass"), "Basic dXNlcjpwYXNz");
        // Colons in the password are kept verbatim
        assert_eq!(basic_auth_header("alice", "a:b"), "Basic YWxpY2U6YTpi");
    }

    #[test]
    fn test_dav_methods() {
        assert_eq!(dav_method("PROPFIND").unwrap().as_str(), "PROPFIND");
        assert_eq!(dav_method("MKCOL").unwrap().as_str(), "MKCOL");
        assert!(dav_method("BAD METHOD").is_err());
    }
}
