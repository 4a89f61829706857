use std::fmt;

/// Server location plus Basic-auth credentials.
///
/// Persisted outside this crate; the client asks a [`CredentialsProvider`]
/// for a fresh copy on every call and drops it when the call finishes.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub server_url: String,
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(
        server_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Both username and password are non-empty
    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("server_url", &self.server_url)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .finish()
    }
}

/// Source of credentials, typically backed by the app's settings store.
/// Implementations may return empty strings; callers must check.
pub trait CredentialsProvider: Send + Sync {
    fn credentials(&self) -> Credentials;
}

/// Fixed credentials, mostly useful for tests and one-shot CLI runs
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub Credentials);

impl CredentialsProvider for StaticCredentials {
    fn credentials(&self) -> Credentials {
        self.0.clone()
    }
}

/// Reads `DAVSYNC_SERVER_URL`, `DAVSYNC_USERNAME` and `DAVSYNC_PASSWORD`
/// from the environment each time it is asked
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials;

impl CredentialsProvider for EnvCredentials {
    fn credentials(&self) -> Credentials {
        let read = |key: &str| std::env::var(key).unwrap_or_default();
        Credentials {
            server_url: read("DAVSYNC_SERVER_URL"),
            username: read("DAVSYNC_USERNAME"),
            password: read("DAVSYNC_PASSWORD"),
        }
    }
}
