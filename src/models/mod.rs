// Re-export model types for ease of use

pub mod credentials;
pub mod remote_entry;

pub use credentials::{Credentials, CredentialsProvider, EnvCredentials, StaticCredentials};
pub use remote_entry::{contents, EntryKind, RemoteEntry};
