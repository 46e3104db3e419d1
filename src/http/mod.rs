mod client;
mod credentials;
mod fetcher;
pub mod retry;

pub use client::{into_status_error, read_json, HttpClient};
pub use credentials::{is_fatal, Credential, CredentialProvider, TokenResponse, TOKEN_PREFIX};
pub use fetcher::RemoteFlagFetcher;
pub use retry::RetryPolicy;
