//! Remote usage authority for signed-in HemoCare users.

pub mod client;
pub mod wire;

pub use client::{DEFAULT_TIMEOUT, RpcUsageClient, UsageSession};

/// Errors raised while constructing a client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
