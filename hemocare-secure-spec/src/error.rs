use thiserror::Error;

/// Result alias for store and crypto operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Result alias for decryption operations.
pub type DecryptResult<T> = core::result::Result<T, DecryptError>;

/// Result alias for remote usage operations.
pub type UsageResult<T> = core::result::Result<T, UsageError>;

/// Canonical error surface for persistence and crypto.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("key derivation error: {0}")]
    KeyDerivation(String),
    #[error("encryption error: {0}")]
    Encryption(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Reasons an envelope failed to open.
///
/// The fail-open surface collapses all of these into "absent"; the strict
/// surface hands them to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecryptError {
    #[error("envelope is not valid base64: {0}")]
    Encoding(String),
    #[error("envelope too short: {len} bytes")]
    Truncated { len: usize },
    #[error("message authentication failed")]
    MacMismatch,
    #[error("decrypted payload is not valid: {0}")]
    Payload(String),
    #[error("key derivation error: {0}")]
    KeyDerivation(String),
}

/// Failures talking to the remote usage authority.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("no authenticated session")]
    NoSession,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend returned {status}: {message}")]
    Backend { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl UsageError {
    /// Short label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            UsageError::NoSession => "no_session",
            UsageError::Transport(_) => "transport",
            UsageError::Backend { .. } => "backend",
            UsageError::InvalidResponse(_) => "invalid_response",
        }
    }
}
