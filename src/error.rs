//! Typed failures for everything that talks to a node or the document store.
//!
//! Fetchers never let these escape past a [`crate::resource::Resource`]: the
//! message ends up in the cache entry, and the [`ErrorKind`] decides whether
//! the failure is retried and whether it is reported.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("http {0}")]
    Http(u16),
    #[error("rpc {code} {message}")]
    Rpc { code: i64, message: String },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Invalid(String),
    #[error("unexpected payload: {0}")]
    Decode(String),
    #[error("store error: {0}")]
    Store(String),
}

/// Coarse classification used by the UI layer and the error reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    NotFound,
    Invalid,
    Unexpected,
}

// Malformed request, unknown method, bad params, block not available, slot
// skipped, long-term storage miss, tx history disabled.
const NON_TRANSIENT_RPC_CODES: [i64; 7] = [-32600, -32601, -32602, -32004, -32007, -32009, -32011];

impl FetchError {
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport(_) | FetchError::Timeout => true,
            FetchError::Http(status) => matches!(status, 429 | 500 | 502 | 503 | 504),
            FetchError::Rpc { code, .. } => !NON_TRANSIENT_RPC_CODES.contains(code),
            _ => false,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::NotFound(_) => ErrorKind::NotFound,
            FetchError::Invalid(_) => ErrorKind::Invalid,
            e if e.is_transient() => ErrorKind::Transient,
            _ => ErrorKind::Unexpected,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        FetchError::NotFound(what.into())
    }

    pub fn invalid(what: impl Into<String>) -> Self {
        FetchError::Invalid(what.into())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::Http(status.as_u16())
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Decode(e.to_string())
    }
}

#[cfg(feature = "native")]
impl From<rusqlite::Error> for FetchError {
    fn from(e: rusqlite::Error) -> Self {
        FetchError::Store(e.to_string())
    }
}

pub type FetchResult<T> = Result<T, FetchError>;
