// Error model shared by the client, the path resolver and the bulk
// commands. The binary wraps these in `anyhow` at the edges; the library
// keeps them typed so batch code can attribute a failure to a row.

use reqwest::StatusCode;
use thiserror::Error;

/// Result type used across the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The request never produced a response (connection refused, timeout...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-2xx status we do not map further.
    #[error("{method} {path} returned {status}: {body}")]
    Status {
        method: String,
        path: String,
        status: StatusCode,
        body: String,
    },

    /// Bad or expired credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A resource addressed by id (or a tag addressed by name) does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// A location path could not be walked to the end.
    #[error("location '{segment}' not found {}", under(.prefix))]
    PathNotFound { segment: String, prefix: String },

    /// Following parent links from this location never reached a root.
    #[error("cycle detected in the parent chain of location '{0}'")]
    CycleDetected(String),

    /// Malformed input: a CSV row, a CLI value or a server payload.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Turn a 404 on an addressed resource into `NotFound`; anything else is
    /// returned untouched.
    pub fn or_not_found(self, kind: &'static str, id: &str) -> Self {
        match self {
            Self::Status { status, .. } if status == StatusCode::NOT_FOUND => {
                Self::not_found(kind, id)
            }
            other => other,
        }
    }

    /// True for both flavours of "does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::PathNotFound { .. })
    }
}

fn under(prefix: &str) -> String {
    if prefix.is_empty() {
        "among root locations".to_string()
    } else {
        format!("under '{prefix}'")
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
