//! Error types for zimport.
//!
//! Library crates use [`ZimportError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::fmt;
use std::path::PathBuf;

/// Top-level error type for all zimport operations.
#[derive(Debug, thiserror::Error)]
pub enum ZimportError {
    /// No usable archive was supplied (empty path, missing file).
    #[error("missing input: {message}")]
    MissingInput { message: String },

    /// The content-server executable is not where we expect it.
    #[error("content server binary not found at {path:?}")]
    BinaryNotFound { path: PathBuf },

    /// The content server could not be spawned or exited during startup.
    #[error("content server failed to launch: {message}")]
    LaunchFailed { message: String },

    /// The content server never answered the readiness probe.
    #[error("content server on port {port} not ready after {waited_ms} ms")]
    ReadinessTimeout { port: u16, waited_ms: u64 },

    /// Retrieving a page from the content server failed.
    #[error("fetch of {url} failed: {failure}")]
    Fetch { url: String, failure: FetchFailure },

    /// Another export is already running on this pipeline.
    #[error("an export is already in progress")]
    Busy,

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Export document serialization error.
    #[error("serialization error: {0}")]
    Serialize(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Why a single page fetch failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// Nothing is listening on the port.
    ConnectionRefused,
    /// The server answered with a non-2xx status.
    Status(u16),
    /// Any other transport-level error (timeout, reset, body decode).
    Transport(String),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionRefused => write!(f, "connection refused"),
            Self::Status(code) => write!(f, "HTTP {code}"),
            Self::Transport(msg) => write!(f, "{msg}"),
        }
    }
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ZimportError>;

impl ZimportError {
    /// Create a missing-input error from any displayable message.
    pub fn missing_input(msg: impl Into<String>) -> Self {
        Self::MissingInput {
            message: msg.into(),
        }
    }

    /// Create a launch error from any displayable message.
    pub fn launch(msg: impl Into<String>) -> Self {
        Self::LaunchFailed {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a fetch error for `url`.
    pub fn fetch(url: impl Into<String>, failure: FetchFailure) -> Self {
        Self::Fetch {
            url: url.into(),
            failure,
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short, stable label for the failure class (used in logs and run summaries).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingInput { .. } => "missing_input",
            Self::BinaryNotFound { .. } => "binary_not_found",
            Self::LaunchFailed { .. } => "launch_failed",
            Self::ReadinessTimeout { .. } => "readiness_timeout",
            Self::Fetch { .. } => "fetch_failed",
            Self::Busy => "busy",
            Self::Config { .. } => "config",
            Self::Serialize(_) | Self::Io { .. } => "write_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ZimportError::missing_input("no archive selected");
        assert_eq!(err.to_string(), "missing input: no archive selected");

        let err = ZimportError::fetch("http://localhost:8080/sample", FetchFailure::Status(404));
        assert_eq!(
            err.to_string(),
            "fetch of http://localhost:8080/sample failed: HTTP 404"
        );

        let err = ZimportError::ReadinessTimeout {
            port: 8080,
            waited_ms: 5000,
        };
        assert!(err.to_string().contains("port 8080"));
    }

    #[test]
    fn kinds_group_write_failures() {
        let io = ZimportError::io("/tmp/x", std::io::Error::other("disk full"));
        assert_eq!(io.kind(), "write_failed");
        assert_eq!(ZimportError::Serialize("bad".into()).kind(), "write_failed");
        assert_eq!(ZimportError::Busy.kind(), "busy");
    }
}
