//! Error types and handling infrastructure for cfile.
//!
//! Every backend reports failure differently (stdio short counts, zlib
//! status codes, bzip2 stream errors). This module folds all of them into one
//! `thiserror` enum so callers only ever check a `Result`.
//!
//! ## Design Principles
//!
//! - **One representation**: backend-specific signals become a `CFileError`
//! - **Context preservation**: paths and partial item counts travel with the error
//! - **Classification**: [`CFileError::kind`] maps every variant onto a small taxonomy

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for cfile operations.
#[derive(Error, Debug)]
pub enum CFileError {
    /// Opening a path failed (missing file, permission denied, ...)
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A compressed file did not start with the expected stream header
    #[error("Malformed {format} stream: {path}")]
    MalformedStream { path: PathBuf, format: &'static str },

    /// The open mode string could not be parsed or is not valid for the backend
    #[error("Invalid open mode {mode:?}: {reason}")]
    InvalidMode { mode: String, reason: String },

    /// A caller-supplied argument was unusable (zero item size, empty buffer)
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Reading stopped early because the backend failed
    #[error("Read failed after {items} item(s): {source}")]
    ShortRead {
        items: usize,
        #[source]
        source: std::io::Error,
    },

    /// Writing stopped early because the backend failed
    #[error("Write failed after {items} item(s): {source}")]
    ShortWrite {
        items: usize,
        #[source]
        source: std::io::Error,
    },

    /// Rendering formatted output failed
    #[error("Formatted write failed: {message}")]
    Format { message: String },

    /// Flushing buffered output failed
    #[error("Flush failed: {source}")]
    Flush {
        #[source]
        source: std::io::Error,
    },

    /// The underlying close call failed
    #[error("Close failed for {path}: {source}")]
    Close {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The handle was already closed, directly or by its context
    #[error("File handle is closed: {path}")]
    Closed { path: PathBuf },

    /// The ownership context was torn down and accepts no new handles
    #[error("Context '{name}' has been torn down")]
    ContextClosed { name: String },

    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Generic I/O failure without a more specific variant
    #[error("I/O operation failed: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Standard Result type for cfile operations.
pub type Result<T> = std::result::Result<T, CFileError>;

/// Coarse classification of a [`CFileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing file, permission denial, malformed compressed header
    OpenFailure,
    /// Partial read or write caused by a backend failure
    ShortIo,
    /// Formatted output could not be rendered or written
    FormatFailure,
    /// Flush or close reported failure
    CloseFailure,
    /// Operation attempted on a closed handle or torn-down context
    UseAfterClose,
    /// Bad mode string, argument or configuration
    InvalidInput,
    /// Anything else
    Other,
}

impl CFileError {
    /// Create an Open error for `path`
    pub fn open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Open {
            path: path.into(),
            source,
        }
    }

    /// Create an InvalidMode error
    pub fn invalid_mode(mode: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMode {
            mode: mode.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidArgument error with a descriptive message
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a Format error with a descriptive message
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Create a Config error with a descriptive message
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a generic Io error with context
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Open { .. } | Self::MalformedStream { .. } => ErrorKind::OpenFailure,
            Self::ShortRead { .. } | Self::ShortWrite { .. } => ErrorKind::ShortIo,
            Self::Format { .. } => ErrorKind::FormatFailure,
            Self::Flush { .. } | Self::Close { .. } => ErrorKind::CloseFailure,
            Self::Closed { .. } | Self::ContextClosed { .. } => ErrorKind::UseAfterClose,
            Self::InvalidMode { .. } | Self::InvalidArgument { .. } | Self::Config { .. } => {
                ErrorKind::InvalidInput
            }
            Self::Io { .. } => ErrorKind::Other,
        }
    }
}

// Automatic conversion from io::Error for call sites without better context
impl From<std::io::Error> for CFileError {
    fn from(err: std::io::Error) -> Self {
        let message = match err.kind() {
            std::io::ErrorKind::NotFound => "File not found",
            std::io::ErrorKind::PermissionDenied => "Permission denied",
            _ => "IO operation failed",
        };
        Self::Io {
            message: message.to_string(),
            source: err,
        }
    }
}

/// Convert a `CFileError` back into an `io::Error`, for the `Read`/`Write` impls
impl From<CFileError> for std::io::Error {
    fn from(err: CFileError) -> Self {
        match err {
            CFileError::ShortRead { source, .. }
            | CFileError::ShortWrite { source, .. }
            | CFileError::Flush { source }
            | CFileError::Io { source, .. } => source,
            other => {
                let kind = match other.kind() {
                    ErrorKind::UseAfterClose => std::io::ErrorKind::BrokenPipe,
                    ErrorKind::InvalidInput => std::io::ErrorKind::InvalidInput,
                    _ => std::io::ErrorKind::Other,
                };
                std::io::Error::new(kind, other)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let closed = CFileError::Closed {
            path: PathBuf::from("/tmp/data.gz"),
        };
        assert_eq!(closed.to_string(), "File handle is closed: /tmp/data.gz");

        let malformed = CFileError::MalformedStream {
            path: PathBuf::from("x.bz2"),
            format: "bzip2",
        };
        assert_eq!(malformed.to_string(), "Malformed bzip2 stream: x.bz2");

        let mode = CFileError::invalid_mode("q", "unknown access mode");
        assert_eq!(
            mode.to_string(),
            "Invalid open mode \"q\": unknown access mode"
        );
    }

    #[test]
    fn test_error_kinds() {
        let io = || std::io::Error::new(std::io::ErrorKind::Other, "boom");

        assert_eq!(CFileError::open("a", io()).kind(), ErrorKind::OpenFailure);
        assert_eq!(
            CFileError::ShortWrite { items: 2, source: io() }.kind(),
            ErrorKind::ShortIo
        );
        assert_eq!(CFileError::format("bad").kind(), ErrorKind::FormatFailure);
        assert_eq!(
            CFileError::Close {
                path: PathBuf::from("a"),
                source: io()
            }
            .kind(),
            ErrorKind::CloseFailure
        );
        assert_eq!(
            CFileError::ContextClosed {
                name: "root".into()
            }
            .kind(),
            ErrorKind::UseAfterClose
        );
        assert_eq!(
            CFileError::invalid_argument("zero").kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: CFileError = io_err.into();

        match err {
            CFileError::Io { message, .. } => {
                assert_eq!(message, "File not found");
            }
            _ => panic!("Expected Io variant"),
        }
    }

    #[test]
    fn test_back_to_io_error_keeps_source_kind() {
        let err = CFileError::ShortRead {
            items: 0,
            source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof"),
        };
        let io: std::io::Error = err.into();
        assert_eq!(io.kind(), std::io::ErrorKind::UnexpectedEof);

        let closed: std::io::Error = CFileError::Closed {
            path: PathBuf::from("f"),
        }
        .into();
        assert_eq!(closed.kind(), std::io::ErrorKind::BrokenPipe);
    }
}
