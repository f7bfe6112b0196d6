//! # cfile - Transparent plain, gzip and bzip2 file handles
//!
//! One handle type for reading and writing uncompressed, gzip and bzip2 files.
//! The format is chosen from the file name at open time; everything after
//! that (binary reads and writes, line reading, formatted output, flushing,
//! closing) works the same on every backend.
//!
//! ## Features
//!
//! - **Suffix detection**: `.gz`/`.tgz` open as gzip, `.bz2`/`.tbz2`/`.tbz` as bzip2
//! - **Unbounded lines**: [`CFile::getline`] reads lines of any length with
//!   amortized buffer growth
//! - **Formatted output**: [`cfprintf!`] renders once and writes through any backend
//! - **Ownership contexts**: every handle belongs to a [`Context`]; tearing a
//!   context down closes its whole subtree
//!
//! ## Architecture
//!
//! - [`error`] - Error type and classification
//! - [`config`] - Buffer sizes and default compression levels
//! - [`context`] - The ownership tree
//! - [`file_handler`] - Backends, detection, line reading and the handle itself

pub mod config;
pub mod context;
pub mod error;
pub mod file_handler;

// Re-export commonly used types for convenience
pub use config::CFileConfig;
pub use context::Context;
pub use error::{CFileError, ErrorKind, Result};
pub use file_handler::{detect_backend, BackendKind, CFile, LineBuffer, OpenMode};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
