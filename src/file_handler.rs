//! File handle abstraction over plain, gzip and bzip2 files.
//!
//! This module provides the backends, the format detector, the line reader
//! and formatted writer built on top of them, and the public [`CFile`] handle.

pub mod backend;
pub mod bz2;
pub mod compressed;
pub mod detect;
pub mod format;
pub mod gz;
pub mod handle;
pub mod line_reader;
pub mod mode;
pub mod plain;

pub use backend::{Backend, FileBackend};
pub use detect::detect_backend;
pub use handle::CFile;
pub use line_reader::LineBuffer;
pub use mode::{Access, OpenMode};

/// The fixed set of backend variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Uncompressed file opened by path
    Plain,
    /// Uncompressed caller-supplied descriptor, never sniffed for compression
    Descriptor,
    /// Gzip stream (.gz, .tgz)
    Gzip,
    /// Bzip2 stream (.bz2, .tbz2, .tbz)
    Bzip2,
}

impl BackendKind {
    /// Get human-readable name for the backend
    pub fn name(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Descriptor => "descriptor",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
        }
    }

    /// Check if this backend reads or writes a compressed format
    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::Gzip | Self::Bzip2)
    }
}
