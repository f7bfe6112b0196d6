//! The capability set every backend implements, and the closed sum type that
//! dispatches over the four variants.
//!
//! Higher layers (line reader, formatted writer, [`CFile`](crate::CFile))
//! are written once against [`FileBackend`]. None of them knows which
//! compression library, if any, sits underneath.

use crate::config::CFileConfig;
use crate::error::{CFileError, Result};
use crate::file_handler::bz2::Bzip2Backend;
use crate::file_handler::gz::GzipBackend;
use crate::file_handler::mode::OpenMode;
use crate::file_handler::plain::StdioBackend;
use crate::file_handler::BackendKind;
use std::fmt;
use std::io;
use std::path::Path;

/// Core trait for backend file operations
///
/// The methods mirror one underlying library call each. Looping for full
/// item counts, read-ahead and error translation happen in the handle layer.
pub trait FileBackend: Send {
    /// Which variant this is
    fn kind(&self) -> BackendKind;

    /// Perform one underlying read into `buf`
    ///
    /// # Returns
    /// * Number of bytes read, possibly fewer than `buf.len()`
    /// * `Ok(0)` with a non-empty `buf` means the (decompressed) stream is
    ///   exhausted; the backend must then report [`is_eof`](Self::is_eof)
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Perform one underlying write from `buf`, returning the bytes accepted
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// True once a read attempt found the stream exhausted
    fn is_eof(&self) -> bool;

    /// Uncompressed size in bytes when known in O(1), otherwise 0
    fn size(&self) -> u64;

    /// Push buffered output to the underlying library
    fn flush(&mut self) -> io::Result<()>;

    /// Release every backend-owned resource. Called at most once by the handle.
    fn close(&mut self) -> io::Result<()>;

    /// Render `args` straight into the backend when it has a native
    /// formatted-write path
    ///
    /// # Returns
    /// * `None` when the backend has no native path and the caller must render
    ///   into a scratch buffer first
    /// * `Some(Ok(n))` with the number of bytes rendered and written
    fn write_fmt_native(&mut self, _args: fmt::Arguments<'_>) -> Option<Result<usize>> {
        None
    }

    /// Step the read position back by `count` bytes that were read ahead but
    /// never handed to the caller
    fn unread(&mut self, count: usize) -> io::Result<()> {
        if count == 0 {
            return Ok(());
        }
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("{} backend cannot reposition its stream", self.kind().name()),
        ))
    }
}

/// Write all of `buf`, retrying short writes
///
/// On failure returns the number of bytes that did reach the backend along
/// with the error.
pub(crate) fn write_fully(
    backend: &mut dyn FileBackend,
    buf: &[u8],
) -> std::result::Result<(), (usize, io::Error)> {
    let mut written = 0;
    while written < buf.len() {
        match backend.write(&buf[written..]) {
            Ok(0) => {
                return Err((
                    written,
                    io::Error::new(io::ErrorKind::WriteZero, "backend accepted no bytes"),
                ))
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err((written, e)),
        }
    }
    Ok(())
}

/// One open backend: the fixed set of variants behind [`FileBackend`]
#[derive(Debug)]
pub enum Backend {
    /// Buffered stdio on a file opened by path
    Plain(StdioBackend),
    /// Buffered stdio on a caller-supplied descriptor
    Descriptor(StdioBackend),
    /// gzip stream
    Gzip(GzipBackend),
    /// bzip2 stream
    Bzip2(Bzip2Backend),
}

impl Backend {
    /// Open `path` with the backend chosen for `kind`
    ///
    /// # Errors
    /// * `InvalidArgument` for [`BackendKind::Descriptor`], which has no path form
    /// * `InvalidMode` when the compressed backends are asked for update access
    /// * `Open` / `MalformedStream` from the selected backend
    pub fn open(
        kind: BackendKind,
        path: &Path,
        mode: &OpenMode,
        config: &CFileConfig,
    ) -> Result<Self> {
        match kind {
            BackendKind::Plain => Ok(Self::Plain(StdioBackend::open(path, mode)?)),
            BackendKind::Gzip => Ok(Self::Gzip(GzipBackend::open(
                path,
                mode,
                mode.level().unwrap_or(config.gzip_level),
            )?)),
            BackendKind::Bzip2 => Ok(Self::Bzip2(Bzip2Backend::open(
                path,
                mode,
                mode.level().unwrap_or(config.bzip2_level),
            )?)),
            BackendKind::Descriptor => Err(CFileError::invalid_argument(
                "descriptor backends are opened from a file descriptor, not a path",
            )),
        }
    }

    fn as_dyn(&self) -> &dyn FileBackend {
        match self {
            Self::Plain(b) | Self::Descriptor(b) => b,
            Self::Gzip(b) => b,
            Self::Bzip2(b) => b,
        }
    }

    fn as_dyn_mut(&mut self) -> &mut dyn FileBackend {
        match self {
            Self::Plain(b) | Self::Descriptor(b) => b,
            Self::Gzip(b) => b,
            Self::Bzip2(b) => b,
        }
    }
}

impl FileBackend for Backend {
    fn kind(&self) -> BackendKind {
        match self {
            Self::Plain(_) => BackendKind::Plain,
            Self::Descriptor(_) => BackendKind::Descriptor,
            Self::Gzip(_) => BackendKind::Gzip,
            Self::Bzip2(_) => BackendKind::Bzip2,
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.as_dyn_mut().read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.as_dyn_mut().write(buf)
    }

    fn is_eof(&self) -> bool {
        self.as_dyn().is_eof()
    }

    fn size(&self) -> u64 {
        self.as_dyn().size()
    }

    fn flush(&mut self) -> io::Result<()> {
        self.as_dyn_mut().flush()
    }

    fn close(&mut self) -> io::Result<()> {
        self.as_dyn_mut().close()
    }

    fn write_fmt_native(&mut self, args: fmt::Arguments<'_>) -> Option<Result<usize>> {
        self.as_dyn_mut().write_fmt_native(args)
    }

    fn unread(&mut self, count: usize) -> io::Result<()> {
        self.as_dyn_mut().unread(count)
    }
}
