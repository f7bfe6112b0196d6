//! The public file handle.
//!
//! A [`CFile`] owns its read-ahead state and scratch buffers. The backend
//! itself lives in a slot shared with the owning [`Context`], so a context
//! teardown can close it while the caller still holds the handle; every later
//! operation then fails with `CFileError::Closed`.

use crate::context::{Context, WeakNode};
use crate::error::{CFileError, Result};
use crate::file_handler::backend::{write_fully, Backend, FileBackend};
use crate::file_handler::detect::detect_backend;
use crate::file_handler::format::{write_formatted, FormatBuffer};
use crate::file_handler::line_reader::{LineBuffer, ReadAhead};
use crate::file_handler::mode::OpenMode;
use crate::file_handler::BackendKind;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

/// Backend storage shared between a handle and its context
#[derive(Debug)]
pub(crate) struct HandleSlot {
    /// `None` once closed; closing is terminal
    backend: Option<Backend>,
    path: PathBuf,
    owner: WeakNode,
}

pub(crate) type SlotRef = Arc<Mutex<HandleSlot>>;

impl HandleSlot {
    pub(crate) fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Forget the owning context without touching its registry
    pub(crate) fn release_owner(&mut self) -> WeakNode {
        std::mem::take(&mut self.owner)
    }

    /// Close the backend. A second call does nothing.
    pub(crate) fn close(&mut self) -> Result<()> {
        let Some(mut backend) = self.backend.take() else {
            return Ok(());
        };
        log::debug!("closing {} ({})", self.path.display(), backend.kind().name());
        backend.close().map_err(|source| CFileError::Close {
            path: self.path.clone(),
            source,
        })
    }
}

/// Last transfer direction, used to keep update-mode streams consistent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Idle,
    Reading,
    Writing,
}

/// Handle-local state that never needs the slot lock
#[derive(Debug)]
struct HandleIo {
    read_ahead: ReadAhead,
    line: LineBuffer,
    format: FormatBuffer,
    direction: Direction,
    /// Only update-mode streams hand read-ahead back before writing
    update: bool,
}

impl HandleIo {
    /// Prepare the stream for reading after a write
    fn begin_read(&mut self, backend: &mut dyn FileBackend) -> Result<()> {
        if self.direction == Direction::Writing {
            backend.flush().map_err(|source| CFileError::Flush { source })?;
        }
        self.direction = Direction::Reading;
        Ok(())
    }

    /// Prepare the stream for writing after a read
    fn begin_write(&mut self, backend: &mut dyn FileBackend) -> Result<()> {
        if self.direction == Direction::Reading && self.update {
            self.read_ahead
                .discard(backend)
                .map_err(|e| CFileError::io("cannot switch from reading to writing", e))?;
        }
        self.direction = Direction::Writing;
        Ok(())
    }
}

/// An open plain, descriptor, gzip or bzip2 file
#[derive(Debug)]
pub struct CFile {
    slot: SlotRef,
    path: PathBuf,
    kind: BackendKind,
    mode: OpenMode,
    io: HandleIo,
}

/// Lock the slot and hand out its backend, or fail if the handle is closed
fn lock_backend<'a>(slot: &'a SlotRef, path: &Path) -> Result<MappedMutexGuard<'a, Backend>> {
    MutexGuard::try_map(slot.lock(), |s| s.backend.as_mut()).map_err(|_| CFileError::Closed {
        path: path.to_path_buf(),
    })
}

fn check_item_size(len: usize, item_size: usize) -> Result<usize> {
    if item_size == 0 {
        return Err(CFileError::invalid_argument("item size must be non-zero"));
    }
    if len % item_size != 0 {
        return Err(CFileError::invalid_argument(format!(
            "buffer of {len} bytes is not a whole number of {item_size}-byte items"
        )));
    }
    Ok(len / item_size)
}

impl CFile {
    /// Open `path`, choosing the backend from its suffix
    ///
    /// # Arguments
    /// * `ctx` - Context the handle is registered under
    /// * `path` - File to open; `.gz`/`.tgz` select gzip, `.bz2`/`.tbz2`/`.tbz` bzip2
    /// * `mode` - `fopen(3)`-style mode string, see [`OpenMode`]
    ///
    /// # Errors
    /// * `InvalidMode` for an unparsable mode or update access on a compressed file
    /// * `Open` when the file cannot be opened
    /// * `MalformedStream` when a compressed file has the wrong header
    /// * `ContextClosed` when `ctx` has been torn down
    pub fn open(ctx: &Context, path: impl AsRef<Path>, mode: &str) -> Result<Self> {
        let path = path.as_ref();
        let mode = OpenMode::parse(mode)?;
        ctx.ensure_open()?;

        let kind = detect_backend(path);
        let config = ctx.config();
        let backend = Backend::open(kind, path, &mode, &config)?;
        log::debug!("opened {} as {} with mode {}", path.display(), kind.name(), mode);
        Self::register(ctx, backend, path.to_path_buf(), mode)
    }

    /// Adopt an already open descriptor as an uncompressed handle
    ///
    /// No compression sniffing is done. The handle takes ownership of the
    /// descriptor and closes it when the handle is closed.
    #[cfg(unix)]
    pub fn dopen(ctx: &Context, fd: impl Into<std::os::fd::OwnedFd>, mode: &str) -> Result<Self> {
        use crate::file_handler::plain::StdioBackend;
        use std::os::fd::AsRawFd;

        let mode = OpenMode::parse(mode)?;
        let fd = fd.into();
        ctx.ensure_open()?;

        let label = PathBuf::from(format!("fd:{}", fd.as_raw_fd()));
        let backend = Backend::Descriptor(StdioBackend::from_file(std::fs::File::from(fd), &mode));
        log::debug!("adopted {} with mode {}", label.display(), mode);
        Self::register(ctx, backend, label, mode)
    }

    fn register(ctx: &Context, backend: Backend, path: PathBuf, mode: OpenMode) -> Result<Self> {
        let kind = backend.kind();
        let slot = Arc::new(Mutex::new(HandleSlot {
            backend: Some(backend),
            path: path.clone(),
            owner: ctx.downgrade(),
        }));

        if let Err(e) = ctx.register(&slot) {
            // Lost a race with teardown; release the backend again
            if let Err(close_err) = slot.lock().close() {
                log::warn!(
                    "failed to close {} after refused registration: {}",
                    path.display(),
                    close_err
                );
            }
            return Err(e);
        }

        let config = ctx.config();
        let update = mode.is_update();
        Ok(Self {
            slot,
            path,
            kind,
            mode,
            io: HandleIo {
                read_ahead: ReadAhead::new(config.read_chunk_size),
                line: LineBuffer::with_capacity(
                    config.line_buffer_capacity,
                    config.line_grow_threshold,
                ),
                format: FormatBuffer::with_capacity(config.format_buffer_capacity),
                direction: Direction::Idle,
                update,
            },
        })
    }

    /// Read whole items of `item_size` bytes into `buf`
    ///
    /// `buf.len()` must be a multiple of `item_size`. No endianness
    /// conversion is done.
    ///
    /// # Returns
    /// * Number of whole items read. A short count means end-of-file; use
    ///   [`is_eof`](Self::is_eof) to confirm.
    ///
    /// # Errors
    /// * `ShortRead` carrying the items completed when the backend fails
    /// * `Closed` on a closed handle
    pub fn read(&mut self, buf: &mut [u8], item_size: usize) -> Result<usize> {
        let count = check_item_size(buf.len(), item_size)?;
        let mut backend = lock_backend(&self.slot, &self.path)?;
        self.io.begin_read(&mut *backend)?;

        match self.io.read_ahead.read(&mut *backend, buf) {
            Ok(n) => {
                debug_assert!(n / item_size <= count);
                Ok(n / item_size)
            }
            Err((n, source)) => Err(CFileError::ShortRead {
                items: n / item_size,
                source,
            }),
        }
    }

    /// Write whole items of `item_size` bytes from `buf`
    ///
    /// # Returns
    /// * Number of items written, always all of them on success
    ///
    /// # Errors
    /// * `ShortWrite` carrying the items completed when the backend fails
    /// * `Closed` on a closed handle
    pub fn write(&mut self, buf: &[u8], item_size: usize) -> Result<usize> {
        let count = check_item_size(buf.len(), item_size)?;
        let mut backend = lock_backend(&self.slot, &self.path)?;
        self.io.begin_write(&mut *backend)?;

        write_fully(&mut *backend, buf).map_err(|(n, source)| CFileError::ShortWrite {
            items: n / item_size,
            source,
        })?;
        Ok(count)
    }

    /// Read one line into a fixed buffer, `fgets(3)` style
    ///
    /// At most `buf.len() - 1` bytes are stored, followed by a NUL byte. A
    /// newline, if read, is kept. A longer line is split across calls.
    ///
    /// # Returns
    /// * `Some(n)` with the bytes stored before the terminator
    /// * `None` at end-of-file with nothing read
    pub fn gets(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        if buf.is_empty() {
            return Err(CFileError::invalid_argument("line buffer must not be empty"));
        }
        let mut backend = lock_backend(&self.slot, &self.path)?;
        self.io.begin_read(&mut *backend)?;

        self.io
            .read_ahead
            .read_line_bounded(&mut *backend, buf)
            .map_err(|source| CFileError::ShortRead { items: 0, source })
    }

    /// Read one line of any length into the handle's own growable buffer
    ///
    /// # Returns
    /// * `Some(line)` including the trailing newline when present
    /// * `None` at end-of-file with nothing read
    pub fn getline(&mut self) -> Result<Option<&[u8]>> {
        let mut backend = lock_backend(&self.slot, &self.path)?;
        self.io.begin_read(&mut *backend)?;

        let read_any = self
            .io
            .read_ahead
            .read_line(&mut *backend, &mut self.io.line)
            .map_err(|source| CFileError::ShortRead {
                items: self.io.line.len(),
                source,
            })?;
        drop(backend);

        Ok(read_any.then(|| self.io.line.as_bytes()))
    }

    /// Read one line of any length into a caller-owned buffer
    ///
    /// # Returns
    /// * `true` if anything was read, `false` at end-of-file
    pub fn getline_into(&mut self, line: &mut LineBuffer) -> Result<bool> {
        let mut backend = lock_backend(&self.slot, &self.path)?;
        self.io.begin_read(&mut *backend)?;

        self.io
            .read_ahead
            .read_line(&mut *backend, line)
            .map_err(|source| CFileError::ShortRead {
                items: line.len(),
                source,
            })
    }

    /// Write formatted output from an already captured argument list
    ///
    /// This is the entry point for wrappers; most callers use
    /// [`cfprintf!`](crate::cfprintf).
    ///
    /// # Returns
    /// * Number of bytes rendered
    pub fn vprintf(&mut self, args: fmt::Arguments<'_>) -> Result<usize> {
        let mut backend = lock_backend(&self.slot, &self.path)?;
        self.io.begin_write(&mut *backend)?;
        write_formatted(&mut *backend, &mut self.io.format, args)
    }

    /// Flush buffered output
    pub fn flush(&mut self) -> Result<()> {
        let mut backend = lock_backend(&self.slot, &self.path)?;
        backend.flush().map_err(|source| CFileError::Flush { source })
    }

    /// Close the handle and unregister it from its context
    ///
    /// Closing an already closed handle (including one closed by a context
    /// teardown) is a no-op that returns `Ok(())`.
    pub fn close(&mut self) -> Result<()> {
        let (result, owner) = {
            let mut slot = self.slot.lock();
            if !slot.is_open() {
                return Ok(());
            }
            let result = slot.close();
            (result, slot.release_owner())
        };

        if let Some(node) = owner.upgrade() {
            node.lock().unregister(&self.slot);
        }
        result
    }

    /// Size of the uncompressed data in bytes, or 0 when it cannot be known
    /// cheaply (always the case for gzip and bzip2)
    pub fn size(&self) -> Result<u64> {
        let backend = lock_backend(&self.slot, &self.path)?;
        Ok(backend.size())
    }

    /// True once a read found nothing left. False straight after open.
    pub fn is_eof(&self) -> Result<bool> {
        let backend = lock_backend(&self.slot, &self.path)?;
        Ok(self.io.read_ahead.pending() == 0 && backend.is_eof())
    }

    pub fn is_closed(&self) -> bool {
        !self.slot.lock().is_open()
    }

    /// Move this handle under another context
    ///
    /// # Errors
    /// * `ContextClosed` if `ctx` has been torn down
    /// * `Closed` if the handle is closed
    pub fn reparent(&mut self, ctx: &Context) -> Result<()> {
        if self.is_closed() {
            return Err(CFileError::Closed {
                path: self.path.clone(),
            });
        }
        let target = ctx.downgrade();
        if Weak::ptr_eq(&self.slot.lock().owner, &target) {
            return Ok(());
        }
        ctx.register(&self.slot)?;

        let previous = std::mem::replace(&mut self.slot.lock().owner, target);
        if let Some(node) = previous.upgrade() {
            node.lock().unregister(&self.slot);
        }
        log::debug!("moved {} to context '{}'", self.path.display(), ctx.name());
        Ok(())
    }

    /// Name of the owning context, if the handle is still registered
    pub fn context_name(&self) -> Option<String> {
        let owner = self.slot.lock().owner.upgrade()?;
        let name = owner.lock().name().to_string();
        Some(name)
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn mode(&self) -> &OpenMode {
        &self.mode
    }

    /// The path given at open, or `fd:N` for descriptors
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CFile {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("failed to close {} on drop: {}", self.path.display(), e);
        }
    }
}

impl io::Read for CFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        CFile::read(self, buf, 1).map_err(io::Error::from)
    }
}

impl io::Write for CFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        CFile::write(self, buf, 1).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        CFile::flush(self).map_err(io::Error::from)
    }
}

/// Write formatted output to a [`CFile`], `fprintf(3)` style
///
/// Expands to [`CFile::vprintf`] with the arguments captured by
/// `format_args!`, and returns `Result<usize>` with the bytes rendered.
#[macro_export]
macro_rules! cfprintf {
    ($file:expr, $($arg:tt)*) => {
        $file.vprintf(::std::format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::{Read, Write};
    use tempfile::TempDir;

    #[test]
    fn test_plain_round_trip_and_size() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::new("test");
        let path = dir.path().join("records.bin");

        let records: Vec<u8> = (0..40u8).collect();
        let mut out = ctx.open(&path, "wb").unwrap();
        assert_eq!(out.write(&records, 8).unwrap(), 5);
        out.close().unwrap();

        let mut input = ctx.open(&path, "rb").unwrap();
        assert_eq!(input.size().unwrap(), 40);
        let mut buf = vec![0u8; 48];
        assert_eq!(input.read(&mut buf, 8).unwrap(), 5);
        assert_eq!(&buf[..40], &records[..]);
        assert!(input.is_eof().unwrap());
    }

    #[test]
    fn test_eof_only_after_short_read() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::new("test");
        let path = dir.path().join("four.bin");
        std::fs::write(&path, [1u8, 2, 3, 4]).unwrap();

        let mut file = ctx.open(&path, "r").unwrap();
        assert!(!file.is_eof().unwrap());

        let mut buf = [0u8; 4];
        assert_eq!(file.read(&mut buf, 4).unwrap(), 1);
        assert!(!file.is_eof().unwrap());

        assert_eq!(file.read(&mut buf, 4).unwrap(), 0);
        assert!(file.is_eof().unwrap());
    }

    #[test]
    fn test_item_size_validation() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::new("test");
        let mut file = ctx.open(dir.path().join("x.bin"), "w").unwrap();

        assert!(matches!(
            file.write(b"abc", 0),
            Err(CFileError::InvalidArgument { .. })
        ));
        assert!(matches!(
            file.write(b"abc", 2),
            Err(CFileError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_double_close_is_noop() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::new("test");
        let mut file = ctx.open(dir.path().join("twice.gz"), "w").unwrap();

        file.close().unwrap();
        assert!(file.is_closed());
        file.close().unwrap();
        assert!(matches!(file.size(), Err(CFileError::Closed { .. })));
        assert!(matches!(file.getline(), Err(CFileError::Closed { .. })));
    }

    #[test]
    fn test_getline_and_gets_share_read_ahead() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::new("test");
        let path = dir.path().join("lines.txt");
        std::fs::write(&path, "first line\nsecond\n").unwrap();

        let mut file = ctx.open(&path, "r").unwrap();
        let mut small = [0u8; 6];
        assert_eq!(file.gets(&mut small).unwrap(), Some(5));
        assert_eq!(&small, b"first\0");
        assert_eq!(file.getline().unwrap(), Some(&b" line\n"[..]));
        assert_eq!(file.getline().unwrap(), Some(&b"second\n"[..]));
        assert_eq!(file.getline().unwrap(), None);
        assert!(file.is_eof().unwrap());
    }

    #[test]
    fn test_update_mode_write_after_read() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::new("test");
        let path = dir.path().join("update.txt");
        std::fs::write(&path, "key=old\nrest\n").unwrap();

        let mut file = ctx.open(&path, "r+").unwrap();
        let mut key = [0u8; 4];
        assert_eq!(file.read(&mut key, 1).unwrap(), 4);
        assert_eq!(&key, b"key=");
        cfprintf!(file, "new").unwrap();
        file.close().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "key=new\nrest\n");
    }

    #[test]
    fn test_write_on_reader_fails_the_same_after_reading() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::new("test");
        let path = dir.path().join("read_only.gz");
        let mut out = ctx.open(&path, "w").unwrap();
        cfprintf!(out, "one\ntwo\n").unwrap();
        out.close().unwrap();

        let mut fresh = ctx.open(&path, "r").unwrap();
        let before = fresh.write(b"x", 1).unwrap_err();

        let mut used = ctx.open(&path, "r").unwrap();
        assert_eq!(used.getline().unwrap(), Some(&b"one\n"[..]));
        let after = used.write(b"x", 1).unwrap_err();

        assert_eq!(before.kind(), ErrorKind::ShortIo);
        assert_eq!(after.kind(), ErrorKind::ShortIo);
        // The failed write left the pending line intact
        assert_eq!(used.getline().unwrap(), Some(&b"two\n"[..]));
    }

    #[test]
    fn test_printf_matches_across_backends() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::new("test");

        for name in ["out.txt", "out.gz", "out.bz2"] {
            let path = dir.path().join(name);
            let mut file = ctx.open(&path, "w").unwrap();
            let n = cfprintf!(file, "{:>4}|{:<6}|{:08.3}\n", 7, "ab", -3.14159).unwrap();
            assert_eq!(n, 21);
            file.close().unwrap();

            let mut file = ctx.open(&path, "r").unwrap();
            assert_eq!(
                file.getline().unwrap(),
                Some(&b"   7|ab    |-003.142\n"[..]),
                "backend {name}"
            );
        }
    }

    #[test]
    fn test_io_traits() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::new("test");
        let path = dir.path().join("traits.bz2");

        let mut out = ctx.open(&path, "w").unwrap();
        writeln!(out, "via io::Write {}", 1).unwrap();
        drop(out);

        let mut input = ctx.open(&path, "r").unwrap();
        let mut text = String::new();
        input.read_to_string(&mut text).unwrap();
        assert_eq!(text, "via io::Write 1\n");
    }

    #[test]
    fn test_reparent_moves_registration() {
        let dir = TempDir::new().unwrap();
        let first = Context::new("first");
        let second = Context::new("second");
        let mut file = first.open(dir.path().join("moved.txt"), "w").unwrap();
        assert_eq!(file.context_name().as_deref(), Some("first"));

        file.reparent(&second).unwrap();
        assert_eq!(first.handle_count(), 0);
        assert_eq!(second.handle_count(), 1);
        assert_eq!(file.context_name().as_deref(), Some("second"));

        first.teardown().unwrap();
        assert!(!file.is_closed());
        second.teardown().unwrap();
        assert!(file.is_closed());
        assert_eq!(file.context_name(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_dopen_descriptor() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::new("test");
        let path = dir.path().join("fd.txt.gz");

        let mut file = ctx.dopen(std::fs::File::create(&path).unwrap(), "w").unwrap();
        assert_eq!(file.kind(), BackendKind::Descriptor);
        assert!(file.path().to_string_lossy().starts_with("fd:"));
        file.write(b"not compressed", 1).unwrap();
        file.close().unwrap();

        // Descriptors are never treated as compressed, whatever the name
        assert_eq!(std::fs::read(&path).unwrap(), b"not compressed");
    }
}
