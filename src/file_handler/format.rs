//! Formatted output for every backend.
//!
//! Plain and descriptor backends format straight into their buffered writer.
//! The compressed backends have no formatted-write call, so the output is
//! rendered into a scratch buffer of bounded capacity first and then written
//! as raw bytes. When a rendering does not fit, the capacity grows (doubling,
//! or to the next power of two above the measured length) and the arguments
//! are rendered again.

use crate::error::{CFileError, Result};
use crate::file_handler::backend::{write_fully, FileBackend};
use std::fmt;
use std::io::{self, Write};

/// `fmt::Write` adapter over an `io::Write` that counts bytes and keeps the
/// I/O error, so a failing writer can be told apart from a failing `Display`
struct IoAdapter<'a> {
    inner: &'a mut dyn Write,
    count: usize,
    error: Option<io::Error>,
}

impl fmt::Write for IoAdapter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        match self.inner.write_all(s.as_bytes()) {
            Ok(()) => {
                self.count += s.len();
                Ok(())
            }
            Err(e) => {
                self.error = Some(e);
                Err(fmt::Error)
            }
        }
    }
}

/// Format `args` directly into `writer`
///
/// # Returns
/// * Number of bytes written
///
/// # Errors
/// * `ShortWrite` (counting bytes) when `writer` fails
/// * `Format` when a formatting trait implementation fails
pub(crate) fn write_fmt_counted(writer: &mut dyn Write, args: fmt::Arguments<'_>) -> Result<usize> {
    let mut adapter = IoAdapter {
        inner: writer,
        count: 0,
        error: None,
    };
    match fmt::write(&mut adapter, args) {
        Ok(()) => Ok(adapter.count),
        Err(_) => match adapter.error.take() {
            Some(source) => Err(CFileError::ShortWrite {
                items: adapter.count,
                source,
            }),
            None => Err(display_failed()),
        },
    }
}

fn display_failed() -> CFileError {
    CFileError::format("a formatting trait implementation returned an error")
}

/// Sink that keeps at most `limit` bytes but measures the full rendering
struct BoundedSink<'a> {
    buf: &'a mut Vec<u8>,
    limit: usize,
    needed: usize,
}

impl fmt::Write for BoundedSink<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.limit.saturating_sub(self.buf.len());
        let take = room.min(s.len());
        self.buf.extend_from_slice(&s.as_bytes()[..take]);
        self.needed += s.len();
        Ok(())
    }
}

/// Scratch space for rendering formatted output
#[derive(Debug)]
pub struct FormatBuffer {
    buf: Vec<u8>,
    capacity: usize,
}

impl FormatBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Current rendering capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Render `args` into the buffer, growing and re-rendering until it fits
    ///
    /// # Returns
    /// * The rendered bytes
    ///
    /// # Errors
    /// * `Format` when a `Display`/`Debug` implementation reports an error
    pub fn render(&mut self, args: fmt::Arguments<'_>) -> Result<&[u8]> {
        loop {
            self.buf.clear();
            let mut sink = BoundedSink {
                buf: &mut self.buf,
                limit: self.capacity,
                needed: 0,
            };
            fmt::write(&mut sink, args).map_err(|_| display_failed())?;

            let needed = sink.needed;
            if needed <= self.capacity {
                return Ok(&self.buf[..needed]);
            }

            let grown = (self.capacity * 2).max(needed.next_power_of_two());
            log::trace!(
                "format buffer too small ({} < {}), growing to {}",
                self.capacity,
                needed,
                grown
            );
            self.capacity = grown;
            self.buf.reserve(grown.saturating_sub(self.buf.len()));
        }
    }
}

/// Write formatted output to `backend`
///
/// # Returns
/// * Number of bytes rendered and written
///
/// # Errors
/// * `Format` when rendering fails
/// * `ShortWrite` (counting bytes) when the backend fails part way
pub(crate) fn write_formatted(
    backend: &mut dyn FileBackend,
    scratch: &mut FormatBuffer,
    args: fmt::Arguments<'_>,
) -> Result<usize> {
    if let Some(result) = backend.write_fmt_native(args) {
        return result;
    }

    let rendered = scratch.render(args)?;
    let len = rendered.len();
    write_fully(backend, rendered)
        .map_err(|(items, source)| CFileError::ShortWrite { items, source })?;
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_handler::backend::testing::ScriptedBackend;

    struct Failing;

    impl fmt::Display for Failing {
        fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
            Err(fmt::Error)
        }
    }

    #[test]
    fn test_render_fits_initial_capacity() {
        let mut scratch = FormatBuffer::with_capacity(64);
        let out = scratch.render(format_args!("{} {}", "a", 1)).unwrap();
        assert_eq!(out, b"a 1");
        assert_eq!(scratch.capacity(), 64);
    }

    #[test]
    fn test_render_grows_and_rerenders() {
        let mut scratch = FormatBuffer::with_capacity(8);
        let long = "x".repeat(100);
        let out = scratch.render(format_args!("[{long}]")).unwrap().to_vec();
        assert_eq!(out.len(), 102);
        assert_eq!(out[0], b'[');
        assert_eq!(out[101], b']');
        assert_eq!(scratch.capacity(), 128);
    }

    #[test]
    fn test_render_reports_display_failure() {
        let mut scratch = FormatBuffer::with_capacity(8);
        let err = scratch.render(format_args!("{}", Failing)).unwrap_err();
        assert!(matches!(err, CFileError::Format { .. }));
    }

    #[test]
    fn test_write_formatted_without_native_support() {
        let mut backend = ScriptedBackend::new(Vec::new(), 3);
        let mut scratch = FormatBuffer::with_capacity(4);
        let n = write_formatted(
            &mut backend,
            &mut scratch,
            format_args!("{}:{:>5}|{:.2}", "key", 42, 1.5f64),
        )
        .unwrap();
        assert_eq!(backend.written, b"key:   42|1.50");
        assert_eq!(n, backend.written.len());
    }

    #[test]
    fn test_write_formatted_surfaces_write_failure() {
        let mut backend = ScriptedBackend::new(Vec::new(), 3);
        backend.fail_writes = true;
        let mut scratch = FormatBuffer::with_capacity(16);
        let err = write_formatted(&mut backend, &mut scratch, format_args!("abc")).unwrap_err();
        assert!(matches!(err, CFileError::ShortWrite { items: 0, .. }));
    }

    #[test]
    fn test_write_fmt_counted() {
        let mut sink = Vec::new();
        let n = write_fmt_counted(&mut sink, format_args!("{}{}", 12, "ab")).unwrap();
        assert_eq!(n, 4);
        assert_eq!(sink, b"12ab");
    }

    #[test]
    fn test_write_fmt_counted_tells_display_and_io_failures_apart() {
        let mut sink = Vec::new();
        let err = write_fmt_counted(&mut sink, format_args!("ok{}", Failing)).unwrap_err();
        assert!(matches!(err, CFileError::Format { .. }));

        let mut full = [0u8; 2];
        let mut cursor = io::Cursor::new(&mut full[..]);
        let err = write_fmt_counted(&mut cursor, format_args!("{}", "abc")).unwrap_err();
        assert!(matches!(err, CFileError::ShortWrite { items: 0, .. }));
    }
}
