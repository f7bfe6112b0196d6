//! Uncompressed backend over `std::fs::File`, used both for files opened by
//! path and for caller-supplied descriptors.
//!
//! Read-only handles get a `BufReader`, write-only handles a `BufWriter`, and
//! update (`+`) handles talk to the file directly so reads and writes share
//! one position.

use crate::error::{CFileError, Result};
use crate::file_handler::backend::FileBackend;
use crate::file_handler::format::write_fmt_counted;
use crate::file_handler::mode::OpenMode;
use crate::file_handler::BackendKind;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

#[derive(Debug)]
enum Stream {
    Read(BufReader<File>),
    Write(BufWriter<File>),
    Update(File),
    Closed,
}

/// Stdio-style backend for plain files and descriptors
#[derive(Debug)]
pub struct StdioBackend {
    stream: Stream,
    eof: bool,
}

impl StdioBackend {
    /// Open `path` according to `mode`
    pub fn open(path: &Path, mode: &OpenMode) -> Result<Self> {
        let file = mode
            .open_options()
            .open(path)
            .map_err(|e| CFileError::open(path, e))?;
        Ok(Self::from_file(file, mode))
    }

    /// Wrap an already open file. The backend takes ownership and closes it.
    pub fn from_file(file: File, mode: &OpenMode) -> Self {
        let stream = if mode.is_update() {
            Stream::Update(file)
        } else if mode.is_readable() {
            Stream::Read(BufReader::new(file))
        } else {
            Stream::Write(BufWriter::new(file))
        };
        Self { stream, eof: false }
    }

    fn file(&self) -> Option<&File> {
        match &self.stream {
            Stream::Read(r) => Some(r.get_ref()),
            Stream::Write(w) => Some(w.get_ref()),
            Stream::Update(f) => Some(f),
            Stream::Closed => None,
        }
    }

    fn writer(&mut self) -> io::Result<&mut dyn Write> {
        match &mut self.stream {
            Stream::Write(w) => Ok(w),
            Stream::Update(f) => Ok(f),
            Stream::Read(_) => Err(not_open_for("writing")),
            Stream::Closed => Err(closed()),
        }
    }
}

fn not_open_for(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("file was not opened for {what}"),
    )
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "backend already closed")
}

impl FileBackend for StdioBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Plain
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = match &mut self.stream {
            Stream::Read(r) => r.read(buf)?,
            Stream::Update(f) => f.read(buf)?,
            Stream::Write(_) => return Err(not_open_for("reading")),
            Stream::Closed => return Err(closed()),
        };
        self.eof = n == 0 && !buf.is_empty();
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn is_eof(&self) -> bool {
        self.eof
    }

    fn size(&self) -> u64 {
        let Some(metadata) = self.file().and_then(|f| f.metadata().ok()) else {
            return 0;
        };
        if !metadata.is_file() {
            return 0;
        }
        // Bytes still sitting in the BufWriter belong to the file too
        let pending = match &self.stream {
            Stream::Write(w) => w.buffer().len() as u64,
            _ => 0,
        };
        metadata.len() + pending
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.stream {
            Stream::Write(w) => w.flush(),
            Stream::Update(f) => f.flush(),
            Stream::Read(_) | Stream::Closed => Ok(()),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        match std::mem::replace(&mut self.stream, Stream::Closed) {
            Stream::Write(w) => {
                let file = w.into_inner().map_err(|e| e.into_error())?;
                drop(file);
                Ok(())
            }
            Stream::Read(_) | Stream::Update(_) | Stream::Closed => Ok(()),
        }
    }

    fn write_fmt_native(&mut self, args: fmt::Arguments<'_>) -> Option<Result<usize>> {
        Some(match self.writer() {
            Ok(writer) => write_fmt_counted(writer, args),
            Err(source) => Err(CFileError::ShortWrite { items: 0, source }),
        })
    }

    fn unread(&mut self, count: usize) -> io::Result<()> {
        if count == 0 {
            return Ok(());
        }
        let offset = -i64::try_from(count)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        match &mut self.stream {
            Stream::Update(f) => f.seek(SeekFrom::Current(offset)).map(|_| ()),
            Stream::Read(r) => r.seek_relative(offset),
            Stream::Write(_) => Ok(()),
            Stream::Closed => Err(closed()),
        }
    }
}
