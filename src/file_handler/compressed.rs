//! Stream machinery shared by the gzip and bzip2 backends.
//!
//! A compressed handle is either a decoder (read modes) or an encoder (write
//! and append modes); update modes are refused. The codec supplies the
//! library-specific pieces through [`Codec`].

use crate::error::{CFileError, Result};
use crate::file_handler::backend::FileBackend;
use crate::file_handler::detect::{header_matches, MAGIC_LEN};
use crate::file_handler::mode::OpenMode;
use crate::file_handler::BackendKind;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Library-specific half of a compressed backend
pub trait Codec {
    /// Backend variant this codec implements
    const KIND: BackendKind;

    /// Streaming decoder over the compressed file
    type Decoder: Read + Send;

    /// Streaming encoder writing to the compressed file
    type Encoder: Write + Send;

    /// Wrap `input` in a decoder that reads concatenated members to the end
    fn decoder(input: BufReader<File>) -> Self::Decoder;

    /// Wrap `output` in an encoder at compression `level` (1-9)
    fn encoder(output: File, level: u32) -> Self::Encoder;

    /// Write the stream trailer and hand back the file
    fn finish(encoder: Self::Encoder) -> io::Result<File>;
}

enum Stream<C: Codec> {
    Reader(C::Decoder),
    /// Zero-length file opened for reading; decoders reject it as truncated
    Empty,
    Writer(C::Encoder),
    Closed,
}

/// Backend over a compressed stream. `size()` is always 0 because neither
/// format records the uncompressed length up front.
pub struct CompressedBackend<C: Codec> {
    stream: Stream<C>,
    eof: bool,
    path: PathBuf,
    _codec: PhantomData<C>,
}

impl<C: Codec> CompressedBackend<C> {
    /// Open `path` for decoding or encoding
    ///
    /// # Errors
    /// * `InvalidMode` for update (`+`) modes
    /// * `Open` when the file cannot be opened
    /// * `MalformedStream` when a file opened for reading does not start with
    ///   the format's magic bytes
    pub fn open(path: &Path, mode: &OpenMode, level: u32) -> Result<Self> {
        if mode.is_update() {
            return Err(CFileError::invalid_mode(
                mode.as_str(),
                format!("{} streams cannot be opened for update", C::KIND.name()),
            ));
        }

        let file = mode
            .open_options()
            .open(path)
            .map_err(|e| CFileError::open(path, e))?;

        let stream = if mode.is_readable() {
            let mut input = BufReader::new(file);
            let header = input.fill_buf().map_err(|e| CFileError::open(path, e))?;
            let header = &header[..header.len().min(MAGIC_LEN)];
            if !header_matches(C::KIND, header) {
                return Err(CFileError::MalformedStream {
                    path: path.to_path_buf(),
                    format: C::KIND.name(),
                });
            }
            if header.is_empty() {
                Stream::Empty
            } else {
                Stream::Reader(C::decoder(input))
            }
        } else {
            Stream::Writer(C::encoder(file, level.clamp(1, 9)))
        };

        Ok(Self {
            stream,
            eof: false,
            path: path.to_path_buf(),
            _codec: PhantomData,
        })
    }
}

impl<C: Codec> fmt::Debug for CompressedBackend<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.stream {
            Stream::Reader(_) | Stream::Empty => "reading",
            Stream::Writer(_) => "writing",
            Stream::Closed => "closed",
        };
        f.debug_struct("CompressedBackend")
            .field("kind", &C::KIND)
            .field("path", &self.path)
            .field("state", &state)
            .field("eof", &self.eof)
            .finish()
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "compressed stream already closed")
}

impl<C: Codec> FileBackend for CompressedBackend<C>
where
    C: Send,
{
    fn kind(&self) -> BackendKind {
        C::KIND
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = match &mut self.stream {
            Stream::Reader(decoder) => decoder.read(buf)?,
            Stream::Empty => 0,
            Stream::Writer(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "compressed stream was opened for writing",
                ))
            }
            Stream::Closed => return Err(closed()),
        };
        // The decoder returns 0 only once the decompressed data is exhausted
        self.eof = n == 0 && !buf.is_empty();
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.stream {
            Stream::Writer(encoder) => encoder.write(buf),
            Stream::Reader(_) | Stream::Empty => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "compressed stream was opened for reading",
            )),
            Stream::Closed => Err(closed()),
        }
    }

    fn is_eof(&self) -> bool {
        self.eof
    }

    fn size(&self) -> u64 {
        0
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.stream {
            Stream::Writer(encoder) => encoder.flush(),
            Stream::Reader(_) | Stream::Empty | Stream::Closed => Ok(()),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        match std::mem::replace(&mut self.stream, Stream::Closed) {
            Stream::Writer(encoder) => {
                let mut file = C::finish(encoder)?;
                file.flush()
            }
            Stream::Reader(_) | Stream::Empty | Stream::Closed => Ok(()),
        }
    }
}
