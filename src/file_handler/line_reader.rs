//! Backend-agnostic line reading with amortized buffer growth.
//!
//! [`ReadAhead`] pulls chunks from any [`FileBackend`] and hands out bytes
//! up to and including the next newline. [`LineBuffer`] is the growable
//! destination: it starts small and doubles whenever fewer than a threshold
//! of bytes remain free, so a line of length L costs O(L) in total copies.

use crate::file_handler::backend::FileBackend;
use memchr::memchr;
use std::io;

/// Growable line buffer with an explicit doubling policy
#[derive(Debug, Clone)]
pub struct LineBuffer {
    buf: Vec<u8>,
    /// Logical capacity; only ever doubles
    capacity: usize,
    /// Grow once fewer than this many bytes are free
    threshold: usize,
}

impl LineBuffer {
    /// Create a buffer with the default 128-byte capacity and 16-byte threshold
    pub fn new() -> Self {
        Self::with_capacity(128, 16)
    }

    /// Create a buffer with an explicit starting capacity and grow threshold
    pub fn with_capacity(capacity: usize, threshold: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            threshold: threshold.clamp(1, capacity),
        }
    }

    /// The bytes of the last line read, including its newline if one was present
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// The last line as UTF-8, replacing invalid sequences
    pub fn to_string_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.buf)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Current logical capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Append `bytes`, doubling the capacity first as often as needed
    fn append(&mut self, bytes: &[u8]) {
        let want = bytes.len().max(self.threshold);
        if self.capacity - self.buf.len() < want {
            let before = self.capacity;
            while self.capacity - self.buf.len() < want {
                self.capacity *= 2;
            }
            log::trace!("line buffer grew from {} to {} bytes", before, self.capacity);
        }
        self.buf.reserve(self.capacity - self.buf.len());
        self.buf.extend_from_slice(bytes);
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-ahead state sitting between a handle and its backend
#[derive(Debug)]
pub struct ReadAhead {
    buf: Vec<u8>,
    start: usize,
    end: usize,
}

impl ReadAhead {
    /// Create read-ahead state refilling `chunk_size` bytes at a time
    pub fn new(chunk_size: usize) -> Self {
        Self {
            buf: vec![0; chunk_size.max(1)],
            start: 0,
            end: 0,
        }
    }

    /// Bytes read from the backend but not yet handed out
    pub fn pending(&self) -> usize {
        self.end - self.start
    }

    /// Refill from the backend when empty. Returns the bytes now pending.
    fn refill(&mut self, backend: &mut dyn FileBackend) -> io::Result<usize> {
        if self.pending() > 0 {
            return Ok(self.pending());
        }
        self.start = 0;
        self.end = 0;
        let n = retry_interrupted(|| backend.read(&mut self.buf))?;
        self.end = n;
        Ok(n)
    }

    /// Read up to `out.len()` bytes, stopping early only at end-of-file
    ///
    /// # Returns
    /// * `Ok(n)` with `n < out.len()` only when the stream is exhausted
    /// * `Err((n, e))` when the backend failed after `n` bytes were copied
    pub fn read(
        &mut self,
        backend: &mut dyn FileBackend,
        out: &mut [u8],
    ) -> std::result::Result<usize, (usize, io::Error)> {
        let mut filled = 0;
        while filled < out.len() {
            if self.pending() == 0 && out.len() - filled >= self.buf.len() {
                // Large request: bypass the read-ahead buffer
                match retry_interrupted(|| backend.read(&mut out[filled..])) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e) => return Err((filled, e)),
                }
                continue;
            }

            match self.refill(backend) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => return Err((filled, e)),
            }
            let take = self.pending().min(out.len() - filled);
            out[filled..filled + take].copy_from_slice(&self.buf[self.start..self.start + take]);
            self.start += take;
            filled += take;
        }
        Ok(filled)
    }

    /// Read one line into `line`, growing it as needed
    ///
    /// The line keeps its trailing newline when one was found. Reading stops
    /// at a newline or end-of-file.
    ///
    /// # Returns
    /// * `true` if any bytes were read, `false` at end-of-file
    pub fn read_line(
        &mut self,
        backend: &mut dyn FileBackend,
        line: &mut LineBuffer,
    ) -> io::Result<bool> {
        line.clear();
        loop {
            if self.refill(backend)? == 0 {
                break;
            }
            let avail = &self.buf[self.start..self.end];
            let (take, found) = match memchr(b'\n', avail) {
                Some(pos) => (pos + 1, true),
                None => (avail.len(), false),
            };
            line.append(&avail[..take]);
            self.start += take;
            if found {
                break;
            }
        }
        Ok(!line.is_empty())
    }

    /// Read at most `out.len() - 1` bytes of one line into a fixed buffer and
    /// NUL-terminate it
    ///
    /// A line longer than the buffer is split: the rest stays pending for the
    /// next call.
    ///
    /// # Returns
    /// * `Some(n)` with the number of bytes stored before the terminator
    /// * `None` when end-of-file was reached before any byte could be read
    ///
    /// `out` must not be empty.
    pub fn read_line_bounded(
        &mut self,
        backend: &mut dyn FileBackend,
        out: &mut [u8],
    ) -> io::Result<Option<usize>> {
        let max = out.len() - 1;
        let mut n = 0;
        while n < max {
            if self.refill(backend)? == 0 {
                break;
            }
            let avail = &self.buf[self.start..self.end];
            let avail = &avail[..avail.len().min(max - n)];
            let (take, found) = match memchr(b'\n', avail) {
                Some(pos) => (pos + 1, true),
                None => (avail.len(), false),
            };
            out[n..n + take].copy_from_slice(&avail[..take]);
            self.start += take;
            n += take;
            if found {
                break;
            }
        }
        out[n] = 0;

        if n == 0 && max > 0 {
            Ok(None)
        } else {
            Ok(Some(n))
        }
    }

    /// Hand pending bytes back to the backend so its position matches what
    /// the caller has consumed
    pub fn discard(&mut self, backend: &mut dyn FileBackend) -> io::Result<()> {
        let pending = self.pending();
        if pending > 0 {
            backend.unread(pending)?;
        }
        self.start = 0;
        self.end = 0;
        Ok(())
    }
}

fn retry_interrupted(mut op: impl FnMut() -> io::Result<usize>) -> io::Result<usize> {
    loop {
        match op() {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_handler::backend::testing::ScriptedBackend;
    use proptest::prelude::*;

    #[test]
    fn test_reads_lines_with_newlines() {
        let mut backend = ScriptedBackend::new(b"alpha\nbeta\n\ngamma".to_vec(), 3);
        let mut ahead = ReadAhead::new(4);
        let mut line = LineBuffer::new();

        let mut lines = Vec::new();
        while ahead.read_line(&mut backend, &mut line).unwrap() {
            lines.push(line.as_bytes().to_vec());
        }
        assert_eq!(
            lines,
            vec![
                b"alpha\n".to_vec(),
                b"beta\n".to_vec(),
                b"\n".to_vec(),
                b"gamma".to_vec()
            ]
        );
        assert!(backend.is_eof());
    }

    #[test]
    fn test_long_line_grows_by_doubling() {
        let data = vec![b'x'; 10_000];
        let mut backend = ScriptedBackend::new(data, 700);
        let mut ahead = ReadAhead::new(512);
        let mut line = LineBuffer::with_capacity(128, 16);

        assert!(ahead.read_line(&mut backend, &mut line).unwrap());
        assert_eq!(line.len(), 10_000);
        assert!(line.as_bytes().iter().all(|&b| b == b'x'));
        assert_eq!(line.capacity(), 16_384);
        assert!(!ahead.read_line(&mut backend, &mut line).unwrap());
        assert!(line.is_empty());
    }

    #[test]
    fn test_grow_threshold_applies_before_append() {
        let mut line = LineBuffer::with_capacity(8, 4);
        line.append(b"abcd");
        assert_eq!(line.capacity(), 8);
        // 4 bytes free still meets the threshold
        line.append(b"e");
        assert_eq!(line.capacity(), 8);
        // 3 bytes free now, under the threshold
        line.append(b"f");
        assert_eq!(line.capacity(), 16);
        assert_eq!(line.as_bytes(), b"abcdef");
    }

    #[test]
    fn test_bounded_read_truncates_and_terminates() {
        let mut data = vec![b'y'; 10_000];
        data.push(b'\n');
        let mut backend = ScriptedBackend::new(data, 1000);
        let mut ahead = ReadAhead::new(256);
        let mut out = [0xAAu8; 64];

        let n = ahead.read_line_bounded(&mut backend, &mut out).unwrap();
        assert_eq!(n, Some(63));
        assert_eq!(out[63], 0);
        assert!(out[..63].iter().all(|&b| b == b'y'));

        // The remainder of the line is still there
        let mut line = LineBuffer::new();
        assert!(ahead.read_line(&mut backend, &mut line).unwrap());
        assert_eq!(line.len(), 10_000 - 63 + 1);
    }

    #[test]
    fn test_bounded_read_stops_at_newline() {
        let mut backend = ScriptedBackend::new(b"ab\ncd".to_vec(), 16);
        let mut ahead = ReadAhead::new(16);
        let mut out = [0u8; 16];

        assert_eq!(ahead.read_line_bounded(&mut backend, &mut out).unwrap(), Some(3));
        assert_eq!(&out[..4], b"ab\n\0");
        assert_eq!(ahead.read_line_bounded(&mut backend, &mut out).unwrap(), Some(2));
        assert_eq!(&out[..3], b"cd\0");
        assert_eq!(ahead.read_line_bounded(&mut backend, &mut out).unwrap(), None);
        assert_eq!(out[0], 0);
    }

    #[test]
    fn test_bounded_read_single_byte_buffer() {
        let mut backend = ScriptedBackend::new(b"data".to_vec(), 16);
        let mut ahead = ReadAhead::new(16);
        let mut out = [0xFFu8; 1];

        assert_eq!(ahead.read_line_bounded(&mut backend, &mut out).unwrap(), Some(0));
        assert_eq!(out[0], 0);
        assert_eq!(backend.reads, 0);
    }

    #[test]
    fn test_read_mixes_pending_and_direct() {
        let data: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
        let mut backend = ScriptedBackend::new(data.clone(), 333);
        let mut ahead = ReadAhead::new(64);
        let mut line = LineBuffer::new();

        // byte 10 is '\n', so the first line is 11 bytes and the rest is pending
        assert!(ahead.read_line(&mut backend, &mut line).unwrap());
        assert_eq!(line.as_bytes(), &data[..11]);

        let mut out = vec![0u8; 6000];
        let n = ahead.read(&mut backend, &mut out).unwrap();
        assert_eq!(n, 5000 - 11);
        assert_eq!(&out[..n], &data[11..]);
    }

    proptest! {
        #[test]
        fn prop_lines_reassemble_input(
            data in proptest::collection::vec(prop_oneof![Just(b'\n'), any::<u8>()], 0..2000),
            chunk in 1usize..300,
            read_ahead in 1usize..300,
        ) {
            let mut backend = ScriptedBackend::new(data.clone(), chunk);
            let mut ahead = ReadAhead::new(read_ahead);
            let mut line = LineBuffer::with_capacity(4, 2);
            let mut joined = Vec::new();

            while ahead.read_line(&mut backend, &mut line).unwrap() {
                let bytes = line.as_bytes();
                // Only the last byte of a line may be a newline
                prop_assert!(!bytes[..bytes.len() - 1].contains(&b'\n'));
                joined.extend_from_slice(bytes);
            }
            prop_assert_eq!(joined, data);
        }

        #[test]
        fn prop_bounded_never_overruns(
            data in proptest::collection::vec(any::<u8>(), 0..1000),
            size in 1usize..80,
        ) {
            let mut backend = ScriptedBackend::new(data.clone(), 17);
            let mut ahead = ReadAhead::new(32);
            let mut out = vec![0u8; size];
            let mut joined = Vec::new();

            while let Some(n) = ahead.read_line_bounded(&mut backend, &mut out).unwrap() {
                prop_assert!(n < size);
                prop_assert_eq!(out[n], 0);
                joined.extend_from_slice(&out[..n]);
                if size == 1 {
                    break;
                }
            }
            if size > 1 {
                prop_assert_eq!(joined, data);
            }
        }
    }
}
