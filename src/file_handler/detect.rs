//! Backend selection from a pathname, plus the stream header check used when
//! a compressed file is opened for reading.
//!
//! Selection is purely by suffix and performs no I/O. The suffix table is
//! case-sensitive and fixed:
//!
//! | Suffix                     | Backend  |
//! |----------------------------|----------|
//! | `.gz`, `.tgz`              | Gzip     |
//! | `.bz2`, `.tbz2`, `.tbz`    | Bzip2    |
//! | anything else              | Plain    |

use crate::file_handler::BackendKind;
use std::path::Path;

/// Suffixes (without the dot) that select the gzip backend
pub const GZIP_SUFFIXES: &[&str] = &["gz", "tgz"];

/// Suffixes (without the dot) that select the bzip2 backend
pub const BZIP2_SUFFIXES: &[&str] = &["bz2", "tbz2", "tbz"];

/// Gzip magic number (RFC 1952)
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];

/// Bzip2 magic number "BZh"
const BZIP2_MAGIC: &[u8] = &[0x42, 0x5a, 0x68];

/// Choose a backend for `path` from its suffix.
///
/// Never fails: an unknown or missing suffix selects [`BackendKind::Plain`].
pub fn detect_backend(path: &Path) -> BackendKind {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return BackendKind::Plain;
    };

    if GZIP_SUFFIXES.contains(&ext) {
        BackendKind::Gzip
    } else if BZIP2_SUFFIXES.contains(&ext) {
        BackendKind::Bzip2
    } else {
        BackendKind::Plain
    }
}

/// Number of leading bytes needed to check a stream header
pub(crate) const MAGIC_LEN: usize = 3;

/// Check the leading bytes of a compressed file against its format's magic.
///
/// Returns `true` for uncompressed kinds and for an empty header, which is
/// treated as an empty stream.
pub(crate) fn header_matches(kind: BackendKind, header: &[u8]) -> bool {
    if header.is_empty() {
        return true;
    }
    let magic = match kind {
        BackendKind::Gzip => GZIP_MAGIC,
        BackendKind::Bzip2 => BZIP2_MAGIC,
        BackendKind::Plain | BackendKind::Descriptor => return true,
    };
    header.starts_with(magic)
}
