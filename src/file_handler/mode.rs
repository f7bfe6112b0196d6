//! Open mode strings in the conventional `fopen(3)` form.
//!
//! A mode starts with `r`, `w` or `a`, optionally followed (in any order) by
//! `+` (update), `b`/`t` (binary/text, accepted and recorded only), `x`
//! (exclusive create) and one digit `1`-`9` selecting a compression level for
//! the gzip and bzip2 backends.

use crate::error::{CFileError, Result};
use std::fmt;
use std::fs::OpenOptions;

/// Primary access requested by a mode string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// `r`: the file must exist
    Read,
    /// `w`: create or truncate
    Write,
    /// `a`: create, all writes go to the end
    Append,
}

/// A parsed open mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenMode {
    access: Access,
    update: bool,
    binary: bool,
    exclusive: bool,
    level: Option<u32>,
    raw: String,
}

impl OpenMode {
    /// Parse a mode string such as `"rb"`, `"w+"` or `"wb9"`
    pub fn parse(mode: &str) -> Result<Self> {
        let mut chars = mode.chars();
        let access = match chars.next() {
            Some('r') => Access::Read,
            Some('w') => Access::Write,
            Some('a') => Access::Append,
            Some(_) => return Err(CFileError::invalid_mode(mode, "unknown access mode")),
            None => return Err(CFileError::invalid_mode(mode, "empty mode string")),
        };

        let mut parsed = Self {
            access,
            update: false,
            binary: false,
            exclusive: false,
            level: None,
            raw: mode.to_string(),
        };

        for c in chars {
            match c {
                '+' => parsed.update = true,
                'b' => parsed.binary = true,
                't' => parsed.binary = false,
                'x' if access == Access::Write => parsed.exclusive = true,
                'x' => {
                    return Err(CFileError::invalid_mode(
                        mode,
                        "exclusive flag requires write access",
                    ))
                }
                '1'..='9' if parsed.level.is_none() => parsed.level = c.to_digit(10),
                '0'..='9' => {
                    return Err(CFileError::invalid_mode(
                        mode,
                        "compression level must be a single digit 1-9",
                    ))
                }
                other => {
                    return Err(CFileError::invalid_mode(
                        mode,
                        format!("unexpected character {other:?}"),
                    ))
                }
            }
        }

        Ok(parsed)
    }

    /// Primary access
    pub fn access(&self) -> Access {
        self.access
    }

    /// `+` was given
    pub fn is_update(&self) -> bool {
        self.update
    }

    /// `b` was given
    pub fn is_binary(&self) -> bool {
        self.binary
    }

    /// Compression level digit, if any
    pub fn level(&self) -> Option<u32> {
        self.level
    }

    /// The mode string as the caller wrote it
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_readable(&self) -> bool {
        self.access == Access::Read || self.update
    }

    pub fn is_writable(&self) -> bool {
        self.access != Access::Read || self.update
    }

    /// The `OpenOptions` equivalent for a plain file
    pub fn open_options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self.access {
            Access::Read => {
                options.read(true).write(self.update);
            }
            Access::Write => {
                options.write(true).read(self.update).truncate(true);
                if self.exclusive {
                    options.create_new(true);
                } else {
                    options.create(true);
                }
            }
            Access::Append => {
                options.append(true).read(self.update).create(true);
            }
        }
        options
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
