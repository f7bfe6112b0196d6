//! Tunables shared by a context tree and the handles opened under it.
//!
//! A root [`Context`](crate::Context) is built with a `CFileConfig`; child
//! contexts inherit it and every handle takes a copy at open time. With the
//! `config` feature enabled the values can also be read from a TOML file.

use crate::error::{CFileError, Result};

/// Buffer sizes and compression levels used by file handles.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct CFileConfig {
    /// Initial capacity of the growable line buffer
    pub line_buffer_capacity: usize,

    /// The line buffer doubles once fewer than this many bytes are free
    pub line_grow_threshold: usize,

    /// Initial capacity of the scratch buffer used for formatted output
    pub format_buffer_capacity: usize,

    /// Bytes requested from the backend per read-ahead refill
    pub read_chunk_size: usize,

    /// Default gzip level (1-9) when the mode string carries no digit
    pub gzip_level: u32,

    /// Default bzip2 block size level (1-9) when the mode string carries no digit
    pub bzip2_level: u32,
}

impl Default for CFileConfig {
    fn default() -> Self {
        Self {
            line_buffer_capacity: 128,
            line_grow_threshold: 16,
            format_buffer_capacity: 128,
            read_chunk_size: 8192,
            gzip_level: 6,
            bzip2_level: 9,
        }
    }
}

impl CFileConfig {
    /// Check that every value is usable
    pub fn validate(&self) -> Result<()> {
        if self.line_buffer_capacity == 0 {
            return Err(CFileError::config("line_buffer_capacity must be non-zero"));
        }
        if self.line_grow_threshold == 0 || self.line_grow_threshold > self.line_buffer_capacity
        {
            return Err(CFileError::config(
                "line_grow_threshold must be between 1 and line_buffer_capacity",
            ));
        }
        if self.format_buffer_capacity == 0 {
            return Err(CFileError::config("format_buffer_capacity must be non-zero"));
        }
        if self.read_chunk_size == 0 {
            return Err(CFileError::config("read_chunk_size must be non-zero"));
        }
        for (name, level) in [("gzip_level", self.gzip_level), ("bzip2_level", self.bzip2_level)] {
            if !(1..=9).contains(&level) {
                return Err(CFileError::config(format!(
                    "{name} must be between 1 and 9, got {level}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(feature = "config")]
impl CFileConfig {
    /// Parse a configuration from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| CFileError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| CFileError::open(path, e))?;
        Self::from_toml_str(&text)
    }

    /// Load `<config_dir>/cfile/config.toml`, or defaults when it does not exist
    pub fn load_default() -> Result<Self> {
        match dirs::config_dir().map(|dir| dir.join("cfile").join("config.toml")) {
            Some(path) if path.is_file() => {
                log::debug!("loading cfile config from {}", path.display());
                Self::load_from(path)
            }
            _ => Ok(Self::default()),
        }
    }
}
