//! # Config - commit log tuning knobs
//!
//! Segment rotation thresholds shared by the [`segment`] and [`commitlog`]
//! crates, plus the environment-variable loader used by the shell.
//!
//! ```text
//! COMMITLOG_MAX_STORE_BYTES  store size that maxes a segment  (default: 1024)
//! COMMITLOG_MAX_INDEX_BYTES  index capacity per segment       (default: 1024)
//! COMMITLOG_INITIAL_OFFSET   base offset of the first segment (default: 0)
//! ```
//!
//! [`segment`]: ../segment/index.html
//! [`commitlog`]: ../commitlog/index.html

use thiserror::Error;

/// Default store size (bytes) after which a segment stops accepting appends.
pub const DEFAULT_MAX_STORE_BYTES: u64 = 1024;
/// Default index capacity (bytes) pre-allocated for every segment.
pub const DEFAULT_MAX_INDEX_BYTES: u64 = 1024;
/// Smallest index capacity that still holds one 12-byte entry.
pub const MIN_INDEX_BYTES: u64 = 12;

pub const ENV_MAX_STORE_BYTES: &str = "COMMITLOG_MAX_STORE_BYTES";
pub const ENV_MAX_INDEX_BYTES: &str = "COMMITLOG_MAX_INDEX_BYTES";
pub const ENV_INITIAL_OFFSET: &str = "COMMITLOG_INITIAL_OFFSET";

/// Errors raised while building or validating a [`LogConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable was set but could not be parsed as `u64`.
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },

    /// The index cannot hold a single entry.
    #[error("max_index_bytes {0} is smaller than one index entry (12 bytes)")]
    IndexTooSmall(u64),
}

/// Segment sizing for a commit log.
///
/// Zero thresholds mean "use the default"; call [`LogConfig::normalized`]
/// before handing the config to a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogConfig {
    /// Store size at or above which the active segment is rotated.
    pub max_store_bytes: u64,
    /// Capacity of each segment's memory-mapped index file.
    pub max_index_bytes: u64,
    /// Base offset of the first segment when the log directory is empty.
    pub initial_offset: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_store_bytes: DEFAULT_MAX_STORE_BYTES,
            max_index_bytes: DEFAULT_MAX_INDEX_BYTES,
            initial_offset: 0,
        }
    }
}

impl LogConfig {
    /// Builds a config with the given thresholds and an initial offset of 0.
    pub fn new(max_store_bytes: u64, max_index_bytes: u64) -> Self {
        Self {
            max_store_bytes,
            max_index_bytes,
            initial_offset: 0,
        }
    }

    /// Returns a copy with unset (zero) thresholds replaced by the defaults.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.max_store_bytes == 0 {
            self.max_store_bytes = DEFAULT_MAX_STORE_BYTES;
        }
        if self.max_index_bytes == 0 {
            self.max_index_bytes = DEFAULT_MAX_INDEX_BYTES;
        }
        self
    }

    /// Checks that a normalized config is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_index_bytes < MIN_INDEX_BYTES {
            return Err(ConfigError::IndexTooSmall(self.max_index_bytes));
        }
        Ok(())
    }

    /// Reads the config from `COMMITLOG_*` environment variables, falling
    /// back to the defaults for unset keys.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but over an arbitrary key lookup,
    /// so callers (and tests) are not tied to the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let cfg = Self {
            max_store_bytes: parse_or(&lookup, ENV_MAX_STORE_BYTES, defaults.max_store_bytes)?,
            max_index_bytes: parse_or(&lookup, ENV_MAX_INDEX_BYTES, defaults.max_index_bytes)?,
            initial_offset: parse_or(&lookup, ENV_INITIAL_OFFSET, defaults.initial_offset)?,
        }
        .normalized();
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_or<F>(lookup: &F, key: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value: raw,
        }),
    }
}
