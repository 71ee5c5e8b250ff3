/*!
 * Worker Configuration
 * Channel geometry and backing file location, with environment overrides
 */

use crate::core::limits::{BFSZ, MIN_BUFFER_SIZE, MIN_RETURN_REGION, RET_OFFSET};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Override for the total channel size
pub const ENV_BUFFER_SIZE: &str = "SUBWORKER_BUFFER_SIZE";
/// Override for the payload/return split
pub const ENV_RETURN_OFFSET: &str = "SUBWORKER_RETURN_OFFSET";
/// Directory for backing files (default: the system temp dir)
pub const ENV_BACKING_DIR: &str = "SUBWORKER_BACKING_DIR";

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ConfigError {
    #[error("Buffer size {size} is below the minimum of {min} bytes")]
    #[diagnostic(code(config::buffer_too_small))]
    BufferTooSmall { size: usize, min: usize },

    #[error("Return offset {offset} leaves no room for a result in a {size} byte buffer")]
    #[diagnostic(
        code(config::invalid_split),
        help("The return region needs at least 16 bytes: the completion flag plus an encoded outcome.")
    )]
    InvalidSplit { offset: usize, size: usize },

    #[error("Invalid value for {var}: {value:?}")]
    #[diagnostic(code(config::invalid_env))]
    InvalidEnv { var: &'static str, value: String },
}

/// Geometry and placement of a worker channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Total channel size in bytes
    pub buffer_size: usize,
    /// Start of the return region; the payload region is `[0, return_offset)`
    pub return_offset: usize,
    /// Where backing files are created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backing_dir: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            buffer_size: BFSZ,
            return_offset: RET_OFFSET,
            backing_dir: None,
        }
    }
}

impl WorkerConfig {
    /// Defaults overridden by `SUBWORKER_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(size) = read_usize(ENV_BUFFER_SIZE)? {
            config.buffer_size = size;
        }
        if let Some(offset) = read_usize(ENV_RETURN_OFFSET)? {
            config.return_offset = offset;
        }
        if let Ok(dir) = std::env::var(ENV_BACKING_DIR) {
            if !dir.is_empty() {
                config.backing_dir = Some(PathBuf::from(dir));
            }
        }
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    #[must_use]
    pub fn with_return_offset(mut self, return_offset: usize) -> Self {
        self.return_offset = return_offset;
        self
    }

    #[must_use]
    pub fn with_backing_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.backing_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size < MIN_BUFFER_SIZE {
            return Err(ConfigError::BufferTooSmall {
                size: self.buffer_size,
                min: MIN_BUFFER_SIZE,
            });
        }
        if self.return_offset == 0
            || self.return_offset > self.buffer_size.saturating_sub(MIN_RETURN_REGION)
        {
            return Err(ConfigError::InvalidSplit {
                offset: self.return_offset,
                size: self.buffer_size,
            });
        }
        Ok(())
    }

    /// Bytes available for an encoded request
    #[inline]
    pub fn payload_capacity(&self) -> usize {
        self.return_offset
    }

    /// Bytes available for an encoded outcome (the flag byte excluded)
    #[inline]
    pub fn outcome_capacity(&self) -> usize {
        self.buffer_size - self.return_offset - 1
    }
}

fn read_usize(var: &'static str) -> Result<Option<usize>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .replace('_', "")
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value: raw }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = WorkerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.payload_capacity(), RET_OFFSET);
        assert_eq!(config.outcome_capacity(), BFSZ - RET_OFFSET - 1);
    }

    #[test]
    fn test_rejects_tiny_buffer() {
        let config = WorkerConfig::default()
            .with_buffer_size(10)
            .with_return_offset(5);
        assert_eq!(
            config.validate(),
            Err(ConfigError::BufferTooSmall { size: 10, min: 64 })
        );
    }

    #[test]
    fn test_rejects_split_without_return_room() {
        let config = WorkerConfig::default()
            .with_buffer_size(1024)
            .with_return_offset(1020);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSplit { offset: 1020, .. })
        ));

        let config = WorkerConfig::default().with_return_offset(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_skips_missing_dir() {
        let json = serde_json::to_string(&WorkerConfig::default()).unwrap();
        assert!(!json.contains("backing_dir"));
        let back: WorkerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, WorkerConfig::default());
    }
}
