//! Repository configuration
//!
//! All tunables the engine depends on live in an explicit [`RepositoryConfig`]
//! passed into constructors. Nothing in the crate reads ambient global state.

use crate::error::{RepositoryError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default maximum container nesting depth below the root
/// (content -> part -> chapter; extracts hang one level below that).
pub const DEFAULT_MAX_CONTAINER_DEPTH: usize = 2;

/// Default maximum slug length in bytes
pub const DEFAULT_SLUG_MAX_LENGTH: usize = 80;

/// Default maximum size of a single text blob inside an archive (10 MiB)
pub const DEFAULT_MAX_BLOB_SIZE: u64 = 10 * 1024 * 1024;

/// Engine configuration
///
/// `private_root` holds the draft repositories (one directory per content),
/// `public_root` holds rendered published snapshots. Both are created on
/// demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Root directory for draft version stores
    pub private_root: PathBuf,

    /// Root directory for rendered published snapshots
    pub public_root: PathBuf,

    /// Maximum container nesting depth below the root container
    #[serde(default = "default_depth")]
    pub max_container_depth: usize,

    /// Maximum slug length in bytes (slugs are truncated before dedup)
    #[serde(default = "default_slug_len")]
    pub slug_max_length: usize,

    /// Maximum size of one text blob accepted during archive import
    #[serde(default = "default_blob_size")]
    pub max_blob_size: u64,
}

fn default_depth() -> usize {
    DEFAULT_MAX_CONTAINER_DEPTH
}

fn default_slug_len() -> usize {
    DEFAULT_SLUG_MAX_LENGTH
}

fn default_blob_size() -> u64 {
    DEFAULT_MAX_BLOB_SIZE
}

impl RepositoryConfig {
    /// Create a configuration with default limits
    pub fn new(private_root: impl AsRef<Path>, public_root: impl AsRef<Path>) -> Self {
        RepositoryConfig {
            private_root: private_root.as_ref().to_path_buf(),
            public_root: public_root.as_ref().to_path_buf(),
            max_container_depth: DEFAULT_MAX_CONTAINER_DEPTH,
            slug_max_length: DEFAULT_SLUG_MAX_LENGTH,
            max_blob_size: DEFAULT_MAX_BLOB_SIZE,
        }
    }

    /// Parse a configuration from a TOML string
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw)
            .map_err(|e| RepositoryError::InvalidRequest(format!("invalid config: {}", e)))
    }

    /// Load a configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RepositoryConfig::new("/tmp/private", "/tmp/public");
        assert_eq!(config.max_container_depth, 2);
        assert_eq!(config.slug_max_length, 80);
    }

    #[test]
    fn test_from_toml() {
        let config = RepositoryConfig::from_toml_str(
            r#"
            private_root = "/var/contents/private"
            public_root = "/var/contents/public"
            max_container_depth = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.private_root, PathBuf::from("/var/contents/private"));
        assert_eq!(config.max_container_depth, 1);
        assert_eq!(config.max_blob_size, DEFAULT_MAX_BLOB_SIZE);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(RepositoryConfig::from_toml_str("private_root = 3").is_err());
    }
}
