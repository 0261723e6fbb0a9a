//! Disk IO manager.
//!
//! Data set locations are relative, path-like strings such as `2024-05-02/#004_sweep`.
//! [`DiskIo`] anchors them under a base directory so the formatter never has to
//! know where measurements live on disk.

use crate::config::StorageConfig;
use std::path::{Path, PathBuf};

/// Maps data set locations onto the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskIo {
    base_location: PathBuf,
}

impl DiskIo {
    /// Create a manager rooted at `base_location`.
    pub fn new(base_location: impl Into<PathBuf>) -> Self {
        Self {
            base_location: base_location.into(),
        }
    }

    /// Create a manager from the storage configuration.
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.base_location.clone())
    }

    /// Root directory of this manager.
    pub fn base_location(&self) -> &Path {
        &self.base_location
    }

    /// Join a location onto the base directory.
    ///
    /// Absolute locations are returned unchanged.
    pub fn join(&self, location: impl AsRef<Path>) -> PathBuf {
        self.base_location.join(location)
    }
}

impl Default for DiskIo {
    fn default() -> Self {
        Self::new(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_relative() {
        let io = DiskIo::new("/data");
        assert_eq!(io.join("run/sweep"), PathBuf::from("/data/run/sweep"));
    }

    #[test]
    fn test_join_absolute_passthrough() {
        let io = DiskIo::new("/data");
        assert_eq!(io.join("/elsewhere/x.hdf5"), PathBuf::from("/elsewhere/x.hdf5"));
    }

    #[test]
    fn test_from_config() {
        let config = StorageConfig::default();
        assert_eq!(DiskIo::from_config(&config).base_location(), Path::new("./data"));
    }
}
