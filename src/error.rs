//! Custom error types for the array store.
//!
//! This module defines the primary error type, `DaqError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of errors that can occur while persisting a data set.
//!
//! ## Error Hierarchy
//!
//! - **`Config`** / **`Configuration`**: loading or validating [`crate::config::FormatConfig`].
//! - **`Io`** / **`CreateDirectory`**: the measurement folder or container file could not be
//!   created or opened.
//! - **`Hdf5`**: any failure reported by the HDF5 library.
//! - **`Shape`**: an in-memory array does not fit the fixed column count of its storage.
//! - **`InvalidBool`** / **`Decode`**: a stored attribute could not be decoded. The
//!   `is_setpoint` flag only accepts the exact tokens `"True"` and `"False"`.
//! - **`UnknownSetArray`**: a `set_arrays` entry names an array that is not in the container.
//!
//! Nothing in this crate retries or recovers: every error surfaces to the caller of the
//! operation that triggered it.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Every failure the array store can report.
#[derive(Error, Debug)]
pub enum DaqError {
    /// The configuration sources could not be merged or extracted.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// The configuration parsed but holds an invalid value.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Generic I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The folder that should hold the container could not be created.
    #[error("Failed to create directory {path:?}: {source}")]
    CreateDirectory {
        /// Directory that was being created.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failure reported by the HDF5 library.
    #[cfg(feature = "storage_hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    /// Array rows do not fit the storage shape.
    #[error("Shape error: {0}")]
    Shape(String),

    /// A stored boolean token was neither `"True"` nor `"False"`.
    #[error("Cannot convert {0:?} to a bool")]
    InvalidBool(String),

    /// A stored attribute could not be decoded as text.
    #[error("Attribute decode error: {0}")]
    Decode(String),

    /// A required attribute is absent from a stored array.
    #[error("Array '{array_id}' is missing the '{attribute}' attribute")]
    MissingAttribute {
        /// Array whose storage lacks the attribute.
        array_id: String,
        /// Name of the missing attribute.
        attribute: String,
    },

    /// A `set_arrays` reference names an array that does not exist.
    #[error("Array '{array_id}' references unknown set array '{missing}'")]
    UnknownSetArray {
        /// Array carrying the dangling reference.
        array_id: String,
        /// Referenced id that could not be found.
        missing: String,
    },

    /// An array id was added to a data set twice.
    #[error("Array '{0}' already exists in the data set")]
    DuplicateArray(String),

    /// An array violates a data model invariant.
    #[error("Invalid data array '{array_id}': {reason}")]
    InvalidArray {
        /// Offending array.
        array_id: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An operation needs an open container but none is held.
    #[error("No container file is open")]
    ContainerNotOpen,

    /// The container already holds an instrument snapshot.
    #[error("Instrument snapshot already saved in {0:?}")]
    SnapshotExists(PathBuf),

    /// Functionality compiled out via feature flags.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DaqError::InvalidBool("yes".to_string());
        assert_eq!(err.to_string(), "Cannot convert \"yes\" to a bool");
    }

    #[test]
    fn test_unknown_set_array_display() {
        let err = DaqError::UnknownSetArray {
            array_id: "y".into(),
            missing: "x".into(),
        };
        assert_eq!(
            err.to_string(),
            "Array 'y' references unknown set array 'x'"
        );
    }

    #[test]
    fn test_feature_not_enabled_display() {
        let err = DaqError::FeatureNotEnabled("storage_hdf5".into());
        assert!(err.to_string().contains("--features storage_hdf5"));
    }
}
