//! Persistence of data sets.
//!
//! A [`Formatter`] owns the handle to one container file and moves [`DataSet`]s in and
//! out of it. [`Hdf5Format`] is the HDF5 implementation; it appends rows incrementally
//! as a measurement progresses.

pub mod attrs;
pub mod hdf5_format;
pub mod legacy;

pub use hdf5_format::{Hdf5Format, DATA_ARRAYS_GROUP, META_DATA_GROUP};

use crate::data::DataSet;
use crate::error::AppResult;

/// Storage backend for data sets.
///
/// Calls must be serialized by the caller; implementations hold a single open handle
/// and provide no locking.
pub trait Formatter {
    /// Persist every populated row that is not yet stored.
    ///
    /// `force_write` reopens the container and rewrites every array from scratch.
    fn write(&mut self, data_set: &DataSet, force_write: bool) -> AppResult<()>;

    /// Load every stored array into `data_set`.
    fn read(&mut self, data_set: &mut DataSet) -> AppResult<()>;

    /// Flush and release the container handle.
    fn close(&mut self) -> AppResult<()>;
}
