//! In-memory data model handed to the formatter.

pub mod data_array;
pub mod data_set;

pub use data_array::{ArrayRef, DataArray, DataArrayMut};
pub use data_set::DataSet;
