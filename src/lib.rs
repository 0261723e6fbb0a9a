//! HDF5 array store for measurement data sets.
//!
//! A [`DataSet`] groups the [`DataArray`]s of one measurement run: setpoint arrays
//! hold the swept values, dependent arrays hold the measured values and reference
//! their setpoints. [`Hdf5Format`] persists a data set into one HDF5 container per
//! run, appending only newly populated rows on every write so an interrupted run
//! keeps everything captured so far.
//!
//! ```no_run
//! use rust_daq_format::{DataArray, DataSet, DiskIo, Hdf5Format};
//!
//! # fn main() -> rust_daq_format::AppResult<()> {
//! let mut data_set = DataSet::new("2024-05-02/#001_iv", DiskIo::new("./data"));
//! let x = data_set.add_array(DataArray::new("x").setpoint().with_units(["V"])?)?;
//! let y = data_set.add_array(DataArray::new("y").with_units(["A"])?.with_set_arrays([x]))?;
//!
//! let mut format = Hdf5Format::new();
//! for (i, v) in [0.0, 0.5, 1.0].into_iter().enumerate() {
//!     if let Some(mut array) = data_set.get_mut(x) {
//!         array.push_row(&[v])?;
//!     }
//!     if let Some(mut array) = data_set.get_mut(y) {
//!         array.push_row(&[v * 1e-6])?;
//!     }
//!     if i % 2 == 0 {
//!         format.write(&data_set, false)?;
//!     }
//! }
//! format.write(&data_set, false)?;
//! format.close()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod format;
pub mod io;
pub mod logging;
pub mod snapshot;

pub use config::FormatConfig;
pub use data::{ArrayRef, DataArray, DataArrayMut, DataSet};
pub use error::{AppResult, DaqError};
pub use format::{Formatter, Hdf5Format};
pub use io::DiskIo;
pub use snapshot::{Snapshot, StationSnapshot};
