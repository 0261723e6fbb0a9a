//! HDF5 array store.
//!
//! Container layout:
//!
//! ```text
//! <location>/<basename>.hdf5
//! ├── @created_at, @application
//! ├── Data Arrays/
//! │   └── <array_id>          f64 table (rows, columns), rows unlimited, NaN fill
//! │       ├── @label, @name, @units, @is_setpoint   text
//! │       └── @set_arrays                           text list (dependent arrays only)
//! └── Meta-data/
//!     └── <instrument>/       one text attribute per parameter
//! ```
//!
//! The store is stateful across [`Hdf5Format::write`] calls: the first call creates
//! the file, later calls append only the rows that became populated since. Rows that
//! are already persisted are never rewritten.

use crate::config::StorageConfig;
use crate::data::DataSet;
use crate::error::{AppResult, DaqError};
use crate::format::Formatter;
#[cfg(not(feature = "storage_hdf5"))]
use crate::snapshot::StationSnapshot;
use std::path::{Path, PathBuf};

/// Group holding one table per array.
pub const DATA_ARRAYS_GROUP: &str = "Data Arrays";

/// Group holding the instrument snapshot.
pub const META_DATA_GROUP: &str = "Meta-data";

/// Incremental HDF5 formatter.
pub struct Hdf5Format {
    file_extension: String,
    chunk_rows: usize,
    compression_level: u8,
    #[cfg(feature = "storage_hdf5")]
    file: Option<hdf5::File>,
    filepath: Option<PathBuf>,
}

impl Default for Hdf5Format {
    fn default() -> Self {
        Self::new()
    }
}

impl Hdf5Format {
    /// Formatter with default storage settings.
    pub fn new() -> Self {
        Self::from_config(&StorageConfig::default())
    }

    /// Formatter using the extension, chunking and compression from `config`.
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            file_extension: config.file_extension.clone(),
            chunk_rows: config.chunk_rows.max(1),
            compression_level: config.compression_level,
            #[cfg(feature = "storage_hdf5")]
            file: None,
            filepath: None,
        }
    }

    /// Path of the container currently held open.
    pub fn filepath(&self) -> Option<&Path> {
        self.filepath.as_deref()
    }

    /// Container path for a data set: `<location>/<basename(location)>.<ext>`,
    /// resolved through the data set's IO manager.
    ///
    /// # Errors
    ///
    /// Returns [`DaqError::Configuration`] if the location is empty or has no basename.
    pub fn container_path(&self, data_set: &DataSet) -> AppResult<PathBuf> {
        let location = data_set.location().trim_end_matches(&['/', '\\'][..]);
        let filename = Path::new(location)
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                DaqError::Configuration(format!(
                    "data set location '{}' has no basename",
                    data_set.location()
                ))
            })?;
        Ok(data_set
            .io()
            .join(format!("{}/{}.{}", location, filename, self.file_extension)))
    }

    /// Path `read` opens: the location itself when it names a file, otherwise the
    /// container path derived as for writing.
    #[cfg_attr(not(feature = "storage_hdf5"), allow(dead_code))]
    fn read_path(&self, data_set: &DataSet) -> AppResult<PathBuf> {
        let direct = data_set.io().join(data_set.location());
        if direct.is_file() {
            Ok(direct)
        } else {
            self.container_path(data_set)
        }
    }
}

#[cfg(feature = "storage_hdf5")]
mod enabled {
    use super::{Hdf5Format, DATA_ARRAYS_GROUP, META_DATA_GROUP};
    use crate::data::{DataArray, DataSet};
    use crate::error::{AppResult, DaqError};
    use crate::format::attrs::{
        has_attr, read_text_attr, read_text_list_attr, str_to_bool, units_from_attr,
        units_to_attr, write_text_attr, AttrValue,
    };
    use crate::format::legacy;
    use crate::snapshot::StationSnapshot;
    use hdf5::{Dataset, File, Group};
    use ndarray::{s, ArrayView2};
    use std::path::Path;
    use tracing::{debug, info, trace, warn};

    /// Create the parent folder if needed and open `filepath` read/write, creating an
    /// empty container when none exists.
    fn create_file(filepath: &Path) -> AppResult<File> {
        if let Some(folder) = filepath.parent() {
            if !folder.as_os_str().is_empty() && !folder.is_dir() {
                std::fs::create_dir_all(folder).map_err(|source| DaqError::CreateDirectory {
                    path: folder.to_path_buf(),
                    source,
                })?;
            }
        }

        let file = File::append(filepath)?;
        if !has_attr(&file, "created_at")? {
            write_text_attr(&file, "created_at", &chrono::Utc::now().to_rfc3339().into())?;
            write_text_attr(
                &file,
                "application",
                &format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")).into(),
            )?;
        }

        info!(path = %filepath.display(), "HDF5 container opened");
        Ok(file)
    }

    fn data_arrays_group(file: &File) -> AppResult<Group> {
        if file.link_exists(DATA_ARRAYS_GROUP) {
            Ok(file.group(DATA_ARRAYS_GROUP)?)
        } else {
            Ok(file.create_group(DATA_ARRAYS_GROUP)?)
        }
    }

    /// Rows stored for `dset` and its column count.
    fn stored_shape(dset: &Dataset, array_id: &str) -> AppResult<(usize, usize)> {
        match dset.shape().as_slice() {
            [rows, columns] => Ok((*rows, *columns)),
            other => Err(DaqError::Shape(format!(
                "stored array '{}' has shape {:?}, expected (rows, columns)",
                array_id, other
            ))),
        }
    }

    impl Hdf5Format {
        fn create_dataarray_dset(
            &self,
            group: &Group,
            array: &DataArray,
            data_set: &DataSet,
        ) -> AppResult<Dataset> {
            let columns = array.column_count();
            let mut builder = group
                .new_dataset::<f64>()
                .shape((0.., columns))
                .chunk((self.chunk_rows, columns))
                .fill_value(f64::NAN);
            if self.compression_level > 0 {
                builder = builder.deflate(self.compression_level);
            }
            let dset = builder.create(array.array_id())?;

            write_text_attr(&dset, "label", &array.label().into())?;
            write_text_attr(&dset, "name", &array.name().into())?;
            write_text_attr(&dset, "units", &units_to_attr(array.units()).into())?;
            write_text_attr(&dset, "is_setpoint", &array.is_setpoint().into())?;
            if !array.is_setpoint() {
                let set_arrays = data_set.set_array_ids(array);
                write_text_attr(&dset, "set_arrays", &AttrValue::TextList(set_arrays))?;
            }

            debug!(array_id = array.array_id(), columns, "Created array storage");
            Ok(dset)
        }

        /// Grow `dset` to the populated length of `array` and write the new rows.
        fn append_rows(dset: &Dataset, array: &DataArray) -> AppResult<()> {
            let array_id = array.array_id();
            let (old_len, stored_columns) = stored_shape(dset, array_id)?;
            let columns = array.column_count();
            if stored_columns != columns {
                return Err(DaqError::Shape(format!(
                    "array '{}' has {} columns but its storage has {}",
                    array_id, columns, stored_columns
                )));
            }

            let new_len = array.populated_rows();
            if new_len <= old_len {
                trace!(array_id, old_len, new_len, "Nothing new to append");
                return Ok(());
            }

            let rows = array
                .values()
                .get(old_len * columns..new_len * columns)
                .ok_or_else(|| {
                    DaqError::Shape(format!("array '{}' is shorter than {} rows", array_id, new_len))
                })?;
            let view = ArrayView2::from_shape((new_len - old_len, columns), rows)
                .map_err(|e| DaqError::Shape(format!("array '{}': {}", array_id, e)))?;

            dset.resize((new_len, columns))?;
            dset.write_slice(view, s![old_len..new_len, ..])?;

            debug!(array_id, old_len, new_len, "Appended rows");
            Ok(())
        }

        /// Persist every populated row of `data_set` that is not stored yet.
        ///
        /// The first call (or any call with `force_write`) derives the container path
        /// from the data set location and opens it. Storage for an array is created on
        /// first sight together with its metadata attributes; with `force_write` an
        /// existing entry is replaced and rewritten from row zero.
        ///
        /// # Errors
        ///
        /// - [`DaqError::CreateDirectory`] / [`DaqError::Hdf5`] if the container cannot
        ///   be created or opened.
        /// - [`DaqError::Shape`] if an array's column count differs from its storage.
        /// - [`DaqError::Configuration`] if the container uses the single-table layout.
        pub fn write(&mut self, data_set: &DataSet, force_write: bool) -> AppResult<()> {
            if self.file.is_none() || force_write {
                let filepath = self.container_path(data_set)?;
                self.file = None;
                self.file = Some(create_file(&filepath)?);
                self.filepath = Some(filepath);
            }
            let file = self.file.as_ref().ok_or(DaqError::ContainerNotOpen)?;

            let group = data_arrays_group(file)?;
            if legacy::is_legacy(&group)? {
                return Err(DaqError::Configuration(
                    "container uses the single-table layout, which is read-only".to_string(),
                ));
            }

            for array in data_set.arrays() {
                let array_id = array.array_id();
                let exists = group.link_exists(array_id);
                if !exists || force_write {
                    if exists {
                        group.unlink(array_id)?;
                    }
                    self.create_dataarray_dset(&group, array, data_set)?;
                }
                let dset = group.dataset(array_id)?;
                Self::append_rows(&dset, array)?;
            }
            Ok(())
        }

        /// Load every array stored in the container into `data_set`.
        ///
        /// Arrays are added first; set-array ids are resolved into handles once all of
        /// them exist, so references may point at arrays stored later. The container
        /// stays open afterwards.
        ///
        /// # Errors
        ///
        /// - [`DaqError::InvalidBool`] if `is_setpoint` is not exactly `True`/`False`.
        /// - [`DaqError::MissingAttribute`] if `is_setpoint`, or `set_arrays` on a
        ///   dependent array, is absent.
        /// - [`DaqError::UnknownSetArray`] if a set array id is not stored.
        /// - [`DaqError::DuplicateArray`] if `data_set` already holds a stored id.
        pub fn read(&mut self, data_set: &mut DataSet) -> AppResult<()> {
            let filepath = self.read_path(data_set)?;
            let file = File::open_rw(&filepath)?;
            let group = file.group(DATA_ARRAYS_GROUP)?;

            if legacy::is_legacy(&group)? {
                legacy::read_single_table(&group, data_set)?;
            } else {
                read_array_group(&group, data_set)?;
            }

            info!(path = %filepath.display(), arrays = data_set.len(), "HDF5 container read");
            self.file = Some(file);
            self.filepath = Some(filepath);
            Ok(())
        }

        /// Dump the last known value of every instrument parameter into `Meta-data`.
        ///
        /// Instruments and parameters are written in name order. A parameter without
        /// a value is stored as an empty string. The snapshot is written once per
        /// container.
        ///
        /// # Errors
        ///
        /// - [`DaqError::ContainerNotOpen`] before the first `write` or `read`.
        /// - [`DaqError::SnapshotExists`] if the container already holds a snapshot.
        pub fn save_instrument_snapshot(&mut self, snapshot: &StationSnapshot) -> AppResult<()> {
            let file = self.file.as_ref().ok_or(DaqError::ContainerNotOpen)?;
            if file.link_exists(META_DATA_GROUP) {
                return Err(DaqError::SnapshotExists(
                    self.filepath.clone().unwrap_or_default(),
                ));
            }

            let metadata = file.create_group(META_DATA_GROUP)?;
            for (instrument, parameters) in snapshot.sorted_values() {
                let group = metadata.create_group(instrument)?;
                for (parameter, value) in parameters {
                    write_text_attr(&group, parameter, &AttrValue::Text(value))?;
                }
            }
            debug!("Instrument snapshot saved");
            Ok(())
        }

        /// Flush and release the container.
        ///
        /// # Errors
        ///
        /// Returns [`DaqError::Hdf5`] if the flush fails; the handle is released anyway.
        pub fn close(&mut self) -> AppResult<()> {
            let path = self.filepath.take();
            if let Some(file) = self.file.take() {
                file.flush()?;
                if let Some(path) = path {
                    info!(path = %path.display(), "HDF5 container closed");
                }
            }
            Ok(())
        }
    }

    /// Stored table as row-major values plus its column count.
    fn read_table(dset: &Dataset, array_id: &str) -> AppResult<(Vec<f64>, usize)> {
        let columns = match dset.ndim() {
            1 => 1,
            2 => stored_shape(dset, array_id)?.1,
            ndim => {
                return Err(DaqError::Shape(format!(
                    "stored array '{}' has {} dimensions",
                    array_id, ndim
                )))
            }
        };
        let values = if dset.size() == 0 {
            Vec::new()
        } else {
            dset.read_raw::<f64>()?
        };
        Ok((values, columns))
    }

    fn read_array_group(group: &Group, data_set: &mut DataSet) -> AppResult<()> {
        let mut pending = Vec::new();

        for array_id in group.member_names()? {
            let dset = group.dataset(&array_id)?;

            let label = read_text_attr(&dset, "label")?;
            let name = read_text_attr(&dset, "name")?;
            let units = read_text_attr(&dset, "units")?
                .and_then(|text| units_from_attr(&text))
                .unwrap_or_default();
            let flag = read_text_attr(&dset, "is_setpoint")?.ok_or_else(|| {
                DaqError::MissingAttribute {
                    array_id: array_id.clone(),
                    attribute: "is_setpoint".to_string(),
                }
            })?;
            let is_setpoint = str_to_bool(&flag)?;
            let set_array_ids = if is_setpoint {
                Vec::new()
            } else {
                read_text_list_attr(&dset, "set_arrays")?.ok_or_else(|| {
                    DaqError::MissingAttribute {
                        array_id: array_id.clone(),
                        attribute: "set_arrays".to_string(),
                    }
                })?
            };

            let (mut values, columns) = read_table(&dset, &array_id)?;
            let mut array = DataArray::new(array_id.clone());
            if let Some(label) = label {
                array = array.with_label(label);
            }
            if let Some(name) = name {
                array = array.with_name(name);
            }
            if is_setpoint {
                array = array.setpoint();
            }

            if units.len().max(1) == columns {
                array = array.with_units(units)?;
            } else {
                warn!(
                    array_id = array_id.as_str(),
                    units = units.len(),
                    columns,
                    "Units do not match stored columns, keeping the first column only"
                );
                values = values.chunks_exact(columns.max(1)).map(|row| row[0]).collect();
                if units.len() == 1 {
                    array = array.with_units(units)?;
                }
            }
            let handle = data_set.add_array(array.with_preset_data(values)?)?;

            if !set_array_ids.is_empty() {
                pending.push((handle, set_array_ids));
            }
        }

        data_set.resolve_set_arrays(pending)
    }
}

#[cfg(not(feature = "storage_hdf5"))]
impl Hdf5Format {
    /// Requires the `storage_hdf5` feature.
    ///
    /// # Errors
    ///
    /// Always returns [`DaqError::FeatureNotEnabled`].
    pub fn write(&mut self, _data_set: &DataSet, _force_write: bool) -> AppResult<()> {
        Err(DaqError::FeatureNotEnabled("storage_hdf5".to_string()))
    }

    /// Requires the `storage_hdf5` feature.
    ///
    /// # Errors
    ///
    /// Always returns [`DaqError::FeatureNotEnabled`].
    pub fn read(&mut self, _data_set: &mut DataSet) -> AppResult<()> {
        Err(DaqError::FeatureNotEnabled("storage_hdf5".to_string()))
    }

    /// Requires the `storage_hdf5` feature.
    ///
    /// # Errors
    ///
    /// Always returns [`DaqError::FeatureNotEnabled`].
    pub fn save_instrument_snapshot(&mut self, _snapshot: &StationSnapshot) -> AppResult<()> {
        Err(DaqError::FeatureNotEnabled("storage_hdf5".to_string()))
    }

    /// Nothing is ever opened without the `storage_hdf5` feature.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn close(&mut self) -> AppResult<()> {
        self.filepath = None;
        Ok(())
    }
}

impl Formatter for Hdf5Format {
    fn write(&mut self, data_set: &DataSet, force_write: bool) -> AppResult<()> {
        Hdf5Format::write(self, data_set, force_write)
    }

    fn read(&mut self, data_set: &mut DataSet) -> AppResult<()> {
        Hdf5Format::read(self, data_set)
    }

    fn close(&mut self) -> AppResult<()> {
        Hdf5Format::close(self)
    }
}
