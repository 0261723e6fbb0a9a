//! One named, growable measurement array.
//!
//! A [`DataArray`] holds row-major `f64` samples with a fixed number of columns.
//! Columns come from the unit descriptor: one unit (or none) means one column, a
//! three-element descriptor means three columns. Rows that have not been measured yet
//! hold `NaN`; the formatter only persists the leading rows that are free of it.

use crate::error::{AppResult, DaqError};
use std::ops::Deref;

/// Typed index of an array inside its owning [`crate::data::DataSet`].
///
/// Set-array relationships are stored as `ArrayRef`s rather than ids, so a dependent
/// array always points at a live sibling once the data set is assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArrayRef(usize);

impl ArrayRef {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position of the array in insertion order.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A named sequence of samples plus the metadata the container stores next to it.
#[derive(Debug, Clone)]
pub struct DataArray {
    array_id: String,
    name: Option<String>,
    label: Option<String>,
    units: Option<Vec<String>>,
    is_setpoint: bool,
    set_arrays: Vec<ArrayRef>,
    data: Vec<f64>,
}

impl DataArray {
    /// Create an empty, one-column array.
    pub fn new(array_id: impl Into<String>) -> Self {
        Self {
            array_id: array_id.into(),
            name: None,
            label: None,
            units: None,
            is_setpoint: false,
            set_arrays: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Override the human-readable name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Override the display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the unit descriptor. Its length fixes the column count.
    ///
    /// An empty descriptor is the same as no units. Give units before samples: a
    /// buffer of unmeasured (`NaN`) rows is re-laid out at the same row count, but
    /// measured samples are never reinterpreted under a new column count.
    ///
    /// # Errors
    ///
    /// Returns [`DaqError::Shape`] if the column count changes while the buffer holds
    /// measured samples.
    pub fn with_units<I, S>(mut self, units: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rows = self.rows();
        let units: Vec<String> = units.into_iter().map(Into::into).collect();
        let columns = units.len().max(1);
        if columns != self.column_count() {
            if self.data.iter().any(|v| !v.is_nan()) {
                return Err(DaqError::Shape(format!(
                    "array '{}': cannot change from {} to {} columns after samples were set",
                    self.array_id,
                    self.column_count(),
                    columns
                )));
            }
            self.data = vec![f64::NAN; rows * columns];
        }
        self.units = if units.is_empty() { None } else { Some(units) };
        Ok(self)
    }

    /// Mark the array as an independent (swept) variable.
    ///
    /// Setpoint arrays never carry set arrays, so any previously given ones are dropped.
    pub fn setpoint(mut self) -> Self {
        self.is_setpoint = true;
        self.set_arrays.clear();
        self
    }

    /// Arrays this one was measured against, in order.
    pub fn with_set_arrays(mut self, set_arrays: impl IntoIterator<Item = ArrayRef>) -> Self {
        self.set_arrays = set_arrays.into_iter().collect();
        self
    }

    /// Allocate `rows` rows of `NaN`.
    pub fn preallocated(mut self, rows: usize) -> Self {
        self.data = vec![f64::NAN; rows * self.column_count()];
        self
    }

    /// Use `values` (row-major) as the sample buffer.
    ///
    /// # Errors
    ///
    /// Returns [`DaqError::Shape`] if the length is not a multiple of the column count.
    pub fn with_preset_data(mut self, values: Vec<f64>) -> AppResult<Self> {
        let columns = self.column_count();
        if values.len() % columns != 0 {
            return Err(DaqError::Shape(format!(
                "array '{}': {} values cannot be split into rows of {} columns",
                self.array_id,
                values.len(),
                columns
            )));
        }
        self.data = values;
        Ok(self)
    }

    /// Unique key within the data set.
    pub fn array_id(&self) -> &str {
        &self.array_id
    }

    /// Human-readable name, falling back to the array id.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.array_id)
    }

    /// Display label, falling back to the array id.
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.array_id)
    }

    /// Unit descriptor, if any.
    pub fn units(&self) -> Option<&[String]> {
        self.units.as_deref()
    }

    /// Whether this is an independent (swept) variable.
    pub fn is_setpoint(&self) -> bool {
        self.is_setpoint
    }

    /// Arrays this one depends on.
    pub fn set_arrays(&self) -> &[ArrayRef] {
        &self.set_arrays
    }

    /// Number of columns, fixed by the unit descriptor (one when absent).
    pub fn column_count(&self) -> usize {
        self.units.as_ref().map_or(1, Vec::len)
    }

    /// Number of allocated rows, populated or not.
    pub fn rows(&self) -> usize {
        self.data.len() / self.column_count()
    }

    /// Row-major sample buffer.
    pub fn values(&self) -> &[f64] {
        &self.data
    }

    /// One row, if allocated.
    pub fn row(&self, row: usize) -> Option<&[f64]> {
        let columns = self.column_count();
        self.data.get(row * columns..(row + 1) * columns)
    }

    /// Count of leading rows that contain no `NaN`.
    pub fn populated_rows(&self) -> usize {
        self.data
            .chunks_exact(self.column_count())
            .take_while(|row| row.iter().all(|v| !v.is_nan()))
            .count()
    }

    /// Set a sample of a one-column array.
    ///
    /// # Errors
    ///
    /// Returns [`DaqError::Shape`] for multi-column arrays or unallocated rows.
    pub fn set(&mut self, row: usize, value: f64) -> AppResult<()> {
        self.set_row(row, &[value])
    }

    /// Overwrite one allocated row.
    ///
    /// # Errors
    ///
    /// Returns [`DaqError::Shape`] if `values` does not match the column count or the
    /// row is not allocated.
    pub fn set_row(&mut self, row: usize, values: &[f64]) -> AppResult<()> {
        self.check_row_width(values)?;
        let columns = self.column_count();
        let rows = self.rows();
        let slot = self
            .data
            .get_mut(row * columns..(row + 1) * columns)
            .ok_or_else(|| {
                DaqError::Shape(format!(
                    "array '{}': row {} is outside the {} allocated rows",
                    self.array_id, row, rows
                ))
            })?;
        slot.copy_from_slice(values);
        Ok(())
    }

    /// Append a row past the current end, for measurements of unknown length.
    ///
    /// # Errors
    ///
    /// Returns [`DaqError::Shape`] if `values` does not match the column count.
    pub fn push_row(&mut self, values: &[f64]) -> AppResult<()> {
        self.check_row_width(values)?;
        self.data.extend_from_slice(values);
        Ok(())
    }

    pub(crate) fn link_set_arrays(&mut self, set_arrays: Vec<ArrayRef>) {
        self.set_arrays = set_arrays;
    }

    fn check_row_width(&self, values: &[f64]) -> AppResult<()> {
        if values.len() != self.column_count() {
            return Err(DaqError::Shape(format!(
                "array '{}' has {} columns, got a row of {}",
                self.array_id,
                self.column_count(),
                values.len()
            )));
        }
        Ok(())
    }
}

/// Sample access to an array owned by a [`crate::data::DataSet`].
///
/// Reads go through to the array; writes are limited to samples, so the id, metadata
/// and set arrays of an added array cannot change. The array itself cannot be
/// swapped out through the view:
///
/// ```compile_fail
/// use rust_daq_format::{DataArray, DataSet, DiskIo};
///
/// let mut data_set = DataSet::new("run", DiskIo::default());
/// data_set.add_array(DataArray::new("x")).unwrap();
/// *data_set.array_mut("x").unwrap() = DataArray::new("y");
/// ```
#[derive(Debug)]
pub struct DataArrayMut<'a> {
    array: &'a mut DataArray,
}

impl<'a> DataArrayMut<'a> {
    pub(crate) fn new(array: &'a mut DataArray) -> Self {
        Self { array }
    }

    /// See [`DataArray::set`].
    ///
    /// # Errors
    ///
    /// Returns [`DaqError::Shape`] for multi-column arrays or unallocated rows.
    pub fn set(&mut self, row: usize, value: f64) -> AppResult<()> {
        self.array.set(row, value)
    }

    /// See [`DataArray::set_row`].
    ///
    /// # Errors
    ///
    /// Returns [`DaqError::Shape`] on a width mismatch or an unallocated row.
    pub fn set_row(&mut self, row: usize, values: &[f64]) -> AppResult<()> {
        self.array.set_row(row, values)
    }

    /// See [`DataArray::push_row`].
    ///
    /// # Errors
    ///
    /// Returns [`DaqError::Shape`] on a width mismatch.
    pub fn push_row(&mut self, values: &[f64]) -> AppResult<()> {
        self.array.push_row(values)
    }
}

impl Deref for DataArrayMut<'_> {
    type Target = DataArray;

    fn deref(&self) -> &DataArray {
        self.array
    }
}
