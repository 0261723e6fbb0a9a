//! In-memory collection of the arrays of one measurement run.

use super::data_array::{ArrayRef, DataArray, DataArrayMut};
use crate::error::{AppResult, DaqError};
use crate::io::DiskIo;
use std::collections::HashMap;

/// Arrays of one measurement plus the location they are persisted under.
///
/// Arrays live in an arena in insertion order and are addressed by [`ArrayRef`];
/// the id index keeps array ids unique.
#[derive(Debug, Clone, Default)]
pub struct DataSet {
    location: String,
    io: DiskIo,
    arrays: Vec<DataArray>,
    index: HashMap<String, ArrayRef>,
}

impl DataSet {
    /// Create an empty data set at `location`, resolved through `io`.
    pub fn new(location: impl Into<String>, io: DiskIo) -> Self {
        Self {
            location: location.into(),
            io,
            arrays: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Path-like location of the measurement.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// IO manager resolving the location on disk.
    pub fn io(&self) -> &DiskIo {
        &self.io
    }

    /// Add an array and return its handle.
    ///
    /// # Errors
    ///
    /// - [`DaqError::DuplicateArray`] if the id is already taken.
    /// - [`DaqError::InvalidArray`] if a setpoint array carries set arrays, or a set
    ///   array handle does not belong to this data set.
    pub fn add_array(&mut self, array: DataArray) -> AppResult<ArrayRef> {
        if self.index.contains_key(array.array_id()) {
            return Err(DaqError::DuplicateArray(array.array_id().to_string()));
        }
        if array.is_setpoint() && !array.set_arrays().is_empty() {
            return Err(DaqError::InvalidArray {
                array_id: array.array_id().to_string(),
                reason: "setpoint arrays cannot have set arrays".to_string(),
            });
        }
        if let Some(bad) = array
            .set_arrays()
            .iter()
            .find(|r| r.index() >= self.arrays.len())
        {
            return Err(DaqError::InvalidArray {
                array_id: array.array_id().to_string(),
                reason: format!("set array #{} is not part of this data set", bad.index()),
            });
        }

        let handle = ArrayRef::new(self.arrays.len());
        self.index.insert(array.array_id().to_string(), handle);
        self.arrays.push(array);
        Ok(handle)
    }

    /// Array behind a handle.
    pub fn get(&self, handle: ArrayRef) -> Option<&DataArray> {
        self.arrays.get(handle.index())
    }

    /// Sample access to the array behind a handle.
    pub fn get_mut(&mut self, handle: ArrayRef) -> Option<DataArrayMut<'_>> {
        self.arrays.get_mut(handle.index()).map(DataArrayMut::new)
    }

    /// Handle of the array with `array_id`.
    pub fn lookup(&self, array_id: &str) -> Option<ArrayRef> {
        self.index.get(array_id).copied()
    }

    /// Array with `array_id`.
    pub fn array(&self, array_id: &str) -> Option<&DataArray> {
        self.lookup(array_id).and_then(|h| self.get(h))
    }

    /// Sample access to the array with `array_id`.
    pub fn array_mut(&mut self, array_id: &str) -> Option<DataArrayMut<'_>> {
        self.lookup(array_id).and_then(move |h| self.get_mut(h))
    }

    /// Arrays in insertion order.
    pub fn arrays(&self) -> impl Iterator<Item = &DataArray> {
        self.arrays.iter()
    }

    /// Number of arrays.
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    /// True when no array has been added.
    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// The set arrays of `array`, resolved to the arrays themselves.
    pub fn set_arrays_of<'a>(&'a self, array: &DataArray) -> Vec<&'a DataArray> {
        array
            .set_arrays()
            .iter()
            .filter_map(|h| self.get(*h))
            .collect()
    }

    /// Ids of the set arrays of `array`, in order.
    pub fn set_array_ids(&self, array: &DataArray) -> Vec<String> {
        self.set_arrays_of(array)
            .into_iter()
            .map(|a| a.array_id().to_string())
            .collect()
    }

    /// Resolve string references into handles once every array has been added.
    ///
    /// # Errors
    ///
    /// Returns [`DaqError::UnknownSetArray`] for an id absent from the data set.
    pub(crate) fn resolve_set_arrays(&mut self, pending: Vec<(ArrayRef, Vec<String>)>) -> AppResult<()> {
        for (handle, ids) in pending {
            let mut resolved = Vec::with_capacity(ids.len());
            for id in ids {
                match self.lookup(&id) {
                    Some(set_array) => resolved.push(set_array),
                    None => {
                        let array_id = self
                            .get(handle)
                            .map(|a| a.array_id().to_string())
                            .unwrap_or_default();
                        return Err(DaqError::UnknownSetArray {
                            array_id,
                            missing: id,
                        });
                    }
                }
            }
            if let Some(array) = self.arrays.get_mut(handle.index()) {
                array.link_set_arrays(resolved);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep() -> (DataSet, ArrayRef, ArrayRef) {
        let mut data_set = DataSet::new("run/sweep", DiskIo::default());
        let x = data_set
            .add_array(DataArray::new("x").setpoint().preallocated(3))
            .unwrap();
        let y = data_set
            .add_array(DataArray::new("y").with_set_arrays([x]).preallocated(3))
            .unwrap();
        (data_set, x, y)
    }

    #[test]
    fn test_add_and_lookup() {
        let (data_set, x, y) = sweep();
        assert_eq!(data_set.len(), 2);
        assert_eq!(data_set.lookup("x"), Some(x));
        assert_eq!(data_set.lookup("y"), Some(y));
        assert!(data_set.array("z").is_none());
    }

    #[test]
    fn test_set_arrays_resolve_to_siblings() {
        let (data_set, x, _) = sweep();
        let y = data_set.array("y").unwrap();
        let set_arrays = data_set.set_arrays_of(y);
        assert_eq!(set_arrays.len(), 1);
        assert!(std::ptr::eq(set_arrays[0], data_set.get(x).unwrap()));
        assert_eq!(data_set.set_array_ids(y), vec!["x".to_string()]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let (mut data_set, _, _) = sweep();
        let err = data_set.add_array(DataArray::new("x")).unwrap_err();
        assert!(matches!(err, DaqError::DuplicateArray(id) if id == "x"));
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let mut data_set = DataSet::new("run", DiskIo::default());
        let err = data_set
            .add_array(DataArray::new("y").with_set_arrays([ArrayRef::new(4)]))
            .unwrap_err();
        assert!(matches!(err, DaqError::InvalidArray { .. }));
    }

    #[test]
    fn test_resolve_unknown_id() {
        let mut data_set = DataSet::new("run", DiskIo::default());
        let y = data_set.add_array(DataArray::new("y")).unwrap();
        let err = data_set
            .resolve_set_arrays(vec![(y, vec!["x".to_string()])])
            .unwrap_err();
        assert!(matches!(
            err,
            DaqError::UnknownSetArray { ref array_id, ref missing } if array_id == "y" && missing == "x"
        ));
    }

    #[test]
    fn test_resolve_forward_reference() {
        let mut data_set = DataSet::new("run", DiskIo::default());
        let y = data_set.add_array(DataArray::new("y")).unwrap();
        let x = data_set.add_array(DataArray::new("x").setpoint()).unwrap();
        data_set
            .resolve_set_arrays(vec![(y, vec!["x".to_string()])])
            .unwrap();
        assert_eq!(data_set.get(y).unwrap().set_arrays(), &[x]);
    }

    #[test]
    fn test_array_mut_keeps_ids_unique() {
        let (mut data_set, x, y) = sweep();
        data_set.array_mut("x").unwrap().set(0, 1.5).unwrap();
        data_set.get_mut(y).unwrap().push_row(&[7.0]).unwrap();
        assert_eq!(data_set.array("x").unwrap().values()[0], 1.5);
        assert_eq!(data_set.array("y").unwrap().rows(), 4);

        let ids: Vec<&str> = data_set.arrays().map(DataArray::array_id).collect();
        assert_eq!(ids, vec!["x", "y"]);
        assert_eq!(data_set.lookup("x"), Some(x));
        assert_eq!(data_set.array_mut("x").unwrap().array_id(), "x");
        assert_eq!(data_set.set_array_ids(data_set.get(y).unwrap()), vec!["x"]);
    }
}
