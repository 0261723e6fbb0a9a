//! Read support for the single-table layout.
//!
//! Older containers keep the whole data set in one table, `Data Arrays/Data`, with one
//! column per array. The table carries `column names` (a text list) and `labels`,
//! `names` and `units` (Python list literals). The `Data Arrays` group is tagged with
//! `datasaving_format = "QCodes hdf5 v0.1"`.
//!
//! This layout is never written. Columns come back as one-column dependent arrays
//! without set arrays, since the layout does not record them.

/// Value of the `datasaving_format` tag on single-table containers.
pub const LEGACY_FORMAT_TAG: &str = "QCodes hdf5 v0.1";

/// Name of the table holding every column.
pub const LEGACY_TABLE: &str = "Data";

/// Attribute on the `Data Arrays` group naming the layout version.
pub const FORMAT_TAG_ATTR: &str = "datasaving_format";

#[cfg(feature = "storage_hdf5")]
pub(crate) use self::reader::{is_legacy, read_single_table};

#[cfg(feature = "storage_hdf5")]
mod reader {
    use super::{FORMAT_TAG_ATTR, LEGACY_FORMAT_TAG, LEGACY_TABLE};
    use crate::data::{DataArray, DataSet};
    use crate::error::{AppResult, DaqError};
    use crate::format::attrs::{parse_list_repr, read_text_attr, read_text_list_attr, units_from_attr};
    use hdf5::{Dataset, Group};
    use tracing::debug;

    /// True if `group` is a tagged single-table `Data Arrays` group.
    pub(crate) fn is_legacy(group: &Group) -> AppResult<bool> {
        let tagged = read_text_attr(group, FORMAT_TAG_ATTR)?.as_deref() == Some(LEGACY_FORMAT_TAG);
        Ok(tagged && group.link_exists(LEGACY_TABLE))
    }

    fn list_attr(table: &Dataset, name: &str) -> AppResult<Vec<Option<String>>> {
        Ok(read_text_attr(table, name)?
            .and_then(|text| parse_list_repr(&text))
            .unwrap_or_default())
    }

    fn entry(list: &[Option<String>], column: usize) -> Option<String> {
        list.get(column).cloned().flatten()
    }

    /// Split the single table into one array per column.
    pub(crate) fn read_single_table(group: &Group, data_set: &mut DataSet) -> AppResult<()> {
        let table = group.dataset(LEGACY_TABLE)?;
        let (rows, columns) = match table.shape().as_slice() {
            [rows, columns] => (*rows, *columns),
            other => {
                return Err(DaqError::Shape(format!(
                    "single-table layout expects a 2-D table, found shape {:?}",
                    other
                )))
            }
        };

        let ids = read_text_list_attr(&table, "column names")?.ok_or_else(|| {
            DaqError::MissingAttribute {
                array_id: LEGACY_TABLE.to_string(),
                attribute: "column names".to_string(),
            }
        })?;
        if ids.len() != columns {
            return Err(DaqError::Shape(format!(
                "{} column names for a table of {} columns",
                ids.len(),
                columns
            )));
        }
        if columns == 0 {
            return Ok(());
        }

        let values = if table.size() == 0 {
            Vec::new()
        } else {
            table.read_raw::<f64>()?
        };
        let labels = list_attr(&table, "labels")?;
        let names = list_attr(&table, "names")?;
        let units = list_attr(&table, "units")?;

        for (column, array_id) in ids.into_iter().enumerate() {
            let samples: Vec<f64> = values
                .chunks_exact(columns)
                .filter_map(|row| row.get(column).copied())
                .collect();

            let mut array = DataArray::new(array_id);
            if let Some(label) = entry(&labels, column) {
                array = array.with_label(label);
            }
            if let Some(name) = entry(&names, column) {
                array = array.with_name(name);
            }
            if let Some(unit) = entry(&units, column).and_then(|u| units_from_attr(&u)) {
                if unit.len() == 1 {
                    array = array.with_units(unit)?;
                }
            }
            data_set.add_array(array.with_preset_data(samples)?)?;
        }

        debug!(rows, columns, "Read single-table layout");
        Ok(())
    }
}
