//! End-to-end tests of the HDF5 array store against real files.
#![cfg(feature = "storage_hdf5")]

use hdf5::types::{FixedAscii, FixedUnicode, VarLenAscii, VarLenUnicode};
use rust_daq_format::format::{DATA_ARRAYS_GROUP, META_DATA_GROUP};
use rust_daq_format::{DaqError, DataArray, DataSet, DiskIo, Formatter, Hdf5Format, StationSnapshot};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::TempDir;

const NAN: f64 = f64::NAN;

/// Setpoint `x` and dependent `y`, five rows declared, three populated.
fn sweep_data_set(dir: &TempDir, location: &str) -> DataSet {
    let mut data_set = DataSet::new(location, DiskIo::new(dir.path()));
    let x = data_set
        .add_array(
            DataArray::new("x")
                .with_label("Gate")
                .with_units(["V"])
                .unwrap()
                .setpoint()
                .with_preset_data(vec![0.0, 1.0, 2.0, NAN, NAN])
                .unwrap(),
        )
        .unwrap();
    data_set
        .add_array(
            DataArray::new("y")
                .with_name("current")
                .with_units(["A"])
                .unwrap()
                .with_set_arrays([x])
                .with_preset_data(vec![10.0, 11.0, 12.0, NAN, NAN])
                .unwrap(),
        )
        .unwrap();
    data_set
}

fn stored_table(path: &Path, array_id: &str) -> (Vec<usize>, Vec<f64>) {
    let file = hdf5::File::open(path).unwrap();
    let dset = file
        .group(DATA_ARRAYS_GROUP)
        .unwrap()
        .dataset(array_id)
        .unwrap();
    let values = if dset.size() == 0 {
        Vec::new()
    } else {
        dset.read_raw::<f64>().unwrap()
    };
    (dset.shape(), values)
}

fn text(value: &str) -> VarLenUnicode {
    value.parse().unwrap()
}

fn write_text(location: &hdf5::Location, name: &str, value: &str) {
    location
        .new_attr::<VarLenUnicode>()
        .create(name)
        .unwrap()
        .write_scalar(&text(value))
        .unwrap();
}

fn write_text_list(location: &hdf5::Location, name: &str, values: &[&str]) {
    let values: Vec<VarLenUnicode> = values.iter().map(|v| text(v)).collect();
    location
        .new_attr::<VarLenUnicode>()
        .shape((values.len(),))
        .create(name)
        .unwrap()
        .write_raw(values.as_slice())
        .unwrap();
}

/// Hand-built container with a single `Data Arrays` group for corrupted layouts.
fn raw_container(dir: &TempDir, location: &str) -> (DataSet, hdf5::Group, hdf5::File) {
    let folder = dir.path().join(location);
    std::fs::create_dir_all(&folder).unwrap();
    let file = hdf5::File::create(folder.join(format!("{}.hdf5", location))).unwrap();
    let group = file.create_group(DATA_ARRAYS_GROUP).unwrap();
    (DataSet::new(location, DiskIo::new(dir.path())), group, file)
}

fn raw_array(group: &hdf5::Group, array_id: &str, values: &[f64], is_setpoint: &str) -> hdf5::Dataset {
    let dset = group
        .new_dataset::<f64>()
        .shape((values.len(), 1))
        .create(array_id)
        .unwrap();
    dset.write_raw(values).unwrap();
    write_text(&dset, "label", array_id);
    write_text(&dset, "name", array_id);
    write_text(&dset, "units", "");
    write_text(&dset, "is_setpoint", is_setpoint);
    dset
}

#[test]
fn test_incremental_append_keeps_existing_rows() {
    let dir = TempDir::new().unwrap();
    let mut data_set = sweep_data_set(&dir, "run");
    let mut format = Hdf5Format::new();

    format.write(&data_set, false).unwrap();
    let path = format.filepath().unwrap().to_path_buf();
    assert_eq!(path, dir.path().join("run/run.hdf5"));

    // Stored rows must survive even if the in-memory copy drifts.
    data_set.array_mut("x").unwrap().set(0, 99.0).unwrap();
    data_set.array_mut("x").unwrap().set(3, 3.0).unwrap();
    data_set.array_mut("y").unwrap().set(3, 13.0).unwrap();
    format.write(&data_set, false).unwrap();
    format.close().unwrap();

    assert_eq!(stored_table(&path, "x"), (vec![4, 1], vec![0.0, 1.0, 2.0, 3.0]));
    assert_eq!(
        stored_table(&path, "y"),
        (vec![4, 1], vec![10.0, 11.0, 12.0, 13.0])
    );
}

#[test]
fn test_repeated_write_is_noop() {
    let dir = TempDir::new().unwrap();
    let data_set = sweep_data_set(&dir, "run");
    let mut format = Hdf5Format::new();

    format.write(&data_set, false).unwrap();
    format.write(&data_set, false).unwrap();
    format.write(&data_set, false).unwrap();
    let path = format.filepath().unwrap().to_path_buf();
    format.close().unwrap();

    assert_eq!(stored_table(&path, "x"), (vec![3, 1], vec![0.0, 1.0, 2.0]));
}

#[test]
fn test_stored_rows_never_shrink() {
    let dir = TempDir::new().unwrap();
    let mut data_set = sweep_data_set(&dir, "run");
    let mut format = Hdf5Format::new();

    format.write(&data_set, false).unwrap();
    data_set.array_mut("y").unwrap().set(1, NAN).unwrap();
    format.write(&data_set, false).unwrap();
    let path = format.filepath().unwrap().to_path_buf();
    format.close().unwrap();

    assert_eq!(
        stored_table(&path, "y"),
        (vec![3, 1], vec![10.0, 11.0, 12.0])
    );
}

#[test]
fn test_force_write_rewrites_from_scratch() {
    let dir = TempDir::new().unwrap();
    let mut data_set = sweep_data_set(&dir, "run");
    let mut format = Hdf5Format::new();

    format.write(&data_set, false).unwrap();
    data_set.array_mut("x").unwrap().set(0, -1.0).unwrap();
    format.write(&data_set, true).unwrap();
    let path = format.filepath().unwrap().to_path_buf();
    format.close().unwrap();

    assert_eq!(stored_table(&path, "x"), (vec![3, 1], vec![-1.0, 1.0, 2.0]));
}

#[test]
fn test_nested_location_creates_directories() {
    let dir = TempDir::new().unwrap();
    let data_set = sweep_data_set(&dir, "2024-05-02/#007_sweep");
    let mut format = Hdf5Format::new();

    format.write(&data_set, false).unwrap();
    format.close().unwrap();

    assert!(dir
        .path()
        .join("2024-05-02/#007_sweep/#007_sweep.hdf5")
        .is_file());
}

#[test]
fn test_read_round_trip_links_set_arrays() {
    let dir = TempDir::new().unwrap();
    let data_set = sweep_data_set(&dir, "run");
    let mut format = Hdf5Format::new();
    format.write(&data_set, false).unwrap();
    format.close().unwrap();

    let mut loaded = DataSet::new("run", DiskIo::new(dir.path()));
    let mut reader = Hdf5Format::new();
    reader.read(&mut loaded).unwrap();
    reader.close().unwrap();

    assert_eq!(loaded.len(), 2);
    let x = loaded.array("x").unwrap();
    assert!(x.is_setpoint());
    assert_eq!(x.label(), "Gate");
    assert_eq!(x.units(), Some(&["V".to_string()][..]));
    assert_eq!(x.values(), &[0.0, 1.0, 2.0]);

    let y = loaded.array("y").unwrap();
    assert!(!y.is_setpoint());
    assert_eq!(y.name(), "current");
    assert_eq!(y.values(), &[10.0, 11.0, 12.0]);

    let set_arrays = loaded.set_arrays_of(y);
    assert_eq!(set_arrays.len(), 1);
    assert!(std::ptr::eq(set_arrays[0], x));
}

#[test]
fn test_read_accepts_container_file_path() {
    let dir = TempDir::new().unwrap();
    let data_set = sweep_data_set(&dir, "run");
    let mut format = Hdf5Format::new();
    format.write(&data_set, false).unwrap();
    format.close().unwrap();

    let mut loaded = DataSet::new("run/run.hdf5", DiskIo::new(dir.path()));
    let mut reader = Hdf5Format::new();
    Formatter::read(&mut reader, &mut loaded).unwrap();
    assert_eq!(loaded.set_array_ids(loaded.array("y").unwrap()), vec!["x"]);
}

#[test]
fn test_multi_column_units_and_width_mismatch() {
    let dir = TempDir::new().unwrap();
    let mut data_set = DataSet::new("spectrum", DiskIo::new(dir.path()));
    data_set
        .add_array(
            DataArray::new("iq")
                .with_units(["V", "V", "deg"])
                .unwrap()
                .with_preset_data(vec![1.0, 2.0, 90.0, 3.0, 4.0, 180.0])
                .unwrap(),
        )
        .unwrap();
    let mut format = Hdf5Format::new();
    format.write(&data_set, false).unwrap();
    let path = format.filepath().unwrap().to_path_buf();
    format.close().unwrap();
    assert_eq!(stored_table(&path, "iq").0, vec![2, 3]);

    let mut loaded = DataSet::new("spectrum", DiskIo::new(dir.path()));
    let mut reader = Hdf5Format::new();
    reader.read(&mut loaded).unwrap();
    reader.close().unwrap();
    let iq = loaded.array("iq").unwrap();
    assert_eq!(iq.column_count(), 3);
    assert_eq!(iq.row(1), Some(&[3.0, 4.0, 180.0][..]));

    let mut narrow = DataSet::new("spectrum", DiskIo::new(dir.path()));
    narrow
        .add_array(DataArray::new("iq").with_preset_data(vec![1.0, 3.0, 5.0]).unwrap())
        .unwrap();
    let mut other = Hdf5Format::new();
    assert!(matches!(
        other.write(&narrow, false),
        Err(DaqError::Shape(_))
    ));
}

#[test]
fn test_invalid_setpoint_flag_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (mut data_set, group, file) = raw_container(&dir, "broken");
    raw_array(&group, "x", &[0.0, 1.0], "yes");
    drop(group);
    drop(file);

    let mut reader = Hdf5Format::new();
    match reader.read(&mut data_set) {
        Err(DaqError::InvalidBool(value)) => assert_eq!(value, "yes"),
        other => panic!("expected InvalidBool, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_missing_set_arrays_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (mut data_set, group, file) = raw_container(&dir, "unlinked");
    raw_array(&group, "x", &[0.0, 1.0], "True");
    raw_array(&group, "y", &[1.0, 2.0], "False");
    drop(group);
    drop(file);

    let mut reader = Hdf5Format::new();
    match reader.read(&mut data_set) {
        Err(DaqError::MissingAttribute { array_id, attribute }) => {
            assert_eq!(array_id, "y");
            assert_eq!(attribute, "set_arrays");
        }
        other => panic!("expected MissingAttribute, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_empty_set_arrays_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut data_set = DataSet::new("lone", DiskIo::new(dir.path()));
    data_set
        .add_array(DataArray::new("counts").with_preset_data(vec![4.0, 5.0]).unwrap())
        .unwrap();
    let mut format = Hdf5Format::new();
    format.write(&data_set, false).unwrap();
    format.close().unwrap();

    let mut loaded = DataSet::new("lone", DiskIo::new(dir.path()));
    let mut reader = Hdf5Format::new();
    reader.read(&mut loaded).unwrap();
    assert!(loaded.array("counts").unwrap().set_arrays().is_empty());
}

#[test]
fn test_byte_string_attributes_are_read() {
    let dir = TempDir::new().unwrap();
    let (mut data_set, group, file) = raw_container(&dir, "bytes");

    let x = group
        .new_dataset::<f64>()
        .shape((2, 1))
        .create("x")
        .unwrap();
    x.write_raw(&[0.0, 1.0]).unwrap();
    x.new_attr::<FixedAscii<16>>()
        .create("is_setpoint")
        .unwrap()
        .write_scalar(&FixedAscii::<16>::from_ascii(b"True").unwrap())
        .unwrap();
    x.new_attr::<VarLenAscii>()
        .create("label")
        .unwrap()
        .write_scalar(&VarLenAscii::from_ascii(b"Gate").unwrap())
        .unwrap();
    x.new_attr::<FixedUnicode<32>>()
        .create("name")
        .unwrap()
        .write_scalar(&"gate voltage".parse::<FixedUnicode<32>>().unwrap())
        .unwrap();
    x.new_attr::<FixedAscii<8>>()
        .create("units")
        .unwrap()
        .write_scalar(&FixedAscii::<8>::from_ascii(b"V").unwrap())
        .unwrap();

    let y = group
        .new_dataset::<f64>()
        .shape((2, 1))
        .create("y")
        .unwrap();
    y.write_raw(&[5.0, 6.0]).unwrap();
    y.new_attr::<VarLenAscii>()
        .create("is_setpoint")
        .unwrap()
        .write_scalar(&VarLenAscii::from_ascii(b"False").unwrap())
        .unwrap();
    y.new_attr::<FixedAscii<4>>()
        .shape((1,))
        .create("set_arrays")
        .unwrap()
        .write_raw(&[FixedAscii::<4>::from_ascii(b"x").unwrap()])
        .unwrap();

    let z = group
        .new_dataset::<f64>()
        .shape((2, 1))
        .create("z")
        .unwrap();
    z.write_raw(&[7.0, 8.0]).unwrap();
    z.new_attr::<FixedAscii<8>>()
        .create("is_setpoint")
        .unwrap()
        .write_scalar(&FixedAscii::<8>::from_ascii(b"False").unwrap())
        .unwrap();
    z.new_attr::<VarLenAscii>()
        .shape((1,))
        .create("set_arrays")
        .unwrap()
        .write_raw(&[VarLenAscii::from_ascii(b"x").unwrap()])
        .unwrap();
    drop((x, y, z, group, file));

    let mut reader = Hdf5Format::new();
    reader.read(&mut data_set).unwrap();
    reader.close().unwrap();

    let x = data_set.array("x").unwrap();
    assert!(x.is_setpoint());
    assert_eq!(x.label(), "Gate");
    assert_eq!(x.name(), "gate voltage");
    assert_eq!(x.units(), Some(&["V".to_string()][..]));
    for id in ["y", "z"] {
        let array = data_set.array(id).unwrap();
        assert!(!array.is_setpoint());
        assert_eq!(data_set.set_array_ids(array), vec!["x"]);
    }
}

#[test]
fn test_trailing_nan_rows_are_read() {
    let dir = TempDir::new().unwrap();
    let (mut data_set, group, file) = raw_container(&dir, "partial");
    raw_array(&group, "x", &[0.0, 1.0, NAN, NAN], "True");
    drop(group);
    drop(file);

    let mut reader = Hdf5Format::new();
    reader.read(&mut data_set).unwrap();
    reader.close().unwrap();

    let x = data_set.array("x").unwrap();
    assert_eq!(x.rows(), 4);
    assert_eq!(x.populated_rows(), 2);
    assert_eq!(&x.values()[..2], &[0.0, 1.0]);
    assert!(x.values()[2..].iter().all(|v| v.is_nan()));
}

#[test]
fn test_dangling_set_array_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (mut data_set, group, file) = raw_container(&dir, "dangling");
    let y = raw_array(&group, "y", &[1.0, 2.0], "False");
    write_text_list(&y, "set_arrays", &["x"]);
    drop(y);
    drop(group);
    drop(file);

    let mut reader = Hdf5Format::new();
    match reader.read(&mut data_set) {
        Err(DaqError::UnknownSetArray { array_id, missing }) => {
            assert_eq!(array_id, "y");
            assert_eq!(missing, "x");
        }
        other => panic!("expected UnknownSetArray, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_forward_set_array_reference_resolves() {
    let dir = TempDir::new().unwrap();
    let (mut data_set, group, file) = raw_container(&dir, "forward");
    // "a" sorts before its set array "b".
    let a = raw_array(&group, "a", &[5.0, 6.0], "False");
    write_text_list(&a, "set_arrays", &["b"]);
    raw_array(&group, "b", &[0.0, 1.0], "True");
    drop(a);
    drop(group);
    drop(file);

    let mut reader = Hdf5Format::new();
    reader.read(&mut data_set).unwrap();
    let a = data_set.array("a").unwrap();
    assert_eq!(data_set.set_array_ids(a), vec!["b"]);
    assert!(a.units().is_none());
}

#[test]
fn test_single_table_layout_is_read() {
    let dir = TempDir::new().unwrap();
    let (mut data_set, group, file) = raw_container(&dir, "legacy");
    write_text(&group, "datasaving_format", "QCodes hdf5 v0.1");
    let table = group
        .new_dataset::<f64>()
        .shape((3, 2))
        .create("Data")
        .unwrap();
    table
        .write_raw(&[0.0, 10.0, 1.0, 11.0, 2.0, 12.0])
        .unwrap();
    write_text_list(&table, "column names", &["gate", "current"]);
    write_text(&table, "labels", "['Gate', 'Current']");
    write_text(&table, "names", "['gate', None]");
    write_text(&table, "units", "['V', 'A']");
    drop(table);
    drop(group);
    drop(file);

    let mut reader = Hdf5Format::new();
    reader.read(&mut data_set).unwrap();
    reader.close().unwrap();

    let gate = data_set.array("gate").unwrap();
    assert_eq!(gate.values(), &[0.0, 1.0, 2.0]);
    assert_eq!(gate.label(), "Gate");
    assert_eq!(gate.units(), Some(&["V".to_string()][..]));

    let current = data_set.array("current").unwrap();
    assert_eq!(current.values(), &[10.0, 11.0, 12.0]);
    assert_eq!(current.name(), "current");
    assert!(current.set_arrays().is_empty());

    let mut writer = Hdf5Format::new();
    assert!(matches!(
        writer.write(&data_set, false),
        Err(DaqError::Configuration(_))
    ));
}

fn stored_snapshot(path: &Path) -> BTreeMap<String, BTreeMap<String, String>> {
    let file = hdf5::File::open(path).unwrap();
    let metadata = file.group(META_DATA_GROUP).unwrap();
    let mut snapshot = BTreeMap::new();
    for instrument in metadata.member_names().unwrap() {
        let group = metadata.group(&instrument).unwrap();
        let mut parameters = BTreeMap::new();
        for name in group.attr_names().unwrap() {
            let value: VarLenUnicode = group.attr(&name).unwrap().read_scalar().unwrap();
            parameters.insert(name, value.as_str().to_string());
        }
        snapshot.insert(instrument, parameters);
    }
    snapshot
}

#[test]
fn test_snapshot_independent_of_insertion_order() {
    let dir = TempDir::new().unwrap();

    let mut forward = StationSnapshot::new();
    forward.insert_parameter("yoko", "voltage", Some(json!(0.5)));
    forward.insert_parameter("yoko", "output", Some(json!(true)));
    forward.insert_parameter("fsv", "span", Some(json!(1e6)));
    forward.insert_parameter("fsv", "mode", None);

    let mut backward = StationSnapshot::new();
    backward.insert_parameter("fsv", "mode", None);
    backward.insert_parameter("fsv", "span", Some(json!(1e6)));
    backward.insert_parameter("yoko", "output", Some(json!(true)));
    backward.insert_parameter("yoko", "voltage", Some(json!(0.5)));

    let mut paths = Vec::new();
    for (location, snapshot) in [("first", &forward), ("second", &backward)] {
        let mut format = Hdf5Format::new();
        format.write(&sweep_data_set(&dir, location), false).unwrap();
        format.save_instrument_snapshot(snapshot).unwrap();
        paths.push(format.filepath().unwrap().to_path_buf());
        format.close().unwrap();
    }

    let first = stored_snapshot(&paths[0]);
    assert_eq!(first, stored_snapshot(&paths[1]));
    assert_eq!(first["fsv"]["mode"], "");
    assert_eq!(first["yoko"]["output"], "True");
    assert_eq!(first["yoko"]["voltage"], "0.5");
}

#[test]
fn test_snapshot_requires_open_container_and_is_written_once() {
    let dir = TempDir::new().unwrap();
    let mut snapshot = StationSnapshot::new();
    snapshot.insert_parameter("yoko", "voltage", Some(json!(0.5)));

    let mut format = Hdf5Format::new();
    assert!(matches!(
        format.save_instrument_snapshot(&snapshot),
        Err(DaqError::ContainerNotOpen)
    ));

    format.write(&sweep_data_set(&dir, "run"), false).unwrap();
    format.save_instrument_snapshot(&snapshot).unwrap();
    assert!(matches!(
        format.save_instrument_snapshot(&snapshot),
        Err(DaqError::SnapshotExists(_))
    ));
}

#[test]
fn test_root_attributes_written_once() {
    let dir = TempDir::new().unwrap();
    let data_set = sweep_data_set(&dir, "run");

    let mut format = Hdf5Format::new();
    format.write(&data_set, false).unwrap();
    let path = format.filepath().unwrap().to_path_buf();
    format.close().unwrap();

    let created_at = |path: &Path| -> String {
        let file = hdf5::File::open(path).unwrap();
        let value: VarLenUnicode = file.attr("created_at").unwrap().read_scalar().unwrap();
        value.as_str().to_string()
    };
    let first = created_at(&path);
    assert!(chrono::DateTime::parse_from_rfc3339(&first).is_ok());

    let mut again = Hdf5Format::new();
    again.write(&data_set, true).unwrap();
    again.close().unwrap();
    assert_eq!(created_at(&path), first);
}
