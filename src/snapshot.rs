//! Instrument configuration snapshots.
//!
//! A [`StationSnapshot`] is the nested mapping
//! `instrument name -> parameter name -> {"value": ...}` that the formatter dumps into
//! the `Meta-data` section of a container. Instruments are passed in explicitly,
//! either through the [`Snapshot`] trait or as a qcodes-style JSON document.

use crate::error::{AppResult, DaqError};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Snapshot of one parameter, e.g. `{"value": 0.5, "unit": "V"}`.
pub type ParameterSnapshot = Map<String, Value>;

/// Anything that can describe its current parameter values.
pub trait Snapshot {
    /// Instrument name used as the snapshot group key.
    fn name(&self) -> &str;

    /// Current parameter snapshots keyed by parameter name.
    fn snapshot_parameters(&self) -> HashMap<String, ParameterSnapshot>;
}

/// Parameter snapshots of every instrument in a station.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationSnapshot {
    instruments: HashMap<String, HashMap<String, ParameterSnapshot>>,
}

impl StationSnapshot {
    /// Empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect snapshots from explicitly passed instruments.
    pub fn from_instruments<'a, I>(instruments: I) -> Self
    where
        I: IntoIterator<Item = &'a dyn Snapshot>,
    {
        let instruments = instruments
            .into_iter()
            .map(|ins| (ins.name().to_string(), ins.snapshot_parameters()))
            .collect();
        Self { instruments }
    }

    /// Parse a station snapshot document of the form
    /// `{"instruments": {name: {"parameters": {param: {"value": ...}}}}}`.
    ///
    /// # Errors
    ///
    /// Returns [`DaqError::Decode`] if the document does not have that shape.
    pub fn from_json(document: &Value) -> AppResult<Self> {
        let instruments = document
            .get("instruments")
            .and_then(Value::as_object)
            .ok_or_else(|| DaqError::Decode("snapshot has no 'instruments' object".to_string()))?;

        let mut snapshot = Self::new();
        for (name, instrument) in instruments {
            let parameters = match instrument.get("parameters") {
                None => Map::new(),
                Some(Value::Object(parameters)) => parameters.clone(),
                Some(_) => {
                    return Err(DaqError::Decode(format!(
                        "instrument '{}' has malformed 'parameters'",
                        name
                    )))
                }
            };
            let entry = snapshot.instruments.entry(name.clone()).or_default();
            for (parameter, value) in parameters {
                let value = match value {
                    Value::Object(map) => map,
                    other => {
                        return Err(DaqError::Decode(format!(
                            "parameter '{}.{}' is not an object: {}",
                            name, parameter, other
                        )))
                    }
                };
                entry.insert(parameter, value);
            }
        }
        Ok(snapshot)
    }

    /// Record a parameter. `None` stores a snapshot without a `"value"` key.
    pub fn insert_parameter(
        &mut self,
        instrument: impl Into<String>,
        parameter: impl Into<String>,
        value: Option<Value>,
    ) {
        let mut snapshot = ParameterSnapshot::new();
        if let Some(value) = value {
            snapshot.insert("value".to_string(), value);
        }
        self.instruments
            .entry(instrument.into())
            .or_default()
            .insert(parameter.into(), snapshot);
    }

    /// True when no instrument is recorded.
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// Instruments and their stringified parameter values, both sorted by name.
    ///
    /// A parameter without a `"value"` entry maps to an empty string.
    pub fn sorted_values(&self) -> Vec<(&str, Vec<(&str, String)>)> {
        let mut instruments: Vec<_> = self
            .instruments
            .iter()
            .map(|(name, parameters)| {
                let mut values: Vec<_> = parameters
                    .iter()
                    .map(|(parameter, snapshot)| {
                        let value = snapshot.get("value").map(value_to_string).unwrap_or_default();
                        (parameter.as_str(), value)
                    })
                    .collect();
                values.sort_by(|a, b| a.0.cmp(b.0));
                (name.as_str(), values)
            })
            .collect();
        instruments.sort_by(|a, b| a.0.cmp(b.0));
        instruments
    }
}

/// Render a snapshot value as the text stored in the container.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
