//! Shape normalization for feed payloads.
//!
//! The feed collapses a one-element collection into a bare object, so every
//! field that may hold several items goes through [`sequence`]. [`Record`] is
//! the accessor layer on top: each getter states whether the field is
//! required and what type it is read as.

use serde_json::{Map, Value};

use crate::coerce;
use crate::error::DecodeError;

/// Turn a value that is either one mapping or an array of mappings into a
/// uniform sequence of records.
///
/// Null, scalars and arrays holding anything but mappings fail with
/// [`DecodeError::UnexpectedShape`] naming `field`.
pub fn sequence<'a>(value: &'a Value, field: &str) -> Result<Vec<Record<'a>>, DecodeError> {
    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(map) => Ok(Record::new(map)),
                _ => Err(DecodeError::UnexpectedShape {
                    field: format!("{}[{}]", field, i),
                    expected: "object",
                }),
            })
            .collect(),
        Value::Object(map) => Ok(vec![Record::new(map)]),
        _ => Err(DecodeError::UnexpectedShape {
            field: field.to_string(),
            expected: "object or array of objects",
        }),
    }
}

/// Read-only view of one JSON mapping in a feed payload.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> Record<'a> {
    pub fn new(map: &'a Map<String, Value>) -> Self {
        Self { map }
    }

    pub fn from_value(value: &'a Value, field: &str) -> Result<Self, DecodeError> {
        value
            .as_object()
            .map(Record::new)
            .ok_or_else(|| DecodeError::UnexpectedShape {
                field: field.to_string(),
                expected: "object",
            })
    }

    // Explicit nulls read as absent.
    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn required_str(&self, key: &str) -> Result<String, DecodeError> {
        let value = self.get(key).ok_or_else(|| missing(key))?;
        coerce::to_string(value).ok_or_else(|| DecodeError::UnexpectedShape {
            field: key.to_string(),
            expected: "string",
        })
    }

    pub fn optional_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(coerce::to_string)
    }

    pub fn optional_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(coerce::to_float)
    }

    pub fn required_i64(&self, key: &str) -> Result<i64, DecodeError> {
        let value = self.get(key).ok_or_else(|| missing(key))?;
        coerce::to_int(value).ok_or_else(|| DecodeError::InvalidValue {
            field: key.to_string(),
            value: value.to_string(),
        })
    }

    pub fn optional_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(coerce::to_int)
    }

    /// Boolean flag, false when absent or unreadable.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).and_then(coerce::to_bool).unwrap_or(false)
    }

    pub fn required_child(&self, key: &str) -> Result<Record<'a>, DecodeError> {
        let value = self.get(key).ok_or_else(|| missing(key))?;
        Record::from_value(value, key)
    }

    /// Collection that may legitimately be absent: a missing key is an empty
    /// list, anything present must normalize.
    pub fn list(&self, key: &str) -> Result<Vec<Record<'a>>, DecodeError> {
        match self.map.get(key) {
            None => Ok(Vec::new()),
            Some(value) => sequence(value, key),
        }
    }

    pub fn required_list(&self, key: &str) -> Result<Vec<Record<'a>>, DecodeError> {
        let value = self.map.get(key).ok_or_else(|| missing(key))?;
        sequence(value, key)
    }
}

fn missing(key: &str) -> DecodeError {
    DecodeError::MissingField {
        field: key.to_string(),
    }
}
