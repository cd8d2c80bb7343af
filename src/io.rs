//! JSON files of labeled arrays
//!
//! A labeled array is stored as one JSON object:
//!
//! ```json
//! {
//!   "name": "t2m",
//!   "dims": ["lat", "lon"],
//!   "coords": [[0, 1], [10.0, 20.0, 30.0]],
//!   "data": [0.1, 0.2, null, 0.4, 0.5, 0.6],
//!   "attrs": {"units": "K"}
//! }
//! ```
//!
//! `data` is row-major; the shape is implied by the coordinate lengths.
//! Non-finite values are written as `null` and read back as NaN.

use crate::errors::{Result, SkillScoreError};
use crate::labeled::{CoordLabels, Evaluate, LabeledArray};
use chrono::Utc;
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Serialize, Deserialize)]
struct LabeledArrayRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    dims: Vec<String>,
    coords: Vec<CoordLabels>,
    data: Vec<Option<f64>>,
    #[serde(default)]
    attrs: HashMap<String, JsonValue>,
}

/// Parse a labeled array from a JSON string
///
/// # Errors
///
/// Returns an error for malformed JSON or if the data length does not match
/// the coordinate lengths.
pub fn from_json_str(json: &str) -> Result<LabeledArray> {
    let record: LabeledArrayRecord = serde_json::from_str(json)?;
    let shape: Vec<usize> = record.coords.iter().map(CoordLabels::len).collect();
    let expected: usize = shape.iter().product();
    if record.data.len() != expected {
        return Err(SkillScoreError::InvalidCoordinates {
            message: format!(
                "{} data values given for coordinates of shape {shape:?}",
                record.data.len()
            ),
        });
    }

    let values = record.data.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
    let data = ArrayD::from_shape_vec(IxDyn(&shape), values)?;
    let array = LabeledArray::new(data, record.dims, record.coords)?.with_attrs(record.attrs);
    Ok(match record.name {
        Some(name) => array.with_name(name),
        None => array,
    })
}

/// Serialise a labeled array to a JSON string, materialising it if lazy
///
/// # Errors
///
/// Returns an error if evaluating the array fails.
pub fn to_json_string(array: &LabeledArray) -> Result<String> {
    let values = array.evaluate()?;
    let record = LabeledArrayRecord {
        name: array.name().map(str::to_string),
        dims: array.dims().to_vec(),
        coords: array.coords().to_vec(),
        data: values.iter().map(|&v| v.is_finite().then_some(v)).collect(),
        attrs: array.attrs().clone(),
    };
    Ok(serde_json::to_string_pretty(&record)?)
}

/// Read a labeled array from a JSON file
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn read_labeled_array(path: &Path) -> Result<LabeledArray> {
    let content = fs::read_to_string(path)?;
    let array = from_json_str(&content)?;
    info!(path = %path.display(), dims = ?array.dims(), shape = ?array.shape(), "read labeled array");
    Ok(array)
}

/// Write a labeled array to a JSON file, stamping a `history` attribute
///
/// # Errors
///
/// Returns an error if evaluation or writing fails.
pub fn write_labeled_array(array: &LabeledArray, path: &Path) -> Result<()> {
    let mut attrs = array.attrs().clone();
    attrs.insert(
        "history".to_string(),
        JsonValue::String(format!("Created by skillscore on {}", Utc::now().to_rfc3339())),
    );
    let stamped = array.clone().with_attrs(attrs);
    fs::write(path, to_json_string(&stamped)?)?;
    info!(path = %path.display(), "wrote labeled array");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_reads_as_nan() {
        let json = r#"{"dims": ["x"], "coords": [[0, 1]], "data": [1.5, null]}"#;
        let array = from_json_str(json).unwrap();
        let values = array.values().unwrap();
        assert_eq!(values[[0]], 1.5);
        assert!(values[[1]].is_nan());
        assert!(array.name().is_none());
    }

    #[test]
    fn infinities_are_written_as_null() {
        let data = ArrayD::from_shape_vec(IxDyn(&[3]), vec![f64::INFINITY, -1.0, f64::NEG_INFINITY]).unwrap();
        let array = LabeledArray::from_dims(data, vec!["x"]).unwrap();
        let json = to_json_string(&array).unwrap();
        let record: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(record["data"], serde_json::json!([null, -1.0, null]));

        let back = from_json_str(&json).unwrap().evaluate().unwrap();
        assert!(back[[0]].is_nan());
        assert_eq!(back[[1]], -1.0);
        assert!(back[[2]].is_nan());
    }

    #[test]
    fn data_length_must_match_coordinates() {
        let json = r#"{"dims": ["x"], "coords": [[0, 1, 2]], "data": [1.0, 2.0]}"#;
        assert!(matches!(
            from_json_str(json),
            Err(SkillScoreError::InvalidCoordinates { .. })
        ));
    }

    #[test]
    fn lazy_arrays_are_materialised_on_write() {
        let json = r#"{"name": "t", "dims": ["x", "y"], "coords": [[0, 1], ["a", "b"]], "data": [1, 2, 3, 4]}"#;
        let array = from_json_str(json).unwrap();
        let lazy = array.chunk(Some(&[1, 1])).unwrap();
        let back = from_json_str(&to_json_string(&lazy).unwrap()).unwrap();
        assert!(back.identical(&array).unwrap());
    }
}
