use ndarray::{ArrayD, IxDyn};
use serde_json::json;
use skillscore::io::{read_labeled_array, write_labeled_array};
use skillscore::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_score_files_end_to_end() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let obs_path = temp_dir.path().join("obs.json");
    let fcst_path = temp_dir.path().join("fcst.json");
    let out_path = temp_dir.path().join("crps.json");

    fs::write(
        &obs_path,
        r#"{"name": "t2m", "dims": ["station"], "coords": [["a", "b", "c"]],
            "data": [0.0, 1.0, null], "attrs": {"units": "K"}}"#,
    )
    .expect("Failed to write observations");
    fs::write(
        &fcst_path,
        r#"{"dims": ["station", "member"], "coords": [["a", "b", "c"], [0, 1]],
            "data": [0.0, 0.0, 0.0, 2.0, 1.0, 1.0]}"#,
    )
    .expect("Failed to write forecasts");

    let obs = read_labeled_array(&obs_path).expect("Failed to read observations");
    let fcst = read_labeled_array(&fcst_path).expect("Failed to read forecasts");
    assert_eq!(obs.attrs().get("units"), Some(&json!("K")));

    let score = crps_ensemble(
        &obs.chunk(Some(&[2])).expect("Failed to chunk"),
        &fcst,
        &EnsembleOptions::new(),
    )
    .expect("Failed to score");
    assert!(score.is_lazy());

    write_labeled_array(&score, &out_path).expect("Failed to write result");
    let back = read_labeled_array(&out_path).expect("Failed to read result");
    assert!(!back.is_lazy());
    assert_eq!(back.dims(), &["station"]);
    assert_eq!(back.coords(), obs.coords());

    let history = back.attrs().get("history").and_then(|v| v.as_str()).unwrap();
    assert!(history.starts_with("Created by skillscore on "));

    let values = back.evaluate().unwrap();
    // both members on the observation
    assert_eq!(values[[0]], 0.0);
    // members 0 and 2 around an observation of 1: |x - y| mean 1, spread term 1/2
    assert!((values[[1]] - 0.5).abs() < 1e-12);
    // NaN observation stored as null and read back as NaN
    assert!(values[[2]].is_nan());
}

#[test]
fn test_write_keeps_existing_attributes() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let path = temp_dir.path().join("named.json");

    let data = ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let mut attrs = HashMap::new();
    attrs.insert("source".to_string(), json!("model"));
    let array = LabeledArray::from_dims(data, vec!["x", "y"])
        .unwrap()
        .with_name("field")
        .with_attrs(attrs);

    write_labeled_array(&array, &path).expect("Failed to write array");
    let back = read_labeled_array(&path).expect("Failed to read array");

    assert_eq!(back.name(), Some("field"));
    assert_eq!(back.attrs().get("source"), Some(&json!("model")));
    assert!(back.attrs().contains_key("history"));
    assert!(back.allclose(&array, 0.0, 0.0).unwrap());
}

#[test]
fn test_read_missing_file() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let result = read_labeled_array(&temp_dir.path().join("absent.json"));
    assert!(matches!(result, Err(SkillScoreError::IoError(_))));
}

#[test]
fn test_binary_scores_ensemble_to_stdout() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let obs_path = temp_dir.path().join("obs.json");
    let fcst_path = temp_dir.path().join("fcst.json");
    fs::write(&obs_path, r#"{"dims": ["x"], "coords": [[0, 1]], "data": [0.0, 1.0]}"#)
        .expect("Failed to write observations");
    fs::write(
        &fcst_path,
        r#"{"dims": ["member", "x"], "coords": [[0, 1], [0, 1]], "data": [0.0, 0.0, 0.0, 2.0]}"#,
    )
    .expect("Failed to write forecasts");

    let output = Command::new(env!("CARGO_BIN_EXE_skillscore"))
        .arg("crps-ensemble")
        .arg(&obs_path)
        .arg(&fcst_path)
        .args(["--chunks", "x=1", "--threads", "1"])
        .output()
        .expect("Failed to run skillscore");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let record: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is not JSON");
    assert_eq!(record["dims"], json!(["x"]));
    assert_eq!(record["data"], json!([0.0, 0.5]));
}
