//! Labeled n-dimensional arrays
//!
//! A [`LabeledArray`] pairs an `f64` buffer with dimension names and one list
//! of coordinate labels per dimension. The buffer is either materialised in
//! memory or a lazy [`ChunkedArray`]; both expose the [`Evaluate`] capability
//! so callers can ask whether an array is lazy and force it when they need to.

use crate::chunked::{normalize_chunks, ChunkedArray};
use crate::errors::{Result, SkillScoreError};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};

/// Lazy/eager capability shared by every array-like value
pub trait Evaluate {
    /// Whether evaluation is deferred to a block graph
    fn is_lazy(&self) -> bool;

    /// Materialise the values
    ///
    /// # Errors
    ///
    /// Returns an error if evaluating any block fails.
    fn evaluate(&self) -> Result<ArrayD<f64>>;
}

/// Ordered labels along one dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CoordLabels {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Text(Vec<String>),
}

impl CoordLabels {
    /// Integer labels `0..len`, the default for an unlabeled dimension
    #[must_use]
    pub fn range(len: usize) -> Self {
        Self::Int((0..len as i64).collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<i64>> for CoordLabels {
    fn from(values: Vec<i64>) -> Self {
        Self::Int(values)
    }
}

impl From<Vec<f64>> for CoordLabels {
    fn from(values: Vec<f64>) -> Self {
        Self::Float(values)
    }
}

impl From<Vec<String>> for CoordLabels {
    fn from(values: Vec<String>) -> Self {
        Self::Text(values)
    }
}

impl From<Vec<&str>> for CoordLabels {
    fn from(values: Vec<&str>) -> Self {
        Self::Text(values.into_iter().map(str::to_string).collect())
    }
}

/// Storage behind a labeled array
#[derive(Debug, Clone)]
pub enum ArrayData {
    /// Fully materialised in memory
    Eager(ArrayD<f64>),
    /// Deferred, chunk-backed
    Lazy(ChunkedArray),
}

impl ArrayData {
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Eager(a) => a.shape(),
            Self::Lazy(c) => c.shape(),
        }
    }
}

impl Evaluate for ChunkedArray {
    fn is_lazy(&self) -> bool {
        true
    }

    fn evaluate(&self) -> Result<ArrayD<f64>> {
        self.compute()
    }
}

impl Evaluate for ArrayData {
    fn is_lazy(&self) -> bool {
        matches!(self, Self::Lazy(_))
    }

    fn evaluate(&self) -> Result<ArrayD<f64>> {
        match self {
            Self::Eager(a) => Ok(a.clone()),
            Self::Lazy(c) => c.compute(),
        }
    }
}

/// An n-dimensional `f64` array with named dimensions and coordinate labels
#[derive(Debug, Clone)]
pub struct LabeledArray {
    name: Option<String>,
    dims: Vec<String>,
    coords: Vec<CoordLabels>,
    data: ArrayData,
    attrs: HashMap<String, JsonValue>,
}

impl LabeledArray {
    /// Build an eager array from data, dimension names and coordinate labels.
    ///
    /// # Errors
    ///
    /// Returns [`SkillScoreError::InvalidCoordinates`] if names repeat, the
    /// rank disagrees with the data, or a label list has the wrong length.
    pub fn new<S: Into<String>>(
        data: ArrayD<f64>,
        dims: Vec<S>,
        coords: Vec<CoordLabels>,
    ) -> Result<Self> {
        Self::from_parts(ArrayData::Eager(data), dims, coords)
    }

    /// Build an eager array with default integer labels on every dimension
    ///
    /// # Errors
    ///
    /// Returns an error if the dimension names are invalid for the data.
    pub fn from_dims<S: Into<String>>(data: ArrayD<f64>, dims: Vec<S>) -> Result<Self> {
        let coords = data.shape().iter().map(|&n| CoordLabels::range(n)).collect();
        Self::new(data, dims, coords)
    }

    /// Build a lazy array over an existing chunk graph
    ///
    /// # Errors
    ///
    /// Returns an error if the labels do not fit the chunked shape.
    pub fn from_chunked<S: Into<String>>(
        data: ChunkedArray,
        dims: Vec<S>,
        coords: Vec<CoordLabels>,
    ) -> Result<Self> {
        Self::from_parts(ArrayData::Lazy(data), dims, coords)
    }

    /// Build from either storage, validating all invariants
    ///
    /// # Errors
    ///
    /// Returns [`SkillScoreError::InvalidCoordinates`] on any violation.
    pub fn from_parts<S: Into<String>>(
        data: ArrayData,
        dims: Vec<S>,
        coords: Vec<CoordLabels>,
    ) -> Result<Self> {
        let dims: Vec<String> = dims.into_iter().map(Into::into).collect();
        let shape = data.shape();

        if dims.len() != shape.len() {
            return Err(SkillScoreError::InvalidCoordinates {
                message: format!(
                    "{} dimension names given for data of shape {shape:?}",
                    dims.len()
                ),
            });
        }
        let mut seen = HashSet::new();
        if let Some(dup) = dims.iter().find(|d| !seen.insert(d.as_str())) {
            return Err(SkillScoreError::InvalidCoordinates {
                message: format!("dimension '{dup}' appears more than once"),
            });
        }
        if coords.len() != dims.len() {
            return Err(SkillScoreError::InvalidCoordinates {
                message: format!(
                    "{} coordinate lists given for {} dimensions",
                    coords.len(),
                    dims.len()
                ),
            });
        }
        for ((dim, labels), &len) in dims.iter().zip(&coords).zip(shape) {
            if labels.len() != len {
                return Err(SkillScoreError::InvalidCoordinates {
                    message: format!(
                        "dimension '{dim}' has length {len} but {} coordinate labels",
                        labels.len()
                    ),
                });
            }
        }

        Ok(Self {
            name: None,
            dims,
            coords,
            data,
            attrs: HashMap::new(),
        })
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_attrs(mut self, attrs: HashMap<String, JsonValue>) -> Self {
        self.attrs = attrs;
        self
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    /// Coordinate labels, one list per dimension in dimension order
    #[must_use]
    pub fn coords(&self) -> &[CoordLabels] {
        &self.coords
    }

    /// Coordinate labels of the named dimension
    #[must_use]
    pub fn coord(&self, dim: &str) -> Option<&CoordLabels> {
        self.dims.iter().position(|d| d == dim).map(|i| &self.coords[i])
    }

    #[must_use]
    pub fn attrs(&self) -> &HashMap<String, JsonValue> {
        &self.attrs
    }

    #[must_use]
    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Materialised values, if the array is eager
    #[must_use]
    pub fn values(&self) -> Option<&ArrayD<f64>> {
        match &self.data {
            ArrayData::Eager(a) => Some(a),
            ArrayData::Lazy(_) => None,
        }
    }

    /// Chunk lengths per dimension, `None` for an eager array
    #[must_use]
    pub fn chunks(&self) -> Option<&[Vec<usize>]> {
        match &self.data {
            ArrayData::Eager(_) => None,
            ArrayData::Lazy(c) => Some(c.chunks()),
        }
    }

    /// Integer position of a named dimension
    ///
    /// # Errors
    ///
    /// Returns [`SkillScoreError::DimensionNotFound`] if the name is absent.
    pub fn axis_of(&self, dim: &str) -> Result<usize> {
        self.dims
            .iter()
            .position(|d| d == dim)
            .ok_or_else(|| SkillScoreError::dimension_not_found(dim, &self.dims))
    }

    /// Return a lazy copy split into blocks of `chunk_shape` (`None`: one block).
    ///
    /// A lazy array is rechunked; its values are not materialised.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk shape is invalid for this array.
    pub fn chunk(&self, chunk_shape: Option<&[usize]>) -> Result<Self> {
        let data = match &self.data {
            ArrayData::Eager(a) => ChunkedArray::from_array(a.clone(), chunk_shape)?,
            ArrayData::Lazy(c) => c.rechunk(normalize_chunks(c.shape(), chunk_shape)?)?,
        };
        Ok(self.with_data(ArrayData::Lazy(data)))
    }

    /// Return an eager copy, evaluating the block graph if lazy
    ///
    /// # Errors
    ///
    /// Returns an error if evaluation fails.
    pub fn compute(&self) -> Result<Self> {
        Ok(self.with_data(ArrayData::Eager(self.data.evaluate()?)))
    }

    /// View the data as a chunk graph; an eager array becomes a single block
    ///
    /// # Errors
    ///
    /// Returns an error if wrapping the data fails.
    pub fn to_chunked(&self) -> Result<ChunkedArray> {
        match &self.data {
            ArrayData::Eager(a) => ChunkedArray::from_array(a.clone(), None),
            ArrayData::Lazy(c) => Ok(c.clone()),
        }
    }

    /// Reorder dimensions by name, preserving laziness
    ///
    /// # Errors
    ///
    /// Returns an error if `order` is not a permutation of this array's dims.
    pub fn transpose(&self, order: &[&str]) -> Result<Self> {
        if order.len() != self.ndim() {
            return Err(SkillScoreError::shape_mismatch(format!(
                "transpose order {order:?} does not list the dimensions {:?}",
                self.dims
            )));
        }
        let axes = order
            .iter()
            .map(|d| self.axis_of(d))
            .collect::<Result<Vec<_>>>()?;
        self.permuted(&axes)
    }

    pub(crate) fn permuted(&self, axes: &[usize]) -> Result<Self> {
        let data = match &self.data {
            ArrayData::Eager(a) => {
                ArrayData::Eager(a.clone().permuted_axes(IxDyn(axes)).as_standard_layout().into_owned())
            }
            ArrayData::Lazy(c) => ArrayData::Lazy(c.permute_axes(axes)?),
        };
        let mut out = Self::from_parts(
            data,
            axes.iter().map(|&a| self.dims[a].clone()).collect(),
            axes.iter().map(|&a| self.coords[a].clone()).collect(),
        )?;
        out.name = self.name.clone();
        out.attrs = self.attrs.clone();
        Ok(out)
    }

    /// True if dimensions, labels, name, attributes and values all match,
    /// treating NaN as equal to NaN at the same position.
    ///
    /// # Errors
    ///
    /// Returns an error if evaluating either array fails.
    pub fn identical(&self, other: &Self) -> Result<bool> {
        if self.name != other.name || self.attrs != other.attrs || !self.same_grid(other) {
            return Ok(false);
        }
        let (a, b) = (self.evaluate()?, other.evaluate()?);
        Ok(a.iter()
            .zip(b.iter())
            .all(|(x, y)| x.to_bits() == y.to_bits() || (x.is_nan() && y.is_nan())))
    }

    /// True if dimensions and labels match and values agree within
    /// `|a - b| <= atol + rtol * |b|`, treating NaN as equal to NaN.
    ///
    /// # Errors
    ///
    /// Returns an error if evaluating either array fails.
    pub fn allclose(&self, other: &Self, rtol: f64, atol: f64) -> Result<bool> {
        if !self.same_grid(other) {
            return Ok(false);
        }
        let (a, b) = (self.evaluate()?, other.evaluate()?);
        Ok(a.iter().zip(b.iter()).all(|(x, y)| {
            (x.is_nan() && y.is_nan()) || (x - y).abs() <= atol + rtol * y.abs()
        }))
    }

    /// Same dimension names, order, shape and coordinate labels
    #[must_use]
    pub fn same_grid(&self, other: &Self) -> bool {
        self.dims == other.dims && self.shape() == other.shape() && self.coords == other.coords
    }

    pub(crate) fn with_data(&self, data: ArrayData) -> Self {
        Self {
            name: self.name.clone(),
            dims: self.dims.clone(),
            coords: self.coords.clone(),
            data,
            attrs: self.attrs.clone(),
        }
    }
}

impl Evaluate for LabeledArray {
    fn is_lazy(&self) -> bool {
        self.data.is_lazy()
    }

    fn evaluate(&self) -> Result<ArrayD<f64>> {
        self.data.evaluate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    fn grid() -> LabeledArray {
        let data = Array::from_shape_vec(IxDyn(&[2, 3]), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        LabeledArray::new(
            data,
            vec!["lat", "lon"],
            vec![
                CoordLabels::Float(vec![10.0, 20.0]),
                CoordLabels::from(vec!["a", "b", "c"]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn rejects_duplicate_dimension_names() {
        let data = ArrayD::zeros(IxDyn(&[2, 2]));
        let result = LabeledArray::from_dims(data, vec!["x", "x"]);
        assert!(matches!(result, Err(SkillScoreError::InvalidCoordinates { .. })));
    }

    #[test]
    fn rejects_wrong_label_count() {
        let data = ArrayD::zeros(IxDyn(&[2, 3]));
        let result = LabeledArray::new(
            data,
            vec!["x", "y"],
            vec![CoordLabels::range(2), CoordLabels::range(4)],
        );
        assert!(matches!(result, Err(SkillScoreError::InvalidCoordinates { .. })));
    }

    #[test]
    fn chunk_makes_lazy_and_compute_makes_eager() {
        let eager = grid();
        assert!(!eager.is_lazy());
        assert!(eager.chunks().is_none());

        let lazy = eager.chunk(Some(&[1, 2])).unwrap();
        assert!(lazy.is_lazy());
        assert_eq!(lazy.chunks().unwrap(), &[vec![1, 1], vec![2, 1]]);
        assert_eq!(lazy.coords(), eager.coords());

        let back = lazy.compute().unwrap();
        assert!(!back.is_lazy());
        assert!(back.identical(&eager).unwrap());
    }

    #[test]
    fn transpose_moves_labels_with_data() {
        let lazy = grid().chunk(None).unwrap();
        let t = lazy.transpose(&["lon", "lat"]).unwrap();
        assert!(t.is_lazy());
        assert_eq!(t.dims(), &["lon".to_string(), "lat".to_string()]);
        assert_eq!(t.coord("lat"), Some(&CoordLabels::Float(vec![10.0, 20.0])));
        let values = t.evaluate().unwrap();
        assert_eq!(values[[2, 1]], 6.0);
        assert!(lazy.transpose(&["lon"]).is_err());
    }

    #[test]
    fn axis_lookup_reports_missing_dimension() {
        let a = grid();
        assert_eq!(a.axis_of("lon").unwrap(), 1);
        match a.axis_of("time") {
            Err(SkillScoreError::DimensionNotFound { dim, available }) => {
                assert_eq!(dim, "time");
                assert_eq!(available, vec!["lat", "lon"]);
            }
            other => panic!("Expected DimensionNotFound, got {other:?}"),
        }
    }

    #[test]
    fn allclose_tolerates_rounding_but_identical_does_not() {
        let a = grid();
        let nudged = a.with_data(ArrayData::Eager(a.values().unwrap() + 1e-12));
        assert!(a.allclose(&nudged, 1e-9, 0.0).unwrap());
        assert!(!a.identical(&nudged).unwrap());
    }

    #[test]
    fn coord_labels_deserialize_untagged() {
        let ints: CoordLabels = serde_json::from_str("[0, 1, 2]").unwrap();
        assert_eq!(ints, CoordLabels::Int(vec![0, 1, 2]));
        let floats: CoordLabels = serde_json::from_str("[0.5, 1.5]").unwrap();
        assert_eq!(floats, CoordLabels::Float(vec![0.5, 1.5]));
        let text: CoordLabels = serde_json::from_str(r#"["a"]"#).unwrap();
        assert_eq!(text, CoordLabels::Text(vec!["a".to_string()]));
    }
}
