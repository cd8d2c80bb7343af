//! Statistical reductions over named dimensions
//!
//! This module provides functions for computing statistical reductions (mean,
//! sum, min, max, standard deviation) over a named dimension of a
//! [`LabeledArray`]. The reduced dimension and its coordinates are dropped;
//! a lazy input gives a lazy result.
//!
//! # Organization
//!
//! - [`operations`]: Core statistical operations and traits
//! - [`parallel`]: Parallel computation implementations

pub mod operations;
pub mod parallel;

pub use operations::{StatOperation, StatisticalReduction};
pub use parallel::{
    parallel_max_axis, parallel_mean_axis, parallel_min_axis, parallel_std_axis, parallel_sum_axis,
};

use crate::chunked::{BlockFn, ChunkedArray};
use crate::errors::Result;
use crate::labeled::{ArrayData, LabeledArray};
use std::sync::Arc;
use tracing::debug;

/// Reduce `array` over the dimension `dim`.
///
/// A named input produces a result named `<name>_<operation>_over_<dim>`.
///
/// # Errors
///
/// Returns [`crate::SkillScoreError::DimensionNotFound`] if `dim` is absent.
pub fn reduce_over_dimension(
    array: &LabeledArray,
    dim: &str,
    operation: StatOperation,
) -> Result<LabeledArray> {
    let axis = array.axis_of(dim)?;
    let dims: Vec<String> = array.dims().iter().filter(|d| *d != dim).cloned().collect();
    let coords = array
        .coords()
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != axis)
        .map(|(_, c)| c.clone())
        .collect();

    let data = match array.data() {
        ArrayData::Eager(values) => ArrayData::Eager(values.reduce_along_axis(axis, operation)?),
        ArrayData::Lazy(chunked) => {
            let mut shape = chunked.shape().to_vec();
            shape.remove(axis);
            let index_map = (0..chunked.ndim())
                .map(|j| if j == axis { None } else { Some(j - usize::from(j > axis)) })
                .collect();
            let func: BlockFn = Arc::new(move |blocks: &[ndarray::ArrayD<f64>]| {
                blocks[0].reduce_along_axis(axis, operation)
            });
            ArrayData::Lazy(ChunkedArray::map_blocks(vec![(chunked.clone(), index_map)], &shape, func)?)
        }
    };
    debug!(dim, operation = operation.as_str(), lazy = matches!(data, ArrayData::Lazy(_)), "reduced over dimension");

    let reduced = LabeledArray::from_parts(data, dims, coords)?;
    Ok(match array.name() {
        Some(name) => reduced.with_name(format!("{name}_{}_over_{dim}", operation.as_str())),
        None => reduced,
    })
}

/// Mean over a named dimension
///
/// # Errors
///
/// Returns an error if `dim` is absent.
pub fn mean_over_dimension(array: &LabeledArray, dim: &str) -> Result<LabeledArray> {
    reduce_over_dimension(array, dim, StatOperation::Mean)
}

/// Sum over a named dimension
///
/// # Errors
///
/// Returns an error if `dim` is absent.
pub fn sum_over_dimension(array: &LabeledArray, dim: &str) -> Result<LabeledArray> {
    reduce_over_dimension(array, dim, StatOperation::Sum)
}

/// Minimum over a named dimension
///
/// # Errors
///
/// Returns an error if `dim` is absent.
pub fn min_over_dimension(array: &LabeledArray, dim: &str) -> Result<LabeledArray> {
    reduce_over_dimension(array, dim, StatOperation::Min)
}

/// Maximum over a named dimension
///
/// # Errors
///
/// Returns an error if `dim` is absent.
pub fn max_over_dimension(array: &LabeledArray, dim: &str) -> Result<LabeledArray> {
    reduce_over_dimension(array, dim, StatOperation::Max)
}

/// Population standard deviation over a named dimension
///
/// # Errors
///
/// Returns an error if `dim` is absent.
pub fn std_over_dimension(array: &LabeledArray, dim: &str) -> Result<LabeledArray> {
    reduce_over_dimension(array, dim, StatOperation::Std)
}
