//! Core statistical operations and traits
//!
//! This module defines the fundamental types and traits for statistical operations.

use crate::errors::{Result, SkillScoreError};
use ndarray::ArrayD;

/// Supported statistical operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatOperation {
    /// Arithmetic mean
    Mean,
    /// Sum of values
    Sum,
    /// Minimum value
    Min,
    /// Maximum value
    Max,
    /// Population standard deviation
    Std,
}

impl StatOperation {
    /// Get the string representation of the operation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Sum => "sum",
            Self::Min => "minimum",
            Self::Max => "maximum",
            Self::Std => "std",
        }
    }
}

/// Trait for types that can perform statistical reductions along an axis
pub trait StatisticalReduction {
    /// Perform a statistical reduction along the specified axis
    ///
    /// Non-finite values are skipped. A lane with no finite values reduces
    /// to NaN, except for [`StatOperation::Sum`] which gives zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the axis is out of bounds for the array.
    fn reduce_along_axis(&self, axis: usize, operation: StatOperation) -> Result<ArrayD<f64>>;
}

impl StatisticalReduction for ArrayD<f64> {
    fn reduce_along_axis(&self, axis: usize, operation: StatOperation) -> Result<ArrayD<f64>> {
        if axis >= self.ndim() {
            return Err(SkillScoreError::InvalidParameter(format!(
                "Axis {axis} is out of bounds for array with {} dimensions",
                self.ndim()
            )));
        }

        match operation {
            StatOperation::Mean => Ok(super::parallel::parallel_mean_axis(self, axis)),
            StatOperation::Sum => Ok(super::parallel::parallel_sum_axis(self, axis)),
            StatOperation::Min => Ok(super::parallel::parallel_min_axis(self, axis)),
            StatOperation::Max => Ok(super::parallel::parallel_max_axis(self, axis)),
            StatOperation::Std => Ok(super::parallel::parallel_std_axis(self, axis)),
        }
    }
}
