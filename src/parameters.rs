//! Scalar-or-array parameters accepted by the labeled scores
//!
//! Callers may pass plain numbers or labeled arrays for the Gaussian mean and
//! standard deviation, and numbers, lists or arrays for thresholds. These are
//! tagged once at the call boundary so the numeric code never inspects types.

use crate::errors::{Result, SkillScoreError};
use crate::labeled::{Evaluate, LabeledArray};
use tracing::debug;

/// A Gaussian forecast parameter: a single value or a labeled field
#[derive(Debug, Clone)]
pub enum Param {
    Scalar(f64),
    Array(LabeledArray),
}

impl From<f64> for Param {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<i32> for Param {
    fn from(value: i32) -> Self {
        Self::Scalar(f64::from(value))
    }
}

impl From<i64> for Param {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: i64) -> Self {
        Self::Scalar(value as f64)
    }
}

impl From<LabeledArray> for Param {
    fn from(array: LabeledArray) -> Self {
        Self::Array(array)
    }
}

impl From<&LabeledArray> for Param {
    fn from(array: &LabeledArray) -> Self {
        Self::Array(array.clone())
    }
}

/// Threshold(s) for the Brier score
#[derive(Debug, Clone)]
pub enum Threshold {
    Scalar(f64),
    Sequence(Vec<f64>),
    Array(LabeledArray),
}

impl Threshold {
    /// The single threshold value.
    ///
    /// A zero-dimensional array counts as a single value; a lazy one is
    /// evaluated here.
    ///
    /// # Errors
    ///
    /// Returns [`SkillScoreError::NotImplemented`] for several thresholds.
    pub fn as_scalar(&self) -> Result<f64> {
        match self {
            Self::Scalar(value) => Ok(*value),
            Self::Array(array) if array.ndim() == 0 => {
                if array.is_lazy() {
                    debug!("evaluating zero-dimensional lazy threshold");
                }
                array
                    .evaluate()?
                    .iter()
                    .copied()
                    .next()
                    .ok_or_else(|| SkillScoreError::InvalidParameter("empty threshold".to_string()))
            }
            Self::Sequence(_) | Self::Array(_) => Err(SkillScoreError::NotImplemented {
                feature: "multiple thresholds for the threshold Brier score".to_string(),
            }),
        }
    }
}

impl From<f64> for Threshold {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<i32> for Threshold {
    fn from(value: i32) -> Self {
        Self::Scalar(f64::from(value))
    }
}

impl From<i64> for Threshold {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: i64) -> Self {
        Self::Scalar(value as f64)
    }
}

impl From<Vec<f64>> for Threshold {
    fn from(values: Vec<f64>) -> Self {
        Self::Sequence(values)
    }
}

impl From<&[f64]> for Threshold {
    fn from(values: &[f64]) -> Self {
        Self::Sequence(values.to_vec())
    }
}

impl<const N: usize> From<[f64; N]> for Threshold {
    fn from(values: [f64; N]) -> Self {
        Self::Sequence(values.to_vec())
    }
}

impl From<LabeledArray> for Threshold {
    fn from(array: LabeledArray) -> Self {
        Self::Array(array)
    }
}

impl From<&LabeledArray> for Threshold {
    fn from(array: &LabeledArray) -> Self {
        Self::Array(array.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr0, array};

    #[test]
    fn integer_and_float_thresholds_are_scalars() {
        assert_eq!(Threshold::from(0).as_scalar().unwrap(), 0.0);
        assert_eq!(Threshold::from(0.5).as_scalar().unwrap(), 0.5);
        assert_eq!(Threshold::from(3_i64).as_scalar().unwrap(), 3.0);
    }

    #[test]
    fn zero_dimensional_array_is_a_scalar() {
        let t = LabeledArray::from_dims(arr0(0.25).into_dyn(), Vec::<String>::new()).unwrap();
        assert_eq!(Threshold::from(&t).as_scalar().unwrap(), 0.25);

        let lazy = t.chunk(None).unwrap();
        assert!(lazy.is_lazy());
        assert_eq!(Threshold::from(lazy).as_scalar().unwrap(), 0.25);
    }

    #[test]
    fn several_thresholds_are_not_implemented() {
        let seq = Threshold::from(vec![0.1, 0.3, 0.5]);
        assert!(matches!(seq.as_scalar(), Err(SkillScoreError::NotImplemented { .. })));

        let arr = LabeledArray::from_dims(array![0.1, 0.3, 0.5].into_dyn(), vec!["threshold"]).unwrap();
        let lazy = Threshold::from(arr.chunk(None).unwrap());
        assert!(matches!(lazy.as_scalar(), Err(SkillScoreError::NotImplemented { .. })));

        // a one-element list is still a list
        let single = Threshold::from([0.5]);
        assert!(matches!(single.as_scalar(), Err(SkillScoreError::NotImplemented { .. })));
    }

    #[test]
    fn params_convert_from_numbers_and_arrays() {
        assert!(matches!(Param::from(0), Param::Scalar(v) if v == 0.0));
        assert!(matches!(Param::from(1.5), Param::Scalar(v) if v == 1.5));
        let a = LabeledArray::from_dims(array![1.0].into_dyn(), vec!["x"]).unwrap();
        assert!(matches!(Param::from(&a), Param::Array(_)));
    }
}
