//! Labeled probabilistic scores
//!
//! Each score validates dimension names and coordinate labels, locates the
//! ensemble axis by name, calls the raw-buffer function from
//! [`crate::pointwise`] and reattaches the observation's dimensions and
//! coordinates to the result. If any array input is lazy the numeric call is
//! wrapped to run block by block and the result stays lazy; otherwise the
//! result is computed immediately. The numbers are never altered: a lazy
//! result materialises to exactly what the raw function returns for the
//! materialised inputs.

use crate::chunked::{BlockFn, ChunkedArray};
use crate::errors::{Result, SkillScoreError};
use crate::labeled::{ArrayData, LabeledArray};
use crate::parameters::{Param, Threshold};
use crate::pointwise;
use ndarray::{arr0, ArrayD, ArrayViewD, Axis, IxDyn};
use std::sync::Arc;
use tracing::debug;

/// How the ensemble-member dimension of a forecast is chosen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MemberDim {
    /// The single forecast dimension that the observation lacks
    #[default]
    Extra,
    /// A dimension given by name; it must be that extra dimension
    Named(String),
}

impl From<&str> for MemberDim {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for MemberDim {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

/// Options for [`crps_ensemble`]
#[derive(Debug, Clone, Default)]
pub struct EnsembleOptions {
    pub member_dim: MemberDim,
    /// One non-negative weight per member, in member order
    pub weights: Option<Vec<f64>>,
}

impl EnsembleOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn member_dim(mut self, member_dim: impl Into<MemberDim>) -> Self {
        self.member_dim = member_dim.into();
        self
    }

    #[must_use]
    pub fn weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = Some(weights);
        self
    }
}

/// Continuous ranked probability score of an ensemble forecast.
///
/// The result has the observation's dimensions and coordinates; the member
/// dimension is reduced away. Lazy if either input is lazy.
///
/// # Errors
///
/// * [`SkillScoreError::ShapeMismatch`] if the observation's dimensions are not
///   all in the forecast with identical labels, or the forecast does not have
///   exactly one extra dimension.
/// * [`SkillScoreError::DimensionNotFound`] if a named member dimension is
///   absent from the forecast.
/// * [`SkillScoreError::InvalidParameter`] for weights of the wrong length or
///   with negative entries.
pub fn crps_ensemble(
    observations: &LabeledArray,
    forecasts: &LabeledArray,
    options: &EnsembleOptions,
) -> Result<LabeledArray> {
    let aligned = align_ensemble(observations, forecasts, &options.member_dim)?;
    let weights = options.weights.clone();
    if let Some(w) = &weights {
        pointwise::validate_weights(w, aligned.members())?;
    }

    apply_ensemble(observations, aligned, move |obs, fcst, axis| {
        pointwise::crps_ensemble(obs, fcst, weights.as_deref(), axis)
    })
}

/// Continuous ranked probability score of a Gaussian forecast.
///
/// `mu` and `sigma` may be numbers or labeled arrays whose dimensions are a
/// subset of the observation's (with identical labels); arrays are broadcast
/// over the missing dimensions. Lazy if any array input is lazy.
///
/// # Errors
///
/// Returns [`SkillScoreError::ShapeMismatch`] if an array parameter has a
/// dimension the observation lacks or mismatching labels.
pub fn crps_gaussian(
    observations: &LabeledArray,
    mu: impl Into<Param>,
    sigma: impl Into<Param>,
) -> Result<LabeledArray> {
    let mu = Operand::resolve(observations, mu.into(), "mean")?;
    let sigma = Operand::resolve(observations, sigma.into(), "standard deviation")?;

    if let (Some(x), Some(m), Some(s)) = (observations.values(), mu.eager_view(), sigma.eager_view()) {
        debug!(dims = ?observations.dims(), "crps_gaussian on materialised inputs");
        let out = pointwise::crps_gaussian(&x.view(), &m, &s)?;
        return score_result(observations, ArrayData::Eager(out));
    }

    let identity: Vec<Option<usize>> = (0..observations.ndim()).map(Some).collect();
    let mut inputs = vec![(observations.to_chunked()?, identity.clone())];
    let mu = mu.into_block_operand(&mut inputs, &identity)?;
    let sigma = sigma.into_block_operand(&mut inputs, &identity)?;
    debug!(dims = ?observations.dims(), inputs = inputs.len(), "crps_gaussian deferred to blocks");

    let func: BlockFn = Arc::new(move |blocks: &[ArrayD<f64>]| {
        pointwise::crps_gaussian(&blocks[0].view(), &mu.view(blocks), &sigma.view(blocks))
    });
    let chunked = ChunkedArray::map_blocks(inputs, observations.shape(), func)?;
    score_result(observations, ArrayData::Lazy(chunked))
}

/// Brier score of the ensemble probability of exceeding a single threshold.
///
/// The threshold is passed to the raw function unmodified. Lazy if either
/// input is lazy.
///
/// # Errors
///
/// * [`SkillScoreError::NotImplemented`] if several thresholds are given.
/// * The dimension errors of [`crps_ensemble`].
pub fn threshold_brier_score(
    observations: &LabeledArray,
    forecasts: &LabeledArray,
    threshold: impl Into<Threshold>,
    member_dim: &MemberDim,
) -> Result<LabeledArray> {
    let threshold = threshold.into().as_scalar()?;
    let aligned = align_ensemble(observations, forecasts, member_dim)?;
    apply_ensemble(observations, aligned, move |obs, fcst, axis| {
        pointwise::threshold_brier_score(obs, fcst, threshold, axis)
    })
}

/// Forecast reordered so its non-member dimensions follow the observation
struct EnsembleAlignment {
    forecasts: LabeledArray,
    axis: usize,
}

impl EnsembleAlignment {
    fn members(&self) -> usize {
        self.forecasts.shape()[self.axis]
    }
}

fn align_ensemble(
    observations: &LabeledArray,
    forecasts: &LabeledArray,
    member_dim: &MemberDim,
) -> Result<EnsembleAlignment> {
    for (dim, labels) in observations.dims().iter().zip(observations.coords()) {
        match forecasts.coord(dim) {
            None => {
                return Err(SkillScoreError::shape_mismatch(format!(
                    "observation dimension '{dim}' is missing from forecasts with dimensions {:?}",
                    forecasts.dims()
                )))
            }
            Some(other) if other != labels => {
                return Err(SkillScoreError::shape_mismatch(format!(
                    "coordinates of dimension '{dim}' differ between observations and forecasts"
                )))
            }
            Some(_) => {}
        }
    }

    let extra: Vec<&String> = forecasts
        .dims()
        .iter()
        .filter(|d| !observations.dims().contains(*d))
        .collect();
    if extra.len() != 1 {
        return Err(SkillScoreError::shape_mismatch(format!(
            "forecasts must have exactly one dimension beyond the observations, found {extra:?}"
        )));
    }
    let member = match member_dim {
        MemberDim::Extra => extra[0].as_str(),
        MemberDim::Named(name) => {
            forecasts.axis_of(name)?;
            if name != extra[0] {
                return Err(SkillScoreError::shape_mismatch(format!(
                    "member dimension '{name}' is shared with the observations; the extra forecast dimension is '{}'",
                    extra[0]
                )));
            }
            name.as_str()
        }
    };

    let axis = forecasts.axis_of(member)?;
    let mut order: Vec<&str> = observations.dims().iter().map(String::as_str).collect();
    order.insert(axis, member);
    debug!(member, axis, order = ?order, "aligned ensemble forecast");

    Ok(EnsembleAlignment {
        forecasts: forecasts.transpose(&order)?,
        axis,
    })
}

fn apply_ensemble<F>(
    observations: &LabeledArray,
    aligned: EnsembleAlignment,
    func: F,
) -> Result<LabeledArray>
where
    F: Fn(&ArrayViewD<f64>, &ArrayViewD<f64>, usize) -> Result<ArrayD<f64>> + Send + Sync + 'static,
{
    let EnsembleAlignment { forecasts, axis } = aligned;
    if let (Some(obs), Some(fcst)) = (observations.values(), forecasts.values()) {
        let out = func(&obs.view(), &fcst.view(), axis)?;
        return score_result(observations, ArrayData::Eager(out));
    }

    let obs_map: Vec<Option<usize>> = (0..observations.ndim()).map(Some).collect();
    let fcst_map: Vec<Option<usize>> = (0..forecasts.ndim())
        .map(|j| match j.cmp(&axis) {
            std::cmp::Ordering::Less => Some(j),
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => Some(j - 1),
        })
        .collect();

    let block_fn: BlockFn =
        Arc::new(move |blocks: &[ArrayD<f64>]| func(&blocks[0].view(), &blocks[1].view(), axis));
    let chunked = ChunkedArray::map_blocks(
        vec![
            (observations.to_chunked()?, obs_map),
            (forecasts.to_chunked()?, fcst_map),
        ],
        observations.shape(),
        block_fn,
    )?;
    score_result(observations, ArrayData::Lazy(chunked))
}

/// Fresh result carrying the observation's dimensions and coordinates
fn score_result(observations: &LabeledArray, data: ArrayData) -> Result<LabeledArray> {
    LabeledArray::from_parts(data, observations.dims().to_vec(), observations.coords().to_vec())
}

/// A Gaussian parameter resolved against the observation grid
enum Operand {
    /// Zero-dimensional array holding the value
    Scalar(ArrayD<f64>),
    /// Values laid out on the observation's dimensions
    Array(ArrayData),
}

impl Operand {
    fn resolve(observations: &LabeledArray, param: Param, what: &str) -> Result<Self> {
        let array = match param {
            Param::Scalar(value) => return Ok(Self::Scalar(arr0(value).into_dyn())),
            Param::Array(array) => array,
        };

        let mut positions = Vec::with_capacity(array.ndim());
        for (dim, labels) in array.dims().iter().zip(array.coords()) {
            let Some(axis) = observations.dims().iter().position(|d| d == dim) else {
                return Err(SkillScoreError::shape_mismatch(format!(
                    "{what} has dimension '{dim}' which the observations lack"
                )));
            };
            if &observations.coords()[axis] != labels {
                return Err(SkillScoreError::shape_mismatch(format!(
                    "coordinates of dimension '{dim}' differ between observations and {what}"
                )));
            }
            positions.push(axis);
        }

        // put the parameter's dimensions in observation order
        let mut order: Vec<usize> = (0..array.ndim()).collect();
        order.sort_by_key(|&j| positions[j]);
        let array = array.permuted(&order)?;
        let axis_map: Vec<Option<usize>> = observations
            .dims()
            .iter()
            .map(|d| array.dims().iter().position(|p| p == d))
            .collect();

        let data = match array.data() {
            ArrayData::Eager(values) => {
                let mut expanded = values.clone();
                for (k, slot) in axis_map.iter().enumerate() {
                    if slot.is_none() {
                        expanded.insert_axis_inplace(Axis(k));
                    }
                }
                let view = expanded.broadcast(IxDyn(observations.shape())).ok_or_else(|| {
                    SkillScoreError::shape_mismatch(format!(
                        "cannot broadcast {what} to the observation shape {:?}",
                        observations.shape()
                    ))
                })?;
                ArrayData::Eager(view.to_owned())
            }
            ArrayData::Lazy(chunked) => {
                ArrayData::Lazy(chunked.broadcast_to(observations.shape(), &axis_map)?)
            }
        };
        Ok(Self::Array(data))
    }

    fn eager_view(&self) -> Option<ArrayViewD<'_, f64>> {
        match self {
            Self::Scalar(value) => Some(value.view()),
            Self::Array(ArrayData::Eager(values)) => Some(values.view()),
            Self::Array(ArrayData::Lazy(_)) => None,
        }
    }

    fn into_block_operand(
        self,
        inputs: &mut Vec<(ChunkedArray, Vec<Option<usize>>)>,
        index_map: &[Option<usize>],
    ) -> Result<BlockOperand> {
        match self {
            Self::Scalar(value) => Ok(BlockOperand::Scalar(value)),
            Self::Array(data) => {
                let chunked = match data {
                    ArrayData::Eager(values) => ChunkedArray::from_array(values, None)?,
                    ArrayData::Lazy(chunked) => chunked,
                };
                inputs.push((chunked, index_map.to_vec()));
                Ok(BlockOperand::Input(inputs.len() - 1))
            }
        }
    }
}

/// Where a mapped block function finds a Gaussian parameter
enum BlockOperand {
    Scalar(ArrayD<f64>),
    Input(usize),
}

impl BlockOperand {
    fn view<'a>(&'a self, blocks: &'a [ArrayD<f64>]) -> ArrayViewD<'a, f64> {
        match self {
            Self::Scalar(value) => value.view(),
            Self::Input(i) => blocks[*i].view(),
        }
    }
}
