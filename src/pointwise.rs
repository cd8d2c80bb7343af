//! Raw-buffer probabilistic scores
//!
//! These functions know nothing about dimension names, coordinates or
//! chunks: they take plain `ndarray` views, an explicit ensemble axis where one
//! is needed, and return a plain array. The labeled adapters in
//! [`crate::probabilistic`] call them unchanged, block by block.

use crate::errors::{Result, SkillScoreError};
use ndarray::{ArrayD, ArrayView1, ArrayViewD, Axis, Zip};
use statrs::function::erf::erf;
use std::f64::consts::{PI, SQRT_2};

/// Continuous ranked probability score of an ensemble forecast.
///
/// `axis` is the ensemble axis of `forecasts`; the other forecast axes must
/// match the shape of `observations`. A forecast with exactly the observation
/// shape is scored as a one-member ensemble. `weights`, if given, holds one
/// non-negative weight per member.
///
/// NaN members are left out of the ensemble. Points with a NaN observation,
/// or with no non-NaN member, score NaN.
///
/// # Errors
///
/// Returns [`SkillScoreError::ShapeMismatch`] if the shapes disagree and
/// [`SkillScoreError::InvalidParameter`] for a bad axis or bad weights.
pub fn crps_ensemble(
    observations: &ArrayViewD<f64>,
    forecasts: &ArrayViewD<f64>,
    weights: Option<&[f64]>,
    axis: usize,
) -> Result<ArrayD<f64>> {
    let (forecasts, axis) = ensemble_view(observations, forecasts, axis)?;
    let members = forecasts.len_of(Axis(axis));
    if let Some(w) = weights {
        validate_weights(w, members)?;
    }

    Ok(Zip::from(observations)
        .and(forecasts.lanes(Axis(axis)))
        .map_collect(|&obs, lane| crps_lane(obs, lane, weights)))
}

/// Continuous ranked probability score of a Gaussian forecast `N(mu, sig^2)`.
///
/// Inputs broadcast against each other following the usual trailing-axis
/// rules.
///
/// # Errors
///
/// Returns [`SkillScoreError::ShapeMismatch`] if the shapes cannot broadcast.
pub fn crps_gaussian(
    x: &ArrayViewD<f64>,
    mu: &ArrayViewD<f64>,
    sig: &ArrayViewD<f64>,
) -> Result<ArrayD<f64>> {
    let (x, mu, sig) = broadcast3(x, mu, sig)?;
    Ok(Zip::from(&x)
        .and(&mu)
        .and(&sig)
        .map_collect(|&x, &mu, &sig| gaussian_terms(x, mu, sig).crps))
}

/// Gaussian CRPS together with its partial derivatives
#[derive(Debug, Clone)]
pub struct GaussianCrps {
    pub crps: ArrayD<f64>,
    /// Derivative with respect to the mean
    pub d_mu: ArrayD<f64>,
    /// Derivative with respect to the standard deviation
    pub d_sigma: ArrayD<f64>,
}

/// Gaussian CRPS and its gradient with respect to `mu` and `sig`
///
/// # Errors
///
/// Returns [`SkillScoreError::ShapeMismatch`] if the shapes cannot broadcast.
pub fn crps_gaussian_with_gradient(
    x: &ArrayViewD<f64>,
    mu: &ArrayViewD<f64>,
    sig: &ArrayViewD<f64>,
) -> Result<GaussianCrps> {
    let (x, mu, sig) = broadcast3(x, mu, sig)?;
    let terms = Zip::from(&x)
        .and(&mu)
        .and(&sig)
        .map_collect(|&x, &mu, &sig| gaussian_terms(x, mu, sig));
    Ok(GaussianCrps {
        crps: terms.mapv(|t| t.crps),
        d_mu: terms.mapv(|t| t.d_mu),
        d_sigma: terms.mapv(|t| t.d_sigma),
    })
}

/// Brier score of the ensemble's probability of exceeding `threshold`.
///
/// The forecast probability is the fraction of members strictly above the
/// threshold; the outcome is whether the observation is strictly above it.
/// The result has the observation shape.
///
/// # Errors
///
/// Same conditions as [`crps_ensemble`].
pub fn threshold_brier_score(
    observations: &ArrayViewD<f64>,
    forecasts: &ArrayViewD<f64>,
    threshold: f64,
    axis: usize,
) -> Result<ArrayD<f64>> {
    let (forecasts, axis) = ensemble_view(observations, forecasts, axis)?;
    Ok(Zip::from(observations)
        .and(forecasts.lanes(Axis(axis)))
        .map_collect(|&obs, lane| brier_lane(obs, lane, threshold)))
}

/// Brier scores for several sorted thresholds at once.
///
/// The result has the observation shape plus a trailing threshold axis.
///
/// # Errors
///
/// Returns [`SkillScoreError::InvalidParameter`] if the thresholds are empty
/// or unsorted, otherwise the same conditions as [`crps_ensemble`].
pub fn threshold_brier_score_multi(
    observations: &ArrayViewD<f64>,
    forecasts: &ArrayViewD<f64>,
    thresholds: &[f64],
    axis: usize,
) -> Result<ArrayD<f64>> {
    if thresholds.is_empty() {
        return Err(SkillScoreError::InvalidParameter(
            "at least one threshold is required".to_string(),
        ));
    }
    if thresholds.windows(2).any(|w| !(w[0] <= w[1])) {
        return Err(SkillScoreError::InvalidParameter(
            "1D thresholds must be sorted".to_string(),
        ));
    }

    let scores = thresholds
        .iter()
        .map(|&t| threshold_brier_score(observations, forecasts, t, axis))
        .collect::<Result<Vec<_>>>()?;
    let views: Vec<_> = scores
        .iter()
        .map(|s| s.view().insert_axis(Axis(s.ndim())))
        .collect();
    Ok(ndarray::concatenate(Axis(observations.ndim()), &views)?)
}

/// Resolve the ensemble axis, promoting a same-shape forecast to one member
fn ensemble_view<'a>(
    observations: &ArrayViewD<f64>,
    forecasts: &ArrayViewD<'a, f64>,
    axis: usize,
) -> Result<(ArrayViewD<'a, f64>, usize)> {
    if forecasts.shape() == observations.shape() {
        let ndim = forecasts.ndim();
        return Ok((forecasts.clone().insert_axis(Axis(ndim)), ndim));
    }
    if axis >= forecasts.ndim() {
        return Err(SkillScoreError::InvalidParameter(format!(
            "axis {axis} is out of bounds for forecasts with {} dimensions",
            forecasts.ndim()
        )));
    }

    let mut remaining = forecasts.shape().to_vec();
    remaining.remove(axis);
    if remaining != observations.shape() {
        return Err(SkillScoreError::shape_mismatch(format!(
            "forecasts of shape {:?} without axis {axis} do not match observations of shape {:?}",
            forecasts.shape(),
            observations.shape()
        )));
    }
    Ok((forecasts.clone(), axis))
}

pub(crate) fn validate_weights(weights: &[f64], members: usize) -> Result<()> {
    if weights.len() != members {
        return Err(SkillScoreError::InvalidParameter(format!(
            "{} weights given for {members} ensemble members",
            weights.len()
        )));
    }
    if weights.iter().any(|w| w.is_nan() || *w < 0.0) {
        return Err(SkillScoreError::InvalidParameter(
            "ensemble weights must be non-negative".to_string(),
        ));
    }
    Ok(())
}

/// Exact integral of `(F(y) - H(y - obs))^2` for the weighted empirical CDF `F`
fn crps_lane(obs: f64, lane: ArrayView1<f64>, weights: Option<&[f64]>) -> f64 {
    if obs.is_nan() {
        return f64::NAN;
    }

    // NaN members are dropped along with their weights
    let mut members: Vec<(f64, f64)> = lane
        .iter()
        .enumerate()
        .filter(|(_, f)| !f.is_nan())
        .map(|(i, &f)| (f, weights.map_or(1.0, |w| w[i])))
        .collect();
    members.sort_by(|a, b| a.0.total_cmp(&b.0));
    let total_weight: f64 = members.iter().map(|m| m.1).sum();
    if members.is_empty() || total_weight <= 0.0 {
        return f64::NAN;
    }

    let mut obs_cdf = 0.0;
    let mut forecast_cdf = 0.0;
    let mut prev_forecast = 0.0;
    let mut integral = 0.0;
    for &(forecast, weight) in &members {
        if obs_cdf == 0.0 && obs < forecast {
            integral += (obs - prev_forecast) * forecast_cdf * forecast_cdf;
            integral += (forecast - obs) * (forecast_cdf - 1.0) * (forecast_cdf - 1.0);
            obs_cdf = 1.0;
        } else {
            integral += (forecast - prev_forecast) * (forecast_cdf - obs_cdf) * (forecast_cdf - obs_cdf);
        }
        forecast_cdf += weight / total_weight;
        prev_forecast = forecast;
    }

    // observation above every member
    if obs_cdf == 0.0 {
        integral += obs - prev_forecast;
    }
    integral
}

fn brier_lane(obs: f64, lane: ArrayView1<f64>, threshold: f64) -> f64 {
    if obs.is_nan() || lane.is_empty() || lane.iter().any(|f| f.is_nan()) {
        return f64::NAN;
    }
    let exceeding = lane.iter().filter(|&&f| f > threshold).count();
    let probability = exceeding as f64 / lane.len() as f64;
    let outcome = if obs > threshold { 1.0 } else { 0.0 };
    (probability - outcome) * (probability - outcome)
}

#[derive(Debug, Clone, Copy)]
struct GaussianTerms {
    crps: f64,
    d_mu: f64,
    d_sigma: f64,
}

fn gaussian_terms(x: f64, mu: f64, sig: f64) -> GaussianTerms {
    let sx = (x - mu) / sig;
    let pdf = (-0.5 * sx * sx).exp() / (2.0 * PI).sqrt();
    let cdf = 0.5 * (1.0 + erf(sx / SQRT_2));
    let pi_inv = 1.0 / PI.sqrt();
    GaussianTerms {
        crps: sig * (sx * (2.0 * cdf - 1.0) + 2.0 * pdf - pi_inv),
        d_mu: 1.0 - 2.0 * cdf,
        d_sigma: 2.0 * pdf - pi_inv,
    }
}

type Broadcast3<'a> = (ArrayViewD<'a, f64>, ArrayViewD<'a, f64>, ArrayViewD<'a, f64>);

fn broadcast3<'a>(
    a: &'a ArrayViewD<f64>,
    b: &'a ArrayViewD<f64>,
    c: &'a ArrayViewD<f64>,
) -> Result<Broadcast3<'a>> {
    let shape = broadcast_shape(&[a.shape(), b.shape(), c.shape()])?;
    let view = |v: &'a ArrayViewD<f64>| {
        v.broadcast(shape.clone()).ok_or_else(|| {
            SkillScoreError::shape_mismatch(format!(
                "cannot broadcast shape {:?} to {shape:?}",
                v.shape()
            ))
        })
    };
    Ok((view(a)?, view(b)?, view(c)?))
}

/// Broadcast shape of several arrays, aligning trailing axes
pub(crate) fn broadcast_shape(shapes: &[&[usize]]) -> Result<Vec<usize>> {
    let ndim = shapes.iter().map(|s| s.len()).max().unwrap_or(0);
    let mut out = vec![1; ndim];
    for shape in shapes {
        let pad = ndim - shape.len();
        for (i, &len) in shape.iter().enumerate() {
            let slot = &mut out[pad + i];
            if *slot == 1 {
                *slot = len;
            } else if len != 1 && len != *slot {
                return Err(SkillScoreError::shape_mismatch(format!(
                    "shapes {shapes:?} cannot be broadcast together"
                )));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr0, array, IxDyn};

    fn scalar(a: &ArrayD<f64>) -> f64 {
        a.iter().copied().next().unwrap()
    }

    #[test]
    fn single_member_crps_is_absolute_error() {
        let obs = array![1.0, 4.0].into_dyn();
        let fcst = array![3.0, 1.5].into_dyn();
        let crps = crps_ensemble(&obs.view(), &fcst.view(), None, 0).unwrap();
        assert_relative_eq!(crps[[0]], 2.0);
        assert_relative_eq!(crps[[1]], 2.5);
    }

    #[test]
    fn ensemble_crps_matches_energy_form() {
        // CRPS = E|X - y| - 0.5 E|X - X'|
        let members = [0.2, 0.9, 0.4, 1.3];
        let y = 0.7;
        let n = members.len() as f64;
        let e1: f64 = members.iter().map(|m: &f64| (m - y).abs()).sum::<f64>() / n;
        let e2: f64 = members
            .iter()
            .flat_map(|a| members.iter().map(move |b| (a - b).abs()))
            .sum::<f64>()
            / (n * n);
        let expected = e1 - 0.5 * e2;

        let obs = arr0(y).into_dyn();
        let fcst = ArrayD::from_shape_vec(IxDyn(&[4]), members.to_vec()).unwrap();
        let crps = crps_ensemble(&obs.view(), &fcst.view(), None, 0).unwrap();
        assert_relative_eq!(scalar(&crps), expected, epsilon = 1e-12);
    }

    #[test]
    fn ensemble_axis_can_be_anywhere() {
        let obs = array![[0.5, 0.1], [0.3, 0.9]].into_dyn();
        let leading = ArrayD::from_shape_fn(IxDyn(&[3, 2, 2]), |ix| {
            (ix[0] as f64 * 0.3 + ix[1] as f64 * 0.2 + ix[2] as f64 * 0.1).sin()
        });
        let trailing = leading.view().permuted_axes(IxDyn(&[1, 2, 0]));
        let a = crps_ensemble(&obs.view(), &leading.view(), None, 0).unwrap();
        let b = crps_ensemble(&obs.view(), &trailing, None, 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn nan_observation_gives_nan() {
        let obs = array![f64::NAN, 1.0].into_dyn();
        let fcst = array![[0.0, 1.0], [0.5, 2.0]].into_dyn();
        let crps = crps_ensemble(&obs.view(), &fcst.view(), None, 0).unwrap();
        assert!(crps[[0]].is_nan());
        assert!(crps[[1]].is_finite());
    }

    #[test]
    fn nan_members_are_dropped_from_crps() {
        // point 1 has members [1, NaN] under an observation of 3
        let obs = array![0.0, 3.0].into_dyn();
        let fcst = array![[0.0, 1.0], [f64::NAN, f64::NAN]].into_dyn();
        let crps = crps_ensemble(&obs.view(), &fcst.view(), None, 0).unwrap();
        assert_relative_eq!(crps[[0]], 0.0);
        assert_relative_eq!(crps[[1]], 2.0);

        let weighted = crps_ensemble(&obs.view(), &fcst.view(), Some(&[1.0, 5.0]), 0).unwrap();
        assert_relative_eq!(weighted[[1]], 2.0);

        let all_missing = array![[f64::NAN], [f64::NAN]].into_dyn();
        let crps = crps_ensemble(&array![0.0].into_dyn().view(), &all_missing.view(), None, 0).unwrap();
        assert!(crps[[0]].is_nan());
    }

    #[test]
    fn nan_member_gives_nan_brier_score() {
        let obs = array![0.0, 3.0].into_dyn();
        let fcst = array![[0.0, 1.0], [1.0, f64::NAN]].into_dyn();
        let brier = threshold_brier_score(&obs.view(), &fcst.view(), 0.5, 0).unwrap();
        assert_relative_eq!(brier[[0]], 0.25);
        assert!(brier[[1]].is_nan());
    }

    #[test]
    fn weights_shift_the_ensemble_cdf() {
        let obs = arr0(0.0).into_dyn();
        let fcst = array![0.0, 10.0].into_dyn();
        let heavy_near = crps_ensemble(&obs.view(), &fcst.view(), Some(&[9.0, 1.0]), 0).unwrap();
        let uniform = crps_ensemble(&obs.view(), &fcst.view(), None, 0).unwrap();
        assert!(scalar(&heavy_near) < scalar(&uniform));
        assert!(crps_ensemble(&obs.view(), &fcst.view(), Some(&[1.0]), 0).is_err());
        assert!(crps_ensemble(&obs.view(), &fcst.view(), Some(&[-1.0, 2.0]), 0).is_err());
    }

    #[test]
    fn ensemble_shape_mismatch_is_rejected() {
        let obs = array![1.0, 2.0, 3.0].into_dyn();
        let fcst = ArrayD::zeros(IxDyn(&[2, 4]));
        let result = crps_ensemble(&obs.view(), &fcst.view(), None, 0);
        assert!(matches!(result, Err(SkillScoreError::ShapeMismatch { .. })));
        let result = crps_ensemble(&obs.view(), &fcst.view(), None, 5);
        assert!(matches!(result, Err(SkillScoreError::InvalidParameter(_))));
    }

    #[test]
    fn gaussian_crps_known_values() {
        // standard normal at the mean: 2*phi(0) - 1/sqrt(pi)
        let x = arr0(0.0).into_dyn();
        let mu = arr0(0.0).into_dyn();
        let sig = arr0(1.0).into_dyn();
        let crps = crps_gaussian(&x.view(), &mu.view(), &sig.view()).unwrap();
        let expected = 2.0 / (2.0 * PI).sqrt() - 1.0 / PI.sqrt();
        assert_relative_eq!(scalar(&crps), expected, epsilon = 1e-12);
    }

    #[test]
    fn gaussian_crps_broadcasts_scalars() {
        let x = array![[0.0, 1.0], [2.0, -1.0]].into_dyn();
        let mu = arr0(0.5).into_dyn();
        let sig = array![1.0, 2.0].into_dyn();
        let crps = crps_gaussian(&x.view(), &mu.view(), &sig.view()).unwrap();
        assert_eq!(crps.shape(), &[2, 2]);
        let single = crps_gaussian(&arr0(2.0).into_dyn().view(), &mu.view(), &arr0(1.0).into_dyn().view()).unwrap();
        assert_eq!(crps[[1, 0]], scalar(&single));

        let bad = array![1.0, 2.0, 3.0].into_dyn();
        assert!(crps_gaussian(&x.view(), &bad.view(), &sig.view()).is_err());
    }

    #[test]
    fn gaussian_gradient_matches_finite_difference() {
        let x = arr0(0.3).into_dyn();
        let sig = arr0(1.7).into_dyn();
        let h = 1e-6;
        let at = |mu: f64| {
            scalar(&crps_gaussian(&x.view(), &arr0(mu).into_dyn().view(), &sig.view()).unwrap())
        };
        let grad = crps_gaussian_with_gradient(&x.view(), &arr0(-0.4).into_dyn().view(), &sig.view()).unwrap();
        let numeric = (at(-0.4 + h) - at(-0.4 - h)) / (2.0 * h);
        assert_relative_eq!(scalar(&grad.d_mu), numeric, epsilon = 1e-6);
    }

    #[test]
    fn brier_score_counts_exceeding_members() {
        let obs = array![0.9, 0.1].into_dyn();
        let fcst = array![[0.2, 0.6], [0.7, 0.4], [0.8, 0.3], [0.1, 0.9]].into_dyn();
        let bs = threshold_brier_score(&obs.view(), &fcst.view(), 0.5, 0).unwrap();
        // point 0: p = 2/4, o = 1; point 1: p = 2/4, o = 0
        assert_eq!(bs[[0]], 0.25);
        assert_eq!(bs[[1]], 0.25);
    }

    #[test]
    fn brier_score_with_several_thresholds_appends_axis() {
        let obs = array![0.9, 0.1].into_dyn();
        let fcst = array![[0.2, 0.6], [0.7, 0.4]].into_dyn();
        let bs = threshold_brier_score_multi(&obs.view(), &fcst.view(), &[0.1, 0.5], 0).unwrap();
        assert_eq!(bs.shape(), &[2, 2]);
        let single = threshold_brier_score(&obs.view(), &fcst.view(), 0.5, 0).unwrap();
        assert_eq!(bs[[1, 1]], single[[1]]);
        assert!(threshold_brier_score_multi(&obs.view(), &fcst.view(), &[0.5, 0.1], 0).is_err());
    }

    #[test]
    fn broadcast_shape_follows_trailing_rules() {
        assert_eq!(broadcast_shape(&[&[4, 5], &[5], &[]]).unwrap(), vec![4, 5]);
        assert_eq!(broadcast_shape(&[&[4, 1], &[1, 5]]).unwrap(), vec![4, 5]);
        assert!(broadcast_shape(&[&[4, 5], &[4]]).is_err());
    }
}
