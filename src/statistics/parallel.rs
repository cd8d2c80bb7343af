//! Parallel computation implementations for statistical operations
//!
//! Mean and standard deviation walk every lane of the reduced axis on the
//! rayon pool; sum, min and max use ndarray's `fold_axis`.

use ndarray::{ArrayD, ArrayView1, Axis, Zip};

/// Computes the mean along an axis using parallel processing
#[must_use]
pub fn parallel_mean_axis(data: &ArrayD<f64>, axis: usize) -> ArrayD<f64> {
    Zip::from(data.lanes(Axis(axis))).par_map_collect(|lane| {
        let (sum, count) = finite_sum(lane);
        if count > 0 {
            sum / count as f64
        } else {
            f64::NAN // Return NaN if all values were invalid
        }
    })
}

/// Computes the population standard deviation along an axis in parallel
#[must_use]
pub fn parallel_std_axis(data: &ArrayD<f64>, axis: usize) -> ArrayD<f64> {
    Zip::from(data.lanes(Axis(axis))).par_map_collect(|lane| {
        let (sum, count) = finite_sum(lane);
        if count == 0 {
            return f64::NAN;
        }
        let mean = sum / count as f64;
        let squares: f64 = lane
            .iter()
            .filter(|x| x.is_finite())
            .map(|&x| (x - mean) * (x - mean))
            .sum();
        (squares / count as f64).sqrt()
    })
}

/// Computes sum along an axis using ndarray's `fold_axis`
#[must_use]
pub fn parallel_sum_axis(data: &ArrayD<f64>, axis: usize) -> ArrayD<f64> {
    data.fold_axis(Axis(axis), 0.0_f64, |&acc, &x| {
        if x.is_finite() {
            acc + x
        } else {
            acc // Skip NaN and infinite values
        }
    })
}

/// Computes minimum along an axis using ndarray's `fold_axis`
#[must_use]
pub fn parallel_min_axis(data: &ArrayD<f64>, axis: usize) -> ArrayD<f64> {
    let result = data.fold_axis(Axis(axis), f64::INFINITY, |&acc, &x| {
        if x.is_finite() {
            acc.min(x)
        } else {
            acc
        }
    });

    // Convert INFINITY to NaN where no valid values were found
    result.mapv(|x| if x == f64::INFINITY { f64::NAN } else { x })
}

/// Computes maximum along an axis using ndarray's `fold_axis`
#[must_use]
pub fn parallel_max_axis(data: &ArrayD<f64>, axis: usize) -> ArrayD<f64> {
    let result = data.fold_axis(Axis(axis), f64::NEG_INFINITY, |&acc, &x| {
        if x.is_finite() {
            acc.max(x)
        } else {
            acc
        }
    });

    result.mapv(|x| if x == f64::NEG_INFINITY { f64::NAN } else { x })
}

fn finite_sum(lane: ArrayView1<f64>) -> (f64, usize) {
    lane.iter()
        .filter(|x| x.is_finite())
        .fold((0.0, 0), |(sum, count), &x| (sum + x, count + 1))
}
