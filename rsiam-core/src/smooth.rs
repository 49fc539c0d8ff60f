//! Differentiable maximum.
//!
//! The smooth maximum of $x_1 \dots x_m$ is the exponentially weighted mean
//!
//! $$ S = \frac{\sum_j x_j e^{\alpha x_j - k}}{\sum_j e^{\alpha x_j - k}} $$
//!
//! where $k = \max_j(\alpha x_j) - 650$ keeps the largest exponent representable.
//! Exponents are floored at -300; a floored term keeps its weight but no
//! longer carries a derivative through the exponential.

use crate::years::FloatValue;
use ndarray::{Array1, Array2, ArrayView1};

/// Smoothing strength used by the policy engine
pub const DEFAULT_ALPHA: FloatValue = 3.0;

const MAX_EXPONENT: FloatValue = 650.0;
const MIN_EXPONENT: FloatValue = -300.0;

struct Weights {
    weights: Vec<FloatValue>,
    unclamped: Vec<bool>,
    denominator: FloatValue,
    value: FloatValue,
}

fn weights(values: &[FloatValue], alpha: FloatValue) -> Weights {
    let shift = values
        .iter()
        .map(|x| alpha * x)
        .fold(FloatValue::NEG_INFINITY, FloatValue::max)
        - MAX_EXPONENT;

    let mut weights = Vec::with_capacity(values.len());
    let mut unclamped = Vec::with_capacity(values.len());
    for x in values {
        let exponent = alpha * x - shift;
        unclamped.push(exponent > MIN_EXPONENT);
        weights.push(exponent.max(MIN_EXPONENT).exp());
    }
    let denominator: FloatValue = weights.iter().sum();
    let numerator: FloatValue = values.iter().zip(&weights).map(|(x, w)| x * w).sum();

    Weights {
        weights,
        unclamped,
        denominator,
        value: numerator / denominator,
    }
}

/// Smooth maximum of `values`
///
/// Always lies between the minimum and the maximum of `values`,
/// and approaches the maximum as `alpha` grows.
pub fn smooth_maximum(values: &[FloatValue], alpha: FloatValue) -> FloatValue {
    weights(values, alpha).value
}

/// Gradient of [`smooth_maximum`] with respect to each of `values`
pub fn smooth_maximum_gradient(values: &[FloatValue], alpha: FloatValue) -> Vec<FloatValue> {
    let w = weights(values, alpha);
    values
        .iter()
        .zip(w.weights.iter().zip(&w.unclamped))
        .map(|(x, (weight, unclamped))| {
            let mut d = weight / w.denominator;
            if *unclamped {
                d += alpha * weight * (x - w.value) / w.denominator;
            }
            d
        })
        .collect()
}

/// Row-wise smooth maximum of candidate series
///
/// `candidates` holds one candidate per column and one year per row.
pub fn smooth_maximum_rows(candidates: &Array2<FloatValue>, alpha: FloatValue) -> Array1<FloatValue> {
    candidates
        .rows()
        .into_iter()
        .map(|row| smooth_maximum(&row.to_vec(), alpha))
        .collect()
}

/// Row-wise gradient of [`smooth_maximum_rows`], same shape as `candidates`
pub fn smooth_maximum_rows_gradient(
    candidates: &Array2<FloatValue>,
    alpha: FloatValue,
) -> Array2<FloatValue> {
    let mut gradient = Array2::zeros(candidates.raw_dim());
    for (i, row) in candidates.rows().into_iter().enumerate() {
        let g = smooth_maximum_gradient(&row.to_vec(), alpha);
        gradient.row_mut(i).assign(&ArrayView1::from(&g));
    }
    gradient
}
