//! Building blocks for closed-form Jacobians.
//!
//! A Jacobian of an output series with respect to an input series is a dense
//! `nb_years x nb_years` matrix where entry `[i, j]` is
//! $\partial \text{output}_i / \partial \text{input}_j$.
//! Scalar objectives use a single row.
//!
//! The helpers here mirror the shape of the forward recurrences:
//! cumulative sums, delayed bands and first-order linear recurrences.

use crate::years::FloatValue;
use ndarray::{Array1, Array2, ArrayView1, Axis};

pub type Jacobian = Array2<FloatValue>;

pub fn zeros(n: usize) -> Jacobian {
    Array2::zeros((n, n))
}

pub fn identity(n: usize) -> Jacobian {
    Array2::eye(n)
}

pub fn scaled_identity(n: usize, scale: FloatValue) -> Jacobian {
    Array2::eye(n) * scale
}

pub fn diagonal(values: ArrayView1<FloatValue>) -> Jacobian {
    Array2::from_diag(&values)
}

/// Derivative of a running sum: lower triangular matrix of ones
pub fn cumulative(n: usize) -> Jacobian {
    Array2::from_shape_fn((n, n), |(i, j)| if j <= i { 1.0 } else { 0.0 })
}

/// Band of `scale` at `[i, i - delay]`
///
/// Derivative of a series shifted `delay` rows forward.
pub fn shifted(n: usize, delay: usize, scale: FloatValue) -> Jacobian {
    Array2::from_shape_fn((n, n), |(i, j)| if i >= delay && j == i - delay { scale } else { 0.0 })
}

/// Derivative of the recurrence $x_i = r_i x_{i-1} + c_i u_i$ with respect to `u`
///
/// `retention[i]` multiplies the previous row, `injection[i]` is the direct
/// sensitivity of row `i` to input `i`. Row 0 is taken as the seed, so only
/// `injection[0]` contributes to it.
pub fn linear_recurrence(
    retention: ArrayView1<FloatValue>,
    injection: ArrayView1<FloatValue>,
) -> Jacobian {
    let n = injection.len();
    let mut jac = zeros(n);
    for i in 0..n {
        for j in 0..i {
            jac[[i, j]] = jac[[i - 1, j]] * retention[i];
        }
        jac[[i, i]] += injection[i];
    }
    jac
}

/// 1 x n row holding the derivative of the mean of a series
pub fn mean_row(n: usize) -> Jacobian {
    Array2::from_elem((1, n), 1.0 / n as FloatValue)
}

/// Multiply row `i` of `jac` by `scale[i]`, i.e. `diag(scale) . jac`
pub fn scale_rows(scale: ArrayView1<FloatValue>, jac: &Jacobian) -> Jacobian {
    let mut out = jac.clone();
    for (mut row, s) in out.rows_mut().into_iter().zip(scale.iter()) {
        row *= *s;
    }
    out
}

/// Stack a column vector as a single row
pub fn as_row(values: Array1<FloatValue>) -> Jacobian {
    values.insert_axis(Axis(0))
}

/// True when every entry above the diagonal is zero
pub fn is_lower_triangular(jac: &Jacobian) -> bool {
    jac.indexed_iter().all(|((i, j), v)| j <= i || *v == 0.0)
}
