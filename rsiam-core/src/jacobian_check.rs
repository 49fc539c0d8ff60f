//! Validation of analytic Jacobians against finite differences.
//!
//! Engines are written over `f64`, so derivatives are checked numerically by
//! perturbing one input year at a time and re-running the forward computation.
//! Central differences are the default. One-sided schemes are used on either
//! side of a non-smooth branch (such as the forest deforestation floor) so
//! that no perturbation crosses the branch.
//!
//! ```
//! use ndarray::{array, Array2};
//! use rsiam_core::jacobian_check::JacobianCheck;
//!
//! let x0 = array![1.0, 2.0, 3.0];
//! let analytic = Array2::from_diag(&(&x0 * 2.0));
//! let report = JacobianCheck::new("square")
//!     .run(&analytic, &x0, |x| Ok(x.mapv(|v| v * v)))
//!     .unwrap();
//! assert!(report.is_ok(), "{}", report);
//! ```

use crate::engine::{CouplingInputs, Differentiable, Engine, InputOf, OutputOf};
use crate::errors::{RsiamError, RsiamResult};
use crate::jacobian::Jacobian;
use crate::years::FloatValue;
use ndarray::{Array1, Array2};
use std::fmt;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifferenceScheme {
    Central,
    /// Perturb upwards only
    Forward,
    /// Perturb downwards only
    Backward,
}

/// Perturbation used to build a numeric Jacobian
///
/// The step for input `j` is `relative_step * max(|x_j|, 1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiniteDifference {
    relative_step: FloatValue,
    scheme: DifferenceScheme,
}

impl Default for FiniteDifference {
    fn default() -> Self {
        Self {
            relative_step: 1e-6,
            scheme: DifferenceScheme::Central,
        }
    }
}

impl FiniteDifference {
    pub fn new(relative_step: FloatValue, scheme: DifferenceScheme) -> RsiamResult<Self> {
        if !relative_step.is_finite() || relative_step <= 0.0 {
            return Err(RsiamError::InvalidParameter {
                name: "relative_step".to_string(),
                reason: format!("must be finite and > 0, got {}", relative_step),
            });
        }
        Ok(Self {
            relative_step,
            scheme,
        })
    }

    pub fn scheme(&self) -> DifferenceScheme {
        self.scheme
    }

    fn step(&self, x: FloatValue) -> FloatValue {
        self.relative_step * x.abs().max(1.0)
    }
}

/// Numeric Jacobian of `f` at `x0`
///
/// Returns a `len(f(x0)) x len(x0)` matrix.
pub fn numeric_jacobian<F>(
    x0: &Array1<FloatValue>,
    fd: &FiniteDifference,
    mut f: F,
) -> RsiamResult<Jacobian>
where
    F: FnMut(&Array1<FloatValue>) -> RsiamResult<Array1<FloatValue>>,
{
    let base = f(x0)?;
    let mut jac = Array2::zeros((base.len(), x0.len()));

    let mut eval = |x: &Array1<FloatValue>| -> RsiamResult<Array1<FloatValue>> {
        let y = f(x)?;
        if y.len() != base.len() {
            return Err(RsiamError::LengthMismatch {
                table: "numeric jacobian output".to_string(),
                expected: base.len(),
                found: y.len(),
            });
        }
        Ok(y)
    };

    for j in 0..x0.len() {
        let h = fd.step(x0[j]);
        let mut up = x0.clone();
        let mut down = x0.clone();
        up[j] += h;
        down[j] -= h;

        let column = match fd.scheme {
            DifferenceScheme::Central => (eval(&up)? - eval(&down)?) / (2.0 * h),
            DifferenceScheme::Forward => (eval(&up)? - &base) / h,
            DifferenceScheme::Backward => (&base - &eval(&down)?) / h,
        };
        jac.column_mut(j).assign(&column);
    }
    Ok(jac)
}

/// Acceptance band for one entry: `|a - n| <= absolute + relative * max(|a|, |n|)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub relative: FloatValue,
    pub absolute: FloatValue,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            relative: 1e-6,
            absolute: 1e-8,
        }
    }
}

impl Tolerance {
    pub fn new(relative: FloatValue, absolute: FloatValue) -> Self {
        Self { relative, absolute }
    }

    pub fn accepts(&self, analytic: FloatValue, numeric: FloatValue) -> bool {
        (analytic - numeric).abs() <= self.absolute + self.relative * analytic.abs().max(numeric.abs())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mismatch {
    pub row: usize,
    pub col: usize,
    pub analytic: FloatValue,
    pub numeric: FloatValue,
}

/// Outcome of comparing an analytic Jacobian with its numeric estimate
#[derive(Debug, Clone)]
pub struct JacobianReport {
    pub pair: String,
    pub shape: (usize, usize),
    pub mismatches: Vec<Mismatch>,
    pub max_abs_error: FloatValue,
}

impl JacobianReport {
    pub fn is_ok(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// Convert into an error carrying the first mismatch
    pub fn into_result(self) -> RsiamResult<()> {
        match self.mismatches.first() {
            None => Ok(()),
            Some(first) => Err(RsiamError::JacobianMismatch {
                pair: self.pair.clone(),
                count: self.mismatches.len(),
                row: first.row,
                col: first.col,
                analytic: first.analytic,
                numeric: first.numeric,
            }),
        }
    }
}

impl fmt::Display for JacobianReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} ({}x{}): {} mismatches, max abs error {:e}",
            self.pair,
            self.shape.0,
            self.shape.1,
            self.mismatches.len(),
            self.max_abs_error
        )?;
        for m in self.mismatches.iter().take(10) {
            writeln!(
                f,
                "  Mismatch at row {}, col {}: analytic={:e}, numeric={:e}",
                m.row, m.col, m.analytic, m.numeric
            )?;
        }
        Ok(())
    }
}

/// Compare two Jacobians entry by entry
pub fn compare(
    pair: &str,
    analytic: &Jacobian,
    numeric: &Jacobian,
    tolerance: &Tolerance,
) -> RsiamResult<JacobianReport> {
    if analytic.shape() != numeric.shape() {
        return Err(RsiamError::Error(format!(
            "Jacobian `{}` shapes differ: analytic {:?}, numeric {:?}",
            pair,
            analytic.shape(),
            numeric.shape()
        )));
    }

    let mut mismatches = vec![];
    let mut max_abs_error: FloatValue = 0.0;
    for ((row, col), a) in analytic.indexed_iter() {
        let n = numeric[[row, col]];
        max_abs_error = max_abs_error.max((a - n).abs());
        if !tolerance.accepts(*a, n) {
            mismatches.push(Mismatch {
                row,
                col,
                analytic: *a,
                numeric: n,
            });
        }
    }

    Ok(JacobianReport {
        pair: pair.to_string(),
        shape: analytic.dim(),
        mismatches,
        max_abs_error,
    })
}

/// Builder for a single (output, input) Jacobian check
#[derive(Debug, Clone)]
pub struct JacobianCheck {
    pair: String,
    tolerance: Tolerance,
    finite_difference: FiniteDifference,
}

impl JacobianCheck {
    pub fn new(pair: &str) -> Self {
        Self {
            pair: pair.to_string(),
            tolerance: Tolerance::default(),
            finite_difference: FiniteDifference::default(),
        }
    }

    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_finite_difference(mut self, finite_difference: FiniteDifference) -> Self {
        self.finite_difference = finite_difference;
        self
    }

    /// Estimate the Jacobian of `f` at `x0` and compare it with `analytic`
    pub fn run<F>(
        &self,
        analytic: &Jacobian,
        x0: &Array1<FloatValue>,
        f: F,
    ) -> RsiamResult<JacobianReport>
    where
        F: FnMut(&Array1<FloatValue>) -> RsiamResult<Array1<FloatValue>>,
    {
        let numeric = numeric_jacobian(x0, &self.finite_difference, f)?;
        let report = compare(&self.pair, analytic, &numeric, &self.tolerance)?;
        trace!(
            pair = %self.pair,
            mismatches = report.mismatches.len(),
            max_abs_error = report.max_abs_error,
            "jacobian check"
        );
        Ok(report)
    }

    /// Check one (output, input) pair of a configured engine
    ///
    /// The analytic Jacobian comes from a run on `inputs`; the numeric one
    /// re-runs the engine with the `input` series perturbed.
    pub fn run_engine<E: Engine>(
        &self,
        engine: &E,
        inputs: &E::Inputs,
        output: OutputOf<E>,
        input: InputOf<E>,
    ) -> RsiamResult<JacobianReport> {
        let analytic = engine.compute(inputs)?.jacobian(output, input)?;
        let x0 = inputs.series(input)?;
        self.run(&analytic, &x0, |x| {
            let perturbed = inputs.replacing(input, x.clone())?;
            engine.compute(&perturbed)?.series(output)
        })
    }

    /// Same as [`JacobianCheck::run`], failing with [`RsiamError::JacobianMismatch`]
    pub fn assert<F>(&self, analytic: &Jacobian, x0: &Array1<FloatValue>, f: F) -> RsiamResult<()>
    where
        F: FnMut(&Array1<FloatValue>) -> RsiamResult<Array1<FloatValue>>,
    {
        self.run(analytic, x0, f)?.into_result()
    }
}

/// Check several pairs of one engine, each with its own tolerance
///
/// Fails on the first pair with a mismatch. The pair name in the error is
/// `"{output:?} / {input:?}"`.
pub fn check_engine<E: Engine>(
    engine: &E,
    inputs: &E::Inputs,
    pairs: &[(OutputOf<E>, InputOf<E>, Tolerance)],
    finite_difference: FiniteDifference,
) -> RsiamResult<Vec<JacobianReport>> {
    let mut reports = Vec::with_capacity(pairs.len());
    for (output, input, tolerance) in pairs {
        let report = JacobianCheck::new(&format!("{:?} / {:?}", output, input))
            .with_tolerance(*tolerance)
            .with_finite_difference(finite_difference)
            .run_engine(engine, inputs, *output, *input)?;
        if !report.is_ok() {
            report.clone().into_result()?;
        }
        reports.push(report);
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn cumsum(x: &Array1<f64>) -> RsiamResult<Array1<f64>> {
        let mut acc = 0.0;
        Ok(x.mapv(|v| {
            acc += v;
            acc
        }))
    }

    #[test]
    fn invalid_step() {
        assert!(FiniteDifference::new(0.0, DifferenceScheme::Central).is_err());
        assert!(FiniteDifference::new(f64::NAN, DifferenceScheme::Central).is_err());
        assert!(FiniteDifference::new(-1e-6, DifferenceScheme::Forward).is_err());
    }

    #[test]
    fn numeric_cumsum_is_lower_ones() {
        let x0 = array![1.0, -2.0, 3.0];
        let jac = numeric_jacobian(&x0, &FiniteDifference::default(), cumsum).unwrap();
        let expected = crate::jacobian::cumulative(3);
        let report = compare("cumsum", &expected, &jac, &Tolerance::default()).unwrap();
        assert!(report.is_ok(), "{}", report);
    }

    #[test]
    fn mismatch_reports_location_and_values() {
        let x0 = array![1.0, 2.0];
        let mut wrong = crate::jacobian::cumulative(2);
        wrong[[1, 0]] = 0.5;
        let report = JacobianCheck::new("cumsum").run(&wrong, &x0, cumsum).unwrap();
        assert_eq!(report.mismatches.len(), 1);
        let m = report.mismatches[0];
        assert_eq!((m.row, m.col), (1, 0));
        assert_eq!(m.analytic, 0.5);
        assert!((m.numeric - 1.0).abs() < 1e-8);
        assert!(format!("{}", report).contains("row 1, col 0"));

        match report.into_result() {
            Err(RsiamError::JacobianMismatch { row, col, count, .. }) => {
                assert_eq!((row, col, count), (1, 0, 1));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn one_sided_schemes_straddle_a_kink() {
        // |x| has a kink at 0; each side sees its own slope
        let x0 = array![0.0];
        let abs = |x: &Array1<f64>| -> RsiamResult<Array1<f64>> { Ok(x.mapv(f64::abs)) };
        let forward = FiniteDifference::new(1e-6, DifferenceScheme::Forward).unwrap();
        let backward = FiniteDifference::new(1e-6, DifferenceScheme::Backward).unwrap();
        let right = numeric_jacobian(&x0, &forward, abs).unwrap();
        let left = numeric_jacobian(&x0, &backward, abs).unwrap();
        assert!((right[[0, 0]] - 1.0).abs() < 1e-9);
        assert!((left[[0, 0]] + 1.0).abs() < 1e-9);
    }

    #[test]
    fn scalar_objective_row() {
        let x0 = array![1.0, 2.0, 3.0, 4.0];
        let mean =
            |x: &Array1<f64>| -> RsiamResult<Array1<f64>> { Ok(array![x.mean().unwrap_or(0.0)]) };
        JacobianCheck::new("mean")
            .assert(&crate::jacobian::mean_row(4), &x0, mean)
            .unwrap();
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let a = Array2::zeros((2, 2));
        let b = Array2::zeros((1, 2));
        assert!(compare("x", &a, &b, &Tolerance::default()).is_err());
    }
}
