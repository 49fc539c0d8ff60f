//! Traits shared by every simulation engine.
//!
//! An [`Engine`] turns a set of coupling inputs into a run. The run owns the
//! published tables together with whatever forward state its derivatives need,
//! so Jacobians can be requested any number of times, from any thread, once
//! `compute` has returned.

use crate::errors::RsiamResult;
use crate::jacobian::Jacobian;
use crate::years::FloatValue;
use ndarray::Array1;
use std::fmt::Debug;

/// Coupling inputs addressable one series at a time
pub trait CouplingInputs: Clone {
    type Key: Copy + Debug;

    /// Current values of the series named by `key`
    fn series(&self, key: Self::Key) -> RsiamResult<Array1<FloatValue>>;

    /// Copy of the inputs with the series named by `key` replaced
    fn replacing(&self, key: Self::Key, values: Array1<FloatValue>) -> RsiamResult<Self>;
}

/// Results of a forward pass that can be differentiated
pub trait Differentiable: Send + Sync {
    type Output: Copy + Debug;
    type Input: Copy + Debug;

    /// Published values of `output`, one per year (or a single value for objectives)
    fn series(&self, output: Self::Output) -> RsiamResult<Array1<FloatValue>>;

    /// $\partial$ `output` / $\partial$ `input`
    fn jacobian(&self, output: Self::Output, input: Self::Input) -> RsiamResult<Jacobian>;
}

pub trait Engine {
    type Inputs: CouplingInputs;
    type Run: Differentiable<Input = <Self::Inputs as CouplingInputs>::Key>;

    /// Run the forward recurrence
    ///
    /// Must be deterministic: the same inputs give bit-identical runs.
    fn compute(&self, inputs: &Self::Inputs) -> RsiamResult<Self::Run>;
}

pub type OutputOf<E> = <<E as Engine>::Run as Differentiable>::Output;
pub type InputOf<E> = <<E as Engine>::Inputs as CouplingInputs>::Key;
