//! Analytic-gradient climate/economy simulation engines
//!
//! `rsiam` bundles the shared machinery of [`rsiam_core`] with the engines of
//! [`rsiam_components`]. An external driver configures engines from TOML,
//! wires them through a [`core::coupling::CouplingGraph`] and requests
//! Jacobians from each run.

pub use rsiam_components as components;
pub use rsiam_core as core;

pub mod prelude {
    pub use rsiam_components::components::{
        CarbonCycle, EconomicSector, EmissionsAggregation, EnergyRedistribution, Forest, GhgCycle,
        Policy,
    };
    pub use rsiam_core::coupling::{CouplingGraph, CouplingGraphBuilder};
    pub use rsiam_core::discipline::Discipline;
    pub use rsiam_core::engine::{CouplingInputs, Differentiable, Engine};
    pub use rsiam_core::errors::{RsiamError, RsiamResult};
    pub use rsiam_core::jacobian::Jacobian;
    pub use rsiam_core::table::YearTable;
    pub use rsiam_core::years::YearRange;
}
