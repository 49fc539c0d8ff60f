//! Shared machinery for analytic-gradient simulation engines.
//!
//! Engines run forward recurrences over a [`years::YearRange`], publish their
//! results as [`table::YearTable`]s and expose closed-form Jacobians of their
//! outputs with respect to their coupling inputs.

pub mod clamp;
pub mod columns;
pub mod config;
pub mod coupling;
pub mod discipline;
pub mod engine;
pub mod errors;
pub mod identifiers;
pub mod jacobian;
pub mod jacobian_check;
pub mod range_check;
pub mod smooth;
pub mod table;
pub mod years;
