//! Simulation engines of a coupled climate/economy assessment model
//!
//! Every engine runs a forward recurrence over a year range and exposes
//! closed-form Jacobians of its published series with respect to its
//! coupling inputs.
//!
//! # Module Organisation
//!
//! - `components`: the engines, their input and output tables and keys
//! - `parameters`: one parameters struct per engine, with defaults and validation

pub mod components;
pub mod parameters;
