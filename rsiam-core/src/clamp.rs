//! Hard bounds applied inside forward recurrences.
//!
//! A bound makes the forward pass piecewise. The branch taken in each year is
//! recorded as a [`ClampDecision`] so that derivatives are computed on the
//! same branch instead of re-evaluating the condition.

use crate::years::FloatValue;
use serde::{Deserialize, Serialize};

/// Whether a bound was active in a year
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ClampDecision {
    Free,
    /// Holds the value the year would have had without the bound
    Clamped { unclamped: FloatValue },
}

impl ClampDecision {
    pub fn is_clamped(&self) -> bool {
        matches!(self, ClampDecision::Clamped { .. })
    }

    /// Derivative of the clamped value with respect to the unclamped one
    pub fn slope(&self) -> FloatValue {
        match self {
            ClampDecision::Free => 1.0,
            ClampDecision::Clamped { .. } => 0.0,
        }
    }
}

/// `max(value, floor)` together with the branch taken
///
/// A value exactly on the floor is `Free`.
pub fn floor(value: FloatValue, floor: FloatValue) -> (FloatValue, ClampDecision) {
    if value < floor {
        (floor, ClampDecision::Clamped { unclamped: value })
    } else {
        (value, ClampDecision::Free)
    }
}
