//! Loading and validating engine parameters.

use crate::errors::{RsiamError, RsiamResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Parameter sets check their own invariants before an engine accepts them
pub trait Validate {
    fn validate(&self) -> RsiamResult<()>;
}

/// Deserialize a parameter set from TOML and validate it
///
/// A missing required key or a malformed value is a [`RsiamError::Configuration`] error.
pub fn from_toml_str<T>(source: &str) -> RsiamResult<T>
where
    T: DeserializeOwned + Validate,
{
    let parameters: T =
        toml::from_str(source).map_err(|e| RsiamError::Configuration(e.to_string()))?;
    parameters.validate()?;
    Ok(parameters)
}

pub fn to_toml_string<T: Serialize>(parameters: &T) -> RsiamResult<String> {
    toml::to_string(parameters).map_err(|e| RsiamError::Configuration(e.to_string()))
}

/// Fail with [`RsiamError::InvalidParameter`] unless `condition` holds
pub fn ensure(condition: bool, name: &str, reason: &str) -> RsiamResult<()> {
    if condition {
        Ok(())
    } else {
        Err(RsiamError::InvalidParameter {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    }
}

/// `value` must be finite and strictly positive
pub fn ensure_positive(value: f64, name: &str) -> RsiamResult<()> {
    ensure(value.is_finite() && value > 0.0, name, "must be finite and > 0")
}

/// `value` must lie in the closed interval `[min, max]`
pub fn ensure_within(value: f64, min: f64, max: f64, name: &str) -> RsiamResult<()> {
    ensure(
        value.is_finite() && value >= min && value <= max,
        name,
        &format!("must lie in [{}, {}]", min, max),
    )
}

/// A decay or retention factor must lie in (0, 1]
pub fn ensure_rate(value: f64, name: &str) -> RsiamResult<()> {
    ensure(value > 0.0 && value <= 1.0, name, "must lie in (0, 1]")
}
