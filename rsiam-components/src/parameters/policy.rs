use rsiam_core::config::{ensure, ensure_positive, Validate};
use rsiam_core::errors::RsiamResult;
use rsiam_core::smooth::DEFAULT_ALPHA;
use rsiam_core::years::FloatValue;
use serde::{Deserialize, Serialize};

/// Weights of the candidate price signals of the CO2 tax
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyParameters {
    /// Share of the CCS price usable as a tax
    /// unit: %
    /// default: 100.0
    pub ccs_price_percentage: FloatValue,
    /// Share of the CO2 damage price usable as a tax
    /// unit: %
    /// default: 100.0
    pub co2_damage_price_percentage: FloatValue,
    /// Strength of the smooth maximum, larger is closer to `max`
    /// default: 3.0
    pub smooth_max_alpha: FloatValue,
}

impl Default for PolicyParameters {
    fn default() -> Self {
        Self {
            ccs_price_percentage: 100.0,
            co2_damage_price_percentage: 100.0,
            smooth_max_alpha: DEFAULT_ALPHA,
        }
    }
}

impl PolicyParameters {
    pub fn ccs_weight(&self) -> FloatValue {
        self.ccs_price_percentage / 100.0
    }

    pub fn co2_damage_weight(&self) -> FloatValue {
        self.co2_damage_price_percentage / 100.0
    }
}

impl Validate for PolicyParameters {
    fn validate(&self) -> RsiamResult<()> {
        for (value, name) in [
            (self.ccs_price_percentage, "ccs_price_percentage"),
            (self.co2_damage_price_percentage, "co2_damage_price_percentage"),
        ] {
            ensure(
                value.is_finite() && value >= 0.0,
                name,
                "must be a non-negative percentage",
            )?;
        }
        ensure_positive(self.smooth_max_alpha, "smooth_max_alpha")
    }
}
