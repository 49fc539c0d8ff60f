//! Economic sector parameters.
//!
//! Seeds (`capital_start`, `productivity_start`, `productivity_gr_start`) are
//! specific to each sector and have no default. The remaining coefficients
//! default to the values calibrated for the industry sector.

use rsiam_core::config::{ensure, ensure_positive, ensure_within, Validate};
use rsiam_core::errors::RsiamResult;
use rsiam_core::years::{FloatValue, Year};
use serde::{Deserialize, Serialize};

/// How investment enters the capital recurrence
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SectorMode {
    /// Investment is a coupling input supplied by the investment engine
    #[default]
    Simulation,
    /// Investment is replayed from history while the production function is fitted
    Fitting {
        /// Historical investment, one value per simulated year
        /// unit: T$
        historical_investment: Vec<FloatValue>,
        /// Target for the span of the energy efficiency logistic
        /// unit: dimensionless
        energy_eff_max_range_ref: FloatValue,
    },
}

/// First and last year of the long-term energy efficiency table published in fitting mode
pub const LONG_TERM_EFFICIENCY_YEARS: (Year, Year) = (1950, 2119);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorParameters {
    /// Total factor productivity in the first year
    /// unit: dimensionless
    pub productivity_start: FloatValue,
    /// Capital stock in the first year
    /// unit: T$
    pub capital_start: FloatValue,
    /// Productivity growth rate in the first year
    /// unit: dimensionless
    pub productivity_gr_start: FloatValue,
    /// Decline rate of the productivity growth rate
    /// unit: 1 / step
    /// default: 0.02
    #[serde(default = "default_decline_rate_tfp")]
    pub decline_rate_tfp: FloatValue,
    /// Capital depreciation per year
    /// unit: dimensionless
    /// default: 0.07
    #[serde(default = "default_depreciation_capital")]
    pub depreciation_capital: FloatValue,
    /// Share of damages hitting productivity rather than output
    /// unit: dimensionless
    /// default: 0.3
    #[serde(default = "default_frac_damage_prod")]
    pub frac_damage_prod: FloatValue,
    /// Apply damages through productivity (true) or directly to output (false)
    /// default: false
    #[serde(default)]
    pub damage_to_productivity: bool,
    /// Capital share of the production function
    /// unit: dimensionless
    /// default: 0.5
    #[serde(default = "default_output_alpha")]
    pub output_alpha: FloatValue,
    /// Substitution parameter of the production function, must be non-zero
    /// unit: dimensionless
    /// default: 0.5
    #[serde(default = "default_output_gamma")]
    pub output_gamma: FloatValue,
    /// Steepness of the energy efficiency logistic
    /// unit: 1 / yr
    /// default: 0.05
    #[serde(default = "default_energy_eff_k")]
    pub energy_eff_k: FloatValue,
    /// Floor of the energy efficiency logistic
    /// unit: dimensionless
    /// default: 0.98
    #[serde(default = "default_energy_eff_cst")]
    pub energy_eff_cst: FloatValue,
    /// Midpoint year of the energy efficiency logistic
    /// unit: yr
    /// default: 2012.0
    #[serde(default = "default_energy_eff_xzero")]
    pub energy_eff_xzero: FloatValue,
    /// Span of the energy efficiency logistic
    /// unit: dimensionless
    /// default: 3.52
    #[serde(default = "default_energy_eff_max")]
    pub energy_eff_max: FloatValue,
    /// Energy needed per unit of capital at full utilisation
    /// unit: MWh / k$
    /// default: 0.8
    #[serde(default = "default_capital_utilisation_ratio")]
    pub capital_utilisation_ratio: FloatValue,
    /// Upper bound on capital utilisation used by the energy constraint
    /// unit: dimensionless
    /// default: 0.85
    #[serde(default = "default_max_capital_utilisation_ratio")]
    pub max_capital_utilisation_ratio: FloatValue,
    /// Conversion from the energy production table to the units of e_max
    /// unit: dimensionless
    /// default: 1000.0
    #[serde(default = "default_scaling_factor_energy_production")]
    pub scaling_factor_energy_production: FloatValue,
    /// Normalisation of the e_max constraint
    /// unit: TWh
    /// default: 10.0
    #[serde(default = "default_ref_emax_enet_constraint")]
    pub ref_emax_enet_constraint: FloatValue,
    #[serde(default)]
    pub mode: SectorMode,
}

fn default_decline_rate_tfp() -> FloatValue {
    0.02
}
fn default_depreciation_capital() -> FloatValue {
    0.07
}
fn default_frac_damage_prod() -> FloatValue {
    0.3
}
fn default_output_alpha() -> FloatValue {
    0.5
}
fn default_output_gamma() -> FloatValue {
    0.5
}
fn default_energy_eff_k() -> FloatValue {
    0.05
}
fn default_energy_eff_cst() -> FloatValue {
    0.98
}
fn default_energy_eff_xzero() -> FloatValue {
    2012.0
}
fn default_energy_eff_max() -> FloatValue {
    3.52
}
fn default_capital_utilisation_ratio() -> FloatValue {
    0.8
}
fn default_max_capital_utilisation_ratio() -> FloatValue {
    0.85
}
fn default_scaling_factor_energy_production() -> FloatValue {
    1000.0
}
fn default_ref_emax_enet_constraint() -> FloatValue {
    10.0
}

impl SectorParameters {
    /// Parameters with the given seeds and every other coefficient at its default
    pub fn with_seeds(
        capital_start: FloatValue,
        productivity_start: FloatValue,
        productivity_gr_start: FloatValue,
    ) -> Self {
        Self {
            productivity_start,
            capital_start,
            productivity_gr_start,
            decline_rate_tfp: default_decline_rate_tfp(),
            depreciation_capital: default_depreciation_capital(),
            frac_damage_prod: default_frac_damage_prod(),
            damage_to_productivity: false,
            output_alpha: default_output_alpha(),
            output_gamma: default_output_gamma(),
            energy_eff_k: default_energy_eff_k(),
            energy_eff_cst: default_energy_eff_cst(),
            energy_eff_xzero: default_energy_eff_xzero(),
            energy_eff_max: default_energy_eff_max(),
            capital_utilisation_ratio: default_capital_utilisation_ratio(),
            max_capital_utilisation_ratio: default_max_capital_utilisation_ratio(),
            scaling_factor_energy_production: default_scaling_factor_energy_production(),
            ref_emax_enet_constraint: default_ref_emax_enet_constraint(),
            mode: SectorMode::Simulation,
        }
    }
}

impl Validate for SectorParameters {
    fn validate(&self) -> RsiamResult<()> {
        ensure(
            self.output_gamma.is_finite() && self.output_gamma != 0.0,
            "output_gamma",
            "must be finite and non-zero",
        )?;
        ensure_within(self.output_alpha, 0.0, 1.0, "output_alpha")?;
        ensure_within(self.depreciation_capital, 0.0, 1.0, "depreciation_capital")?;
        ensure_within(self.frac_damage_prod, 0.0, 1.0, "frac_damage_prod")?;
        ensure_positive(self.capital_start, "capital_start")?;
        ensure_positive(self.productivity_start, "productivity_start")?;
        ensure(
            self.productivity_gr_start.is_finite() && self.productivity_gr_start < 5.0,
            "productivity_gr_start",
            "must be finite and < 5",
        )?;
        ensure(
            self.decline_rate_tfp.is_finite(),
            "decline_rate_tfp",
            "must be finite",
        )?;
        ensure_positive(self.capital_utilisation_ratio, "capital_utilisation_ratio")?;
        ensure_positive(
            self.max_capital_utilisation_ratio,
            "max_capital_utilisation_ratio",
        )?;
        ensure_positive(
            self.scaling_factor_energy_production,
            "scaling_factor_energy_production",
        )?;
        ensure_positive(self.ref_emax_enet_constraint, "ref_emax_enet_constraint")?;
        ensure(
            self.energy_eff_k.is_finite()
                && self.energy_eff_xzero.is_finite()
                && self.energy_eff_max.is_finite(),
            "energy_eff",
            "logistic coefficients must be finite",
        )?;
        ensure_positive(self.energy_eff_cst, "energy_eff_cst")?;
        ensure(
            self.energy_eff_max >= 0.0,
            "energy_eff_max",
            "must be >= 0",
        )?;
        if let SectorMode::Fitting {
            historical_investment,
            energy_eff_max_range_ref,
        } = &self.mode
        {
            ensure(
                historical_investment.iter().all(|v| v.is_finite()),
                "historical_investment",
                "must be finite",
            )?;
            ensure(
                energy_eff_max_range_ref.is_finite(),
                "energy_eff_max_range_ref",
                "must be finite",
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsiam_core::config::from_toml_str;
    use rsiam_core::errors::RsiamError;

    #[test]
    fn toml_with_defaults() {
        let p: SectorParameters = from_toml_str(
            r#"
            productivity_start = 1.3
            capital_start = 100.0
            productivity_gr_start = 0.02
            depreciation_capital = 0.05
            "#,
        )
        .unwrap();
        assert_eq!(p.depreciation_capital, 0.05);
        assert_eq!(p.output_gamma, 0.5);
        assert_eq!(p.mode, SectorMode::Simulation);
    }

    #[test]
    fn missing_seed_is_a_configuration_error() {
        let err = from_toml_str::<SectorParameters>("productivity_start = 1.0").unwrap_err();
        assert!(matches!(err, RsiamError::Configuration(_)));
    }

    #[test]
    fn fitting_mode_from_toml() {
        let p: SectorParameters = from_toml_str(
            r#"
            productivity_start = 1.3
            capital_start = 100.0
            productivity_gr_start = 0.02

            [mode]
            mode = "fitting"
            historical_investment = [1.0, 2.0]
            energy_eff_max_range_ref = 5.0
            "#,
        )
        .unwrap();
        assert!(matches!(p.mode, SectorMode::Fitting { .. }));
    }

    #[test]
    fn zero_gamma_is_rejected() {
        let mut p = SectorParameters::with_seeds(100.0, 1.0, 0.02);
        p.output_gamma = 0.0;
        assert!(matches!(
            p.validate(),
            Err(RsiamError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn depreciation_bounds() {
        let mut p = SectorParameters::with_seeds(100.0, 1.0, 0.02);
        p.depreciation_capital = 1.2;
        assert!(p.validate().is_err());
    }
}
