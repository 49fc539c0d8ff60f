use rsiam_core::config::{ensure, ensure_positive, ensure_within, Validate};
use rsiam_core::errors::RsiamResult;
use rsiam_core::years::FloatValue;
use serde::{Deserialize, Serialize};

/// Parameters of the three-reservoir carbon cycle
///
/// Reservoir contents are in GtC.
///
/// The transfer matrix between atmosphere (AT), upper strata (UP) and lower
/// strata (LO) is built from `b_twelve`, `b_twentythree` and the equilibrium
/// contents so that the equilibrium is preserved:
///
/// $$ b_{21} = b_{12} \frac{C_{AT}}{C_{UP}}, \quad b_{32} = b_{23} \frac{C_{UP}}{C_{LO}} $$
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarbonCycleParameters {
    /// Equilibrium content of the lower strata
    /// default: 1720.0
    pub conc_lower_strata: FloatValue,
    /// Equilibrium content of the upper strata
    /// default: 360.0
    pub conc_upper_strata: FloatValue,
    /// Equilibrium content of the atmosphere
    /// default: 588.0
    pub conc_atmo: FloatValue,
    /// default: 878.412
    pub init_conc_atmo: FloatValue,
    /// default: 460.0
    pub init_upper_strata: FloatValue,
    /// default: 1740.0
    pub init_lower_strata: FloatValue,
    /// Yearly share of atmospheric carbon moving to the upper strata
    /// default: 0.12
    pub b_twelve: FloatValue,
    /// Yearly share of upper strata carbon moving to the lower strata
    /// default: 0.007
    pub b_twentythree: FloatValue,
    /// Lower bound of the atmosphere
    /// default: 10.0
    pub lo_mat: FloatValue,
    /// Lower bound of the upper strata
    /// default: 100.0
    pub lo_mu: FloatValue,
    /// Lower bound of the lower strata
    /// default: 1000.0
    pub lo_ml: FloatValue,
    /// unit: ppm
    /// default: 280.0
    pub ppm_ref: FloatValue,
    /// unit: ppm
    /// default: 450.0
    pub rockstrom_limit: FloatValue,
    /// unit: ppm
    /// default: 490.0
    pub rockstrom_constraint_ref: FloatValue,
    /// Weight of climate against welfare in the objective
    /// default: 0.5
    pub alpha: FloatValue,
    /// Weight of temperature against concentration within the climate part
    /// default: 0.5
    pub beta: FloatValue,
    /// unit: ppm
    /// default: 250.0
    pub minimum_ppm_limit: FloatValue,
    /// unit: ppm
    /// default: 10.0
    pub minimum_ppm_constraint_ref: FloatValue,
}

impl Default for CarbonCycleParameters {
    fn default() -> Self {
        Self {
            conc_lower_strata: 1720.0,
            conc_upper_strata: 360.0,
            conc_atmo: 588.0,
            init_conc_atmo: 878.412,
            init_upper_strata: 460.0,
            init_lower_strata: 1740.0,
            b_twelve: 0.12,
            b_twentythree: 0.007,
            lo_mat: 10.0,
            lo_mu: 100.0,
            lo_ml: 1000.0,
            ppm_ref: 280.0,
            rockstrom_limit: 450.0,
            rockstrom_constraint_ref: 490.0,
            alpha: 0.5,
            beta: 0.5,
            minimum_ppm_limit: 250.0,
            minimum_ppm_constraint_ref: 10.0,
        }
    }
}

/// Yearly transfer coefficients, `b_ij` moves carbon from reservoir `i` to `j`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferCoefficients {
    pub b11: FloatValue,
    pub b12: FloatValue,
    pub b21: FloatValue,
    pub b22: FloatValue,
    pub b23: FloatValue,
    pub b32: FloatValue,
    pub b33: FloatValue,
}

impl CarbonCycleParameters {
    pub fn transfer_coefficients(&self) -> TransferCoefficients {
        let b12 = self.b_twelve;
        let b23 = self.b_twentythree;
        let b21 = b12 * self.conc_atmo / self.conc_upper_strata;
        let b32 = b23 * self.conc_upper_strata / self.conc_lower_strata;
        TransferCoefficients {
            b11: 1.0 - b12,
            b12,
            b21,
            b22: 1.0 - b21 - b23,
            b23,
            b32,
            b33: 1.0 - b32,
        }
    }
}

impl Validate for CarbonCycleParameters {
    fn validate(&self) -> RsiamResult<()> {
        ensure_positive(self.conc_lower_strata, "conc_lower_strata")?;
        ensure_positive(self.conc_upper_strata, "conc_upper_strata")?;
        ensure_positive(self.conc_atmo, "conc_atmo")?;
        ensure_within(self.b_twelve, 0.0, 1.0, "b_twelve")?;
        ensure_within(self.b_twentythree, 0.0, 1.0, "b_twentythree")?;
        let b = self.transfer_coefficients();
        ensure(
            b.b22 >= 0.0 && b.b33 >= 0.0,
            "b_twelve",
            "transfers out of the upper strata exceed its content",
        )?;
        for (value, name) in [
            (self.init_conc_atmo, "init_conc_atmo"),
            (self.init_upper_strata, "init_upper_strata"),
            (self.init_lower_strata, "init_lower_strata"),
            (self.lo_mat, "lo_mat"),
            (self.lo_mu, "lo_mu"),
            (self.lo_ml, "lo_ml"),
        ] {
            ensure(value.is_finite(), name, "must be finite")?;
        }
        ensure_positive(self.ppm_ref, "ppm_ref")?;
        ensure_within(self.alpha, 0.0, 1.0, "alpha")?;
        ensure_within(self.beta, 0.0, 1.0, "beta")?;
        ensure_positive(self.rockstrom_constraint_ref, "rockstrom_constraint_ref")?;
        ensure_positive(self.minimum_ppm_constraint_ref, "minimum_ppm_constraint_ref")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;
    use rsiam_core::config::from_toml_str;

    #[test]
    fn transfers_conserve_carbon() {
        let b = CarbonCycleParameters::default().transfer_coefficients();
        // Each column of the transfer matrix sums to one
        assert!(is_close!(b.b11 + b.b12, 1.0));
        assert!(is_close!(b.b21 + b.b22 + b.b23, 1.0));
        assert!(is_close!(b.b32 + b.b33, 1.0));
        assert!(is_close!(b.b21, 0.196));
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let p: CarbonCycleParameters = from_toml_str("").unwrap();
        assert_eq!(p, CarbonCycleParameters::default());
    }

    #[test]
    fn alpha_out_of_range() {
        assert!(from_toml_str::<CarbonCycleParameters>("alpha = 1.5").is_err());
    }
}
