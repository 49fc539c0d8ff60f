//! GHG cycle parameters
//!
//! CO2 follows a five-box impulse response: a fraction of each year's
//! emissions enters every box and each box retains a fixed share of its
//! content from one year to the next. CH4 and N2O are single boxes with a
//! first-order decay.
//!
//! The default CO2 split and retention factors are those of the FUND model.

use rsiam_core::config::{ensure, ensure_positive, ensure_rate, Validate};
use rsiam_core::errors::RsiamResult;
use rsiam_core::identifiers::PerGas;
use rsiam_core::years::FloatValue;
use serde::{Deserialize, Serialize};

pub const NB_CO2_BOXES: usize = 5;

/// A well-mixed gas with a single first-order sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayingGas {
    /// unit: ppb / Mt
    pub emis_to_conc: FloatValue,
    /// Fraction of the anomaly removed every year
    pub decay_rate: FloatValue,
    /// unit: ppb
    pub pre_indus_conc: FloatValue,
    /// Concentration in the first year
    /// unit: ppb
    pub init_conc: FloatValue,
}

/// Parameters for the GHG cycle
///
/// # Concentrations
///
/// $$ b_k(t) = b_k(t-1) r_k^{\Delta t} + f_k c E(t) \Delta t $$
///
/// $$ [CO_2](t) = [CO_2]_{pi} + \sum_k b_k(t) $$
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GhgCycleParameters {
    /// Share of CO2 emissions entering each box
    /// default: [0.13, 0.20, 0.32, 0.25, 0.10]
    pub co2_emissions_fractions: [FloatValue; NB_CO2_BOXES],
    /// Yearly retention factor of each box
    /// default: [1.0, 0.99725, 0.98658, 0.94287, 0.60653]
    pub co2_boxes_decays: [FloatValue; NB_CO2_BOXES],
    /// Content of each box in the first year, above pre-industrial
    /// unit: ppm
    /// default: [126.1168, 2.3537, 2.834, 1.021, 0.0746]
    pub co2_boxes_init_conc: [FloatValue; NB_CO2_BOXES],
    /// unit: ppm
    /// default: 280.0
    pub co2_pre_indus_conc: FloatValue,
    /// unit: ppm / Gt
    /// default: 0.1282
    pub co2_emis_to_conc: FloatValue,
    pub ch4: DecayingGas,
    pub n2o: DecayingGas,
    /// unit: ppm
    /// default: 450.0
    pub rockstrom_limit: FloatValue,
    /// unit: ppm
    /// default: 490.0
    pub rockstrom_constraint_ref: FloatValue,
    /// unit: ppm
    /// default: 250.0
    pub minimum_ppm_limit: FloatValue,
    /// unit: ppm
    /// default: 10.0
    pub minimum_ppm_constraint_ref: FloatValue,
    /// unit: kgCO2eq / kg
    pub gwp_20: PerGas<FloatValue>,
    /// unit: kgCO2eq / kg
    pub gwp_100: PerGas<FloatValue>,
}

impl Default for GhgCycleParameters {
    fn default() -> Self {
        Self {
            co2_emissions_fractions: [0.13, 0.20, 0.32, 0.25, 0.10],
            co2_boxes_decays: [
                1.0,
                0.9972489701005488,
                0.9865773841008381,
                0.942873143854875,
                0.6065306597126334,
            ],
            co2_boxes_init_conc: [126.1168, 2.3537, 2.834, 1.021, 0.0746],
            co2_pre_indus_conc: 280.0,
            co2_emis_to_conc: 0.1282,
            ch4: DecayingGas {
                emis_to_conc: 0.3597,
                decay_rate: 1.0 / 12.0,
                pre_indus_conc: 790.0,
                init_conc: 1222.0,
            },
            n2o: DecayingGas {
                emis_to_conc: 0.2079,
                decay_rate: 1.0 / 114.0,
                pre_indus_conc: 285.0,
                init_conc: 296.0,
            },
            rockstrom_limit: 450.0,
            rockstrom_constraint_ref: 490.0,
            minimum_ppm_limit: 250.0,
            minimum_ppm_constraint_ref: 10.0,
            gwp_20: PerGas::<FloatValue>::gwp_20(),
            gwp_100: PerGas::<FloatValue>::gwp_100(),
        }
    }
}

impl Validate for GhgCycleParameters {
    fn validate(&self) -> RsiamResult<()> {
        for decay in self.co2_boxes_decays {
            ensure_rate(decay, "co2_boxes_decays")?;
        }
        let total: FloatValue = self.co2_emissions_fractions.iter().sum();
        ensure(
            self.co2_emissions_fractions.iter().all(|f| *f >= 0.0) && (total - 1.0).abs() < 1e-9,
            "co2_emissions_fractions",
            "must be non-negative and sum to 1",
        )?;
        ensure(
            self.co2_boxes_init_conc.iter().all(|c| c.is_finite()),
            "co2_boxes_init_conc",
            "must be finite",
        )?;
        ensure_positive(self.co2_emis_to_conc, "co2_emis_to_conc")?;
        for (name, gas) in [("ch4", &self.ch4), ("n2o", &self.n2o)] {
            ensure_rate(gas.decay_rate, &format!("{}.decay_rate", name))?;
            ensure_positive(gas.emis_to_conc, &format!("{}.emis_to_conc", name))?;
            ensure(
                gas.pre_indus_conc.is_finite() && gas.init_conc.is_finite(),
                name,
                "concentrations must be finite",
            )?;
        }
        ensure_positive(self.rockstrom_constraint_ref, "rockstrom_constraint_ref")?;
        ensure_positive(self.minimum_ppm_constraint_ref, "minimum_ppm_constraint_ref")
    }
}
