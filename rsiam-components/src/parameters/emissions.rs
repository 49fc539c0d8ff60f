use rsiam_core::config::{ensure, ensure_positive, Validate};
use rsiam_core::errors::RsiamResult;
use rsiam_core::identifiers::{Gas, GwpHorizon, PerGas, Sector};
use rsiam_core::years::FloatValue;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionsParameters {
    /// Mean CO2 emissions of the energy sector over the industrial era
    /// unit: GtCO2 / yr
    /// default: 6.49
    #[serde(default = "default_co2_emissions_ref")]
    pub co2_emissions_ref: FloatValue,
    /// Use the affine CO2 objective instead of the regularised absolute value
    /// default: false
    #[serde(default)]
    pub affine_co2_objective: bool,
    /// Regularisation of the CO2 objective around net zero
    /// unit: GtCO2 / yr
    /// default: 1e-5
    #[serde(default = "default_epsilon")]
    pub epsilon: FloatValue,
    /// 20-year global warming potentials
    /// unit: tCO2eq / t
    #[serde(default = "default_gwp_20")]
    pub gwp_20: PerGas<FloatValue>,
    /// 100-year global warming potentials
    /// unit: tCO2eq / t
    #[serde(default = "default_gwp_100")]
    pub gwp_100: PerGas<FloatValue>,
    /// Sectors whose section emissions are aggregated
    /// default: Agriculture, Industry, Services
    #[serde(default = "default_sectors")]
    pub sectors: Vec<Sector>,
}

fn default_co2_emissions_ref() -> FloatValue {
    6.49
}
fn default_epsilon() -> FloatValue {
    1e-5
}
fn default_gwp_20() -> PerGas<FloatValue> {
    PerGas::<FloatValue>::gwp_20()
}
fn default_gwp_100() -> PerGas<FloatValue> {
    PerGas::<FloatValue>::gwp_100()
}
fn default_sectors() -> Vec<Sector> {
    Sector::ALL.to_vec()
}

impl Default for EmissionsParameters {
    fn default() -> Self {
        Self {
            co2_emissions_ref: default_co2_emissions_ref(),
            affine_co2_objective: false,
            epsilon: default_epsilon(),
            gwp_20: default_gwp_20(),
            gwp_100: default_gwp_100(),
            sectors: default_sectors(),
        }
    }
}

impl EmissionsParameters {
    pub fn gwp(&self, gas: Gas, horizon: GwpHorizon) -> FloatValue {
        match horizon {
            GwpHorizon::Twenty => *self.gwp_20.get(gas),
            GwpHorizon::Hundred => *self.gwp_100.get(gas),
        }
    }
}

impl Validate for EmissionsParameters {
    fn validate(&self) -> RsiamResult<()> {
        ensure_positive(self.co2_emissions_ref, "co2_emissions_ref")?;
        ensure_positive(self.epsilon, "epsilon")?;
        ensure(
            self.gwp_20
                .iter()
                .chain(self.gwp_100.iter())
                .all(|(_, v)| v.is_finite()),
            "gwp",
            "global warming potentials must be finite",
        )?;
        let mut sorted = self.sectors.clone();
        sorted.sort();
        sorted.dedup();
        ensure(
            sorted.len() == self.sectors.len(),
            "sectors",
            "must not repeat a sector",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsiam_core::config::from_toml_str;
    use rsiam_core::errors::RsiamError;

    #[test]
    fn gwp_from_toml() {
        let p: EmissionsParameters = from_toml_str(
            r#"
            affine_co2_objective = true

            [gwp_100]
            CO2 = 1.0
            CH4 = 30.0
            N2O = 273.0
            "#,
        )
        .unwrap();
        assert!(p.affine_co2_objective);
        assert_eq!(p.gwp(Gas::CH4, GwpHorizon::Hundred), 30.0);
        assert_eq!(p.gwp(Gas::CH4, GwpHorizon::Twenty), 85.0);
        assert_eq!(p.co2_emissions_ref, 6.49);
    }

    #[test]
    fn reference_must_be_positive() {
        let p = EmissionsParameters {
            co2_emissions_ref: 0.0,
            ..Default::default()
        };
        assert!(p.validate().is_err());
    }

    #[test]
    fn smoothing_must_be_positive() {
        let p = EmissionsParameters {
            epsilon: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            p.validate(),
            Err(RsiamError::InvalidParameter { name, .. }) if name == "epsilon"
        ));
        assert!(from_toml_str::<EmissionsParameters>("epsilon = 0.0").is_err());
    }
}
