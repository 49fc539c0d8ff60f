//! Atmospheric concentrations of CO2, CH4 and N2O.
//!
//! Each concentration is a first-order linear recurrence over the year range,
//! seeded from the parameters in the first year. Emissions of year `t` enter
//! the concentration of year `t`.

use crate::parameters::ghg_cycle::{DecayingGas, GhgCycleParameters, NB_CO2_BOXES};
use ndarray::{Array1, Axis};
use rsiam_core::columns::{total_emissions, TABLE_GHG_EMISSIONS};
use rsiam_core::config::Validate;
use rsiam_core::discipline::{Discipline, RequirementType, TableDefinition};
use rsiam_core::engine::{CouplingInputs, Differentiable, Engine};
use rsiam_core::errors::{RsiamError, RsiamResult};
use rsiam_core::identifiers::{Gas, GwpHorizon, PerGas};
use rsiam_core::jacobian::{self, Jacobian};
use rsiam_core::range_check::{check_finite, check_ranges, ColumnBounds, RangeCheck};
use rsiam_core::table::YearTable;
use rsiam_core::years::{FloatValue, YearRange};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const TABLE_GHG_CYCLE: &str = "ghg_cycle_df";
pub const TABLE_CO2_BOXES: &str = "co2_boxes_df";
pub const TABLE_EXTRA_CO2_EQ: &str = "extra_co2_eq_since_pre_industrial_df";
pub const GWP20_OBJECTIVE: &str = "gwp20_objective";
pub const GWP100_OBJECTIVE: &str = "gwp100_objective";
pub const ROCKSTROM_LIMIT_CONSTRAINT: &str = "rockstrom_limit_constraint";
pub const MINIMUM_PPM_CONSTRAINT: &str = "minimum_ppm_constraint";

/// Column of [`TABLE_GHG_CYCLE`] holding the concentration of `gas`
pub fn concentration_column(gas: Gas) -> &'static str {
    match gas {
        Gas::CO2 => "co2_ppm",
        Gas::CH4 => "ch4_ppb",
        Gas::N2O => "n2o_ppb",
    }
}

pub fn box_column(index: usize) -> String {
    format!("box_{}", index + 1)
}

pub fn extra_co2_eq_column(horizon: GwpHorizon) -> String {
    format!("extra_co2_eq_{}", horizon.suffix())
}

/// Atmospheric mass of one unit of concentration
///
/// unit: Gt / ppm for CO2, Gt / ppb for CH4 and N2O
pub fn mass_per_concentration(gas: Gas) -> FloatValue {
    match gas {
        Gas::CO2 => 7.8,
        Gas::CH4 => 2.84e-3,
        Gas::N2O => 7.8e-3,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GhgCycleInput {
    TotalEmissions(Gas),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GhgCycleOutput {
    Concentration(Gas),
    /// Zero-based index of a CO2 box
    Co2Box(usize),
    ExtraCo2Eq(GwpHorizon),
    GwpObjective(GwpHorizon),
    RockstromConstraint,
    MinimumPpmConstraint,
}

#[derive(Debug, Clone)]
pub struct GhgCycleInputs {
    /// `GHG_emissions_df`, one `Total {gas} emissions` column per gas
    /// unit: Gt / yr
    pub emissions: YearTable,
}

impl CouplingInputs for GhgCycleInputs {
    type Key = GhgCycleInput;

    fn series(&self, key: GhgCycleInput) -> RsiamResult<Array1<FloatValue>> {
        let GhgCycleInput::TotalEmissions(gas) = key;
        Ok(self.emissions.column(&total_emissions(gas))?.clone())
    }

    fn replacing(&self, key: GhgCycleInput, values: Array1<FloatValue>) -> RsiamResult<Self> {
        let GhgCycleInput::TotalEmissions(gas) = key;
        Ok(Self {
            emissions: self.emissions.replacing(&total_emissions(gas), values)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GhgCycle {
    years: YearRange,
    parameters: GhgCycleParameters,
    #[serde(default)]
    range_check: RangeCheck,
}

/// A single box recurrence `x(t) = retention * x(t-1) + injection * E(t)`
#[derive(Debug, Clone, Copy)]
struct BoxDynamics {
    seed: FloatValue,
    retention: FloatValue,
    injection: FloatValue,
}

impl BoxDynamics {
    fn run(&self, emissions: &Array1<FloatValue>) -> Array1<FloatValue> {
        let mut values = Array1::zeros(emissions.len());
        let mut previous = self.seed;
        for (i, value) in values.iter_mut().enumerate() {
            *value = if i == 0 {
                self.seed
            } else {
                previous * self.retention + self.injection * emissions[i]
            };
            previous = *value;
        }
        values
    }

    fn jacobian(&self, n: usize) -> Jacobian {
        let retention = Array1::from_elem(n, self.retention);
        let mut injection = Array1::from_elem(n, self.injection);
        if n > 0 {
            injection[0] = 0.0;
        }
        jacobian::linear_recurrence(retention.view(), injection.view())
    }
}

impl GhgCycle {
    pub fn configure(years: YearRange, parameters: GhgCycleParameters) -> RsiamResult<Self> {
        parameters.validate()?;
        Ok(Self {
            years,
            parameters,
            range_check: RangeCheck::default(),
        })
    }

    pub fn with_range_check(mut self, range_check: RangeCheck) -> Self {
        self.range_check = range_check;
        self
    }

    fn co2_boxes(&self) -> [BoxDynamics; NB_CO2_BOXES] {
        let p = &self.parameters;
        let dt = self.years.dt();
        std::array::from_fn(|k| BoxDynamics {
            seed: p.co2_boxes_init_conc[k],
            retention: p.co2_boxes_decays[k].powf(dt),
            injection: p.co2_emissions_fractions[k] * p.co2_emis_to_conc * dt,
        })
    }

    fn decaying_gas(&self, gas: &DecayingGas) -> BoxDynamics {
        let dt = self.years.dt();
        BoxDynamics {
            seed: gas.init_conc - gas.pre_indus_conc,
            retention: (1.0 - gas.decay_rate).powf(dt),
            // Emissions are in Gt, the conversion factor is per Mt
            injection: gas.emis_to_conc * 1000.0 * dt,
        }
    }

    fn pre_indus_conc(&self, gas: Gas) -> FloatValue {
        match gas {
            Gas::CO2 => self.parameters.co2_pre_indus_conc,
            Gas::CH4 => self.parameters.ch4.pre_indus_conc,
            Gas::N2O => self.parameters.n2o.pre_indus_conc,
        }
    }

    fn gwp(&self, gas: Gas, horizon: GwpHorizon) -> FloatValue {
        match horizon {
            GwpHorizon::Twenty => *self.parameters.gwp_20.get(gas),
            GwpHorizon::Hundred => *self.parameters.gwp_100.get(gas),
        }
    }
}

impl Engine for GhgCycle {
    type Inputs = GhgCycleInputs;
    type Run = GhgCycleRun;

    fn compute(&self, inputs: &GhgCycleInputs) -> RsiamResult<GhgCycleRun> {
        debug!(nb_years = self.years.len(), "computing GHG cycle");
        inputs.emissions.validate_against(&self.years)?;
        if self.range_check == RangeCheck::Enabled {
            check_finite(&inputs.emissions)?;
        }
        let p = &self.parameters;
        let emissions = PerGas::try_from_fn(|gas| {
            inputs
                .emissions
                .column(&total_emissions(gas))
                .map(|c| c.clone())
        })?;

        let co2_dynamics = self.co2_boxes();
        let mut boxes = YearTable::new(TABLE_CO2_BOXES, &self.years);
        let mut co2_ppm = Array1::from_elem(self.years.len(), p.co2_pre_indus_conc);
        for (k, dynamics) in co2_dynamics.iter().enumerate() {
            let values = dynamics.run(&emissions.co2);
            co2_ppm += &values;
            boxes.insert(&box_column(k), values)?;
        }

        let ch4_dynamics = self.decaying_gas(&p.ch4);
        let n2o_dynamics = self.decaying_gas(&p.n2o);
        let ch4_ppb = ch4_dynamics.run(&emissions.ch4) + p.ch4.pre_indus_conc;
        let n2o_ppb = n2o_dynamics.run(&emissions.n2o) + p.n2o.pre_indus_conc;
        let concentrations = PerGas::new(co2_ppm, ch4_ppb, n2o_ppb);

        let mut cycle = YearTable::new(TABLE_GHG_CYCLE, &self.years);
        for gas in Gas::ALL {
            cycle.insert(concentration_column(gas), concentrations.get(gas).clone())?;
        }
        if self.range_check == RangeCheck::Enabled {
            check_ranges(
                &cycle,
                &[
                    ColumnBounds::new(concentration_column(Gas::CO2), 0.0, 5000.0),
                    ColumnBounds::new(concentration_column(Gas::CH4), 0.0, 10000.0),
                    ColumnBounds::new(concentration_column(Gas::N2O), 0.0, 5000.0),
                ],
            )?;
        }

        let mut extra_co2_eq = YearTable::new(TABLE_EXTRA_CO2_EQ, &self.years);
        let mut objectives = Vec::with_capacity(2);
        for horizon in [GwpHorizon::Twenty, GwpHorizon::Hundred] {
            let mut extra = Array1::zeros(self.years.len());
            for gas in Gas::ALL {
                let anomaly = concentrations.get(gas) - self.pre_indus_conc(gas);
                extra = extra + anomaly * (mass_per_concentration(gas) * self.gwp(gas, horizon));
            }
            if extra[0] == 0.0 {
                return Err(RsiamError::DivisionByZero {
                    quantity: extra_co2_eq_column(horizon),
                    year: self.years.year_start(),
                });
            }
            let mean = extra.mean().unwrap_or(0.0);
            objectives.push((horizon, mean / extra[0]));
            extra_co2_eq.insert(&extra_co2_eq_column(horizon), extra)?;
        }

        let rockstrom_constraint =
            (p.rockstrom_limit - concentrations.co2.clone()) / p.rockstrom_constraint_ref;
        let minimum_ppm_constraint =
            (&concentrations.co2 - p.minimum_ppm_limit) / p.minimum_ppm_constraint_ref;

        debug!(
            final_co2_ppm = concentrations.co2[self.years.len() - 1],
            "GHG cycle computed"
        );
        Ok(GhgCycleRun {
            nb_years: self.years.len(),
            co2_dynamics,
            ch4_dynamics,
            n2o_dynamics,
            mass_gwp: PerGas::from_fn(|gas| {
                (
                    mass_per_concentration(gas) * self.gwp(gas, GwpHorizon::Twenty),
                    mass_per_concentration(gas) * self.gwp(gas, GwpHorizon::Hundred),
                )
            }),
            rockstrom_constraint_ref: p.rockstrom_constraint_ref,
            minimum_ppm_constraint_ref: p.minimum_ppm_constraint_ref,
            objectives,
            cycle,
            boxes,
            extra_co2_eq,
            rockstrom_constraint,
            minimum_ppm_constraint,
        })
    }
}

#[typetag::serde]
impl Discipline for GhgCycle {
    fn name(&self) -> String {
        "GhgCycle".to_string()
    }

    fn definitions(&self) -> Vec<TableDefinition> {
        let emission_columns = Gas::ALL.iter().map(|g| total_emissions(*g)).collect();
        vec![
            TableDefinition::with_columns(
                TABLE_GHG_EMISSIONS,
                emission_columns,
                "Gt",
                RequirementType::Input,
            ),
            TableDefinition::output(
                TABLE_GHG_CYCLE,
                &[
                    concentration_column(Gas::CO2),
                    concentration_column(Gas::CH4),
                    concentration_column(Gas::N2O),
                ],
                "ppm",
            ),
            TableDefinition::with_columns(
                TABLE_CO2_BOXES,
                (0..NB_CO2_BOXES).map(box_column).collect(),
                "ppm",
                RequirementType::Output,
            ),
            TableDefinition::with_columns(
                TABLE_EXTRA_CO2_EQ,
                vec![
                    extra_co2_eq_column(GwpHorizon::Twenty),
                    extra_co2_eq_column(GwpHorizon::Hundred),
                ],
                "GtCO2eq",
                RequirementType::Output,
            ),
            TableDefinition::output(GWP20_OBJECTIVE, &[], "-"),
            TableDefinition::output(GWP100_OBJECTIVE, &[], "-"),
            TableDefinition::output(ROCKSTROM_LIMIT_CONSTRAINT, &[], "-"),
            TableDefinition::output(MINIMUM_PPM_CONSTRAINT, &[], "-"),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct GhgCycleRun {
    nb_years: usize,
    co2_dynamics: [BoxDynamics; NB_CO2_BOXES],
    ch4_dynamics: BoxDynamics,
    n2o_dynamics: BoxDynamics,
    /// Mass per concentration times GWP, (20 years, 100 years)
    mass_gwp: PerGas<(FloatValue, FloatValue)>,
    rockstrom_constraint_ref: FloatValue,
    minimum_ppm_constraint_ref: FloatValue,
    objectives: Vec<(GwpHorizon, FloatValue)>,
    pub cycle: YearTable,
    pub boxes: YearTable,
    pub extra_co2_eq: YearTable,
    pub rockstrom_constraint: Array1<FloatValue>,
    pub minimum_ppm_constraint: Array1<FloatValue>,
}

impl GhgCycleRun {
    pub fn concentration(&self, gas: Gas) -> RsiamResult<&Array1<FloatValue>> {
        self.cycle.column(concentration_column(gas))
    }

    pub fn gwp_objective(&self, horizon: GwpHorizon) -> FloatValue {
        self.objectives
            .iter()
            .find(|(h, _)| *h == horizon)
            .map(|(_, v)| *v)
            .unwrap_or(FloatValue::NAN)
    }

    fn mass_gwp(&self, gas: Gas, horizon: GwpHorizon) -> FloatValue {
        let (twenty, hundred) = *self.mass_gwp.get(gas);
        match horizon {
            GwpHorizon::Twenty => twenty,
            GwpHorizon::Hundred => hundred,
        }
    }

    /// d concentration(gas) / d emissions(source)
    fn d_concentration(&self, gas: Gas, source: Gas) -> Jacobian {
        if gas != source {
            return jacobian::zeros(self.nb_years);
        }
        match gas {
            Gas::CO2 => self
                .co2_dynamics
                .iter()
                .fold(jacobian::zeros(self.nb_years), |acc, d| {
                    acc + d.jacobian(self.nb_years)
                }),
            Gas::CH4 => self.ch4_dynamics.jacobian(self.nb_years),
            Gas::N2O => self.n2o_dynamics.jacobian(self.nb_years),
        }
    }

    fn d_extra_co2_eq(&self, horizon: GwpHorizon, source: Gas) -> Jacobian {
        self.d_concentration(source, source) * self.mass_gwp(source, horizon)
    }
}

impl Differentiable for GhgCycleRun {
    type Output = GhgCycleOutput;
    type Input = GhgCycleInput;

    fn series(&self, output: GhgCycleOutput) -> RsiamResult<Array1<FloatValue>> {
        Ok(match output {
            GhgCycleOutput::Concentration(gas) => self.concentration(gas)?.clone(),
            GhgCycleOutput::Co2Box(k) => self.boxes.column(&box_column(k))?.clone(),
            GhgCycleOutput::ExtraCo2Eq(horizon) => {
                self.extra_co2_eq.column(&extra_co2_eq_column(horizon))?.clone()
            }
            GhgCycleOutput::GwpObjective(horizon) => {
                Array1::from_elem(1, self.gwp_objective(horizon))
            }
            GhgCycleOutput::RockstromConstraint => self.rockstrom_constraint.clone(),
            GhgCycleOutput::MinimumPpmConstraint => self.minimum_ppm_constraint.clone(),
        })
    }

    fn jacobian(&self, output: GhgCycleOutput, input: GhgCycleInput) -> RsiamResult<Jacobian> {
        let GhgCycleInput::TotalEmissions(source) = input;
        let n = self.nb_years;
        Ok(match output {
            GhgCycleOutput::Concentration(gas) => self.d_concentration(gas, source),
            GhgCycleOutput::Co2Box(k) => {
                let dynamics = self.co2_dynamics.get(k).ok_or_else(|| {
                    RsiamError::UnsupportedJacobian {
                        output: format!("{:?}", output),
                        input: format!("{:?}", input),
                    }
                })?;
                if source == Gas::CO2 {
                    dynamics.jacobian(n)
                } else {
                    jacobian::zeros(n)
                }
            }
            GhgCycleOutput::ExtraCo2Eq(horizon) => self.d_extra_co2_eq(horizon, source),
            GhgCycleOutput::GwpObjective(horizon) => {
                // objective = mean(x) / x_0
                let x = self.extra_co2_eq.column(&extra_co2_eq_column(horizon))?;
                let mean = x.mean().unwrap_or(0.0);
                let dx = self.d_extra_co2_eq(horizon, source);
                let d_mean = jacobian::mean_row(n).dot(&dx);
                let d_first = dx.row(0).insert_axis(Axis(0)).to_owned();
                d_mean / x[0] - d_first * (mean / (x[0] * x[0]))
            }
            GhgCycleOutput::RockstromConstraint => {
                self.d_concentration(Gas::CO2, source) / -self.rockstrom_constraint_ref
            }
            GhgCycleOutput::MinimumPpmConstraint => {
                self.d_concentration(Gas::CO2, source) / self.minimum_ppm_constraint_ref
            }
        })
    }
}
