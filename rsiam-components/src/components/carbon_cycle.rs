//! Three-reservoir carbon cycle.
//!
//! Carbon moves between the atmosphere, the upper strata (shallow ocean and
//! biosphere) and the lower strata (deep ocean) through a fixed transfer
//! matrix. CO2 emissions of year `t - 1` enter the atmosphere in year `t`.
//! Each reservoir has a hard lower bound.
//!
//! This engine publishes the same constraint tables as
//! [`GhgCycle`](crate::components::ghg_cycle::GhgCycle): a coupling graph holds one or the other.

use crate::components::ghg_cycle::{MINIMUM_PPM_CONSTRAINT, ROCKSTROM_LIMIT_CONSTRAINT};
use crate::parameters::carbon_cycle::{CarbonCycleParameters, TransferCoefficients};
use ndarray::Array1;
use rsiam_core::clamp::{self, ClampDecision};
use rsiam_core::columns::{COL_CO2_TOTAL_EMISSIONS, TABLE_CO2_EMISSIONS};
use rsiam_core::config::Validate;
use rsiam_core::discipline::{Discipline, TableDefinition};
use rsiam_core::engine::{CouplingInputs, Differentiable, Engine};
use rsiam_core::errors::RsiamResult;
use rsiam_core::jacobian::{self, Jacobian};
use rsiam_core::range_check::{check_finite, check_ranges, ColumnBounds, RangeCheck};
use rsiam_core::table::YearTable;
use rsiam_core::years::{FloatValue, YearRange};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const TABLE_CARBON_CYCLE: &str = "carboncycle_df";
pub const TABLE_CARBON_CYCLE_DETAIL: &str = "carboncycle_detail_df";
pub const PPM_OBJECTIVE: &str = "ppm_objective";
pub const COL_PPM: &str = "ppm";

/// GtC in the atmosphere per ppm of CO2
pub const GTC_PER_PPM: FloatValue = 2.13;
/// Mass ratio of carbon to CO2
pub const C_PER_CO2: FloatValue = 12.0 / 44.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reservoir {
    Atmosphere,
    UpperStrata,
    LowerStrata,
}

impl Reservoir {
    pub const ALL: [Reservoir; 3] = [
        Reservoir::Atmosphere,
        Reservoir::UpperStrata,
        Reservoir::LowerStrata,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            Reservoir::Atmosphere => "atmo_conc",
            Reservoir::UpperStrata => "shallow_ocean_conc",
            Reservoir::LowerStrata => "lower_ocean_conc",
        }
    }

    fn index(&self) -> usize {
        match self {
            Reservoir::Atmosphere => 0,
            Reservoir::UpperStrata => 1,
            Reservoir::LowerStrata => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CarbonCycleInput {
    TotalCo2Emissions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CarbonCycleOutput {
    Reservoir(Reservoir),
    Ppm,
    PpmObjective,
    RockstromConstraint,
    MinimumPpmConstraint,
}

#[derive(Debug, Clone)]
pub struct CarbonCycleInputs {
    /// `co2_emissions_Gt`, `total_emissions` column
    /// unit: GtCO2 / yr
    pub co2_emissions: YearTable,
}

impl CouplingInputs for CarbonCycleInputs {
    type Key = CarbonCycleInput;

    fn series(&self, _key: CarbonCycleInput) -> RsiamResult<Array1<FloatValue>> {
        Ok(self.co2_emissions.column(COL_CO2_TOTAL_EMISSIONS)?.clone())
    }

    fn replacing(&self, _key: CarbonCycleInput, values: Array1<FloatValue>) -> RsiamResult<Self> {
        Ok(Self {
            co2_emissions: self
                .co2_emissions
                .replacing(COL_CO2_TOTAL_EMISSIONS, values)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarbonCycle {
    years: YearRange,
    parameters: CarbonCycleParameters,
    #[serde(default)]
    range_check: RangeCheck,
}

impl CarbonCycle {
    pub fn configure(years: YearRange, parameters: CarbonCycleParameters) -> RsiamResult<Self> {
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
}

impl Engine for CarbonCycle {
    type Inputs = CarbonCycleInputs;
    type Run = CarbonCycleRun;

    fn compute(&self, inputs: &CarbonCycleInputs) -> RsiamResult<CarbonCycleRun> {
        debug!(nb_years = self.years.len(), "computing carbon cycle");
        let emissions = inputs
            .co2_emissions
            .aligned_column(&self.years, COL_CO2_TOTAL_EMISSIONS)?;
        if self.range_check == RangeCheck::Enabled {
            check_finite(&inputs.co2_emissions)?;
        }

        let p = &self.parameters;
        let b = p.transfer_coefficients();
        let dt = self.years.dt();
        let floors = [p.lo_mat, p.lo_mu, p.lo_ml];
        let n = self.years.len();

        let mut reservoirs = [Array1::zeros(n), Array1::zeros(n), Array1::zeros(n)];
        let mut decisions = vec![[ClampDecision::Free; 3]; n];
        let init = [p.init_conc_atmo, p.init_upper_strata, p.init_lower_strata];
        for (r, seed) in reservoirs.iter_mut().zip(init) {
            r[0] = seed;
        }
        for t in 1..n {
            let (at, up, lo) = (reservoirs[0][t - 1], reservoirs[1][t - 1], reservoirs[2][t - 1]);
            let unbounded = [
                at * b.b11 + up * b.b21 + emissions[t - 1] * dt * C_PER_CO2,
                at * b.b12 + up * b.b22 + lo * b.b32,
                lo * b.b33 + up * b.b23,
            ];
            for k in 0..3 {
                let (value, decision) = clamp::floor(unbounded[k], floors[k]);
                if decision.is_clamped() {
                    warn!(
                        year = self.years.year_at(t),
                        reservoir = Reservoir::ALL[k].column(),
                        value = unbounded[k],
                        "carbon reservoir held at its lower bound"
                    );
                }
                reservoirs[k][t] = value;
                decisions[t][k] = decision;
            }
        }

        let ppm = &reservoirs[0] / GTC_PER_PPM;
        let mut detail = YearTable::new(TABLE_CARBON_CYCLE_DETAIL, &self.years);
        for (reservoir, values) in Reservoir::ALL.iter().zip(&reservoirs) {
            detail.insert(reservoir.column(), values.clone())?;
        }
        detail.insert(COL_PPM, ppm.clone())?;
        if self.range_check == RangeCheck::Enabled {
            check_ranges(&detail, &[ColumnBounds::new(COL_PPM, 0.0, 5000.0)])?;
        }
        let carbon_cycle = YearTable::new(TABLE_CARBON_CYCLE, &self.years)
            .with_column(Reservoir::Atmosphere.column(), reservoirs[0].clone())?;

        let ppm_objective =
            p.alpha * (1.0 - p.beta) * ppm.mean().unwrap_or(0.0) / p.ppm_ref;
        let rockstrom_constraint = (p.rockstrom_limit - ppm.clone()) / p.rockstrom_constraint_ref;
        let minimum_ppm_constraint = (&ppm - p.minimum_ppm_limit) / p.minimum_ppm_constraint_ref;

        debug!(ppm_objective, "carbon cycle computed");
        Ok(CarbonCycleRun {
            coefficients: b,
            emission_weight: dt * C_PER_CO2,
            objective_weight: p.alpha * (1.0 - p.beta) / p.ppm_ref,
            rockstrom_constraint_ref: p.rockstrom_constraint_ref,
            minimum_ppm_constraint_ref: p.minimum_ppm_constraint_ref,
            decisions,
            ppm_objective,
            detail,
            carbon_cycle,
            rockstrom_constraint,
            minimum_ppm_constraint,
        })
    }
}

#[typetag::serde]
impl Discipline for CarbonCycle {
    fn name(&self) -> String {
        "CarbonCycle".to_string()
    }

    fn definitions(&self) -> Vec<TableDefinition> {
        vec![
            TableDefinition::input(TABLE_CO2_EMISSIONS, &[COL_CO2_TOTAL_EMISSIONS], "Gt"),
            TableDefinition::output(TABLE_CARBON_CYCLE, &[Reservoir::Atmosphere.column()], "GtC"),
            TableDefinition::output(
                TABLE_CARBON_CYCLE_DETAIL,
                &[
                    Reservoir::Atmosphere.column(),
                    Reservoir::UpperStrata.column(),
                    Reservoir::LowerStrata.column(),
                    COL_PPM,
                ],
                "GtC",
            ),
            TableDefinition::output(PPM_OBJECTIVE, &[], "-"),
            TableDefinition::output(ROCKSTROM_LIMIT_CONSTRAINT, &[], "-"),
            TableDefinition::output(MINIMUM_PPM_CONSTRAINT, &[], "-"),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct CarbonCycleRun {
    coefficients: TransferCoefficients,
    /// GtC entering the atmosphere per GtCO2 emitted
    emission_weight: FloatValue,
    objective_weight: FloatValue,
    rockstrom_constraint_ref: FloatValue,
    minimum_ppm_constraint_ref: FloatValue,
    decisions: Vec<[ClampDecision; 3]>,
    pub ppm_objective: FloatValue,
    /// Reservoir contents and ppm
    pub detail: YearTable,
    pub carbon_cycle: YearTable,
    pub rockstrom_constraint: Array1<FloatValue>,
    pub minimum_ppm_constraint: Array1<FloatValue>,
}

impl CarbonCycleRun {
    pub fn decisions(&self, reservoir: Reservoir) -> Vec<ClampDecision> {
        self.decisions.iter().map(|d| d[reservoir.index()]).collect()
    }

    /// d reservoir / d emissions for the three reservoirs
    ///
    /// Propagated year by year through the transfer matrix. A bounded
    /// reservoir does not depend on emissions in that year.
    fn reservoir_jacobians(&self) -> [Jacobian; 3] {
        let n = self.decisions.len();
        let b = &self.coefficients;
        let mut at = jacobian::zeros(n);
        let mut up = jacobian::zeros(n);
        let mut lo = jacobian::zeros(n);
        for t in 1..n {
            let slopes = self.decisions[t].map(|d| d.slope());
            for j in 0..t {
                let injection = if j == t - 1 { self.emission_weight } else { 0.0 };
                let d_at = at[[t - 1, j]] * b.b11 + up[[t - 1, j]] * b.b21 + injection;
                let d_up = at[[t - 1, j]] * b.b12 + up[[t - 1, j]] * b.b22 + lo[[t - 1, j]] * b.b32;
                let d_lo = lo[[t - 1, j]] * b.b33 + up[[t - 1, j]] * b.b23;
                at[[t, j]] = d_at * slopes[0];
                up[[t, j]] = d_up * slopes[1];
                lo[[t, j]] = d_lo * slopes[2];
            }
        }
        [at, up, lo]
    }

    fn d_ppm(&self) -> Jacobian {
        let [at, _, _] = self.reservoir_jacobians();
        at / GTC_PER_PPM
    }
}

impl Differentiable for CarbonCycleRun {
    type Output = CarbonCycleOutput;
    type Input = CarbonCycleInput;

    fn series(&self, output: CarbonCycleOutput) -> RsiamResult<Array1<FloatValue>> {
        Ok(match output {
            CarbonCycleOutput::Reservoir(r) => self.detail.column(r.column())?.clone(),
            CarbonCycleOutput::Ppm => self.detail.column(COL_PPM)?.clone(),
            CarbonCycleOutput::PpmObjective => Array1::from_elem(1, self.ppm_objective),
            CarbonCycleOutput::RockstromConstraint => self.rockstrom_constraint.clone(),
            CarbonCycleOutput::MinimumPpmConstraint => self.minimum_ppm_constraint.clone(),
        })
    }

    fn jacobian(
        &self,
        output: CarbonCycleOutput,
        _input: CarbonCycleInput,
    ) -> RsiamResult<Jacobian> {
        let n = self.decisions.len();
        Ok(match output {
            CarbonCycleOutput::Reservoir(r) => {
                let [at, up, lo] = self.reservoir_jacobians();
                match r {
                    Reservoir::Atmosphere => at,
                    Reservoir::UpperStrata => up,
                    Reservoir::LowerStrata => lo,
                }
            }
            CarbonCycleOutput::Ppm => self.d_ppm(),
            CarbonCycleOutput::PpmObjective => {
                jacobian::mean_row(n).dot(&self.d_ppm()) * self.objective_weight
            }
            CarbonCycleOutput::RockstromConstraint => {
                self.d_ppm() / -self.rockstrom_constraint_ref
            }
            CarbonCycleOutput::MinimumPpmConstraint => {
                self.d_ppm() / self.minimum_ppm_constraint_ref
            }
        })
    }
}
