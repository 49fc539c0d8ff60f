//! Economic sector engine.
//!
//! Capital accumulation, total factor productivity and a CES production
//! function for one economic sector.
//!
//! Capital follows
//! $$ K_t = K_{t-1} (1 - \delta) + I_{t-1} $$
//! and gross output is
//! $$ Y_t = P_t \left(\alpha K_{u,t}^\gamma + (1 - \alpha) L_t^\gamma\right)^{1/\gamma} $$
//! where the usable capital $K_u = K E / E_{max}$ is the share of the capital
//! stock that the available energy can run.
//!
//! Every published series has a closed-form Jacobian with respect to the four
//! coupling inputs: investment, energy production, workforce and damage fraction.

use crate::parameters::sector::{SectorMode, SectorParameters, LONG_TERM_EFFICIENCY_YEARS};
use ndarray::{Array1, Zip};
use rsiam_core::columns::{
    sector_table, COL_DAMAGE_FRAC_OUTPUT, COL_TOTAL_PRODUCTION, TABLE_DAMAGE,
    TABLE_ENERGY_PRODUCTION, TABLE_SECTOR_INVESTMENT, TABLE_WORKFORCE,
};
use rsiam_core::config::Validate;
use rsiam_core::discipline::{Discipline, TableDefinition};
use rsiam_core::engine::{CouplingInputs, Differentiable, Engine};
use rsiam_core::errors::{RsiamError, RsiamResult};
use rsiam_core::jacobian::{self, Jacobian};
use rsiam_core::range_check::{check_finite, check_ranges, ColumnBounds, RangeCheck};
use rsiam_core::table::YearTable;
use rsiam_core::years::{FloatValue, YearRange};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const TABLE_PRODUCTION: &str = "production_df";
pub const COL_GROSS_OUTPUT: &str = "gross_output";
pub const COL_NET_OUTPUT: &str = "output_net_of_d";

pub const TABLE_CAPITAL: &str = "capital_df";
pub const COL_CAPITAL: &str = "capital";
pub const COL_USABLE_CAPITAL: &str = "usable_capital";
pub const COL_ENERGY_EFFICIENCY: &str = "energy_efficiency";
pub const COL_EMAX: &str = "e_max";

pub const TABLE_PRODUCTIVITY: &str = "productivity_df";
pub const COL_PRODUCTIVITY_GR: &str = "productivity_gr";
pub const COL_PRODUCTIVITY: &str = "productivity";

pub const TABLE_GROWTH_RATE: &str = "growth_rate_df";
pub const COL_GROWTH_RATE: &str = "net_output_growth_rate";

pub const TABLE_EMAX_CONSTRAINT: &str = "emax_enet_constraint";
pub const COL_EMAX_CONSTRAINT: &str = "emax_enet_constraint";

pub const TABLE_LONG_TERM_EFFICIENCY: &str = "longterm_energy_efficiency";

/// Capital is expressed in T$, e_max in TWh per G$
const CAPITAL_TO_EMAX: FloatValue = 1e3;
/// Productivity growth rates are calibrated on 5-year steps
const PRODUCTIVITY_GR_STEPS: FloatValue = 5.0;
/// Smallest net output used as the denominator of the growth rate
const OUTPUT_FLOOR: FloatValue = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectorInput {
    Investment,
    EnergyProduction,
    Workforce,
    DamageFraction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectorOutput {
    GrossOutput,
    NetOutput,
    Capital,
    UsableCapital,
    EnergyEfficiency,
    Emax,
    Productivity,
    ProductivityGrowthRate,
    GrowthRate,
    EmaxEnetConstraint,
}

/// Coupling inputs of one sector
///
/// `investment` and `workforce` hold one column per sector; this sector's
/// column is selected by name. `investment` may be omitted in fitting mode.
#[derive(Debug, Clone)]
pub struct SectorInputs {
    pub sector: String,
    pub investment: Option<YearTable>,
    pub energy_production: YearTable,
    pub workforce: YearTable,
    pub damage: YearTable,
}

impl SectorInputs {
    fn locate(&self, key: SectorInput) -> RsiamResult<(&YearTable, &str)> {
        Ok(match key {
            SectorInput::Investment => (
                self.investment
                    .as_ref()
                    .ok_or_else(|| RsiamError::MissingInput(TABLE_SECTOR_INVESTMENT.to_string()))?,
                self.sector.as_str(),
            ),
            SectorInput::EnergyProduction => (&self.energy_production, COL_TOTAL_PRODUCTION),
            SectorInput::Workforce => (&self.workforce, self.sector.as_str()),
            SectorInput::DamageFraction => (&self.damage, COL_DAMAGE_FRAC_OUTPUT),
        })
    }
}

impl CouplingInputs for SectorInputs {
    type Key = SectorInput;

    fn series(&self, key: SectorInput) -> RsiamResult<Array1<FloatValue>> {
        let (table, column) = self.locate(key)?;
        Ok(table.column(column)?.clone())
    }

    fn replacing(&self, key: SectorInput, values: Array1<FloatValue>) -> RsiamResult<Self> {
        let (table, column) = self.locate(key)?;
        let table = table.replacing(column, values)?;
        let mut inputs = self.clone();
        match key {
            SectorInput::Investment => inputs.investment = Some(table),
            SectorInput::EnergyProduction => inputs.energy_production = table,
            SectorInput::Workforce => inputs.workforce = table,
            SectorInput::DamageFraction => inputs.damage = table,
        }
        Ok(inputs)
    }
}

/// Economic sector engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomicSector {
    sector: String,
    years: YearRange,
    parameters: SectorParameters,
    #[serde(default)]
    range_check: RangeCheck,
}

impl EconomicSector {
    /// Validate `parameters` and bind them to `sector` over `years`
    pub fn configure(
        sector: &str,
        years: YearRange,
        parameters: SectorParameters,
    ) -> RsiamResult<Self> {
        parameters.validate()?;
        if let SectorMode::Fitting {
            historical_investment,
            ..
        } = &parameters.mode
        {
            if historical_investment.len() != years.len() {
                return Err(RsiamError::LengthMismatch {
                    table: "historical_investment".to_string(),
                    expected: years.len(),
                    found: historical_investment.len(),
                });
            }
        }
        Ok(Self {
            sector: sector.to_string(),
            years,
            parameters,
            range_check: RangeCheck::default(),
        })
    }

    pub fn with_range_check(mut self, range_check: RangeCheck) -> Self {
        self.range_check = range_check;
        self
    }

    pub fn sector(&self) -> &str {
        &self.sector
    }

    pub fn years(&self) -> &YearRange {
        &self.years
    }

    pub fn parameters(&self) -> &SectorParameters {
        &self.parameters
    }

    /// Productivity growth rate, a closed form of the year index
    pub fn productivity_growth_rate(&self) -> Array1<FloatValue> {
        let p = &self.parameters;
        Array1::from_shape_fn(self.years.len(), |i| {
            p.productivity_gr_start * (-p.decline_rate_tfp * i as FloatValue).exp()
                / PRODUCTIVITY_GR_STEPS
        })
    }

    /// Logistic energy efficiency in `year`
    pub fn energy_efficiency(&self, year: FloatValue) -> FloatValue {
        let p = &self.parameters;
        p.energy_eff_cst + p.energy_eff_max / (1.0 + (-p.energy_eff_k * (year - p.energy_eff_xzero)).exp())
    }

    fn input_bounds(&self) -> [(SectorInput, ColumnBounds); 3] {
        [
            (
                SectorInput::EnergyProduction,
                ColumnBounds::non_negative(COL_TOTAL_PRODUCTION),
            ),
            (
                SectorInput::Workforce,
                ColumnBounds::non_negative(&self.sector),
            ),
            (
                SectorInput::DamageFraction,
                ColumnBounds::new(COL_DAMAGE_FRAC_OUTPUT, 0.0, 1.0),
            ),
        ]
    }

    fn investment(&self, inputs: &SectorInputs) -> RsiamResult<Array1<FloatValue>> {
        match &self.parameters.mode {
            SectorMode::Simulation => inputs
                .investment
                .as_ref()
                .ok_or_else(|| RsiamError::MissingInput(TABLE_SECTOR_INVESTMENT.to_string()))?
                .aligned_column(&self.years, &self.sector),
            SectorMode::Fitting {
                historical_investment,
                ..
            } => Ok(Array1::from(historical_investment.clone())),
        }
    }

    fn compute_run(&self, inputs: &SectorInputs) -> RsiamResult<SectorRun> {
        let p = &self.parameters;
        let n = self.years.len();
        let dt = self.years.dt();
        debug!(sector = %self.sector, nb_years = n, "computing economic sector");

        if self.range_check == RangeCheck::Enabled {
            for (key, bounds) in self.input_bounds() {
                let (table, _) = inputs.locate(key)?;
                check_ranges(table, &[bounds])?;
            }
        }

        let investment = self.investment(inputs)?;
        let energy_production = inputs
            .energy_production
            .aligned_column(&self.years, COL_TOTAL_PRODUCTION)?;
        let workforce = inputs.workforce.aligned_column(&self.years, &self.sector)?;
        let damage = inputs
            .damage
            .aligned_column(&self.years, COL_DAMAGE_FRAC_OUTPUT)?;

        let productivity_gr = self.productivity_growth_rate();
        let mut productivity = Array1::zeros(n);
        let mut capital = Array1::zeros(n);
        productivity[0] = p.productivity_start;
        capital[0] = p.capital_start;
        for i in 1..n {
            let year = self.years.year_at(i);
            let denominator = 1.0 - productivity_gr[i - 1];
            if denominator == 0.0 {
                return Err(RsiamError::DivisionByZero {
                    quantity: COL_PRODUCTIVITY.to_string(),
                    year,
                });
            }
            let damage_factor = if p.damage_to_productivity {
                1.0 - p.frac_damage_prod * damage[i]
            } else {
                1.0
            };
            productivity[i] = damage_factor * productivity[i - 1] / denominator;
            capital[i] = capital[i - 1] * (1.0 - p.depreciation_capital) + investment[i - 1];
        }

        let energy_efficiency: Array1<FloatValue> = self
            .years
            .years()
            .map(|y| self.energy_efficiency(y as FloatValue))
            .collect();
        let energy = &energy_production * p.scaling_factor_energy_production;
        let emax = Zip::from(&capital)
            .and(&energy_efficiency)
            .map_collect(|k, eff| k * CAPITAL_TO_EMAX / (p.capital_utilisation_ratio * eff));

        let mut usable_capital = Array1::zeros(n);
        let mut gross_output = Array1::zeros(n);
        let mut net_output = Array1::zeros(n);
        for i in 0..n {
            let year = self.years.year_at(i);
            if emax[i] == 0.0 {
                return Err(RsiamError::DivisionByZero {
                    quantity: COL_USABLE_CAPITAL.to_string(),
                    year,
                });
            }
            usable_capital[i] = capital[i] * energy[i] / emax[i];
            if usable_capital[i] < 0.0 {
                return Err(RsiamError::Domain {
                    quantity: COL_USABLE_CAPITAL.to_string(),
                    year,
                    value: usable_capital[i],
                    reason: "production function needs non-negative usable capital".to_string(),
                });
            }
            if workforce[i] < 0.0 {
                return Err(RsiamError::Domain {
                    quantity: TABLE_WORKFORCE.to_string(),
                    year,
                    value: workforce[i],
                    reason: "production function needs a non-negative workforce".to_string(),
                });
            }
            gross_output[i] = productivity[i] * self.ces(usable_capital[i], workforce[i]);
            if !gross_output[i].is_finite() {
                return Err(RsiamError::NonFinite {
                    quantity: COL_GROSS_OUTPUT.to_string(),
                    year,
                });
            }
            net_output[i] = gross_output[i] * net_factor(p, damage[i]);
        }

        let mut growth_rate = Array1::zeros(n);
        for i in 1..n {
            if net_output[i - 1] < OUTPUT_FLOOR {
                warn!(
                    sector = %self.sector,
                    year = self.years.year_at(i - 1),
                    net_output = net_output[i - 1],
                    "net output below floor, growth rate uses the floor"
                );
            }
            let previous = net_output[i - 1].max(OUTPUT_FLOOR);
            growth_rate[i - 1] = ((net_output[i] - previous) / previous) / dt;
        }
        if n > 1 {
            growth_rate[n - 1] = growth_rate[n - 2];
        }

        let emax_constraint = Zip::from(&energy).and(&emax).map_collect(|e, m| {
            -(e - m * p.max_capital_utilisation_ratio) / p.ref_emax_enet_constraint
        });

        let state = SectorState {
            investment,
            energy,
            workforce,
            damage,
            productivity_gr,
            productivity,
            capital,
            energy_efficiency,
            emax,
            usable_capital,
            gross_output,
            net_output,
            growth_rate,
            emax_constraint,
        };
        let run = SectorRun::publish(self, state)?;

        if self.range_check == RangeCheck::Enabled {
            for table in run.tables() {
                check_finite(table)?;
            }
            check_ranges(
                &run.production,
                &[
                    ColumnBounds::non_negative(COL_GROSS_OUTPUT),
                    ColumnBounds::non_negative(COL_NET_OUTPUT),
                ],
            )?;
        }
        debug!(sector = %self.sector, "economic sector computed");
        Ok(run)
    }

    /// $(\alpha K_u^\gamma + (1 - \alpha) L^\gamma)^{1/\gamma}$
    fn ces(&self, usable_capital: FloatValue, workforce: FloatValue) -> FloatValue {
        let alpha = self.parameters.output_alpha;
        let gamma = self.parameters.output_gamma;
        if gamma == 0.5 {
            (alpha * usable_capital.sqrt() + (1.0 - alpha) * workforce.sqrt()).powi(2)
        } else {
            (alpha * usable_capital.powf(gamma) + (1.0 - alpha) * workforce.powf(gamma))
                .powf(1.0 / gamma)
        }
    }
}

/// Factor turning gross output into output net of damages
fn net_factor(p: &SectorParameters, damage: FloatValue) -> FloatValue {
    if p.damage_to_productivity {
        (1.0 - damage) / (1.0 - p.frac_damage_prod * damage)
    } else {
        1.0 - damage
    }
}

impl Engine for EconomicSector {
    type Inputs = SectorInputs;
    type Run = SectorRun;

    fn compute(&self, inputs: &SectorInputs) -> RsiamResult<SectorRun> {
        self.compute_run(inputs)
    }
}

#[typetag::serde]
impl Discipline for EconomicSector {
    fn name(&self) -> String {
        format!("{}.EconomicSector", self.sector)
    }

    fn definitions(&self) -> Vec<TableDefinition> {
        let s = self.sector.as_str();
        let mut definitions = vec![
            TableDefinition::input(
                &sector_table(s, TABLE_ENERGY_PRODUCTION),
                &[COL_TOTAL_PRODUCTION],
                "PWh",
            ),
            TableDefinition::input(TABLE_WORKFORCE, &[s], "million people"),
            TableDefinition::input(TABLE_DAMAGE, &[COL_DAMAGE_FRAC_OUTPUT], "dimensionless"),
            TableDefinition::output(
                &sector_table(s, TABLE_PRODUCTION),
                &[COL_GROSS_OUTPUT, COL_NET_OUTPUT],
                "T$",
            ),
            TableDefinition::output(
                &sector_table(s, TABLE_CAPITAL),
                &[COL_CAPITAL, COL_USABLE_CAPITAL, COL_ENERGY_EFFICIENCY, COL_EMAX],
                "T$",
            ),
            TableDefinition::output(
                &sector_table(s, TABLE_PRODUCTIVITY),
                &[COL_PRODUCTIVITY_GR, COL_PRODUCTIVITY],
                "dimensionless",
            ),
            TableDefinition::output(
                &sector_table(s, TABLE_GROWTH_RATE),
                &[COL_GROWTH_RATE],
                "dimensionless",
            ),
            TableDefinition::output(
                &sector_table(s, TABLE_EMAX_CONSTRAINT),
                &[COL_EMAX_CONSTRAINT],
                "dimensionless",
            ),
        ];
        match self.parameters.mode {
            SectorMode::Simulation => {
                definitions.push(TableDefinition::input(TABLE_SECTOR_INVESTMENT, &[s], "T$"))
            }
            SectorMode::Fitting { .. } => definitions.push(TableDefinition::output(
                &sector_table(s, TABLE_LONG_TERM_EFFICIENCY),
                &[COL_ENERGY_EFFICIENCY],
                "dimensionless",
            )),
        }
        definitions
    }
}

/// Aligned inputs and every intermediate series of one forward pass
#[derive(Debug, Clone)]
struct SectorState {
    investment: Array1<FloatValue>,
    /// Energy production after scaling
    energy: Array1<FloatValue>,
    workforce: Array1<FloatValue>,
    damage: Array1<FloatValue>,
    productivity_gr: Array1<FloatValue>,
    productivity: Array1<FloatValue>,
    capital: Array1<FloatValue>,
    energy_efficiency: Array1<FloatValue>,
    emax: Array1<FloatValue>,
    usable_capital: Array1<FloatValue>,
    gross_output: Array1<FloatValue>,
    net_output: Array1<FloatValue>,
    growth_rate: Array1<FloatValue>,
    emax_constraint: Array1<FloatValue>,
}

/// Result of [`EconomicSector::compute`]
#[derive(Debug, Clone)]
pub struct SectorRun {
    sector: String,
    years: YearRange,
    parameters: SectorParameters,
    state: SectorState,
    pub production: YearTable,
    pub capital: YearTable,
    pub productivity: YearTable,
    pub growth_rate: YearTable,
    pub emax_enet_constraint: YearTable,
    /// Fitting mode only
    pub long_term_energy_efficiency: Option<YearTable>,
    /// `(cst + max) / cst - energy_eff_max_range_ref`, fitting mode only
    pub range_energy_eff_constraint: Option<FloatValue>,
}

impl SectorRun {
    fn publish(engine: &EconomicSector, state: SectorState) -> RsiamResult<Self> {
        let years = &engine.years;
        let s = engine.sector.as_str();
        let production = YearTable::new(&sector_table(s, TABLE_PRODUCTION), years)
            .with_column(COL_GROSS_OUTPUT, state.gross_output.clone())?
            .with_column(COL_NET_OUTPUT, state.net_output.clone())?;
        let capital = YearTable::new(&sector_table(s, TABLE_CAPITAL), years)
            .with_column(COL_CAPITAL, state.capital.clone())?
            .with_column(COL_USABLE_CAPITAL, state.usable_capital.clone())?
            .with_column(COL_ENERGY_EFFICIENCY, state.energy_efficiency.clone())?
            .with_column(COL_EMAX, state.emax.clone())?;
        let productivity = YearTable::new(&sector_table(s, TABLE_PRODUCTIVITY), years)
            .with_column(COL_PRODUCTIVITY_GR, state.productivity_gr.clone())?
            .with_column(COL_PRODUCTIVITY, state.productivity.clone())?;
        let growth_rate = YearTable::new(&sector_table(s, TABLE_GROWTH_RATE), years)
            .with_column(COL_GROWTH_RATE, state.growth_rate.clone())?;
        let emax_enet_constraint = YearTable::new(&sector_table(s, TABLE_EMAX_CONSTRAINT), years)
            .with_column(COL_EMAX_CONSTRAINT, state.emax_constraint.clone())?;

        let (long_term_energy_efficiency, range_energy_eff_constraint) =
            match &engine.parameters.mode {
                SectorMode::Simulation => (None, None),
                SectorMode::Fitting {
                    energy_eff_max_range_ref,
                    ..
                } => {
                    let (start, end) = LONG_TERM_EFFICIENCY_YEARS;
                    let lt_years = YearRange::new(start, end, 1)?;
                    let efficiency: Array1<FloatValue> = lt_years
                        .years()
                        .map(|y| engine.energy_efficiency(y as FloatValue))
                        .collect();
                    let table =
                        YearTable::new(&sector_table(s, TABLE_LONG_TERM_EFFICIENCY), &lt_years)
                            .with_column(COL_ENERGY_EFFICIENCY, efficiency)?;
                    let p = &engine.parameters;
                    let constraint = (p.energy_eff_cst + p.energy_eff_max) / p.energy_eff_cst
                        - energy_eff_max_range_ref;
                    (Some(table), Some(constraint))
                }
            };

        Ok(Self {
            sector: s.to_string(),
            years: *years,
            parameters: engine.parameters.clone(),
            state,
            production,
            capital,
            productivity,
            growth_rate,
            emax_enet_constraint,
            long_term_energy_efficiency,
            range_energy_eff_constraint,
        })
    }

    pub fn tables(&self) -> Vec<&YearTable> {
        let mut tables = vec![
            &self.production,
            &self.capital,
            &self.productivity,
            &self.growth_rate,
            &self.emax_enet_constraint,
        ];
        if let Some(lt) = &self.long_term_energy_efficiency {
            tables.push(lt);
        }
        tables
    }

    fn n(&self) -> usize {
        self.state.capital.len()
    }

    /// d capital / d investment: lower triangular, `(1 - depreciation)^(i - j - 1)` below the diagonal
    fn dcapital_dinvestment(&self) -> Jacobian {
        let n = self.n();
        let retention = 1.0 - self.parameters.depreciation_capital;
        let mut jac = jacobian::zeros(n);
        for i in 1..n {
            for j in 0..i - 1 {
                jac[[i, j]] = jac[[i - 1, j]] * retention;
            }
            jac[[i, i - 1]] = 1.0;
        }
        jac
    }

    /// d e_max / d capital, diagonal entries
    fn demax_dcapital(&self) -> Array1<FloatValue> {
        let u = self.parameters.capital_utilisation_ratio;
        self.state
            .energy_efficiency
            .mapv(|eff| CAPITAL_TO_EMAX / (u * eff))
    }

    /// d usable capital / d capital, diagonal entries
    fn dusable_dcapital(&self) -> Array1<FloatValue> {
        let st = &self.state;
        let demax = self.demax_dcapital();
        Array1::from_shape_fn(self.n(), |i| {
            st.energy[i] / st.emax[i] - st.capital[i] * st.energy[i] * demax[i] / st.emax[i].powi(2)
        })
    }

    /// d usable capital / d energy production (unscaled), diagonal entries
    fn dusable_denergy(&self) -> Array1<FloatValue> {
        let st = &self.state;
        let scale = self.parameters.scaling_factor_energy_production;
        Zip::from(&st.capital)
            .and(&st.emax)
            .map_collect(|k, m| k * scale / m)
    }

    /// Partial derivatives of gross output w.r.t. usable capital and workforce,
    /// and the CES term $G^{1/\gamma}$ multiplying productivity
    fn production_partials(&self) -> (Array1<FloatValue>, Array1<FloatValue>, Array1<FloatValue>) {
        let st = &self.state;
        let alpha = self.parameters.output_alpha;
        let gamma = self.parameters.output_gamma;
        let n = self.n();
        let mut dku = Array1::zeros(n);
        let mut dl = Array1::zeros(n);
        let mut ces = Array1::zeros(n);
        for i in 0..n {
            let ku = st.usable_capital[i];
            let l = st.workforce[i];
            let g = alpha * ku.powf(gamma) + (1.0 - alpha) * l.powf(gamma);
            let outer = st.productivity[i] * g.powf(1.0 / gamma - 1.0);
            dku[i] = outer * alpha * ku.powf(gamma - 1.0);
            dl[i] = outer * (1.0 - alpha) * l.powf(gamma - 1.0);
            ces[i] = g.powf(1.0 / gamma);
        }
        (dku, dl, ces)
    }

    /// d productivity / d damage fraction
    fn dproductivity_ddamage(&self) -> Jacobian {
        let n = self.n();
        let mut jac = jacobian::zeros(n);
        let p = &self.parameters;
        if !p.damage_to_productivity {
            return jac;
        }
        let st = &self.state;
        for i in 1..n {
            let carry = 1.0 / (1.0 - st.productivity_gr[i - 1]);
            let factor = 1.0 - p.frac_damage_prod * st.damage[i];
            for j in 0..i {
                jac[[i, j]] = factor * jac[[i - 1, j]] * carry;
            }
            jac[[i, i]] = -p.frac_damage_prod * st.productivity[i - 1] * carry;
        }
        jac
    }

    fn dgross_output(&self, input: SectorInput) -> Jacobian {
        let (dku, dl, ces) = self.production_partials();
        match input {
            SectorInput::Investment => {
                let dku_dk = &dku * &self.dusable_dcapital();
                jacobian::scale_rows(dku_dk.view(), &self.dcapital_dinvestment())
            }
            SectorInput::EnergyProduction => jacobian::diagonal((&dku * &self.dusable_denergy()).view()),
            SectorInput::Workforce => jacobian::diagonal(dl.view()),
            SectorInput::DamageFraction => jacobian::scale_rows(ces.view(), &self.dproductivity_ddamage()),
        }
    }

    fn dnet_output(&self, input: SectorInput) -> Jacobian {
        let p = &self.parameters;
        let st = &self.state;
        let factor = st.damage.mapv(|d| net_factor(p, d));
        let mut jac = jacobian::scale_rows(factor.view(), &self.dgross_output(input));
        if input == SectorInput::DamageFraction {
            for i in 0..self.n() {
                let d = st.damage[i];
                let dfactor = if p.damage_to_productivity {
                    (p.frac_damage_prod - 1.0) / (1.0 - p.frac_damage_prod * d).powi(2)
                } else {
                    -1.0
                };
                jac[[i, i]] += dfactor * st.gross_output[i];
            }
        }
        jac
    }

    fn dgrowth_rate(&self, input: SectorInput) -> Jacobian {
        let n = self.n();
        let st = &self.state;
        let dt = self.years.dt();
        let dnet = self.dnet_output(input);
        let mut jac = jacobian::zeros(n);
        for i in 1..n {
            let previous = st.net_output[i - 1].max(OUTPUT_FLOOR);
            let floored = st.net_output[i - 1] < OUTPUT_FLOOR;
            for j in 0..n {
                let dprevious = if floored { 0.0 } else { dnet[[i - 1, j]] };
                jac[[i - 1, j]] = (dnet[[i, j]] / previous
                    - st.net_output[i] * dprevious / previous.powi(2))
                    / dt;
            }
        }
        if n > 1 {
            let last = jac.row(n - 2).to_owned();
            jac.row_mut(n - 1).assign(&last);
        }
        jac
    }

}

impl Differentiable for SectorRun {
    type Output = SectorOutput;
    type Input = SectorInput;

    fn series(&self, output: SectorOutput) -> RsiamResult<Array1<FloatValue>> {
        let st = &self.state;
        Ok(match output {
            SectorOutput::GrossOutput => st.gross_output.clone(),
            SectorOutput::NetOutput => st.net_output.clone(),
            SectorOutput::Capital => st.capital.clone(),
            SectorOutput::UsableCapital => st.usable_capital.clone(),
            SectorOutput::EnergyEfficiency => st.energy_efficiency.clone(),
            SectorOutput::Emax => st.emax.clone(),
            SectorOutput::Productivity => st.productivity.clone(),
            SectorOutput::ProductivityGrowthRate => st.productivity_gr.clone(),
            SectorOutput::GrowthRate => st.growth_rate.clone(),
            SectorOutput::EmaxEnetConstraint => st.emax_constraint.clone(),
        })
    }

    fn jacobian(&self, output: SectorOutput, input: SectorInput) -> RsiamResult<Jacobian> {
        if input == SectorInput::Investment {
            if let SectorMode::Fitting { .. } = self.parameters.mode {
                return Err(RsiamError::UnsupportedJacobian {
                    output: format!("{:?}", output),
                    input: format!("{:?} (historical in fitting mode)", input),
                });
            }
        }

        let n = self.n();
        let p = &self.parameters;
        let jac = match (output, input) {
            (SectorOutput::GrossOutput, _) => self.dgross_output(input),
            (SectorOutput::NetOutput, _) => self.dnet_output(input),
            (SectorOutput::GrowthRate, _) => self.dgrowth_rate(input),
            (SectorOutput::Capital, SectorInput::Investment) => self.dcapital_dinvestment(),
            (SectorOutput::Emax, SectorInput::Investment) => {
                jacobian::scale_rows(self.demax_dcapital().view(), &self.dcapital_dinvestment())
            }
            (SectorOutput::UsableCapital, SectorInput::Investment) => {
                jacobian::scale_rows(self.dusable_dcapital().view(), &self.dcapital_dinvestment())
            }
            (SectorOutput::UsableCapital, SectorInput::EnergyProduction) => {
                jacobian::diagonal(self.dusable_denergy().view())
            }
            (SectorOutput::Productivity, SectorInput::DamageFraction) => {
                self.dproductivity_ddamage()
            }
            (SectorOutput::EmaxEnetConstraint, SectorInput::Investment) => {
                let scale = self.demax_dcapital()
                    * (p.max_capital_utilisation_ratio / p.ref_emax_enet_constraint);
                jacobian::scale_rows(scale.view(), &self.dcapital_dinvestment())
            }
            (SectorOutput::EmaxEnetConstraint, SectorInput::EnergyProduction) => {
                jacobian::scaled_identity(
                    n,
                    -p.scaling_factor_energy_production / p.ref_emax_enet_constraint,
                )
            }
            _ => jacobian::zeros(n),
        };

        if let Some(((row, _), _)) = jac.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(RsiamError::NonFinite {
                quantity: format!("{}: d{:?}/d{:?}", self.sector, output, input),
                year: self.years.year_at(row),
            });
        }
        Ok(jac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rsiam_core::jacobian_check::{check_engine, FiniteDifference, Tolerance};

    const SECTOR: &str = "Industry";

    fn years() -> YearRange {
        YearRange::new(2020, 2025, 1).unwrap()
    }

    fn series(table: &str, column: &str, values: Array1<FloatValue>) -> YearTable {
        YearTable::new(table, &years())
            .with_column(column, values)
            .unwrap()
    }

    fn inputs() -> SectorInputs {
        let n = years().len();
        SectorInputs {
            sector: SECTOR.to_string(),
            investment: Some(series(
                TABLE_SECTOR_INVESTMENT,
                SECTOR,
                Array1::from_elem(n, 10.0),
            )),
            energy_production: series(
                TABLE_ENERGY_PRODUCTION,
                COL_TOTAL_PRODUCTION,
                Array1::linspace(40.0, 55.0, n),
            ),
            workforce: series(TABLE_WORKFORCE, SECTOR, Array1::linspace(1000.0, 1100.0, n)),
            damage: series(
                TABLE_DAMAGE,
                COL_DAMAGE_FRAC_OUTPUT,
                Array1::linspace(0.01, 0.05, n),
            ),
        }
    }

    fn parameters() -> SectorParameters {
        let mut p = SectorParameters::with_seeds(100.0, 1.3, 0.02);
        p.depreciation_capital = 0.05;
        p
    }

    fn engine(parameters: SectorParameters) -> EconomicSector {
        EconomicSector::configure(SECTOR, years(), parameters).unwrap()
    }

    #[test]
    fn capital_accumulates_investment() {
        let run = engine(parameters()).compute(&inputs()).unwrap();
        let capital = run.capital.column(COL_CAPITAL).unwrap();
        assert_eq!(capital[0], 100.0);
        assert_eq!(capital[1], 105.0);
        assert_eq!(capital[2], 109.75);
        for i in 1..capital.len() {
            assert_eq!(capital[i], capital[i - 1] * (1.0 - 0.05) + 10.0);
        }
    }

    #[test]
    fn compute_is_idempotent() {
        let engine = engine(parameters());
        let first = engine.compute(&inputs()).unwrap();
        let second = engine.compute(&inputs()).unwrap();
        assert_eq!(first.production, second.production);
        assert_eq!(first.capital, second.capital);
        assert_eq!(first.growth_rate, second.growth_rate);
    }

    #[test]
    fn productivity_without_damage_feedback() {
        let engine = engine(parameters());
        let run = engine.compute(&inputs()).unwrap();
        let gr = engine.productivity_growth_rate();
        let productivity = run.productivity.column(COL_PRODUCTIVITY).unwrap();
        assert_eq!(productivity[0], 1.3);
        assert_relative_eq!(gr[0], 0.02 / 5.0);
        assert_relative_eq!(productivity[1], 1.3 / (1.0 - gr[0]));
    }

    #[test]
    fn damage_modes() {
        let inputs = inputs();
        let run = engine(parameters()).compute(&inputs).unwrap();
        let gross = run.production.column(COL_GROSS_OUTPUT).unwrap();
        let net = run.production.column(COL_NET_OUTPUT).unwrap();
        assert_relative_eq!(net[2], gross[2] * (1.0 - 0.02));

        let mut p = parameters();
        p.damage_to_productivity = true;
        let run = engine(p).compute(&inputs).unwrap();
        let gross = run.production.column(COL_GROSS_OUTPUT).unwrap();
        let net = run.production.column(COL_NET_OUTPUT).unwrap();
        assert_relative_eq!(net[2], gross[2] * (1.0 - 0.02) / (1.0 - 0.3 * 0.02));
    }

    #[test]
    fn sqrt_branch_matches_general_form() {
        let engine = engine(parameters());
        let ces = engine.ces(98.8, 1000.0);
        let general = (0.5 * 98.8_f64.powf(0.5) + 0.5 * 1000.0_f64.powf(0.5)).powf(2.0);
        assert_relative_eq!(ces, general, epsilon = 1e-9);
    }

    #[test]
    fn growth_rate_repeats_last_year() {
        let run = engine(parameters()).compute(&inputs()).unwrap();
        let growth = run.growth_rate.column(COL_GROWTH_RATE).unwrap();
        let net = run.production.column(COL_NET_OUTPUT).unwrap();
        assert_relative_eq!(growth[0], (net[1] - net[0]) / net[0]);
        assert_eq!(growth[5], growth[4]);
    }

    #[test]
    fn emax_constraint() {
        let run = engine(parameters()).compute(&inputs()).unwrap();
        let emax = run.capital.column(COL_EMAX).unwrap();
        let constraint = run
            .emax_enet_constraint
            .column(COL_EMAX_CONSTRAINT)
            .unwrap();
        assert_relative_eq!(constraint[0], -(40.0 * 1000.0 - emax[0] * 0.85) / 10.0);
    }

    #[test]
    fn missing_investment_in_simulation_mode() {
        let mut inputs = inputs();
        inputs.investment = None;
        assert!(matches!(
            engine(parameters()).compute(&inputs),
            Err(RsiamError::MissingInput(_))
        ));
    }

    #[test]
    fn misaligned_input_is_rejected() {
        let mut inputs = inputs();
        inputs.workforce = YearTable::new(TABLE_WORKFORCE, &YearRange::new(2020, 2030, 1).unwrap())
            .with_column(SECTOR, Array1::from_elem(11, 1000.0))
            .unwrap();
        assert!(matches!(
            engine(parameters()).compute(&inputs),
            Err(RsiamError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn negative_energy_is_a_domain_error() {
        let mut inputs = inputs();
        let mut energy = inputs.series(SectorInput::EnergyProduction).unwrap();
        energy[3] = -1.0;
        inputs = inputs
            .replacing(SectorInput::EnergyProduction, energy)
            .unwrap();
        match engine(parameters()).compute(&inputs) {
            Err(RsiamError::Domain { year, .. }) => assert_eq!(year, 2023),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn range_check_rejects_damage_above_one() {
        let mut inputs = inputs();
        let mut damage = inputs.series(SectorInput::DamageFraction).unwrap();
        damage[1] = 1.5;
        inputs = inputs.replacing(SectorInput::DamageFraction, damage).unwrap();
        let engine = engine(parameters()).with_range_check(RangeCheck::Enabled);
        assert!(matches!(
            engine.compute(&inputs),
            Err(RsiamError::OutOfRange { year: 2021, .. })
        ));
    }

    #[test]
    fn fitting_mode_replays_history() {
        let mut p = parameters();
        p.mode = SectorMode::Fitting {
            historical_investment: vec![20.0; 6],
            energy_eff_max_range_ref: 4.0,
        };
        let engine = engine(p);
        let mut inputs = inputs();
        inputs.investment = None;
        let run = engine.compute(&inputs).unwrap();
        assert_eq!(run.capital.column(COL_CAPITAL).unwrap()[1], 115.0);

        let lt = run.long_term_energy_efficiency.as_ref().unwrap();
        assert_eq!(lt.len(), 170);
        assert_eq!(lt.years()[0], 1950);
        assert_relative_eq!(
            run.range_energy_eff_constraint.unwrap(),
            (0.98 + 3.52) / 0.98 - 4.0
        );
        assert!(matches!(
            run.jacobian(SectorOutput::Capital, SectorInput::Investment),
            Err(RsiamError::UnsupportedJacobian { .. })
        ));
    }

    #[test]
    fn fitting_history_must_cover_the_range() {
        let mut p = parameters();
        p.mode = SectorMode::Fitting {
            historical_investment: vec![20.0; 3],
            energy_eff_max_range_ref: 4.0,
        };
        assert!(EconomicSector::configure(SECTOR, years(), p).is_err());
    }

    #[test]
    fn capital_jacobian_is_lower_triangular() {
        let run = engine(parameters()).compute(&inputs()).unwrap();
        let jac = run
            .jacobian(SectorOutput::Capital, SectorInput::Investment)
            .unwrap();
        assert!(jacobian::is_lower_triangular(&jac));
        assert_eq!(jac[[1, 0]], 1.0);
        assert_relative_eq!(jac[[3, 0]], 0.95 * 0.95);
        assert_eq!(jac[[3, 3]], 0.0);
    }

    fn all_pairs(tolerance: Tolerance) -> Vec<(SectorOutput, SectorInput, Tolerance)> {
        use SectorInput::*;
        use SectorOutput::*;
        let outputs = [
            GrossOutput,
            NetOutput,
            Capital,
            UsableCapital,
            Emax,
            Productivity,
            GrowthRate,
            EmaxEnetConstraint,
        ];
        let inputs = [Investment, EnergyProduction, Workforce, DamageFraction];
        outputs
            .iter()
            .flat_map(|o| inputs.iter().map(move |i| (*o, *i, tolerance)))
            .collect()
    }

    #[test]
    fn jacobians_match_finite_differences() {
        check_engine(
            &engine(parameters()),
            &inputs(),
            &all_pairs(Tolerance::new(1e-6, 1e-6)),
            FiniteDifference::default(),
        )
        .unwrap();
    }

    #[test]
    fn jacobians_with_damage_to_productivity_and_general_gamma() {
        let mut p = parameters();
        p.damage_to_productivity = true;
        p.output_gamma = 0.3;
        p.output_alpha = 0.4;
        check_engine(
            &engine(p),
            &inputs(),
            &all_pairs(Tolerance::new(1e-6, 1e-6)),
            FiniteDifference::default(),
        )
        .unwrap();
    }

    #[test]
    fn discipline_declarations() {
        let engine = engine(parameters());
        assert_eq!(engine.name(), "Industry.EconomicSector");
        assert!(engine
            .input_names()
            .contains(&TABLE_SECTOR_INVESTMENT.to_string()));
        assert!(engine
            .output_names()
            .contains(&"Industry.capital_df".to_string()));
    }
}
