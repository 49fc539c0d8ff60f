//! CO2 tax selection.
//!
//! The tax is the smooth maximum, year by year, of a share of the CO2 damage
//! price, a share of the CCS price and zero. The smooth maximum keeps the
//! selection differentiable where two candidates cross.

use crate::parameters::policy::PolicyParameters;
use ndarray::{Array1, Array2};
use rsiam_core::columns::{
    COL_CCS_PRICE, COL_CO2_DAMAGE_PRICE, COL_CO2_TAX, TABLE_CCS_PRICE, TABLE_CO2_DAMAGE_PRICE,
    TABLE_CO2_TAX,
};
use rsiam_core::config::Validate;
use rsiam_core::discipline::{Discipline, TableDefinition};
use rsiam_core::engine::{CouplingInputs, Differentiable, Engine};
use rsiam_core::errors::RsiamResult;
use rsiam_core::jacobian::{self, Jacobian};
use rsiam_core::range_check::{check_finite, RangeCheck};
use rsiam_core::smooth::{smooth_maximum_rows, smooth_maximum_rows_gradient};
use rsiam_core::table::YearTable;
use rsiam_core::years::{FloatValue, YearRange};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyInput {
    Co2DamagePrice,
    CcsPrice,
}

impl PolicyInput {
    /// Column of the candidate matrix holding this signal
    fn candidate(&self) -> usize {
        match self {
            PolicyInput::Co2DamagePrice => 0,
            PolicyInput::CcsPrice => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyOutput {
    Co2Tax,
}

#[derive(Debug, Clone)]
pub struct PolicyInputs {
    /// unit: $/tCO2
    pub co2_damage_price: YearTable,
    /// unit: $/tCO2
    pub ccs_price: YearTable,
}

impl PolicyInputs {
    fn locate(&self, key: PolicyInput) -> (&YearTable, &'static str) {
        match key {
            PolicyInput::Co2DamagePrice => (&self.co2_damage_price, COL_CO2_DAMAGE_PRICE),
            PolicyInput::CcsPrice => (&self.ccs_price, COL_CCS_PRICE),
        }
    }
}

impl CouplingInputs for PolicyInputs {
    type Key = PolicyInput;

    fn series(&self, key: PolicyInput) -> RsiamResult<Array1<FloatValue>> {
        let (table, column) = self.locate(key);
        Ok(table.column(column)?.clone())
    }

    fn replacing(&self, key: PolicyInput, values: Array1<FloatValue>) -> RsiamResult<Self> {
        let (table, column) = self.locate(key);
        let table = table.replacing(column, values)?;
        let mut inputs = self.clone();
        match key {
            PolicyInput::Co2DamagePrice => inputs.co2_damage_price = table,
            PolicyInput::CcsPrice => inputs.ccs_price = table,
        }
        Ok(inputs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    years: YearRange,
    parameters: PolicyParameters,
    #[serde(default)]
    range_check: RangeCheck,
}

impl Policy {
    pub fn configure(years: YearRange, parameters: PolicyParameters) -> RsiamResult<Self> {
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

impl Engine for Policy {
    type Inputs = PolicyInputs;
    type Run = PolicyRun;

    fn compute(&self, inputs: &PolicyInputs) -> RsiamResult<PolicyRun> {
        debug!(nb_years = self.years.len(), "computing CO2 tax");
        if self.range_check == RangeCheck::Enabled {
            check_finite(&inputs.co2_damage_price)?;
            check_finite(&inputs.ccs_price)?;
        }
        let damage = inputs
            .co2_damage_price
            .aligned_column(&self.years, COL_CO2_DAMAGE_PRICE)?
            * self.parameters.co2_damage_weight();
        let ccs = inputs
            .ccs_price
            .aligned_column(&self.years, COL_CCS_PRICE)?
            * self.parameters.ccs_weight();
        let candidates = Array2::from_shape_fn((self.years.len(), 3), |(t, j)| match j {
            0 => damage[t],
            1 => ccs[t],
            _ => 0.0,
        });
        let alpha = self.parameters.smooth_max_alpha;
        let tax = smooth_maximum_rows(&candidates, alpha);
        let gradient = smooth_maximum_rows_gradient(&candidates, alpha);

        let co2_tax = YearTable::new(TABLE_CO2_TAX, &self.years).with_column(COL_CO2_TAX, tax)?;
        debug!("CO2 tax computed");
        Ok(PolicyRun {
            weights: [
                self.parameters.co2_damage_weight(),
                self.parameters.ccs_weight(),
            ],
            gradient,
            co2_tax,
        })
    }
}

#[typetag::serde]
impl Discipline for Policy {
    fn name(&self) -> String {
        "Policy".to_string()
    }

    fn definitions(&self) -> Vec<TableDefinition> {
        vec![
            TableDefinition::input(TABLE_CO2_DAMAGE_PRICE, &[COL_CO2_DAMAGE_PRICE], "$/tCO2"),
            TableDefinition::input(TABLE_CCS_PRICE, &[COL_CCS_PRICE], "$/tCO2"),
            TableDefinition::output(TABLE_CO2_TAX, &[COL_CO2_TAX], "$/tCO2"),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct PolicyRun {
    weights: [FloatValue; 2],
    /// Smooth-max gradient, one row per year and one column per candidate
    gradient: Array2<FloatValue>,
    pub co2_tax: YearTable,
}

impl Differentiable for PolicyRun {
    type Output = PolicyOutput;
    type Input = PolicyInput;

    fn series(&self, _output: PolicyOutput) -> RsiamResult<Array1<FloatValue>> {
        Ok(self.co2_tax.column(COL_CO2_TAX)?.clone())
    }

    fn jacobian(&self, _output: PolicyOutput, input: PolicyInput) -> RsiamResult<Jacobian> {
        let column = input.candidate();
        let slope = self.gradient.column(column).to_owned() * self.weights[column];
        Ok(jacobian::diagonal(slope.view()))
    }
}
