//! Energy redistribution between economic sectors.
//!
//! Each sector with an explicit share receives `share / 100` of total energy
//! production, as do the residential and "other" consumers. The deduced
//! sector gets what is left.

use crate::parameters::redistribution::RedistributionParameters;
use ndarray::Array1;
use rsiam_core::columns::{sector_table, COL_TOTAL_PRODUCTION, TABLE_ENERGY_PRODUCTION};
use rsiam_core::config::Validate;
use rsiam_core::discipline::{Discipline, RequirementType, TableDefinition};
use rsiam_core::engine::{CouplingInputs, Differentiable, Engine};
use rsiam_core::errors::{RsiamError, RsiamResult};
use rsiam_core::identifiers::Sector;
use rsiam_core::jacobian::{self, Jacobian};
use rsiam_core::range_check::{check_ranges, ColumnBounds, RangeCheck};
use rsiam_core::table::YearTable;
use rsiam_core::years::{FloatValue, YearRange};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Shares of total energy production, in percent, one column per consumer
pub const TABLE_ENERGY_SHARES: &str = "sectors_energy_share_df";
/// Energy delivered to every consumer
pub const TABLE_SECTORS_ENERGY: &str = "sectors_energy_df";
pub const TABLE_RESIDENTIAL_ENERGY: &str = "residential_energy_df";

pub const COL_RESIDENTIAL: &str = "residential";
pub const COL_OTHER: &str = "other";

/// A recipient of energy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnergyConsumer {
    Sector(Sector),
    Residential,
    Other,
}

impl EnergyConsumer {
    pub fn column(&self) -> &'static str {
        match self {
            EnergyConsumer::Sector(s) => s.name(),
            EnergyConsumer::Residential => COL_RESIDENTIAL,
            EnergyConsumer::Other => COL_OTHER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RedistributionInput {
    TotalProduction,
    Share(EnergyConsumer),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RedistributionOutput {
    Energy(EnergyConsumer),
}

#[derive(Debug, Clone)]
pub struct RedistributionInputs {
    /// Total energy production, `Total production` column
    pub energy_production: YearTable,
    /// Share of every consumer except the deduced sector
    pub shares: YearTable,
}

impl RedistributionInputs {
    fn locate(&self, key: RedistributionInput) -> (&YearTable, &'static str) {
        match key {
            RedistributionInput::TotalProduction => (&self.energy_production, COL_TOTAL_PRODUCTION),
            RedistributionInput::Share(consumer) => (&self.shares, consumer.column()),
        }
    }
}

impl CouplingInputs for RedistributionInputs {
    type Key = RedistributionInput;

    fn series(&self, key: RedistributionInput) -> RsiamResult<Array1<FloatValue>> {
        let (table, column) = self.locate(key);
        Ok(table.column(column)?.clone())
    }

    fn replacing(
        &self,
        key: RedistributionInput,
        values: Array1<FloatValue>,
    ) -> RsiamResult<Self> {
        let (table, column) = self.locate(key);
        let table = table.replacing(column, values)?;
        let mut inputs = self.clone();
        match key {
            RedistributionInput::TotalProduction => inputs.energy_production = table,
            RedistributionInput::Share(_) => inputs.shares = table,
        }
        Ok(inputs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyRedistribution {
    years: YearRange,
    parameters: RedistributionParameters,
    #[serde(default)]
    range_check: RangeCheck,
}

impl EnergyRedistribution {
    pub fn configure(years: YearRange, parameters: RedistributionParameters) -> RsiamResult<Self> {
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

    /// Consumers with an explicit share, in column order
    fn shared_consumers(&self) -> Vec<EnergyConsumer> {
        self.parameters
            .computed_sectors()
            .map(EnergyConsumer::Sector)
            .chain([EnergyConsumer::Residential, EnergyConsumer::Other])
            .collect()
    }
}

impl Engine for EnergyRedistribution {
    type Inputs = RedistributionInputs;
    type Run = RedistributionRun;

    fn compute(&self, inputs: &RedistributionInputs) -> RsiamResult<RedistributionRun> {
        debug!(nb_years = self.years.len(), "computing energy redistribution");
        let consumers = self.shared_consumers();
        if self.range_check == RangeCheck::Enabled {
            check_ranges(
                &inputs.energy_production,
                &[ColumnBounds::non_negative(COL_TOTAL_PRODUCTION)],
            )?;
            let bounds: Vec<ColumnBounds> = consumers
                .iter()
                .map(|c| ColumnBounds::new(c.column(), 0.0, 100.0))
                .collect();
            check_ranges(&inputs.shares, &bounds)?;
        }

        let total = inputs
            .energy_production
            .aligned_column(&self.years, COL_TOTAL_PRODUCTION)?;
        inputs.shares.validate_against(&self.years)?;

        let mut shares = Vec::with_capacity(consumers.len());
        let mut all = YearTable::new(TABLE_SECTORS_ENERGY, &self.years);
        let mut share_sum = Array1::zeros(self.years.len());
        for consumer in &consumers {
            let share = inputs.shares.column(consumer.column())?.clone();
            all.insert(consumer.column(), &share / 100.0 * &total)?;
            share_sum += &share;
            shares.push((*consumer, share));
        }

        let deduced = (1.0 - &share_sum / 100.0) * &total;
        if let Some(i) = deduced.iter().position(|v| *v < 0.0) {
            return Err(RsiamError::Domain {
                quantity: format!("{} energy", self.parameters.deduced_sector),
                year: self.years.year_at(i),
                value: deduced[i],
                reason: "explicit energy shares exceed 100%".to_string(),
            });
        }
        all.insert(self.parameters.deduced_sector.name(), deduced)?;

        debug!("energy redistribution computed");
        Ok(RedistributionRun {
            deduced_sector: self.parameters.deduced_sector,
            total,
            share_sum,
            shares,
            sectors_energy: all,
        })
    }
}

#[typetag::serde]
impl Discipline for EnergyRedistribution {
    fn name(&self) -> String {
        "EnergyRedistribution".to_string()
    }

    fn definitions(&self) -> Vec<TableDefinition> {
        let consumers = self.shared_consumers();
        let share_columns = consumers.iter().map(|c| c.column().to_string()).collect();
        let mut all_columns: Vec<String> = self
            .parameters
            .sectors
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        all_columns.extend([COL_RESIDENTIAL.to_string(), COL_OTHER.to_string()]);

        let mut definitions = vec![
            TableDefinition::input(TABLE_ENERGY_PRODUCTION, &[COL_TOTAL_PRODUCTION], "PWh"),
            TableDefinition::with_columns(
                TABLE_ENERGY_SHARES,
                share_columns,
                "%",
                RequirementType::Input,
            ),
            TableDefinition::with_columns(
                TABLE_SECTORS_ENERGY,
                all_columns,
                "PWh",
                RequirementType::Output,
            ),
            TableDefinition::output(TABLE_RESIDENTIAL_ENERGY, &[COL_TOTAL_PRODUCTION], "PWh"),
        ];
        for sector in &self.parameters.sectors {
            definitions.push(TableDefinition::output(
                &sector_table(sector.name(), TABLE_ENERGY_PRODUCTION),
                &[COL_TOTAL_PRODUCTION],
                "PWh",
            ));
        }
        definitions
    }
}

#[derive(Debug, Clone)]
pub struct RedistributionRun {
    deduced_sector: Sector,
    total: Array1<FloatValue>,
    share_sum: Array1<FloatValue>,
    shares: Vec<(EnergyConsumer, Array1<FloatValue>)>,
    /// One column per consumer, deduced sector included
    pub sectors_energy: YearTable,
}

impl RedistributionRun {
    /// Energy production table of `sector`, the input of its sector engine
    pub fn sector_energy(&self, sector: Sector) -> RsiamResult<YearTable> {
        let values = self.sectors_energy.column(sector.name())?.clone();
        YearTable::from_years(
            &sector_table(sector.name(), TABLE_ENERGY_PRODUCTION),
            self.sectors_energy.years().to_vec(),
        )?
        .with_column(COL_TOTAL_PRODUCTION, values)
    }

    pub fn residential_energy(&self) -> RsiamResult<YearTable> {
        let values = self.sectors_energy.column(COL_RESIDENTIAL)?.clone();
        YearTable::from_years(TABLE_RESIDENTIAL_ENERGY, self.sectors_energy.years().to_vec())?
            .with_column(COL_TOTAL_PRODUCTION, values)
    }

    fn share(&self, consumer: EnergyConsumer) -> Option<&Array1<FloatValue>> {
        self.shares
            .iter()
            .find(|(c, _)| *c == consumer)
            .map(|(_, s)| s)
    }

    fn unsupported(output: RedistributionOutput, input: RedistributionInput) -> RsiamError {
        RsiamError::UnsupportedJacobian {
            output: format!("{:?}", output),
            input: format!("{:?}", input),
        }
    }
}

impl Differentiable for RedistributionRun {
    type Output = RedistributionOutput;
    type Input = RedistributionInput;

    fn series(&self, output: RedistributionOutput) -> RsiamResult<Array1<FloatValue>> {
        let RedistributionOutput::Energy(consumer) = output;
        Ok(self.sectors_energy.column(consumer.column())?.clone())
    }

    fn jacobian(
        &self,
        output: RedistributionOutput,
        input: RedistributionInput,
    ) -> RsiamResult<Jacobian> {
        let RedistributionOutput::Energy(consumer) = output;
        let n = self.total.len();
        let deduced = EnergyConsumer::Sector(self.deduced_sector);

        if let RedistributionInput::Share(source) = input {
            if self.share(source).is_none() {
                return Err(Self::unsupported(output, input));
            }
        }

        if consumer == deduced {
            return Ok(match input {
                RedistributionInput::TotalProduction => {
                    jacobian::diagonal((1.0 - &self.share_sum / 100.0).view())
                }
                RedistributionInput::Share(_) => jacobian::diagonal((&self.total / -100.0).view()),
            });
        }

        let share = self
            .share(consumer)
            .ok_or_else(|| Self::unsupported(output, input))?;
        Ok(match input {
            RedistributionInput::TotalProduction => jacobian::diagonal((share / 100.0).view()),
            RedistributionInput::Share(source) if source == consumer => {
                jacobian::diagonal((&self.total / 100.0).view())
            }
            RedistributionInput::Share(_) => jacobian::zeros(n),
        })
    }
}
