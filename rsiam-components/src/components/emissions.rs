//! Greenhouse gas emissions aggregation.
//!
//! Per gas, land, industry and energy emissions are summed into total
//! emissions and weighted by their global warming potentials.
//!
//! Bottom-up, every economic section emits
//! $$ E^{energy}_s = C_s \cdot \frac{\sum_g GWP^{100}_g E_g}{P} $$
//! from its energy consumption $C_s$ and the carbon intensity of the energy
//! mix, plus $E^{non\,energy}_s = I_s \cdot GDP_s / 1000$ from its GDP.
//! Sections roll up into sectors and sectors into the whole economy.
//!
//! The CO2 objective is a regularised absolute value of the mean CO2
//! emissions of the energy sector, offset by a reference:
//! $$ \frac{\sqrt{(ref + \bar{E})^2 + \epsilon^2} - \epsilon}{2 ref} $$

use crate::parameters::emissions::EmissionsParameters;
use ndarray::{Array1, Array2};
use rsiam_core::columns::{
    gwp_emissions, land_emissions, land_emissions_table, sector_table, total_emissions,
    COL_CO2_TOTAL_EMISSIONS, COL_TOTAL_PRODUCTION, TABLE_CO2_EMISSIONS, TABLE_ENERGY_PRODUCTION,
    TABLE_GHG_EMISSIONS, TABLE_GHG_ENERGY_EMISSIONS,
};
use rsiam_core::config::Validate;
use rsiam_core::discipline::{Discipline, RequirementType, TableDefinition};
use rsiam_core::engine::{CouplingInputs, Differentiable, Engine};
use rsiam_core::errors::{RsiamError, RsiamResult};
use rsiam_core::identifiers::{Gas, GwpHorizon, PerGas, Section, Sector};
use rsiam_core::jacobian::{self, Jacobian};
use rsiam_core::range_check::{check_ranges, ColumnBounds, RangeCheck};
use rsiam_core::table::YearTable;
use rsiam_core::years::{FloatValue, YearRange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

pub const TABLE_GWP_EMISSIONS: &str = "GWP_emissions";
pub const TABLE_TOTAL_ENERGY_CO2EQ: &str = "total_energy_co2eq_emissions";
pub const COL_TOTAL_ENERGY_EMISSIONS: &str = "Total Energy emissions";
pub const TABLE_CARBON_INTENSITY: &str = "energy_carbon_intensity_df";
pub const COL_CARBON_INTENSITY: &str = "energy_carbon_intensity";

pub const TABLE_SECTION_ENERGY_CONSUMPTION: &str = "section_energy_consumption_df";
pub const TABLE_SECTION_NON_ENERGY_INTENSITY: &str = "section_non_energy_emission_gdp_df";
pub const TABLE_SECTION_GDP: &str = "section_gdp_df";

pub const TABLE_SECTION_ENERGY_EMISSIONS: &str = "section_energy_emission_df";
pub const TABLE_SECTION_NON_ENERGY_EMISSIONS: &str = "section_non_energy_emission_df";
pub const TABLE_SECTION_EMISSIONS: &str = "section_emission_df";
pub const TABLE_SECTOR_EMISSIONS: &str = "emission_df";
pub const TABLE_ECONOMY_EMISSIONS: &str = "economics_emissions_total_df";

/// GtCO2eq per T$ of GDP for an intensity in tCO2eq / M$
const GDP_INTENSITY_SCALE: FloatValue = 1e3;

fn industry_emissions(gas: Gas) -> String {
    format!("{} industry_emissions", gas)
}

fn energy_emissions(gas: Gas) -> String {
    format!("{} energy_emissions", gas)
}

/// Which part of the emissions of a section, sector or economy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EmissionKind {
    Energy,
    NonEnergy,
    Total,
}

impl EmissionKind {
    pub const ALL: [EmissionKind; 3] = [
        EmissionKind::Energy,
        EmissionKind::NonEnergy,
        EmissionKind::Total,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            EmissionKind::Energy => "energy_emissions",
            EmissionKind::NonEnergy => "non_energy_emissions",
            EmissionKind::Total => "total_emissions",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmissionsInput {
    /// A column of the land emissions table of a gas, by position
    Land(Gas, usize),
    /// `Total {gas} emissions` of the energy sector
    Energy(Gas),
    /// Total energy production
    Production,
    SectionEnergyConsumption(Section),
    SectionNonEnergyIntensity(Section),
    SectionGdp(Section),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmissionsOutput {
    LandEmissions(Gas),
    TotalEmissions(Gas),
    Gwp(Gas, GwpHorizon),
    /// Single value
    Co2Objective,
    TotalEnergyCo2Eq,
    CarbonIntensity,
    Section(Section, EmissionKind),
    Sector(Sector, EmissionKind),
    Economy(EmissionKind),
}

/// Section-level inputs of one sector, one column per section
#[derive(Debug, Clone)]
pub struct SectionTables {
    /// unit: PWh
    pub energy_consumption: YearTable,
    /// unit: tCO2eq / M$
    pub non_energy_intensity: YearTable,
    /// unit: T$
    pub gdp: YearTable,
}

#[derive(Debug, Clone)]
pub struct EmissionsInputs {
    /// Land emissions per gas; every column is summed
    pub land: PerGas<YearTable>,
    /// Energy sector emissions, `Total {gas} emissions` columns
    pub energy_emissions: YearTable,
    pub energy_production: YearTable,
    pub sections: BTreeMap<Sector, SectionTables>,
}

impl EmissionsInputs {
    fn section_tables(&self, section: Section) -> RsiamResult<&SectionTables> {
        let sector = section.sector();
        self.sections.get(&sector).ok_or_else(|| {
            RsiamError::MissingInput(sector_table(sector.name(), TABLE_SECTION_GDP))
        })
    }

    fn locate(&self, key: EmissionsInput) -> RsiamResult<(&YearTable, String)> {
        Ok(match key {
            EmissionsInput::Land(gas, position) => {
                let table = self.land.get(gas);
                let column = table.column_names().nth(position).ok_or_else(|| {
                    RsiamError::MissingColumn {
                        table: table.name().to_string(),
                        column: format!("#{}", position),
                    }
                })?;
                (table, column.to_string())
            }
            EmissionsInput::Energy(gas) => (&self.energy_emissions, total_emissions(gas)),
            EmissionsInput::Production => {
                (&self.energy_production, COL_TOTAL_PRODUCTION.to_string())
            }
            EmissionsInput::SectionEnergyConsumption(section) => (
                &self.section_tables(section)?.energy_consumption,
                section.name().to_string(),
            ),
            EmissionsInput::SectionNonEnergyIntensity(section) => (
                &self.section_tables(section)?.non_energy_intensity,
                section.name().to_string(),
            ),
            EmissionsInput::SectionGdp(section) => {
                (&self.section_tables(section)?.gdp, section.name().to_string())
            }
        })
    }

    fn section_tables_mut(&mut self, section: Section) -> RsiamResult<&mut SectionTables> {
        let sector = section.sector();
        self.sections.get_mut(&sector).ok_or_else(|| {
            RsiamError::MissingInput(sector_table(sector.name(), TABLE_SECTION_GDP))
        })
    }

    fn table_mut(&mut self, key: EmissionsInput) -> RsiamResult<&mut YearTable> {
        Ok(match key {
            EmissionsInput::Land(gas, _) => self.land.get_mut(gas),
            EmissionsInput::Energy(_) => &mut self.energy_emissions,
            EmissionsInput::Production => &mut self.energy_production,
            EmissionsInput::SectionEnergyConsumption(s) => {
                &mut self.section_tables_mut(s)?.energy_consumption
            }
            EmissionsInput::SectionNonEnergyIntensity(s) => {
                &mut self.section_tables_mut(s)?.non_energy_intensity
            }
            EmissionsInput::SectionGdp(s) => &mut self.section_tables_mut(s)?.gdp,
        })
    }
}

impl CouplingInputs for EmissionsInputs {
    type Key = EmissionsInput;

    fn series(&self, key: EmissionsInput) -> RsiamResult<Array1<FloatValue>> {
        let (table, column) = self.locate(key)?;
        Ok(table.column(&column)?.clone())
    }

    fn replacing(&self, key: EmissionsInput, values: Array1<FloatValue>) -> RsiamResult<Self> {
        let column = self.locate(key)?.1;
        let mut inputs = self.clone();
        let table = inputs.table_mut(key)?;
        *table = table.replacing(&column, values)?;
        Ok(inputs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmissionsAggregation {
    years: YearRange,
    parameters: EmissionsParameters,
    #[serde(default)]
    range_check: RangeCheck,
}

impl EmissionsAggregation {
    pub fn configure(years: YearRange, parameters: EmissionsParameters) -> RsiamResult<Self> {
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

    /// CO2 objective and its derivative with respect to the mean CO2 emissions
    pub fn co2_objective(&self, mean_co2: FloatValue) -> (FloatValue, FloatValue) {
        let p = &self.parameters;
        let reference = p.co2_emissions_ref;
        if p.affine_co2_objective {
            (
                (10.0 * reference + mean_co2) / (20.0 * reference),
                1.0 / (20.0 * reference),
            )
        } else {
            let offset = reference + mean_co2;
            let root = (offset.powi(2) + p.epsilon.powi(2)).sqrt();
            ((root - p.epsilon) / (2.0 * reference), offset / root / (2.0 * reference))
        }
    }

    fn section(
        &self,
        tables: &SectionTables,
        section: Section,
        carbon_intensity: &Array1<FloatValue>,
    ) -> RsiamResult<SectionState> {
        let consumption = tables
            .energy_consumption
            .aligned_column(&self.years, section.name())?;
        let intensity = tables
            .non_energy_intensity
            .aligned_column(&self.years, section.name())?;
        let gdp = tables.gdp.aligned_column(&self.years, section.name())?;
        let energy = &consumption * carbon_intensity;
        let non_energy = &intensity * &gdp / GDP_INTENSITY_SCALE;
        Ok(SectionState {
            consumption,
            intensity,
            gdp,
            energy,
            non_energy,
        })
    }
}

impl Engine for EmissionsAggregation {
    type Inputs = EmissionsInputs;
    type Run = EmissionsRun;

    fn compute(&self, inputs: &EmissionsInputs) -> RsiamResult<EmissionsRun> {
        let p = &self.parameters;
        let n = self.years.len();
        debug!(nb_years = n, "computing emissions aggregation");

        if self.range_check == RangeCheck::Enabled {
            check_ranges(
                &inputs.energy_production,
                &[ColumnBounds::non_negative(COL_TOTAL_PRODUCTION)],
            )?;
        }

        let mut ghg_emissions = YearTable::new(TABLE_GHG_EMISSIONS, &self.years);
        let mut gwp = YearTable::new(TABLE_GWP_EMISSIONS, &self.years);
        let mut land = PerGas::<Array1<FloatValue>>::default();
        let mut energy = PerGas::<Array1<FloatValue>>::default();
        let mut land_columns = PerGas::<usize>::default();
        for gas in Gas::ALL {
            let land_table = inputs.land.get(gas);
            land_table.validate_against(&self.years)?;
            let land_gas = land_table.sum_columns();
            let energy_gas = inputs
                .energy_emissions
                .aligned_column(&self.years, &total_emissions(gas))?;
            let total = &land_gas + &energy_gas;

            ghg_emissions.insert(&land_emissions(gas), land_gas.clone())?;
            ghg_emissions.insert(&industry_emissions(gas), Array1::zeros(n))?;
            ghg_emissions.insert(&energy_emissions(gas), energy_gas.clone())?;
            for horizon in [GwpHorizon::Twenty, GwpHorizon::Hundred] {
                gwp.insert(&gwp_emissions(gas, horizon), &total * p.gwp(gas, horizon))?;
            }
            ghg_emissions.insert(&total_emissions(gas), total)?;

            *land_columns.get_mut(gas) = land_table.column_names().count();
            *land.get_mut(gas) = land_gas;
            *energy.get_mut(gas) = energy_gas;
        }

        let co2_emissions = YearTable::new(TABLE_CO2_EMISSIONS, &self.years).with_column(
            COL_CO2_TOTAL_EMISSIONS,
            ghg_emissions.column(&total_emissions(Gas::CO2))?.clone(),
        )?;

        let mean_co2 = energy.co2.mean().unwrap_or(0.0);
        let (co2_objective, dobjective_dmean) = self.co2_objective(mean_co2);
        if !(co2_objective.is_finite() && dobjective_dmean.is_finite()) {
            return Err(RsiamError::NonFinite {
                quantity: "co2_objective".to_string(),
                year: self.years.year_start(),
            });
        }

        let co2eq = Gas::ALL
            .iter()
            .fold(Array1::zeros(n), |acc, gas| acc + energy.get(*gas) * *p.gwp_100.get(*gas));
        let production = inputs
            .energy_production
            .aligned_column(&self.years, COL_TOTAL_PRODUCTION)?;
        if let Some(i) = production.iter().position(|v| *v == 0.0) {
            return Err(RsiamError::DivisionByZero {
                quantity: COL_CARBON_INTENSITY.to_string(),
                year: self.years.year_at(i),
            });
        }
        let carbon_intensity = &co2eq / &production;

        let mut sections = BTreeMap::new();
        let mut sector_tables = BTreeMap::new();
        let mut economy = BTreeMap::new();
        for kind in EmissionKind::ALL {
            economy.insert(kind, Array1::<FloatValue>::zeros(n));
        }
        for sector in &p.sectors {
            let tables = inputs.sections.get(sector).ok_or_else(|| {
                RsiamError::MissingInput(sector_table(sector.name(), TABLE_SECTION_GDP))
            })?;
            let name = sector.name();
            let mut section_energy = YearTable::new(
                &sector_table(name, TABLE_SECTION_ENERGY_EMISSIONS),
                &self.years,
            );
            let mut section_non_energy = YearTable::new(
                &sector_table(name, TABLE_SECTION_NON_ENERGY_EMISSIONS),
                &self.years,
            );
            let mut section_total =
                YearTable::new(&sector_table(name, TABLE_SECTION_EMISSIONS), &self.years);
            let mut sector_energy = Array1::zeros(n);
            let mut sector_non_energy = Array1::zeros(n);

            for section in sector.sections() {
                let state = self.section(tables, *section, &carbon_intensity)?;
                section_energy.insert(section.name(), state.energy.clone())?;
                section_non_energy.insert(section.name(), state.non_energy.clone())?;
                section_total.insert(section.name(), &state.energy + &state.non_energy)?;
                sector_energy += &state.energy;
                sector_non_energy += &state.non_energy;
                sections.insert(*section, state);
            }

            let sector_total = &sector_energy + &sector_non_energy;
            let sector_emissions =
                YearTable::new(&sector_table(name, TABLE_SECTOR_EMISSIONS), &self.years)
                    .with_column(EmissionKind::Energy.column(), sector_energy)?
                    .with_column(EmissionKind::NonEnergy.column(), sector_non_energy)?
                    .with_column(EmissionKind::Total.column(), sector_total)?;
            for kind in EmissionKind::ALL {
                if let Some(acc) = economy.get_mut(&kind) {
                    *acc += sector_emissions.column(kind.column())?;
                }
            }
            sector_tables.insert(
                *sector,
                SectorEmissionTables {
                    section_energy,
                    section_non_energy,
                    section_total,
                    sector: sector_emissions,
                },
            );
        }

        let mut economy_emissions = YearTable::new(TABLE_ECONOMY_EMISSIONS, &self.years);
        for (kind, values) in economy {
            economy_emissions.insert(kind.column(), values)?;
        }

        let total_energy_co2eq = YearTable::new(TABLE_TOTAL_ENERGY_CO2EQ, &self.years)
            .with_column(COL_TOTAL_ENERGY_EMISSIONS, co2eq.clone())?;
        let carbon_intensity_table = YearTable::new(TABLE_CARBON_INTENSITY, &self.years)
            .with_column(COL_CARBON_INTENSITY, carbon_intensity.clone())?;

        debug!(co2_objective, "emissions aggregation computed");
        Ok(EmissionsRun {
            parameters: p.clone(),
            n,
            land_columns,
            production,
            co2eq,
            carbon_intensity,
            dobjective_dmean,
            sections,
            ghg_emissions,
            gwp_emissions: gwp,
            co2_emissions,
            co2_objective,
            total_energy_co2eq,
            carbon_intensity_table,
            sector_tables,
            economy_emissions,
        })
    }
}

#[typetag::serde]
impl Discipline for EmissionsAggregation {
    fn name(&self) -> String {
        "EmissionsAggregation".to_string()
    }

    fn definitions(&self) -> Vec<TableDefinition> {
        let mut ghg_columns = vec![];
        let mut gwp_columns = vec![];
        let mut definitions = vec![];
        for gas in Gas::ALL {
            definitions.push(TableDefinition::with_columns(
                &land_emissions_table(gas),
                vec![],
                "Gt",
                RequirementType::Input,
            ));
            ghg_columns.extend([
                land_emissions(gas),
                industry_emissions(gas),
                energy_emissions(gas),
                total_emissions(gas),
            ]);
            gwp_columns.extend([
                gwp_emissions(gas, GwpHorizon::Twenty),
                gwp_emissions(gas, GwpHorizon::Hundred),
            ]);
        }
        let energy_columns = Gas::ALL.iter().map(|g| total_emissions(*g)).collect();
        definitions.extend([
            TableDefinition::with_columns(
                TABLE_GHG_ENERGY_EMISSIONS,
                energy_columns,
                "Gt",
                RequirementType::Input,
            ),
            TableDefinition::input(TABLE_ENERGY_PRODUCTION, &[COL_TOTAL_PRODUCTION], "PWh"),
            TableDefinition::with_columns(
                TABLE_GHG_EMISSIONS,
                ghg_columns,
                "Gt",
                RequirementType::Output,
            ),
            TableDefinition::with_columns(
                TABLE_GWP_EMISSIONS,
                gwp_columns,
                "GtCO2eq",
                RequirementType::Output,
            ),
            TableDefinition::output(TABLE_CO2_EMISSIONS, &[COL_CO2_TOTAL_EMISSIONS], "Gt"),
            TableDefinition::output(
                TABLE_TOTAL_ENERGY_CO2EQ,
                &[COL_TOTAL_ENERGY_EMISSIONS],
                "GtCO2eq",
            ),
            TableDefinition::output(
                TABLE_CARBON_INTENSITY,
                &[COL_CARBON_INTENSITY],
                "kgCO2eq / kWh",
            ),
            TableDefinition::output(
                TABLE_ECONOMY_EMISSIONS,
                &[
                    EmissionKind::Energy.column(),
                    EmissionKind::NonEnergy.column(),
                    EmissionKind::Total.column(),
                ],
                "GtCO2eq",
            ),
        ]);

        for sector in &self.parameters.sectors {
            let name = sector.name();
            let sections: Vec<String> = sector
                .sections()
                .iter()
                .map(|s| s.name().to_string())
                .collect();
            for (table, unit) in [
                (TABLE_SECTION_ENERGY_CONSUMPTION, "PWh"),
                (TABLE_SECTION_NON_ENERGY_INTENSITY, "tCO2eq / M$"),
                (TABLE_SECTION_GDP, "T$"),
            ] {
                definitions.push(TableDefinition::with_columns(
                    &sector_table(name, table),
                    sections.clone(),
                    unit,
                    RequirementType::Input,
                ));
            }
            for table in [
                TABLE_SECTION_ENERGY_EMISSIONS,
                TABLE_SECTION_NON_ENERGY_EMISSIONS,
                TABLE_SECTION_EMISSIONS,
            ] {
                definitions.push(TableDefinition::with_columns(
                    &sector_table(name, table),
                    sections.clone(),
                    "GtCO2eq",
                    RequirementType::Output,
                ));
            }
            definitions.push(TableDefinition::output(
                &sector_table(name, TABLE_SECTOR_EMISSIONS),
                &[
                    EmissionKind::Energy.column(),
                    EmissionKind::NonEnergy.column(),
                    EmissionKind::Total.column(),
                ],
                "GtCO2eq",
            ));
        }
        definitions
    }
}

#[derive(Debug, Clone)]
struct SectionState {
    consumption: Array1<FloatValue>,
    intensity: Array1<FloatValue>,
    gdp: Array1<FloatValue>,
    energy: Array1<FloatValue>,
    non_energy: Array1<FloatValue>,
}

/// Section and sector tables published for one sector
#[derive(Debug, Clone)]
pub struct SectorEmissionTables {
    pub section_energy: YearTable,
    pub section_non_energy: YearTable,
    pub section_total: YearTable,
    /// `energy_emissions`, `non_energy_emissions`, `total_emissions`
    pub sector: YearTable,
}

#[derive(Debug, Clone)]
pub struct EmissionsRun {
    parameters: EmissionsParameters,
    n: usize,
    land_columns: PerGas<usize>,
    production: Array1<FloatValue>,
    co2eq: Array1<FloatValue>,
    carbon_intensity: Array1<FloatValue>,
    dobjective_dmean: FloatValue,
    sections: BTreeMap<Section, SectionState>,
    pub ghg_emissions: YearTable,
    pub gwp_emissions: YearTable,
    /// Total CO2 emissions consumed by the carbon cycle
    pub co2_emissions: YearTable,
    pub co2_objective: FloatValue,
    pub total_energy_co2eq: YearTable,
    pub carbon_intensity_table: YearTable,
    pub sector_tables: BTreeMap<Sector, SectorEmissionTables>,
    pub economy_emissions: YearTable,
}

impl EmissionsRun {
    fn section_state(&self, section: Section) -> RsiamResult<&SectionState> {
        self.sections.get(&section).ok_or_else(|| {
            RsiamError::MissingInput(sector_table(section.sector().name(), TABLE_SECTION_GDP))
        })
    }

    fn configured(&self, sector: Sector) -> RsiamResult<()> {
        if self.parameters.sectors.contains(&sector) {
            Ok(())
        } else {
            Err(RsiamError::MissingInput(sector_table(
                sector.name(),
                TABLE_SECTION_GDP,
            )))
        }
    }

    /// d total emissions of `gas` / d input
    fn dtotal(&self, gas: Gas, input: EmissionsInput) -> Jacobian {
        match input {
            EmissionsInput::Land(g, _) | EmissionsInput::Energy(g) if g == gas => {
                jacobian::identity(self.n)
            }
            _ => jacobian::zeros(self.n),
        }
    }

    fn dcarbon_intensity(&self, input: EmissionsInput) -> Jacobian {
        match input {
            EmissionsInput::Production => {
                jacobian::diagonal((-&self.co2eq / &self.production.mapv(|p| p * p)).view())
            }
            EmissionsInput::Energy(gas) => jacobian::diagonal(
                (self.production.mapv(|p| 1.0 / p) * *self.parameters.gwp_100.get(gas)).view(),
            ),
            _ => jacobian::zeros(self.n),
        }
    }

    fn dsection(
        &self,
        section: Section,
        kind: EmissionKind,
        input: EmissionsInput,
    ) -> RsiamResult<Jacobian> {
        let state = self.section_state(section)?;
        Ok(match kind {
            EmissionKind::Energy => match input {
                EmissionsInput::Production | EmissionsInput::Energy(_) => {
                    jacobian::scale_rows(state.consumption.view(), &self.dcarbon_intensity(input))
                }
                EmissionsInput::SectionEnergyConsumption(s) if s == section => {
                    jacobian::diagonal(self.carbon_intensity.view())
                }
                _ => jacobian::zeros(self.n),
            },
            EmissionKind::NonEnergy => match input {
                EmissionsInput::SectionNonEnergyIntensity(s) if s == section => {
                    jacobian::diagonal((&state.gdp / GDP_INTENSITY_SCALE).view())
                }
                EmissionsInput::SectionGdp(s) if s == section => {
                    jacobian::diagonal((&state.intensity / GDP_INTENSITY_SCALE).view())
                }
                _ => jacobian::zeros(self.n),
            },
            EmissionKind::Total => {
                self.dsection(section, EmissionKind::Energy, input)?
                    + self.dsection(section, EmissionKind::NonEnergy, input)?
            }
        })
    }

    fn dsector(&self, sector: Sector, kind: EmissionKind, input: EmissionsInput) -> RsiamResult<Jacobian> {
        self.configured(sector)?;
        let mut jac = jacobian::zeros(self.n);
        for section in sector.sections() {
            jac += &self.dsection(*section, kind, input)?;
        }
        Ok(jac)
    }

    fn check_input(&self, input: EmissionsInput) -> RsiamResult<()> {
        match input {
            EmissionsInput::Land(gas, position) if position >= *self.land_columns.get(gas) => {
                Err(RsiamError::MissingColumn {
                    table: land_emissions_table(gas),
                    column: format!("#{}", position),
                })
            }
            EmissionsInput::SectionEnergyConsumption(s)
            | EmissionsInput::SectionNonEnergyIntensity(s)
            | EmissionsInput::SectionGdp(s) => self.section_state(s).map(|_| ()),
            _ => Ok(()),
        }
    }
}

impl Differentiable for EmissionsRun {
    type Output = EmissionsOutput;
    type Input = EmissionsInput;

    fn series(&self, output: EmissionsOutput) -> RsiamResult<Array1<FloatValue>> {
        let values = match output {
            EmissionsOutput::LandEmissions(gas) => self.ghg_emissions.column(&land_emissions(gas))?,
            EmissionsOutput::TotalEmissions(gas) => {
                self.ghg_emissions.column(&total_emissions(gas))?
            }
            EmissionsOutput::Gwp(gas, horizon) => {
                self.gwp_emissions.column(&gwp_emissions(gas, horizon))?
            }
            EmissionsOutput::Co2Objective => return Ok(Array1::from_elem(1, self.co2_objective)),
            EmissionsOutput::TotalEnergyCo2Eq => &self.co2eq,
            EmissionsOutput::CarbonIntensity => &self.carbon_intensity,
            EmissionsOutput::Section(section, kind) => {
                let state = self.section_state(section)?;
                return Ok(match kind {
                    EmissionKind::Energy => state.energy.clone(),
                    EmissionKind::NonEnergy => state.non_energy.clone(),
                    EmissionKind::Total => &state.energy + &state.non_energy,
                });
            }
            EmissionsOutput::Sector(sector, kind) => {
                self.configured(sector)?;
                self.sector_tables
                    .get(&sector)
                    .map(|t| t.sector.column(kind.column()))
                    .ok_or_else(|| RsiamError::MissingInput(sector.name().to_string()))??
            }
            EmissionsOutput::Economy(kind) => self.economy_emissions.column(kind.column())?,
        };
        Ok(values.clone())
    }

    fn jacobian(&self, output: EmissionsOutput, input: EmissionsInput) -> RsiamResult<Jacobian> {
        self.check_input(input)?;
        let n = self.n;
        let gwp = |gas: Gas, horizon: GwpHorizon| self.parameters.gwp(gas, horizon);
        Ok(match output {
            EmissionsOutput::LandEmissions(gas) => match input {
                EmissionsInput::Land(g, _) if g == gas => jacobian::identity(n),
                _ => jacobian::zeros(n),
            },
            EmissionsOutput::TotalEmissions(gas) => self.dtotal(gas, input),
            EmissionsOutput::Gwp(gas, horizon) => self.dtotal(gas, input) * gwp(gas, horizon),
            EmissionsOutput::Co2Objective => match input {
                EmissionsInput::Energy(Gas::CO2) => jacobian::as_row(Array1::from_elem(
                    n,
                    self.dobjective_dmean / n as FloatValue,
                )),
                _ => Array2::zeros((1, n)),
            },
            EmissionsOutput::TotalEnergyCo2Eq => match input {
                EmissionsInput::Energy(gas) => {
                    jacobian::scaled_identity(n, gwp(gas, GwpHorizon::Hundred))
                }
                _ => jacobian::zeros(n),
            },
            EmissionsOutput::CarbonIntensity => self.dcarbon_intensity(input),
            EmissionsOutput::Section(section, kind) => self.dsection(section, kind, input)?,
            EmissionsOutput::Sector(sector, kind) => self.dsector(sector, kind, input)?,
            EmissionsOutput::Economy(kind) => {
                let mut jac = jacobian::zeros(n);
                for sector in &self.parameters.sectors {
                    jac += &self.dsector(*sector, kind, input)?;
                }
                jac
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use is_close::is_close;
    use ndarray::array;
    use rsiam_core::jacobian_check::{check_engine, FiniteDifference, Tolerance};

    fn years() -> YearRange {
        YearRange::new(2020, 2023, 1).unwrap()
    }

    fn table(name: &str, columns: &[(&str, Array1<FloatValue>)]) -> YearTable {
        let mut table = YearTable::new(name, &years());
        for (column, values) in columns {
            table.insert(column, values.clone()).unwrap();
        }
        table
    }

    fn section_tables(sector: Sector) -> SectionTables {
        let sections = sector.sections();
        let build = |name: &str, base: FloatValue| {
            let mut t = YearTable::new(&sector_table(sector.name(), name), &years());
            for (k, section) in sections.iter().enumerate() {
                let v = base * (1.0 + k as FloatValue * 0.1);
                t.insert(section.name(), array![v, v * 1.02, v * 1.05, v * 1.1])
                    .unwrap();
            }
            t
        };
        SectionTables {
            energy_consumption: build(TABLE_SECTION_ENERGY_CONSUMPTION, 3.0),
            non_energy_intensity: build(TABLE_SECTION_NON_ENERGY_INTENSITY, 50.0),
            gdp: build(TABLE_SECTION_GDP, 4.0),
        }
    }

    fn inputs() -> EmissionsInputs {
        EmissionsInputs {
            land: PerGas::new(
                table(
                    &land_emissions_table(Gas::CO2),
                    &[
                        ("Forest", array![-1.0, -1.2, -1.5, -1.8]),
                        ("Crop", array![3.0, 3.1, 3.2, 3.3]),
                    ],
                ),
                table(
                    &land_emissions_table(Gas::CH4),
                    &[("Crop", array![0.1, 0.11, 0.12, 0.13])],
                ),
                table(
                    &land_emissions_table(Gas::N2O),
                    &[("Crop", array![0.005, 0.005, 0.006, 0.006])],
                ),
            ),
            energy_emissions: table(
                TABLE_GHG_ENERGY_EMISSIONS,
                &[
                    ("Total CO2 emissions", array![35.0, 34.0, 33.0, 30.0]),
                    ("Total CH4 emissions", array![0.12, 0.12, 0.11, 0.1]),
                    ("Total N2O emissions", array![0.002, 0.002, 0.002, 0.002]),
                ],
            ),
            energy_production: table(
                TABLE_ENERGY_PRODUCTION,
                &[(COL_TOTAL_PRODUCTION, array![160.0, 165.0, 170.0, 175.0])],
            ),
            sections: Sector::ALL
                .iter()
                .map(|s| (*s, section_tables(*s)))
                .collect(),
        }
    }

    fn engine(parameters: EmissionsParameters) -> EmissionsAggregation {
        EmissionsAggregation::configure(years(), parameters).unwrap()
    }

    #[test]
    fn totals_and_gwp() {
        let run = engine(EmissionsParameters::default())
            .compute(&inputs())
            .unwrap();
        let co2 = run.ghg_emissions.column("Total CO2 emissions").unwrap();
        assert!(is_close!(co2[0], 35.0 + 2.0));
        let ch4_20 = run.gwp_emissions.column("CH4_20").unwrap();
        assert!(is_close!(ch4_20[1], (0.11 + 0.12) * 85.0));
        assert_eq!(
            run.co2_emissions.column(COL_CO2_TOTAL_EMISSIONS).unwrap(),
            co2
        );
        assert!(run
            .ghg_emissions
            .column("N2O industry_emissions")
            .unwrap()
            .iter()
            .all(|v| *v == 0.0));
    }

    #[test]
    fn carbon_intensity_uses_gwp_100() {
        let run = engine(EmissionsParameters::default())
            .compute(&inputs())
            .unwrap();
        let ci = run.carbon_intensity_table.column(COL_CARBON_INTENSITY).unwrap();
        assert_relative_eq!(
            ci[0],
            (35.0 + 0.12 * 28.0 + 0.002 * 265.0) / 160.0,
            max_relative = 1e-12
        );
    }

    #[test]
    fn co2_objective_at_net_zero() {
        let engine = engine(EmissionsParameters::default());
        let inputs = inputs()
            .replacing(EmissionsInput::Energy(Gas::CO2), Array1::from_elem(4, -6.49))
            .unwrap();
        let run = engine.compute(&inputs).unwrap();
        assert!(run.co2_objective.abs() < 1e-12);

        let row = run
            .jacobian(EmissionsOutput::Co2Objective, EmissionsInput::Energy(Gas::CO2))
            .unwrap();
        assert_eq!(row.dim(), (1, 4));
        assert!(row.iter().all(|v| v.is_finite() && v.abs() < 1e-9));

        let (objective, slope) = engine.co2_objective(6.49);
        assert_relative_eq!(objective, 1.0, epsilon = 1e-6);
        assert_relative_eq!(slope, 1.0 / (2.0 * 6.49), epsilon = 1e-9);
    }

    #[test]
    fn affine_co2_objective() {
        let engine = engine(EmissionsParameters {
            affine_co2_objective: true,
            ..Default::default()
        });
        let run = engine.compute(&inputs()).unwrap();
        assert_relative_eq!(
            run.co2_objective,
            (10.0 * 6.49 + 33.0) / (20.0 * 6.49),
            max_relative = 1e-12
        );
    }

    #[test]
    fn zero_production_is_rejected() {
        let inputs = inputs()
            .replacing(EmissionsInput::Production, array![160.0, 0.0, 170.0, 175.0])
            .unwrap();
        match engine(EmissionsParameters::default()).compute(&inputs) {
            Err(RsiamError::DivisionByZero { year, .. }) => assert_eq!(year, 2021),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rollups_add_up() {
        let run = engine(EmissionsParameters::default())
            .compute(&inputs())
            .unwrap();
        let industry = &run.sector_tables[&Sector::Industry];
        let sections_sum = industry.section_total.sum_columns();
        let sector_total = industry.sector.column("total_emissions").unwrap();
        for i in 0..4 {
            assert_relative_eq!(sections_sum[i], sector_total[i], max_relative = 1e-12);
        }

        let economy = run.economy_emissions.column("total_emissions").unwrap();
        let by_sector: FloatValue = run
            .sector_tables
            .values()
            .map(|t| t.sector.column("total_emissions").unwrap()[2])
            .sum();
        assert_relative_eq!(economy[2], by_sector, max_relative = 1e-12);

        let c = run
            .series(EmissionsOutput::Section(Section::C, EmissionKind::NonEnergy))
            .unwrap();
        assert_relative_eq!(c[0], 55.0 * 4.4 / 1000.0, max_relative = 1e-12);
    }

    #[test]
    fn missing_sector_sections() {
        let mut inputs = inputs();
        inputs.sections.remove(&Sector::Agriculture);
        assert!(matches!(
            engine(EmissionsParameters::default()).compute(&inputs),
            Err(RsiamError::MissingInput(_))
        ));
    }

    fn pairs() -> Vec<(EmissionsOutput, EmissionsInput, Tolerance)> {
        let inputs = [
            EmissionsInput::Land(Gas::CO2, 1),
            EmissionsInput::Land(Gas::CH4, 0),
            EmissionsInput::Energy(Gas::CO2),
            EmissionsInput::Energy(Gas::CH4),
            EmissionsInput::Energy(Gas::N2O),
            EmissionsInput::Production,
            EmissionsInput::SectionEnergyConsumption(Section::C),
            EmissionsInput::SectionNonEnergyIntensity(Section::A),
            EmissionsInput::SectionGdp(Section::K),
        ];
        let outputs = [
            EmissionsOutput::LandEmissions(Gas::CO2),
            EmissionsOutput::TotalEmissions(Gas::CH4),
            EmissionsOutput::Gwp(Gas::CH4, GwpHorizon::Twenty),
            EmissionsOutput::Gwp(Gas::N2O, GwpHorizon::Hundred),
            EmissionsOutput::Co2Objective,
            EmissionsOutput::TotalEnergyCo2Eq,
            EmissionsOutput::CarbonIntensity,
            EmissionsOutput::Section(Section::C, EmissionKind::Energy),
            EmissionsOutput::Section(Section::K, EmissionKind::Total),
            EmissionsOutput::Sector(Sector::Industry, EmissionKind::Total),
            EmissionsOutput::Sector(Sector::Agriculture, EmissionKind::NonEnergy),
            EmissionsOutput::Economy(EmissionKind::Energy),
            EmissionsOutput::Economy(EmissionKind::Total),
        ];
        let mut pairs = vec![];
        for output in outputs {
            for input in inputs {
                pairs.push((output, input, Tolerance::new(1e-6, 1e-9)));
            }
        }
        pairs
    }

    #[test]
    fn jacobians_match_finite_differences() {
        let engine = engine(EmissionsParameters::default());
        check_engine(&engine, &inputs(), &pairs(), FiniteDifference::default()).unwrap();
    }

    #[test]
    fn affine_objective_gradient() {
        let engine = engine(EmissionsParameters {
            affine_co2_objective: true,
            ..Default::default()
        });
        let pairs = [(
            EmissionsOutput::Co2Objective,
            EmissionsInput::Energy(Gas::CO2),
            Tolerance::default(),
        )];
        check_engine(&engine, &inputs(), &pairs, FiniteDifference::default()).unwrap();
    }

    #[test]
    fn objective_jacobian_is_a_row() {
        let run = engine(EmissionsParameters::default())
            .compute(&inputs())
            .unwrap();
        let jac = run
            .jacobian(EmissionsOutput::Co2Objective, EmissionsInput::Production)
            .unwrap();
        assert_eq!(jac.dim(), (1, 4));
    }

    #[test]
    fn unknown_land_column() {
        let run = engine(EmissionsParameters::default())
            .compute(&inputs())
            .unwrap();
        assert!(run
            .jacobian(
                EmissionsOutput::TotalEmissions(Gas::N2O),
                EmissionsInput::Land(Gas::N2O, 3)
            )
            .is_err());
    }
}
