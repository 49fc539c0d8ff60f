//! Forest surfaces, wood production and land-use CO2.
//!
//! Deforestation removes surface, reforestation investment adds it, and
//! investment in managed and unmanaged wood adds productive surface after a
//! construction delay. Wood surface yields biomass, part of which is sold for
//! energy at a price blended between the two wood types.
//!
//! The global forest surface may not drop below `-limit_deforestation_surface / 1000`.
//! Years where it would are clamped: the global surface is pinned to that floor and
//! the deforestation of that year is cancelled. Each year is decided on its own
//! from the unclamped cumulative surfaces and the decision is kept on the run so
//! derivatives follow the same branch as the forward pass.

use crate::parameters::forest::{ForestParameters, WoodStock};
use ndarray::Array1;
use rsiam_core::clamp::{self, ClampDecision};
use rsiam_core::columns::land_emissions_table;
use rsiam_core::config::Validate;
use rsiam_core::discipline::{Discipline, TableDefinition};
use rsiam_core::engine::{CouplingInputs, Differentiable, Engine};
use rsiam_core::errors::{RsiamError, RsiamResult};
use rsiam_core::identifiers::Gas;
use rsiam_core::jacobian::{self, Jacobian};
use rsiam_core::range_check::{check_ranges, ColumnBounds, RangeCheck};
use rsiam_core::table::YearTable;
use rsiam_core::years::{FloatValue, YearRange};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const TABLE_DEFORESTATION: &str = "deforestation_surface";
pub const COL_DEFORESTED_SURFACE: &str = "deforested_surface";
pub const TABLE_FOREST_INVESTMENT: &str = "forest_investment";
pub const COL_FOREST_INVESTMENT: &str = "forest_investment";
pub const COL_INVESTMENT: &str = "investment";
pub const TABLE_TRANSPORT_COST: &str = "transport_cost";
pub const COL_TRANSPORT: &str = "transport";
pub const TABLE_MARGIN: &str = "margin";
pub const COL_MARGIN: &str = "margin";

pub const TABLE_FOREST_SURFACE: &str = "forest_surface_detail_df";
pub const COL_DELTA_DEFORESTATION: &str = "delta_deforestation_surface";
pub const COL_DEFORESTATION: &str = "deforestation_surface";
pub const COL_DELTA_REFORESTATION: &str = "delta_reforestation_surface";
pub const COL_REFORESTATION: &str = "reforestation_surface";
pub const COL_DELTA_GLOBAL: &str = "delta_global_forest_surface";
pub const COL_GLOBAL: &str = "global_forest_surface";

pub const TABLE_CO2_EMISSIONS_DETAIL: &str = "CO2_emissions_detail_df";
pub const COL_DELTA_CO2_EMITTED: &str = "delta_CO2_emitted";
pub const COL_DELTA_CO2_DEFORESTATION: &str = "delta_CO2_deforestation";
pub const COL_DELTA_CO2_REFORESTATION: &str = "delta_CO2_reforestation";
pub const COL_CO2_DEFORESTATION: &str = "CO2_deforestation";
pub const COL_CO2_REFORESTATION: &str = "CO2_reforestation";
pub const COL_GLOBAL_CO2_EMITTED: &str = "global_CO2_emitted";
pub const COL_GLOBAL_CO2_CAPTURED: &str = "global_CO2_captured";
pub const COL_CO2_BALANCE: &str = "global_CO2_emission_balance";

pub const COL_DELTA_SURFACE: &str = "delta_surface";
pub const COL_SURFACE: &str = "cumulative_surface";
pub const COL_BIOMASS_PRODUCTION: &str = "biomass_production";
pub const COL_RESIDUES: &str = "residues_production";
pub const COL_RESIDUES_FOR_ENERGY: &str = "residues_production_for_energy";
pub const COL_RESIDUES_FOR_INDUSTRY: &str = "residues_production_for_industry";
pub const COL_WOOD: &str = "wood_production";
pub const COL_WOOD_FOR_ENERGY: &str = "wood_production_for_energy";
pub const COL_WOOD_FOR_INDUSTRY: &str = "wood_production_for_industry";
pub const COL_WOOD_CO2_EMITTED: &str = "CO2_emitted";

pub const TABLE_BIOMASS_DRY: &str = "biomass_dry_df";
pub const COL_BIOMASS_FOR_ENERGY: &str = "biomass_dry_for_energy";
pub const COL_PRICE_PER_TON: &str = "price_per_ton";
pub const COL_PRICE_PER_MWH: &str = "price_per_MWh";

/// Column of the land CO2 emissions table written by this engine
pub const COL_FOREST: &str = "Forest";

/// Energy content of dry biomass
/// unit: kWh / kg
const CALORIFIC_VALUE: FloatValue = 3.6;
const WACC: FloatValue = 0.1;
const LIFETIME: i32 = 100;
/// Operation and maintenance cost as a share of capex
const OPEX_SHARE: FloatValue = 0.045;

/// Capital recovery factor of an annuity
pub fn capital_recovery_factor(rate: FloatValue, periods: i32) -> FloatValue {
    let growth = (1.0 + rate).powi(periods);
    rate * growth / (growth - 1.0)
}

fn cumsum(values: &Array1<FloatValue>) -> Array1<FloatValue> {
    let mut acc = 0.0;
    values.mapv(|v| {
        acc += v;
        acc
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WoodType {
    Managed,
    Unmanaged,
}

impl WoodType {
    pub const ALL: [WoodType; 2] = [WoodType::Managed, WoodType::Unmanaged];

    pub fn prefix(&self) -> &'static str {
        match self {
            WoodType::Managed => "managed_wood",
            WoodType::Unmanaged => "unmanaged_wood",
        }
    }

    /// Name of the investment input table
    pub fn investment_table(&self) -> String {
        format!("{}_investment", self.prefix())
    }

    /// Name of the published production table
    pub fn detail_table(&self) -> String {
        format!("{}_df", self.prefix())
    }

    /// Column of the biomass dry table holding this wood's share of production
    pub fn part_column(&self) -> String {
        format!("{}_part", self.prefix())
    }

    pub fn price_per_ton_column(&self) -> String {
        format!("{}_price_per_ton", self.prefix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForestInput {
    Deforestation,
    ReforestationInvestment,
    WoodInvestment(WoodType),
    Transport,
    Margin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForestOutput {
    DeltaDeforestationSurface,
    DeforestationSurface,
    DeltaReforestationSurface,
    ReforestationSurface,
    DeltaGlobalSurface,
    GlobalSurface,
    WoodDeltaSurface(WoodType),
    WoodSurface(WoodType),
    WoodBiomass(WoodType),
    DeltaCo2Emitted,
    Co2Deforestation,
    Co2Reforestation,
    GlobalCo2Emitted,
    GlobalCo2Captured,
    Co2Balance,
    BiomassForEnergy,
    PricePerTon,
    PricePerMwh,
}

#[derive(Debug, Clone)]
pub struct ForestInputs {
    /// unit: Mha / yr
    pub deforestation: YearTable,
    /// unit: G$
    pub forest_investment: YearTable,
    /// unit: G$
    pub managed_wood_investment: YearTable,
    /// unit: G$
    pub unmanaged_wood_investment: YearTable,
    /// unit: $ / t
    pub transport_cost: YearTable,
    /// Multiplier applied to the production cost of biomass
    pub margin: YearTable,
}

impl ForestInputs {
    fn locate(&self, key: ForestInput) -> (&YearTable, &'static str) {
        match key {
            ForestInput::Deforestation => (&self.deforestation, COL_DEFORESTED_SURFACE),
            ForestInput::ReforestationInvestment => {
                (&self.forest_investment, COL_FOREST_INVESTMENT)
            }
            ForestInput::WoodInvestment(wood) => (self.wood_investment(wood), COL_INVESTMENT),
            ForestInput::Transport => (&self.transport_cost, COL_TRANSPORT),
            ForestInput::Margin => (&self.margin, COL_MARGIN),
        }
    }

    fn table_mut(&mut self, key: ForestInput) -> &mut YearTable {
        match key {
            ForestInput::Deforestation => &mut self.deforestation,
            ForestInput::ReforestationInvestment => &mut self.forest_investment,
            ForestInput::WoodInvestment(WoodType::Managed) => &mut self.managed_wood_investment,
            ForestInput::WoodInvestment(WoodType::Unmanaged) => {
                &mut self.unmanaged_wood_investment
            }
            ForestInput::Transport => &mut self.transport_cost,
            ForestInput::Margin => &mut self.margin,
        }
    }

    pub fn wood_investment(&self, wood: WoodType) -> &YearTable {
        match wood {
            WoodType::Managed => &self.managed_wood_investment,
            WoodType::Unmanaged => &self.unmanaged_wood_investment,
        }
    }
}

impl CouplingInputs for ForestInputs {
    type Key = ForestInput;

    fn series(&self, key: ForestInput) -> RsiamResult<Array1<FloatValue>> {
        let (table, column) = self.locate(key);
        Ok(table.column(column)?.clone())
    }

    fn replacing(&self, key: ForestInput, values: Array1<FloatValue>) -> RsiamResult<Self> {
        let (table, column) = self.locate(key);
        let table = table.replacing(column, values)?;
        let mut inputs = self.clone();
        *inputs.table_mut(key) = table;
        Ok(inputs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forest {
    years: YearRange,
    parameters: ForestParameters,
    #[serde(default)]
    range_check: RangeCheck,
}

/// Forward state of one wood type
#[derive(Debug, Clone)]
struct WoodState {
    price_per_ha: FloatValue,
    delta_surface: Array1<FloatValue>,
    surface: Array1<FloatValue>,
    biomass: Array1<FloatValue>,
    co2_emitted: Array1<FloatValue>,
    /// Capital and operating cost of one tonne
    /// unit: $ / t
    capex: FloatValue,
    price_per_ton: Array1<FloatValue>,
}

impl Forest {
    pub fn configure(years: YearRange, parameters: ForestParameters) -> RsiamResult<Self> {
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

    fn stock(&self, wood: WoodType) -> &WoodStock {
        match wood {
            WoodType::Managed => &self.parameters.managed_wood,
            WoodType::Unmanaged => &self.parameters.unmanaged_wood,
        }
    }

    fn price_per_ha(&self, wood: WoodType) -> FloatValue {
        let techno = &self.parameters.wood_techno;
        match wood {
            WoodType::Managed => techno.managed_wood_price_per_ha,
            WoodType::Unmanaged => techno.unmanaged_wood_price_per_ha,
        }
    }

    fn wood_state(
        &self,
        wood: WoodType,
        investment: &Array1<FloatValue>,
        transport: &Array1<FloatValue>,
        margin: &Array1<FloatValue>,
    ) -> WoodState {
        let techno = &self.parameters.wood_techno;
        let stock = self.stock(wood);
        let price_per_ha = self.price_per_ha(wood);
        let delay = techno.construction_delay;

        // Surface of the first `delay` years was paid for before the run started
        let history = &stock.investment_before_year_start;
        let past = &history[history.len() - delay..];
        let delta_surface = Array1::from_shape_fn(investment.len(), |i| {
            let paid = if i < delay {
                past[i]
            } else {
                investment[i - delay]
            };
            paid / price_per_ha
        });
        let surface = cumsum(&delta_surface) + stock.initial_surface;
        let biomass = cumsum(&(&delta_surface * techno.biomass_per_surface()))
            + stock.initial_production / CALORIFIC_VALUE;
        let co2_emitted = (&surface - stock.initial_surface) * (-self.parameters.co2_per_ha / 1000.0);

        let capex = price_per_ha * (capital_recovery_factor(WACC, LIFETIME) + OPEX_SHARE)
            / techno.density_per_ha
            / techno.density
            * 1000.0;
        let price_per_ton = (transport + capex) * margin;

        WoodState {
            price_per_ha,
            delta_surface,
            surface,
            biomass,
            co2_emitted,
            capex,
            price_per_ton,
        }
    }

    fn wood_table(&self, wood: WoodType, state: &WoodState) -> RsiamResult<YearTable> {
        let techno = &self.parameters.wood_techno;
        let residues = &state.biomass * techno.residue_density_percentage;
        let wood_production = &state.biomass * (1.0 - techno.residue_density_percentage);
        let delta_co2 = &state.delta_surface * (-self.parameters.co2_per_ha / 1000.0);

        YearTable::new(&wood.detail_table(), &self.years)
            .with_column(COL_DELTA_SURFACE, state.delta_surface.clone())?
            .with_column(COL_SURFACE, state.surface.clone())?
            .with_column(COL_BIOMASS_PRODUCTION, state.biomass.clone())?
            .with_column(
                COL_RESIDUES_FOR_ENERGY,
                &residues * techno.residue_percentage_for_energy,
            )?
            .with_column(
                COL_RESIDUES_FOR_INDUSTRY,
                &residues * (1.0 - techno.residue_percentage_for_energy),
            )?
            .with_column(COL_RESIDUES, residues)?
            .with_column(
                COL_WOOD_FOR_ENERGY,
                &wood_production * techno.wood_percentage_for_energy,
            )?
            .with_column(
                COL_WOOD_FOR_INDUSTRY,
                &wood_production * (1.0 - techno.wood_percentage_for_energy),
            )?
            .with_column(COL_WOOD, wood_production)?
            .with_column(COL_DELTA_CO2_EMITTED, delta_co2)?
            .with_column(COL_WOOD_CO2_EMITTED, state.co2_emitted.clone())
    }
}

impl Engine for Forest {
    type Inputs = ForestInputs;
    type Run = ForestRun;

    fn compute(&self, inputs: &ForestInputs) -> RsiamResult<ForestRun> {
        debug!(nb_years = self.years.len(), "computing forest");
        if self.range_check == RangeCheck::Enabled {
            for key in [
                ForestInput::Deforestation,
                ForestInput::ReforestationInvestment,
                ForestInput::WoodInvestment(WoodType::Managed),
                ForestInput::WoodInvestment(WoodType::Unmanaged),
                ForestInput::Transport,
                ForestInput::Margin,
            ] {
                let (table, column) = inputs.locate(key);
                check_ranges(table, &[ColumnBounds::non_negative(column)])?;
            }
        }

        let p = &self.parameters;
        let deforested = inputs
            .deforestation
            .aligned_column(&self.years, COL_DEFORESTED_SURFACE)?;
        let forest_investment = inputs
            .forest_investment
            .aligned_column(&self.years, COL_FOREST_INVESTMENT)?;
        let transport = inputs
            .transport_cost
            .aligned_column(&self.years, COL_TRANSPORT)?;
        let margin = inputs.margin.aligned_column(&self.years, COL_MARGIN)?;
        let managed_investment = inputs
            .managed_wood_investment
            .aligned_column(&self.years, COL_INVESTMENT)?;
        let unmanaged_investment = inputs
            .unmanaged_wood_investment
            .aligned_column(&self.years, COL_INVESTMENT)?;

        let managed = self.wood_state(WoodType::Managed, &managed_investment, &transport, &margin);
        let unmanaged =
            self.wood_state(WoodType::Unmanaged, &unmanaged_investment, &transport, &margin);

        let delta_reforestation = &forest_investment / p.reforestation_cost_per_ha;
        let reforestation = cumsum(&delta_reforestation);
        let mut delta_deforestation = &deforested / -1000.0;
        let mut deforestation = cumsum(&delta_deforestation);
        let wood_surface = &managed.surface + &unmanaged.surface;
        let mut delta_global = &delta_reforestation
            + &delta_deforestation
            + &managed.delta_surface
            + &unmanaged.delta_surface;
        let mut global =
            &reforestation + &deforestation + &wood_surface + p.initial_unused_forest_surface;

        let floor = -p.limit_deforestation_surface / 1000.0;
        let mut decisions = Vec::with_capacity(self.years.len());
        for i in 0..self.years.len() {
            let (value, decision) = clamp::floor(global[i], floor);
            decisions.push(decision);
            if decision.is_clamped() {
                warn!(
                    year = self.years.year_at(i),
                    global_forest_surface = global[i],
                    floor,
                    "deforestation capped by the global forest surface floor"
                );
                global[i] = value;
                delta_global[i] = 0.0;
                delta_deforestation[i] = 0.0;
                deforestation[i] = floor
                    - reforestation[i]
                    - wood_surface[i]
                    - p.initial_unused_forest_surface;
            }
        }

        let surface = YearTable::new(TABLE_FOREST_SURFACE, &self.years)
            .with_column(COL_DELTA_DEFORESTATION, delta_deforestation.clone())?
            .with_column(COL_DEFORESTATION, deforestation.clone())?
            .with_column(COL_DELTA_REFORESTATION, delta_reforestation.clone())?
            .with_column(COL_REFORESTATION, reforestation.clone())?
            .with_column(COL_DELTA_GLOBAL, delta_global.clone())?
            .with_column(COL_GLOBAL, global)?;

        let co2 = p.co2_per_ha / 1000.0;
        let co2_deforestation = &deforestation * -co2 + p.initial_emissions;
        let co2_reforestation = &reforestation * -co2;
        let co2_captured = &co2_reforestation + &managed.co2_emitted + &unmanaged.co2_emitted;
        let balance = &co2_deforestation + &co2_captured;
        let co2_detail = YearTable::new(TABLE_CO2_EMISSIONS_DETAIL, &self.years)
            .with_column(COL_DELTA_CO2_EMITTED, &delta_global * -co2)?
            .with_column(COL_DELTA_CO2_DEFORESTATION, &delta_deforestation * -co2)?
            .with_column(COL_DELTA_CO2_REFORESTATION, &delta_reforestation * -co2)?
            .with_column(COL_CO2_DEFORESTATION, co2_deforestation.clone())?
            .with_column(COL_CO2_REFORESTATION, co2_reforestation)?
            .with_column(COL_GLOBAL_CO2_EMITTED, co2_deforestation)?
            .with_column(COL_GLOBAL_CO2_CAPTURED, co2_captured)?
            .with_column(COL_CO2_BALANCE, balance.clone())?;
        let land_emissions = YearTable::new(&land_emissions_table(Gas::CO2), &self.years)
            .with_column(COL_FOREST, balance)?;

        let total_biomass = &managed.biomass + &unmanaged.biomass;
        if let Some(i) = total_biomass.iter().position(|v| *v == 0.0) {
            return Err(RsiamError::DivisionByZero {
                quantity: "wood biomass production".to_string(),
                year: self.years.year_at(i),
            });
        }
        let managed_part = &managed.biomass / &total_biomass;
        let unmanaged_part = &unmanaged.biomass / &total_biomass;
        let price_per_ton =
            &managed.price_per_ton * &managed_part + &unmanaged.price_per_ton * &unmanaged_part;
        let biomass_dry = YearTable::new(TABLE_BIOMASS_DRY, &self.years)
            .with_column(
                COL_BIOMASS_FOR_ENERGY,
                &total_biomass * p.wood_techno.energy_share(),
            )?
            .with_column(&WoodType::Managed.part_column(), managed_part.clone())?
            .with_column(&WoodType::Unmanaged.part_column(), unmanaged_part.clone())?
            .with_column(
                &WoodType::Managed.price_per_ton_column(),
                managed.price_per_ton.clone(),
            )?
            .with_column(
                &WoodType::Unmanaged.price_per_ton_column(),
                unmanaged.price_per_ton.clone(),
            )?
            .with_column(COL_PRICE_PER_MWH, &price_per_ton / CALORIFIC_VALUE)?
            .with_column(COL_PRICE_PER_TON, price_per_ton.clone())?;

        let managed_wood = self.wood_table(WoodType::Managed, &managed)?;
        let unmanaged_wood = self.wood_table(WoodType::Unmanaged, &unmanaged)?;

        debug!(
            nb_clamped = decisions.iter().filter(|c| c.is_clamped()).count(),
            "forest computed"
        );
        Ok(ForestRun {
            parameters: p.clone(),
            clamp: decisions,
            managed,
            unmanaged,
            total_biomass,
            margin,
            transport,
            managed_part,
            unmanaged_part,
            price_per_ton,
            surface,
            co2_detail,
            land_emissions,
            managed_wood,
            unmanaged_wood,
            biomass_dry,
        })
    }
}

#[typetag::serde]
impl Discipline for Forest {
    fn name(&self) -> String {
        "Forest".to_string()
    }

    fn definitions(&self) -> Vec<TableDefinition> {
        let mut definitions = vec![
            TableDefinition::input(TABLE_DEFORESTATION, &[COL_DEFORESTED_SURFACE], "Mha"),
            TableDefinition::input(TABLE_FOREST_INVESTMENT, &[COL_FOREST_INVESTMENT], "G$"),
            TableDefinition::input(TABLE_TRANSPORT_COST, &[COL_TRANSPORT], "$ / t"),
            TableDefinition::input(TABLE_MARGIN, &[COL_MARGIN], ""),
            TableDefinition::output(
                TABLE_FOREST_SURFACE,
                &[
                    COL_DELTA_DEFORESTATION,
                    COL_DEFORESTATION,
                    COL_DELTA_REFORESTATION,
                    COL_REFORESTATION,
                    COL_DELTA_GLOBAL,
                    COL_GLOBAL,
                ],
                "Gha",
            ),
            TableDefinition::output(
                TABLE_CO2_EMISSIONS_DETAIL,
                &[
                    COL_DELTA_CO2_EMITTED,
                    COL_DELTA_CO2_DEFORESTATION,
                    COL_DELTA_CO2_REFORESTATION,
                    COL_CO2_DEFORESTATION,
                    COL_CO2_REFORESTATION,
                    COL_GLOBAL_CO2_EMITTED,
                    COL_GLOBAL_CO2_CAPTURED,
                    COL_CO2_BALANCE,
                ],
                "GtCO2",
            ),
            TableDefinition::output(&land_emissions_table(Gas::CO2), &[COL_FOREST], "Gt"),
            TableDefinition::output(
                TABLE_BIOMASS_DRY,
                &[COL_BIOMASS_FOR_ENERGY, COL_PRICE_PER_TON, COL_PRICE_PER_MWH],
                "Mt",
            ),
        ];
        for wood in WoodType::ALL {
            definitions.push(TableDefinition::input(
                &wood.investment_table(),
                &[COL_INVESTMENT],
                "G$",
            ));
            definitions.push(TableDefinition::output(
                &wood.detail_table(),
                &[
                    COL_DELTA_SURFACE,
                    COL_SURFACE,
                    COL_BIOMASS_PRODUCTION,
                    COL_RESIDUES,
                    COL_WOOD,
                    COL_WOOD_CO2_EMITTED,
                ],
                "Mt",
            ));
        }
        definitions
    }
}

#[derive(Debug, Clone)]
pub struct ForestRun {
    parameters: ForestParameters,
    clamp: Vec<ClampDecision>,
    managed: WoodState,
    unmanaged: WoodState,
    total_biomass: Array1<FloatValue>,
    margin: Array1<FloatValue>,
    transport: Array1<FloatValue>,
    managed_part: Array1<FloatValue>,
    unmanaged_part: Array1<FloatValue>,
    price_per_ton: Array1<FloatValue>,
    /// Surfaces in Gha
    pub surface: YearTable,
    pub co2_detail: YearTable,
    /// `CO2_land_emissions`, the forest contribution to land-use CO2
    pub land_emissions: YearTable,
    pub managed_wood: YearTable,
    pub unmanaged_wood: YearTable,
    pub biomass_dry: YearTable,
}

impl ForestRun {
    /// Per-year floor decisions of the forward pass
    pub fn clamp_decisions(&self) -> &[ClampDecision] {
        &self.clamp
    }

    pub fn wood_table(&self, wood: WoodType) -> &YearTable {
        match wood {
            WoodType::Managed => &self.managed_wood,
            WoodType::Unmanaged => &self.unmanaged_wood,
        }
    }

    fn wood(&self, wood: WoodType) -> &WoodState {
        match wood {
            WoodType::Managed => &self.managed,
            WoodType::Unmanaged => &self.unmanaged,
        }
    }

    /// Share of `wood` in total wood biomass production
    pub fn part(&self, wood: WoodType) -> &Array1<FloatValue> {
        match wood {
            WoodType::Managed => &self.managed_part,
            WoodType::Unmanaged => &self.unmanaged_part,
        }
    }

    fn locate(&self, output: ForestOutput) -> (&YearTable, String) {
        let col = |c: &str| c.to_string();
        match output {
            ForestOutput::DeltaDeforestationSurface => (&self.surface, col(COL_DELTA_DEFORESTATION)),
            ForestOutput::DeforestationSurface => (&self.surface, col(COL_DEFORESTATION)),
            ForestOutput::DeltaReforestationSurface => (&self.surface, col(COL_DELTA_REFORESTATION)),
            ForestOutput::ReforestationSurface => (&self.surface, col(COL_REFORESTATION)),
            ForestOutput::DeltaGlobalSurface => (&self.surface, col(COL_DELTA_GLOBAL)),
            ForestOutput::GlobalSurface => (&self.surface, col(COL_GLOBAL)),
            ForestOutput::WoodDeltaSurface(wood) => (self.wood_table(wood), col(COL_DELTA_SURFACE)),
            ForestOutput::WoodSurface(wood) => (self.wood_table(wood), col(COL_SURFACE)),
            ForestOutput::WoodBiomass(wood) => {
                (self.wood_table(wood), col(COL_BIOMASS_PRODUCTION))
            }
            ForestOutput::DeltaCo2Emitted => (&self.co2_detail, col(COL_DELTA_CO2_EMITTED)),
            ForestOutput::Co2Deforestation => (&self.co2_detail, col(COL_CO2_DEFORESTATION)),
            ForestOutput::Co2Reforestation => (&self.co2_detail, col(COL_CO2_REFORESTATION)),
            ForestOutput::GlobalCo2Emitted => (&self.co2_detail, col(COL_GLOBAL_CO2_EMITTED)),
            ForestOutput::GlobalCo2Captured => (&self.co2_detail, col(COL_GLOBAL_CO2_CAPTURED)),
            ForestOutput::Co2Balance => (&self.co2_detail, col(COL_CO2_BALANCE)),
            ForestOutput::BiomassForEnergy => (&self.biomass_dry, col(COL_BIOMASS_FOR_ENERGY)),
            ForestOutput::PricePerTon => (&self.biomass_dry, col(COL_PRICE_PER_TON)),
            ForestOutput::PricePerMwh => (&self.biomass_dry, col(COL_PRICE_PER_MWH)),
        }
    }

    fn n(&self) -> usize {
        self.clamp.len()
    }

    fn co2_per_surface(&self) -> FloatValue {
        self.parameters.co2_per_ha / 1000.0
    }

    /// Keep free rows of `free`, take clamped rows from `clamped` (zero when `None`)
    fn by_clamp(&self, mut free: Jacobian, clamped: Option<&Jacobian>) -> Jacobian {
        for (i, decision) in self.clamp.iter().enumerate() {
            if decision.is_clamped() {
                match clamped {
                    Some(c) => free.row_mut(i).assign(&c.row(i)),
                    None => free.row_mut(i).fill(0.0),
                }
            }
        }
        free
    }

    fn d_wood_delta_surface(&self, wood: WoodType, input: ForestInput) -> Jacobian {
        if input == ForestInput::WoodInvestment(wood) {
            jacobian::shifted(
                self.n(),
                self.parameters.wood_techno.construction_delay,
                1.0 / self.wood(wood).price_per_ha,
            )
        } else {
            jacobian::zeros(self.n())
        }
    }

    fn d_wood_surface(&self, wood: WoodType, input: ForestInput) -> Jacobian {
        jacobian::cumulative(self.n()).dot(&self.d_wood_delta_surface(wood, input))
    }

    fn d_wood_biomass(&self, wood: WoodType, input: ForestInput) -> Jacobian {
        self.d_wood_surface(wood, input) * self.parameters.wood_techno.biomass_per_surface()
    }

    fn d_delta_reforestation(&self, input: ForestInput) -> Jacobian {
        if input == ForestInput::ReforestationInvestment {
            jacobian::scaled_identity(self.n(), 1.0 / self.parameters.reforestation_cost_per_ha)
        } else {
            jacobian::zeros(self.n())
        }
    }

    fn d_reforestation(&self, input: ForestInput) -> Jacobian {
        jacobian::cumulative(self.n()).dot(&self.d_delta_reforestation(input))
    }

    /// Deforestation terms as if no year were clamped
    fn d_delta_deforestation_free(&self, input: ForestInput) -> Jacobian {
        if input == ForestInput::Deforestation {
            jacobian::scaled_identity(self.n(), -1.0 / 1000.0)
        } else {
            jacobian::zeros(self.n())
        }
    }

    fn d_deforestation_free(&self, input: ForestInput) -> Jacobian {
        jacobian::cumulative(self.n()).dot(&self.d_delta_deforestation_free(input))
    }

    /// Reforestation and wood surfaces, the part of the global surface not set by deforestation
    fn d_other_surfaces(&self, input: ForestInput) -> Jacobian {
        self.d_reforestation(input)
            + self.d_wood_surface(WoodType::Managed, input)
            + self.d_wood_surface(WoodType::Unmanaged, input)
    }

    fn d_deforestation(&self, input: ForestInput) -> Jacobian {
        let on_floor = -self.d_other_surfaces(input);
        self.by_clamp(self.d_deforestation_free(input), Some(&on_floor))
    }

    fn d_global(&self, input: ForestInput) -> Jacobian {
        let free = self.d_deforestation_free(input) + self.d_other_surfaces(input);
        self.by_clamp(free, None)
    }

    fn d_delta_global(&self, input: ForestInput) -> Jacobian {
        let free = self.d_delta_deforestation_free(input)
            + self.d_delta_reforestation(input)
            + self.d_wood_delta_surface(WoodType::Managed, input)
            + self.d_wood_delta_surface(WoodType::Unmanaged, input);
        self.by_clamp(free, None)
    }

    fn d_co2_captured(&self, input: ForestInput) -> Jacobian {
        self.d_other_surfaces(input) * -self.co2_per_surface()
    }

    fn d_price_per_ton(&self, input: ForestInput) -> Jacobian {
        match input {
            ForestInput::WoodInvestment(wood) => {
                // d(sum_w p_w B_w / sum_w B_w) / dB_wood = (p_wood - price) / sum_w B_w
                let scale =
                    (&self.wood(wood).price_per_ton - &self.price_per_ton) / &self.total_biomass;
                jacobian::scale_rows(scale.view(), &self.d_wood_biomass(wood, input))
            }
            ForestInput::Transport => {
                let parts = &self.managed_part + &self.unmanaged_part;
                jacobian::diagonal((&self.margin * &parts).view())
            }
            ForestInput::Margin => {
                let cost = (&self.transport + self.managed.capex) * &self.managed_part
                    + (&self.transport + self.unmanaged.capex) * &self.unmanaged_part;
                jacobian::diagonal(cost.view())
            }
            ForestInput::Deforestation | ForestInput::ReforestationInvestment => {
                jacobian::zeros(self.n())
            }
        }
    }
}

impl Differentiable for ForestRun {
    type Output = ForestOutput;
    type Input = ForestInput;

    fn series(&self, output: ForestOutput) -> RsiamResult<Array1<FloatValue>> {
        let (table, column) = self.locate(output);
        Ok(table.column(&column)?.clone())
    }

    fn jacobian(&self, output: ForestOutput, input: ForestInput) -> RsiamResult<Jacobian> {
        let co2 = self.co2_per_surface();
        let energy_share = self.parameters.wood_techno.energy_share();
        Ok(match output {
            ForestOutput::DeltaDeforestationSurface => {
                self.by_clamp(self.d_delta_deforestation_free(input), None)
            }
            ForestOutput::DeforestationSurface => self.d_deforestation(input),
            ForestOutput::DeltaReforestationSurface => self.d_delta_reforestation(input),
            ForestOutput::ReforestationSurface => self.d_reforestation(input),
            ForestOutput::DeltaGlobalSurface => self.d_delta_global(input),
            ForestOutput::GlobalSurface => self.d_global(input),
            ForestOutput::WoodDeltaSurface(wood) => self.d_wood_delta_surface(wood, input),
            ForestOutput::WoodSurface(wood) => self.d_wood_surface(wood, input),
            ForestOutput::WoodBiomass(wood) => self.d_wood_biomass(wood, input),
            ForestOutput::DeltaCo2Emitted => self.d_delta_global(input) * -co2,
            ForestOutput::Co2Deforestation | ForestOutput::GlobalCo2Emitted => {
                self.d_deforestation(input) * -co2
            }
            ForestOutput::Co2Reforestation => self.d_reforestation(input) * -co2,
            ForestOutput::GlobalCo2Captured => self.d_co2_captured(input),
            ForestOutput::Co2Balance => {
                self.d_deforestation(input) * -co2 + self.d_co2_captured(input)
            }
            ForestOutput::BiomassForEnergy => {
                (self.d_wood_biomass(WoodType::Managed, input)
                    + self.d_wood_biomass(WoodType::Unmanaged, input))
                    * energy_share
            }
            ForestOutput::PricePerTon => self.d_price_per_ton(input),
            ForestOutput::PricePerMwh => self.d_price_per_ton(input) / CALORIFIC_VALUE,
        })
    }
}
