//! Jacobians of engines chained through their published tables.
//!
//! The derivative of a chain of engines is the product of each engine's
//! Jacobian. These tests run the chain end to end under finite differences
//! and compare with that product.

use ndarray::{Array, Array1};
use rsiam_components::components::carbon_cycle::{CarbonCycleInput, CarbonCycleOutput, Reservoir};
use rsiam_components::components::emissions::{
    EmissionsInput, EmissionsOutput, SectionTables, TABLE_SECTION_ENERGY_CONSUMPTION,
    TABLE_SECTION_GDP, TABLE_SECTION_NON_ENERGY_INTENSITY,
};
use rsiam_components::components::forest::{
    ForestInput, ForestOutput, WoodType, COL_DEFORESTED_SURFACE, COL_FOREST_INVESTMENT,
    COL_INVESTMENT, COL_MARGIN, COL_TRANSPORT, TABLE_DEFORESTATION, TABLE_FOREST_INVESTMENT,
    TABLE_MARGIN, TABLE_TRANSPORT_COST,
};
use rsiam_components::components::ghg_cycle::{GhgCycleInput, GhgCycleOutput};
use rsiam_components::components::{
    CarbonCycle, CarbonCycleInputs, EmissionsAggregation, EmissionsInputs, EmissionsRun, Forest,
    ForestInputs, GhgCycle, GhgCycleInputs,
};
use rsiam_components::parameters::{
    CarbonCycleParameters, EmissionsParameters, ForestParameters, GhgCycleParameters, WoodStock,
    WoodTechno,
};
use rsiam_core::columns::{
    land_emissions_table, sector_table, total_emissions, COL_TOTAL_PRODUCTION,
    TABLE_ENERGY_PRODUCTION, TABLE_GHG_ENERGY_EMISSIONS,
};
use rsiam_core::engine::{CouplingInputs, Differentiable, Engine};
use rsiam_core::errors::RsiamResult;
use rsiam_core::identifiers::{Gas, GwpHorizon, PerGas, Sector};
use rsiam_core::jacobian_check::{JacobianCheck, Tolerance};
use rsiam_core::table::YearTable;
use rsiam_core::years::{FloatValue, YearRange};

fn years() -> YearRange {
    YearRange::new(2020, 2027, 1).unwrap()
}

fn ramp(start: FloatValue, end: FloatValue) -> Array1<FloatValue> {
    Array::linspace(start, end, years().len())
}

fn table(name: &str, columns: &[(&str, Array1<FloatValue>)]) -> YearTable {
    let mut table = YearTable::new(name, &years());
    for (column, values) in columns {
        table.insert(column, values.clone()).unwrap();
    }
    table
}

fn forest() -> Forest {
    let parameters = ForestParameters {
        limit_deforestation_surface: 1000.0,
        co2_per_ha: 4000.0,
        initial_emissions: 3.21,
        reforestation_cost_per_ha: 13800.0,
        initial_unused_forest_surface: 1.6,
        wood_techno: WoodTechno::default(),
        managed_wood: WoodStock {
            initial_production: 1000.0,
            initial_surface: 1.25,
            investment_before_year_start: vec![1.0, 1.5, 2.0],
        },
        unmanaged_wood: WoodStock {
            initial_production: 800.0,
            initial_surface: 1.15,
            investment_before_year_start: vec![0.5, 0.6, 0.7],
        },
    };
    Forest::configure(years(), parameters).unwrap()
}

fn forest_inputs() -> ForestInputs {
    ForestInputs {
        deforestation: table(
            TABLE_DEFORESTATION,
            &[(COL_DEFORESTED_SURFACE, ramp(10.0, 14.0))],
        ),
        forest_investment: table(
            TABLE_FOREST_INVESTMENT,
            &[(COL_FOREST_INVESTMENT, ramp(5.0, 8.0))],
        ),
        managed_wood_investment: table(
            &WoodType::Managed.investment_table(),
            &[(COL_INVESTMENT, ramp(2.0, 3.0))],
        ),
        unmanaged_wood_investment: table(
            &WoodType::Unmanaged.investment_table(),
            &[(COL_INVESTMENT, ramp(1.0, 1.2))],
        ),
        transport_cost: table(TABLE_TRANSPORT_COST, &[(COL_TRANSPORT, ramp(7.0, 9.0))]),
        margin: table(TABLE_MARGIN, &[(COL_MARGIN, Array1::from_elem(years().len(), 1.1))]),
    }
}

fn section_tables(sector: Sector) -> SectionTables {
    let build = |name: &str, base: FloatValue| {
        let mut t = YearTable::new(&sector_table(sector.name(), name), &years());
        for (k, section) in sector.sections().iter().enumerate() {
            let v = base * (1.0 + k as FloatValue * 0.1);
            t.insert(section.name(), ramp(v, v * 1.2)).unwrap();
        }
        t
    };
    SectionTables {
        energy_consumption: build(TABLE_SECTION_ENERGY_CONSUMPTION, 3.0),
        non_energy_intensity: build(TABLE_SECTION_NON_ENERGY_INTENSITY, 50.0),
        gdp: build(TABLE_SECTION_GDP, 4.0),
    }
}

/// Emissions inputs with the forest as the only CO2 land source
fn emissions_inputs(forest_land: YearTable) -> EmissionsInputs {
    EmissionsInputs {
        land: PerGas::new(
            forest_land,
            table(&land_emissions_table(Gas::CH4), &[("Crop", ramp(0.1, 0.13))]),
            table(&land_emissions_table(Gas::N2O), &[("Crop", ramp(0.005, 0.006))]),
        ),
        energy_emissions: table(
            TABLE_GHG_ENERGY_EMISSIONS,
            &[
                (&total_emissions(Gas::CO2), ramp(35.0, 28.0)),
                (&total_emissions(Gas::CH4), ramp(0.12, 0.1)),
                (&total_emissions(Gas::N2O), ramp(0.002, 0.002)),
            ],
        ),
        energy_production: table(
            TABLE_ENERGY_PRODUCTION,
            &[(COL_TOTAL_PRODUCTION, ramp(160.0, 190.0))],
        ),
        sections: Sector::ALL
            .iter()
            .map(|s| (*s, section_tables(*s)))
            .collect(),
    }
}

fn emissions() -> EmissionsAggregation {
    EmissionsAggregation::configure(years(), EmissionsParameters::default()).unwrap()
}

/// Forest then emissions aggregation, for a given deforestation series
fn land_to_emissions(deforestation: &Array1<FloatValue>) -> RsiamResult<EmissionsRun> {
    let inputs = forest_inputs().replacing(ForestInput::Deforestation, deforestation.clone())?;
    let forest_run = forest().compute(&inputs)?;
    emissions().compute(&emissions_inputs(forest_run.land_emissions))
}

mod forest_to_atmosphere {
    use super::*;

    fn tolerance() -> Tolerance {
        Tolerance::new(1e-5, 1e-9)
    }

    #[test]
    fn co2_ppm_through_the_ghg_cycle() {
        let ghg = GhgCycle::configure(years(), GhgCycleParameters::default()).unwrap();
        let x0 = forest_inputs().series(ForestInput::Deforestation).unwrap();

        let forest_run = forest().compute(&forest_inputs()).unwrap();
        let emissions_run = emissions()
            .compute(&emissions_inputs(forest_run.land_emissions.clone()))
            .unwrap();
        let ghg_run = ghg
            .compute(&GhgCycleInputs {
                emissions: emissions_run.ghg_emissions.clone(),
            })
            .unwrap();

        let d_balance = forest_run
            .jacobian(ForestOutput::Co2Balance, ForestInput::Deforestation)
            .unwrap();
        let d_total = emissions_run
            .jacobian(
                EmissionsOutput::TotalEmissions(Gas::CO2),
                EmissionsInput::Land(Gas::CO2, 0),
            )
            .unwrap();
        let d_ppm = ghg_run
            .jacobian(
                GhgCycleOutput::Concentration(Gas::CO2),
                GhgCycleInput::TotalEmissions(Gas::CO2),
            )
            .unwrap();
        let chained = d_ppm.dot(&d_total).dot(&d_balance);

        JacobianCheck::new("co2_ppm / deforested_surface")
            .with_tolerance(tolerance())
            .assert(&chained, &x0, |x| {
                let emissions_run = land_to_emissions(x)?;
                ghg.compute(&GhgCycleInputs {
                    emissions: emissions_run.ghg_emissions,
                })?
                .series(GhgCycleOutput::Concentration(Gas::CO2))
            })
            .unwrap();
    }

    #[test]
    fn atmosphere_through_the_carbon_cycle() {
        let cycle = CarbonCycle::configure(years(), CarbonCycleParameters::default()).unwrap();
        let x0 = forest_inputs().series(ForestInput::Deforestation).unwrap();
        let output = CarbonCycleOutput::Reservoir(Reservoir::Atmosphere);

        let forest_run = forest().compute(&forest_inputs()).unwrap();
        let emissions_run = emissions()
            .compute(&emissions_inputs(forest_run.land_emissions.clone()))
            .unwrap();
        let cycle_run = cycle
            .compute(&CarbonCycleInputs {
                co2_emissions: emissions_run.co2_emissions.clone(),
            })
            .unwrap();

        let chained = cycle_run
            .jacobian(output, CarbonCycleInput::TotalCo2Emissions)
            .unwrap()
            .dot(
                &emissions_run
                    .jacobian(
                        EmissionsOutput::TotalEmissions(Gas::CO2),
                        EmissionsInput::Land(Gas::CO2, 0),
                    )
                    .unwrap(),
            )
            .dot(
                &forest_run
                    .jacobian(ForestOutput::Co2Balance, ForestInput::Deforestation)
                    .unwrap(),
            );

        JacobianCheck::new("atmo_conc / deforested_surface")
            .with_tolerance(tolerance())
            .assert(&chained, &x0, |x| {
                let emissions_run = land_to_emissions(x)?;
                cycle
                    .compute(&CarbonCycleInputs {
                        co2_emissions: emissions_run.co2_emissions,
                    })?
                    .series(output)
            })
            .unwrap();
    }

    #[test]
    fn gwp_objective_through_methane() {
        let ghg = GhgCycle::configure(years(), GhgCycleParameters::default()).unwrap();
        let forest_run = forest().compute(&forest_inputs()).unwrap();
        let emissions_inputs = emissions_inputs(forest_run.land_emissions);
        let key = EmissionsInput::Energy(Gas::CH4);
        let x0 = emissions_inputs.series(key).unwrap();

        let emissions_run = emissions().compute(&emissions_inputs).unwrap();
        let ghg_run = ghg
            .compute(&GhgCycleInputs {
                emissions: emissions_run.ghg_emissions.clone(),
            })
            .unwrap();
        let output = GhgCycleOutput::GwpObjective(GwpHorizon::Hundred);
        let chained = ghg_run
            .jacobian(output, GhgCycleInput::TotalEmissions(Gas::CH4))
            .unwrap()
            .dot(
                &emissions_run
                    .jacobian(EmissionsOutput::TotalEmissions(Gas::CH4), key)
                    .unwrap(),
            );
        assert_eq!(chained.dim(), (1, years().len()));

        JacobianCheck::new("gwp100_objective / Total CH4 emissions")
            .with_tolerance(tolerance())
            .assert(&chained, &x0, |x| {
                let run = emissions().compute(&emissions_inputs.replacing(key, x.clone())?)?;
                ghg.compute(&GhgCycleInputs {
                    emissions: run.ghg_emissions,
                })?
                .series(output)
            })
            .unwrap();
    }
}

mod concurrent_requests {
    use super::*;

    #[test]
    fn runs_serve_jacobians_from_several_threads() {
        let run = forest().compute(&forest_inputs()).unwrap();
        let inputs = [
            ForestInput::Deforestation,
            ForestInput::ReforestationInvestment,
            ForestInput::WoodInvestment(WoodType::Managed),
            ForestInput::WoodInvestment(WoodType::Unmanaged),
        ];
        let serial: Vec<_> = inputs
            .iter()
            .map(|i| run.jacobian(ForestOutput::GlobalSurface, *i).unwrap())
            .collect();

        let parallel: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = inputs
                .iter()
                .map(|i| {
                    let run = &run;
                    scope.spawn(move || run.jacobian(ForestOutput::GlobalSurface, *i).unwrap())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(serial, parallel);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let engine = forest();
        let first = engine.compute(&forest_inputs()).unwrap();
        let second = engine.compute(&forest_inputs()).unwrap();
        assert_eq!(first.surface, second.surface);
        assert_eq!(first.biomass_dry, second.biomass_dry);
    }
}
