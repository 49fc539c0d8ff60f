//! Wiring of the engines into a coupling graph.

use rsiam::components::parameters::{
    CarbonCycleParameters, EmissionsParameters, ForestParameters, GhgCycleParameters,
    PolicyParameters, RedistributionParameters, SectorParameters, WoodStock, WoodTechno,
};
use rsiam::core::columns::{
    land_emissions_table, sector_table, TABLE_CO2_EMISSIONS, TABLE_ENERGY_PRODUCTION,
    TABLE_GHG_EMISSIONS,
};
use rsiam::core::identifiers::{Gas, Sector};
use rsiam::prelude::*;
use std::sync::Arc;

fn years() -> YearRange {
    YearRange::new(2020, 2030, 1).unwrap()
}

fn forest_parameters() -> ForestParameters {
    ForestParameters {
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
    }
}

fn sector(sector: Sector) -> Arc<dyn Discipline> {
    Arc::new(
        EconomicSector::configure(
            sector.name(),
            years(),
            SectorParameters::with_seeds(100.0, 1.3, 0.02),
        )
        .unwrap(),
    )
}

fn redistribution() -> Arc<dyn Discipline> {
    Arc::new(EnergyRedistribution::configure(years(), RedistributionParameters::default()).unwrap())
}

fn emissions() -> Arc<dyn Discipline> {
    Arc::new(EmissionsAggregation::configure(years(), EmissionsParameters::default()).unwrap())
}

fn forest() -> Arc<dyn Discipline> {
    Arc::new(Forest::configure(years(), forest_parameters()).unwrap())
}

fn ghg_cycle() -> Arc<dyn Discipline> {
    Arc::new(GhgCycle::configure(years(), GhgCycleParameters::default()).unwrap())
}

fn carbon_cycle() -> Arc<dyn Discipline> {
    Arc::new(CarbonCycle::configure(years(), CarbonCycleParameters::default()).unwrap())
}

fn policy() -> Arc<dyn Discipline> {
    Arc::new(Policy::configure(years(), PolicyParameters::default()).unwrap())
}

fn position(order: &[String], name: &str) -> usize {
    order
        .iter()
        .position(|n| n == name)
        .unwrap_or_else(|| panic!("{} missing from {:?}", name, order))
}

mod evaluation_order {
    use super::*;

    #[test]
    fn producers_run_before_consumers() {
        // Registered in reverse dependency order on purpose
        let graph = CouplingGraphBuilder::new()
            .with_discipline(policy())
            .with_discipline(ghg_cycle())
            .with_discipline(emissions())
            .with_discipline(forest())
            .with_discipline(sector(Sector::Industry))
            .with_discipline(sector(Sector::Agriculture))
            .with_discipline(sector(Sector::Services))
            .with_discipline(redistribution())
            .build()
            .unwrap();

        let order = graph.evaluation_order();
        assert_eq!(order.len(), 8);
        let redistribution = position(&order, "EnergyRedistribution");
        for s in Sector::ALL {
            assert!(redistribution < position(&order, &format!("{}.EconomicSector", s.name())));
        }
        assert!(position(&order, "Forest") < position(&order, "EmissionsAggregation"));
        assert!(position(&order, "EmissionsAggregation") < position(&order, "GhgCycle"));
    }

    #[test]
    fn links_follow_the_declared_tables() {
        let graph = CouplingGraphBuilder::new()
            .with_discipline(forest())
            .with_discipline(emissions())
            .with_discipline(ghg_cycle())
            .build()
            .unwrap();

        assert_eq!(
            graph.producer_of(&land_emissions_table(Gas::CO2)),
            Some("Forest".to_string())
        );
        assert_eq!(
            graph.consumers_of(TABLE_GHG_EMISSIONS),
            vec!["GhgCycle".to_string()]
        );
        assert_eq!(graph.producer_of(TABLE_CO2_EMISSIONS), Some("EmissionsAggregation".to_string()));
        assert!(graph.consumers_of(TABLE_CO2_EMISSIONS).is_empty());
    }

    #[test]
    fn carbon_cycle_reads_total_co2() {
        let graph = CouplingGraphBuilder::new()
            .with_discipline(carbon_cycle())
            .with_discipline(emissions())
            .build()
            .unwrap();
        assert_eq!(
            graph.evaluation_order(),
            vec!["EmissionsAggregation".to_string(), "CarbonCycle".to_string()]
        );
        assert_eq!(
            graph.consumers_of(TABLE_CO2_EMISSIONS),
            vec!["CarbonCycle".to_string()]
        );
    }

    #[test]
    fn sectors_read_their_share_of_energy() {
        let graph = CouplingGraphBuilder::new()
            .with_discipline(redistribution())
            .with_discipline(sector(Sector::Agriculture))
            .build()
            .unwrap();
        let table = sector_table(Sector::Agriculture.name(), TABLE_ENERGY_PRODUCTION);
        assert_eq!(
            graph.consumers_of(&table),
            vec!["Agriculture.EconomicSector".to_string()]
        );
    }
}

mod exogenous {
    use super::*;

    #[test]
    fn unproduced_inputs_are_listed() {
        let graph = CouplingGraphBuilder::new()
            .with_discipline(policy())
            .with_discipline(redistribution())
            .build()
            .unwrap();
        let exogenous = graph.exogenous();
        for table in ["CO2_damage_price", "CCS_price", TABLE_ENERGY_PRODUCTION] {
            assert!(
                exogenous.iter().any(|t| t == table),
                "{} not in {:?}",
                table,
                exogenous
            );
        }
    }

    #[test]
    fn linked_inputs_are_not_exogenous() {
        let graph = CouplingGraphBuilder::new()
            .with_discipline(emissions())
            .with_discipline(ghg_cycle())
            .build()
            .unwrap();
        assert!(!graph.exogenous().iter().any(|t| t == TABLE_GHG_EMISSIONS));
    }
}

mod invalid_graphs {
    use super::*;

    #[test]
    fn both_atmospheric_cycles_conflict() {
        let result = CouplingGraphBuilder::new()
            .with_discipline(ghg_cycle())
            .with_discipline(carbon_cycle())
            .build();
        match result {
            Err(RsiamError::DuplicateProducer { first, second, .. }) => {
                assert_eq!(first, "GhgCycle");
                assert_eq!(second, "CarbonCycle");
            }
            other => panic!("expected a duplicate producer, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn same_sector_twice() {
        let result = CouplingGraphBuilder::new()
            .with_discipline(sector(Sector::Industry))
            .with_discipline(sector(Sector::Industry))
            .build();
        assert!(matches!(result, Err(RsiamError::DuplicateProducer { .. })));
    }
}
