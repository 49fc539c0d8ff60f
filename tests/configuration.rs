//! Engines configured from TOML and shipped across a process boundary as JSON.

use is_close::is_close;
use rsiam::components::parameters::{
    CarbonCycleParameters, EmissionsParameters, ForestParameters, GhgCycleParameters,
    PolicyParameters, SectorMode, SectorParameters,
};
use rsiam::core::config::{from_toml_str, to_toml_string};
use rsiam::prelude::*;
use serde::Deserialize;
use std::sync::Arc;

/// A scenario file as a host application would lay it out
#[derive(Debug, Deserialize)]
struct Scenario {
    years: YearRange,
    industry: SectorParameters,
    forest: ForestParameters,
    #[serde(default)]
    emissions: EmissionsParameters,
    #[serde(default)]
    ghg_cycle: GhgCycleParameters,
    #[serde(default)]
    policy: PolicyParameters,
}

const SCENARIO: &str = r#"
[years]
year_start = 2020
year_end = 2100
time_step = 5

[industry]
capital_start = 120.0
productivity_start = 1.31
productivity_gr_start = 0.0198
depreciation_capital = 0.06

[forest]
initial_unused_forest_surface = 1.6

[forest.managed_wood]
initial_production = 1000.0
initial_surface = 1.25
investment_before_year_start = [1.0, 1.5, 2.0]

[forest.unmanaged_wood]
initial_production = 800.0
initial_surface = 1.15
investment_before_year_start = [0.5, 0.6, 0.7]

[emissions]
affine_co2_objective = true

[policy]
ccs_price_percentage = 50.0
co2_damage_price_percentage = 70.0
"#;

mod toml_files {
    use super::*;

    #[test]
    fn scenario_fills_defaults() {
        let scenario: Scenario = toml::from_str(SCENARIO).unwrap();
        assert_eq!(scenario.years.len(), 17);
        assert_eq!(scenario.years.year_at(16), 2100);

        assert_eq!(scenario.industry.mode, SectorMode::Simulation);
        assert!(is_close!(scenario.industry.depreciation_capital, 0.06));
        assert!(is_close!(scenario.forest.co2_per_ha, 4000.0));
        assert_eq!(scenario.forest.wood_techno.construction_delay, 3);
        assert!(scenario.emissions.affine_co2_objective);
        assert!(is_close!(scenario.emissions.co2_emissions_ref, 6.49));
        assert_eq!(scenario.ghg_cycle, GhgCycleParameters::default());
        assert!(is_close!(scenario.policy.ccs_weight(), 0.5));

        EconomicSector::configure("Industry", scenario.years, scenario.industry).unwrap();
        Forest::configure(scenario.years, scenario.forest).unwrap();
    }

    #[test]
    fn inverted_year_range() {
        let result = toml::from_str::<Scenario>(&SCENARIO.replace("year_end = 2100", "year_end = 2000"));
        assert!(result.is_err());
    }

    #[test]
    fn missing_seed_is_a_configuration_error() {
        let result = from_toml_str::<SectorParameters>("capital_start = 120.0");
        assert!(matches!(result, Err(RsiamError::Configuration(_))));
    }

    #[test]
    fn invalid_value_is_a_parameter_error() {
        let result = from_toml_str::<SectorParameters>(
            r#"
            capital_start = 120.0
            productivity_start = 1.31
            productivity_gr_start = 0.0198
            output_gamma = 0.0
            "#,
        );
        assert!(matches!(
            result,
            Err(RsiamError::InvalidParameter { name, .. }) if name == "output_gamma"
        ));
    }

    #[test]
    fn short_investment_history() {
        let scenario = SCENARIO.replace(
            "investment_before_year_start = [1.0, 1.5, 2.0]",
            "investment_before_year_start = [2.0]",
        );
        let scenario: Scenario = toml::from_str(&scenario).unwrap();
        assert!(matches!(
            Forest::configure(scenario.years, scenario.forest),
            Err(RsiamError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn fitting_mode() {
        let parameters: SectorParameters = from_toml_str(
            r#"
            capital_start = 120.0
            productivity_start = 1.31
            productivity_gr_start = 0.0198

            [mode]
            mode = "fitting"
            historical_investment = [10.0, 10.5, 11.0]
            energy_eff_max_range_ref = 5.0
            "#,
        )
        .unwrap();
        let years = YearRange::new(2020, 2022, 1).unwrap();
        EconomicSector::configure("Industry", years, parameters.clone()).unwrap();

        let longer = YearRange::new(2020, 2030, 1).unwrap();
        assert!(matches!(
            EconomicSector::configure("Industry", longer, parameters),
            Err(RsiamError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn parameters_survive_a_round_trip() {
        let parameters = CarbonCycleParameters {
            b_twelve: 0.1,
            ..Default::default()
        };
        let text = to_toml_string(&parameters).unwrap();
        let back: CarbonCycleParameters = from_toml_str(&text).unwrap();
        assert_eq!(back, parameters);
    }
}

mod serialised_engines {
    use super::*;

    fn engines() -> Vec<Arc<dyn Discipline>> {
        let years = YearRange::new(2020, 2030, 1).unwrap();
        vec![
            Arc::new(
                EconomicSector::configure(
                    "Services",
                    years,
                    SectorParameters::with_seeds(80.0, 1.2, 0.015),
                )
                .unwrap(),
            ),
            Arc::new(GhgCycle::configure(years, GhgCycleParameters::default()).unwrap()),
            Arc::new(CarbonCycle::configure(years, CarbonCycleParameters::default()).unwrap()),
            Arc::new(Policy::configure(years, PolicyParameters::default()).unwrap()),
        ]
    }

    #[test]
    fn trait_objects_keep_their_type() {
        for engine in engines() {
            let json = serde_json::to_string(&engine).unwrap();
            let back: Arc<dyn Discipline> = serde_json::from_str(&json).unwrap();
            assert_eq!(back.name(), engine.name());
            assert_eq!(back.definitions(), engine.definitions());
        }
    }

    #[test]
    fn json_names_the_engine() {
        let engine: Arc<dyn Discipline> = engines().remove(3);
        let json = serde_json::to_value(&engine).unwrap();
        assert_eq!(json["type"], "Policy");
        assert_eq!(json["parameters"]["smooth_max_alpha"], 3.0);
    }

    #[test]
    fn unknown_engine_type() {
        let result = serde_json::from_str::<Arc<dyn Discipline>>(r#"{"type": "Ocean"}"#);
        assert!(result.is_err());
    }
}
