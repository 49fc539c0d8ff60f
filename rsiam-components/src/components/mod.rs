pub mod carbon_cycle;
pub mod emissions;
pub mod forest;
pub mod ghg_cycle;
pub mod policy;
pub mod redistribution;
pub mod sector;

pub use carbon_cycle::{CarbonCycle, CarbonCycleInputs, CarbonCycleRun};
pub use emissions::{EmissionsAggregation, EmissionsInputs, EmissionsRun};
pub use forest::{Forest, ForestInputs, ForestRun};
pub use ghg_cycle::{GhgCycle, GhgCycleInputs, GhgCycleRun};
pub use policy::{Policy, PolicyInputs, PolicyRun};
pub use redistribution::{EnergyRedistribution, RedistributionInputs, RedistributionRun};
pub use sector::{EconomicSector, SectorInputs, SectorRun};
