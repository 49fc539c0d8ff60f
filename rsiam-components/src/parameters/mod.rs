//! Engine parameters
//!
//! Each struct deserializes from TOML through
//! [`rsiam_core::config::from_toml_str`], which validates it.

pub mod carbon_cycle;
pub mod emissions;
pub mod forest;
pub mod ghg_cycle;
pub mod policy;
pub mod redistribution;
pub mod sector;

pub use carbon_cycle::CarbonCycleParameters;
pub use emissions::EmissionsParameters;
pub use forest::{ForestParameters, WoodStock, WoodTechno};
pub use ghg_cycle::{DecayingGas, GhgCycleParameters};
pub use policy::PolicyParameters;
pub use redistribution::RedistributionParameters;
pub use sector::{SectorMode, SectorParameters};
