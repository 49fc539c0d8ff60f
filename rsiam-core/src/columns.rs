//! Names of tables and columns exchanged between engines.
//!
//! Engine-private columns are declared next to the engine that publishes them.

use crate::identifiers::Gas;

pub const TABLE_ENERGY_PRODUCTION: &str = "energy_production";
pub const COL_TOTAL_PRODUCTION: &str = "Total production";

pub const TABLE_DAMAGE: &str = "damage_df";
pub const COL_DAMAGE_FRAC_OUTPUT: &str = "damage_frac_output";

pub const TABLE_WORKFORCE: &str = "workforce_df";
pub const TABLE_SECTOR_INVESTMENT: &str = "sectors_investment_df";

pub const TABLE_GHG_ENERGY_EMISSIONS: &str = "GHG_total_energy_emissions";
pub const TABLE_GHG_EMISSIONS: &str = "GHG_emissions_df";
pub const TABLE_CO2_EMISSIONS: &str = "co2_emissions_Gt";
pub const COL_CO2_TOTAL_EMISSIONS: &str = "total_emissions";

pub const TABLE_CO2_DAMAGE_PRICE: &str = "CO2_damage_price";
pub const COL_CO2_DAMAGE_PRICE: &str = "CO2_damage_price";
pub const TABLE_CCS_PRICE: &str = "CCS_price";
pub const COL_CCS_PRICE: &str = "ccs_price_per_tCO2";
pub const TABLE_CO2_TAX: &str = "CO2_taxes";
pub const COL_CO2_TAX: &str = "CO2_tax";

/// `Total {gas} emissions`, the per-gas column of energy and total emission tables
pub fn total_emissions(gas: Gas) -> String {
    format!("Total {} emissions", gas)
}

/// `{gas} land_emissions`
pub fn land_emissions(gas: Gas) -> String {
    format!("{} land_emissions", gas)
}

/// `{gas}_land_emissions`, one column per land use
pub fn land_emissions_table(gas: Gas) -> String {
    format!("{}_land_emissions", gas)
}

/// `{gas}_{horizon}`, GWP-weighted emissions
pub fn gwp_emissions(gas: Gas, horizon: crate::identifiers::GwpHorizon) -> String {
    format!("{}_{}", gas, horizon.suffix())
}

/// Per-sector table name, e.g. `Industry.energy_production`
pub fn sector_table(sector: &str, table: &str) -> String {
    format!("{}.{}", sector, table)
}
