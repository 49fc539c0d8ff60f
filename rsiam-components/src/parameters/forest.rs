//! Forest and wood parameters.
//!
//! Surfaces are in Gha, investments in G$ and costs per hectare in $/ha, so
//! that an investment divided by a cost per hectare is a surface.

use rsiam_core::config::{ensure, ensure_positive, ensure_within, Validate};
use rsiam_core::errors::{RsiamError, RsiamResult};
use rsiam_core::years::FloatValue;
use serde::{Deserialize, Serialize};

/// Wood production technology shared by managed and unmanaged wood
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WoodTechno {
    /// Years between an investment and the surface it pays for
    /// unit: yr
    /// default: 3
    #[serde(default = "default_construction_delay")]
    pub construction_delay: usize,
    /// Wood volume per hectare
    /// unit: m^3 / ha
    /// default: 640.0
    #[serde(default = "default_density_per_ha")]
    pub density_per_ha: FloatValue,
    /// Mean wood density
    /// unit: kg / m^3
    /// default: 600.0
    #[serde(default = "default_density")]
    pub density: FloatValue,
    /// unit: yr
    /// default: 25.0
    #[serde(default = "default_years_between_harvest")]
    pub years_between_harvest: FloatValue,
    /// Share of harvested wood that is recycled, in [0, 1)
    /// default: 0.52
    #[serde(default = "default_recycle_part")]
    pub recycle_part: FloatValue,
    /// Share of biomass left as residues
    /// default: 0.34
    #[serde(default = "default_residue_density_percentage")]
    pub residue_density_percentage: FloatValue,
    /// Share of residues used for energy
    /// default: 0.48
    #[serde(default = "default_energy_percentage")]
    pub residue_percentage_for_energy: FloatValue,
    /// Share of wood used for energy
    /// default: 0.48
    #[serde(default = "default_energy_percentage")]
    pub wood_percentage_for_energy: FloatValue,
    /// unit: $ / ha
    /// default: 14872.0
    #[serde(default = "default_managed_wood_price_per_ha")]
    pub managed_wood_price_per_ha: FloatValue,
    /// unit: $ / ha
    /// default: 11500.0
    #[serde(default = "default_unmanaged_wood_price_per_ha")]
    pub unmanaged_wood_price_per_ha: FloatValue,
}

fn default_construction_delay() -> usize {
    3
}
fn default_density_per_ha() -> FloatValue {
    640.0
}
fn default_density() -> FloatValue {
    600.0
}
fn default_years_between_harvest() -> FloatValue {
    25.0
}
fn default_recycle_part() -> FloatValue {
    0.52
}
fn default_residue_density_percentage() -> FloatValue {
    0.34
}
fn default_energy_percentage() -> FloatValue {
    0.48
}
fn default_managed_wood_price_per_ha() -> FloatValue {
    14872.0
}
fn default_unmanaged_wood_price_per_ha() -> FloatValue {
    11500.0
}

impl Default for WoodTechno {
    fn default() -> Self {
        Self {
            construction_delay: default_construction_delay(),
            density_per_ha: default_density_per_ha(),
            density: default_density(),
            years_between_harvest: default_years_between_harvest(),
            recycle_part: default_recycle_part(),
            residue_density_percentage: default_residue_density_percentage(),
            residue_percentage_for_energy: default_energy_percentage(),
            wood_percentage_for_energy: default_energy_percentage(),
            managed_wood_price_per_ha: default_managed_wood_price_per_ha(),
            unmanaged_wood_price_per_ha: default_unmanaged_wood_price_per_ha(),
        }
    }
}

impl WoodTechno {
    /// Yearly biomass production per hectare of new surface
    /// unit: Mt / Gha
    pub fn biomass_per_surface(&self) -> FloatValue {
        self.density_per_ha * self.density / self.years_between_harvest / (1.0 - self.recycle_part)
    }

    /// Share of biomass production that ends up as energy, residues and wood together
    pub fn energy_share(&self) -> FloatValue {
        self.residue_density_percentage * self.residue_percentage_for_energy
            + (1.0 - self.residue_density_percentage) * self.wood_percentage_for_energy
    }
}

/// Initial state of one kind of wood
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WoodStock {
    /// Biomass production in the first year
    /// unit: TWh
    pub initial_production: FloatValue,
    /// unit: Gha
    pub initial_surface: FloatValue,
    /// Investment in the years before the first simulated year, oldest first
    ///
    /// The last `construction_delay` values pay for the surface of the first years.
    /// unit: G$
    pub investment_before_year_start: Vec<FloatValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParameters {
    /// Deforestation is capped so the global forest surface never drops below `-limit / 1000`
    /// unit: Mha
    /// default: 1000.0
    #[serde(default = "default_limit_deforestation_surface")]
    pub limit_deforestation_surface: FloatValue,
    /// CO2 stored per hectare of forest
    /// unit: tCO2 / ha
    /// default: 4000.0
    #[serde(default = "default_co2_per_ha")]
    pub co2_per_ha: FloatValue,
    /// Emissions from deforestation before the first simulated year
    /// unit: GtCO2
    /// default: 3.21
    #[serde(default = "default_initial_emissions")]
    pub initial_emissions: FloatValue,
    /// unit: $ / ha
    /// default: 13800.0
    #[serde(default = "default_reforestation_cost_per_ha")]
    pub reforestation_cost_per_ha: FloatValue,
    /// Forest that is neither managed nor unmanaged wood
    /// unit: Gha
    pub initial_unused_forest_surface: FloatValue,
    #[serde(default)]
    pub wood_techno: WoodTechno,
    pub managed_wood: WoodStock,
    pub unmanaged_wood: WoodStock,
}

fn default_limit_deforestation_surface() -> FloatValue {
    1000.0
}
fn default_co2_per_ha() -> FloatValue {
    4000.0
}
fn default_initial_emissions() -> FloatValue {
    3.21
}
fn default_reforestation_cost_per_ha() -> FloatValue {
    13800.0
}

impl Validate for ForestParameters {
    fn validate(&self) -> RsiamResult<()> {
        ensure(
            self.limit_deforestation_surface.is_finite() && self.limit_deforestation_surface >= 0.0,
            "limit_deforestation_surface",
            "must be finite and >= 0",
        )?;
        ensure(self.co2_per_ha.is_finite(), "co2_per_ha", "must be finite")?;
        ensure(
            self.initial_emissions.is_finite(),
            "initial_emissions",
            "must be finite",
        )?;
        ensure_positive(self.reforestation_cost_per_ha, "reforestation_cost_per_ha")?;
        ensure(
            self.initial_unused_forest_surface.is_finite(),
            "initial_unused_forest_surface",
            "must be finite",
        )?;

        let w = &self.wood_techno;
        ensure_positive(w.density_per_ha, "density_per_ha")?;
        ensure_positive(w.density, "density")?;
        ensure_positive(w.years_between_harvest, "years_between_harvest")?;
        ensure(
            w.recycle_part.is_finite() && (0.0..1.0).contains(&w.recycle_part),
            "recycle_part",
            "must lie in [0, 1)",
        )?;
        ensure_within(w.residue_density_percentage, 0.0, 1.0, "residue_density_percentage")?;
        ensure_within(
            w.residue_percentage_for_energy,
            0.0,
            1.0,
            "residue_percentage_for_energy",
        )?;
        ensure_within(w.wood_percentage_for_energy, 0.0, 1.0, "wood_percentage_for_energy")?;
        ensure_positive(w.managed_wood_price_per_ha, "managed_wood_price_per_ha")?;
        ensure_positive(w.unmanaged_wood_price_per_ha, "unmanaged_wood_price_per_ha")?;

        for (name, stock) in [
            ("managed_wood", &self.managed_wood),
            ("unmanaged_wood", &self.unmanaged_wood),
        ] {
            if stock.investment_before_year_start.len() < w.construction_delay {
                return Err(RsiamError::InvalidParameter {
                    name: format!("{}.investment_before_year_start", name),
                    reason: format!(
                        "needs at least construction_delay = {} values, got {}",
                        w.construction_delay,
                        stock.investment_before_year_start.len()
                    ),
                });
            }
            ensure(
                stock.initial_production.is_finite()
                    && stock.initial_surface.is_finite()
                    && stock.investment_before_year_start.iter().all(|v| v.is_finite()),
                name,
                "initial values must be finite",
            )?;
        }
        Ok(())
    }
}
