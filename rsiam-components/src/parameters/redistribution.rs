use rsiam_core::config::{ensure, Validate};
use rsiam_core::errors::RsiamResult;
use rsiam_core::identifiers::Sector;
use serde::{Deserialize, Serialize};

/// Which sectors receive a share of total energy production
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedistributionParameters {
    /// Sectors of the economy
    /// default: Agriculture, Industry, Services
    #[serde(default = "default_sectors")]
    pub sectors: Vec<Sector>,
    /// Sector receiving whatever the explicit shares leave over
    /// default: Services
    #[serde(default = "default_deduced_sector")]
    pub deduced_sector: Sector,
}

fn default_sectors() -> Vec<Sector> {
    Sector::ALL.to_vec()
}
fn default_deduced_sector() -> Sector {
    Sector::Services
}

impl Default for RedistributionParameters {
    fn default() -> Self {
        Self {
            sectors: default_sectors(),
            deduced_sector: default_deduced_sector(),
        }
    }
}

impl RedistributionParameters {
    /// Sectors whose energy comes from an explicit share
    pub fn computed_sectors(&self) -> impl Iterator<Item = Sector> + '_ {
        self.sectors
            .iter()
            .copied()
            .filter(move |s| *s != self.deduced_sector)
    }
}

impl Validate for RedistributionParameters {
    fn validate(&self) -> RsiamResult<()> {
        ensure(
            self.sectors.contains(&self.deduced_sector),
            "deduced_sector",
            "must be one of `sectors`",
        )?;
        let mut sorted = self.sectors.clone();
        sorted.sort();
        sorted.dedup();
        ensure(
            sorted.len() == self.sectors.len(),
            "sectors",
            "must not repeat a sector",
        )
    }
}
