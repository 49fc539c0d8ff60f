//! Closed sets of gases, economic sectors and economic sections.
//!
//! Table columns that used to be built from strings at lookup time are derived
//! from these enums, so a misspelt gas or section is a compile error.

use crate::years::FloatValue;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Gas {
    CO2,
    CH4,
    N2O,
}

impl Gas {
    pub const ALL: [Gas; 3] = [Gas::CO2, Gas::CH4, Gas::N2O];

    pub fn name(&self) -> &'static str {
        match self {
            Gas::CO2 => "CO2",
            Gas::CH4 => "CH4",
            Gas::N2O => "N2O",
        }
    }
}

impl fmt::Display for Gas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One value per gas
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerGas<T> {
    #[serde(rename = "CO2")]
    pub co2: T,
    #[serde(rename = "CH4")]
    pub ch4: T,
    #[serde(rename = "N2O")]
    pub n2o: T,
}

impl<T> PerGas<T> {
    pub fn new(co2: T, ch4: T, n2o: T) -> Self {
        Self { co2, ch4, n2o }
    }

    pub fn get(&self, gas: Gas) -> &T {
        match gas {
            Gas::CO2 => &self.co2,
            Gas::CH4 => &self.ch4,
            Gas::N2O => &self.n2o,
        }
    }

    pub fn get_mut(&mut self, gas: Gas) -> &mut T {
        match gas {
            Gas::CO2 => &mut self.co2,
            Gas::CH4 => &mut self.ch4,
            Gas::N2O => &mut self.n2o,
        }
    }

    pub fn from_fn<F: FnMut(Gas) -> T>(mut f: F) -> Self {
        Self {
            co2: f(Gas::CO2),
            ch4: f(Gas::CH4),
            n2o: f(Gas::N2O),
        }
    }

    pub fn try_from_fn<E, F>(mut f: F) -> Result<Self, E>
    where
        F: FnMut(Gas) -> Result<T, E>,
    {
        Ok(Self {
            co2: f(Gas::CO2)?,
            ch4: f(Gas::CH4)?,
            n2o: f(Gas::N2O)?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (Gas, &T)> {
        Gas::ALL.into_iter().map(move |g| (g, self.get(g)))
    }
}

/// Global warming potentials
impl PerGas<FloatValue> {
    /// 20-year horizon
    pub fn gwp_20() -> Self {
        Self::new(1.0, 85.0, 265.0)
    }

    /// 100-year horizon
    pub fn gwp_100() -> Self {
        Self::new(1.0, 28.0, 265.0)
    }
}

/// Horizon of a global warming potential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GwpHorizon {
    Twenty,
    Hundred,
}

impl GwpHorizon {
    pub fn suffix(&self) -> &'static str {
        match self {
            GwpHorizon::Twenty => "20",
            GwpHorizon::Hundred => "100",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sector {
    Agriculture,
    Industry,
    Services,
}

impl Sector {
    pub const ALL: [Sector; 3] = [Sector::Agriculture, Sector::Industry, Sector::Services];

    pub fn name(&self) -> &'static str {
        match self {
            Sector::Agriculture => "Agriculture",
            Sector::Industry => "Industry",
            Sector::Services => "Services",
        }
    }

    pub fn sections(&self) -> &'static [Section] {
        use Section::*;
        match self {
            Sector::Agriculture => &[A],
            Sector::Industry => &[B, C, D, E, F],
            Sector::Services => &[G, H, I, J, K, L, M, N, O, P, Q, R, S, T],
        }
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Economic activity sections (NACE rev. 2, top level)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Section {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
    P,
    Q,
    R,
    S,
    T,
}

impl Section {
    /// Column label
    pub fn name(&self) -> &'static str {
        use Section::*;
        match self {
            A => "Agriculture, forestry and fishing",
            B => "Mining and quarrying",
            C => "Manufacturing",
            D => "Electricity, gas, steam and air conditioning supply",
            E => "Water supply; sewerage, waste management and remediation activities",
            F => "Construction",
            G => "Wholesale and retail trade; repair of motor vehicles and motorcycles",
            H => "Transportation and storage",
            I => "Accommodation and food service activities",
            J => "Information and communication",
            K => "Financial and insurance activities",
            L => "Real estate activities",
            M => "Professional, scientific and technical activities",
            N => "Administrative and support service activities",
            O => "Public administration and defence; compulsory social security",
            P => "Education",
            Q => "Human health and social work activities",
            R => "Arts, entertainment and recreation",
            S => "Other service activities",
            T => "Activities of households as employers",
        }
    }

    pub fn sector(&self) -> Sector {
        Sector::ALL
            .into_iter()
            .find(|s| s.sections().contains(self))
            .unwrap_or(Sector::Services)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
