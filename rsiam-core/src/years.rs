//! The canonical year index shared by every table in a run.

use crate::errors::{RsiamError, RsiamResult};
use serde::{Deserialize, Serialize};

pub type Year = i64;
pub type FloatValue = f64;

/// An inclusive, evenly spaced range of simulation years.
///
/// Invariants: `year_end >= year_start` and `time_step >= 1`.
/// The last year is the last point of the grid that does not exceed `year_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawYearRange")]
pub struct YearRange {
    year_start: Year,
    year_end: Year,
    time_step: Year,
}

#[derive(Deserialize)]
struct RawYearRange {
    year_start: Year,
    year_end: Year,
    #[serde(default = "default_time_step")]
    time_step: Year,
}

fn default_time_step() -> Year {
    1
}

impl TryFrom<RawYearRange> for YearRange {
    type Error = RsiamError;

    fn try_from(value: RawYearRange) -> Result<Self, Self::Error> {
        YearRange::new(value.year_start, value.year_end, value.time_step)
    }
}

impl YearRange {
    pub fn new(year_start: Year, year_end: Year, time_step: Year) -> RsiamResult<Self> {
        if year_end < year_start || time_step < 1 {
            return Err(RsiamError::InvalidYearRange {
                start: year_start,
                end: year_end,
                step: time_step,
            });
        }
        Ok(Self {
            year_start,
            year_end,
            time_step,
        })
    }

    pub fn year_start(&self) -> Year {
        self.year_start
    }

    /// Last year on the grid
    pub fn year_end(&self) -> Year {
        self.year_at(self.len() - 1)
    }

    pub fn time_step(&self) -> Year {
        self.time_step
    }

    /// Time step as a float, for use in rate formulas
    pub fn dt(&self) -> FloatValue {
        self.time_step as FloatValue
    }

    /// Number of years on the grid, always at least one
    pub fn len(&self) -> usize {
        ((self.year_end - self.year_start) / self.time_step) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn year_at(&self, index: usize) -> Year {
        self.year_start + index as Year * self.time_step
    }

    /// Position of `year` on the grid, if it is on it
    pub fn index_of(&self, year: Year) -> Option<usize> {
        let offset = year - self.year_start;
        if offset < 0 || offset % self.time_step != 0 {
            return None;
        }
        let index = (offset / self.time_step) as usize;
        (index < self.len()).then_some(index)
    }

    pub fn years(&self) -> impl Iterator<Item = Year> + '_ {
        (0..self.len()).map(|i| self.year_at(i))
    }

    pub fn to_vec(&self) -> Vec<Year> {
        self.years().collect()
    }
}
