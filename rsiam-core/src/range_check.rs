//! Plausibility bounds on published and consumed tables.

use crate::errors::{RsiamError, RsiamResult};
use crate::table::YearTable;
use crate::years::FloatValue;
use serde::{Deserialize, Serialize};

/// Whether an engine checks its tables against their declared bounds on every compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RangeCheck {
    #[default]
    Disabled,
    Enabled,
}

/// Inclusive bounds for one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnBounds {
    pub column: String,
    pub min: FloatValue,
    pub max: FloatValue,
}

impl ColumnBounds {
    pub fn new(column: &str, min: FloatValue, max: FloatValue) -> Self {
        Self {
            column: column.to_string(),
            min,
            max,
        }
    }

    /// Bounds admitting any finite non-negative value
    pub fn non_negative(column: &str) -> Self {
        Self::new(column, 0.0, FloatValue::MAX)
    }
}

/// Check every bounded column of `table`
///
/// Every value must be finite and lie inside its bounds. A bounded column
/// missing from the table is an error too.
pub fn check_ranges(table: &YearTable, bounds: &[ColumnBounds]) -> RsiamResult<()> {
    for bound in bounds {
        let values = table.column(&bound.column)?;
        for (year, value) in table.years().iter().zip(values.iter()) {
            if !value.is_finite() {
                return Err(RsiamError::NonFinite {
                    quantity: format!("{}.{}", table.name(), bound.column),
                    year: *year,
                });
            }
            if *value < bound.min || *value > bound.max {
                return Err(RsiamError::OutOfRange {
                    table: table.name().to_string(),
                    column: bound.column.clone(),
                    year: *year,
                    value: *value,
                    min: bound.min,
                    max: bound.max,
                });
            }
        }
    }
    Ok(())
}

/// Check every column of `table` holds only finite values
pub fn check_finite(table: &YearTable) -> RsiamResult<()> {
    for (column, values) in table.iter() {
        if let Some(row) = values.iter().position(|v| !v.is_finite()) {
            return Err(RsiamError::NonFinite {
                quantity: format!("{}.{}", table.name(), column),
                year: table.years()[row],
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::years::YearRange;
    use ndarray::array;

    fn table() -> YearTable {
        YearTable::new("ghg_cycle", &YearRange::new(2020, 2022, 1).unwrap())
            .with_column("co2_ppm", array![410.0, 415.0, 2500.0])
            .unwrap()
    }

    #[test]
    fn out_of_range_names_column_and_year() {
        let err = check_ranges(&table(), &[ColumnBounds::new("co2_ppm", 0.0, 2000.0)]);
        match err {
            Err(RsiamError::OutOfRange {
                table,
                column,
                year,
                value,
                ..
            }) => {
                assert_eq!(table, "ghg_cycle");
                assert_eq!(column, "co2_ppm");
                assert_eq!(year, 2022);
                assert_eq!(value, 2500.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn in_range_passes() {
        check_ranges(&table(), &[ColumnBounds::non_negative("co2_ppm")]).unwrap();
    }

    #[test]
    fn nan_is_reported() {
        let t = table()
            .with_column("ch4_ppb", array![1.0, f64::NAN, 1.0])
            .unwrap();
        assert!(matches!(
            check_finite(&t),
            Err(RsiamError::NonFinite { year: 2021, .. })
        ));
        assert!(matches!(
            check_ranges(&t, &[ColumnBounds::non_negative("ch4_ppb")]),
            Err(RsiamError::NonFinite { .. })
        ));
    }

    #[test]
    fn missing_bounded_column() {
        assert!(matches!(
            check_ranges(&table(), &[ColumnBounds::non_negative("n2o_ppb")]),
            Err(RsiamError::MissingColumn { .. })
        ));
    }
}
