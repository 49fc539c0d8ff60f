//! Year-indexed tables with named columns.
//!
//! A [`YearTable`] is the unit of exchange between engines: coupling inputs are
//! supplied as tables, and every engine publishes its results as tables.
//! Columns keep their insertion order so published tables read the same way
//! every run.

use crate::errors::{RsiamError, RsiamResult};
use crate::years::{FloatValue, Year, YearRange};
use indexmap::IndexMap;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawYearTable")]
pub struct YearTable {
    name: String,
    years: Vec<Year>,
    columns: IndexMap<String, Array1<FloatValue>>,
}

#[derive(Deserialize)]
struct RawYearTable {
    name: String,
    years: Vec<Year>,
    #[serde(default)]
    columns: IndexMap<String, Array1<FloatValue>>,
}

impl TryFrom<RawYearTable> for YearTable {
    type Error = RsiamError;

    fn try_from(value: RawYearTable) -> Result<Self, Self::Error> {
        let mut table = YearTable::from_years(&value.name, value.years)?;
        for (column, values) in value.columns {
            table.insert(&column, values)?;
        }
        Ok(table)
    }
}

impl YearTable {
    /// Create a table without columns indexed by every year of `range`
    pub fn new(name: &str, range: &YearRange) -> Self {
        Self {
            name: name.to_string(),
            years: range.to_vec(),
            columns: IndexMap::new(),
        }
    }

    /// Create a table over an arbitrary year index
    ///
    /// The years must be strictly increasing.
    pub fn from_years(name: &str, years: Vec<Year>) -> RsiamResult<Self> {
        if let Some(row) = years.windows(2).position(|w| w[1] <= w[0]) {
            return Err(RsiamError::YearMismatch {
                table: name.to_string(),
                row: row + 1,
                expected: years[row] + 1,
                found: years[row + 1],
            });
        }
        Ok(Self {
            name: name.to_string(),
            years,
            columns: IndexMap::new(),
        })
    }

    /// Builder-style variant of [`YearTable::insert`]
    pub fn with_column(
        mut self,
        column: &str,
        values: impl Into<Array1<FloatValue>>,
    ) -> RsiamResult<Self> {
        self.insert(column, values.into())?;
        Ok(self)
    }

    /// Add or overwrite a column
    pub fn insert(&mut self, column: &str, values: Array1<FloatValue>) -> RsiamResult<()> {
        if values.len() != self.years.len() {
            return Err(RsiamError::LengthMismatch {
                table: format!("{}.{}", self.name, column),
                expected: self.years.len(),
                found: values.len(),
            });
        }
        self.columns.insert(column.to_string(), values);
        Ok(())
    }

    /// Copy of the table with one column replaced
    pub fn replacing(&self, column: &str, values: Array1<FloatValue>) -> RsiamResult<Self> {
        self.column(column)?;
        let mut table = self.clone();
        table.insert(column, values)?;
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn years(&self) -> &[Year] {
        &self.years
    }

    pub fn len(&self) -> usize {
        self.years.len()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn column(&self, column: &str) -> RsiamResult<&Array1<FloatValue>> {
        self.columns
            .get(column)
            .ok_or_else(|| RsiamError::MissingColumn {
                table: self.name.clone(),
                column: column.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Array1<FloatValue>)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn row_of(&self, year: Year) -> Option<usize> {
        self.years.binary_search(&year).ok()
    }

    /// Value of `column` in `year`
    pub fn value(&self, column: &str, year: Year) -> RsiamResult<FloatValue> {
        let values = self.column(column)?;
        let row = self.row_of(year).ok_or_else(|| {
            RsiamError::Error(format!("Year {} is not in table `{}`", year, self.name))
        })?;
        Ok(values[row])
    }

    /// Value of `column` in the row before `year`
    ///
    /// Returns `None` for the first year of the table or for a year that is not in the index.
    pub fn previous(&self, column: &str, year: Year) -> Option<FloatValue> {
        let row = self.row_of(year)?;
        let values = self.columns.get(column)?;
        row.checked_sub(1).map(|r| values[r])
    }

    /// Fill `column` with a first-order forward recurrence.
    ///
    /// Row 0 takes `seed`; row `i` is `step(i, value[i - 1])`.
    pub fn fill_recurrence<F>(&mut self, column: &str, seed: FloatValue, mut step: F) -> RsiamResult<()>
    where
        F: FnMut(usize, FloatValue) -> RsiamResult<FloatValue>,
    {
        let mut values = Array1::zeros(self.years.len());
        if !values.is_empty() {
            values[0] = seed;
        }
        for i in 1..values.len() {
            values[i] = step(i, values[i - 1])?;
        }
        self.insert(column, values)
    }

    /// Row-wise sum of every column
    pub fn sum_columns(&self) -> Array1<FloatValue> {
        self.columns
            .values()
            .fold(Array1::zeros(self.years.len()), |acc, c| acc + c)
    }

    /// Check that the table is indexed exactly by `range`
    pub fn validate_against(&self, range: &YearRange) -> RsiamResult<()> {
        if self.years.len() != range.len() {
            return Err(RsiamError::LengthMismatch {
                table: self.name.clone(),
                expected: range.len(),
                found: self.years.len(),
            });
        }
        for (row, (found, expected)) in self.years.iter().zip(range.years()).enumerate() {
            if *found != expected {
                return Err(RsiamError::YearMismatch {
                    table: self.name.clone(),
                    row,
                    expected,
                    found: *found,
                });
            }
        }
        Ok(())
    }

    /// Validate the index against `range` and return a copy of `column`
    pub fn aligned_column(
        &self,
        range: &YearRange,
        column: &str,
    ) -> RsiamResult<Array1<FloatValue>> {
        self.validate_against(range)?;
        Ok(self.column(column)?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn range() -> YearRange {
        YearRange::new(2020, 2024, 1).unwrap()
    }

    #[test]
    fn insert_checks_length() {
        let mut table = YearTable::new("capital", &range());
        assert!(table.insert("capital", array![1.0, 2.0]).is_err());
        table
            .insert("capital", array![1.0, 2.0, 3.0, 4.0, 5.0])
            .unwrap();
        assert_eq!(table.value("capital", 2022).unwrap(), 3.0);
    }

    #[test]
    fn previous_year_lookup() {
        let table = YearTable::new("t", &range())
            .with_column("x", array![1.0, 2.0, 3.0, 4.0, 5.0])
            .unwrap();
        assert_eq!(table.previous("x", 2020), None);
        assert_eq!(table.previous("x", 2023), Some(3.0));
        assert_eq!(table.previous("x", 2030), None);
        assert_eq!(table.previous("y", 2023), None);
    }

    #[test]
    fn recurrence_fill() {
        let mut table = YearTable::new("t", &range());
        table
            .fill_recurrence("k", 100.0, |_, prev| Ok(prev * 0.5))
            .unwrap();
        assert_eq!(
            table.column("k").unwrap(),
            &array![100.0, 50.0, 25.0, 12.5, 6.25]
        );
    }

    #[test]
    fn missing_column_names_table() {
        let table = YearTable::new("damage", &range());
        match table.column("damage_frac_output") {
            Err(RsiamError::MissingColumn { table, column }) => {
                assert_eq!(table, "damage");
                assert_eq!(column, "damage_frac_output");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn validate_against_range() {
        let table = YearTable::from_years("w", vec![2020, 2021, 2023, 2024, 2025]).unwrap();
        match table.validate_against(&range()) {
            Err(RsiamError::YearMismatch {
                row,
                expected,
                found,
                ..
            }) => {
                assert_eq!(row, 2);
                assert_eq!(expected, 2022);
                assert_eq!(found, 2023);
            }
            other => panic!("unexpected {:?}", other),
        }

        let short = YearTable::from_years("w", vec![2020, 2021]).unwrap();
        assert!(matches!(
            short.validate_against(&range()),
            Err(RsiamError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn unsorted_years_rejected() {
        assert!(YearTable::from_years("w", vec![2020, 2020]).is_err());
        assert!(YearTable::from_years("w", vec![2021, 2020]).is_err());
    }

    #[test]
    fn sum_and_order() {
        let table = YearTable::new("land", &range())
            .with_column("b", array![1.0, 1.0, 1.0, 1.0, 1.0])
            .unwrap()
            .with_column("a", array![0.5, 0.5, 0.5, 0.5, 0.5])
            .unwrap();
        assert_eq!(table.column_names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(table.sum_columns(), array![1.5, 1.5, 1.5, 1.5, 1.5]);
    }

    #[test]
    fn serde_roundtrip() {
        let table = YearTable::new("t", &range())
            .with_column("x", array![1.0, 2.0, 3.0, 4.0, 5.0])
            .unwrap();
        let json = serde_json::to_string(&table).unwrap();
        let back: YearTable = serde_json::from_str(&json).unwrap();
        assert_eq!(table, back);
    }

    #[test]
    fn deserialising_checks_the_index() {
        let unsorted = r#"{"name": "t", "years": [2021, 2020], "columns": {}}"#;
        assert!(serde_json::from_str::<YearTable>(unsorted).is_err());

        let short_column = r#"{
            "name": "t",
            "years": [2020, 2021, 2022],
            "columns": {"x": {"v": 1, "dim": [2], "data": [1.0, 2.0]}}
        }"#;
        assert!(serde_json::from_str::<YearTable>(short_column).is_err());

        let valid = r#"{
            "name": "t",
            "years": [2020, 2021],
            "columns": {"x": {"v": 1, "dim": [2], "data": [1.0, 2.0]}}
        }"#;
        let table: YearTable = serde_json::from_str(valid).unwrap();
        assert_eq!(table.value("x", 2021).unwrap(), 2.0);
    }
}
