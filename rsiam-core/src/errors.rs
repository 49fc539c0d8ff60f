use crate::years::Year;
use thiserror::Error;

/// Error type for invalid operations.
///
/// Configuration and range-validation errors are raised before or during
/// `compute` and abort it without partial results.
/// Numeric errors are raised at the formula that would otherwise produce `NaN` or `inf`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RsiamError {
    #[error("{0}")]
    Error(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("Invalid year range: start={start}, end={end}, step={step}")]
    InvalidYearRange { start: Year, end: Year, step: Year },
    #[error("Table `{table}` has {found} rows, expected {expected}")]
    LengthMismatch {
        table: String,
        expected: usize,
        found: usize,
    },
    #[error("Table `{table}` row {row} has year {found}, expected {expected}")]
    YearMismatch {
        table: String,
        row: usize,
        expected: Year,
        found: Year,
    },
    #[error("Table `{table}` has no column `{column}`")]
    MissingColumn { table: String, column: String },
    #[error("Missing coupling input: {0}")]
    MissingInput(String),

    #[error("Division by zero computing `{quantity}` in {year}")]
    DivisionByZero { quantity: String, year: Year },
    #[error("`{quantity}` is outside its domain in {year} (value={value}): {reason}")]
    Domain {
        quantity: String,
        year: Year,
        value: f64,
        reason: String,
    },
    #[error("`{quantity}` is not finite in {year}")]
    NonFinite { quantity: String, year: Year },

    #[error("Column `{column}` of table `{table}` is out of range in {year}: {value} not in [{min}, {max}]")]
    OutOfRange {
        table: String,
        column: String,
        year: Year,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Jacobian `{pair}` has {count} mismatching entries, first at row {row}, col {col}: analytic={analytic}, numeric={numeric}")]
    JacobianMismatch {
        pair: String,
        count: usize,
        row: usize,
        col: usize,
        analytic: f64,
        numeric: f64,
    },
    #[error("No derivative of `{output}` with respect to `{input}`")]
    UnsupportedJacobian { output: String, input: String },

    #[error("Table `{variable}` is produced by both `{first}` and `{second}`")]
    DuplicateProducer {
        variable: String,
        first: String,
        second: String,
    },
    #[error("Coupling graph contains a cycle through `{0}`")]
    CyclicCoupling(String),
    #[error("Table `{variable}` is declared with unit `{producer}` by its producer and `{consumer}` by a consumer")]
    UnitMismatch {
        variable: String,
        producer: String,
        consumer: String,
    },
}

/// Convenience type for `Result<T, RsiamError>`.
pub type RsiamResult<T> = Result<T, RsiamError>;
