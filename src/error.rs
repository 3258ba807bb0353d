use thiserror::Error;

/// Errors produced while querying or importing fitness records.
#[derive(Error, Debug)]
pub enum FitnessError {
    /// A scope was requested without the college/class values it needs.
    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    /// A trend range whose start comes after its end.
    #[error("Invalid year range: {start} is after {end}")]
    InvalidYearRange { start: i32, end: i32 },

    /// A gender filter that is neither `all`, `male` nor `female`.
    #[error("Invalid gender filter: {0}")]
    InvalidGender(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// A year-scoped delete targeted a year with no records.
    #[error("No records found for year {0}")]
    YearNotFound(i32),

    /// The year replace was rolled back; the prior records are untouched.
    #[error("Import for year {year} failed and was rolled back: {source}")]
    ImportFailed {
        year: i32,
        #[source]
        source: sqlx::Error,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Schema migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// The spreadsheet export could not be read as CSV.
    #[error("Failed to read spreadsheet export: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FitnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_year_range_names_both_bounds() {
        let err = FitnessError::InvalidYearRange {
            start: 2024,
            end: 2021,
        };
        assert_eq!(err.to_string(), "Invalid year range: 2024 is after 2021");
    }

    #[test]
    fn year_not_found_display() {
        let err = FitnessError::YearNotFound(2019);
        assert_eq!(err.to_string(), "No records found for year 2019");
    }

    #[test]
    fn import_failure_keeps_storage_cause() {
        let err = FitnessError::ImportFailed {
            year: 2023,
            source: sqlx::Error::RowNotFound,
        };
        let msg = err.to_string();
        assert!(msg.contains("2023"));
        assert!(msg.contains("rolled back"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn io_errors_convert() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing export");
        let err: FitnessError = io_err.into();
        assert!(err.to_string().contains("missing export"));
    }
}
