//! Error types shared by the analysis units.

use crate::store::StoreError;
use chrono::NaiveDate;
use std::fmt;

/// Errors that abort a single analysis unit's run.
///
/// Recoverable conditions (zero/missing denominators, unmatched join keys,
/// missing values inside a window) never reach this type: they resolve to
/// `0` or to the `Null` marker locally. Everything here is fatal for the
/// unit: no output is written and the scheduler decides on the rerun.
#[derive(Debug)]
pub enum AnalysisError {
    /// Reading from or writing to a table store failed
    Store(StoreError),
    /// A required column is absent from the input table
    MissingColumn { context: String, column: String },
    /// Two rows share the same date within one partition
    DuplicateDate { partition: String, date: NaiveDate },
    /// A nested source field could not be flattened to a scalar
    MalformedField { column: String, path: String },
    /// Invalid or unusable configuration value
    Config(String),
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::Store(err) => write!(f, "store error: {}", err),
            AnalysisError::MissingColumn { context, column } => {
                write!(f, "{}: missing column '{}'", context, column)
            }
            AnalysisError::DuplicateDate { partition, date } => {
                write!(f, "duplicate date {} within partition [{}]", date, partition)
            }
            AnalysisError::MalformedField { column, path } => {
                write!(f, "malformed nested field '{}' at path '{}'", column, path)
            }
            AnalysisError::Config(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl std::error::Error for AnalysisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AnalysisError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for AnalysisError {
    fn from(err: StoreError) -> Self {
        AnalysisError::Store(err)
    }
}
