//! Error types for scubaduck.
//!
//! The compiler never panics on user-input shape issues — every stage
//! returns one of these kinds, which the HTTP layer maps to a status code
//! and a `{error, sql?, traceback?}` envelope (spec §4.I / §7).

use std::path::PathBuf;

/// Stable error kinds surfaced to clients.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The dataset file passed via `SCUBADUCK_DB` (or `--db`) does not exist.
    #[error("Database file not found: {}", path.display())]
    DatasetNotFound { path: PathBuf },

    /// A `start`/`end`/relative-time expression could not be parsed.
    #[error("{0}")]
    TimeParse(String),

    /// Unknown table/column, invalid graph-type/aggregate combination, or a
    /// non-temporal `x_axis` under `timeseries`.
    #[error("{0}")]
    Schema(String),

    /// An illegal filter value shape (e.g. a list paired with a non-`=` op).
    #[error("{0}")]
    FilterShape(String),

    /// The compiled SQL failed at the engine. Carries the SQL so the caller
    /// can display it alongside the failure.
    #[error("{message}")]
    Execution { message: String, sql: String },

    /// Anything else: a DuckDB binding failure not attributable to the
    /// query itself, or an I/O failure while loading the catalog.
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status code for this error kind (spec §4.I).
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::TimeParse(_) | Self::Schema(_) | Self::FilterShape(_) | Self::Execution { .. } => 400,
            Self::DatasetNotFound { .. } | Self::Database(_) | Self::Io(_) => 500,
        }
    }

    /// The generated SQL, when the error carries one (only `Execution`).
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Execution { sql, .. } => Some(sql),
            _ => None,
        }
    }
}

/// Result type alias for scubaduck operations.
pub type Result<T> = std::result::Result<T, Error>;
