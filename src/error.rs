// Error taxonomy for ingestion, storage and queries
//
// File-level failures abort a run, row-level failures are counted and skipped,
// query validation failures turn into the neutral result shape.

use std::path::PathBuf;
use thiserror::Error;

/// Row-level failure while decoding a CSV row into a transfer.
/// Never aborts an ingestion run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("composite field '{0}' has no '_' separator")]
    MissingSeparator(String),

    #[error("composite field '{0}' has an empty date part")]
    MissingDate(String),

    #[error("composite field '{0}' has an empty seconds part")]
    MissingSeconds(String),

    #[error("seconds part '{0}' is not numeric")]
    InvalidSeconds(String),

    #[error("seconds part '{0}' must be a finite, non-negative number")]
    OutOfRangeSeconds(String),

    #[error("{column} '{value}' is not a valid amount")]
    InvalidAmount { column: &'static str, value: String },
}

/// Storage failure. Wraps the SQLite error so callers never see rusqlite types.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database connection lock poisoned")]
    Poisoned,
}

/// Startup-time schema creation failure. Fatal.
#[derive(Debug, Error)]
#[error("failed to initialize schema: {0}")]
pub struct SchemaInitError(#[from] pub rusqlite::Error);

/// File-level ingestion failure. Nothing was written when this is returned.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("CSV parse error at line {line}: {message}")]
    Parse { line: u64, message: String },

    #[error("CSV header is missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("failed to read upload {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid ingest options: {0}")]
    InvalidOptions(String),
}

impl IngestError {
    pub(crate) fn from_csv(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        IngestError::Parse {
            line,
            message: err.to_string(),
        }
    }
}

/// Query parameters present but unusable. Rendered as the neutral result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing required parameter '{0}'")]
    Missing(&'static str),

    #[error("'{value}' is not a DD-MM-YYYY date")]
    BadDate { value: String },

    #[error("'{value}' is not a valid amount")]
    BadAmount { value: String },

    #[error("range start '{start}' is after range end '{end}'")]
    InvertedRange { start: String, end: String },
}
