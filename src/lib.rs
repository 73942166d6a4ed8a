// Bank Transfers - Core Library
// CSV ingestion and query layer shared by the CLI, the API server, and tests

pub mod config;
pub mod db;
pub mod decode;
pub mod error;
pub mod ingest;
pub mod query;

#[cfg(feature = "server")]
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use db::{
    init_schema, DailyCredit, Matches, NewTransfer, SqliteStore, TransferRecord, TransferSink,
    TransferSource,
};
pub use decode::{date_key, decode_composite, format_clock, parse_amount, DecodedTime};
pub use error::{DecodeError, IngestError, SchemaInitError, StoreError, ValidationError};
pub use ingest::{
    decode_row, ingest, ingest_upload, parse_rows, BatchFailure, IngestOptions, IngestReport,
    RawCsvRow, SkippedRow,
};
pub use query::{
    amount_listing, daily_credit, plain_listing, range_listing, to_storage_date, AmountRange,
    DailyCreditReport, DateRange, Listing, Pagination, RecordPage,
};
