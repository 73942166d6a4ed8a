// CSV ingestion pipeline: parse -> decode -> batch -> write
//
// Parsing is all-or-nothing: the whole file is read into rows before the first
// write, so a structural error commits nothing. Decode failures only drop the
// offending row. Batches are written in order; the first failing batch stops
// the run and the report says how far it got.

use crate::config::{Config, DEFAULT_BATCH_SIZE};
use crate::db::{NewTransfer, TransferSink};
use crate::decode::{date_key, decode_composite, parse_amount};
use crate::error::{DecodeError, IngestError};
use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, info_span, warn};
use uuid::Uuid;

/// Columns every export must carry; anything else is ignored
pub const REQUIRED_COLUMNS: [&str; 5] = ["date_time", "trans_no", "credit", "debit", "detail"];

/// Skip reasons kept in the report; the rest are only logged
const MAX_SKIPPED_SAMPLES: usize = 10;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Maximum rows per batch write
    pub batch_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl From<&Config> for IngestOptions {
    fn from(config: &Config) -> Self {
        Self {
            batch_size: config.batch_size,
        }
    }
}

/// One CSV line keyed by column name, before any decoding
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawCsvRow {
    /// 1-based line in the source file
    #[serde(skip)]
    pub line: u64,

    /// Composite `<date>_<seconds>` field
    pub date_time: String,

    #[serde(default)]
    pub trans_no: String,

    #[serde(default)]
    pub credit: String,

    #[serde(default)]
    pub debit: String,

    #[serde(default)]
    pub detail: String,
}

/// A row left out of the run and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRow {
    pub line: u64,
    pub reason: String,
}

/// The batch that stopped a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    /// 0-based index of the failing batch
    pub index: usize,
    /// Rows in the failing batch and every batch after it
    pub not_committed: usize,
    pub error: String,
}

/// Summary of one ingestion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub run_id: Uuid,
    pub inserted: usize,
    pub skipped: usize,
    pub batches_written: usize,
    pub failed_batch: Option<BatchFailure>,
    pub skipped_samples: Vec<SkippedRow>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl IngestReport {
    fn new(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            inserted: 0,
            skipped: 0,
            batches_written: 0,
            failed_batch: None,
            skipped_samples: Vec::new(),
            started_at,
            finished_at: started_at,
        }
    }

    /// True when every decodable row was committed
    pub fn is_complete(&self) -> bool {
        self.failed_batch.is_none()
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Ingest CSV text into `sink`.
///
/// Returns `Err` only for file-level problems, in which case nothing was
/// written. A failed batch is reported through `IngestReport::failed_batch`.
pub fn ingest<S: TransferSink + ?Sized>(
    sink: &S,
    content: &str,
    options: IngestOptions,
) -> Result<IngestReport, IngestError> {
    if options.batch_size == 0 {
        return Err(IngestError::InvalidOptions(
            "batch_size must be greater than zero".to_string(),
        ));
    }

    let run_id = Uuid::new_v4();
    let _span = info_span!("ingest", %run_id).entered();
    let mut report = IngestReport::new(run_id, Utc::now());

    let rows = if content.trim().is_empty() {
        Vec::new()
    } else {
        parse_rows(content)?
    };

    let mut transfers = Vec::with_capacity(rows.len());
    for row in &rows {
        match decode_row(row) {
            Ok(transfer) => transfers.push(transfer),
            Err(reason) => {
                warn!(line = row.line, %reason, "skipping row");
                report.skipped += 1;
                if report.skipped_samples.len() < MAX_SKIPPED_SAMPLES {
                    report.skipped_samples.push(SkippedRow {
                        line: row.line,
                        reason: reason.to_string(),
                    });
                }
            }
        }
    }

    write_batches(sink, &transfers, options.batch_size, &mut report);
    report.finished_at = Utc::now();

    info!(
        rows = rows.len(),
        inserted = report.inserted,
        skipped = report.skipped,
        batches = report.batches_written,
        complete = report.is_complete(),
        "ingestion finished"
    );

    Ok(report)
}

/// Ingest an uploaded temporary file, removing it afterwards whatever happens
pub fn ingest_upload<S: TransferSink + ?Sized>(
    sink: &S,
    path: &Path,
    options: IngestOptions,
) -> Result<IngestReport, IngestError> {
    let _cleanup = RemoveOnDrop(path.to_path_buf());

    let content = std::fs::read_to_string(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    ingest(sink, &content, options)
}

/// Parse the whole file. Any structural error aborts before decoding starts.
pub fn parse_rows(content: &str) -> Result<Vec<RawCsvRow>, IngestError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader.headers().map_err(IngestError::from_csv)?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(IngestError::MissingColumn(column));
        }
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(IngestError::from_csv)?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        // Whitespace-only lines trim down to empty cells
        if record.iter().all(str::is_empty) {
            continue;
        }
        if record.len() != headers.len() {
            return Err(IngestError::Parse {
                line,
                message: format!(
                    "expected {} fields, found {}",
                    headers.len(),
                    record.len()
                ),
            });
        }

        let mut row: RawCsvRow = record
            .deserialize(Some(&headers))
            .map_err(IngestError::from_csv)?;
        row.line = line;

        rows.push(row);
    }

    Ok(rows)
}

/// Turn a raw row into a storable transfer
pub fn decode_row(row: &RawCsvRow) -> Result<NewTransfer, DecodeError> {
    let decoded = decode_composite(&row.date_time)?;

    Ok(NewTransfer {
        date_key: date_key(&decoded.date),
        date: decoded.date,
        time: decoded.time,
        transaction_number: row.trans_no.clone(),
        credit: parse_amount("credit", &row.credit)?,
        debit: parse_amount("debit", &row.debit)?,
        detail: row.detail.clone(),
    })
}

fn write_batches<S: TransferSink + ?Sized>(
    sink: &S,
    transfers: &[NewTransfer],
    batch_size: usize,
    report: &mut IngestReport,
) {
    for (index, batch) in transfers.chunks(batch_size).enumerate() {
        match sink.insert_batch(batch) {
            Ok(written) => {
                report.inserted += written;
                report.batches_written += 1;
                info!(batch = index, rows = written, "batch committed");
            }
            Err(e) => {
                let not_committed = transfers.len() - index * batch_size;
                warn!(
                    batch = index,
                    committed = report.inserted,
                    not_committed,
                    error = %e,
                    "batch write failed, aborting remaining batches"
                );
                report.failed_batch = Some(BatchFailure {
                    index,
                    not_committed,
                    error: e.to_string(),
                });
                return;
            }
        }
    }
}

/// Deletes the wrapped path when dropped
struct RemoveOnDrop(PathBuf);

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.0) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.0.display(), error = %e, "failed to remove upload"),
        }
    }
}
