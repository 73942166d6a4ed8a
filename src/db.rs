use crate::error::{SchemaInitError, StoreError};
use crate::query::{AmountRange, DateRange, Pagination};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Stored bank transfer. Immutable once inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Assigned by storage on insert, never reused
    pub id: i64,
    /// Date text as it appeared in the export
    pub date: String,
    /// HH:MM:SS decoded from the seconds part of the composite field
    pub time: String,
    pub transaction_number: String,
    pub credit: Option<f64>,
    pub debit: Option<f64>,
    pub detail: String,
}

/// Decoded row waiting to be written; storage assigns the id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransfer {
    pub date: String,
    /// `YYYY-MM-DD` form of `date`, used by range filters
    pub date_key: Option<String>,
    pub time: String,
    pub transaction_number: String,
    pub credit: Option<f64>,
    pub debit: Option<f64>,
    pub detail: String,
}

/// Sum of credits for one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCredit {
    pub date: String,
    pub total_credit: f64,
}

/// One page of matching records plus the total number of matches
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Matches {
    pub records: Vec<TransferRecord>,
    pub total: u64,
}

// ============================================================================
// STORAGE SEAMS
// ============================================================================

/// Write side used by the ingestion pipeline
pub trait TransferSink: Send + Sync {
    /// Write all rows atomically; returns the number of rows committed
    fn insert_batch(&self, batch: &[NewTransfer]) -> Result<usize, StoreError>;
}

/// Read side used by the query layer
pub trait TransferSource: Send + Sync {
    fn find_by_date_range(&self, range: &DateRange, page: Pagination) -> Result<Matches, StoreError>;

    fn daily_credit_totals(&self, range: &DateRange) -> Result<Vec<DailyCredit>, StoreError>;

    fn find_by_credit_range(&self, range: &AmountRange, page: Pagination) -> Result<Matches, StoreError>;

    fn list(&self, page: Pagination) -> Result<Matches, StoreError>;

    fn count(&self) -> Result<u64, StoreError>;
}

// ============================================================================
// SCHEMA
// ============================================================================

/// Create the table and indexes if they are missing. Safe to run on every start.
pub fn init_schema(conn: &Connection) -> Result<(), SchemaInitError> {
    // WAL for file databases; in-memory databases stay in "memory" mode
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS bank_transfers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            date_key TEXT,
            time TEXT NOT NULL,
            trans_no TEXT NOT NULL,
            credit REAL,
            debit REAL,
            detail TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_bank_transfers_date_key ON bank_transfers(date_key)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_bank_transfers_credit ON bank_transfers(credit)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// SQLITE STORE
// ============================================================================

const SELECT_COLUMNS: &str = "id, date, time, trans_no, credit, debit, detail";

/// SQLite-backed store shared by every request
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file and make sure the schema exists
    pub fn open(path: &Path) -> Result<Self, SchemaInitError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, SchemaInitError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, SchemaInitError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn query_page(
        &self,
        where_clause: &str,
        bounds: &[&dyn rusqlite::ToSql],
        page: Pagination,
    ) -> Result<Matches, StoreError> {
        let conn = self.lock()?;

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM bank_transfers {}", where_clause),
            bounds,
            |row| row.get(0),
        )?;

        // Bounds take ?1..?n, limit and offset follow them
        let n = bounds.len();
        let sql = format!(
            "SELECT {} FROM bank_transfers {} ORDER BY id LIMIT ?{} OFFSET ?{}",
            SELECT_COLUMNS,
            where_clause,
            n + 1,
            n + 2
        );

        let limit = i64::from(page.limit);
        // SQLite reads a negative OFFSET as 0; saturate instead of wrapping
        let offset = i64::try_from(page.offset).unwrap_or(i64::MAX);
        let mut all_params: Vec<&dyn rusqlite::ToSql> = bounds.to_vec();
        all_params.push(&limit);
        all_params.push(&offset);

        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(all_params.as_slice(), record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Matches {
            records,
            total: total as u64,
        })
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<TransferRecord> {
    Ok(TransferRecord {
        id: row.get(0)?,
        date: row.get(1)?,
        time: row.get(2)?,
        transaction_number: row.get(3)?,
        credit: row.get(4)?,
        debit: row.get(5)?,
        detail: row.get(6)?,
    })
}

impl TransferSink for SqliteStore {
    fn insert_batch(&self, batch: &[NewTransfer]) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO bank_transfers (date, date_key, time, trans_no, credit, debit, detail)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;

            for row in batch {
                stmt.execute(params![
                    row.date,
                    row.date_key,
                    row.time,
                    row.transaction_number,
                    row.credit,
                    row.debit,
                    row.detail,
                ])?;
            }
        }

        tx.commit()?;
        Ok(batch.len())
    }
}

impl TransferSource for SqliteStore {
    fn find_by_date_range(&self, range: &DateRange, page: Pagination) -> Result<Matches, StoreError> {
        self.query_page(
            "WHERE date_key BETWEEN ?1 AND ?2",
            params![range.start, range.end],
            page,
        )
    }

    fn daily_credit_totals(&self, range: &DateRange) -> Result<Vec<DailyCredit>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT date_key, SUM(COALESCE(credit, 0.0))
             FROM bank_transfers
             WHERE date_key BETWEEN ?1 AND ?2
             GROUP BY date_key
             ORDER BY date_key",
        )?;

        let totals = stmt
            .query_map(params![range.start, range.end], |row| {
                Ok(DailyCredit {
                    date: row.get(0)?,
                    total_credit: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(totals)
    }

    fn find_by_credit_range(&self, range: &AmountRange, page: Pagination) -> Result<Matches, StoreError> {
        self.query_page(
            "WHERE credit BETWEEN ?1 AND ?2",
            params![range.min, range.max],
            page,
        )
    }

    fn list(&self, page: Pagination) -> Result<Matches, StoreError> {
        self.query_page("", params![], page)
    }

    fn count(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM bank_transfers", [], |row| row.get(0))?;

        Ok(count as u64)
    }
}
