// Query layer: parameter validation, pagination and the read shapes served to the web boundary
//
// Every read is parameterized. A missing or unusable filter never reaches
// storage; callers get the neutral shape (`filter_applied == false`) instead.

use crate::db::{DailyCredit, TransferRecord, TransferSource};
use crate::decode::is_digits;
use crate::error::{StoreError, ValidationError};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// FILTER TYPES
// ============================================================================

/// Inclusive date bounds in storage form (`YYYY-MM-DD`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

/// Inclusive bounds on `credit`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmountRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u64,
}

impl Pagination {
    /// 1-based page number; page 0 is treated as page 1
    pub fn for_page(page: u32, per_page: u32) -> Self {
        let page = page.max(1);
        Self {
            limit: per_page,
            offset: u64::from(page - 1) * u64::from(per_page),
        }
    }
}

/// Reorder a `DD-MM-YYYY` date into `YYYY-MM-DD`.
///
/// Only the shape is checked (three numeric parts, four-digit year); the
/// calendar is not consulted.
pub fn to_storage_date(input: &str) -> Result<String, ValidationError> {
    let bad = || ValidationError::BadDate {
        value: input.to_string(),
    };

    let parts: Vec<&str> = input.trim().split('-').collect();
    if parts.len() != 3 || !parts.iter().all(|p| is_digits(p)) {
        return Err(bad());
    }
    if parts[0].len() > 2 || parts[1].len() > 2 || parts[2].len() != 4 {
        return Err(bad());
    }

    Ok(parts
        .iter()
        .rev()
        .map(|p| format!("{:0>2}", p))
        .collect::<Vec<_>>()
        .join("-"))
}

fn required<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str, ValidationError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ValidationError::Missing(name)),
    }
}

impl DateRange {
    /// Build from raw `start_date`/`end_date` parameters. Both are required.
    pub fn from_params(start: Option<&str>, end: Option<&str>) -> Result<Self, ValidationError> {
        let start = required(start, "start_date")?;
        let end = required(end, "end_date")?;

        let range = DateRange {
            start: to_storage_date(start)?,
            end: to_storage_date(end)?,
        };

        if range.start > range.end {
            return Err(ValidationError::InvertedRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        Ok(range)
    }
}

impl AmountRange {
    /// Build from raw `min_amount`/`max_amount` parameters. Both are required.
    pub fn from_params(min: Option<&str>, max: Option<&str>) -> Result<Self, ValidationError> {
        let min_raw = required(min, "min_amount")?;
        let max_raw = required(max, "max_amount")?;

        let parse = |raw: &str| {
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ValidationError::BadAmount {
                    value: raw.to_string(),
                })
        };

        let range = AmountRange {
            min: parse(min_raw)?,
            max: parse(max_raw)?,
        };

        if range.min > range.max {
            return Err(ValidationError::InvertedRange {
                start: min_raw.to_string(),
                end: max_raw.to_string(),
            });
        }

        Ok(range)
    }
}

// ============================================================================
// RESULT SHAPES
// ============================================================================

/// Paginated records. `filter_applied == false` means no query was run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPage {
    pub filter_applied: bool,
    pub records: Vec<TransferRecord>,
    pub total_matching: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl RecordPage {
    /// The "no filter applied" shape
    pub fn neutral(per_page: u32, reason: &ValidationError) -> Self {
        Self {
            filter_applied: false,
            records: Vec::new(),
            total_matching: 0,
            page: 1,
            per_page,
            total_pages: 0,
            notice: Some(reason.to_string()),
        }
    }

    fn applied(records: Vec<TransferRecord>, total: u64, page: u32, per_page: u32) -> Self {
        Self {
            filter_applied: true,
            records,
            total_matching: total,
            page: page.max(1),
            per_page,
            total_pages: total_pages(total, per_page),
            notice: None,
        }
    }
}

/// Per-day credit sums. `filter_applied == false` means no query was run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCreditReport {
    pub filter_applied: bool,
    pub days: Vec<DailyCredit>,
    pub total_credit: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

/// Plain `limit`/`offset` listing over all records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub records: Vec<TransferRecord>,
    pub total: u64,
    pub limit: u32,
    pub offset: u64,
}

/// `ceil(total / per_page)`, zero when there is nothing to page through
pub fn total_pages(total: u64, per_page: u32) -> u64 {
    if per_page == 0 {
        return 0;
    }
    total.div_ceil(u64::from(per_page))
}

// ============================================================================
// READ OPERATIONS
// ============================================================================

/// Records dated within `[start_date, end_date]`, in insertion order
pub fn range_listing<S: TransferSource + ?Sized>(
    source: &S,
    start_date: Option<&str>,
    end_date: Option<&str>,
    page: Option<u32>,
    per_page: u32,
) -> Result<RecordPage, StoreError> {
    let range = match DateRange::from_params(start_date, end_date) {
        Ok(range) => range,
        Err(reason) => {
            debug!(%reason, "date range filter not applied");
            return Ok(RecordPage::neutral(per_page, &reason));
        }
    };

    let page = page.unwrap_or(1).max(1);
    let matches = source.find_by_date_range(&range, Pagination::for_page(page, per_page))?;

    Ok(RecordPage::applied(matches.records, matches.total, page, per_page))
}

/// Credit totals per day within `[start_date, end_date]`
pub fn daily_credit<S: TransferSource + ?Sized>(
    source: &S,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> Result<DailyCreditReport, StoreError> {
    let range = match DateRange::from_params(start_date, end_date) {
        Ok(range) => range,
        Err(reason) => {
            debug!(%reason, "daily credit filter not applied");
            return Ok(DailyCreditReport {
                filter_applied: false,
                days: Vec::new(),
                total_credit: 0.0,
                notice: Some(reason.to_string()),
            });
        }
    };

    let days = source.daily_credit_totals(&range)?;
    let total_credit = days.iter().map(|d| d.total_credit).sum();

    Ok(DailyCreditReport {
        filter_applied: true,
        days,
        total_credit,
        notice: None,
    })
}

/// Records whose credit lies within `[min_amount, max_amount]`
pub fn amount_listing<S: TransferSource + ?Sized>(
    source: &S,
    min_amount: Option<&str>,
    max_amount: Option<&str>,
    page: Option<u32>,
    per_page: u32,
) -> Result<RecordPage, StoreError> {
    let range = match AmountRange::from_params(min_amount, max_amount) {
        Ok(range) => range,
        Err(reason) => {
            debug!(%reason, "amount filter not applied");
            return Ok(RecordPage::neutral(per_page, &reason));
        }
    };

    let page = page.unwrap_or(1).max(1);
    let matches = source.find_by_credit_range(&range, Pagination::for_page(page, per_page))?;

    Ok(RecordPage::applied(matches.records, matches.total, page, per_page))
}

/// Unfiltered page of records; `limit` is clamped to `[1, max_limit]`
pub fn plain_listing<S: TransferSource + ?Sized>(
    source: &S,
    limit: Option<u32>,
    offset: Option<u64>,
    default_limit: u32,
    max_limit: u32,
) -> Result<Listing, StoreError> {
    let limit = limit.unwrap_or(default_limit).clamp(1, max_limit.max(1));
    let offset = offset.unwrap_or(0);

    let matches = source.list(Pagination { limit, offset })?;

    Ok(Listing {
        records: matches.records,
        total: matches.total,
        limit,
        offset,
    })
}
