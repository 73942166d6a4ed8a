// Field decoders for bank-transfer CSV exports
//
// The export packs date and time-of-day into one cell: "<date>_<seconds>",
// where seconds is a float counted from midnight. Amounts come as plain text.

use crate::error::DecodeError;
use serde::{Deserialize, Serialize};

const SECONDS_PER_HOUR: u64 = 3600;
const SECONDS_PER_MINUTE: u64 = 60;

/// Date and clock time split out of a composite field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedTime {
    /// Date part, exactly as it appeared in the export
    pub date: String,
    /// Zero-padded HH:MM:SS; hours are not wrapped at 24
    pub time: String,
}

/// Decode `"<datePart>_<secondsPart>"`, splitting on the first `_`.
///
/// ```
/// use bank_transfers::decode::decode_composite;
///
/// let decoded = decode_composite("01/09/2024_6215.97152").unwrap();
/// assert_eq!(decoded.date, "01/09/2024");
/// assert_eq!(decoded.time, "01:43:35");
/// ```
pub fn decode_composite(raw: &str) -> Result<DecodedTime, DecodeError> {
    let (date_part, seconds_part) = raw
        .split_once('_')
        .ok_or_else(|| DecodeError::MissingSeparator(raw.to_string()))?;

    if date_part.trim().is_empty() {
        return Err(DecodeError::MissingDate(raw.to_string()));
    }

    let seconds_part = seconds_part.trim();
    if seconds_part.is_empty() {
        return Err(DecodeError::MissingSeconds(raw.to_string()));
    }

    let seconds: f64 = seconds_part
        .parse()
        .map_err(|_| DecodeError::InvalidSeconds(seconds_part.to_string()))?;

    Ok(DecodedTime {
        date: date_part.to_string(),
        time: format_clock(seconds)?,
    })
}

/// Format seconds-since-midnight as HH:MM:SS, flooring the fraction.
///
/// Values of a day or more keep counting hours (`90000.0` -> `"25:00:00"`).
pub fn format_clock(seconds: f64) -> Result<String, DecodeError> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(DecodeError::OutOfRangeSeconds(seconds.to_string()));
    }

    let whole = seconds.floor() as u64;
    let hours = whole / SECONDS_PER_HOUR;
    let minutes = (whole % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;
    let secs = whole % SECONDS_PER_MINUTE;

    Ok(format!("{:02}:{:02}:{:02}", hours, minutes, secs))
}

/// Coerce an amount cell. Empty means absent; `1,250.00` is accepted.
///
/// Commas are only read as thousands separators in groups of three ahead of
/// the decimal point, so `1.250,00` and `1,2,5` are rejected.
pub fn parse_amount(column: &'static str, raw: &str) -> Result<Option<f64>, DecodeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let invalid = || DecodeError::InvalidAmount {
        column,
        value: raw.to_string(),
    };

    let cleaned = if trimmed.contains(',') {
        strip_thousands(trimmed).ok_or_else(invalid)?
    } else {
        trimmed.to_string()
    };

    let value: f64 = cleaned.parse().map_err(|_| invalid())?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid());
    }

    Ok(Some(value))
}

/// `1,234,567.89` -> `1234567.89`; `None` if the grouping is not 1-3 then 3s
fn strip_thousands(amount: &str) -> Option<String> {
    let (whole, fraction) = match amount.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (amount, None),
    };

    let mut groups = whole.split(',');
    let first = groups.next()?;
    if !is_digits(first) || first.len() > 3 {
        return None;
    }
    let mut digits = first.to_string();
    for group in groups {
        if group.len() != 3 || !is_digits(group) {
            return None;
        }
        digits.push_str(group);
    }

    if let Some(fraction) = fraction {
        if !is_digits(fraction) {
            return None;
        }
        digits.push('.');
        digits.push_str(fraction);
    }

    Some(digits)
}

/// Comparison key (`YYYY-MM-DD`) for a stored date.
///
/// Accepts day-first dates separated by `/`, `-` or `.`, and passes ISO dates
/// through. This only reorders text; it does not check the calendar.
pub fn date_key(date: &str) -> Option<String> {
    let date = date.trim();
    let sep = ['/', '-', '.'].into_iter().find(|s| date.contains(*s))?;

    let parts: Vec<&str> = date.split(sep).collect();
    if parts.len() != 3 || !parts.iter().all(|p| is_digits(p)) {
        return None;
    }

    let (year, month, day) = if parts[0].len() == 4 {
        (parts[0], parts[1], parts[2])
    } else if parts[2].len() == 4 {
        (parts[2], parts[1], parts[0])
    } else {
        return None;
    };

    if month.len() > 2 || day.len() > 2 {
        return None;
    }

    Some(format!("{}-{:0>2}-{:0>2}", year, month, day))
}

pub(crate) fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_value() {
        let decoded = decode_composite("01/09/2024_6215.97152").unwrap();

        assert_eq!(decoded.date, "01/09/2024");
        assert_eq!(decoded.time, "01:43:35");
    }

    #[test]
    fn test_decode_splits_on_first_separator() {
        let err = decode_composite("2024_09_01_60").unwrap_err();
        // "09_01_60" is not a number, so the first '_' is the one that counts
        assert_eq!(err, DecodeError::InvalidSeconds("09_01_60".to_string()));
    }

    #[test]
    fn test_time_components_sum_back_to_seconds() {
        for s in [0.0, 0.999, 59.5, 60.0, 3599.9, 3600.0, 45296.25, 86399.99] {
            let time = format_clock(s).unwrap();
            let fields: Vec<u64> = time.split(':').map(|f| f.parse().unwrap()).collect();

            assert_eq!(fields.len(), 3);
            assert!(time.split(':').all(|f| f.len() == 2), "not padded: {time}");
            assert_eq!(fields[0] * 3600 + fields[1] * 60 + fields[2], s.floor() as u64);
        }
    }

    #[test]
    fn test_hours_overflow_past_midnight_is_kept() {
        // A day or more is not wrapped back to 00
        assert_eq!(format_clock(86400.0).unwrap(), "24:00:00");
        assert_eq!(format_clock(90061.0).unwrap(), "25:01:01");
        assert_eq!(format_clock(360000.0).unwrap(), "100:00:00");
    }

    #[test]
    fn test_decode_failures() {
        assert!(matches!(
            decode_composite("01/09/2024"),
            Err(DecodeError::MissingSeparator(_))
        ));
        assert!(matches!(
            decode_composite("_120"),
            Err(DecodeError::MissingDate(_))
        ));
        assert!(matches!(
            decode_composite("01/09/2024_"),
            Err(DecodeError::MissingSeconds(_))
        ));
        assert!(matches!(
            decode_composite("01/09/2024_noon"),
            Err(DecodeError::InvalidSeconds(_))
        ));
        assert!(matches!(
            decode_composite("01/09/2024_-5"),
            Err(DecodeError::OutOfRangeSeconds(_))
        ));
        assert!(matches!(
            decode_composite("01/09/2024_inf"),
            Err(DecodeError::OutOfRangeSeconds(_))
        ));
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("credit", "").unwrap(), None);
        assert_eq!(parse_amount("credit", "   ").unwrap(), None);
        assert_eq!(parse_amount("credit", "250").unwrap(), Some(250.0));
        assert_eq!(parse_amount("debit", " 1,250.50 ").unwrap(), Some(1250.5));
        assert!(parse_amount("credit", "abc").is_err());
        assert!(parse_amount("debit", "-10").is_err());
    }

    #[test]
    fn test_parse_amount_thousands_grouping() {
        assert_eq!(parse_amount("credit", "1,234,567").unwrap(), Some(1234567.0));
        assert_eq!(parse_amount("credit", "12,000.5").unwrap(), Some(12000.5));

        // Decimal-comma exports and stray commas are not guessed at
        for raw in ["1.250,00", "1,2,5", "1234,567", ",250", "250,", "1,250.5,0", "1,25o"] {
            assert!(
                matches!(
                    parse_amount("credit", raw),
                    Err(DecodeError::InvalidAmount { column: "credit", .. })
                ),
                "accepted {raw}"
            );
        }
    }

    #[test]
    fn test_date_key() {
        assert_eq!(date_key("01/09/2024").as_deref(), Some("2024-09-01"));
        assert_eq!(date_key("1-9-2024").as_deref(), Some("2024-09-01"));
        assert_eq!(date_key("15.12.2023").as_deref(), Some("2023-12-15"));
        assert_eq!(date_key("2024-09-01").as_deref(), Some("2024-09-01"));
        assert_eq!(date_key("Sept 1st"), None);
        assert_eq!(date_key("01/09"), None);
        assert_eq!(date_key("01/09/24"), None);
    }
}
