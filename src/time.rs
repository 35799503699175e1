//! Time range normalization and validation

use crate::error::{Error, Result};
use crate::exec::SqlExecutor;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use tracing::debug;

/// A UTC time window `[start, end)`, truncated to minute precision.
///
/// Bounds are normalized at construction and immutable thereafter; a
/// reversed pair is swapped silently since callers think in either order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    /// Normalize a pair of bounds into a range
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let start = truncate_to_minute(start);
        let end = truncate_to_minute(end);
        if start > end {
            Self { start: end, end: start }
        } else {
            Self { start, end }
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Start bound in the ISO 8601 form used inside rewritten queries
    pub fn start_iso(&self) -> String {
        self.start.format("%Y-%m-%dT%H:%M:%S").to_string()
    }

    /// End bound in the ISO 8601 form used inside rewritten queries
    pub fn end_iso(&self) -> String {
        self.end.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

fn truncate_to_minute(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_second(0)
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt)
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d %B %Y", "%B %d, %Y"];

/// Parse a timestamp string into UTC.
///
/// Accepts RFC 3339, the common date and date-time layouts, and the relative
/// words `today`/`yesterday` (midnight UTC). Values without a timezone get
/// `default_offset` when supplied, UTC otherwise.
pub fn parse_timestamp(text: &str, default_offset: Option<FixedOffset>) -> Result<DateTime<Utc>> {
    let text = text.trim();

    match text.to_ascii_lowercase().as_str() {
        "today" => return Ok(midnight(Utc::now())),
        "yesterday" => return Ok(midnight(Utc::now()) - Duration::days(1)),
        _ => {}
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    // RFC 3339 with a space separator, as engines commonly emit
    if let Ok(dt) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%#z") {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return localize(naive, default_offset);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            let naive = date
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| Error::Timestamp(format!("invalid date '{}'", text)))?;
            return localize(naive, default_offset);
        }
    }

    Err(Error::Timestamp(format!("unrecognized timestamp '{}'", text)))
}

fn localize(naive: NaiveDateTime, default_offset: Option<FixedOffset>) -> Result<DateTime<Utc>> {
    match default_offset {
        Some(offset) => offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| Error::Timestamp(format!("ambiguous local time '{}'", naive))),
        None => {
            debug!("assuming time already in utc");
            Ok(Utc.from_utc_datetime(&naive))
        }
    }
}

fn midnight(dt: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(dt.year(), dt.month(), dt.day(), 0, 0, 0)
        .single()
        .unwrap_or(dt)
}

/// Fail with [`Error::FutureData`] if `end` reaches past "now" or past the
/// newest value of `time_column` in `table`; a frozen snapshot taken beyond
/// either bound would silently miss rows ingested later.
///
/// An empty table skips the newest-row comparison. Callers may suppress the
/// whole check to accept an incomplete snapshot.
pub fn check_not_future(
    end: DateTime<Utc>,
    executor: &dyn SqlExecutor,
    table: &str,
    time_column: &str,
) -> Result<()> {
    let rows = executor.field_values(
        time_column,
        table,
        Some(format!("{} desc", time_column)),
        Some(1),
    )?;
    let now = Utc::now();
    debug!(%now, %end, "checking window end against available data");

    if end > now {
        return Err(Error::FutureData(
            "end date is in the future; the frozen table will not include data \
             added after it is created"
                .to_string(),
        ));
    }
    if let Some(latest_raw) = rows.first() {
        let latest = parse_timestamp(latest_raw, None)?;
        debug!(%latest, "latest known row");
        if end > latest {
            return Err(Error::FutureData(
                "end date is more recent than the latest data in the table; the \
                 frozen table will not include data ingested after it is created"
                    .to_string(),
            ));
        }
    }
    Ok(())
}
