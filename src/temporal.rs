// ⏰ Temporal Model - Ordering keys and the reference instant
//
// Two times matter to the reconciler:
// 1. Record time: when a history row became true (from_date, valid_from, ...)
// 2. As-of time: the single "now" every derived field is computed against
//
// The as-of instant is always injected by the caller. Nothing in this module
// reads the wall clock.

use crate::table::Value;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;

/// Days per year used for tenure
pub const DAYS_PER_YEAR: f64 = 365.25;

// ============================================================================
// TIMESTAMP PARSING
// ============================================================================

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// Parse a timestamp cell as written in the HR exports
///
/// Accepts plain dates (midnight), naive date-times and RFC 3339 (converted
/// to UTC). Returns None for anything else.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d.and_time(NaiveTime::MIN));
        }
    }

    None
}

/// Coerce a cell to a timestamp cell
///
/// Unknown stays unknown; unparseable text becomes `Invalid`.
pub fn coerce_timestamp(value: &Value) -> Value {
    match value {
        Value::Timestamp(_) | Value::Unknown | Value::Invalid(_) => value.clone(),
        Value::Text(s) => match parse_timestamp(s) {
            Some(ts) => Value::Timestamp(ts),
            None => Value::Invalid(s.clone()),
        },
        other => Value::Invalid(other.to_string()),
    }
}

// ============================================================================
// ORDER KEY
// ============================================================================

/// OrderKey - Sort key for "most current" selection
///
/// `Sentinel` sorts below every real timestamp. It stands in for a missing
/// ordering column and for cells that hold no usable timestamp, so such rows
/// are still selectable when nothing newer exists for the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OrderKey {
    Sentinel,
    At(NaiveDateTime),
}

impl OrderKey {
    pub fn from_value(value: &Value) -> OrderKey {
        match value {
            Value::Timestamp(ts) => OrderKey::At(*ts),
            Value::Text(s) => parse_timestamp(s).map_or(OrderKey::Sentinel, OrderKey::At),
            _ => OrderKey::Sentinel,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, OrderKey::Sentinel)
    }
}

// ============================================================================
// AS OF
// ============================================================================

/// AsOf - The reference instant for one reconciliation call
///
/// Age and tenure computed in the same call share this instant, so they can
/// never drift apart the way two separate clock reads would.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AsOf {
    instant: DateTime<Utc>,
}

impl AsOf {
    pub fn new(instant: DateTime<Utc>) -> Self {
        AsOf { instant }
    }

    /// Midnight UTC of the given day
    pub fn from_date(date: NaiveDate) -> Self {
        AsOf {
            instant: date.and_time(NaiveTime::MIN).and_utc(),
        }
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.instant
    }

    pub fn date(&self) -> NaiveDate {
        self.instant.date_naive()
    }

    /// Whole years: as-of year minus birth year
    pub fn age_years(&self, birth: &Value) -> Value {
        derive_from(birth, |born| Value::Int(i64::from(self.date().year() - born.year())))
    }

    /// Fractional years since hire: elapsed days / 365.25
    pub fn tenure_years(&self, hired: &Value) -> Value {
        derive_from(hired, |start| {
            let days = (self.instant.naive_utc() - start).num_days();
            Value::Float(days as f64 / DAYS_PER_YEAR)
        })
    }
}

fn derive_from<F>(source: &Value, f: F) -> Value
where
    F: FnOnce(NaiveDateTime) -> Value,
{
    match coerce_timestamp(source) {
        Value::Timestamp(ts) => f(ts),
        Value::Unknown => Value::Unknown,
        Value::Invalid(raw) => Value::Invalid(raw),
        other => Value::Invalid(other.to_string()),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(parse_timestamp("2020-01-15"), Some(ts(2020, 1, 15)));
        assert_eq!(parse_timestamp("01/15/2020"), Some(ts(2020, 1, 15)));
        assert_eq!(parse_timestamp("2020/01/15"), Some(ts(2020, 1, 15)));
        assert_eq!(
            parse_timestamp("2020-01-15 08:30:00"),
            NaiveDate::from_ymd_opt(2020, 1, 15).unwrap().and_hms_opt(8, 30, 0)
        );
        assert_eq!(
            parse_timestamp("2020-01-15T08:30:00+02:00"),
            NaiveDate::from_ymd_opt(2020, 1, 15).unwrap().and_hms_opt(6, 30, 0)
        );
        assert_eq!(parse_timestamp("not a date"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn test_coerce_timestamp_markers() {
        assert_eq!(coerce_timestamp(&Value::Unknown), Value::Unknown);
        assert_eq!(
            coerce_timestamp(&Value::text("9999-99-99")),
            Value::Invalid("9999-99-99".into())
        );
        assert_eq!(
            coerce_timestamp(&Value::text("2021-06-01")),
            Value::Timestamp(ts(2021, 6, 1))
        );
    }

    #[test]
    fn test_sentinel_sorts_first() {
        let mut keys = vec![
            OrderKey::At(ts(2021, 1, 1)),
            OrderKey::Sentinel,
            OrderKey::At(ts(1950, 1, 1)),
        ];
        keys.sort();
        assert_eq!(keys[0], OrderKey::Sentinel);
        assert_eq!(keys[2], OrderKey::At(ts(2021, 1, 1)));
        assert!(OrderKey::from_value(&Value::text("garbage")).is_sentinel());
        assert!(OrderKey::from_value(&Value::Unknown).is_sentinel());
    }

    #[test]
    fn test_age_uses_calendar_years() {
        let as_of = AsOf::from_date(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap());
        assert_eq!(as_of.age_years(&Value::Timestamp(ts(1990, 12, 31))), Value::Int(34));
        assert_eq!(as_of.age_years(&Value::text("1990-12-31")), Value::Int(34));
        assert_eq!(as_of.age_years(&Value::Unknown), Value::Unknown);
        assert_eq!(
            as_of.age_years(&Value::text("soon")),
            Value::Invalid("soon".into())
        );
    }

    #[test]
    fn test_tenure_in_fractional_years() {
        let as_of = AsOf::from_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let tenure = as_of
            .tenure_years(&Value::Timestamp(ts(2020, 1, 1)))
            .as_f64()
            .unwrap();
        // 1461 days
        assert!((tenure - 4.0).abs() < 1e-9);
    }
}
