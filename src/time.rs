//! Relative/absolute time resolution against an injectable clock (spec §4.B).

use chrono::NaiveDateTime;

use crate::error::{Error, Result};
use crate::params::TimeUnit;

/// The format used for both absolute input and echoed output timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A source of "now", injectable so tests can freeze time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Production clock backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Utc::now().naive_utc()
    }
}

/// A clock that always returns the same instant, for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Resolve a `now` / `-<N> <unit>` / absolute-timestamp expression to an
/// absolute `NaiveDateTime`.
///
/// # Errors
/// Returns [`Error::TimeParse`] if `expr` matches none of the three shapes.
pub fn resolve(expr: &str, clock: &dyn Clock) -> Result<NaiveDateTime> {
    let trimmed = expr.trim();

    if trimmed.eq_ignore_ascii_case("now") {
        return Ok(clock.now());
    }

    if let Some(rest) = trimmed.strip_prefix('-') {
        if let Some(dt) = parse_relative(rest, clock) {
            return Ok(dt);
        }
    }

    parse_absolute(trimmed)
        .ok_or_else(|| Error::TimeParse(format!("could not parse time expression: {expr:?}")))
}

fn parse_absolute(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT) {
        return Some(dt);
    }
    // Accept a bare date, defaulting to midnight.
    if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    None
}

fn parse_relative(rest: &str, clock: &dyn Clock) -> Option<NaiveDateTime> {
    let mut parts = rest.split_whitespace();
    let n: i64 = parts.next()?.parse().ok()?;
    let unit = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let duration = unit_duration(unit, n)?;
    Some(clock.now() - duration)
}

fn unit_duration(unit: &str, n: i64) -> Option<chrono::Duration> {
    let unit = unit.trim_end_matches('s').to_ascii_lowercase();
    match unit.as_str() {
        "second" => Some(chrono::Duration::seconds(n)),
        "minute" => Some(chrono::Duration::minutes(n)),
        "hour" => Some(chrono::Duration::hours(n)),
        "day" => Some(chrono::Duration::days(n)),
        "week" => Some(chrono::Duration::weeks(n)),
        "fortnight" => Some(chrono::Duration::weeks(n * 2)),
        "month" => Some(chrono::Duration::days(n * 30)),
        "year" => Some(chrono::Duration::days(n * 365)),
        _ => None,
    }
}

/// Convert a resolved absolute timestamp to an epoch integer literal in
/// `unit`, for binding against a numeric temporal column.
pub fn to_epoch_literal(ts: NaiveDateTime, unit: TimeUnit) -> i64 {
    let epoch_seconds = ts.and_utc().timestamp();
    let epoch_nanos_fraction = i64::from(ts.and_utc().timestamp_subsec_nanos());
    match unit {
        TimeUnit::S => epoch_seconds,
        TimeUnit::Ms => epoch_seconds * 1_000 + epoch_nanos_fraction / 1_000_000,
        TimeUnit::Us => epoch_seconds * 1_000_000 + epoch_nanos_fraction / 1_000,
        TimeUnit::Ns => epoch_seconds * 1_000_000_000 + epoch_nanos_fraction,
    }
}

/// Format an absolute timestamp the way it is echoed back to clients.
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> FixedClock {
        FixedClock(
            chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(4, 0, 0)
                .unwrap(),
        )
    }

    #[test]
    fn resolves_now() {
        let c = clock();
        assert_eq!(resolve("now", &c).unwrap(), c.now());
    }

    #[test]
    fn resolves_relative_hours() {
        let c = clock();
        let resolved = resolve("-1 hour", &c).unwrap();
        assert_eq!(format_timestamp(resolved), "2024-01-02 03:00:00");
    }

    #[test]
    fn resolves_relative_plural_and_singular() {
        let c = clock();
        assert_eq!(resolve("-2 hours", &c).unwrap(), resolve("-2 hour", &c).unwrap());
    }

    #[test]
    fn resolves_absolute() {
        let c = clock();
        let resolved = resolve("2024-01-01 00:00:00", &c).unwrap();
        assert_eq!(format_timestamp(resolved), "2024-01-01 00:00:00");
    }

    #[test]
    fn rejects_garbage() {
        let c = clock();
        assert!(matches!(resolve("nonsense", &c), Err(Error::TimeParse(_))));
    }

    #[test]
    fn epoch_literal_round_trips_units() {
        let ts = chrono::NaiveDate::from_ymd_opt(1970, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 1)
            .unwrap();
        assert_eq!(to_epoch_literal(ts, TimeUnit::S), 1);
        assert_eq!(to_epoch_literal(ts, TimeUnit::Ms), 1_000);
        assert_eq!(to_epoch_literal(ts, TimeUnit::Us), 1_000_000);
        assert_eq!(to_epoch_literal(ts, TimeUnit::Ns), 1_000_000_000);
    }
}
