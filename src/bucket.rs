//! Time-bucket width selection for timeseries mode (spec §4.F).

use chrono::NaiveDateTime;

use crate::params::Granularity;
use crate::time::to_epoch_literal;
use crate::params::TimeUnit;

/// Standard bucket widths, in seconds, smallest first.
const STANDARD_STEPS: &[(i64, &str)] = &[
    (1, "1 second"),
    (5, "5 seconds"),
    (15, "15 seconds"),
    (30, "30 seconds"),
    (60, "1 minute"),
    (300, "5 minutes"),
    (900, "15 minutes"),
    (1_800, "30 minutes"),
    (3_600, "1 hour"),
    (10_800, "3 hours"),
    (21_600, "6 hours"),
    (43_200, "12 hours"),
    (86_400, "1 day"),
    (604_800, "1 week"),
    (2_592_000, "30 days"),
];

const AUTO_TARGET_BUCKETS: i64 = 30;
const FINE_TARGET_BUCKETS: i64 = 100;

/// A resolved bucket plan: width in seconds and the SQL expression that
/// buckets an x-axis column by it, anchored so `buckets[0] == start`.
pub struct BucketPlan {
    pub width_seconds: i64,
    pub expr: String,
}

fn bucket_count(total_seconds: i64, step: i64) -> i64 {
    if total_seconds <= 0 {
        1
    } else {
        total_seconds.div_ceil(step).max(1)
    }
}

/// Smallest step whose bucket count is `<= target` (spec: `Auto`).
fn pick_auto_step(total_seconds: i64) -> i64 {
    STANDARD_STEPS
        .iter()
        .find(|(step, _)| bucket_count(total_seconds, *step) <= AUTO_TARGET_BUCKETS)
        .map_or_else(|| STANDARD_STEPS.last().unwrap().0, |(step, _)| *step)
}

/// Largest step whose bucket count is still `>= target` (spec: `Fine`).
fn pick_fine_step(total_seconds: i64) -> i64 {
    let mut best = STANDARD_STEPS[0].0;
    for (step, _) in STANDARD_STEPS {
        if bucket_count(total_seconds, *step) >= FINE_TARGET_BUCKETS {
            best = *step;
        } else {
            break;
        }
    }
    best
}

fn unit_to_seconds(unit: &str) -> Option<i64> {
    let unit = unit.trim_end_matches('s').to_ascii_lowercase();
    match unit.as_str() {
        "second" => Some(1),
        "minute" => Some(60),
        "hour" => Some(3_600),
        "day" => Some(86_400),
        "week" => Some(604_800),
        "fortnight" => Some(1_209_600),
        "month" => Some(2_592_000),
        "year" => Some(31_536_000),
        _ => None,
    }
}

/// Choose a bucket width in seconds for `granularity` over `[start, end]`.
pub fn pick_width_seconds(granularity: &Granularity, start: NaiveDateTime, end: NaiveDateTime) -> i64 {
    let total_seconds = (end - start).num_seconds().max(0);
    match granularity {
        Granularity::Auto => pick_auto_step(total_seconds),
        Granularity::Fine => pick_fine_step(total_seconds),
        Granularity::Fixed(n, unit) => {
            let unit_seconds = unit_to_seconds(unit).unwrap_or(1);
            (*n * unit_seconds).max(1)
        }
    }
}

/// Build the SQL bucketing expression for `x_axis_expr`, anchored at
/// `start` so that `buckets[0] == start` (spec §4.F, §9 "Bucket anchoring").
pub fn bucket_expr(x_axis_expr: &str, start: NaiveDateTime, width_seconds: i64) -> BucketPlan {
    let start_epoch = to_epoch_literal(start, TimeUnit::S);
    let expr = format!(
        "to_timestamp(floor((epoch({x_axis_expr}) - {start_epoch}) / {width_seconds}.0) * {width_seconds} + {start_epoch})"
    );
    BucketPlan {
        width_seconds,
        expr,
    }
}
