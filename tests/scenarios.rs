//! End-to-end scenarios against the bundled `TEST` fixture
//! (`events(timestamp, event, value, user)`, spec fixture rows).

use std::path::Path;

use scubaduck::catalog::Dataset;
use scubaduck::error::Error;
use scubaduck::params::QueryParameters;
use scubaduck::time::FixedClock;

fn fixture() -> Dataset {
    Dataset::open(Some(Path::new("TEST"))).unwrap()
}

fn clock_at(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> FixedClock {
    FixedClock(
        chrono::NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap(),
    )
}

fn params(json: serde_json::Value) -> QueryParameters {
    serde_json::from_value(json).unwrap()
}

#[test]
fn samples_window_orders_and_limits() {
    let ds = fixture();
    let p = params(serde_json::json!({
        "table": "events",
        "time_column": "timestamp",
        "start": "2024-01-01 00:00:00",
        "end": "2024-01-02 00:00:00",
        "order_by": "timestamp",
        "limit": 10,
        "columns": ["timestamp", "event", "value", "user"],
    }));
    let response = ds.run_query(&p, &clock_at(2024, 1, 2, 4, 0, 0)).unwrap();
    assert_eq!(response.rows.len(), 3);
    // columns = [timestamp, event, value, user]; event is index 1.
    assert_eq!(response.rows[0][1], "login");
}

#[test]
fn list_filter_restricts_to_named_users() {
    let ds = fixture();
    let p = params(serde_json::json!({
        "table": "events",
        "time_column": "timestamp",
        "start": "2024-01-01 00:00:00",
        "end": "2024-01-02 03:00:00",
        "filters": [{"column": "user", "op": "=", "value": ["alice", "charlie"]}],
        "columns": ["timestamp", "user"],
    }));
    let response = ds.run_query(&p, &clock_at(2024, 1, 2, 4, 0, 0)).unwrap();
    // columns = [timestamp, user]; user is index 1.
    let users: Vec<&str> = response.rows.iter().map(|r| r[1].as_str().unwrap()).collect();
    assert_eq!(users, vec!["alice", "alice", "charlie"]);
}

#[test]
fn table_group_by_user_sums_value_and_counts_hits() {
    let ds = fixture();
    let p = params(serde_json::json!({
        "table": "events",
        "time_column": "timestamp",
        "start": "2024-01-01 00:00:00",
        "end": "2024-01-03 00:00:00",
        "graph_type": "table",
        "group_by": ["user"],
        "columns": ["value"],
        "aggregate": "Sum",
        "show_hits": true,
    }));
    let response = ds.run_query(&p, &clock_at(2024, 1, 2, 4, 0, 0)).unwrap();
    // group_by=[user], show_hits -> [user, Hits, value].
    let alice = response
        .rows
        .iter()
        .find(|r| r[0] == "alice")
        .expect("alice row present");
    assert_eq!(alice[1], 2);
    assert_eq!(alice[2], 40.0);
}

#[test]
fn timeseries_groups_by_bucket_and_user() {
    let ds = fixture();
    let p = params(serde_json::json!({
        "table": "events",
        "time_column": "timestamp",
        "start": "2024-01-01 00:00:00",
        "end": "2024-01-03 00:00:00",
        "graph_type": "timeseries",
        "group_by": ["user"],
        "aggregate": "Count",
        "columns": ["value"],
        "granularity": "1 day",
    }));
    let response = ds.run_query(&p, &clock_at(2024, 1, 2, 4, 0, 0)).unwrap();
    // One row per (bucket, user) pair that actually has data: alice@day0,
    // bob@day0, charlie@day1.
    assert_eq!(response.rows.len(), 3);
    assert_eq!(response.bucket_size, Some(86_400));
}

#[test]
fn timeseries_limit_restricts_series_count() {
    let ds = fixture();
    let p = params(serde_json::json!({
        "table": "events",
        "time_column": "timestamp",
        "start": "2024-01-01 00:00:00",
        "end": "2024-01-03 00:00:00",
        "graph_type": "timeseries",
        "group_by": ["user"],
        "aggregate": "Count",
        "columns": ["value"],
        "granularity": "1 day",
        "limit": 1,
        "order_by": "user",
    }));
    let response = ds.run_query(&p, &clock_at(2024, 1, 2, 4, 0, 0)).unwrap();
    // bucket, group_by=[user] -> user is index 1.
    assert!(response.rows.iter().all(|r| r[1] == "alice"));
}

#[test]
fn default_window_is_last_hour_under_fixed_clock() {
    let ds = fixture();
    let p = params(serde_json::json!({
        "table": "events",
        "time_column": "timestamp",
    }));
    let response = ds.run_query(&p, &clock_at(2024, 1, 2, 4, 0, 0)).unwrap();
    assert_eq!(response.rows.len(), 1);
    // No columns selected -> "SELECT *"; table order is
    // (timestamp, event, value, user), so user is index 3.
    assert_eq!(response.rows[0][3], "charlie");
}

#[test]
fn unparseable_start_is_a_bad_request_style_error() {
    let ds = fixture();
    let p = params(serde_json::json!({
        "table": "events",
        "start": "nonsense",
    }));
    let err = ds.run_query(&p, &clock_at(2024, 1, 2, 4, 0, 0)).unwrap_err();
    assert!(matches!(err, Error::TimeParse(_)));
    assert_eq!(err.status_code(), 400);
}

#[test]
fn table_mode_rejects_unselected_unknown_column() {
    let ds = fixture();
    let p = params(serde_json::json!({
        "table": "events",
        "graph_type": "table",
        "columns": ["user", "Hits", "value"],
        "group_by": ["user"],
        "aggregate": "Count",
        "show_hits": true,
    }));
    let err = ds.run_query(&p, &clock_at(2024, 1, 2, 4, 0, 0)).unwrap_err();
    match err {
        Error::Schema(msg) => assert!(msg.contains("Unknown column")),
        other => panic!("expected Schema error, got {other:?}"),
    }
}

#[test]
fn derived_column_multiplies_value() {
    let ds = fixture();
    let mut p = params(serde_json::json!({
        "table": "events",
        "time_column": "timestamp",
        "start": "2024-01-01 00:00:00",
        "end": "2024-01-02 00:00:00",
        "order_by": "timestamp",
        "columns": ["timestamp"],
    }));
    p.derived_columns.insert("val2".to_string(), "value * 2".to_string());
    let response = ds.run_query(&p, &clock_at(2024, 1, 2, 4, 0, 0)).unwrap();
    // columns = [timestamp], then derived "val2" -> index 1.
    assert_eq!(response.rows[0][1], 20.0);
}

#[test]
fn compiling_identical_parameters_twice_is_byte_identical() {
    let ds = fixture();
    let p = params(serde_json::json!({ "table": "events" }));
    let a = ds.run_query(&p, &clock_at(2024, 1, 2, 4, 0, 0)).unwrap();
    let b = ds.run_query(&p, &clock_at(2024, 1, 2, 4, 0, 0)).unwrap();
    assert_eq!(a.sql, b.sql);
}
