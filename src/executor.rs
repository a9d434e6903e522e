//! Ties catalog, time, filter, compiler and bucket planning together and
//! executes the compiled SQL, shaping rows into JSON (spec §4.G).

use duckdb::types::Value as DuckValue;
use serde_json::Value as JsonValue;

use crate::catalog::Dataset;
use crate::compiler::{self, CompiledQuery};
use crate::error::{Error, Result};
use crate::params::QueryParameters;
use crate::time::{format_timestamp, Clock};

/// JS's safe integer range; values outside it are shipped as strings so
/// clients don't silently lose precision (spec §4.G).
const JS_SAFE_INT_MAX: i64 = 9_007_199_254_740_992;
const JS_SAFE_INT_MIN: i64 = -9_007_199_254_740_992;

/// The full response envelope for `POST /api/query` (spec §4.G / §7).
#[derive(Debug, serde::Serialize)]
pub struct QueryResponse {
    pub sql: String,
    pub rows: Vec<JsonValue>,
    pub start: String,
    pub end: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_size: Option<i64>,
}

impl Dataset {
    /// Compile and execute `params`, shaping the result into a
    /// [`QueryResponse`].
    ///
    /// # Errors
    /// Returns [`Error::Schema`]/[`Error::FilterShape`]/[`Error::TimeParse`]
    /// from compilation, or [`Error::Execution`] if the engine rejects the
    /// compiled SQL.
    pub fn run_query(&self, params: &QueryParameters, clock: &dyn Clock) -> Result<QueryResponse> {
        let compiled = compiler::compile(params, &self.catalog, clock)?;
        let rows = self.execute(&compiled)?;

        Ok(QueryResponse {
            sql: compiled.sql,
            rows,
            start: format_timestamp(compiled.resolved_start),
            end: format_timestamp(compiled.resolved_end),
            bucket_size: compiled.bucket_size,
        })
    }

    fn execute(&self, compiled: &CompiledQuery) -> Result<Vec<JsonValue>> {
        let conn = self.conn.lock().expect("connection mutex poisoned");
        let mut stmt = conn.prepare(&compiled.sql).map_err(|e| Error::Execution {
            message: e.to_string(),
            sql: compiled.sql.clone(),
        })?;

        let param_refs: Vec<&dyn duckdb::types::ToSql> =
            compiled.bound.iter().map(AsRef::as_ref).collect();

        let mut query_rows = stmt
            .query(param_refs.as_slice())
            .map_err(|e| Error::Execution {
                message: e.to_string(),
                sql: compiled.sql.clone(),
            })?;

        let column_count = query_rows
            .as_ref()
            .map_or(0, duckdb::Statement::column_count);

        let mut out = Vec::new();
        while let Some(row) = query_rows.next().map_err(|e| Error::Execution {
            message: e.to_string(),
            sql: compiled.sql.clone(),
        })? {
            let mut values = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                let value: DuckValue = row.get(idx).map_err(|e| Error::Execution {
                    message: e.to_string(),
                    sql: compiled.sql.clone(),
                })?;
                values.push(duck_value_to_json(&value));
            }
            out.push(JsonValue::Array(values));
        }
        Ok(out)
    }
}

/// Shape a single DuckDB cell into JSON, per spec §4.G: temporal values
/// become ISO-ish timestamp strings, integers outside JS's safe range
/// become strings, everything else maps structurally.
fn duck_value_to_json(value: &DuckValue) -> JsonValue {
    match value {
        DuckValue::Null => JsonValue::Null,
        DuckValue::Boolean(b) => JsonValue::Bool(*b),
        DuckValue::TinyInt(n) => JsonValue::from(*n),
        DuckValue::SmallInt(n) => JsonValue::from(*n),
        DuckValue::Int(n) => JsonValue::from(*n),
        DuckValue::BigInt(n) => int_to_json(*n),
        DuckValue::HugeInt(n) => JsonValue::String(n.to_string()),
        DuckValue::Float(f) => json_from_f64(f64::from(*f)),
        DuckValue::Double(f) => json_from_f64(*f),
        DuckValue::Timestamp(unit, raw) => timestamp_to_json(*unit, *raw),
        DuckValue::Text(s) => JsonValue::String(s.clone()),
        DuckValue::Blob(b) => JsonValue::String(format!("\\x{}", hex_encode(b))),
        other => JsonValue::String(format!("{other:?}")),
    }
}

/// Render a raw `(unit, count-since-epoch)` timestamp cell the way it is
/// echoed to clients, matching [`crate::time::format_timestamp`].
fn timestamp_to_json(unit: duckdb::types::TimeUnit, raw: i64) -> JsonValue {
    use duckdb::types::TimeUnit as DuckTimeUnit;
    let (secs, nanos) = match unit {
        DuckTimeUnit::Second => (raw, 0),
        DuckTimeUnit::Millisecond => (raw.div_euclid(1_000), raw.rem_euclid(1_000) * 1_000_000),
        DuckTimeUnit::Microsecond => (raw.div_euclid(1_000_000), raw.rem_euclid(1_000_000) * 1_000),
        DuckTimeUnit::Nanosecond => (raw.div_euclid(1_000_000_000), raw.rem_euclid(1_000_000_000)),
    };
    chrono::DateTime::from_timestamp(secs, u32::try_from(nanos).unwrap_or(0)).map_or_else(
        || JsonValue::String(raw.to_string()),
        |dt| JsonValue::String(crate::time::format_timestamp(dt.naive_utc())),
    )
}

fn int_to_json(n: i64) -> JsonValue {
    if (JS_SAFE_INT_MIN..=JS_SAFE_INT_MAX).contains(&n) {
        JsonValue::from(n)
    } else {
        JsonValue::String(n.to_string())
    }
}

fn json_from_f64(f: f64) -> JsonValue {
    serde_json::Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
