//! SELECT/GROUP BY/ORDER BY/LIMIT synthesis for the three graph modes
//! (spec §4.E), tying together the catalog, time resolver, filter compiler,
//! and bucket planner.

use chrono::NaiveDateTime;

use crate::aggregate::Aggregate;
use crate::bucket::{bucket_expr, pick_width_seconds};
use crate::catalog::{Catalog, ColumnInfo, ColumnType};
use crate::error::{Error, Result};
use crate::filter::compile_filter;
use crate::params::{GraphType, QueryParameters};
use crate::quote::quote_ident;
use crate::time::{self, to_epoch_literal, Clock};

/// A fully-assembled query: SQL text plus positionally-bound scalar
/// parameters, ready for execution.
pub struct CompiledQuery {
    pub sql: String,
    pub bound: Vec<Box<dyn duckdb::types::ToSql>>,
    pub bucket_size: Option<i64>,
    pub resolved_start: NaiveDateTime,
    pub resolved_end: NaiveDateTime,
}

fn lookup_column<'a>(catalog: &'a Catalog, table: &str, name: &str) -> Result<&'a ColumnInfo> {
    catalog
        .column(table, name)
        .ok_or_else(|| Error::Schema(format!("Unknown column: {name}")))
}

/// True if `col` can stand as the x-axis / time-filter column: a temporal
/// column, or the configured `time_column` when it's numeric (interpreted
/// as epoch per `time_unit`, spec §3).
fn is_effective_temporal(col: &ColumnInfo, params: &QueryParameters) -> bool {
    matches!(col.kind, ColumnType::Temporal)
        || (!params.time_column.is_empty()
            && col.name == params.time_column
            && matches!(col.kind, ColumnType::Numeric))
}

/// Resolve `start`/`end` request strings against `clock`, falling back to
/// a default one-hour trailing window when omitted (spec §3 invariant 6:
/// a default window exists, so the response always echoes resolved,
/// absolute timestamps).
fn resolve_window(
    params: &QueryParameters,
    clock: &dyn Clock,
) -> Result<(NaiveDateTime, NaiveDateTime)> {
    let start = match &params.start {
        Some(s) => time::resolve(s, clock)?,
        None => time::resolve("-1 hour", clock)?,
    };
    let end = match &params.end {
        Some(s) => time::resolve(s, clock)?,
        None => time::resolve("now", clock)?,
    };
    Ok((start, end))
}

fn time_bound_literal(
    col: &ColumnInfo,
    params: &QueryParameters,
    ts: NaiveDateTime,
    bound: &mut Vec<Box<dyn duckdb::types::ToSql>>,
    idx: &mut usize,
) -> String {
    let placeholder = *idx;
    *idx += 1;
    if matches!(col.kind, ColumnType::Temporal) {
        bound.push(Box::new(time::format_timestamp(ts)));
    } else {
        bound.push(Box::new(to_epoch_literal(ts, params.time_unit)));
    }
    format!("?{placeholder}")
}

struct WhereClause {
    predicate: Option<String>,
    bound: Vec<Box<dyn duckdb::types::ToSql>>,
}

fn build_where(
    params: &QueryParameters,
    catalog: &Catalog,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<WhereClause> {
    let mut bound: Vec<Box<dyn duckdb::types::ToSql>> = Vec::new();
    let mut idx = 1usize;
    let mut parts = Vec::new();

    // The resolved window always applies once a time_column is configured:
    // an omitted start/end still resolves to the default window (spec §3
    // invariant 6), and that default must filter rows, not just be echoed.
    if !params.time_column.is_empty() {
        let col = lookup_column(catalog, &params.table, &params.time_column)?;
        let col_ref = quote_ident(&col.name);
        let start_lit = time_bound_literal(col, params, start, &mut bound, &mut idx);
        parts.push(format!("{col_ref} >= {start_lit}"));
        let end_lit = time_bound_literal(col, params, end, &mut bound, &mut idx);
        parts.push(format!("{col_ref} <= {end_lit}"));
    }

    for filter in &params.filters {
        let col = lookup_column(catalog, &params.table, &filter.column)?;
        if let Some(compiled) = compile_filter(filter, col.kind, &mut bound, &mut idx)? {
            parts.push(compiled.predicate);
        }
    }

    Ok(WhereClause {
        predicate: if parts.is_empty() {
            None
        } else {
            Some(parts.join(" AND "))
        },
        bound,
    })
}

fn render_derived(params: &QueryParameters) -> Vec<String> {
    params
        .derived_columns
        .iter()
        .map(|(name, expr)| format!("{expr} AS {}", quote_ident(name)))
        .collect()
}

fn compile_samples(
    params: &QueryParameters,
    catalog: &Catalog,
    where_clause: &WhereClause,
) -> Result<String> {
    if !params.group_by.is_empty() || params.aggregate.is_some() {
        return Err(Error::Schema(
            "group_by and aggregate are only valid for graph_type table or timeseries".into(),
        ));
    }

    let mut select_parts: Vec<String> = Vec::new();
    for name in &params.columns {
        lookup_column(catalog, &params.table, name)?;
        select_parts.push(quote_ident(name));
    }
    select_parts.extend(render_derived(params));

    let select = if select_parts.is_empty() {
        "*".to_string()
    } else {
        select_parts.join(", ")
    };

    let mut sql = format!("SELECT {select} FROM {}", quote_ident(&params.table));
    append_where(&mut sql, where_clause);
    append_order_and_limit(&mut sql, params, None);
    Ok(sql)
}

/// Columns that need aggregating: `columns` minus `group_by`, each resolved
/// and validated per spec §3 invariant 2.
fn aggregated_columns<'a>(
    params: &'a QueryParameters,
    catalog: &Catalog,
    aggregate: Option<Aggregate>,
) -> Result<Vec<(&'a str, &'a ColumnInfo)>> {
    let mut out = Vec::new();
    for name in &params.columns {
        if params.group_by.iter().any(|g| g == name) {
            continue;
        }
        let col = lookup_column(catalog, &params.table, name)?;
        let is_temporal = is_effective_temporal(col, params);
        let is_avg_timestamp = is_temporal && matches!(aggregate, Some(Aggregate::Avg));
        if !matches!(col.kind, ColumnType::Numeric) && !is_avg_timestamp {
            return Err(Error::Schema(format!(
                "column {name} must be numeric to be aggregated (or a temporal column under Avg)"
            )));
        }
        let Some(_agg) = aggregate else {
            return Err(Error::Schema(format!(
                "aggregate is required to select non-grouped column {name}"
            )));
        };
        out.push((name.as_str(), col));
    }
    Ok(out)
}

fn compile_table(
    params: &QueryParameters,
    catalog: &Catalog,
    where_clause: &WhereClause,
) -> Result<String> {
    let aggregate = params.aggregate.as_deref().map(Aggregate::parse).transpose()?;

    for g in &params.group_by {
        lookup_column(catalog, &params.table, g)?;
    }
    let agg_cols = aggregated_columns(params, catalog, aggregate)?;

    let mut select_parts: Vec<String> = params.group_by.iter().map(|g| quote_ident(g)).collect();
    if params.show_hits {
        select_parts.push("count(*) AS \"Hits\"".to_string());
    }
    for (name, col) in &agg_cols {
        let agg = aggregate.expect("validated by aggregated_columns");
        let is_temporal = is_effective_temporal(col, params);
        select_parts.push(format!(
            "{} AS {}",
            agg.render(&quote_ident(name), is_temporal),
            quote_ident(name)
        ));
    }
    select_parts.extend(render_derived(params));

    let mut sql = format!(
        "SELECT {} FROM {}",
        select_parts.join(", "),
        quote_ident(&params.table)
    );
    append_where(&mut sql, where_clause);
    if !params.group_by.is_empty() {
        let group_list = params
            .group_by
            .iter()
            .map(|g| quote_ident(g))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!(" GROUP BY {group_list}"));
    }
    append_order_and_limit(&mut sql, params, None);
    Ok(sql)
}

#[allow(clippy::too_many_lines)]
fn compile_timeseries(
    params: &QueryParameters,
    catalog: &Catalog,
    where_clause: &WhereClause,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<(String, i64)> {
    let x_axis_name = params
        .x_axis_column()
        .ok_or_else(|| Error::Schema("timeseries requires x_axis (or time_column)".into()))?;
    let x_axis_col = lookup_column(catalog, &params.table, x_axis_name)?;
    if !is_effective_temporal(x_axis_col, params) {
        return Err(Error::Schema(format!(
            "x_axis column {x_axis_name} must be temporal"
        )));
    }

    let aggregate = params.aggregate.as_deref().map(Aggregate::parse).transpose()?;
    for g in &params.group_by {
        lookup_column(catalog, &params.table, g)?;
    }
    let agg_cols = aggregated_columns(params, catalog, aggregate)?;

    let width = pick_width_seconds(&params.granularity, start, end);
    let x_axis_ref = quote_ident(&x_axis_col.name);
    let plan = bucket_expr(&x_axis_ref, start, width);

    let mut select_parts = vec![format!("{} AS \"bucket\"", plan.expr)];
    let group_no_columns = params.group_by.is_empty() && agg_cols.is_empty();

    if group_no_columns {
        select_parts.push("count(*) AS \"Hits\"".to_string());
    } else {
        select_parts.extend(params.group_by.iter().map(|g| quote_ident(g)));
        if params.show_hits {
            select_parts.push("count(*) AS \"Hits\"".to_string());
        }
        for (name, col) in &agg_cols {
            let agg = aggregate.expect("validated by aggregated_columns");
            let is_temporal = is_effective_temporal(col, params);
            select_parts.push(format!(
                "{} AS {}",
                agg.render(&quote_ident(name), is_temporal),
                quote_ident(name)
            ));
        }
    }
    select_parts.extend(render_derived(params));

    let inner_from = format!("SELECT * FROM {}", quote_ident(&params.table));
    let mut inner_sql = inner_from;
    append_where(&mut inner_sql, where_clause);

    let mut sql = format!(
        "SELECT {} FROM ({inner_sql}) AS t",
        select_parts.join(", ")
    );
    let mut group_list = vec!["\"bucket\"".to_string()];
    if !group_no_columns {
        group_list.extend(params.group_by.iter().map(|g| quote_ident(g)));
    }
    sql.push_str(&format!(" GROUP BY {}", group_list.join(", ")));
    sql.push_str(" ORDER BY \"bucket\" ASC");

    // Limit restricts series count, applied before bucket explosion
    // (spec §3 invariant 4, §4.E, §9). Only meaningful with group_by.
    if let (Some(limit), false) = (params.limit, params.group_by.is_empty()) {
        let order_col = params
            .order_by
            .as_deref()
            .filter(|c| params.group_by.iter().any(|g| g == c))
            .unwrap_or(&params.group_by[0]);
        let group_cols = params
            .group_by
            .iter()
            .map(|g| quote_ident(g))
            .collect::<Vec<_>>()
            .join(", ");
        sql = format!(
            "WITH \"__grouped\" AS ({sql}), \"__keys\" AS (SELECT DISTINCT {group_cols} FROM \"__grouped\" ORDER BY {} {} LIMIT {limit}) \
             SELECT \"__grouped\".* FROM \"__grouped\" JOIN \"__keys\" USING ({group_cols}) ORDER BY \"bucket\" ASC",
            quote_ident(order_col),
            params.order_dir.as_sql()
        );
    }

    Ok((sql, width))
}

fn append_where(sql: &mut String, where_clause: &WhereClause) {
    if let Some(predicate) = &where_clause.predicate {
        sql.push_str(" WHERE ");
        sql.push_str(predicate);
    }
}

fn append_order_and_limit(sql: &mut String, params: &QueryParameters, default_order: Option<&str>) {
    if let Some(order_by) = params.order_by.as_deref().or(default_order) {
        sql.push_str(&format!(
            " ORDER BY {} {}",
            quote_ident(order_by),
            params.order_dir.as_sql()
        ));
    }
    if let Some(limit) = params.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
}

/// Compile `params` into a single executable SQL statement (spec §4.E).
///
/// # Errors
/// Returns [`Error::Schema`], [`Error::FilterShape`] or [`Error::TimeParse`]
/// per the validations in spec §3/§4.
pub fn compile(params: &QueryParameters, catalog: &Catalog, clock: &dyn Clock) -> Result<CompiledQuery> {
    if !catalog.has_table(&params.table) {
        return Err(Error::Schema(format!("Unknown table: {}", params.table)));
    }

    let (start, end) = resolve_window(params, clock)?;
    let where_clause = build_where(params, catalog, start, end)?;

    let (sql, bucket_size) = match params.graph_type {
        GraphType::Samples => (compile_samples(params, catalog, &where_clause)?, None),
        GraphType::Table => (compile_table(params, catalog, &where_clause)?, None),
        GraphType::Timeseries => {
            let (sql, width) = compile_timeseries(params, catalog, &where_clause, start, end)?;
            (sql, Some(width))
        }
    };

    Ok(CompiledQuery {
        sql,
        bound: where_clause.bound,
        bucket_size,
        resolved_start: start,
        resolved_end: end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Dataset;
    use crate::time::FixedClock;
    use std::path::Path;

    fn fixture() -> Dataset {
        Dataset::open(Some(Path::new("TEST"))).unwrap()
    }

    fn clock() -> FixedClock {
        FixedClock(
            chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(4, 0, 0)
                .unwrap(),
        )
    }

    fn base_params() -> QueryParameters {
        serde_json::from_value(serde_json::json!({ "table": "events" })).unwrap()
    }

    #[test]
    fn samples_rejects_group_by() {
        let ds = fixture();
        let mut params = base_params();
        params.group_by = vec!["user".to_string()];
        let err = compile(&params, &ds.catalog, &clock()).unwrap_err();
        assert!(matches!(err, Error::Schema(msg) if msg.contains("only valid")));
    }

    #[test]
    fn unknown_table_is_schema_error() {
        let ds = fixture();
        let mut params = base_params();
        params.table = "nope".to_string();
        let err = compile(&params, &ds.catalog, &clock()).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn compiling_twice_is_deterministic() {
        let ds = fixture();
        let params = base_params();
        let a = compile(&params, &ds.catalog, &clock()).unwrap();
        let b = compile(&params, &ds.catalog, &clock()).unwrap();
        assert_eq!(a.sql, b.sql);
    }

    #[test]
    fn table_unknown_selected_column_errors() {
        let ds = fixture();
        let mut params = base_params();
        params.graph_type = GraphType::Table;
        params.group_by = vec!["user".to_string()];
        params.columns = vec!["user".to_string(), "Hits".to_string(), "value".to_string()];
        params.aggregate = Some("Count".to_string());
        params.show_hits = true;
        let err = compile(&params, &ds.catalog, &clock()).unwrap_err();
        assert!(matches!(err, Error::Schema(msg) if msg.contains("Unknown column")));
    }

    #[test]
    fn timeseries_requires_temporal_x_axis() {
        let ds = fixture();
        let mut params = base_params();
        params.graph_type = GraphType::Timeseries;
        params.x_axis = Some("user".to_string());
        params.granularity = crate::params::Granularity::Auto;
        let err = compile(&params, &ds.catalog, &clock()).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }
}
