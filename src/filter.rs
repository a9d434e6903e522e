//! Filter predicate compilation (spec §4.D).

use crate::catalog::ColumnType;
use crate::error::{Error, Result};
use crate::params::{FilterDescriptor, FilterOp};
use crate::quote::quote_ident;

/// A filter compiled to a SQL fragment plus any positionally-bound scalar
/// parameters it contributed.
pub struct CompiledFilter {
    pub predicate: String,
}

/// Escape a string for inlining as a single-quoted SQL literal (internal
/// quotes doubled).
pub fn quote_literal_str(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Render a JSON scalar as a bare SQL literal per spec §4.D's literal
/// formatting rules (strings quoted, numbers bare, booleans as TRUE/FALSE).
fn render_scalar_literal(value: &serde_json::Value) -> Result<String> {
    match value {
        serde_json::Value::String(s) => Ok(quote_literal_str(s)),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(if *b { "TRUE" } else { "FALSE" }.to_string()),
        other => Err(Error::FilterShape(format!(
            "unsupported filter value shape: {other}"
        ))),
    }
}

/// Compile one filter descriptor into a SQL predicate, honoring operator
/// and value-shape per spec §4.D. Returns `Ok(None)` for a no-op filter.
///
/// # Errors
/// Returns [`Error::FilterShape`] for an illegal list+operator combination,
/// or an unsupported value shape.
pub fn compile_filter(
    filter: &FilterDescriptor,
    column_type: ColumnType,
    params: &mut Vec<Box<dyn duckdb::types::ToSql>>,
    param_idx: &mut usize,
) -> Result<Option<CompiledFilter>> {
    let col = quote_ident(&filter.column);

    // Rule 1: empty/!empty.
    if matches!(filter.op, FilterOp::Empty | FilterOp::NotEmpty) {
        let predicate = match (filter.op, column_type) {
            (FilterOp::Empty, ColumnType::String) => format!("{col} = ''"),
            (FilterOp::NotEmpty, ColumnType::String) => format!("{col} != ''"),
            (FilterOp::Empty, _) => format!("{col} IS NULL"),
            (FilterOp::NotEmpty, _) => format!("{col} IS NOT NULL"),
        };
        return Ok(Some(CompiledFilter { predicate }));
    }

    // Rule 2: null or empty-list value is a no-op.
    let is_empty_list = matches!(&filter.value, Some(serde_json::Value::Array(v)) if v.is_empty());
    if filter.value.is_none() || is_empty_list {
        return Ok(None);
    }
    let value = filter.value.as_ref().expect("checked above");

    // Rule 3: list value.
    if let serde_json::Value::Array(values) = value {
        if filter.op != FilterOp::Eq {
            return Err(Error::FilterShape(format!(
                "operator {:?} cannot take a list value",
                filter.op
            )));
        }
        let rendered = values
            .iter()
            .map(render_scalar_literal)
            .collect::<Result<Vec<_>>>()?;
        return Ok(Some(CompiledFilter {
            predicate: format!("{col} IN ({})", rendered.join(", ")),
        }));
    }

    // Rules 4-6: scalar value, operator-specific shape.
    match filter.op {
        FilterOp::Contains | FilterOp::NotContains => {
            let serde_json::Value::String(s) = value else {
                return Err(Error::FilterShape(
                    "contains/!contains require a string value".into(),
                ));
            };
            let idx = *param_idx;
            *param_idx += 1;
            params.push(Box::new(format!("%{s}%")));
            let predicate = if filter.op == FilterOp::Contains {
                format!("{col} ILIKE ?{idx}")
            } else {
                format!("NOT ({col} ILIKE ?{idx})")
            };
            Ok(Some(CompiledFilter { predicate }))
        }
        FilterOp::Regex => {
            let serde_json::Value::String(s) = value else {
                return Err(Error::FilterShape("~ requires a string value".into()));
            };
            let idx = *param_idx;
            *param_idx += 1;
            params.push(Box::new(s.clone()));
            Ok(Some(CompiledFilter {
                predicate: format!("regexp_matches({col}, ?{idx})"),
            }))
        }
        FilterOp::Eq
        | FilterOp::Ne
        | FilterOp::Lt
        | FilterOp::Gt
        | FilterOp::Le
        | FilterOp::Ge => {
            let op_sql = match filter.op {
                FilterOp::Eq => "=",
                FilterOp::Ne => "!=",
                FilterOp::Lt => "<",
                FilterOp::Gt => ">",
                FilterOp::Le => "<=",
                FilterOp::Ge => ">=",
                _ => unreachable!(),
            };
            let idx = *param_idx;
            *param_idx += 1;
            bind_scalar(value, params)?;
            Ok(Some(CompiledFilter {
                predicate: format!("{col} {op_sql} ?{idx}"),
            }))
        }
        FilterOp::Empty | FilterOp::NotEmpty => unreachable!("handled above"),
    }
}

fn bind_scalar(value: &serde_json::Value, params: &mut Vec<Box<dyn duckdb::types::ToSql>>) -> Result<()> {
    match value {
        serde_json::Value::String(s) => params.push(Box::new(s.clone())),
        serde_json::Value::Bool(b) => params.push(Box::new(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                params.push(Box::new(i));
            } else if let Some(f) = n.as_f64() {
                params.push(Box::new(f));
            } else {
                return Err(Error::FilterShape(format!("unsupported numeric literal: {n}")));
            }
        }
        other => return Err(Error::FilterShape(format!("unsupported filter value shape: {other}"))),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(op: FilterOp, value: Option<serde_json::Value>, kind: ColumnType) -> Option<String> {
        let f = FilterDescriptor {
            column: "user".to_string(),
            op,
            value,
        };
        let mut params: Vec<Box<dyn duckdb::types::ToSql>> = Vec::new();
        let mut idx = 1;
        compile_filter(&f, kind, &mut params, &mut idx)
            .unwrap()
            .map(|c| c.predicate)
    }

    #[test]
    fn null_value_is_no_op() {
        assert_eq!(compile(FilterOp::Eq, None, ColumnType::String), None);
    }

    #[test]
    fn empty_list_is_no_op() {
        assert_eq!(compile(FilterOp::Eq, Some(json!([])), ColumnType::String), None);
    }

    #[test]
    fn list_with_eq_becomes_in() {
        let sql = compile(
            FilterOp::Eq,
            Some(json!(["alice", "charlie"])),
            ColumnType::String,
        )
        .unwrap();
        assert_eq!(sql, "\"user\" IN ('alice', 'charlie')");
    }

    #[test]
    fn list_with_non_eq_is_filter_shape_error() {
        let f = FilterDescriptor {
            column: "user".to_string(),
            op: FilterOp::Ne,
            value: Some(json!(["alice"])),
        };
        let mut params: Vec<Box<dyn duckdb::types::ToSql>> = Vec::new();
        let mut idx = 1;
        let err = compile_filter(&f, ColumnType::String, &mut params, &mut idx).unwrap_err();
        assert!(matches!(err, Error::FilterShape(_)));
    }

    #[test]
    fn empty_on_string_uses_equality() {
        let sql = compile(FilterOp::Empty, Some(json!("ignored")), ColumnType::String).unwrap();
        assert_eq!(sql, "\"user\" = ''");
    }

    #[test]
    fn empty_on_numeric_uses_is_null() {
        let sql = compile(FilterOp::Empty, Some(json!("ignored")), ColumnType::Numeric).unwrap();
        assert_eq!(sql, "\"user\" IS NULL");
    }

    #[test]
    fn contains_uses_ilike_with_wildcards() {
        let f = FilterDescriptor {
            column: "user".to_string(),
            op: FilterOp::Contains,
            value: Some(json!("ali")),
        };
        let mut params: Vec<Box<dyn duckdb::types::ToSql>> = Vec::new();
        let mut idx = 1;
        let compiled = compile_filter(&f, ColumnType::String, &mut params, &mut idx)
            .unwrap()
            .unwrap();
        assert_eq!(compiled.predicate, "\"user\" ILIKE ?1");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn literal_escaping_doubles_quotes() {
        assert_eq!(quote_literal_str("O'Brien"), "'O''Brien'");
    }
}
