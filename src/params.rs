//! Typed request parameters for `/api/query`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Which of the three pivot shapes to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphType {
    #[default]
    Samples,
    Table,
    Timeseries,
}

/// Sort direction for `order_by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum OrderDir {
    #[default]
    #[serde(rename = "ASC")]
    Asc,
    #[serde(rename = "DESC")]
    Desc,
}

impl OrderDir {
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Unit used to interpret a numeric temporal column as epoch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    #[default]
    S,
    Ms,
    Us,
    Ns,
}

impl TimeUnit {
    /// Multiplier to turn a count of this unit into seconds (as a float divisor).
    pub const fn per_second(self) -> i64 {
        match self {
            Self::S => 1,
            Self::Ms => 1_000,
            Self::Us => 1_000_000,
            Self::Ns => 1_000_000_000,
        }
    }
}

/// Filter comparison operator (spec.md §3 "Filter operator set").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum FilterOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "!contains")]
    NotContains,
    #[serde(rename = "~")]
    Regex,
    #[serde(rename = "empty")]
    Empty,
    #[serde(rename = "!empty")]
    NotEmpty,
}

/// One `{column, op, value}` filter descriptor.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterDescriptor {
    pub column: String,
    pub op: FilterOp,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

/// Bucket width request for timeseries mode.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Granularity {
    #[default]
    Auto,
    Fine,
    /// `<N> <unit>`, e.g. `(1, "day")`.
    Fixed(i64, String),
}

impl Granularity {
    fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("auto") || trimmed.is_empty() {
            return Self::Auto;
        }
        if trimmed.eq_ignore_ascii_case("fine") {
            return Self::Fine;
        }
        let mut parts = trimmed.split_whitespace();
        if let (Some(n), Some(unit)) = (parts.next(), parts.next()) {
            if let Ok(n) = n.parse::<i64>() {
                return Self::Fixed(n, unit.to_ascii_lowercase());
            }
        }
        Self::Auto
    }
}

impl<'de> Deserialize<'de> for Granularity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map_or(Self::Auto, |s| Self::parse(&s)))
    }
}

impl Serialize for Granularity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            Self::Auto => "Auto".to_string(),
            Self::Fine => "Fine".to_string(),
            Self::Fixed(n, unit) => format!("{n} {unit}"),
        };
        serializer.serialize_str(&s)
    }
}

/// How the UI should draw gaps between points; not interpreted by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FillMode {
    #[serde(rename = "0")]
    Zero,
    Connect,
    Blank,
}

fn default_order_dir() -> OrderDir {
    OrderDir::Asc
}

/// The full, validated-at-compile-stage request body for `POST /api/query`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryParameters {
    pub table: String,
    #[serde(default)]
    pub time_column: String,
    #[serde(default)]
    pub time_unit: TimeUnit,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default = "default_order_dir")]
    pub order_dir: OrderDir,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub derived_columns: IndexMap<String, String>,
    #[serde(default)]
    pub filters: Vec<FilterDescriptor>,
    #[serde(default)]
    pub graph_type: GraphType,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub aggregate: Option<String>,
    #[serde(default)]
    pub show_hits: bool,
    #[serde(default)]
    pub x_axis: Option<String>,
    #[serde(default)]
    pub granularity: Granularity,
    #[serde(default)]
    pub fill: Option<FillMode>,
}

impl QueryParameters {
    /// Column timeseries buckets on; defaults to `time_column` when unset.
    pub fn x_axis_column(&self) -> Option<&str> {
        self.x_axis
            .as_deref()
            .or(Some(self.time_column.as_str()))
            .filter(|s| !s.is_empty())
    }
}
