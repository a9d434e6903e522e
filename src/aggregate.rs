//! Aggregate-function label parsing and SQL rendering (spec §4.E table).

use crate::error::{Error, Result};

/// A parsed `aggregate` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Avg,
    Sum,
    Min,
    Max,
    Count,
    CountDistinct,
    /// `p<NN>` quantile, NN in 0..=100.
    Quantile(u8),
}

impl Aggregate {
    /// Parse a case-insensitive aggregate label.
    ///
    /// # Errors
    /// Returns [`Error::Schema`] if the label matches nothing.
    pub fn parse(label: &str) -> Result<Self> {
        let lower = label.trim().to_ascii_lowercase();
        match lower.as_str() {
            "avg" => Ok(Self::Avg),
            "sum" => Ok(Self::Sum),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "count" => Ok(Self::Count),
            "count distinct" => Ok(Self::CountDistinct),
            _ => Self::parse_quantile(&lower)
                .ok_or_else(|| Error::Schema(format!("unknown aggregate: {label}"))),
        }
    }

    fn parse_quantile(lower: &str) -> Option<Self> {
        let rest = lower.strip_prefix('p')?;
        let n: u8 = rest.parse().ok()?;
        (n <= 100).then_some(Self::Quantile(n))
    }

    /// Render this aggregate applied to `col_expr`. `is_temporal` selects
    /// the `Avg`-on-timestamp special case (spec §4.E).
    pub fn render(self, col_expr: &str, is_temporal: bool) -> String {
        match self {
            Self::Avg if is_temporal => format!("epoch_to_timestamp(avg(epoch({col_expr})))"),
            Self::Avg => format!("avg({col_expr})"),
            Self::Sum => format!("sum({col_expr})"),
            Self::Min => format!("min({col_expr})"),
            Self::Max => format!("max({col_expr})"),
            Self::Count => format!("count({col_expr})"),
            Self::CountDistinct => format!("count(DISTINCT {col_expr})"),
            Self::Quantile(n) => format!("quantile({col_expr}, {:.2})", f64::from(n) / 100.0),
        }
    }
}
