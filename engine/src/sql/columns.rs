//! Plain column filters
//!
//! A lighter query form than the structured filter: `column op value`
//! triples ANDed together, with explicit column sorts. Used for lookups by
//! key where the caller already knows the column names.

use serde_json::Value;

use super::plan::{PlanOptions, Planner, QueryPlan};
use super::render::SqlValue;
use crate::core::config::SqlConfig;
use crate::error::QueryError;
use crate::filter::SortOrder;
use crate::schema::{FieldKind, SchemaCache, TableSchema};
use crate::utils::time::parse_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Like,
    IsNull,
    IsNotNull,
}

impl ColumnOp {
    /// Parse an operator as written in SQL (`=`, `<>`, `IN`, `IS NULL`, ...)
    pub fn parse(s: &str) -> Result<Self, QueryError> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        match normalized.as_str() {
            "=" | "==" => Ok(Self::Eq),
            "<>" | "!=" => Ok(Self::Ne),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Gte),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Lte),
            "IN" => Ok(Self::In),
            "NOT IN" => Ok(Self::NotIn),
            "LIKE" => Ok(Self::Like),
            "IS NULL" => Ok(Self::IsNull),
            "IS NOT NULL" => Ok(Self::IsNotNull),
            _ => Err(QueryError::parameter(
                "operator",
                format!("unsupported operator '{}'", s),
            )),
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Like => "LIKE",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnFilter {
    pub field: String,
    pub op: ColumnOp,
    pub value: Value,
}

impl ColumnFilter {
    pub fn new(field: impl Into<String>, op: ColumnOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, ColumnOp::Eq, value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSort {
    pub field: String,
    pub order: SortOrder,
}

impl ColumnSort {
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            order,
        }
    }
}

impl QueryPlan {
    /// Plan a column-filter query against a table
    pub fn from_columns(
        schema: &TableSchema,
        cache: &SchemaCache,
        config: &SqlConfig,
        filters: &[ColumnFilter],
        sorts: &[ColumnSort],
        target: Option<&str>,
    ) -> Result<Self, QueryError> {
        let options = PlanOptions::default();
        let mut planner = Planner::new(schema, cache, config, &options)?;

        let mut terms = Vec::with_capacity(filters.len());
        for filter in filters {
            let Some(column) = planner.column(&filter.field)? else {
                continue;
            };
            let qualified = column.qualified();
            let term = match filter.op {
                ColumnOp::IsNull | ColumnOp::IsNotNull => {
                    format!("{} {}", qualified, filter.op.as_sql())
                }
                ColumnOp::In | ColumnOp::NotIn => {
                    let items = filter.value.as_array().ok_or_else(|| {
                        QueryError::parameter("value", format!("{} expects an array", filter.op.as_sql()))
                    })?;
                    if items.is_empty() {
                        let always = if filter.op == ColumnOp::In { "1 = 0" } else { "1 = 1" };
                        always.to_string()
                    } else {
                        let mut placeholders = Vec::with_capacity(items.len());
                        for item in items {
                            let value = bind_value(item, column.kind)?;
                            placeholders.push(planner.params.push(value));
                        }
                        format!("{} {} ({})", qualified, filter.op.as_sql(), placeholders.join(", "))
                    }
                }
                op => {
                    let value = bind_value(&filter.value, column.kind)?;
                    let placeholder = planner.params.push(value);
                    format!("{} {} {}", qualified, op.as_sql(), placeholder)
                }
            };
            terms.push(term);
        }
        let filter_count = terms.len();
        let group = match terms.len() {
            0 => None,
            1 => terms.pop(),
            _ => Some(
                terms
                    .iter()
                    .map(|t| format!("({})", t))
                    .collect::<Vec<_>>()
                    .join(" AND "),
            ),
        };

        let order_by = planner.order_by(sorts.iter().map(|s| (s.field.as_str(), s.order)))?;
        planner.finish(group, order_by, filter_count, target)
    }
}

/// Timestamp columns take parsed values so they bind in the stored encoding
fn bind_value(value: &Value, kind: FieldKind) -> Result<SqlValue, QueryError> {
    if kind == FieldKind::Timestamp
        && let Value::String(s) = value
        && let Some(ts) = parse_timestamp(s)
    {
        return Ok(SqlValue::Timestamp(ts.to_utc()));
    }
    SqlValue::from_json(value)
        .ok_or_else(|| QueryError::parameter("value", format!("cannot bind {}", value)))
}
