//! SQL fragment rendering
//!
//! Turns compiled predicates into WHERE fragments with bound parameters.
//! Placeholders follow the dialect (`?` for SQLite, `$n` for Postgres).

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::fmt;

use crate::core::Dialect;
use crate::error::QueryError;
use crate::filter::{Condition, Operand, Pattern, Predicate, Projection};
use crate::utils::sql::escape_like_pattern;

/// Largest integer an f64 represents exactly
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// One bound parameter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Number(f64),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    /// Integral numbers bind as integers
    pub fn number(n: f64) -> Self {
        if n.fract() == 0.0 && n.abs() < MAX_EXACT_INT {
            SqlValue::Int(n as i64)
        } else {
            SqlValue::Number(n)
        }
    }

    /// Scalar JSON value; arrays and objects have no parameter form
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(SqlValue::Null),
            Value::Bool(b) => Some(SqlValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(SqlValue::Int(i)),
                None => n.as_f64().map(SqlValue::Number),
            },
            Value::String(s) => Some(SqlValue::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

impl From<&Operand> for SqlValue {
    fn from(operand: &Operand) -> Self {
        match operand {
            Operand::Number(n) => SqlValue::number(*n),
            Operand::Text(s) => SqlValue::Text(s.clone()),
            Operand::Bool(b) => SqlValue::Bool(*b),
            Operand::Timestamp(dt) => SqlValue::Timestamp(*dt),
            Operand::Time(t) => SqlValue::Text(t.format("%H:%M:%S").to_string()),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::Number(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "'{}'", v.replace('\'', "''")),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::Timestamp(v) => {
                write!(f, "'{}'", v.to_rfc3339_opts(SecondsFormat::AutoSi, false))
            }
        }
    }
}

/// Caller-supplied SQL with `?` placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl RawQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, value: SqlValue) -> Self {
        self.params.push(value);
        self
    }
}

impl Dialect {
    /// Placeholder for the `n`th parameter (1-based)
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Sqlite => "?".to_string(),
            Dialect::Postgres => format!("${}", n),
        }
    }

    /// `HH:MM:SS` projection of a timestamp column
    pub fn time_of_day(&self, column: &str) -> String {
        match self {
            Dialect::Sqlite => format!("time({})", column),
            Dialect::Postgres => format!("to_char({}, 'HH24:MI:SS')", column),
        }
    }

    /// Comparable form of a timestamp column
    ///
    /// SQLite stores timestamps as text in several layouts, so both sides of
    /// a comparison are normalized to `YYYY-MM-DD HH:MM:SS.SSS` UTC.
    pub fn timestamp(&self, column: &str) -> String {
        match self {
            Dialect::Sqlite => format!("strftime('%Y-%m-%d %H:%M:%f', {})", column),
            Dialect::Postgres => column.to_string(),
        }
    }

    /// Parameter for a timestamp operand, matching [`Dialect::timestamp`]
    pub fn timestamp_value(&self, dt: &DateTime<Utc>) -> SqlValue {
        match self {
            Dialect::Sqlite => SqlValue::Text(dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string()),
            Dialect::Postgres => SqlValue::Timestamp(*dt),
        }
    }

    /// Row lock suffix; SQLite locks the whole database inside a transaction
    pub fn lock_clause(&self, table_alias: &str) -> Option<String> {
        match self {
            Dialect::Sqlite => None,
            Dialect::Postgres => Some(format!("FOR UPDATE OF {}", table_alias)),
        }
    }
}

/// Parameter collector for one statement
#[derive(Debug, Clone)]
pub struct SqlParams {
    pub dialect: Dialect,
    pub values: Vec<SqlValue>,
}

impl SqlParams {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            values: Vec::new(),
        }
    }

    /// Bind a value, returning its placeholder
    pub fn push(&mut self, value: SqlValue) -> String {
        self.values.push(value);
        self.dialect.placeholder(self.values.len())
    }

    /// Splice a raw fragment, rewriting `?` outside string literals
    pub fn raw(&mut self, query: &RawQuery) -> Result<String, QueryError> {
        let mut out = String::with_capacity(query.sql.len());
        let mut params = query.params.iter();
        let mut in_literal = false;
        for ch in query.sql.chars() {
            match ch {
                '\'' => {
                    in_literal = !in_literal;
                    out.push(ch);
                }
                '?' if !in_literal => {
                    let value = params.next().ok_or_else(|| {
                        QueryError::parameter("raw query", "more placeholders than parameters")
                    })?;
                    out.push_str(&self.push(value.clone()));
                }
                _ => out.push(ch),
            }
        }
        if params.next().is_some() {
            return Err(QueryError::parameter(
                "raw query",
                "more parameters than placeholders",
            ));
        }
        Ok(out)
    }

    fn operand(&mut self, operand: &Operand, fold_case: bool) -> String {
        let value = match operand {
            Operand::Timestamp(dt) => self.dialect.timestamp_value(dt),
            other => SqlValue::from(other),
        };
        let placeholder = self.push(value);
        if fold_case {
            format!("LOWER({})", placeholder)
        } else {
            placeholder
        }
    }

    /// Render one predicate against a qualified column
    pub fn predicate(&mut self, predicate: &Predicate, column: &str) -> String {
        let expr = match predicate.projection {
            Projection::Value if compares_timestamps(&predicate.condition) => {
                self.dialect.timestamp(column)
            }
            Projection::Value => column.to_string(),
            Projection::TimeOfDay => self.dialect.time_of_day(column),
        };
        let folded = |fold_case: bool| {
            if fold_case {
                format!("LOWER({})", expr)
            } else {
                expr.clone()
            }
        };

        match &predicate.condition {
            Condition::Compare {
                op,
                operand,
                fold_case,
            } => {
                let lhs = folded(*fold_case);
                let rhs = self.operand(operand, *fold_case);
                format!("{} {} {}", lhs, op.as_sql(), rhs)
            }
            Condition::Between {
                low,
                high,
                fold_case,
            } => {
                let lhs = folded(*fold_case);
                let low = self.operand(low, *fold_case);
                let high = self.operand(high, *fold_case);
                format!("{} BETWEEN {} AND {}", lhs, low, high)
            }
            Condition::Outside {
                low,
                high,
                fold_case,
            } => {
                let lhs = folded(*fold_case);
                let low = self.operand(low, *fold_case);
                let high = self.operand(high, *fold_case);
                format!("({lhs} < {low} OR {lhs} > {high})")
            }
            Condition::Like {
                pattern,
                needle,
                negated,
            } => {
                let escaped = escape_like_pattern(needle);
                let pattern = match pattern {
                    Pattern::Contains => format!("%{}%", escaped),
                    Pattern::StartsWith => format!("{}%", escaped),
                    Pattern::EndsWith => format!("%{}", escaped),
                };
                let placeholder = self.push(SqlValue::Text(pattern));
                let not = if *negated { "NOT " } else { "" };
                format!("LOWER({}) {}LIKE {} ESCAPE '\\'", expr, not, placeholder)
            }
            Condition::Empty {
                negated,
                blank_text,
            } => match (*blank_text, *negated) {
                (true, false) => format!("({expr} IS NULL OR {expr} = '')"),
                (true, true) => format!("({expr} IS NOT NULL AND {expr} != '')"),
                (false, false) => format!("{} IS NULL", expr),
                (false, true) => format!("{} IS NOT NULL", expr),
            },
        }
    }
}

fn compares_timestamps(condition: &Condition) -> bool {
    match condition {
        Condition::Compare { operand, .. } => matches!(operand, Operand::Timestamp(_)),
        Condition::Between { low, .. } | Condition::Outside { low, .. } => {
            matches!(low, Operand::Timestamp(_))
        }
        Condition::Like { .. } | Condition::Empty { .. } => false,
    }
}
