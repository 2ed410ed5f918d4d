//! SQL backend
//!
//! Structured filters compile into one parameterized statement per request:
//! LEFT JOINs for relation paths, a WHERE group, a soft-delete scope and a
//! deterministic ORDER BY. Execution goes through `sqlx` on SQLite.

pub mod columns;
pub mod plan;
pub mod render;
pub mod repository;

pub use columns::{ColumnFilter, ColumnOp, ColumnSort};
pub use plan::{Aggregate, PlanOptions, QueryPlan};
pub use render::{RawQuery, SqlParams, SqlValue};
pub use repository::{Model, Select, SqlRepository};
