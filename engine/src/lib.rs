//! Structured filter and pagination engine
//!
//! One filter DSL (field filters, sort fields, AND/OR logic and a page
//! window) executed by two interchangeable backends: a SQL compiler over
//! `sqlx` and a concurrent in-memory evaluator over registered records.

pub mod app;
pub mod core;
pub mod error;
pub mod export;
pub mod filter;
pub mod memory;
pub mod pagination;
pub mod schema;
pub mod sql;
pub mod utils;

pub use error::QueryError;
pub use filter::{DataType, FieldFilter, Logic, Mode, SortField, SortOrder, StructuredFilter};
pub use memory::MemoryEngine;
pub use pagination::{PageWindow, PaginationResult, slice_page};
pub use schema::{Record, RecordSchema, SchemaCache, TableSchema};
pub use sql::{Model, SqlRepository};
