//! Query planning
//!
//! A [`QueryPlan`] holds the FROM/JOIN, WHERE and ORDER BY parts of one
//! request plus its bound parameters. The same plan renders as a page
//! select, a count, an existence check or an aggregate.

use std::sync::Arc;

use super::render::{RawQuery, SqlParams, SqlValue};
use crate::core::config::SqlConfig;
use crate::core::{Dialect, UnknownFieldPolicy};
use crate::error::QueryError;
use crate::filter::{Logic, Mode, Predicate, SortOrder, StructuredFilter};
use crate::pagination::PageWindow;
use crate::schema::{FieldKind, JoinStep, ResolvedColumn, SchemaCache, TableSchema};
use crate::utils::sql::{qualify, quote_ident};

/// Modifiers applied on top of the structured filter
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Include soft-deleted rows
    pub unscoped: bool,
    /// Replaces the table in FROM; aliased to the table name
    pub base: Option<RawQuery>,
    /// Extra conditions ANDed after the filter group
    pub conditions: Vec<RawQuery>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Min,
    Max,
}

impl Aggregate {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Aggregate::Min => "MIN",
            Aggregate::Max => "MAX",
        }
    }
}

/// Compiled statement parts for one request
#[derive(Debug, Clone)]
pub struct QueryPlan {
    table: String,
    dialect: Dialect,
    from: String,
    where_clause: Option<String>,
    order_by: Vec<String>,
    target: Option<String>,
    /// Bound parameters, in placeholder order
    pub params: Vec<SqlValue>,
    /// Filter terms that made it into the WHERE clause
    pub filter_count: usize,
}

impl QueryPlan {
    /// Plan a structured filter against a table
    pub fn build(
        schema: &TableSchema,
        cache: &SchemaCache,
        config: &SqlConfig,
        filter: &StructuredFilter,
        options: &PlanOptions,
    ) -> Result<Self, QueryError> {
        Self::build_with_target(schema, cache, config, filter, options, None)
    }

    /// Like [`QueryPlan::build`], also resolving an aggregate target path
    pub fn build_with_target(
        schema: &TableSchema,
        cache: &SchemaCache,
        config: &SqlConfig,
        filter: &StructuredFilter,
        options: &PlanOptions,
        target: Option<&str>,
    ) -> Result<Self, QueryError> {
        let mut planner = Planner::new(schema, cache, config, options)?;

        let mut resolved = Vec::with_capacity(filter.field_filters.len());
        let mut vacuous = false;
        for term in &filter.field_filters {
            if term.mode == Mode::IsEmpty && planner.is_missing(&term.field) {
                vacuous = true;
                continue;
            }
            let Some(column) = planner.column(&term.field)? else {
                continue;
            };
            resolved.push((column, Predicate::compile(term)?));
        }
        // one vacuously true term satisfies an OR group
        if vacuous && filter.logic == Logic::Or {
            resolved.clear();
        }

        let mut terms = Vec::with_capacity(resolved.len());
        for (column, predicate) in &resolved {
            terms.push(planner.params.predicate(predicate, &column.qualified()));
        }
        let filter_count = terms.len();
        let group = match terms.len() {
            0 => None,
            1 => terms.pop(),
            _ => Some(match filter.logic {
                Logic::And => terms
                    .iter()
                    .map(|t| format!("({})", t))
                    .collect::<Vec<_>>()
                    .join(" AND "),
                Logic::Or => format!("({})", terms.join(" OR ")),
            }),
        };

        let sorts = filter
            .sort_fields
            .iter()
            .map(|s| (s.field.as_str(), s.order));
        let order_by = planner.order_by(sorts)?;
        planner.finish(group, order_by, filter_count, target)
    }

    /// `SELECT "table".* ...` with optional page window and row lock
    pub fn select_sql(&self, window: Option<PageWindow>, lock: bool) -> String {
        let mut sql = format!("SELECT {}.* {}", quote_ident(&self.table), self.from);
        self.push_where(&mut sql);
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        if let Some(window) = window {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", window.limit(), window.offset()));
        }
        if lock && let Some(clause) = self.dialect.lock_clause(&quote_ident(&self.table)) {
            sql.push(' ');
            sql.push_str(&clause);
        }
        sql
    }

    /// First row only
    pub fn select_one_sql(&self, lock: bool) -> String {
        self.select_sql(Some(PageWindow { index: 0, size: 1 }), lock)
    }

    pub fn count_sql(&self) -> String {
        let mut sql = format!("SELECT COUNT(*) {}", self.from);
        self.push_where(&mut sql);
        sql
    }

    pub fn exists_sql(&self) -> String {
        let mut inner = format!("SELECT 1 {}", self.from);
        self.push_where(&mut inner);
        format!("SELECT EXISTS({})", inner)
    }

    /// `MIN`/`MAX` over the resolved target; None when no target resolved
    pub fn aggregate_sql(&self, aggregate: Aggregate) -> Option<String> {
        let target = self.target.as_ref()?;
        let mut sql = format!("SELECT {}({}) {}", aggregate.as_sql(), target, self.from);
        self.push_where(&mut sql);
        Some(sql)
    }

    fn push_where(&self, sql: &mut String) {
        if let Some(clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(clause);
        }
    }
}

/// Incremental plan construction shared by structured and column queries
pub(crate) struct Planner<'a> {
    schema: &'a TableSchema,
    cache: &'a SchemaCache,
    config: &'a SqlConfig,
    options: &'a PlanOptions,
    pub(crate) params: SqlParams,
    from: String,
    joins: Vec<JoinStep>,
}

impl<'a> Planner<'a> {
    pub(crate) fn new(
        schema: &'a TableSchema,
        cache: &'a SchemaCache,
        config: &'a SqlConfig,
        options: &'a PlanOptions,
    ) -> Result<Self, QueryError> {
        let mut params = SqlParams::new(config.dialect);
        let table = quote_ident(&schema.table);
        let from = match &options.base {
            Some(base) => format!("FROM ({}) AS {}", params.raw(base)?, table),
            None => format!("FROM {}", table),
        };
        Ok(Self {
            schema,
            cache,
            config,
            options,
            params,
            from,
            joins: Vec::new(),
        })
    }

    /// Resolve a path, registering its joins
    ///
    /// Unresolvable paths are dropped with a warning under the skip policy.
    pub(crate) fn column(&mut self, path: &str) -> Result<Option<Arc<ResolvedColumn>>, QueryError> {
        let column = match self.cache.resolve(self.schema, path) {
            Ok(column) => column,
            Err(e) if e.is_field_not_found() && self.config.unknown_fields == UnknownFieldPolicy::Skip => {
                tracing::warn!(table = %self.schema.table, field = %path, "Ignoring unknown field");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        for step in &column.joins {
            if !self.joins.iter().any(|j| j.alias == step.alias) {
                self.joins.push(step.clone());
            }
        }
        Ok(Some(column))
    }

    /// True when the path does not resolve at all
    pub(crate) fn is_missing(&self, path: &str) -> bool {
        matches!(self.cache.resolve(self.schema, path), Err(e) if e.is_field_not_found())
    }

    /// ORDER BY terms: requested keys, else the last-modified column
    /// descending, then the primary key as tie-breaker
    pub(crate) fn order_by<'s>(
        &mut self,
        sorts: impl Iterator<Item = (&'s str, SortOrder)>,
    ) -> Result<Vec<String>, QueryError> {
        let mut terms = Vec::new();
        let mut on_primary_key = false;
        for (field, order) in sorts {
            let Some(column) = self.column(field)? else {
                continue;
            };
            let qualified = column.qualified();
            if column.nullable {
                terms.push(format!("({} IS NULL) {}", qualified, order.as_sql()));
            }
            let expr = if column.kind == FieldKind::Text {
                format!("LOWER({})", qualified)
            } else {
                qualified
            };
            terms.push(format!("{} {}", expr, order.as_sql()));
            on_primary_key |= column.joins.is_empty()
                && self.schema.primary_key.as_deref() == Some(column.column.as_str());
        }

        if terms.is_empty()
            && let Some(updated_at) = &self.schema.updated_at
        {
            terms.push(format!("{} DESC", qualify(&self.schema.table, updated_at)));
        }
        if !on_primary_key && let Some(pk) = &self.schema.primary_key {
            terms.push(format!("{} ASC", qualify(&self.schema.table, pk)));
        }
        Ok(terms)
    }

    pub(crate) fn finish(
        mut self,
        group: Option<String>,
        order_by: Vec<String>,
        filter_count: usize,
        target: Option<&str>,
    ) -> Result<QueryPlan, QueryError> {
        let target = match target {
            Some(path) => self.column(path)?.map(|c| c.qualified()),
            None => None,
        };

        let mut clauses = Vec::new();
        if let Some(group) = group {
            clauses.push(group);
        }
        if !self.options.unscoped
            && let Some(deleted_at) = &self.schema.deleted_at
        {
            clauses.push(format!("{} IS NULL", qualify(&self.schema.table, deleted_at)));
        }
        for condition in &self.options.conditions {
            let raw = self.params.raw(condition)?;
            clauses.push(format!("({})", raw));
        }

        let mut from = self.from;
        for join in &self.joins {
            from.push_str(&format!(
                " LEFT JOIN {} AS {} ON {} = {}",
                quote_ident(&join.table),
                quote_ident(&join.alias),
                qualify(&join.parent_alias, &join.local_key),
                qualify(&join.alias, &join.foreign_key),
            ));
            if !self.options.unscoped
                && let Some(deleted_at) = &join.deleted_at
            {
                from.push_str(&format!(" AND {} IS NULL", qualify(&join.alias, deleted_at)));
            }
        }

        let where_clause = if clauses.is_empty() {
            None
        } else {
            Some(clauses.join(" AND "))
        };

        Ok(QueryPlan {
            table: self.schema.table.clone(),
            dialect: self.config.dialect,
            from,
            where_clause,
            order_by,
            target,
            params: self.params.values,
            filter_count,
        })
    }
}
