//! Filtered queries against a SQLite table
//!
//! [`SqlRepository`] compiles structured filters into one statement per
//! request and maps rows into the model type. Every terminal accepts
//! anything that can hand out a connection (pool, transaction or
//! connection), so locking variants run inside the caller's transaction.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Acquire, Arguments, FromRow, Sqlite, SqliteConnection};
use std::io::Write;
use std::marker::PhantomData;
use std::sync::Arc;

use super::columns::{ColumnFilter, ColumnSort};
use super::plan::{Aggregate, PlanOptions, QueryPlan};
use super::render::{RawQuery, SqlValue};
use crate::core::config::SqlConfig;
use crate::core::constants::DEFAULT_PAGE_SIZE;
use crate::error::QueryError;
use crate::export::write_csv;
use crate::filter::StructuredFilter;
use crate::pagination::{PageWindow, PaginationResult};
use crate::schema::{SchemaCache, TableSchema};

/// Row type of a repository
#[async_trait]
pub trait Model: for<'r> FromRow<'r, SqliteRow> + Send + Sync + Unpin + 'static {
    /// Eager-fetch a related collection into already loaded rows
    async fn preload(
        _rows: &mut [Self],
        relation: &str,
        _conn: &mut SqliteConnection,
    ) -> Result<(), QueryError> {
        tracing::warn!(relation, "No preload handler for relation");
        Ok(())
    }
}

/// Repository over one table
pub struct SqlRepository<T> {
    schema: Arc<TableSchema>,
    cache: Arc<SchemaCache>,
    config: SqlConfig,
    default_page_size: u64,
    _model: PhantomData<fn() -> T>,
}

impl<T> Clone for SqlRepository<T> {
    fn clone(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            cache: self.cache.clone(),
            config: self.config.clone(),
            default_page_size: self.default_page_size,
            _model: PhantomData,
        }
    }
}

impl<T: Model> SqlRepository<T> {
    pub fn new(schema: Arc<TableSchema>, cache: Arc<SchemaCache>, config: SqlConfig) -> Self {
        Self {
            schema,
            cache,
            config,
            default_page_size: DEFAULT_PAGE_SIZE,
            _model: PhantomData,
        }
    }

    pub fn with_default_page_size(mut self, page_size: u64) -> Self {
        self.default_page_size = page_size;
        self
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Start a query for a structured filter
    pub fn select<'q>(&'q self, filter: &'q StructuredFilter) -> Select<'q, T> {
        Select {
            repo: self,
            filter,
            options: PlanOptions::default(),
            lock: false,
            preload: Vec::new(),
        }
    }

    /// Rows matching all column filters
    pub async fn find_by<'c, A>(
        &self,
        db: A,
        filters: &[ColumnFilter],
        sorts: &[ColumnSort],
    ) -> Result<Vec<T>, QueryError>
    where
        A: Acquire<'c, Database = Sqlite>,
    {
        let plan = self.column_plan(filters, sorts, None)?;
        let sql = plan.select_sql(None, false);
        let mut conn = acquire(db, "find_by", plan.filter_count).await?;
        fetch_all(&mut *conn, &sql, &plan, "find_by").await
    }

    /// First row matching all column filters
    pub async fn find_one_by<'c, A>(
        &self,
        db: A,
        filters: &[ColumnFilter],
        sorts: &[ColumnSort],
    ) -> Result<Option<T>, QueryError>
    where
        A: Acquire<'c, Database = Sqlite>,
    {
        let plan = self.column_plan(filters, sorts, None)?;
        let sql = plan.select_one_sql(false);
        let mut conn = acquire(db, "find_one_by", plan.filter_count).await?;
        sqlx::query_as_with::<Sqlite, T, _>(&sql, arguments(&plan.params)?)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| QueryError::execution("find_one_by", plan.filter_count, e))
    }

    pub async fn exists_by<'c, A>(&self, db: A, filters: &[ColumnFilter]) -> Result<bool, QueryError>
    where
        A: Acquire<'c, Database = Sqlite>,
    {
        let plan = self.column_plan(filters, &[], None)?;
        let mut conn = acquire(db, "exists_by", plan.filter_count).await?;
        fetch_exists(&mut *conn, &plan, "exists_by").await
    }

    /// Largest value of `field` among rows matching the column filters
    pub async fn max_by<'c, A, V>(
        &self,
        db: A,
        field: &str,
        filters: &[ColumnFilter],
    ) -> Result<Option<V>, QueryError>
    where
        A: Acquire<'c, Database = Sqlite>,
        V: for<'r> sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite> + Send + Unpin,
    {
        let plan = self.column_plan(filters, &[], Some(field))?;
        let mut conn = acquire(db, "max_by", plan.filter_count).await?;
        fetch_aggregate(&mut *conn, &plan, Aggregate::Max, field, "max_by").await
    }

    fn column_plan(
        &self,
        filters: &[ColumnFilter],
        sorts: &[ColumnSort],
        target: Option<&str>,
    ) -> Result<QueryPlan, QueryError> {
        QueryPlan::from_columns(&self.schema, &self.cache, &self.config, filters, sorts, target)
    }
}

/// Query under construction
pub struct Select<'q, T> {
    repo: &'q SqlRepository<T>,
    filter: &'q StructuredFilter,
    options: PlanOptions,
    lock: bool,
    preload: Vec<String>,
}

impl<'q, T: Model> Select<'q, T> {
    /// Include soft-deleted rows
    pub fn unscoped(mut self) -> Self {
        self.options.unscoped = true;
        self
    }

    /// Lock selected rows (`FOR UPDATE` where the dialect has it)
    pub fn for_update(mut self) -> Self {
        self.lock = true;
        self
    }

    /// Query a raw base instead of the table
    pub fn base(mut self, base: RawQuery) -> Self {
        self.options.base = Some(base);
        self
    }

    /// AND an extra raw condition after the filter group
    pub fn condition(mut self, condition: RawQuery) -> Self {
        self.options.conditions.push(condition);
        self
    }

    pub fn preload(mut self, relation: impl Into<String>) -> Self {
        self.preload.push(relation.into());
        self
    }

    /// Compile without executing
    pub fn plan(&self) -> Result<QueryPlan, QueryError> {
        self.plan_with_target(None)
    }

    fn plan_with_target(&self, target: Option<&str>) -> Result<QueryPlan, QueryError> {
        QueryPlan::build_with_target(
            &self.repo.schema,
            &self.repo.cache,
            &self.repo.config,
            self.filter,
            &self.options,
            target,
        )
    }

    /// All matching rows in sort order
    pub async fn find<'c, A>(self, db: A) -> Result<Vec<T>, QueryError>
    where
        A: Acquire<'c, Database = Sqlite>,
    {
        let plan = self.plan()?;
        let sql = plan.select_sql(None, self.lock);
        let mut conn = acquire(db, "find", plan.filter_count).await?;
        let mut rows = fetch_all(&mut *conn, &sql, &plan, "find").await?;
        self.run_preloads(&mut rows, &mut *conn).await?;
        Ok(rows)
    }

    /// First matching row, or None
    pub async fn find_one<'c, A>(self, db: A) -> Result<Option<T>, QueryError>
    where
        A: Acquire<'c, Database = Sqlite>,
    {
        let plan = self.plan()?;
        let sql = plan.select_one_sql(self.lock);
        let mut conn = acquire(db, "find_one", plan.filter_count).await?;
        let row = sqlx::query_as_with::<Sqlite, T, _>(&sql, arguments(&plan.params)?)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| QueryError::execution("find_one", plan.filter_count, e))?;
        match row {
            Some(row) => {
                let mut rows = vec![row];
                self.run_preloads(&mut rows, &mut *conn).await?;
                Ok(rows.pop())
            }
            None => Ok(None),
        }
    }

    pub async fn count<'c, A>(self, db: A) -> Result<u64, QueryError>
    where
        A: Acquire<'c, Database = Sqlite>,
    {
        let plan = self.plan()?;
        let mut conn = acquire(db, "count", plan.filter_count).await?;
        fetch_count(&mut *conn, &plan, "count").await
    }

    pub async fn exists<'c, A>(self, db: A) -> Result<bool, QueryError>
    where
        A: Acquire<'c, Database = Sqlite>,
    {
        let plan = self.plan()?;
        let mut conn = acquire(db, "exists", plan.filter_count).await?;
        fetch_exists(&mut *conn, &plan, "exists").await
    }

    /// Smallest value of `field` among matching rows
    pub async fn min<'c, A, V>(self, db: A, field: &str) -> Result<Option<V>, QueryError>
    where
        A: Acquire<'c, Database = Sqlite>,
        V: for<'r> sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite> + Send + Unpin,
    {
        let plan = self.plan_with_target(Some(field))?;
        let mut conn = acquire(db, "min", plan.filter_count).await?;
        fetch_aggregate(&mut *conn, &plan, Aggregate::Min, field, "min").await
    }

    /// Largest value of `field` among matching rows
    pub async fn max<'c, A, V>(self, db: A, field: &str) -> Result<Option<V>, QueryError>
    where
        A: Acquire<'c, Database = Sqlite>,
        V: for<'r> sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite> + Send + Unpin,
    {
        let plan = self.plan_with_target(Some(field))?;
        let mut conn = acquire(db, "max", plan.filter_count).await?;
        fetch_aggregate(&mut *conn, &plan, Aggregate::Max, field, "max").await
    }

    /// One page plus the total number of matching rows
    pub async fn paginate<'c, A>(
        self,
        db: A,
        page_index: i64,
        page_size: i64,
    ) -> Result<PaginationResult<T>, QueryError>
    where
        A: Acquire<'c, Database = Sqlite>,
    {
        let window = PageWindow::with_default_size(page_index, page_size, self.repo.default_page_size);
        let plan = self.plan()?;
        let mut conn = acquire(db, "paginate", plan.filter_count).await?;

        let total = fetch_count(&mut *conn, &plan, "paginate").await?;
        let mut rows = if total > window.offset() {
            let sql = plan.select_sql(Some(window), self.lock);
            fetch_all(&mut *conn, &sql, &plan, "paginate").await?
        } else {
            Vec::new()
        };
        self.run_preloads(&mut rows, &mut *conn).await?;

        tracing::debug!(
            table = %self.repo.schema.table,
            page_index = window.index,
            page_size = window.size,
            total,
            "Paginated query"
        );
        Ok(PaginationResult::new(rows, window, total).with_sort(self.filter.sort_fields.clone()))
    }

    /// Write all matching rows as CSV, returning the number of rows written
    pub async fn export_csv<'c, A, W, F>(self, db: A, writer: W, columns: F) -> Result<usize, QueryError>
    where
        A: Acquire<'c, Database = Sqlite>,
        W: Write,
        F: Fn(&T) -> Map<String, Value>,
    {
        let rows = self.find(db).await?;
        write_csv(writer, &rows, columns)
    }

    async fn run_preloads(&self, rows: &mut [T], conn: &mut SqliteConnection) -> Result<(), QueryError> {
        if rows.is_empty() {
            return Ok(());
        }
        for relation in self.filter.preload.iter().chain(&self.preload) {
            T::preload(rows, relation, conn).await?;
        }
        Ok(())
    }
}

async fn acquire<'c, A>(
    db: A,
    operation: &'static str,
    filters: usize,
) -> Result<A::Connection, QueryError>
where
    A: Acquire<'c, Database = Sqlite>,
{
    db.acquire()
        .await
        .map_err(|e| QueryError::execution(operation, filters, e))
}

fn arguments(params: &[SqlValue]) -> Result<SqliteArguments<'static>, QueryError> {
    let mut args = SqliteArguments::default();
    for param in params {
        let added = match param {
            SqlValue::Null => args.add(Option::<String>::None),
            SqlValue::Int(v) => args.add(*v),
            SqlValue::Number(v) => args.add(*v),
            SqlValue::Text(v) => args.add(v.clone()),
            SqlValue::Bool(v) => args.add(*v),
            SqlValue::Timestamp(v) => args.add(*v),
        };
        added.map_err(|e| QueryError::parameter("bind", e))?;
    }
    Ok(args)
}

async fn fetch_all<T: Model>(
    conn: &mut SqliteConnection,
    sql: &str,
    plan: &QueryPlan,
    operation: &'static str,
) -> Result<Vec<T>, QueryError> {
    tracing::debug!(%sql, params = plan.params.len(), "Executing query");
    sqlx::query_as_with::<Sqlite, T, _>(sql, arguments(&plan.params)?)
        .fetch_all(conn)
        .await
        .map_err(|e| QueryError::execution(operation, plan.filter_count, e))
}

async fn fetch_count(
    conn: &mut SqliteConnection,
    plan: &QueryPlan,
    operation: &'static str,
) -> Result<u64, QueryError> {
    let count: i64 = sqlx::query_scalar_with::<Sqlite, i64, _>(&plan.count_sql(), arguments(&plan.params)?)
        .fetch_one(conn)
        .await
        .map_err(|e| QueryError::execution(operation, plan.filter_count, e))?;
    Ok(u64::try_from(count).unwrap_or(0))
}

async fn fetch_exists(
    conn: &mut SqliteConnection,
    plan: &QueryPlan,
    operation: &'static str,
) -> Result<bool, QueryError> {
    let found: i64 = sqlx::query_scalar_with::<Sqlite, i64, _>(&plan.exists_sql(), arguments(&plan.params)?)
        .fetch_one(conn)
        .await
        .map_err(|e| QueryError::execution(operation, plan.filter_count, e))?;
    Ok(found != 0)
}

async fn fetch_aggregate<V>(
    conn: &mut SqliteConnection,
    plan: &QueryPlan,
    aggregate: Aggregate,
    field: &str,
    operation: &'static str,
) -> Result<Option<V>, QueryError>
where
    V: for<'r> sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite> + Send + Unpin,
{
    let Some(sql) = plan.aggregate_sql(aggregate) else {
        tracing::warn!(field, "Aggregate over unknown field");
        return Ok(None);
    };
    sqlx::query_scalar_with::<Sqlite, Option<V>, _>(&sql, arguments(&plan.params)?)
        .fetch_one(conn)
        .await
        .map_err(|e| QueryError::execution(operation, plan.filter_count, e))
}
