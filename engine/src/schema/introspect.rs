//! Build a [`TableSchema`] from a live SQLite database
//!
//! Columns come from `pragma_table_info`, relations from
//! `pragma_foreign_key_list`. Each foreign key `<name>_id` becomes a relation
//! named `<Name>`; targets are introspected recursively. Self-references and
//! cycles are left out.

use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::FieldKind;
use super::relational::TableSchema;
use crate::core::constants::{
    DEFAULT_DELETED_AT_COLUMN, DEFAULT_PRIMARY_KEY, DEFAULT_UPDATED_AT_COLUMN,
};
use crate::error::QueryError;
use crate::utils::string::to_pascal_case;

type SchemaFuture<'a> = Pin<Box<dyn Future<Output = Result<TableSchema, QueryError>> + Send + 'a>>;

impl TableSchema {
    /// Read table metadata (and that of related tables) from the database
    pub async fn introspect(pool: &SqlitePool, table: &str) -> Result<Self, QueryError> {
        let mut visiting = HashSet::new();
        introspect_table(pool, table.to_string(), &mut visiting).await
    }
}

fn introspect_table<'a>(
    pool: &'a SqlitePool,
    table: String,
    visiting: &'a mut HashSet<String>,
) -> SchemaFuture<'a> {
    Box::pin(async move {
        let fail = |e| QueryError::execution("introspect", 0, e);
        visiting.insert(table.clone());

        let rows = sqlx::query(r#"SELECT name, type, "notnull", pk FROM pragma_table_info(?)"#)
            .bind(&table)
            .fetch_all(pool)
            .await
            .map_err(fail)?;
        if rows.is_empty() {
            return Err(QueryError::parameter("table", format!("unknown table '{}'", table)));
        }

        let mut schema = TableSchema::new(table.clone()).primary_key(None);
        for row in &rows {
            let name: String = row.try_get("name").map_err(fail)?;
            let declared: String = row.try_get("type").map_err(fail)?;
            let not_null: i64 = row.try_get("notnull").map_err(fail)?;
            let pk: i64 = row.try_get("pk").map_err(fail)?;

            let kind = FieldKind::from_declared_type(&declared);
            schema = if not_null != 0 || pk != 0 {
                schema.column(name.clone(), kind)
            } else {
                schema.nullable_column(name.clone(), kind)
            };
            if pk == 1 {
                schema.primary_key = Some(name.clone());
            }
            if name == DEFAULT_UPDATED_AT_COLUMN {
                schema = schema.updated_at(name.clone());
            }
            if name == DEFAULT_DELETED_AT_COLUMN {
                schema = schema.soft_delete(name);
            }
        }

        let keys = sqlx::query(
            r#"SELECT "table", "from", "to" FROM pragma_foreign_key_list(?) ORDER BY id, seq"#,
        )
        .bind(&table)
        .fetch_all(pool)
        .await
        .map_err(fail)?;

        for key in &keys {
            let target: String = key.try_get("table").map_err(fail)?;
            let local_key: String = key.try_get("from").map_err(fail)?;
            let foreign_key: Option<String> = key.try_get("to").map_err(fail)?;

            if visiting.contains(&target) {
                tracing::debug!(%table, %target, "Skipping cyclic relation");
                continue;
            }
            let name = to_pascal_case(local_key.strip_suffix("_id").unwrap_or(&target));
            let target_schema = introspect_table(pool, target, visiting).await?;
            schema = schema.belongs_to(
                name,
                Arc::new(target_schema),
                local_key,
                foreign_key.unwrap_or_else(|| DEFAULT_PRIMARY_KEY.to_string()),
            );
        }

        visiting.remove(&table);
        tracing::debug!(
            %table,
            columns = schema.columns.len(),
            relations = schema.relations.len(),
            "Introspected table"
        );
        Ok(schema)
    })
}
