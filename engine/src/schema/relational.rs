//! Relational schema metadata
//!
//! A [`TableSchema`] describes one table: its columns, primary key,
//! timestamp columns and to-one relations. Paths like
//! `organization.country.code` resolve through relations (PascalCase names,
//! external camelCase/snake_case accepted) to a terminal column, producing
//! the joins needed to reach it.

use std::borrow::Cow;
use std::sync::Arc;

use super::FieldKind;
use super::cache::FieldSource;
use crate::core::constants::{DEFAULT_PRIMARY_KEY, JOIN_ALIAS_SEPARATOR};
use crate::error::QueryError;
use crate::utils::sql::qualify;
use crate::utils::string::{to_pascal_case, to_snake_case};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: FieldKind,
    pub nullable: bool,
}

/// To-one relation: `parent.local_key = target.foreign_key`
#[derive(Debug, Clone)]
pub struct Relation {
    /// PascalCase relation name, also the join alias
    pub name: String,
    pub target: Arc<TableSchema>,
    pub local_key: String,
    pub foreign_key: String,
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<Column>,
    pub relations: Vec<Relation>,
    pub primary_key: Option<String>,
    /// Last-modified column used for the default sort
    pub updated_at: Option<String>,
    /// Soft-delete column; rows with a non-NULL value are hidden by default
    pub deleted_at: Option<String>,
}

/// One LEFT JOIN needed to reach a column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinStep {
    pub alias: String,
    pub parent_alias: String,
    pub table: String,
    pub local_key: String,
    pub foreign_key: String,
    pub deleted_at: Option<String>,
}

/// Resolved column with the joins that reach it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumn {
    pub joins: Vec<JoinStep>,
    /// Table name for local columns, join alias otherwise
    pub alias: String,
    pub column: String,
    pub kind: FieldKind,
    pub nullable: bool,
}

impl ResolvedColumn {
    /// `"alias"."column"`
    pub fn qualified(&self) -> String {
        qualify(&self.alias, &self.column)
    }
}

impl TableSchema {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            relations: Vec::new(),
            primary_key: Some(DEFAULT_PRIMARY_KEY.to_string()),
            updated_at: None,
            deleted_at: None,
        }
    }

    pub fn column(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.columns.push(Column {
            name: name.into(),
            kind,
            nullable: false,
        });
        self
    }

    pub fn nullable_column(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.columns.push(Column {
            name: name.into(),
            kind,
            nullable: true,
        });
        self
    }

    pub fn primary_key(mut self, column: Option<&str>) -> Self {
        self.primary_key = column.map(str::to_string);
        self
    }

    pub fn updated_at(mut self, column: impl Into<String>) -> Self {
        self.updated_at = Some(column.into());
        self
    }

    pub fn soft_delete(mut self, column: impl Into<String>) -> Self {
        self.deleted_at = Some(column.into());
        self
    }

    /// Declare `self.local_key -> target.foreign_key` under `name`
    pub fn belongs_to(
        mut self,
        name: impl Into<String>,
        target: Arc<TableSchema>,
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relations.push(Relation {
            name: name.into(),
            target,
            local_key: local_key.into(),
            foreign_key: foreign_key.into(),
        });
        self
    }

    /// Find a column by its snake_case name, case-insensitively
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        let snake = to_snake_case(name);
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name) || c.name.eq_ignore_ascii_case(&snake))
    }

    /// Find a relation by name, accepting camelCase or snake_case input
    pub fn find_relation(&self, name: &str) -> Option<&Relation> {
        let pascal = to_pascal_case(name);
        self.relations
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(&pascal))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.find_column(name).is_some()
    }

    /// Resolve a dotted path to a column and the joins reaching it
    pub fn resolve_path(&self, path: &str) -> Result<ResolvedColumn, QueryError> {
        let invalid = || QueryError::invalid_field(self.table.clone(), path);
        let segments: Vec<&str> = path.split('.').collect();
        let (terminal, relations) = match segments.split_last() {
            Some((terminal, relations)) if !terminal.is_empty() => (*terminal, relations),
            _ => return Err(invalid()),
        };

        let mut schema = self;
        let mut alias = self.table.clone();
        let mut joins = Vec::with_capacity(relations.len());
        let mut nullable = false;
        for (depth, segment) in relations.iter().enumerate() {
            let relation = schema.find_relation(segment).ok_or_else(invalid)?;
            let join_alias = if depth == 0 {
                relation.name.clone()
            } else {
                format!("{}{}{}", alias, JOIN_ALIAS_SEPARATOR, relation.name)
            };
            joins.push(JoinStep {
                alias: join_alias.clone(),
                parent_alias: alias,
                table: relation.target.table.clone(),
                local_key: relation.local_key.clone(),
                foreign_key: relation.foreign_key.clone(),
                deleted_at: relation.target.deleted_at.clone(),
            });
            alias = join_alias;
            schema = relation.target.as_ref();
            nullable = true;
        }

        let column = schema.find_column(terminal).ok_or_else(invalid)?;
        Ok(ResolvedColumn {
            joins,
            alias,
            column: column.name.clone(),
            kind: column.kind,
            nullable: nullable || column.nullable,
        })
    }
}

impl FieldSource for TableSchema {
    type Descriptor = ResolvedColumn;

    fn scope(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.table)
    }

    fn locate(&self, path: &str) -> Result<ResolvedColumn, QueryError> {
        self.resolve_path(path)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn countries() -> Arc<TableSchema> {
        Arc::new(
            TableSchema::new("countries")
                .column("id", FieldKind::Integer)
                .column("code", FieldKind::Text),
        )
    }

    pub fn organizations() -> Arc<TableSchema> {
        Arc::new(
            TableSchema::new("organizations")
                .column("id", FieldKind::Integer)
                .column("name", FieldKind::Text)
                .nullable_column("country_id", FieldKind::Integer)
                .nullable_column("deleted_at", FieldKind::Timestamp)
                .soft_delete("deleted_at")
                .belongs_to("Country", countries(), "country_id", "id"),
        )
    }

    pub fn users() -> TableSchema {
        TableSchema::new("users")
            .column("id", FieldKind::Integer)
            .column("name", FieldKind::Text)
            .column("age", FieldKind::Integer)
            .column("active", FieldKind::Bool)
            .nullable_column("organization_id", FieldKind::Integer)
            .column("created_at", FieldKind::Timestamp)
            .column("updated_at", FieldKind::Timestamp)
            .nullable_column("deleted_at", FieldKind::Timestamp)
            .updated_at("updated_at")
            .soft_delete("deleted_at")
            .belongs_to("Organization", organizations(), "organization_id", "id")
    }
}
