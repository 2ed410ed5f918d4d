//! Field path resolution
//!
//! Two schema sources share one [`SchemaCache`]: [`TableSchema`] for the SQL
//! backend (columns, relations and the joins reaching them) and
//! [`RecordSchema`] for the in-memory backend (registered accessors).

pub mod cache;
pub mod introspect;
pub mod record;
pub mod relational;

pub use cache::{FieldSource, SchemaCache};
pub use record::{AsFieldValue, FieldDescriptor, FieldValue, Record, RecordSchema};
pub use relational::{Column, JoinStep, Relation, ResolvedColumn, TableSchema};

/// Storage kind of a column or record field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Real,
    Text,
    Bool,
    Timestamp,
    Date,
    Time,
    Other,
}

impl FieldKind {
    /// Map a declared SQL column type using SQLite affinity rules
    pub fn from_declared_type(declared: &str) -> Self {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("BOOL") {
            FieldKind::Bool
        } else if upper.contains("INT") {
            FieldKind::Integer
        } else if upper.contains("DATETIME") || upper.contains("TIMESTAMP") {
            FieldKind::Timestamp
        } else if upper == "DATE" {
            FieldKind::Date
        } else if upper == "TIME" {
            FieldKind::Time
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            FieldKind::Text
        } else if ["REAL", "FLOA", "DOUB", "NUMERIC", "DECIMAL"]
            .iter()
            .any(|t| upper.contains(t))
        {
            FieldKind::Real
        } else {
            FieldKind::Other
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, FieldKind::Text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_type_mapping() {
        assert_eq!(FieldKind::from_declared_type("INTEGER"), FieldKind::Integer);
        assert_eq!(FieldKind::from_declared_type("bigint"), FieldKind::Integer);
        assert_eq!(FieldKind::from_declared_type("VARCHAR(255)"), FieldKind::Text);
        assert_eq!(FieldKind::from_declared_type("TEXT"), FieldKind::Text);
        assert_eq!(FieldKind::from_declared_type("DOUBLE PRECISION"), FieldKind::Real);
        assert_eq!(FieldKind::from_declared_type("BOOLEAN"), FieldKind::Bool);
        assert_eq!(FieldKind::from_declared_type("DATETIME"), FieldKind::Timestamp);
        assert_eq!(FieldKind::from_declared_type("DATE"), FieldKind::Date);
        assert_eq!(FieldKind::from_declared_type("BLOB"), FieldKind::Other);
        assert_eq!(FieldKind::from_declared_type(""), FieldKind::Other);
    }
}
