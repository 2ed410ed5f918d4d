//! Registered field accessors for in-memory records
//!
//! A record type registers its fields once, as named accessor functions,
//! in a [`RecordSchema`]. Paths resolve against the registration (external
//! name preferred over declared name, case-insensitive), walk into related
//! records and flattened (embedded) structures, and compose into a single
//! [`FieldDescriptor`] that reads the value straight off an item.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use super::FieldKind;
use super::cache::FieldSource;
use crate::error::QueryError;

/// Borrowed view of one field value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Text(&'a str),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl FieldValue<'_> {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl fmt::Display for FieldValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::UInt(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Text(v) => f.write_str(v),
            FieldValue::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            FieldValue::Date(v) => write!(f, "{}", v),
            FieldValue::Time(v) => write!(f, "{}", v),
        }
    }
}

/// Types that can be exposed as a record field
pub trait AsFieldValue {
    const KIND: FieldKind;
    const NULLABLE: bool = false;

    fn as_field_value(&self) -> FieldValue<'_>;
}

macro_rules! impl_signed {
    ($($t:ty),*) => {$(
        impl AsFieldValue for $t {
            const KIND: FieldKind = FieldKind::Integer;
            fn as_field_value(&self) -> FieldValue<'_> {
                FieldValue::Int(i64::from(*self))
            }
        }
    )*};
}

macro_rules! impl_unsigned {
    ($($t:ty),*) => {$(
        impl AsFieldValue for $t {
            const KIND: FieldKind = FieldKind::Integer;
            fn as_field_value(&self) -> FieldValue<'_> {
                FieldValue::UInt(u64::from(*self))
            }
        }
    )*};
}

impl_signed!(i8, i16, i32, i64);
impl_unsigned!(u8, u16, u32, u64);

impl AsFieldValue for f32 {
    const KIND: FieldKind = FieldKind::Real;
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Float(f64::from(*self))
    }
}

impl AsFieldValue for f64 {
    const KIND: FieldKind = FieldKind::Real;
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Float(*self)
    }
}

impl AsFieldValue for bool {
    const KIND: FieldKind = FieldKind::Bool;
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Bool(*self)
    }
}

impl AsFieldValue for str {
    const KIND: FieldKind = FieldKind::Text;
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Text(self)
    }
}

impl AsFieldValue for String {
    const KIND: FieldKind = FieldKind::Text;
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Text(self)
    }
}

impl AsFieldValue for DateTime<Utc> {
    const KIND: FieldKind = FieldKind::Timestamp;
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Timestamp(*self)
    }
}

impl AsFieldValue for DateTime<FixedOffset> {
    const KIND: FieldKind = FieldKind::Timestamp;
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Timestamp(self.with_timezone(&Utc))
    }
}

impl AsFieldValue for NaiveDateTime {
    const KIND: FieldKind = FieldKind::Timestamp;
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Timestamp(self.and_utc())
    }
}

impl AsFieldValue for NaiveDate {
    const KIND: FieldKind = FieldKind::Date;
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Date(*self)
    }
}

impl AsFieldValue for NaiveTime {
    const KIND: FieldKind = FieldKind::Time;
    fn as_field_value(&self) -> FieldValue<'_> {
        FieldValue::Time(*self)
    }
}

impl<V: AsFieldValue> AsFieldValue for Option<V> {
    const KIND: FieldKind = V::KIND;
    const NULLABLE: bool = true;
    fn as_field_value(&self) -> FieldValue<'_> {
        match self {
            Some(v) => v.as_field_value(),
            None => FieldValue::Null,
        }
    }
}

type Accessor<T> = Arc<dyn for<'a> Fn(&'a T) -> FieldValue<'a> + Send + Sync>;

fn accessor<T, F>(f: F) -> Accessor<T>
where
    F: for<'a> Fn(&'a T) -> FieldValue<'a> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Resolved, reusable locator for one path on `T`
pub struct FieldDescriptor<T> {
    /// Registration index at each hop
    pub path: Vec<usize>,
    pub kind: FieldKind,
    pub nullable: bool,
    accessor: Accessor<T>,
}

impl<T: 'static> FieldDescriptor<T> {
    /// Read the field from an item
    pub fn get<'a>(&self, item: &'a T) -> FieldValue<'a> {
        (self.accessor)(item)
    }

    /// Re-root this descriptor on a parent type reached through `nav`
    fn lift<P, N>(self, index: usize, nav: N, optional: bool) -> FieldDescriptor<P>
    where
        P: 'static,
        N: for<'a> Fn(&'a P) -> Option<&'a T> + Send + Sync + 'static,
    {
        let inner = self.accessor;
        let mut path = Vec::with_capacity(self.path.len() + 1);
        path.push(index);
        path.extend(self.path);
        FieldDescriptor {
            path,
            kind: self.kind,
            nullable: self.nullable || optional,
            accessor: accessor(move |parent: &P| match nav(parent) {
                Some(child) => inner(child),
                None => FieldValue::Null,
            }),
        }
    }
}

impl<T> fmt::Debug for FieldDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("nullable", &self.nullable)
            .finish()
    }
}

type Resolver<T> = Arc<dyn Fn(&str) -> Option<FieldDescriptor<T>> + Send + Sync>;

enum Entry<T> {
    Scalar {
        name: &'static str,
        rename: Option<&'static str>,
        kind: FieldKind,
        nullable: bool,
        accessor: Accessor<T>,
    },
    Relation {
        name: &'static str,
        rename: Option<&'static str>,
        resolve: Resolver<T>,
    },
    Embedded {
        resolve: Resolver<T>,
    },
}

impl<T> Entry<T> {
    fn name(&self) -> Option<&'static str> {
        match self {
            Entry::Scalar { name, .. } | Entry::Relation { name, .. } => Some(*name),
            Entry::Embedded { .. } => None,
        }
    }

    fn rename(&self) -> Option<&'static str> {
        match self {
            Entry::Scalar { rename, .. } | Entry::Relation { rename, .. } => *rename,
            Entry::Embedded { .. } => None,
        }
    }
}

/// Field registration for a record type
pub struct RecordSchema<T> {
    name: &'static str,
    entries: Vec<Entry<T>>,
}

/// Record types usable with the in-memory evaluator
pub trait Record: Send + Sync + Sized + 'static {
    fn schema() -> &'static RecordSchema<Self>;
}

impl<T: 'static> Default for RecordSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> RecordSchema<T> {
    pub fn new() -> Self {
        let full = std::any::type_name::<T>();
        Self {
            name: full.rsplit("::").next().unwrap_or(full),
            entries: Vec::new(),
        }
    }

    /// Register a scalar field under its declared name
    pub fn field<V>(mut self, name: &'static str, get: fn(&T) -> &V) -> Self
    where
        V: AsFieldValue + ?Sized + 'static,
    {
        self.entries.push(Entry::Scalar {
            name,
            rename: None,
            kind: V::KIND,
            nullable: V::NULLABLE,
            accessor: accessor(move |item: &T| get(item).as_field_value()),
        });
        self
    }

    /// Set the external (wire) name of the last registered field or relation
    pub fn rename(mut self, external: &'static str) -> Self {
        match self.entries.last_mut() {
            Some(Entry::Scalar { rename, .. }) | Some(Entry::Relation { rename, .. }) => {
                *rename = Some(external);
            }
            _ => tracing::warn!(
                record = self.name,
                external,
                "rename() without a preceding field"
            ),
        }
        self
    }

    /// Register an optional related record navigable by `name.<field>`
    pub fn relation<U: Record>(mut self, name: &'static str, get: fn(&T) -> Option<&U>) -> Self {
        let index = self.entries.len();
        let resolve: Resolver<T> = Arc::new(move |rest: &str| {
            U::schema()
                .find(rest)
                .map(|inner| inner.lift(index, get, true))
        });
        self.entries.push(Entry::Relation {
            name,
            rename: None,
            resolve,
        });
        self
    }

    /// Register a flattened structure whose fields are searched as our own
    pub fn embed<U: Record>(mut self, get: fn(&T) -> &U) -> Self {
        let index = self.entries.len();
        let resolve: Resolver<T> = Arc::new(move |path: &str| {
            U::schema()
                .find(path)
                .map(|inner| inner.lift(index, move |item: &T| Some(get(item)), false))
        });
        self.entries.push(Entry::Embedded { resolve });
        self
    }

    /// Short type name used in error messages
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Resolve a dotted path
    pub fn locate(&self, path: &str) -> Result<FieldDescriptor<T>, QueryError> {
        self.find(path)
            .ok_or_else(|| QueryError::invalid_field(self.name, path))
    }

    fn find(&self, path: &str) -> Option<FieldDescriptor<T>> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        if head.is_empty() {
            return None;
        }

        let matched = self
            .entries
            .iter()
            .enumerate()
            .find(|(_, e)| e.rename().is_some_and(|r| r.eq_ignore_ascii_case(head)))
            .or_else(|| {
                self.entries
                    .iter()
                    .enumerate()
                    .find(|(_, e)| e.name().is_some_and(|n| n.eq_ignore_ascii_case(head)))
            });

        if let Some((index, entry)) = matched {
            return match (entry, rest) {
                (
                    Entry::Scalar {
                        kind,
                        nullable,
                        accessor,
                        ..
                    },
                    None,
                ) => Some(FieldDescriptor {
                    path: vec![index],
                    kind: *kind,
                    nullable: *nullable,
                    accessor: accessor.clone(),
                }),
                (Entry::Relation { resolve, .. }, Some(rest)) => resolve(rest),
                _ => None,
            };
        }

        self.entries.iter().find_map(|entry| match entry {
            Entry::Embedded { resolve } => resolve(path),
            _ => None,
        })
    }
}

impl<T: Record> FieldSource for RecordSchema<T> {
    type Descriptor = FieldDescriptor<T>;

    fn scope(&self) -> Cow<'_, str> {
        Cow::Borrowed(std::any::type_name::<T>())
    }

    fn locate(&self, path: &str) -> Result<FieldDescriptor<T>, QueryError> {
        RecordSchema::locate(self, path)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;
    use std::sync::LazyLock;

    #[derive(Debug, Clone, PartialEq)]
    pub struct Audit {
        pub created_at: DateTime<Utc>,
        pub created_by: String,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct Organization {
        pub name: String,
        pub employees: u32,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct Person {
        pub name: String,
        pub age: i32,
        pub active: bool,
        pub nickname: Option<String>,
        pub organization: Option<Organization>,
        pub audit: Audit,
    }

    impl Record for Audit {
        fn schema() -> &'static RecordSchema<Self> {
            static SCHEMA: LazyLock<RecordSchema<Audit>> = LazyLock::new(|| {
                RecordSchema::new()
                    .field("created_at", |a: &Audit| &a.created_at)
                    .rename("createdAt")
                    .field("created_by", |a: &Audit| &a.created_by)
            });
            &SCHEMA
        }
    }

    impl Record for Organization {
        fn schema() -> &'static RecordSchema<Self> {
            static SCHEMA: LazyLock<RecordSchema<Organization>> = LazyLock::new(|| {
                RecordSchema::new()
                    .field("name", |o: &Organization| &o.name)
                    .field("employees", |o: &Organization| &o.employees)
            });
            &SCHEMA
        }
    }

    impl Record for Person {
        fn schema() -> &'static RecordSchema<Self> {
            static SCHEMA: LazyLock<RecordSchema<Person>> = LazyLock::new(|| {
                RecordSchema::new()
                    .field("name", |p: &Person| &p.name)
                    .field("age", |p: &Person| &p.age)
                    .field("active", |p: &Person| &p.active)
                    .field("nickname", |p: &Person| &p.nickname)
                    .rename("alias")
                    .relation("organization", |p: &Person| p.organization.as_ref())
                    .rename("org")
                    .embed(|p: &Person| &p.audit)
            });
            &SCHEMA
        }
    }

    pub fn person(name: &str, age: i32) -> Person {
        Person {
            name: name.to_string(),
            age,
            active: age % 20 == 0,
            nickname: None,
            organization: None,
            audit: Audit {
                created_at: Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap(),
                created_by: "seed".to_string(),
            },
        }
    }

    /// Alice(20), Bob(30), Charlie(40), David(50), Eve(60)
    pub fn people() -> Vec<Person> {
        [("Alice", 20), ("Bob", 30), ("Charlie", 40), ("David", 50), ("Eve", 60)]
            .into_iter()
            .map(|(name, age)| person(name, age))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_scalar_fields() {
        let p = person("Bob", 30);
        let name = Person::schema().locate("NAME").unwrap();
        assert_eq!(name.get(&p), FieldValue::Text("Bob"));
        assert_eq!(name.kind, FieldKind::Text);
        assert!(!name.nullable);
        let age = Person::schema().locate("age").unwrap();
        assert_eq!(age.get(&p), FieldValue::Int(30));
    }

    #[test]
    fn test_external_name_preferred() {
        let mut p = person("Bob", 30);
        p.nickname = Some("bobby".into());
        let by_tag = Person::schema().locate("alias").unwrap();
        assert_eq!(by_tag.get(&p), FieldValue::Text("bobby"));
        assert!(by_tag.nullable);
        let by_name = Person::schema().locate("nickname").unwrap();
        assert_eq!(by_name.path, by_tag.path);
    }

    #[test]
    fn test_relation_navigation() {
        let mut p = person("Bob", 30);
        let employees = Person::schema().locate("org.employees").unwrap();
        assert_eq!(employees.get(&p), FieldValue::Null);
        p.organization = Some(Organization {
            name: "Acme".into(),
            employees: 12,
        });
        assert_eq!(employees.get(&p), FieldValue::UInt(12));
        assert_eq!(employees.path, vec![4, 1]);
        assert!(employees.nullable);
        let name = Person::schema().locate("organization.name").unwrap();
        assert_eq!(name.get(&p), FieldValue::Text("Acme"));
    }

    #[test]
    fn test_embedded_fields() {
        let p = person("Bob", 30);
        let created = Person::schema().locate("createdAt").unwrap();
        assert!(matches!(created.get(&p), FieldValue::Timestamp(_)));
        assert_eq!(created.path, vec![5, 0]);
        let by = Person::schema().locate("created_by").unwrap();
        assert_eq!(by.get(&p), FieldValue::Text("seed"));
    }

    #[test]
    fn test_invalid_paths() {
        for path in ["missing", "org", "name.first", "org.missing", "", "org."] {
            let err = Person::schema().locate(path).unwrap_err();
            assert!(err.is_field_not_found(), "{path}");
        }
    }

    #[test]
    fn test_error_names_short_type() {
        let err = Person::schema().locate("missing").unwrap_err();
        assert_eq!(err.to_string(), "Invalid field path 'missing' for Person");
    }

    #[test]
    fn test_display() {
        assert_eq!(FieldValue::Text("x").to_string(), "x");
        assert_eq!(FieldValue::Null.to_string(), "");
        assert_eq!(FieldValue::Float(1.5).to_string(), "1.5");
    }
}
