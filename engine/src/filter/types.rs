//! Filter DSL type definitions
//!
//! Wire shape (JSON, camelCase):
//! `{"fieldFilters":[{"field","value","mode","dataType"}],"sortFields":[{"field","order"}],"logic":"AND","preload":[]}`

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::utils::time::{parse_time_of_day, parse_timestamp};

/// Comparison operator requested for one filter term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Equal,
    NEqual,
    Contains,
    NContains,
    StartsWith,
    EndsWith,
    IsEmpty,
    IsNotEmpty,
    Gt,
    Gte,
    Lt,
    Lte,
    Range,
    Before,
    After,
    Inside,
    Outside,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Equal => "equal",
            Mode::NEqual => "nequal",
            Mode::Contains => "contains",
            Mode::NContains => "ncontains",
            Mode::StartsWith => "startswith",
            Mode::EndsWith => "endswith",
            Mode::IsEmpty => "isempty",
            Mode::IsNotEmpty => "isnotempty",
            Mode::Gt => "gt",
            Mode::Gte => "gte",
            Mode::Lt => "lt",
            Mode::Lte => "lte",
            Mode::Range => "range",
            Mode::Before => "before",
            Mode::After => "after",
            Mode::Inside => "inside",
            Mode::Outside => "outside",
        }
    }

    /// Modes whose value is a `{from, to}` pair
    pub fn takes_range(&self) -> bool {
        matches!(self, Mode::Range | Mode::Inside | Mode::Outside)
    }

    /// Modes that ignore the value entirely
    pub fn is_emptiness_check(&self) -> bool {
        matches!(self, Mode::IsEmpty | Mode::IsNotEmpty)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic interpretation of a filter value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Number,
    Text,
    #[serde(alias = "boolean")]
    Bool,
    Date,
    Time,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Number => "number",
            DataType::Text => "text",
            DataType::Bool => "bool",
            DataType::Date => "date",
            DataType::Time => "time",
        }
    }

    /// Whether `mode` is defined for this data type
    pub fn supports(&self, mode: Mode) -> bool {
        use Mode::*;
        match self {
            DataType::Text => true,
            DataType::Number => matches!(
                mode,
                Equal | NEqual | Gt | Gte | Lt | Lte | Range | Inside | Outside | IsEmpty
                    | IsNotEmpty
            ),
            DataType::Bool => matches!(mode, Equal | NEqual | IsEmpty | IsNotEmpty),
            DataType::Date | DataType::Time => !matches!(
                mode,
                Contains | NContains | StartsWith | EndsWith
            ),
        }
    }

    /// Infer a data type from a raw JSON value
    ///
    /// Strings parse as time before date so that `"14:30"` is not mistaken
    /// for text; range objects are inferred from their `from` bound.
    pub fn detect(value: &Value) -> DataType {
        match value {
            Value::Number(_) => DataType::Number,
            Value::Bool(_) => DataType::Bool,
            Value::String(s) => {
                if parse_timestamp(s).is_some() {
                    DataType::Date
                } else if parse_time_of_day(s).is_some() {
                    DataType::Time
                } else {
                    DataType::Text
                }
            }
            Value::Object(map) => map
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("from"))
                .map(|(_, v)| DataType::detect(v))
                .unwrap_or(DataType::Text),
            Value::Array(items) => items.first().map(DataType::detect).unwrap_or(DataType::Text),
            Value::Null => DataType::Text,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How filter terms combine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Logic {
    #[default]
    And,
    Or,
}

impl Logic {
    /// Anything other than `or` (any case) is AND
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("or") {
            Logic::Or
        } else {
            Logic::And
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Logic::And => "AND",
            Logic::Or => "OR",
        }
    }
}

impl Serialize for Logic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Logic {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Logic::parse).unwrap_or_default())
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// Exactly `desc` is descending, everything else ascending
    pub fn parse(s: &str) -> Self {
        if s == "desc" {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl Serialize for SortOrder {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SortOrder {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(SortOrder::parse).unwrap_or_default())
    }
}

/// One filter term
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldFilter {
    /// Dotted path, e.g. `organization.name`
    pub field: String,
    #[serde(default)]
    pub value: Value,
    pub mode: Mode,
    /// Inferred from `value` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
}

impl FieldFilter {
    pub fn new(
        field: impl Into<String>,
        mode: Mode,
        data_type: DataType,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            mode,
            data_type: Some(data_type),
        }
    }

    /// Declared data type, or the one detected from the value
    pub fn data_type(&self) -> DataType {
        self.data_type
            .unwrap_or_else(|| DataType::detect(&self.value))
    }
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SortField {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl SortField {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }
}

/// Filter terms, sort keys and combination logic for one request
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredFilter {
    #[serde(default, alias = "filters")]
    pub field_filters: Vec<FieldFilter>,
    #[serde(default, alias = "sort")]
    pub sort_fields: Vec<SortField>,
    #[serde(default)]
    pub logic: Logic,
    /// Related collections to eager-fetch (SQL backend)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preload: Vec<String>,
}

impl StructuredFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: FieldFilter) -> Self {
        self.field_filters.push(filter);
        self
    }

    pub fn sort(mut self, sort: SortField) -> Self {
        self.sort_fields.push(sort);
        self
    }

    pub fn logic(mut self, logic: Logic) -> Self {
        self.logic = logic;
        self
    }

    pub fn preload(mut self, relation: impl Into<String>) -> Self {
        self.preload.push(relation.into());
        self
    }
}

/// Inclusive bounds for range, inside and outside modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range<T> {
    pub from: T,
    pub to: T,
}
