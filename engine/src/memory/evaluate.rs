//! Predicate evaluation over record values
//!
//! Filters compile once per call into resolved descriptors plus predicates;
//! each item is then checked against every term with AND/OR short-circuit.

use chrono::{DateTime, NaiveTime, Utc};
use std::cmp::Ordering;
use std::sync::Arc;

use crate::core::UnknownFieldPolicy;
use crate::error::QueryError;
use crate::filter::{Condition, Logic, Mode, Operand, Pattern, Predicate, Projection, StructuredFilter};
use crate::schema::{FieldDescriptor, FieldValue, Record, SchemaCache};
use crate::utils::time::{parse_time_of_day, parse_timestamp, truncate_to_seconds};

enum Term<T> {
    /// Unresolvable `isempty` path: holds for every item
    Always,
    Check {
        descriptor: Arc<FieldDescriptor<T>>,
        predicate: Predicate,
    },
}

/// Resolved filter for one record type
pub(crate) struct CompiledFilter<T> {
    terms: Vec<Term<T>>,
    logic: Logic,
}

impl<T: Record> CompiledFilter<T> {
    /// Resolve every path and compile every term before any item is touched
    pub(crate) fn compile(
        cache: &SchemaCache,
        filter: &StructuredFilter,
        policy: UnknownFieldPolicy,
    ) -> Result<Self, QueryError> {
        let mut terms = Vec::with_capacity(filter.field_filters.len());
        for term in &filter.field_filters {
            match cache.resolve(T::schema(), &term.field) {
                Ok(descriptor) => terms.push(Term::Check {
                    descriptor,
                    predicate: Predicate::compile(term)?,
                }),
                Err(e) if e.is_field_not_found() && term.mode == Mode::IsEmpty => {
                    terms.push(Term::Always);
                }
                Err(e) if e.is_field_not_found() && policy == UnknownFieldPolicy::Skip => {
                    tracing::warn!(record = T::schema().name(), field = %term.field, "Ignoring unknown field");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Self {
            terms,
            logic: filter.logic,
        })
    }

    /// True when no term constrains the result
    pub(crate) fn is_trivial(&self) -> bool {
        match self.logic {
            Logic::And => self.terms.iter().all(|t| matches!(t, Term::Always)),
            Logic::Or => self.terms.is_empty() || self.terms.iter().any(|t| matches!(t, Term::Always)),
        }
    }

    pub(crate) fn matches(&self, item: &T) -> Result<bool, QueryError> {
        if self.terms.is_empty() {
            return Ok(true);
        }
        for term in &self.terms {
            let hit = match term {
                Term::Always => true,
                Term::Check {
                    descriptor,
                    predicate,
                } => evaluate(predicate, descriptor.get(item))?,
            };
            match (self.logic, hit) {
                (Logic::And, false) => return Ok(false),
                (Logic::Or, true) => return Ok(true),
                _ => {}
            }
        }
        Ok(self.logic == Logic::And)
    }
}

/// Apply one predicate to a field value
pub(crate) fn evaluate(predicate: &Predicate, value: FieldValue<'_>) -> Result<bool, QueryError> {
    if let Condition::Empty {
        negated,
        blank_text,
    } = &predicate.condition
    {
        let empty = match value {
            FieldValue::Null => true,
            FieldValue::Text(s) => *blank_text && s.is_empty(),
            _ => false,
        };
        return Ok(empty != *negated);
    }
    if value.is_null() {
        return Ok(false);
    }
    let value = match predicate.projection {
        Projection::Value => value,
        Projection::TimeOfDay => FieldValue::Time(time_of_day(value)?),
    };

    match &predicate.condition {
        Condition::Compare {
            op,
            operand,
            fold_case,
        } => Ok(compare(value, operand, *fold_case)?.is_some_and(|o| op.holds(o))),
        Condition::Between {
            low,
            high,
            fold_case,
        } => {
            let above = compare(value, low, *fold_case)?;
            let below = compare(value, high, *fold_case)?;
            Ok(matches!(above, Some(Ordering::Greater | Ordering::Equal))
                && matches!(below, Some(Ordering::Less | Ordering::Equal)))
        }
        Condition::Outside {
            low,
            high,
            fold_case,
        } => {
            let lower = compare(value, low, *fold_case)?;
            let upper = compare(value, high, *fold_case)?;
            Ok(lower == Some(Ordering::Less) || upper == Some(Ordering::Greater))
        }
        Condition::Like {
            pattern,
            needle,
            negated,
        } => {
            let haystack = value.to_string().to_lowercase();
            let found = match pattern {
                Pattern::Contains => haystack.contains(needle.as_str()),
                Pattern::StartsWith => haystack.starts_with(needle.as_str()),
                Pattern::EndsWith => haystack.ends_with(needle.as_str()),
            };
            Ok(found != *negated)
        }
        Condition::Empty { .. } => Ok(false),
    }
}

/// Order `value` relative to `operand`; None when incomparable (NaN)
fn compare(value: FieldValue<'_>, operand: &Operand, fold_case: bool) -> Result<Option<Ordering>, QueryError> {
    match operand {
        Operand::Number(n) => Ok(as_number(value)?.partial_cmp(n)),
        Operand::Text(s) => {
            let text = value.to_string();
            Ok(Some(if fold_case {
                text.to_lowercase().cmp(&s.to_lowercase())
            } else {
                text.as_str().cmp(s.as_str())
            }))
        }
        Operand::Bool(b) => Ok(Some(as_bool(value)?.cmp(b))),
        Operand::Timestamp(t) => Ok(Some(as_timestamp(value)?.cmp(t))),
        Operand::Time(t) => match value {
            FieldValue::Time(v) => Ok(Some(v.cmp(t))),
            other => Err(QueryError::coercion("time", other)),
        },
    }
}

fn as_number(value: FieldValue<'_>) -> Result<f64, QueryError> {
    match value {
        FieldValue::Int(v) => Ok(v as f64),
        FieldValue::UInt(v) => Ok(v as f64),
        FieldValue::Float(v) => Ok(v),
        FieldValue::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| QueryError::coercion("number", s)),
        other => Err(QueryError::coercion("number", other)),
    }
}

fn as_bool(value: FieldValue<'_>) -> Result<bool, QueryError> {
    match value {
        FieldValue::Bool(v) => Ok(v),
        FieldValue::Int(0) | FieldValue::UInt(0) => Ok(false),
        FieldValue::Int(1) | FieldValue::UInt(1) => Ok(true),
        FieldValue::Text(s) => s
            .trim()
            .to_lowercase()
            .parse::<bool>()
            .map_err(|_| QueryError::coercion("bool", s)),
        other => Err(QueryError::coercion("bool", other)),
    }
}

fn as_timestamp(value: FieldValue<'_>) -> Result<DateTime<Utc>, QueryError> {
    match value {
        FieldValue::Timestamp(v) => Ok(v),
        FieldValue::Date(d) => Ok(d.and_time(NaiveTime::MIN).and_utc()),
        FieldValue::Text(s) => parse_timestamp(s)
            .map(|t| t.to_utc())
            .ok_or_else(|| QueryError::coercion("timestamp", s)),
        other => Err(QueryError::coercion("timestamp", other)),
    }
}

fn time_of_day(value: FieldValue<'_>) -> Result<NaiveTime, QueryError> {
    match value {
        FieldValue::Timestamp(v) => Ok(truncate_to_seconds(v.time())),
        FieldValue::Time(t) => Ok(truncate_to_seconds(t)),
        FieldValue::Date(_) => Ok(NaiveTime::MIN),
        FieldValue::Text(s) => parse_time_of_day(s).ok_or_else(|| QueryError::coercion("time", s)),
        other => Err(QueryError::coercion("time", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{DataType, FieldFilter};
    use crate::schema::record::fixtures::{Person, people};
    use chrono::{NaiveDate, TimeZone};
    use serde_json::{Value, json};

    fn check(mode: Mode, data_type: DataType, filter_value: Value, value: FieldValue<'_>) -> Result<bool, QueryError> {
        let predicate = Predicate::compile(&FieldFilter::new("f", mode, data_type, filter_value))?;
        evaluate(&predicate, value)
    }

    #[test]
    fn test_null_fails_all_but_empty() {
        assert!(check(Mode::IsEmpty, DataType::Number, Value::Null, FieldValue::Null).unwrap());
        assert!(!check(Mode::IsNotEmpty, DataType::Text, Value::Null, FieldValue::Null).unwrap());
        assert!(!check(Mode::NEqual, DataType::Number, json!(1), FieldValue::Null).unwrap());
        assert!(!check(Mode::NContains, DataType::Text, json!("a"), FieldValue::Null).unwrap());
    }

    #[test]
    fn test_blank_text_is_empty() {
        assert!(check(Mode::IsEmpty, DataType::Text, Value::Null, FieldValue::Text("")).unwrap());
        assert!(check(Mode::IsNotEmpty, DataType::Text, Value::Null, FieldValue::Text("x")).unwrap());
        assert!(!check(Mode::IsEmpty, DataType::Number, Value::Null, FieldValue::Int(0)).unwrap());
    }

    #[test]
    fn test_text_modes() {
        let bob = FieldValue::Text("Bob");
        assert!(check(Mode::Equal, DataType::Text, json!("BOB"), bob).unwrap());
        assert!(check(Mode::Contains, DataType::Text, json!("O"), bob).unwrap());
        assert!(check(Mode::StartsWith, DataType::Text, json!("bo"), bob).unwrap());
        assert!(!check(Mode::EndsWith, DataType::Text, json!("o"), bob).unwrap());
        assert!(check(Mode::Range, DataType::Text, json!({"from": "a", "to": "C"}), bob).unwrap());
        assert!(check(Mode::Outside, DataType::Text, json!(["c", "z"]), bob).unwrap());
        // numbers compare by display form
        assert!(check(Mode::Contains, DataType::Text, json!("2"), FieldValue::Int(123)).unwrap());
    }

    #[test]
    fn test_number_coercion() {
        assert!(check(Mode::Gt, DataType::Number, json!(10), FieldValue::Text(" 11 ")).unwrap());
        assert!(check(Mode::Equal, DataType::Number, json!(3), FieldValue::UInt(3)).unwrap());
        let err = check(Mode::Gt, DataType::Number, json!(10), FieldValue::Text("ten")).unwrap_err();
        assert!(matches!(err, QueryError::TypeCoercion { expected: "number", .. }));
    }

    #[test]
    fn test_date_only_equality() {
        let morning = FieldValue::Timestamp(Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap());
        let evening = FieldValue::Timestamp(Utc.with_ymd_and_hms(2025, 1, 10, 23, 59, 59).unwrap());
        let next = FieldValue::Timestamp(Utc.with_ymd_and_hms(2025, 1, 11, 0, 0, 0).unwrap());
        for value in [morning, evening] {
            assert!(check(Mode::Equal, DataType::Date, json!("2025-01-10"), value).unwrap());
        }
        assert!(!check(Mode::Equal, DataType::Date, json!("2025-01-10"), next).unwrap());
        assert!(check(Mode::NEqual, DataType::Date, json!("2025-01-10"), next).unwrap());
        let date = FieldValue::Date(NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());
        assert!(check(Mode::Equal, DataType::Date, json!("2025-01-10"), date).unwrap());
    }

    #[test]
    fn test_time_projection() {
        let value = FieldValue::Timestamp(Utc.with_ymd_and_hms(2025, 1, 10, 18, 30, 15).unwrap());
        assert!(check(Mode::After, DataType::Time, json!("12:00"), value).unwrap());
        assert!(check(Mode::Range, DataType::Time, json!({"from": "18:00", "to": "19:00"}), value).unwrap());
        assert!(!check(Mode::Before, DataType::Time, json!("18:30:15"), value).unwrap());
        assert!(check(Mode::Equal, DataType::Time, json!("18:30:15"), FieldValue::Text("18:30:15")).unwrap());
    }

    #[test]
    fn test_bool() {
        assert!(check(Mode::Equal, DataType::Bool, json!(true), FieldValue::Bool(true)).unwrap());
        assert!(check(Mode::NEqual, DataType::Bool, json!(true), FieldValue::Int(0)).unwrap());
        assert!(check(Mode::Equal, DataType::Bool, json!(false), FieldValue::Text("False")).unwrap());
    }

    #[test]
    fn test_compiled_logic() {
        let cache = SchemaCache::new();
        let items = people();
        let filter = StructuredFilter::new()
            .filter(FieldFilter::new("age", Mode::Lt, DataType::Number, json!(25)))
            .filter(FieldFilter::new("age", Mode::Gt, DataType::Number, json!(55)));
        let and = CompiledFilter::<Person>::compile(&cache, &filter, UnknownFieldPolicy::Reject).unwrap();
        assert!(items.iter().all(|p| !and.matches(p).unwrap()));

        let or = CompiledFilter::<Person>::compile(&cache, &filter.logic(Logic::Or), UnknownFieldPolicy::Reject)
            .unwrap();
        let names: Vec<&str> = items
            .iter()
            .filter(|p| or.matches(p).unwrap())
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["Alice", "Eve"]);
    }

    #[test]
    fn test_unknown_paths() {
        let cache = SchemaCache::new();
        let bad = StructuredFilter::new()
            .filter(FieldFilter::new("org.missing", Mode::Equal, DataType::Text, json!("x")));
        let err = CompiledFilter::<Person>::compile(&cache, &bad, UnknownFieldPolicy::Reject)
            .err()
            .unwrap();
        assert!(err.is_field_not_found());

        let skipped = CompiledFilter::<Person>::compile(&cache, &bad, UnknownFieldPolicy::Skip).unwrap();
        assert!(skipped.is_trivial());

        let vacuous = StructuredFilter::new()
            .filter(FieldFilter::new("missing", Mode::IsEmpty, DataType::Text, Value::Null));
        let compiled = CompiledFilter::<Person>::compile(&cache, &vacuous, UnknownFieldPolicy::Reject).unwrap();
        assert!(compiled.is_trivial());
        assert!(compiled.matches(&people()[0]).unwrap());
    }
}
