//! Backend-neutral predicates
//!
//! Each filter term compiles to a [`Predicate`]: a projection of the field
//! plus a condition over typed operands. Date-only expansion, case folding
//! and time-of-day truncation happen here, once, so the SQL renderer and the
//! in-memory evaluator apply identical semantics.

use chrono::{DateTime, FixedOffset, NaiveTime, Utc};

use super::types::{DataType, FieldFilter, Mode, Range};
use super::value::{FilterValue, RangeDate};
use crate::error::QueryError;
use crate::utils::time::{end_of_day, is_date_only, start_of_day};

/// How the field is read before comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// The stored value as-is
    Value,
    /// Time of day (HH:MM:SS) of a stored timestamp or time
    TimeOfDay,
}

/// Typed comparison operand
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Number(f64),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Time(NaiveTime),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "!=",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
        }
    }

    /// Apply to an ordering of `field` relative to the operand
    pub fn holds(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Comparison::Eq => ordering == Equal,
            Comparison::Ne => ordering != Equal,
            Comparison::Gt => ordering == Greater,
            Comparison::Gte => ordering != Less,
            Comparison::Lt => ordering == Less,
            Comparison::Lte => ordering != Greater,
        }
    }
}

/// Substring position for LIKE-style matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        op: Comparison,
        operand: Operand,
        fold_case: bool,
    },
    /// Inclusive on both ends
    Between {
        low: Operand,
        high: Operand,
        fold_case: bool,
    },
    /// `field < low OR field > high`
    Outside {
        low: Operand,
        high: Operand,
        fold_case: bool,
    },
    /// Case-insensitive; `needle` is already lower-cased
    Like {
        pattern: Pattern,
        needle: String,
        negated: bool,
    },
    /// NULL, or for text also the empty string
    Empty { negated: bool, blank_text: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub projection: Projection,
    pub condition: Condition,
}

impl Predicate {
    /// Compile one filter term
    pub fn compile(filter: &FieldFilter) -> Result<Self, QueryError> {
        let data_type = filter.data_type();
        let value = filter.typed_value()?;
        let projection = match data_type {
            DataType::Time => Projection::TimeOfDay,
            _ => Projection::Value,
        };
        let condition = if filter.mode.is_emptiness_check() {
            Condition::Empty {
                negated: filter.mode == Mode::IsNotEmpty,
                blank_text: data_type == DataType::Text,
            }
        } else {
            match data_type {
                DataType::Number => number_condition(filter.mode, value),
                DataType::Text => text_condition(filter.mode, value),
                DataType::Bool => bool_condition(filter.mode, value),
                DataType::Date => date_condition(filter.mode, value),
                DataType::Time => time_condition(filter.mode, value),
            }
            .ok_or_else(|| QueryError::unsupported(filter.mode, data_type))?
        };
        Ok(Self {
            projection,
            condition,
        })
    }
}

fn compare(op: Comparison, operand: Operand) -> Condition {
    Condition::Compare {
        op,
        operand,
        fold_case: false,
    }
}

fn between(low: Operand, high: Operand, fold_case: bool) -> Condition {
    Condition::Between {
        low,
        high,
        fold_case,
    }
}

fn outside(low: Operand, high: Operand, fold_case: bool) -> Condition {
    Condition::Outside {
        low,
        high,
        fold_case,
    }
}

fn number_condition(mode: Mode, value: FilterValue) -> Option<Condition> {
    match (mode, value) {
        (Mode::Range | Mode::Inside, FilterValue::NumberRange(r)) => Some(between(
            Operand::Number(r.from),
            Operand::Number(r.to),
            false,
        )),
        (Mode::Outside, FilterValue::NumberRange(r)) => Some(outside(
            Operand::Number(r.from),
            Operand::Number(r.to),
            false,
        )),
        (mode, FilterValue::Number(n)) => {
            let op = match mode {
                Mode::Equal => Comparison::Eq,
                Mode::NEqual => Comparison::Ne,
                Mode::Gt => Comparison::Gt,
                Mode::Gte => Comparison::Gte,
                Mode::Lt => Comparison::Lt,
                Mode::Lte => Comparison::Lte,
                _ => return None,
            };
            Some(compare(op, Operand::Number(n)))
        }
        _ => None,
    }
}

fn text_condition(mode: Mode, value: FilterValue) -> Option<Condition> {
    let like = |pattern: Pattern, needle: &str, negated: bool| Condition::Like {
        pattern,
        needle: needle.to_lowercase(),
        negated,
    };
    match (mode, value) {
        (Mode::Range | Mode::Inside, FilterValue::TextRange(r)) => {
            Some(between(Operand::Text(r.from), Operand::Text(r.to), true))
        }
        (Mode::Outside, FilterValue::TextRange(r)) => {
            Some(outside(Operand::Text(r.from), Operand::Text(r.to), true))
        }
        (mode, FilterValue::Text(s)) => Some(match mode {
            Mode::Equal | Mode::NEqual => Condition::Compare {
                op: if mode == Mode::Equal {
                    Comparison::Eq
                } else {
                    Comparison::Ne
                },
                operand: Operand::Text(s),
                fold_case: true,
            },
            Mode::Contains => like(Pattern::Contains, &s, false),
            Mode::NContains => like(Pattern::Contains, &s, true),
            Mode::StartsWith => like(Pattern::StartsWith, &s, false),
            Mode::EndsWith => like(Pattern::EndsWith, &s, false),
            Mode::Gt => compare(Comparison::Gt, Operand::Text(s)),
            Mode::Gte | Mode::After => compare(Comparison::Gte, Operand::Text(s)),
            Mode::Lt | Mode::Before => compare(Comparison::Lt, Operand::Text(s)),
            Mode::Lte => compare(Comparison::Lte, Operand::Text(s)),
            _ => return None,
        }),
        _ => None,
    }
}

fn bool_condition(mode: Mode, value: FilterValue) -> Option<Condition> {
    match (mode, value) {
        (Mode::Equal, FilterValue::Bool(b)) => Some(compare(Comparison::Eq, Operand::Bool(b))),
        (Mode::NEqual, FilterValue::Bool(b)) => Some(compare(Comparison::Ne, Operand::Bool(b))),
        _ => None,
    }
}

fn exact(dt: &DateTime<FixedOffset>) -> Operand {
    Operand::Timestamp(dt.with_timezone(&Utc))
}

/// Whole-day bounds when either endpoint is date-only, exact otherwise
fn date_range_bounds(range: &RangeDate) -> (Operand, Operand) {
    if is_date_only(&range.from) || is_date_only(&range.to) {
        (
            Operand::Timestamp(start_of_day(&range.from)),
            Operand::Timestamp(end_of_day(&range.to)),
        )
    } else {
        (exact(&range.from), exact(&range.to))
    }
}

fn date_condition(mode: Mode, value: FilterValue) -> Option<Condition> {
    match (mode, value) {
        (Mode::Range | Mode::Inside, FilterValue::DateRange(r)) => {
            let (low, high) = date_range_bounds(&r);
            Some(between(low, high, false))
        }
        (Mode::Outside, FilterValue::DateRange(r)) => {
            let (low, high) = date_range_bounds(&r);
            Some(outside(low, high, false))
        }
        (mode, FilterValue::Timestamp(dt)) => {
            let start = || Operand::Timestamp(start_of_day(&dt));
            let end = || Operand::Timestamp(end_of_day(&dt));
            let date_only = is_date_only(&dt);
            Some(match (mode, date_only) {
                (Mode::Equal, true) => between(start(), end(), false),
                (Mode::Equal, false) => compare(Comparison::Eq, exact(&dt)),
                (Mode::NEqual, true) => outside(start(), end(), false),
                (Mode::NEqual, false) => compare(Comparison::Ne, exact(&dt)),
                (Mode::Gt, true) => compare(Comparison::Gt, end()),
                (Mode::Gt, false) => compare(Comparison::Gt, exact(&dt)),
                (Mode::Gte, true) => compare(Comparison::Gte, start()),
                (Mode::Gte, false) => compare(Comparison::Gte, exact(&dt)),
                (Mode::After, true) => compare(Comparison::Gte, end()),
                (Mode::After, false) => compare(Comparison::Gte, exact(&dt)),
                (Mode::Lt | Mode::Before, true) => compare(Comparison::Lt, start()),
                (Mode::Lt | Mode::Before, false) => compare(Comparison::Lt, exact(&dt)),
                (Mode::Lte, true) => compare(Comparison::Lte, end()),
                (Mode::Lte, false) => compare(Comparison::Lte, exact(&dt)),
                _ => return None,
            })
        }
        _ => None,
    }
}

fn time_condition(mode: Mode, value: FilterValue) -> Option<Condition> {
    match (mode, value) {
        (Mode::Range | Mode::Inside, FilterValue::TimeRange(Range { from, to })) => {
            Some(between(Operand::Time(from), Operand::Time(to), false))
        }
        (Mode::Outside, FilterValue::TimeRange(Range { from, to })) => {
            Some(outside(Operand::Time(from), Operand::Time(to), false))
        }
        (mode, FilterValue::Time(t)) => {
            let op = match mode {
                Mode::Equal => Comparison::Eq,
                Mode::NEqual => Comparison::Ne,
                Mode::Gt => Comparison::Gt,
                Mode::Gte | Mode::After => Comparison::Gte,
                Mode::Lt | Mode::Before => Comparison::Lt,
                Mode::Lte => Comparison::Lte,
                _ => return None,
            };
            Some(compare(op, Operand::Time(t)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use serde_json::json;

    fn compile(mode: Mode, data_type: DataType, value: serde_json::Value) -> Predicate {
        Predicate::compile(&FieldFilter::new("f", mode, data_type, value)).unwrap()
    }

    #[test]
    fn test_date_only_equal_expands_to_whole_day() {
        let p = compile(Mode::Equal, DataType::Date, json!("2025-01-10"));
        match p.condition {
            Condition::Between { low, high, .. } => {
                assert_eq!(
                    low,
                    Operand::Timestamp(Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap())
                );
                match high {
                    Operand::Timestamp(t) => {
                        assert_eq!((t.hour(), t.minute(), t.second()), (23, 59, 59));
                        assert_eq!(t.nanosecond(), 999_999_999);
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_date_with_time_is_exact() {
        let p = compile(Mode::Equal, DataType::Date, json!("2025-01-10T10:30:00Z"));
        assert_eq!(
            p.condition,
            Condition::Compare {
                op: Comparison::Eq,
                operand: Operand::Timestamp(Utc.with_ymd_and_hms(2025, 1, 10, 10, 30, 0).unwrap()),
                fold_case: false,
            }
        );
    }

    #[test]
    fn test_date_boundaries() {
        let start = Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap();
        let p = compile(Mode::Gte, DataType::Date, json!("2025-01-10"));
        assert_eq!(p.condition, compare(Comparison::Gte, Operand::Timestamp(start)));
        let p = compile(Mode::Before, DataType::Date, json!("2025-01-10"));
        assert_eq!(p.condition, compare(Comparison::Lt, Operand::Timestamp(start)));
        let p = compile(Mode::Lte, DataType::Date, json!("2025-01-10"));
        assert!(matches!(
            p.condition,
            Condition::Compare { op: Comparison::Lte, operand: Operand::Timestamp(t), .. }
                if t.hour() == 23
        ));
    }

    #[test]
    fn test_date_range_mixed_precision_expands() {
        let p = compile(
            Mode::Range,
            DataType::Date,
            json!({"from": "2025-01-10", "to": "2025-01-12T08:00:00Z"}),
        );
        match p.condition {
            Condition::Between {
                high: Operand::Timestamp(t),
                ..
            } => assert_eq!(t.hour(), 23),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_text_equal_folds_case() {
        let p = compile(Mode::Equal, DataType::Text, json!("Bob"));
        assert_eq!(
            p.condition,
            Condition::Compare {
                op: Comparison::Eq,
                operand: Operand::Text("Bob".into()),
                fold_case: true,
            }
        );
    }

    #[test]
    fn test_text_like_lowercases_needle() {
        let p = compile(Mode::NContains, DataType::Text, json!("LiC"));
        assert_eq!(
            p.condition,
            Condition::Like {
                pattern: Pattern::Contains,
                needle: "lic".into(),
                negated: true,
            }
        );
    }

    #[test]
    fn test_text_range_folds_case() {
        let p = compile(Mode::Range, DataType::Text, json!({"from": "a", "to": "M"}));
        assert!(matches!(p.condition, Condition::Between { fold_case: true, .. }));
    }

    #[test]
    fn test_time_uses_time_of_day_projection() {
        let p = compile(Mode::Gte, DataType::Time, json!("09:00"));
        assert_eq!(p.projection, Projection::TimeOfDay);
    }

    #[test]
    fn test_emptiness() {
        let p = compile(Mode::IsEmpty, DataType::Text, json!(null));
        assert_eq!(
            p.condition,
            Condition::Empty {
                negated: false,
                blank_text: true
            }
        );
        let p = compile(Mode::IsNotEmpty, DataType::Number, json!(null));
        assert_eq!(
            p.condition,
            Condition::Empty {
                negated: true,
                blank_text: false
            }
        );
    }

    #[test]
    fn test_number_outside() {
        let p = compile(Mode::Outside, DataType::Number, json!({"from": 1, "to": 2}));
        assert_eq!(
            p.condition,
            outside(Operand::Number(1.0), Operand::Number(2.0), false)
        );
    }

    #[test]
    fn test_comparison_holds() {
        use std::cmp::Ordering;
        assert!(Comparison::Gte.holds(Ordering::Equal));
        assert!(!Comparison::Gt.holds(Ordering::Equal));
        assert!(Comparison::Ne.holds(Ordering::Less));
        assert!(Comparison::Lte.holds(Ordering::Less));
    }
}
