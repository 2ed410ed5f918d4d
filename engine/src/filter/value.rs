//! Typed filter values
//!
//! Raw JSON values are coerced once, at the DSL boundary, according to the
//! filter's data type and mode. Builders downstream only see [`FilterValue`].

use chrono::{DateTime, FixedOffset, NaiveTime};
use serde_json::Value;

use super::types::{DataType, FieldFilter, Mode, Range};
use crate::error::QueryError;
use crate::utils::time::{parse_time_of_day, parse_timestamp};

pub type RangeNumber = Range<f64>;
pub type RangeText = Range<String>;
pub type RangeDate = Range<DateTime<FixedOffset>>;
pub type RangeTime = Range<NaiveTime>;

/// Filter value after coercion
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Emptiness checks carry no value
    Absent,
    Number(f64),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<FixedOffset>),
    Time(NaiveTime),
    NumberRange(RangeNumber),
    TextRange(RangeText),
    DateRange(RangeDate),
    TimeRange(RangeTime),
}

impl FieldFilter {
    /// Coerce the raw value for this filter's data type and mode
    pub fn typed_value(&self) -> Result<FilterValue, QueryError> {
        let data_type = self.data_type();
        if !data_type.supports(self.mode) {
            return Err(QueryError::unsupported(self.mode, data_type));
        }
        if self.mode.is_emptiness_check() {
            return Ok(FilterValue::Absent);
        }
        if self.mode.takes_range() {
            return coerce_range(data_type, &self.value);
        }
        Ok(match data_type {
            DataType::Number => FilterValue::Number(coerce_number(&self.value)?),
            DataType::Text => FilterValue::Text(coerce_text(&self.value)?),
            DataType::Bool => FilterValue::Bool(coerce_bool(&self.value)?),
            DataType::Date => FilterValue::Timestamp(coerce_timestamp(&self.value)?),
            DataType::Time => FilterValue::Time(coerce_time(&self.value)?),
        })
    }
}

/// JSON numbers and numeric strings; null is zero
pub fn coerce_number(value: &Value) -> Result<f64, QueryError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| QueryError::coercion("number", n)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| QueryError::coercion("number", format!("'{}'", s))),
        Value::Null => Ok(0.0),
        other => Err(QueryError::coercion("number", other)),
    }
}

/// Strings as-is; numbers and bools in display form; null is empty
pub fn coerce_text(value: &Value) -> Result<String, QueryError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(QueryError::coercion("text", other)),
    }
}

/// Permissive: `"true"`/`"1"` and non-zero numbers are true
pub fn coerce_bool(value: &Value) -> Result<bool, QueryError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => {
            let s = s.trim();
            Ok(s.eq_ignore_ascii_case("true") || s == "1")
        }
        Value::Number(n) => Ok(n.as_f64().is_some_and(|f| f != 0.0)),
        Value::Null => Ok(false),
        other => Err(QueryError::coercion("bool", other)),
    }
}

pub fn coerce_timestamp(value: &Value) -> Result<DateTime<FixedOffset>, QueryError> {
    match value {
        Value::String(s) => {
            parse_timestamp(s).ok_or_else(|| QueryError::coercion("date", format!("'{}'", s)))
        }
        other => Err(QueryError::coercion("date", other)),
    }
}

pub fn coerce_time(value: &Value) -> Result<NaiveTime, QueryError> {
    match value {
        Value::String(s) => {
            parse_time_of_day(s).ok_or_else(|| QueryError::coercion("time", format!("'{}'", s)))
        }
        other => Err(QueryError::coercion("time", other)),
    }
}

/// Split a raw range into its bounds
///
/// Accepts `{"from": .., "to": ..}` (keys matched case-insensitively) or a
/// two-element array. A null bound counts as missing.
fn range_bounds(value: &Value) -> Result<(&Value, &Value), QueryError> {
    let (from, to) = match value {
        Value::Object(map) => {
            let lookup = |key: &str| {
                map.iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            };
            (lookup("from"), lookup("to"))
        }
        Value::Array(items) if items.len() == 2 => (items.first(), items.get(1)),
        other => {
            return Err(QueryError::invalid_range(format!(
                "expected {{from, to}}, got {}",
                other
            )));
        }
    };
    let from = from
        .filter(|v| !v.is_null())
        .ok_or_else(|| QueryError::invalid_range("missing 'from'"))?;
    let to = to
        .filter(|v| !v.is_null())
        .ok_or_else(|| QueryError::invalid_range("missing 'to'"))?;
    Ok((from, to))
}

fn coerce_range(data_type: DataType, value: &Value) -> Result<FilterValue, QueryError> {
    let (from, to) = range_bounds(value)?;
    match data_type {
        DataType::Number => {
            let range = ordered(coerce_number(from)?, coerce_number(to)?)?;
            Ok(FilterValue::NumberRange(range))
        }
        DataType::Text => Ok(FilterValue::TextRange(Range {
            from: coerce_text(from)?,
            to: coerce_text(to)?,
        })),
        DataType::Date => {
            let range = ordered(coerce_timestamp(from)?, coerce_timestamp(to)?)?;
            Ok(FilterValue::DateRange(range))
        }
        DataType::Time => {
            let range = ordered(coerce_time(from)?, coerce_time(to)?)?;
            Ok(FilterValue::TimeRange(range))
        }
        DataType::Bool => Err(QueryError::unsupported(Mode::Range, DataType::Bool)),
    }
}

fn ordered<T: PartialOrd + std::fmt::Debug>(from: T, to: T) -> Result<Range<T>, QueryError> {
    if from > to {
        return Err(QueryError::invalid_range(format!(
            "'from' ({:?}) is after 'to' ({:?})",
            from, to
        )));
    }
    Ok(Range { from, to })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    fn filter(mode: Mode, data_type: DataType, value: Value) -> FieldFilter {
        FieldFilter::new("f", mode, data_type, value)
    }

    #[test]
    fn test_number_coercion() {
        assert_eq!(coerce_number(&json!(30)).unwrap(), 30.0);
        assert_eq!(coerce_number(&json!(" 2.5 ")).unwrap(), 2.5);
        assert_eq!(coerce_number(&Value::Null).unwrap(), 0.0);
        assert!(matches!(
            coerce_number(&json!("abc")),
            Err(QueryError::TypeCoercion { .. })
        ));
        assert!(coerce_number(&json!(true)).is_err());
    }

    #[test]
    fn test_bool_coercion_is_permissive() {
        assert!(coerce_bool(&json!(true)).unwrap());
        assert!(coerce_bool(&json!("TRUE")).unwrap());
        assert!(coerce_bool(&json!("1")).unwrap());
        assert!(!coerce_bool(&json!("no")).unwrap());
        assert!(coerce_bool(&json!(2)).unwrap());
        assert!(!coerce_bool(&json!(0)).unwrap());
        assert!(!coerce_bool(&Value::Null).unwrap());
        assert!(coerce_bool(&json!([1])).is_err());
    }

    #[test]
    fn test_text_coercion() {
        assert_eq!(coerce_text(&json!("Bob")).unwrap(), "Bob");
        assert_eq!(coerce_text(&json!(42)).unwrap(), "42");
        assert!(coerce_text(&json!({"a": 1})).is_err());
    }

    #[test]
    fn test_typed_value_scalar() {
        let v = filter(Mode::Equal, DataType::Date, json!("2025-01-10"))
            .typed_value()
            .unwrap();
        match v {
            FilterValue::Timestamp(dt) => assert_eq!(dt.day(), 10),
            other => panic!("unexpected {:?}", other),
        }
        let v = filter(Mode::Gt, DataType::Time, json!("10:15:30"))
            .typed_value()
            .unwrap();
        match v {
            FilterValue::Time(t) => assert_eq!(t.minute(), 15),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_typed_value_emptiness_ignores_value() {
        let v = filter(Mode::IsEmpty, DataType::Number, json!({"garbage": true}))
            .typed_value()
            .unwrap();
        assert_eq!(v, FilterValue::Absent);
    }

    #[test]
    fn test_unsupported_mode() {
        let err = filter(Mode::Contains, DataType::Bool, json!(true))
            .typed_value()
            .unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedOperation { .. }));
    }

    #[test]
    fn test_number_range_object_and_array() {
        let v = filter(Mode::Range, DataType::Number, json!({"from": 10, "to": 20}))
            .typed_value()
            .unwrap();
        assert_eq!(v, FilterValue::NumberRange(Range { from: 10.0, to: 20.0 }));
        let v = filter(Mode::Inside, DataType::Number, json!([1, "2"]))
            .typed_value()
            .unwrap();
        assert_eq!(v, FilterValue::NumberRange(Range { from: 1.0, to: 2.0 }));
        let v = filter(Mode::Outside, DataType::Number, json!({"From": 1, "To": 3}))
            .typed_value()
            .unwrap();
        assert_eq!(v, FilterValue::NumberRange(Range { from: 1.0, to: 3.0 }));
    }

    #[test]
    fn test_range_missing_bound() {
        let err = filter(Mode::Range, DataType::Number, json!({"from": 10}))
            .typed_value()
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid range value: missing 'to'");
        let err = filter(Mode::Range, DataType::Date, json!({"to": "2025-01-10", "from": null}))
            .typed_value()
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid range value: missing 'from'");
        assert!(
            filter(Mode::Range, DataType::Number, json!(5))
                .typed_value()
                .is_err()
        );
    }

    #[test]
    fn test_range_from_after_to() {
        let err = filter(
            Mode::Range,
            DataType::Date,
            json!({"from": "2025-02-01", "to": "2025-01-01"}),
        )
        .typed_value()
        .unwrap_err();
        assert!(matches!(err, QueryError::InvalidRangeValue(_)));
        assert!(
            filter(Mode::Range, DataType::Time, json!({"from": "18:00", "to": "09:00"}))
                .typed_value()
                .is_err()
        );
    }

    #[test]
    fn test_text_range_keeps_order_unchecked() {
        let v = filter(Mode::Range, DataType::Text, json!({"from": "m", "to": "c"}))
            .typed_value()
            .unwrap();
        assert!(matches!(v, FilterValue::TextRange(_)));
    }

    #[test]
    fn test_time_truncated_to_seconds() {
        let v = filter(Mode::Equal, DataType::Time, json!("10:15:30.999"))
            .typed_value()
            .unwrap();
        match v {
            FilterValue::Time(t) => assert_eq!(t.nanosecond(), 0),
            other => panic!("unexpected {:?}", other),
        }
    }
}
