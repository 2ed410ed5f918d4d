//! Request parameter decoding and encoding
//!
//! Filters and sort lists travel as base64-encoded JSON inside a query
//! parameter, or packed into one pipe-delimited string
//! `filter|sort|pageIndex|pageSize` where every part is optional.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::types::{SortField, StructuredFilter};
use crate::core::config::DecodeLimits;
use crate::error::QueryError;

/// Decoded request parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    pub filter: StructuredFilter,
    /// Raw page index (clamped later by `PageWindow`)
    pub page_index: i64,
    /// Raw page size (clamped later by `PageWindow`)
    pub page_size: i64,
}

/// Decodes request parameters under size and term-count limits
#[derive(Debug, Clone, Default)]
pub struct QueryDecoder {
    limits: DecodeLimits,
}

impl QueryDecoder {
    pub fn new(limits: DecodeLimits) -> Self {
        Self { limits }
    }

    /// Decode a base64-JSON filter parameter; empty yields the default filter
    pub fn decode_filter(&self, param: &str) -> Result<StructuredFilter, QueryError> {
        let filter: StructuredFilter = match self.decode_json("filter", param)? {
            Some(filter) => filter,
            None => return Ok(StructuredFilter::default()),
        };
        if filter.field_filters.len() > self.limits.max_terms {
            return Err(QueryError::parameter(
                "filter",
                format!(
                    "too many filter terms (max {}, got {})",
                    self.limits.max_terms,
                    filter.field_filters.len()
                ),
            ));
        }
        self.check_sort_count("filter", &filter.sort_fields)?;
        Ok(filter)
    }

    /// Decode a base64-JSON sort list; empty yields no sort fields
    pub fn decode_sort(&self, param: &str) -> Result<Vec<SortField>, QueryError> {
        let sorts: Vec<SortField> = self.decode_json("sort", param)?.unwrap_or_default();
        self.check_sort_count("sort", &sorts)?;
        Ok(sorts)
    }

    /// Parse `filter|sort|pageIndex|pageSize`
    pub fn parse_query_string(&self, query: &str) -> Result<QueryParams, QueryError> {
        let mut parts = query.splitn(4, '|');
        let mut filter = self.decode_filter(parts.next().unwrap_or_default())?;
        let sorts = self.decode_sort(parts.next().unwrap_or_default())?;
        if !sorts.is_empty() {
            filter.sort_fields = sorts;
        }
        let page_index = decode_page_index(parts.next().unwrap_or_default())?;
        let page_size = decode_page_size(parts.next().unwrap_or_default())?;
        tracing::debug!(
            filters = filter.field_filters.len(),
            sorts = filter.sort_fields.len(),
            page_index,
            page_size,
            "Parsed query string"
        );
        Ok(QueryParams {
            filter,
            page_index,
            page_size,
        })
    }

    /// Parse `filter|sort` without page numbers
    pub fn parse_query_string_unpaged(&self, query: &str) -> Result<StructuredFilter, QueryError> {
        let mut parts = query.splitn(2, '|');
        let mut filter = self.decode_filter(parts.next().unwrap_or_default())?;
        let sorts = self.decode_sort(parts.next().unwrap_or_default())?;
        if !sorts.is_empty() {
            filter.sort_fields = sorts;
        }
        Ok(filter)
    }

    /// Decode from `filter`, `sort`, `pageIndex` and `pageSize` query pairs
    ///
    /// Unknown keys are ignored; missing keys take their defaults.
    pub fn from_pairs<I, K, V>(&self, pairs: I) -> Result<QueryParams, QueryError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params = QueryParams::default();
        let mut sorts = Vec::new();
        for (key, value) in pairs {
            let value = value.as_ref();
            match key.as_ref() {
                "filter" => params.filter = self.decode_filter(value)?,
                "sort" => sorts = self.decode_sort(value)?,
                "pageIndex" => params.page_index = decode_page_index(value)?,
                "pageSize" => params.page_size = decode_page_size(value)?,
                _ => {}
            }
        }
        if !sorts.is_empty() {
            params.filter.sort_fields = sorts;
        }
        Ok(params)
    }

    fn check_sort_count(&self, name: &'static str, sorts: &[SortField]) -> Result<(), QueryError> {
        if sorts.len() > self.limits.max_terms {
            return Err(QueryError::parameter(
                name,
                format!(
                    "too many sort fields (max {}, got {})",
                    self.limits.max_terms,
                    sorts.len()
                ),
            ));
        }
        Ok(())
    }

    fn decode_json<T: DeserializeOwned>(
        &self,
        name: &'static str,
        param: &str,
    ) -> Result<Option<T>, QueryError> {
        let param = param.trim();
        if param.is_empty() {
            return Ok(None);
        }
        if param.len() > self.limits.max_param_size {
            return Err(QueryError::parameter(
                name,
                format!(
                    "parameter too large (max {} bytes)",
                    self.limits.max_param_size
                ),
            ));
        }
        let unescaped = percent_decode_str(param)
            .decode_utf8()
            .map_err(|e| QueryError::parameter(name, format!("invalid URL encoding: {}", e)))?;
        // Form decoding turns '+' into ' '; base64 never contains spaces.
        let encoded = unescaped.replace(' ', "+");
        let bytes = STANDARD
            .decode(&encoded)
            .or_else(|_| URL_SAFE.decode(&encoded))
            .map_err(|e| QueryError::parameter(name, format!("invalid base64: {}", e)))?;
        let decoded = serde_json::from_slice(&bytes)
            .map_err(|e| QueryError::parameter(name, format!("invalid JSON: {}", e)))?;
        Ok(Some(decoded))
    }
}

/// Decode a page index; empty is zero
pub fn decode_page_index(param: &str) -> Result<i64, QueryError> {
    decode_page_number("pageIndex", param)
}

/// Decode a page size; empty is zero, which the page window turns into the default
pub fn decode_page_size(param: &str) -> Result<i64, QueryError> {
    decode_page_number("pageSize", param)
}

fn decode_page_number(name: &'static str, part: &str) -> Result<i64, QueryError> {
    let part = part.trim();
    if part.is_empty() {
        return Ok(0);
    }
    part.parse::<i64>()
        .map_err(|e| QueryError::parameter(name, format!("'{}': {}", part, e)))
}

fn encode_json<T: Serialize>(value: &T) -> String {
    // DSL types always serialize (string keys only)
    let json = serde_json::to_vec(value).unwrap_or_default();
    STANDARD.encode(json)
}

/// Encode a filter as a base64-JSON parameter
pub fn encode_filter(filter: &StructuredFilter) -> String {
    encode_json(filter)
}

/// Encode a sort list as a base64-JSON parameter
pub fn encode_sort(sorts: &[SortField]) -> String {
    encode_json(&sorts)
}

/// Pack parameters into `filter|sort|pageIndex|pageSize`
pub fn encode_query_string(params: &QueryParams) -> String {
    let mut filter = params.filter.clone();
    let sorts = std::mem::take(&mut filter.sort_fields);
    format!(
        "{}|{}|{}|{}",
        encode_filter(&filter),
        if sorts.is_empty() {
            String::new()
        } else {
            encode_sort(&sorts)
        },
        params.page_index,
        params.page_size
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{DataType, FieldFilter, Logic, Mode};
    use serde_json::json;

    fn encode_raw(value: serde_json::Value) -> String {
        STANDARD.encode(value.to_string())
    }

    fn sample_filter() -> StructuredFilter {
        StructuredFilter::new()
            .filter(FieldFilter::new("age", Mode::Gte, DataType::Number, 30))
            .filter(FieldFilter::new(
                "organization.name",
                Mode::Contains,
                DataType::Text,
                "acme",
            ))
            .sort(SortField::desc("age"))
            .logic(Logic::Or)
    }

    #[test]
    fn test_round_trip() {
        let decoder = QueryDecoder::default();
        let filter = sample_filter();
        let decoded = decoder.decode_filter(&encode_filter(&filter)).unwrap();
        assert_eq!(decoded, filter);
    }

    #[test]
    fn test_empty_param_is_default() {
        let decoder = QueryDecoder::default();
        let filter = decoder.decode_filter("").unwrap();
        assert!(filter.field_filters.is_empty());
        assert_eq!(filter.logic, Logic::And);
        assert!(decoder.decode_sort("  ").unwrap().is_empty());
    }

    #[test]
    fn test_percent_encoded_param() {
        let decoder = QueryDecoder::default();
        let encoded = encode_filter(&sample_filter());
        let escaped = encoded.replace('+', "%2B").replace('/', "%2F").replace('=', "%3D");
        assert_eq!(decoder.decode_filter(&escaped).unwrap(), sample_filter());
    }

    #[test]
    fn test_invalid_base64() {
        let err = QueryDecoder::default().decode_filter("!!!not-base64!!!").unwrap_err();
        assert!(err.is_client_error());
        assert!(err.to_string().starts_with("filter processing failed: invalid base64"));
    }

    #[test]
    fn test_invalid_json() {
        let err = QueryDecoder::default()
            .decode_filter(&STANDARD.encode("{not json"))
            .unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn test_oversized_param() {
        let decoder = QueryDecoder::new(DecodeLimits {
            max_param_size: 8,
            max_terms: 50,
        });
        let err = decoder.decode_filter(&encode_filter(&sample_filter())).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_too_many_terms() {
        let decoder = QueryDecoder::new(DecodeLimits {
            max_param_size: 64 * 1024,
            max_terms: 1,
        });
        let err = decoder.decode_filter(&encode_filter(&sample_filter())).unwrap_err();
        assert!(err.to_string().contains("too many filter terms"));
    }

    #[test]
    fn test_parse_query_string_full() {
        let decoder = QueryDecoder::default();
        let filter = encode_raw(json!({
            "fieldFilters": [{"field": "name", "value": "bob", "mode": "equal", "dataType": "text"}]
        }));
        let sort = encode_raw(json!([{"field": "age", "order": "desc"}]));
        let params = decoder
            .parse_query_string(&format!("{}|{}|2|15", filter, sort))
            .unwrap();
        assert_eq!(params.filter.field_filters[0].field, "name");
        assert_eq!(params.filter.sort_fields, vec![SortField::desc("age")]);
        assert_eq!(params.page_index, 2);
        assert_eq!(params.page_size, 15);
    }

    #[test]
    fn test_parse_query_string_partial() {
        let decoder = QueryDecoder::default();
        let params = decoder.parse_query_string("||3").unwrap();
        assert!(params.filter.field_filters.is_empty());
        assert_eq!(params.page_index, 3);
        assert_eq!(params.page_size, 0);
        assert_eq!(decoder.parse_query_string("").unwrap(), QueryParams::default());
    }

    #[test]
    fn test_parse_query_string_bad_page() {
        let err = QueryDecoder::default()
            .parse_query_string("||x|10")
            .unwrap_err();
        assert!(err.to_string().starts_with("pageIndex processing failed"));
        let err = QueryDecoder::default()
            .parse_query_string("||1|ten")
            .unwrap_err();
        assert!(err.to_string().starts_with("pageSize processing failed"));
    }

    #[test]
    fn test_decode_page_numbers() {
        assert_eq!(decode_page_index("").unwrap(), 0);
        assert_eq!(decode_page_index("3").unwrap(), 3);
        assert_eq!(decode_page_size("-5").unwrap(), -5);
        assert!(decode_page_size("1.5").is_err());
    }

    #[test]
    fn test_parse_query_string_unpaged() {
        let decoder = QueryDecoder::default();
        let sort = encode_sort(&[SortField::asc("name")]);
        let filter = decoder
            .parse_query_string_unpaged(&format!("|{}", sort))
            .unwrap();
        assert_eq!(filter.sort_fields, vec![SortField::asc("name")]);
    }

    #[test]
    fn test_from_pairs() {
        let decoder = QueryDecoder::default();
        let filter = encode_filter(&sample_filter());
        let sort = encode_sort(&[SortField::asc("name")]);
        let params = decoder
            .from_pairs([
                ("filter", filter.as_str()),
                ("sort", sort.as_str()),
                ("pageIndex", "1"),
                ("pageSize", "20"),
                ("unrelated", "x"),
            ])
            .unwrap();
        assert_eq!(params.filter.field_filters.len(), 2);
        assert_eq!(params.filter.sort_fields, vec![SortField::asc("name")]);
        assert_eq!((params.page_index, params.page_size), (1, 20));
    }

    #[test]
    fn test_encode_query_string_round_trip() {
        let decoder = QueryDecoder::default();
        let params = QueryParams {
            filter: sample_filter(),
            page_index: 4,
            page_size: 25,
        };
        let decoded = decoder
            .parse_query_string(&encode_query_string(&params))
            .unwrap();
        assert_eq!(decoded, params);
    }
}
