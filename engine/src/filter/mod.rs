//! Filter DSL
//!
//! Field filters, sort fields and AND/OR logic shared by the SQL compiler and
//! the in-memory evaluator, plus request decoding.

pub mod codec;
pub mod predicate;
pub mod types;
pub mod value;

pub use codec::{
    QueryDecoder, QueryParams, decode_page_index, decode_page_size, encode_filter,
    encode_query_string, encode_sort,
};
pub use predicate::{Comparison, Condition, Operand, Pattern, Predicate, Projection};
pub use types::{DataType, FieldFilter, Logic, Mode, Range, SortField, SortOrder, StructuredFilter};
pub use value::{FilterValue, RangeDate, RangeNumber, RangeText, RangeTime};
