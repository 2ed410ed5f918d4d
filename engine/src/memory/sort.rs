//! Multi-key stable sort
//!
//! Keys are extracted in parallel batches, then a single stable sort runs
//! over an index permutation with a composite comparator.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::pool::{ScratchPool, run_batches};
use crate::core::UnknownFieldPolicy;
use crate::core::config::MemoryConfig;
use crate::error::QueryError;
use crate::filter::{SortField, SortOrder};
use crate::schema::{FieldDescriptor, FieldValue, Record, SchemaCache};

/// Comparable form of a field value, typed by the runtime value
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SortKey {
    Absent,
    Number(f64),
    /// Lower-cased
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl From<FieldValue<'_>> for SortKey {
    fn from(value: FieldValue<'_>) -> Self {
        match value {
            FieldValue::Null => SortKey::Absent,
            FieldValue::Int(v) => SortKey::Number(v as f64),
            FieldValue::UInt(v) => SortKey::Number(v as f64),
            FieldValue::Float(v) => SortKey::Number(v),
            FieldValue::Bool(v) => SortKey::Bool(v),
            FieldValue::Text(v) => SortKey::Text(v.to_lowercase()),
            FieldValue::Timestamp(v) => SortKey::Timestamp(v),
            FieldValue::Date(v) => SortKey::Date(v),
            FieldValue::Time(v) => SortKey::Time(v),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Absent => Ok(()),
            SortKey::Number(v) => write!(f, "{}", v),
            SortKey::Text(v) => f.write_str(v),
            SortKey::Bool(v) => write!(f, "{}", v),
            SortKey::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            SortKey::Date(v) => write!(f, "{}", v),
            SortKey::Time(v) => write!(f, "{}", v),
        }
    }
}

/// Ascending order of two keys; absent sorts after present
pub(crate) fn compare_keys(a: &SortKey, b: &SortKey) -> Ordering {
    match (a, b) {
        (SortKey::Absent, SortKey::Absent) => Ordering::Equal,
        (SortKey::Absent, _) => Ordering::Greater,
        (_, SortKey::Absent) => Ordering::Less,
        (SortKey::Number(x), SortKey::Number(y)) => x.total_cmp(y),
        (SortKey::Text(x), SortKey::Text(y)) => x.cmp(y),
        (SortKey::Bool(x), SortKey::Bool(y)) => x.cmp(y),
        (SortKey::Timestamp(x), SortKey::Timestamp(y)) => x.cmp(y),
        (SortKey::Date(x), SortKey::Date(y)) => x.cmp(y),
        (SortKey::Time(x), SortKey::Time(y)) => x.cmp(y),
        (x, y) => x.to_string().cmp(&y.to_string()),
    }
}

/// Resolved sort fields for one record type
pub(crate) struct SortPlan<T> {
    keys: Vec<(Arc<FieldDescriptor<T>>, SortOrder)>,
}

impl<T: Record> SortPlan<T> {
    pub(crate) fn compile(
        cache: &SchemaCache,
        sort_fields: &[SortField],
        policy: UnknownFieldPolicy,
    ) -> Result<Self, QueryError> {
        let mut keys = Vec::with_capacity(sort_fields.len());
        for sort in sort_fields {
            match cache.resolve(T::schema(), &sort.field) {
                Ok(descriptor) => keys.push((descriptor, sort.order)),
                Err(e) if e.is_field_not_found() && policy == UnknownFieldPolicy::Skip => {
                    tracing::warn!(record = T::schema().name(), field = %sort.field, "Ignoring unknown sort field");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Self { keys })
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn compare_rows(&self, a: &[SortKey], b: &[SortKey]) -> Ordering {
        for ((x, y), (_, order)) in a.iter().zip(b).zip(&self.keys) {
            let ordering = match order {
                SortOrder::Asc => compare_keys(x, y),
                SortOrder::Desc => compare_keys(x, y).reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Stable sort of `items`; fewer than two items are returned as-is
    pub(crate) fn apply<'a>(
        &self,
        items: Vec<&'a T>,
        config: &MemoryConfig,
        scratch: &ScratchPool,
        token: &CancellationToken,
    ) -> Result<Vec<&'a T>, QueryError> {
        if self.keys.is_empty() || items.len() < 2 {
            return Ok(items);
        }

        let batches = run_batches(
            &items,
            config.batch_size,
            config.max_workers,
            token,
            |_, batch, token| {
                let mut rows = Vec::with_capacity(batch.len());
                for item in batch {
                    if token.is_cancelled() {
                        return Err(QueryError::Cancelled);
                    }
                    rows.push(
                        self.keys
                            .iter()
                            .map(|(descriptor, _)| SortKey::from(descriptor.get(item)))
                            .collect::<Vec<_>>(),
                    );
                }
                Ok(rows)
            },
        )?;
        let rows: Vec<Vec<SortKey>> = batches.into_iter().flatten().collect();

        let mut order = scratch.acquire();
        order.extend(0..items.len());
        order.sort_by(|&a, &b| self.compare_rows(&rows[a], &rows[b]));
        let sorted = order.iter().map(|&i| items[i]).collect();
        scratch.release(order);

        tracing::trace!(items = rows.len(), keys = self.keys.len(), "Sorted items");
        Ok(sorted)
    }
}
