//! In-memory backend
//!
//! Evaluates structured filters over an already materialized slice of
//! registered records. Paths resolve once per call through the shared
//! [`SchemaCache`]; filtering and sort-key extraction fan out over a bounded
//! pool of scoped threads; the final ordering is one stable sort.

mod evaluate;
mod pool;
mod sort;

use serde_json::{Map, Value};
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::core::config::MemoryConfig;
use crate::core::constants::DEFAULT_PAGE_SIZE;
use crate::error::QueryError;
use crate::filter::{SortField, StructuredFilter};
use crate::pagination::{PageWindow, PaginationResult};
use crate::schema::{Record, SchemaCache};

pub use pool::ScratchPool;

use evaluate::CompiledFilter;
use pool::run_batches;
use sort::SortPlan;

/// Filter, sort and paginate engine for in-memory collections
pub struct MemoryEngine {
    cache: Arc<SchemaCache>,
    config: MemoryConfig,
    scratch: ScratchPool,
    default_page_size: u64,
}

impl MemoryEngine {
    pub fn new(cache: Arc<SchemaCache>, config: MemoryConfig) -> Self {
        Self {
            cache,
            config,
            scratch: ScratchPool::new(),
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_default_page_size(mut self, size: u64) -> Self {
        self.default_page_size = size;
        self
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Items matching the filter, in input order
    ///
    /// Every path resolves before evaluation starts. The first item that
    /// fails to evaluate cancels the remaining batches and is reported with
    /// its index.
    pub fn filter<'a, T: Record>(
        &self,
        items: &'a [T],
        filter: &StructuredFilter,
        token: &CancellationToken,
    ) -> Result<Vec<&'a T>, QueryError> {
        let compiled = CompiledFilter::<T>::compile(&self.cache, filter, self.config.unknown_fields)?;
        if compiled.is_trivial() {
            if token.is_cancelled() {
                return Err(QueryError::Cancelled);
            }
            return Ok(items.iter().collect());
        }

        let batches = run_batches(
            items,
            self.config.batch_size,
            self.config.max_workers,
            token,
            |offset, batch, token| {
                let mut hits = self.scratch.acquire();
                for (i, item) in batch.iter().enumerate() {
                    if token.is_cancelled() {
                        self.scratch.release(hits);
                        return Err(QueryError::Cancelled);
                    }
                    match compiled.matches(item) {
                        Ok(true) => hits.push(offset + i),
                        Ok(false) => {}
                        Err(e) => {
                            self.scratch.release(hits);
                            return Err(QueryError::item(offset + i, e));
                        }
                    }
                }
                Ok(hits)
            },
        )?;

        let mut matched = Vec::with_capacity(batches.iter().map(Vec::len).sum());
        for hits in batches {
            matched.extend(hits.iter().map(|&i| &items[i]));
            self.scratch.release(hits);
        }
        tracing::debug!(
            record = T::schema().name(),
            items = items.len(),
            matched = matched.len(),
            filters = filter.field_filters.len(),
            "Filtered items"
        );
        Ok(matched)
    }

    /// Stable multi-key sort
    pub fn sort<'a, T: Record>(
        &self,
        items: Vec<&'a T>,
        sort_fields: &[SortField],
        token: &CancellationToken,
    ) -> Result<Vec<&'a T>, QueryError> {
        let plan = SortPlan::<T>::compile(&self.cache, sort_fields, self.config.unknown_fields)?;
        plan.apply(items, &self.config, &self.scratch, token)
    }

    /// Filter, then sort, then keep at most `limit` items
    pub fn filter_and_sort<'a, T: Record>(
        &self,
        items: &'a [T],
        filter: &StructuredFilter,
        limit: Option<usize>,
        token: &CancellationToken,
    ) -> Result<Vec<&'a T>, QueryError> {
        // resolve sort paths before evaluating anything
        let plan = SortPlan::<T>::compile(&self.cache, &filter.sort_fields, self.config.unknown_fields)?;
        let matched = self.filter(items, filter, token)?;
        let mut sorted = if plan.is_empty() {
            matched
        } else {
            plan.apply(matched, &self.config, &self.scratch, token)?
        };
        if let Some(limit) = limit {
            sorted.truncate(limit);
        }
        Ok(sorted)
    }

    /// One page of the filtered and sorted items
    pub fn paginate<T: Record + Clone>(
        &self,
        items: &[T],
        filter: &StructuredFilter,
        page_index: i64,
        page_size: i64,
        token: &CancellationToken,
    ) -> Result<PaginationResult<T>, QueryError> {
        let window = PageWindow::with_default_size(page_index, page_size, self.default_page_size);
        let sorted = self.filter_and_sort(items, filter, None, token)?;
        let data = window.slice(&sorted).iter().map(|&item| item.clone()).collect();
        Ok(PaginationResult::new(data, window, sorted.len() as u64).with_sort(filter.sort_fields.clone()))
    }

    /// Write the filtered and sorted items as CSV, returning the row count
    pub fn export_csv<T, W, F>(
        &self,
        writer: W,
        items: &[T],
        filter: &StructuredFilter,
        columns: F,
        token: &CancellationToken,
    ) -> Result<usize, QueryError>
    where
        T: Record,
        W: Write,
        F: Fn(&T) -> Map<String, Value>,
    {
        let rows = self.filter_and_sort(items, filter, None, token)?;
        crate::export::write_csv(writer, rows, columns)
    }
}
