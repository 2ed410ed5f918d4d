//! Page window and result envelope shared by both backends

use serde::Serialize;

use crate::core::constants::DEFAULT_PAGE_SIZE;
use crate::filter::SortField;

/// Clamped (page index, page size) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub index: u64,
    pub size: u64,
}

impl PageWindow {
    /// Clamp raw request values: index < 0 becomes 0, size <= 0 becomes 30
    pub fn new(page_index: i64, page_size: i64) -> Self {
        Self::with_default_size(page_index, page_size, DEFAULT_PAGE_SIZE)
    }

    /// Like [`PageWindow::new`] with a configured default size
    pub fn with_default_size(page_index: i64, page_size: i64, default_size: u64) -> Self {
        let index = u64::try_from(page_index).unwrap_or(0);
        let size = match u64::try_from(page_size) {
            Ok(size) if size > 0 => size,
            _ => default_size.max(1),
        };
        Self { index, size }
    }

    pub fn offset(&self) -> u64 {
        self.index.saturating_mul(self.size)
    }

    pub fn limit(&self) -> u64 {
        self.size
    }

    /// Slice one page out of an already filtered and sorted sequence
    ///
    /// An out-of-range start yields an empty page.
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        if start >= items.len() {
            return &[];
        }
        let end = start.saturating_add(usize::try_from(self.size).unwrap_or(usize::MAX));
        &items[start..end.min(items.len())]
    }
}

/// Result envelope for one page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationResult<T> {
    pub data: Vec<T>,
    pub page_index: u64,
    pub page_size: u64,
    /// Items matching the filter before pagination
    pub total_size: u64,
    pub total_page: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortField>,
}

impl<T> PaginationResult<T> {
    pub fn new(data: Vec<T>, window: PageWindow, total_size: u64) -> Self {
        Self {
            data,
            page_index: window.index,
            page_size: window.size,
            total_size,
            total_page: total_size.div_ceil(window.size),
            sort: Vec::new(),
        }
    }

    pub fn with_sort(mut self, sort: Vec<SortField>) -> Self {
        self.sort = sort;
        self
    }

    /// Transform the page items, keeping the counters
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginationResult<U> {
        PaginationResult {
            data: self.data.into_iter().map(f).collect(),
            page_index: self.page_index,
            page_size: self.page_size,
            total_size: self.total_size,
            total_page: self.total_page,
            sort: self.sort,
        }
    }
}

/// Page an already filtered and sorted sequence
pub fn slice_page<T: Clone>(items: &[T], page_index: i64, page_size: i64) -> PaginationResult<T> {
    let window = PageWindow::new(page_index, page_size);
    PaginationResult::new(window.slice(items).to_vec(), window, items.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_window_clamping() {
        assert_eq!(PageWindow::new(-3, 10), PageWindow { index: 0, size: 10 });
        assert_eq!(PageWindow::new(2, 0), PageWindow { index: 2, size: 30 });
        assert_eq!(PageWindow::new(1, -5), PageWindow { index: 1, size: 30 });
        assert_eq!(
            PageWindow::with_default_size(0, 0, 50),
            PageWindow { index: 0, size: 50 }
        );
    }

    #[test]
    fn test_offset() {
        assert_eq!(PageWindow::new(3, 20).offset(), 60);
        assert_eq!(PageWindow::new(0, 20).offset(), 0);
    }

    #[test]
    fn test_slice() {
        let items: Vec<u32> = (0..5).collect();
        assert_eq!(PageWindow::new(0, 2).slice(&items), &[0, 1]);
        assert_eq!(PageWindow::new(2, 2).slice(&items), &[4]);
        assert!(PageWindow::new(3, 2).slice(&items).is_empty());
        assert!(PageWindow::new(i64::MAX, 2).slice(&items).is_empty());
    }

    #[test]
    fn test_slice_page() {
        let items: Vec<u32> = (0..5).collect();
        let page = slice_page(&items, 1, 2);
        assert_eq!(page.data, vec![2, 3]);
        assert_eq!((page.total_size, page.total_page), (5, 3));
        let past_end = slice_page(&items, 7, 2);
        assert!(past_end.data.is_empty());
        assert_eq!(past_end.page_index, 7);
    }

    #[test]
    fn test_total_page_is_ceiling() {
        for (total, size, expected) in [(0, 10, 0), (1, 10, 1), (10, 10, 1), (11, 10, 2), (4, 2, 2)]
        {
            let result = PaginationResult::<u8>::new(vec![], PageWindow::new(0, size), total);
            assert_eq!(result.total_page, expected, "total={total} size={size}");
        }
    }

    #[test]
    fn test_serialized_envelope() {
        let result = PaginationResult::new(vec!["a"], PageWindow::new(0, 1), 3);
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "data": ["a"],
                "pageIndex": 0,
                "pageSize": 1,
                "totalSize": 3,
                "totalPage": 3
            })
        );
        let sorted = result.with_sort(vec![SortField::desc("age")]);
        assert_eq!(
            serde_json::to_value(&sorted).unwrap()["sort"],
            json!([{"field": "age", "order": "desc"}])
        );
    }
}
