//! Page windows for admin listings.
//!
//! Booking lists page in SQL with `LIMIT/OFFSET`; the audit viewer loads a
//! fixed window of recent rows and pages it in memory with [`PageRequest::slice`].

use serde::Serialize;
use utoipa::ToSchema;

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;

/// A requested page, normalized on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: i64,
    per_page: i64,
}

impl PageRequest {
    /// Pages start at 1; `per_page` is clamped to `1..=MAX_PER_PAGE`.
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn per_page(&self) -> i64 {
        self.per_page
    }

    pub fn limit_offset(&self) -> (i64, i64) {
        (self.per_page, (self.page - 1) * self.per_page)
    }

    pub fn meta(&self, total_count: i64) -> PaginationMeta {
        PaginationMeta::new(self.page, self.per_page, total_count)
    }

    /// Cuts the requested page out of an already loaded result set.
    pub fn slice<T, U: Serialize>(&self, rows: Vec<T>, map: impl FnMut(T) -> U) -> Paged<U> {
        let total = rows.len() as i64;
        let (limit, offset) = self.limit_offset();
        let data = rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(map)
            .collect();
        Paged {
            data,
            pagination: self.meta(total),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PER_PAGE)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaginationMeta {
    pub page: i64,
    pub per_page: i64,
    pub total_count: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PaginationMeta {
    fn new(page: i64, per_page: i64, total_count: i64) -> Self {
        // An empty result still reports one (empty) page.
        let total_pages = ((total_count.max(0) as u64).div_ceil(per_page as u64) as i64).max(1);
        Self {
            page,
            per_page,
            total_count,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Paged<T: Serialize> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_normalized() {
        assert_eq!(PageRequest::new(0, 20).page(), 1);
        assert_eq!(PageRequest::new(-3, 20).page(), 1);
        assert_eq!(PageRequest::new(1, 500).per_page(), MAX_PER_PAGE);
        assert_eq!(PageRequest::new(1, 0).per_page(), 1);
        assert_eq!(PageRequest::default().per_page(), DEFAULT_PER_PAGE);
    }

    #[test]
    fn offset_follows_page() {
        assert_eq!(PageRequest::new(1, 20).limit_offset(), (20, 0));
        assert_eq!(PageRequest::new(3, 10).limit_offset(), (10, 20));
    }

    #[test]
    fn meta_counts_pages() {
        let meta = PageRequest::new(1, 20).meta(95);
        assert_eq!(meta.total_pages, 5);
        assert!(meta.has_next);
        assert!(!meta.has_prev);

        let last = PageRequest::new(5, 20).meta(100);
        assert!(!last.has_next);
        assert!(last.has_prev);

        let empty = PageRequest::new(1, 20).meta(0);
        assert_eq!(empty.total_pages, 1);
        assert!(!empty.has_next);
    }

    #[test]
    fn slice_takes_requested_window() {
        let rows: Vec<i32> = (1..=7).collect();
        let paged = PageRequest::new(2, 3).slice(rows, |n| n * 10);

        assert_eq!(paged.data, vec![40, 50, 60]);
        assert_eq!(paged.pagination.total_count, 7);
        assert_eq!(paged.pagination.total_pages, 3);
        assert!(paged.pagination.has_next);
    }

    #[test]
    fn slice_past_the_end_is_empty() {
        let paged = PageRequest::new(4, 5).slice(vec!["a", "b"], |s| s);
        assert!(paged.data.is_empty());
        assert!(!paged.pagination.has_next);
    }
}
