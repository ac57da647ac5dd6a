//! Page arithmetic shared by the repositories built on the cluster.

use serde::{Deserialize, Serialize};

/// Maximum rows per page
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Rows per page when the caller does not say
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Validated page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Page number (1-indexed)
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    /// Page is clamped to at least 1, page size to `1..=MAX_PAGE_SIZE`.
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// SQL `OFFSET`.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    /// SQL `LIMIT`.
    pub fn limit(&self) -> u32 {
        self.page_size
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One page of results plus the total across all pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: u64, page: Pagination) -> Self {
        Self {
            items,
            total,
            page: page.page,
            page_size: page.page_size,
        }
    }

    pub fn total_pages(&self) -> u64 {
        let size = u64::from(self.page_size.max(1));
        self.total.div_ceil(size).max(1)
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

/// Raw page parameters as they arrive from a request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaginationParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl From<PaginationParams> for Pagination {
    fn from(params: PaginationParams) -> Self {
        Self::new(
            params.page.unwrap_or(1),
            params.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_calculation() {
        assert_eq!(Pagination::new(1, 10).offset(), 0);
        assert_eq!(Pagination::new(2, 10).offset(), 10);
        assert_eq!(Pagination::new(3, 25).offset(), 50);
    }

    #[test]
    fn page_zero_built_directly_starts_at_first_row() {
        let p = Pagination {
            page: 0,
            page_size: 10,
        };
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn clamps() {
        assert_eq!(Pagination::new(0, 10).page, 1);
        assert_eq!(Pagination::new(1, 0).page_size, 1);
        assert_eq!(Pagination::new(1, 5000).page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn defaults_from_params() {
        let p: Pagination = PaginationParams::default().into();
        assert_eq!(p, Pagination::default());
        assert_eq!(p.limit(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn page_navigation() {
        let empty: Paginated<()> = Paginated::new(vec![], 0, Pagination::new(1, 10));
        assert_eq!(empty.total_pages(), 1);
        assert!(!empty.has_next());

        let first: Paginated<()> = Paginated::new(vec![], 25, Pagination::new(1, 10));
        assert_eq!(first.total_pages(), 3);
        assert!(first.has_next());
        assert!(!first.has_prev());

        let last: Paginated<()> = Paginated::new(vec![], 30, Pagination::new(3, 10));
        assert!(!last.has_next());
        assert!(last.has_prev());
    }
}
