//! Pagination utilities for module tables

/// Rows per page when the client does not ask
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Largest page a client may request
pub const MAX_PAGE_SIZE: i64 = 100;

/// Pagination metadata calculated from total results
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: i64,
    /// Rows per page after clamping
    pub page_size: i64,
    /// Total number of pages
    pub total_pages: i64,
    /// Index of the first row on this page
    pub offset: i64,
}

impl Pagination {
    /// Slice one page out of an already-filtered result set
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset as usize)
            .take(self.page_size as usize)
            .collect()
    }
}

/// Calculate pagination metadata from total results and requested page
///
/// Ensures page is within valid bounds [1, total_pages] and page size
/// within [1, MAX_PAGE_SIZE].
///
/// # Examples
/// ```
/// use qms_records::pagination::calculate_pagination;
///
/// // 45 total results at 20 per page = 3 pages (20 + 20 + 5)
/// let p = calculate_pagination(45, 2, 20);
/// assert_eq!(p.page, 2);
/// assert_eq!(p.total_pages, 3);
/// assert_eq!(p.offset, 20);
///
/// // Requesting out-of-bounds page gets clamped
/// let p = calculate_pagination(45, 99, 20);
/// assert_eq!(p.page, 3);
/// assert_eq!(p.offset, 40);
/// ```
pub fn calculate_pagination(total_results: i64, requested_page: i64, page_size: i64) -> Pagination {
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let total_pages = (total_results + page_size - 1) / page_size;
    let page = requested_page.max(1).min(total_pages.max(1));
    let offset = (page - 1) * page_size;

    Pagination {
        page,
        page_size,
        total_pages,
        offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_normal() {
        let p = calculate_pagination(250, 2, 100);
        assert_eq!(p.page, 2);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.offset, 100);
    }

    #[test]
    fn test_pagination_out_of_bounds_high() {
        let p = calculate_pagination(150, 99, 100);
        assert_eq!(p.page, 2); // Clamped to last page
        assert_eq!(p.total_pages, 2);
        assert_eq!(p.offset, 100);
    }

    #[test]
    fn test_pagination_out_of_bounds_low() {
        let p = calculate_pagination(150, 0, 100);
        assert_eq!(p.page, 1); // Clamped to first page
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_pagination_empty() {
        let p = calculate_pagination(0, 1, 20);
        assert_eq!(p.page, 1);
        assert_eq!(p.total_pages, 0);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_page_size_clamped() {
        let p = calculate_pagination(500, 1, 1000);
        assert_eq!(p.page_size, MAX_PAGE_SIZE);
        let p = calculate_pagination(500, 1, 0);
        assert_eq!(p.page_size, 1);
    }

    #[test]
    fn test_slice_last_page() {
        let p = calculate_pagination(45, 3, 20);
        let items: Vec<i32> = (0..45).collect();
        assert_eq!(p.slice(items), (40..45).collect::<Vec<_>>());
    }
}
