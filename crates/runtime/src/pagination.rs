use promptlab_database::QueryCriteria;
use serde::Serialize;

use crate::{Result, RuntimeError};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// A validated 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub size: i64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: DEFAULT_PAGE, size: DEFAULT_PAGE_SIZE }
    }
}

impl PageRequest {
    pub fn new(page: Option<i64>, size: Option<i64>) -> Result<Self> {
        let page = page.unwrap_or(DEFAULT_PAGE);
        let size = size.unwrap_or(DEFAULT_PAGE_SIZE);

        if page < 1 {
            return Err(RuntimeError::bad_request(format!("page must be at least 1, got {}", page)));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&size) {
            return Err(RuntimeError::bad_request(format!(
                "size must be between 1 and {}, got {}", MAX_PAGE_SIZE, size
            )));
        }
        if (page - 1).checked_mul(size).is_none() {
            return Err(RuntimeError::bad_request(format!("page {} is out of range for size {}", page, size)));
        }
        Ok(Self { page, size })
    }

    pub fn limit(&self) -> i64 {
        self.size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.size
    }

    pub fn apply(&self, criteria: QueryCriteria) -> QueryCriteria {
        criteria.limit(self.limit()).offset(self.offset())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub size: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: i64) -> Self {
        let total_pages = if total > 0 {
            (total + request.size - 1) / request.size
        } else {
            1
        };

        Self {
            items,
            page: request.page,
            size: request.size,
            total,
            total_pages,
            has_next: request.page < total_pages,
            has_prev: request.page > 1,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total: self.total,
            total_pages: self.total_pages,
            has_next: self.has_next,
            has_prev: self.has_prev,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_result_is_one_page() {
        let page: Page<u8> = Page::new(vec![], PageRequest::default(), 0);
        assert_eq!(page.total_pages, 1);
        assert!(!page.has_next);
        assert!(!page.has_prev);
        assert!(page.items.is_empty());
    }

    #[test]
    fn last_partial_page() {
        let request = PageRequest::new(Some(3), Some(10)).unwrap();
        let page = Page::new(vec![21, 22, 23, 24, 25], request, 25);
        assert_eq!(page.total_pages, 3);
        assert!(!page.has_next);
        assert!(page.has_prev);
    }

    #[test]
    fn middle_page_has_both_neighbours() {
        let request = PageRequest::new(Some(2), Some(10)).unwrap();
        let page = Page::new(vec![0; 10], request, 30);
        assert!(page.has_next);
        assert!(page.has_prev);
        assert_eq!(request.offset(), 10);
        assert_eq!(request.limit(), 10);
    }

    #[test]
    fn exact_multiple_does_not_add_a_page() {
        let page: Page<u8> = Page::new(vec![], PageRequest::new(Some(1), Some(5)).unwrap(), 20);
        assert_eq!(page.total_pages, 4);
    }

    #[test]
    fn defaults_apply_when_absent() {
        assert_eq!(PageRequest::new(None, None).unwrap(), PageRequest { page: 1, size: 10 });
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(matches!(PageRequest::new(Some(0), None), Err(RuntimeError::BadRequest(_))));
        assert!(matches!(PageRequest::new(None, Some(0)), Err(RuntimeError::BadRequest(_))));
        assert!(matches!(PageRequest::new(None, Some(101)), Err(RuntimeError::BadRequest(_))));
        assert!(PageRequest::new(None, Some(100)).is_ok());
    }

    #[test]
    fn page_whose_offset_overflows_is_rejected() {
        assert!(matches!(PageRequest::new(Some(i64::MAX), Some(100)), Err(RuntimeError::BadRequest(_))));
        assert!(matches!(PageRequest::new(Some(i64::MAX / 2), Some(3)), Err(RuntimeError::BadRequest(_))));

        let largest = PageRequest::new(Some(i64::MAX / 100 + 1), Some(100)).unwrap();
        assert_eq!(largest.offset(), (i64::MAX / 100) * 100);
    }

    #[test]
    fn map_keeps_metadata() {
        let page = Page::new(vec![1, 2], PageRequest::default(), 2).map(|n| n * 10);
        assert_eq!(page.items, vec![10, 20]);
        assert_eq!(page.total, 2);
    }
}
