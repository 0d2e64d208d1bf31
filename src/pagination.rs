//! Page/limit query parameters and the pagination block of list responses.

use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

/// Raw `?page=&limit=` query. Missing or out-of-range values are clamped
/// instead of rejected.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl PageParams {
    pub fn resolve(self) -> Page {
        self.resolve_with_default(DEFAULT_LIMIT)
    }

    pub fn resolve_with_default(self, default_limit: i64) -> Page {
        let page = self.page.filter(|p| *p >= 1).unwrap_or(1);
        let limit = self
            .limit
            .filter(|l| *l >= 1)
            .unwrap_or(default_limit)
            .min(MAX_LIMIT);
        Page { page, limit }
    }
}

impl Page {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRef {
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<PageRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<PageRef>,
}

impl Pagination {
    pub fn new(page: Page, total: i64) -> Self {
        let total_pages = if total <= 0 {
            0
        } else {
            (total + page.limit - 1) / page.limit
        };
        let next = (page.offset() + page.limit < total).then_some(PageRef {
            page: page.page + 1,
            limit: page.limit,
        });
        let prev = (page.page > 1).then_some(PageRef {
            page: page.page - 1,
            limit: page.limit,
        });
        Self {
            page: page.page,
            limit: page.limit,
            total,
            total_pages,
            next,
            prev,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_clamping() {
        assert_eq!(PageParams::default().resolve(), Page { page: 1, limit: 10 });
        let p = PageParams {
            page: Some(0),
            limit: Some(1000),
        }
        .resolve();
        assert_eq!(p, Page { page: 1, limit: MAX_LIMIT });
        let p = PageParams {
            page: Some(3),
            limit: Some(-5),
        }
        .resolve_with_default(20);
        assert_eq!(p, Page { page: 3, limit: 20 });
        assert_eq!(p.offset(), 40);
    }

    #[test]
    fn test_first_page_has_next_only() {
        let p = Pagination::new(Page { page: 1, limit: 10 }, 25);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.next, Some(PageRef { page: 2, limit: 10 }));
        assert_eq!(p.prev, None);
    }

    #[test]
    fn test_last_page_has_prev_only() {
        let p = Pagination::new(Page { page: 3, limit: 10 }, 25);
        assert_eq!(p.next, None);
        assert_eq!(p.prev, Some(PageRef { page: 2, limit: 10 }));
    }

    #[test]
    fn test_empty_result() {
        let p = Pagination::new(Page { page: 1, limit: 10 }, 0);
        assert_eq!(p.total_pages, 0);
        assert_eq!(p.next, None);
        assert_eq!(p.prev, None);
    }

    #[test]
    fn test_serializes_camel_case_and_skips_missing_links() {
        let value = serde_json::to_value(Pagination::new(Page { page: 1, limit: 10 }, 5)).unwrap();
        assert_eq!(value["totalPages"], 1);
        assert!(value.get("next").is_none());
    }
}
