//! Pagination primitives shared by every `list` query (§4.A: "max page
//! size 100"). Grounded on the teacher's `VALID_FILTERS`/`VALID_SORTS`
//! whitelist-const convention in `server/src/routes/sessions.rs`, pushed
//! down a layer so the whitelist lives next to the SQL that enforces it.

use faultline_core::config::MAX_PAGE_SIZE;

#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(MAX_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn parse(s: Option<&str>) -> Self {
        match s {
            Some("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped_to_max_page_size() {
        let req = PageRequest::new(Some(1), Some(10_000));
        assert_eq!(req.limit, MAX_PAGE_SIZE);
    }

    #[test]
    fn page_below_one_is_clamped_to_one() {
        let req = PageRequest::new(Some(0), Some(20));
        assert_eq!(req.page, 1);
        assert_eq!(req.offset(), 0);
    }

    #[test]
    fn offset_is_zero_indexed() {
        let req = PageRequest::new(Some(3), Some(20));
        assert_eq!(req.offset(), 40);
    }
}
