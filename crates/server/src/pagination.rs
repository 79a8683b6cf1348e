//! Shared pagination response envelope (§4.A) for every list endpoint.
//!
//! `faultline_db::page::Page<T>` carries no `serde` derive of its own since
//! it's a storage-layer type; every route that lists something wraps it in
//! this response shape before handing it to `Json`.

use serde::Serialize;

use faultline_db::page::{Page, PageRequest, SortOrder};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

impl<T> From<Page<T>> for PageResponse<T> {
    fn from(page: Page<T>) -> Self {
        Self {
            items: page.items,
            total: page.total,
            page: page.page,
            limit: page.limit,
        }
    }
}

pub fn page_request(page: Option<i64>, limit: Option<i64>) -> PageRequest {
    PageRequest::new(page, limit)
}

pub fn sort_order(order: Option<&str>) -> SortOrder {
    SortOrder::parse(order)
}
