use serde::{Deserialize, Serialize};

use crate::{
    config::PaginationConfig,
    error::{Error, ErrorKind},
};

/// `limit`/`page` query parameters after defaults and bounds are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: i64,
    pub page: i64,
}

impl PageRequest {
    pub fn new(limit: Option<i64>, page: Option<i64>, config: &PaginationConfig) -> Self {
        let limit = limit
            .unwrap_or(config.page_size)
            .clamp(1, config.max_page_size.max(1));
        // page * limit must stay representable
        let page = page.unwrap_or(1).clamp(1, i64::MAX / limit);

        Self { limit, page }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct PageContext<T> {
    pub count: i64,
    pub next: Option<i64>,
    pub previous: Option<i64>,
    pub results: Vec<T>,
}

impl<T> PageContext<T> {
    pub fn from_rows(results: Vec<T>, total_rows: i64, request: &PageRequest) -> Self {
        let next = if request.page.saturating_mul(request.limit) < total_rows {
            Some(request.page + 1)
        } else {
            None
        };
        let previous = if request.page > 1 {
            Some(request.page - 1)
        } else {
            None
        };

        Self {
            count: total_rows,
            next,
            previous,
            results,
        }
    }

    /// Like [`PageContext::from_rows`], but a page past the last one is a 404
    /// instead of an empty page reporting zero rows.
    pub fn try_from_rows(
        results: Vec<T>,
        total_rows: i64,
        request: &PageRequest,
    ) -> Result<Self, Error> {
        if results.is_empty() && request.page > 1 {
            return Err(ErrorKind::NotFound.new("Invalid page"));
        }
        Ok(Self::from_rows(results, total_rows, request))
    }

    pub fn no_rows(request: &PageRequest) -> Self {
        Self::from_rows(vec![], 0, request)
    }

    pub fn page_count(&self, request: &PageRequest) -> i64 {
        (self.count + request.limit - 1) / request.limit
    }
}
