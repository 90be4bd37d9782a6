//! Query options shared by every listing operation.
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
/// Page size meaning "every matching row", still reporting a total.
pub const PAGE_SIZE_ALL: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Pagination {
    /// 1-based page index.
    pub current: u32,
    pub page_size: i64,
}

impl Pagination {
    pub fn all() -> Self {
        Self {
            current: 1,
            page_size: PAGE_SIZE_ALL,
        }
    }

    pub fn page(current: u32, page_size: i64) -> Self {
        Self { current, page_size }
    }

    /// `(offset, limit)` to apply, or `None` when every row is requested.
    pub fn window(&self) -> Option<(usize, usize)> {
        if self.page_size == PAGE_SIZE_ALL {
            return None;
        }
        let size = if self.page_size <= 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.page_size
        } as usize;
        let current = self.current.max(1) as usize;
        Some(((current - 1) * size, size))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PageResult {
    pub total: u64,
    pub current: u32,
    pub page_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult<T> {
    pub data: Vec<T>,
    pub page: Option<PageResult>,
}

impl<T> QueryResult<T> {
    pub fn unpaged(data: Vec<T>) -> Self {
        Self { data, page: None }
    }

    /// Apply `pagination` to the complete, already ordered match list.
    pub fn paginate(rows: Vec<T>, pagination: Option<Pagination>) -> Self {
        let Some(pagination) = pagination else {
            return Self::unpaged(rows);
        };
        let total = rows.len() as u64;
        let data = match pagination.window() {
            None => rows,
            Some((offset, limit)) => rows.into_iter().skip(offset).take(limit).collect(),
        };
        Self {
            data,
            page: Some(PageResult {
                total,
                current: pagination.current.max(1),
                page_size: pagination.page_size,
            }),
        }
    }

    /// Wrap a page the backend already sliced, given the unpaged match count.
    pub fn with_total(data: Vec<T>, total: u64, pagination: Option<Pagination>) -> Self {
        Self {
            data,
            page: pagination.map(|pagination| PageResult {
                total,
                current: pagination.current.max(1),
                page_size: pagination.page_size,
            }),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> QueryResult<U> {
        QueryResult {
            data: self.data.into_iter().map(f).collect(),
            page: self.page,
        }
    }
}

/// What to load alongside the primary rows, and how to page them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub include_actions: bool,
    pub include_resources: bool,
    pub include_menus: bool,
    pub include_roles: bool,
    pub pagination: Option<Pagination>,
}

impl QueryOptions {
    pub fn paged(pagination: Option<Pagination>) -> Self {
        Self {
            pagination,
            ..Self::default()
        }
    }

    pub fn with_children() -> Self {
        Self {
            include_actions: true,
            include_resources: true,
            include_menus: true,
            include_roles: true,
            pagination: None,
        }
    }
}
