//! Common types used across the ledger

use serde::{Deserialize, Serialize};

/// Pagination parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    pub const MAX_PER_PAGE: u32 = 500;

    /// Row offset of the first item on this page
    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.limit())
    }

    /// Page size clamped to `1..=MAX_PER_PAGE`
    pub fn limit(&self) -> u32 {
        self.per_page.clamp(1, Self::MAX_PER_PAGE)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 50,
        }
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl PaginationMeta {
    pub fn new(pagination: Pagination, total_items: u64) -> Self {
        let per_page = pagination.limit();
        let total_pages = total_items.div_ceil(u64::from(per_page));
        Self {
            page: pagination.page.max(1),
            per_page,
            total_items,
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
        }
    }
}
