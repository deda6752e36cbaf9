//! List filters shared by every entity type

use super::EntityKind;

/// Narrowing applied to a list request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Substring match on code or name (server-side)
    pub search: Option<String>,
    /// Parent record (factory of a line, line of a team, ...)
    pub parent_id: Option<String>,
    /// Only active (`Some(true)`) or inactive (`Some(false)`) records
    pub active: Option<bool>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

impl ListFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Query parameters for `kind`, omitting unset fields. Also the cache-key
    /// input, so equal filters always share a cache entry.
    pub fn to_params(&self, kind: EntityKind) -> Vec<(&'static str, String)> {
        let mut params = vec![];
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            params.push(("search", search.to_string()));
        }
        if let (Some(parent), Some(param)) = (self.parent_id.as_ref(), kind.parent_param()) {
            params.push((param, parent.clone()));
        }
        if let Some(active) = self.active {
            params.push(("isActive", active.to_string()));
        }
        if let Some(page) = self.page {
            params.push(("page", page.to_string()));
        }
        if let Some(size) = self.page_size {
            params.push(("pageSize", size.to_string()));
        }
        params
    }
}
