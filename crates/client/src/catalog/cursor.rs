//! Incremental pagination over the listing endpoint.

use std::collections::HashSet;

use super::CatalogClient;
use super::types::NamedResource;
use crate::fetch::FetchError;

/// Accumulates listing pages, dropping entries already seen by name.
#[derive(Debug, Clone)]
pub struct ListCursor {
    limit: u32,
    offset: u32,
    items: Vec<NamedResource>,
    seen: HashSet<String>,
    has_next_page: bool,
    total: Option<u64>,
}

impl ListCursor {
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            offset: 0,
            items: Vec::new(),
            seen: HashSet::new(),
            has_next_page: true,
            total: None,
        }
    }

    /// Load the next page and append its new entries.
    ///
    /// Returns how many entries were added. After the last page this is a
    /// no-op returning zero. On failure nothing changes, so calling again
    /// retries the same page.
    pub async fn load_more(&mut self, catalog: &CatalogClient) -> Result<usize, FetchError> {
        if !self.has_next_page {
            return Ok(0);
        }

        let page = catalog.list(self.limit, self.offset).await?;
        let before = self.items.len();
        for item in page.results {
            if self.seen.insert(item.name.clone()) {
                self.items.push(item);
            }
        }

        self.offset += self.limit;
        self.has_next_page = page.next.is_some();
        self.total = Some(page.count);

        let added = self.items.len() - before;
        tracing::debug!(offset = self.offset, added, has_next = self.has_next_page, "page loaded");
        Ok(added)
    }

    pub fn items(&self) -> &[NamedResource] {
        &self.items
    }

    pub fn has_next_page(&self) -> bool {
        self.has_next_page
    }

    /// Offset of the next page to load.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Total reported by the most recent page.
    pub fn total(&self) -> Option<u64> {
        self.total
    }
}
