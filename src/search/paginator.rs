//! Page-oriented access to a [`SearchQuery`].
//!
//! Each page is one backend window: `offset = (number - 1) * per_page`,
//! `limit = per_page`, executed without exhausting.

use crate::backend::Hit;
use crate::config::SearchSyncConfig;
use crate::error::PaginationError;

use super::query::SearchQuery;

/// Splits a query's hits into numbered pages, starting at 1.
#[derive(Debug)]
pub struct Paginator {
    query: SearchQuery,
    per_page: usize,
    allow_empty_first_page: bool,
}

impl Paginator {
    pub fn new(query: SearchQuery, per_page: usize) -> Self {
        Self {
            query,
            per_page: per_page.max(1),
            allow_empty_first_page: true,
        }
    }

    /// Paginator using the configured empty-first-page default.
    pub fn with_config(query: SearchQuery, per_page: usize, config: &SearchSyncConfig) -> Self {
        Self::new(query, per_page).allow_empty_first_page(config.allow_empty_first_page)
    }

    pub fn allow_empty_first_page(mut self, allow: bool) -> Self {
        self.allow_empty_first_page = allow;
        self
    }

    pub fn per_page(&self) -> usize {
        self.per_page
    }

    pub fn query(&self) -> &SearchQuery {
        &self.query
    }

    /// Total hits reported by the last page fetch.
    pub fn count(&self) -> usize {
        self.query.count()
    }

    /// Page count for the last reported total.
    pub fn num_pages(&self) -> usize {
        let count = self.count();
        if count == 0 && !self.allow_empty_first_page {
            return 0;
        }
        count.div_ceil(self.per_page).max(1)
    }

    /// Parse a page number as received from a caller, e.g. a query string.
    /// Integral floats such as `"2.0"` are accepted as a convenience for
    /// callers that serialize numbers as floats.
    pub fn validate_number(number: &str) -> Result<usize, PaginationError> {
        let number = number.trim();
        let parsed = match number.parse::<i64>() {
            Ok(n) => n,
            Err(_) => match number.parse::<f64>() {
                Ok(f) if f.is_finite() && f.fract() == 0.0 => f as i64,
                _ => return Err(PaginationError::PageNotAnInteger),
            },
        };
        if parsed < 1 {
            return Err(PaginationError::EmptyPage("That page number is less than 1".into()));
        }
        Ok(parsed as usize)
    }

    /// Fetch page `number`, given as text.
    pub async fn page(&mut self, number: &str) -> Result<Page, PaginationError> {
        let number = Self::validate_number(number)?;
        self.page_at(number).await
    }

    /// Fetch page `number`.
    pub async fn page_at(&mut self, number: usize) -> Result<Page, PaginationError> {
        if number < 1 {
            return Err(PaginationError::EmptyPage("That page number is less than 1".into()));
        }

        let offset = (number - 1)
            .checked_mul(self.per_page)
            .ok_or_else(|| PaginationError::EmptyPage("That page contains no results".into()))?;

        self.query.clear_cache();
        self.query.paginate(offset, self.per_page);
        self.query.execute(false).await?;

        let num_pages = self.num_pages();
        if number > num_pages && !(number == 1 && self.allow_empty_first_page) {
            return Err(PaginationError::EmptyPage("That page contains no results".into()));
        }

        Ok(Page {
            number,
            per_page: self.per_page,
            total: self.count(),
            num_pages,
            hits: self.query.result().hits().to_vec(),
        })
    }
}

/// One page of hits.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub number: usize,
    pub per_page: usize,
    /// Total hits across all pages.
    pub total: usize,
    pub num_pages: usize,
    pub hits: Vec<Hit>,
}

impl Page {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Hit> {
        self.hits.iter()
    }

    pub fn pks(&self) -> Vec<String> {
        self.hits.iter().map(|h| h.pk.clone()).collect()
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_other_pages(&self) -> bool {
        self.has_next() || self.has_previous()
    }

    pub fn next_page_number(&self) -> Option<usize> {
        self.has_next().then_some(self.number + 1)
    }

    pub fn previous_page_number(&self) -> Option<usize> {
        self.has_previous().then(|| self.number - 1)
    }

    /// 1-based position of the first hit on this page; 0 when empty.
    pub fn start_index(&self) -> usize {
        if self.total == 0 {
            return 0;
        }
        (self.number - 1) * self.per_page + 1
    }

    /// 1-based position of the last hit on this page.
    pub fn end_index(&self) -> usize {
        if self.number == self.num_pages {
            return self.total;
        }
        self.number * self.per_page
    }
}

impl std::fmt::Display for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Page {} of {}>", self.number, self.num_pages)
    }
}
