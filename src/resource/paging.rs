//! Offset paging over fully-materialized result lists.

use std::collections::HashMap;

use crate::config::PagingConfig;

/// The slice of results a request asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub start_index: usize,
    pub limit: usize,
}

impl Paging {
    /// Read `startIndex` and `limit` from query parameters.
    ///
    /// Missing or unparseable values fall back to the configured defaults, and
    /// `limit` is clamped to `1..=max_limit`.
    pub fn from_params(params: &HashMap<String, String>, config: &PagingConfig) -> Self {
        let start_index = params
            .get("startIndex")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let limit = params
            .get("limit")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(config.default_limit)
            .clamp(1, config.max_limit.max(1));

        Self { start_index, limit }
    }
}

impl Default for Paging {
    fn default() -> Self {
        let config = PagingConfig::default();
        Self {
            start_index: 0,
            limit: config.default_limit,
        }
    }
}

/// A complete result list that still has to be cut down to one page.
#[derive(Debug, Clone)]
pub struct NeedsPaging<T> {
    items: Vec<T>,
    paging: Paging,
}

impl<T> NeedsPaging<T> {
    pub fn new(items: Vec<T>, paging: Paging) -> Self {
        Self { items, paging }
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    pub fn into_page(self) -> Page<T> {
        let Paging { start_index, limit } = self.paging;
        let total = self.items.len();
        let has_more = start_index.saturating_add(limit) < total;
        let results = self.items.into_iter().skip(start_index).take(limit).collect();

        Page {
            results,
            start_index,
            limit,
            has_more,
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub start_index: usize,
    pub limit: usize,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn has_previous(&self) -> bool {
        self.start_index > 0
    }

    pub fn next_start_index(&self) -> usize {
        self.start_index + self.limit
    }

    pub fn previous_start_index(&self) -> usize {
        self.start_index.saturating_sub(self.limit)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            results: self.results.into_iter().map(f).collect(),
            start_index: self.start_index,
            limit: self.limit,
            has_more: self.has_more,
        }
    }
}
