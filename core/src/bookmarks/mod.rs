//! Bookmarks scraped from one web page, cached with a timestamp.

pub mod browser;

pub use browser::{BrowserAutomation, PlaywrightBrowser, RawLink};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::config::ToolConfig;
use crate::settings::KeyValueStore;
use crate::time::now_millis;

pub const CACHE_KEY: &str = "wolai_bookmarks_cache";
pub const CACHE_FILE: &str = "cache.json";
const MAX_TITLE_UNITS: usize = 200;

#[derive(Debug, Error)]
pub enum BookmarkError {
    #[error("failed to fetch bookmarks: {0:#}")]
    Browser(anyhow::Error),
    #[error("failed to store the bookmark cache")]
    CacheWrite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkCacheRecord {
    pub bookmarks: Vec<Bookmark>,
    /// Unix milliseconds of the fetch.
    pub timestamp: i64,
}

impl BookmarkCacheRecord {
    /// Fresh while `now - timestamp < ttl`.
    pub fn is_stale(&self, now_ms: i64, ttl: Duration) -> bool {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.timestamp) >= ttl_ms
    }
}

/// What the bookmark view shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkView {
    pub bookmarks: Vec<Bookmark>,
    /// True when there is no cache or it is older than the TTL.
    pub stale: bool,
    pub fetched_at: Option<i64>,
}

/// Turn raw anchors into bookmarks: titles trimmed, only non-empty titles
/// shorter than 200 UTF-16 units, only `http(s)` URLs.
pub fn accept_link(link: RawLink) -> Option<Bookmark> {
    let title = link.title.trim();
    if title.is_empty() || title.encode_utf16().count() >= MAX_TITLE_UNITS {
        return None;
    }
    if link.url.is_empty() || !link.url.starts_with("http") {
        return None;
    }
    Some(Bookmark {
        title: title.to_string(),
        url: link.url,
    })
}

/// Keep the first position of each URL but the last entry seen for it.
pub fn dedupe(bookmarks: Vec<Bookmark>) -> Vec<Bookmark> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<Bookmark> = Vec::new();
    for bookmark in bookmarks {
        match slots.get(&bookmark.url) {
            Some(&index) => unique[index] = bookmark,
            None => {
                slots.insert(bookmark.url.clone(), unique.len());
                unique.push(bookmark);
            }
        }
    }
    unique
}

/// Case-insensitive title search; a blank query returns everything.
pub fn filter_by_title<'a>(bookmarks: &'a [Bookmark], query: &str) -> Vec<&'a Bookmark> {
    let query = query.trim();
    if query.is_empty() {
        return bookmarks.iter().collect();
    }
    let needle = query.to_lowercase();
    bookmarks
        .iter()
        .filter(|bookmark| bookmark.title.to_lowercase().contains(&needle))
        .collect()
}

pub struct BookmarkService<B: BrowserAutomation, S: KeyValueStore> {
    browser: B,
    store: S,
    source_url: String,
    wait: Duration,
    ttl: Duration,
}

impl<B: BrowserAutomation, S: KeyValueStore> BookmarkService<B, S> {
    pub fn new(browser: B, store: S, config: &ToolConfig) -> Self {
        Self {
            browser,
            store,
            source_url: config.bookmark_source_url.clone(),
            wait: Duration::from_millis(config.bookmark_wait_ms),
            ttl: Duration::from_secs(config.bookmark_cache_ttl_secs),
        }
    }

    pub fn cached_record(&self) -> Option<BookmarkCacheRecord> {
        let value = self.store.get(CACHE_KEY)?;
        match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!("ignoring unreadable bookmark cache: {}", err);
                None
            }
        }
    }

    /// Cached bookmarks as of `now_ms`. Stale data is still returned.
    pub fn load_cached_at(&self, now_ms: i64) -> BookmarkView {
        match self.cached_record() {
            Some(record) => BookmarkView {
                stale: record.is_stale(now_ms, self.ttl),
                fetched_at: Some(record.timestamp),
                bookmarks: record.bookmarks,
            },
            None => BookmarkView {
                bookmarks: Vec::new(),
                stale: true,
                fetched_at: None,
            },
        }
    }

    pub fn load_cached(&self) -> BookmarkView {
        self.load_cached_at(now_millis())
    }

    /// Scrape the source page again and replace the cache.
    pub async fn refresh(&self) -> Result<BookmarkView, BookmarkError> {
        let raw = self
            .browser
            .extract_links(&self.source_url, self.wait)
            .await
            .map_err(BookmarkError::Browser)?;
        let total = raw.len();
        let bookmarks = dedupe(raw.into_iter().filter_map(accept_link).collect());
        info!(
            "fetched {} bookmark(s) from {} anchors on {}",
            bookmarks.len(),
            total,
            self.source_url
        );

        let record = BookmarkCacheRecord {
            bookmarks,
            timestamp: now_millis(),
        };
        let value = serde_json::to_value(&record).map_err(|_| BookmarkError::CacheWrite)?;
        if !self.store.set(CACHE_KEY, value) {
            return Err(BookmarkError::CacheWrite);
        }

        Ok(BookmarkView {
            stale: false,
            fetched_at: Some(record.timestamp),
            bookmarks: record.bookmarks,
        })
    }
}
