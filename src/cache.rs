use std::time::{Duration, Instant};

use dashmap::DashMap;
use url::Url;

use crate::data_models::Document;

pub const DEFAULT_TTL_SECS: u64 = 86_400;

struct CacheEntry {
    doc: Document,
    stored_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() >= ttl
    }
}

/// In-process page cache keyed by normalized URL. Entries older than the TTL
/// are treated as absent; a later put simply overwrites (last writer wins).
pub struct PageCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl Default for PageCache {
    fn default() -> Self {
        PageCache::new(Duration::from_secs(DEFAULT_TTL_SECS))
    }
}

impl PageCache {
    pub fn new(ttl: Duration) -> PageCache {
        PageCache {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, url: &str) -> Option<Document> {
        let key = normalize_url(url);
        if let Some(entry) = self.entries.get(&key) {
            if !entry.is_expired(self.ttl) {
                return Some(entry.doc.clone());
            }
        }
        // Stale or absent. The read guard is dropped before touching the
        // shard again, otherwise remove would deadlock.
        self.entries.remove(&key);
        None
    }

    pub fn put(&self, url: &str, doc: Document) {
        self.entries.insert(
            normalize_url(url),
            CacheEntry {
                doc,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Normalize a URL into a cache/visited key: fragment dropped, trailing slash
/// removed from non-root paths, lowercased. Unparseable input falls back to a
/// trimmed lowercase of the raw string so it still keys consistently.
pub fn normalize_url(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(mut url) => {
            url.set_fragment(None);
            let path = url.path().to_string();
            if path.len() > 1 && path.ends_with('/') {
                url.set_path(&path[..path.len() - 1]);
            }
            url.as_str().to_lowercase()
        }
        Err(_) => raw.trim().to_lowercase(),
    }
}
