use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::cache::{PageCache, normalize_url};
use crate::data_models::Document;
use crate::extractor::Extractor;
use crate::fetcher::FetchChain;

/// One URL the crawl gave up on, with the final error message.
#[derive(Serialize, Debug, Clone)]
pub struct CrawlFailure {
    pub url: String,
    pub error: String,
}

/// Outcome of one crawl run. `success` means at least one page came back, or
/// nothing failed at all; a run where every URL failed reports the last
/// failure in `error`.
#[derive(Serialize, Debug, Clone)]
pub struct CrawlReport {
    pub success: bool,
    pub pages_crawled: usize,
    pub pages: Vec<Document>,
    pub failed: Vec<CrawlFailure>,
    pub error: Option<String>,
}

impl CrawlReport {
    fn build(pages: Vec<Document>, failed: Vec<CrawlFailure>) -> CrawlReport {
        let success = !pages.is_empty() || failed.is_empty();
        let error = if success {
            None
        } else {
            failed.last().map(|f| f.error.clone())
        };
        CrawlReport {
            success,
            pages_crawled: pages.len(),
            pages,
            failed,
            error,
        }
    }
}

/// Depth-bounded breadth-first crawler over the fetch chain. Stays on the
/// start URL's site, consults the shared page cache before going to the
/// network, and spaces out network fetches by a fixed delay.
pub struct Crawler {
    chain: FetchChain,
    extractor: Extractor,
    cache: Arc<PageCache>,
    max_pages: usize,
    request_delay: Duration,
}

impl Crawler {
    pub fn new(
        chain: FetchChain,
        extractor: Extractor,
        cache: Arc<PageCache>,
        max_pages: usize,
        request_delay: Duration,
    ) -> Crawler {
        Crawler {
            chain,
            extractor,
            cache,
            max_pages,
            request_delay,
        }
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    /// Crawls from `start_url` up to `max_depth` link hops. A `max_depth` of
    /// zero fetches only the start URL. Individual page failures are
    /// collected, never fatal; cancellation returns the partial report.
    pub async fn crawl(
        &self,
        start_url: &str,
        max_depth: u32,
        cancel: &CancellationToken,
    ) -> CrawlReport {
        let mut pages: Vec<Document> = Vec::new();
        let mut failed: Vec<CrawlFailure> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: VecDeque<(String, u32)> = VecDeque::new();
        frontier.push_back((start_url.to_string(), 0));

        let start_host = host_of(start_url);
        let mut fetched_any = false;

        while let Some((url, depth)) = frontier.pop_front() {
            if pages.len() >= self.max_pages {
                log::info!("page cap of {} reached, stopping", self.max_pages);
                break;
            }
            if cancel.is_cancelled() {
                log::info!("crawl cancelled, returning partial report");
                break;
            }
            if !visited.insert(normalize_url(&url)) {
                continue;
            }

            if let Some(doc) = self.cache.get(&url) {
                log::info!("cache hit for {url}");
                enqueue_links(
                    &doc.links,
                    depth,
                    max_depth,
                    start_host.as_deref(),
                    &visited,
                    &mut frontier,
                );
                pages.push(doc);
                continue;
            }

            // Space out network fetches; cache hits above skip the delay.
            if fetched_any && !self.request_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        log::info!("crawl cancelled, returning partial report");
                        break;
                    }
                    _ = tokio::time::sleep(self.request_delay) => {}
                }
            }
            fetched_any = true;

            log::info!("crawling url: {url}");
            let fetched = tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("crawl cancelled mid-fetch for {url}");
                    break;
                }
                res = self.chain.fetch(&url) => res,
            };

            match fetched {
                Ok((raw, method)) => {
                    let base = match Url::parse(&url) {
                        Ok(base) => base,
                        Err(e) => {
                            failed.push(CrawlFailure {
                                url: url.clone(),
                                error: format!("invalid url: {e}"),
                            });
                            continue;
                        }
                    };
                    let extraction = self.extractor.extract(&base, &raw.body);
                    let doc = Document::new(
                        url.clone(),
                        extraction.title,
                        extraction.body,
                        extraction.links,
                        method,
                        raw.content_type,
                        raw.body.len(),
                        depth,
                    );
                    self.cache.put(&url, doc.clone());
                    enqueue_links(
                        &doc.links,
                        depth,
                        max_depth,
                        start_host.as_deref(),
                        &visited,
                        &mut frontier,
                    );
                    pages.push(doc);
                }
                Err(e) => {
                    log::warn!("failed to crawl {url}: {e}");
                    failed.push(CrawlFailure {
                        url: url.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        CrawlReport::build(pages, failed)
    }
}

/// Links are followed only while the current page sits above the depth bound,
/// and only when they stay on the start site. Off-site links still appear in
/// each page's link list, they are just never enqueued.
fn enqueue_links(
    links: &[String],
    depth: u32,
    max_depth: u32,
    start_host: Option<&str>,
    visited: &HashSet<String>,
    frontier: &mut VecDeque<(String, u32)>,
) {
    if depth >= max_depth {
        return;
    }
    let Some(start_host) = start_host else {
        return;
    };
    for link in links {
        let Some(host) = host_of(link) else {
            continue;
        };
        if !same_site(&host, start_host) {
            continue;
        }
        if visited.contains(&normalize_url(link)) {
            continue;
        }
        frontier.push_back((link.clone(), depth + 1));
    }
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

/// Hosts count as the same site when they are equal or one is a dot-suffix of
/// the other, so `blog.example.com` matches `example.com` but
/// `notexample.com` does not.
pub fn same_site(a: &str, b: &str) -> bool {
    a == b || a.ends_with(&format!(".{b}")) || b.ends_with(&format!(".{a}"))
}
