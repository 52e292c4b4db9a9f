use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::data_models::{CrawlJob, CrawlMode, FeedCheckSummary};
use crate::db::FeedCheckRepo;
use crate::feed::parse_feed;
use crate::fetcher::{FetchStrategy, PlainFetcher};
use crate::jobs::JobQueue;
use crate::scorer::{KeywordWeights, ScoredEntry, score_entry};

/// Outcome of scoring one feed. `high_score_items` keeps the feed's own
/// order, not score order.
#[derive(Serialize, Debug, Clone)]
pub struct FeedCheckReport {
    pub success: bool,
    pub feed_url: String,
    pub feed_title: String,
    pub total_items: usize,
    pub high_score_items: Vec<ScoredEntry>,
    pub error: Option<String>,
}

impl FeedCheckReport {
    fn failure(feed_url: &str, error: String) -> FeedCheckReport {
        FeedCheckReport {
            success: false,
            feed_url: feed_url.to_string(),
            feed_title: String::new(),
            total_items: 0,
            high_score_items: Vec::new(),
            error: Some(error),
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct DispatchFailure {
    pub link: String,
    pub error: String,
}

/// What happened to each high-scoring entry during dispatch: the job ids that
/// made it onto the queue and the entries that could not be queued.
#[derive(Serialize, Debug, Clone, Default)]
pub struct DispatchSummary {
    pub dispatched: Vec<String>,
    pub failed: Vec<DispatchFailure>,
}

/// Fetches feeds, scores their entries against the keyword weights, and
/// dispatches crawl jobs for entries at or above the threshold. Feeds are
/// plain HTTP only, no fallback chain.
pub struct FeedChecker {
    fetch: PlainFetcher,
    weights: KeywordWeights,
}

impl FeedChecker {
    pub fn new(fetch: PlainFetcher, weights: KeywordWeights) -> FeedChecker {
        FeedChecker { fetch, weights }
    }

    /// Fetches and scores a feed. Entries scoring at or above `threshold`
    /// land in the report in feed order; fetch problems come back as a failed
    /// report rather than an error.
    pub async fn check_feed(&self, feed_url: &str, threshold: f64) -> FeedCheckReport {
        log::info!("checking feed: {feed_url}");

        let parsed = match Url::parse(feed_url) {
            Ok(u) if u.scheme() == "http" || u.scheme() == "https" => u,
            _ => {
                return FeedCheckReport::failure(feed_url, format!("invalid feed url: {feed_url}"));
            }
        };
        let raw = match self.fetch.fetch(&parsed).await {
            Ok(raw) => raw,
            Err(e) => return FeedCheckReport::failure(feed_url, e.to_string()),
        };
        if raw.body.trim().is_empty() {
            return FeedCheckReport::failure(feed_url, format!("empty body from {feed_url}"));
        }

        let feed = parse_feed(&raw.body);
        let total_items = feed.entries.len();
        let mut high_score_items = Vec::new();
        for entry in feed.entries {
            let score = score_entry(&entry, &self.weights);
            if score >= threshold {
                high_score_items.push(ScoredEntry { entry, score });
            }
        }

        log::info!(
            "feed {feed_url}: {total_items} items, {} at or above {threshold}",
            high_score_items.len()
        );
        FeedCheckReport {
            success: true,
            feed_url: feed_url.to_string(),
            feed_title: feed.title,
            total_items,
            high_score_items,
            error: None,
        }
    }

    /// Checks a feed and queues a manual crawl job per high-scoring entry.
    /// Jobs carry the entry's score and title and name the feed as their
    /// source. Entries without a link are recorded as dispatch failures.
    pub async fn check_and_dispatch(
        &self,
        feed_url: &str,
        threshold: f64,
        queue: &dyn JobQueue,
    ) -> (FeedCheckReport, DispatchSummary) {
        let report = self.check_feed(feed_url, threshold).await;
        let mut summary = DispatchSummary::default();
        if !report.success {
            return (report, summary);
        }

        let source = if report.feed_title.is_empty() {
            report.feed_url.clone()
        } else {
            report.feed_title.clone()
        };

        for scored in &report.high_score_items {
            let link = scored.entry.link.trim();
            if link.is_empty() {
                summary.failed.push(DispatchFailure {
                    link: String::new(),
                    error: "feed entry has no link".to_string(),
                });
                continue;
            }

            let mut job = CrawlJob::new(link.to_string(), CrawlMode::Manual, 0, source.clone());
            job.score = Some(scored.score);
            job.title = Some(scored.entry.title.clone());
            match queue.enqueue(job).await {
                Ok(id) => {
                    log::info!("dispatched crawl job {id} for {link}");
                    summary.dispatched.push(id);
                }
                Err(e) => {
                    log::error!("failed to dispatch job for {link}, error: {:#}", e);
                    summary.failed.push(DispatchFailure {
                        link: link.to_string(),
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        (report, summary)
    }

    /// Checks every feed on a fixed interval until cancelled. The first round
    /// runs immediately. Check outcomes are stored when a repo is provided.
    pub async fn run_scheduled(
        &self,
        feeds: &[String],
        threshold: f64,
        interval: Duration,
        queue: &dyn JobQueue,
        feed_checks: Option<&FeedCheckRepo>,
        cancel: &CancellationToken,
    ) {
        if feeds.is_empty() {
            log::warn!("no feeds configured, feed watcher idle");
        }

        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("feed watcher stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            for feed_url in feeds {
                if cancel.is_cancelled() {
                    log::info!("feed watcher stopped");
                    return;
                }
                let (report, summary) = self.check_and_dispatch(feed_url, threshold, queue).await;
                log::info!(
                    "checked feed {feed_url}: {} items, {} high-scoring, {} dispatched",
                    report.total_items,
                    report.high_score_items.len(),
                    summary.dispatched.len()
                );

                if report.success {
                    if let Some(repo) = feed_checks {
                        let row = FeedCheckSummary::new(
                            report.feed_url.clone(),
                            report.feed_title.clone(),
                            report.total_items,
                            report.high_score_items.len(),
                            summary.dispatched.len(),
                        );
                        if let Err(e) = repo.insert(&row).await {
                            log::error!("error storing feed check, error: {:#}", e);
                        }
                    }
                }
            }
        }
    }
}
