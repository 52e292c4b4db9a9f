use serde::{Deserialize, Serialize};

use crate::checker::{DispatchSummary, FeedCheckReport};
use crate::crawler::CrawlReport;

#[derive(Debug, Deserialize)]
pub struct CrawlRequest {
    pub url: String,
    /// "manual" (default) or "recursive".
    pub mode: Option<String>,
    pub depth: Option<u32>,
}

/// Crawl report plus anything that went wrong while storing it. A store
/// failure never fails the crawl itself.
#[derive(Debug, Serialize)]
pub struct CrawlResult {
    #[serde(flatten)]
    pub report: CrawlReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CrawlResponse {
    pub success: bool,
    pub job_id: String,
    pub mode: String,
    pub result: CrawlResult,
}

#[derive(Debug, Deserialize)]
pub struct FeedCheckRequest {
    pub feed_url: String,
    pub threshold: Option<f64>,
    #[serde(default)]
    pub dispatch: bool,
}

#[derive(Debug, Serialize)]
pub struct FeedCheckResponse {
    pub success: bool,
    pub result: FeedCheckReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<DispatchSummary>,
}
