use mongodb::bson::{DateTime, oid::ObjectId};
use nanoid::nanoid;
use serde::{Deserialize, Serialize};

/// Which fetch strategy produced a document's markup.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FetchMethod {
    Fetch,
    Render,
    Proxy,
}

impl FetchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchMethod::Fetch => "fetch",
            FetchMethod::Render => "render",
            FetchMethod::Proxy => "proxy",
        }
    }
}

/// One crawled page after extraction. Immutable once built; a re-fetch of the
/// same URL produces a fresh value.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub url: String,
    pub title: String,
    pub body: String,
    pub links: Vec<String>,
    pub method: FetchMethod,
    pub content_type: Option<String>,
    pub bytes: usize,
    pub depth: u32,
    pub fetched_at: DateTime,
}

impl Document {
    pub fn new(
        url: String,
        title: String,
        body: String,
        links: Vec<String>,
        method: FetchMethod,
        content_type: Option<String>,
        bytes: usize,
        depth: u32,
    ) -> Document {
        Document {
            id: ObjectId::new(),
            url,
            title,
            body,
            links,
            method,
            content_type,
            bytes,
            depth,
            fetched_at: DateTime::now(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CrawlMode {
    Recursive,
    Manual,
}

impl CrawlMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlMode::Recursive => "recursive",
            CrawlMode::Manual => "manual",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }
}

/// A unit of crawl work, either submitted directly or dispatched from a feed
/// check. `source` records where the job came from ("api", "cli", or a feed
/// title); `score`/`title` carry feed provenance when present.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CrawlJob {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub job_id: String,
    pub url: String,
    pub mode: CrawlMode,
    pub depth: u32,
    pub source: String,
    pub score: Option<f64>,
    pub title: Option<String>,
    pub status: JobStatus,
    pub error: Option<String>,
    pub created_at: DateTime,
}

impl CrawlJob {
    pub fn new(url: String, mode: CrawlMode, depth: u32, source: String) -> CrawlJob {
        CrawlJob {
            id: ObjectId::new(),
            job_id: nanoid!(),
            url,
            mode,
            depth,
            source,
            score: None,
            title: None,
            status: JobStatus::Pending,
            error: None,
            created_at: DateTime::now(),
        }
    }
}

/// Stored outcome of one feed check, one row per run.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FeedCheckSummary {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub feed_url: String,
    pub feed_title: String,
    pub total_items: usize,
    pub high_score_count: usize,
    pub dispatched: usize,
    pub checked_at: DateTime,
}

impl FeedCheckSummary {
    pub fn new(
        feed_url: String,
        feed_title: String,
        total_items: usize,
        high_score_count: usize,
        dispatched: usize,
    ) -> FeedCheckSummary {
        FeedCheckSummary {
            id: ObjectId::new(),
            feed_url,
            feed_title,
            total_items,
            high_score_count,
            dispatched,
            checked_at: DateTime::now(),
        }
    }
}
