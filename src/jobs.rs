use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use mongodb::options::ReturnDocument;
use mongodb::{Collection, bson::doc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::crawler::Crawler;
use crate::data_models::{CrawlJob, CrawlMode, JobStatus};
use crate::db::{Database, DocumentRepo};

const CLAIM_BATCH_SIZE: usize = 4;

/// Crawl job lifecycle: enqueue as pending, claim flips pending to running,
/// then complete or fail. Implementations are shared across the API handlers,
/// the feed checker, and the worker.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Stores the job exactly as given and returns its job id. Callers that
    /// run a job inline pre-mark it done or failed so the worker never
    /// claims it.
    async fn enqueue(&self, job: CrawlJob) -> Result<String>;

    /// Claims up to `limit` pending jobs, oldest first, flipping each to
    /// running.
    async fn claim_batch(&self, limit: usize) -> Result<Vec<CrawlJob>>;

    async fn complete(&self, job_id: &str) -> Result<()>;

    async fn fail(&self, job_id: &str, error: &str) -> Result<()>;
}

// =============================================================================
// Mongo-backed queue
// =============================================================================

pub struct MongoJobQueue {
    jobs: Collection<CrawlJob>,
}

impl MongoJobQueue {
    pub fn new(db: &Database) -> MongoJobQueue {
        MongoJobQueue { jobs: db.jobs() }
    }
}

#[async_trait]
impl JobQueue for MongoJobQueue {
    async fn enqueue(&self, job: CrawlJob) -> Result<String> {
        self.jobs
            .insert_one(&job)
            .await
            .context("Failed to enqueue job")?;
        Ok(job.job_id)
    }

    async fn claim_batch(&self, limit: usize) -> Result<Vec<CrawlJob>> {
        // One find_one_and_update per job keeps the pending->running flip
        // atomic even with several workers on the same collection.
        let mut claimed = Vec::new();
        while claimed.len() < limit {
            let job = self
                .jobs
                .find_one_and_update(
                    doc! { "status": JobStatus::Pending.as_str() },
                    doc! { "$set": { "status": JobStatus::Running.as_str() } },
                )
                .sort(doc! { "created_at": 1 })
                .return_document(ReturnDocument::After)
                .await
                .context("Failed to claim job")?;
            match job {
                Some(job) => claimed.push(job),
                None => break,
            }
        }
        Ok(claimed)
    }

    async fn complete(&self, job_id: &str) -> Result<()> {
        self.jobs
            .update_one(
                doc! { "job_id": job_id },
                doc! { "$set": { "status": JobStatus::Done.as_str() } },
            )
            .await
            .context("Failed to mark job done")?;
        Ok(())
    }

    async fn fail(&self, job_id: &str, error: &str) -> Result<()> {
        self.jobs
            .update_one(
                doc! { "job_id": job_id },
                doc! { "$set": { "status": JobStatus::Failed.as_str(), "error": error } },
            )
            .await
            .context("Failed to mark job failed")?;
        Ok(())
    }
}

// =============================================================================
// In-process queue
// =============================================================================

/// Same lifecycle without Mongo, used when no database is configured and in
/// tests. Keeps every job ever enqueued, in order.
#[derive(Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<Vec<CrawlJob>>,
}

impl MemoryJobQueue {
    pub fn new() -> MemoryJobQueue {
        MemoryJobQueue::default()
    }

    /// Copy of the full job list in enqueue order.
    pub async fn snapshot(&self) -> Vec<CrawlJob> {
        self.jobs.lock().await.clone()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: CrawlJob) -> Result<String> {
        let id = job.job_id.clone();
        self.jobs.lock().await.push(job);
        Ok(id)
    }

    async fn claim_batch(&self, limit: usize) -> Result<Vec<CrawlJob>> {
        let mut jobs = self.jobs.lock().await;
        let mut claimed = Vec::new();
        for job in jobs.iter_mut() {
            if claimed.len() >= limit {
                break;
            }
            if job.status == JobStatus::Pending {
                job.status = JobStatus::Running;
                claimed.push(job.clone());
            }
        }
        Ok(claimed)
    }

    async fn complete(&self, job_id: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.iter_mut().find(|j| j.job_id == job_id) {
            job.status = JobStatus::Done;
        }
        Ok(())
    }

    async fn fail(&self, job_id: &str, error: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.iter_mut().find(|j| j.job_id == job_id) {
            job.status = JobStatus::Failed;
            job.error = Some(error.to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Worker loop
// =============================================================================

/// Polls the queue and runs claimed jobs through the crawler until cancelled.
/// Manual jobs crawl a single page, recursive jobs honor the job's depth.
/// Pages are stored when a document repo is available; one job's failure
/// never stops the loop.
pub async fn run_worker(
    queue: Arc<dyn JobQueue>,
    crawler: Arc<Crawler>,
    documents: Option<DocumentRepo>,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    log::info!("job worker started");
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let batch = match queue.claim_batch(CLAIM_BATCH_SIZE).await {
            Ok(batch) => batch,
            Err(e) => {
                log::error!("error claiming jobs, error: {:#}", e);
                Vec::new()
            }
        };

        if batch.is_empty() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
            continue;
        }

        for job in batch {
            if cancel.is_cancelled() {
                break;
            }
            run_job(queue.as_ref(), &crawler, documents.as_ref(), &job, &cancel).await;
        }
    }
    log::info!("job worker stopped");
}

async fn run_job(
    queue: &dyn JobQueue,
    crawler: &Crawler,
    documents: Option<&DocumentRepo>,
    job: &CrawlJob,
    cancel: &CancellationToken,
) {
    let depth = match job.mode {
        CrawlMode::Manual => 0,
        CrawlMode::Recursive => job.depth,
    };
    log::info!(
        "running job {} for {} ({} crawl, depth {depth})",
        job.job_id,
        job.url,
        job.mode.as_str()
    );

    let report = crawler.crawl(&job.url, depth, cancel).await;

    if let Some(repo) = documents {
        for page in &report.pages {
            match repo.upsert(page).await {
                Ok(id) => log::info!("stored page {} as {id}", page.url),
                Err(e) => log::error!("error storing page {}, error: {:#}", page.url, e),
            }
        }
    }

    let outcome = if report.success {
        queue.complete(&job.job_id).await
    } else {
        let reason = report
            .error
            .clone()
            .unwrap_or_else(|| "crawl failed".to_string());
        queue.fail(&job.job_id, &reason).await
    };
    if let Err(e) = outcome {
        log::error!("error finishing job {}, error: {:#}", job.job_id, e);
    }
}
