use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::data_models::{CrawlJob, CrawlMode, FeedCheckSummary, JobStatus};

use super::AppState;
use super::models::{
    CrawlRequest, CrawlResponse, CrawlResult, FeedCheckRequest, FeedCheckResponse,
};

pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Runs the crawl inline and answers with the full report. The run is also
/// recorded as a finished job so job history stays complete.
pub async fn crawl_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CrawlRequest>,
) -> Result<Json<CrawlResponse>, (StatusCode, String)> {
    let url = request.url.trim().to_string();
    if url.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "url cannot be empty".to_string()));
    }

    let mode = match request.mode.as_deref() {
        None | Some("manual") => CrawlMode::Manual,
        Some("recursive") => CrawlMode::Recursive,
        Some(other) => {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("unknown crawl mode: {other}"),
            ));
        }
    };
    let depth = match mode {
        CrawlMode::Manual => 0,
        CrawlMode::Recursive => request.depth.unwrap_or(state.default_depth),
    };

    let cancel = CancellationToken::new();
    let report = state.crawler.crawl(&url, depth, &cancel).await;

    let mut store_error: Option<String> = None;
    if let Some(repo) = &state.documents {
        for page in &report.pages {
            if let Err(e) = repo.upsert(page).await {
                log::error!("error storing page {}, error: {:#}", page.url, e);
                store_error = Some(format!("{e:#}"));
            }
        }
    }

    // Pre-marked done/failed, so the worker never claims it.
    let mut job = CrawlJob::new(url, mode, depth, "api".to_string());
    job.status = if report.success {
        JobStatus::Done
    } else {
        JobStatus::Failed
    };
    job.error = report.error.clone();
    let job_id = job.job_id.clone();
    if let Err(e) = state.queue.enqueue(job).await {
        log::error!("error recording job {job_id}, error: {:#}", e);
    }

    Ok(Json(CrawlResponse {
        success: report.success,
        job_id,
        mode: mode.as_str().to_string(),
        result: CrawlResult {
            report,
            store_error,
        },
    }))
}

/// Checks one feed, optionally dispatching crawl jobs for entries at or
/// above the threshold. Dispatch problems ride along in the response instead
/// of failing the call.
pub async fn check_feed_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FeedCheckRequest>,
) -> Result<Json<FeedCheckResponse>, (StatusCode, String)> {
    let feed_url = request.feed_url.trim().to_string();
    if feed_url.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "feed_url cannot be empty".to_string(),
        ));
    }
    let threshold = request.threshold.unwrap_or(state.default_threshold);

    let (report, dispatch) = if request.dispatch {
        let (report, summary) = state
            .checker
            .check_and_dispatch(&feed_url, threshold, state.queue.as_ref())
            .await;
        (report, Some(summary))
    } else {
        (state.checker.check_feed(&feed_url, threshold).await, None)
    };

    if report.success {
        if let Some(repo) = &state.feed_checks {
            let dispatched = dispatch.as_ref().map_or(0, |d| d.dispatched.len());
            let row = FeedCheckSummary::new(
                report.feed_url.clone(),
                report.feed_title.clone(),
                report.total_items,
                report.high_score_items.len(),
                dispatched,
            );
            if let Err(e) = repo.insert(&row).await {
                log::error!("error storing feed check, error: {:#}", e);
            }
        }
    }

    Ok(Json(FeedCheckResponse {
        success: report.success,
        result: report,
        dispatch,
    }))
}
