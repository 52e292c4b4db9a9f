use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::checker::FeedChecker;
use crate::crawler::Crawler;
use crate::db::{DocumentRepo, FeedCheckRepo};
use crate::jobs::JobQueue;

pub mod handlers;
pub mod models;

/// Everything the handlers need. Repos are `None` when Mongo is not
/// configured; handlers then skip storage and still answer normally.
pub struct AppState {
    pub crawler: Arc<Crawler>,
    pub checker: FeedChecker,
    pub queue: Arc<dyn JobQueue>,
    pub documents: Option<DocumentRepo>,
    pub feed_checks: Option<FeedCheckRepo>,
    pub default_depth: u32,
    pub default_threshold: f64,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handlers::health_handler))
        .route("/api/crawl", post(handlers::crawl_handler))
        .route("/api/feeds/check", post(handlers::check_feed_handler))
        .with_state(state)
        .layer(cors)
}
