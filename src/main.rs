use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use trawl::api::{self, AppState};
use trawl::cache::PageCache;
use trawl::checker::FeedChecker;
use trawl::config::CONFIG;
use trawl::crawler::Crawler;
use trawl::data_models::FeedCheckSummary;
use trawl::db::{Database, DocumentRepo, FeedCheckRepo};
use trawl::extractor::Extractor;
use trawl::fetcher::{ChainConfig, FetchChain, PlainFetcher, RetryPolicy};
use trawl::jobs::{self, JobQueue, MemoryJobQueue, MongoJobQueue};
use trawl::scorer::KeywordWeights;

const WORKER_POLL: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "trawl", about = "Adaptive site crawler with feed scoring")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API with a background job worker
    Serve,
    /// Crawl one site and print the report as JSON
    Crawl {
        url: String,
        /// Link depth to follow; 0 fetches only the start URL
        #[arg(long)]
        depth: Option<u32>,
    },
    /// Fetch and score one feed
    CheckFeed {
        url: String,
        /// Minimum score for an entry to qualify
        #[arg(long)]
        threshold: Option<f64>,
        /// Queue a crawl job per qualifying entry
        #[arg(long)]
        dispatch: bool,
    },
    /// Check the configured feeds on a schedule
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber (handles both tracing and log crate)
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(true)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve => serve().await,
        Commands::Crawl { url, depth } => crawl_once(url, depth).await,
        Commands::CheckFeed {
            url,
            threshold,
            dispatch,
        } => check_feed_once(url, threshold, dispatch).await,
        Commands::Watch => watch().await,
    }
}

fn retry_policy() -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_millis(CONFIG.fetch_timeout_ms),
        max_retries: CONFIG.fetch_max_retries,
        backoff_base: Duration::from_millis(CONFIG.backoff_base_ms),
        backoff_factor: CONFIG.backoff_factor,
        backoff_cap: Duration::from_millis(CONFIG.backoff_cap_ms),
    }
}

fn build_crawler() -> Result<Crawler> {
    let chain = FetchChain::standard(ChainConfig {
        retry: retry_policy(),
        webdriver_url: CONFIG.webdriver_url.clone(),
        proxy_url: CONFIG.proxy_fetch_url.clone(),
    })?;
    let extractor = Extractor::new(CONFIG.body_cap, CONFIG.link_cap);
    let cache = Arc::new(PageCache::new(Duration::from_secs(CONFIG.cache_ttl_secs)));

    Ok(Crawler::new(
        chain,
        extractor,
        cache,
        CONFIG.max_pages,
        Duration::from_millis(CONFIG.request_delay_ms),
    ))
}

fn build_checker() -> Result<FeedChecker> {
    let weights = match &CONFIG.keywords_file {
        Some(path) => KeywordWeights::from_file(path)?,
        None => {
            log::warn!("KEYWORDS_FILE not set, scoring with an empty keyword table");
            KeywordWeights::default()
        }
    };
    Ok(FeedChecker::new(PlainFetcher::new(retry_policy())?, weights))
}

/// Connects when `MONGO_URI` is set; a set-but-unreachable database is fatal.
async fn connect_db() -> Result<Option<&'static Database>> {
    if CONFIG.mongo_uri.is_none() {
        log::warn!("MONGO_URI not set, running without persistence");
        return Ok(None);
    }
    Ok(Some(Database::init_global().await?))
}

fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("shutdown signal received");
            trigger.cancel();
        }
    });
    cancel
}

async fn serve() -> Result<()> {
    let database = connect_db().await?;
    let queue: Arc<dyn JobQueue> = match database {
        Some(db) => Arc::new(MongoJobQueue::new(db)),
        None => Arc::new(MemoryJobQueue::new()),
    };

    let crawler = Arc::new(build_crawler()?);
    let checker = build_checker()?;
    let cancel = shutdown_token();

    let worker = tokio::spawn(jobs::run_worker(
        queue.clone(),
        crawler.clone(),
        database.map(DocumentRepo::new),
        WORKER_POLL,
        cancel.clone(),
    ));

    let state = Arc::new(AppState {
        crawler,
        checker,
        queue,
        documents: database.map(DocumentRepo::new),
        feed_checks: database.map(FeedCheckRepo::new),
        default_depth: CONFIG.max_depth,
        default_threshold: CONFIG.score_threshold,
    });

    let listener = TcpListener::bind(&CONFIG.bind_addr).await?;
    log::info!("listening on {}", CONFIG.bind_addr);
    axum::serve(listener, api::create_router(state))
        .with_graceful_shutdown({
            let cancel = cancel.clone();
            async move { cancel.cancelled().await }
        })
        .await?;

    worker.await?;
    Ok(())
}

async fn crawl_once(url: String, depth: Option<u32>) -> Result<()> {
    let depth = depth.unwrap_or(CONFIG.max_depth);
    let database = connect_db().await?;
    let crawler = build_crawler()?;
    let cancel = shutdown_token();

    let report = crawler.crawl(&url, depth, &cancel).await;

    if let Some(db) = database {
        let repo = DocumentRepo::new(db);
        for page in &report.pages {
            match repo.upsert(page).await {
                Ok(id) => log::info!("stored page {} as {id}", page.url),
                Err(e) => log::error!("error storing page {}, error: {:#}", page.url, e),
            }
        }
        log::info!("{} documents stored in total", repo.count().await.unwrap_or(0));
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn check_feed_once(url: String, threshold: Option<f64>, dispatch: bool) -> Result<()> {
    let threshold = threshold.unwrap_or(CONFIG.score_threshold);
    let database = connect_db().await?;
    let checker = build_checker()?;

    let (report, summary) = if dispatch {
        let queue: Arc<dyn JobQueue> = match database {
            Some(db) => Arc::new(MongoJobQueue::new(db)),
            None => {
                log::warn!("dispatching to the in-memory queue, jobs will not outlive this run");
                Arc::new(MemoryJobQueue::new())
            }
        };
        let (report, summary) = checker
            .check_and_dispatch(&url, threshold, queue.as_ref())
            .await;
        (report, Some(summary))
    } else {
        (checker.check_feed(&url, threshold).await, None)
    };

    if report.success {
        if let Some(db) = database {
            let dispatched = summary.as_ref().map_or(0, |s| s.dispatched.len());
            let row = FeedCheckSummary::new(
                report.feed_url.clone(),
                report.feed_title.clone(),
                report.total_items,
                report.high_score_items.len(),
                dispatched,
            );
            if let Err(e) = FeedCheckRepo::new(db).insert(&row).await {
                log::error!("error storing feed check, error: {:#}", e);
            }
        }
    }

    match summary {
        Some(summary) => println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "report": report,
                "dispatch": summary,
            }))?
        ),
        None => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

async fn watch() -> Result<()> {
    let database = connect_db().await?;
    let checker = build_checker()?;
    let feed_checks = database.map(FeedCheckRepo::new);
    let queue: Arc<dyn JobQueue> = match database {
        Some(db) => Arc::new(MongoJobQueue::new(db)),
        None => {
            log::warn!("dispatching to the in-memory queue, jobs will not outlive this run");
            Arc::new(MemoryJobQueue::new())
        }
    };

    let feeds = CONFIG.watch_feeds.clone();
    if let Some(repo) = &feed_checks {
        for feed in &feeds {
            match repo.latest_for_feed(feed).await {
                Ok(Some(prev)) => log::info!("last check of {feed} was at {}", prev.checked_at),
                Ok(None) => log::info!("no previous checks of {feed}"),
                Err(e) => log::error!("error loading feed check history, error: {:#}", e),
            }
        }
    }

    let cancel = shutdown_token();
    checker
        .run_scheduled(
            &feeds,
            CONFIG.score_threshold,
            Duration::from_secs(CONFIG.watch_interval_secs),
            queue.as_ref(),
            feed_checks.as_ref(),
            &cancel,
        )
        .await;
    Ok(())
}
