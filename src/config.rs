use dotenvy::dotenv;
use once_cell::sync::Lazy;
use std::env;
use std::str::FromStr;

pub static CONFIG: Lazy<Config> = Lazy::new(|| {
    dotenv().ok(); // Load .env file if present
    Config {
        mongo_uri: get_env_opt("MONGO_URI"),
        mongo_db_name: get_env_or_default("MONGO_DB_NAME", "trawl"),
        bind_addr: get_env_or_default("BIND_ADDR", "0.0.0.0:3000"),
        webdriver_url: get_env_opt("WEBDRIVER_URL"),
        proxy_fetch_url: get_env_opt("PROXY_FETCH_URL"),
        fetch_timeout_ms: get_env_parsed("FETCH_TIMEOUT_MS", 15_000),
        fetch_max_retries: get_env_parsed("FETCH_MAX_RETRIES", 2),
        backoff_base_ms: get_env_parsed("BACKOFF_BASE_MS", 500),
        backoff_factor: get_env_parsed("BACKOFF_FACTOR", 2.0),
        backoff_cap_ms: get_env_parsed("BACKOFF_CAP_MS", 8_000),
        request_delay_ms: get_env_parsed("REQUEST_DELAY_MS", 250),
        max_depth: get_env_parsed("MAX_CRAWL_DEPTH", 2),
        max_pages: get_env_parsed("MAX_PAGES_PER_CRAWL", 100),
        body_cap: get_env_parsed("BODY_CAP_CHARS", 50_000),
        link_cap: get_env_parsed("LINK_CAP", 50),
        cache_ttl_secs: get_env_parsed("CACHE_TTL_SECS", 86_400),
        score_threshold: get_env_parsed("SCORE_THRESHOLD", 5.0),
        keywords_file: get_env_opt("KEYWORDS_FILE"),
        watch_interval_secs: get_env_parsed("WATCH_INTERVAL_SECS", 1_800),
        watch_feeds: get_env_list("WATCH_FEEDS"),
    }
});

pub struct Config {
    pub mongo_uri: Option<String>,
    pub mongo_db_name: String,
    pub bind_addr: String,
    pub webdriver_url: Option<String>,
    pub proxy_fetch_url: Option<String>,
    pub fetch_timeout_ms: u64,
    pub fetch_max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_factor: f64,
    pub backoff_cap_ms: u64,
    pub request_delay_ms: u64,
    pub max_depth: u32,
    pub max_pages: usize,
    pub body_cap: usize,
    pub link_cap: usize,
    pub cache_ttl_secs: u64,
    pub score_threshold: f64,
    pub keywords_file: Option<String>,
    pub watch_interval_secs: u64,
    pub watch_feeds: Vec<String>,
}

fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn get_env_parsed<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("Invalid value for environment variable {key}: {raw}")),
        Err(_) => default,
    }
}

// Comma-separated list; empty entries are dropped.
fn get_env_list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
