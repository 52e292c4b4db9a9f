use std::time::Duration;

use async_trait::async_trait;
use fantoccini::ClientBuilder;
use reqwest::redirect::Policy;
use thiserror::Error;
use url::Url;

use crate::data_models::FetchMethod;

const USER_AGENT: &str = "trawlbot/0.1";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur while fetching a page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("http status {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("empty body from {0}")]
    EmptyBody(String),
    #[error("{0} strategy is not configured")]
    Unavailable(&'static str),
    #[error("render failed: {0}")]
    Render(String),
    #[error("all fetch strategies failed for {url}, last error: {last}")]
    Exhausted { url: String, last: String },
}

impl FetchError {
    /// Worth another attempt on the same strategy: network-level failures and
    /// non-2xx responses. Everything else fails fast.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Http(_) | FetchError::Status { .. })
    }
}

/// Raw markup straight off the wire, before extraction.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub body: String,
    pub content_type: Option<String>,
}

/// Timeout and backoff knobs for the plain strategy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_factor: f64,
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            timeout: Duration::from_secs(15),
            max_retries: 2,
            backoff_base: Duration::from_millis(500),
            backoff_factor: 2.0,
            backoff_cap: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let ms = self.backoff_base.as_millis() as f64 * self.backoff_factor.powi(attempt as i32);
        Duration::from_millis(ms.min(self.backoff_cap.as_millis() as f64) as u64)
    }
}

/// One way of turning a URL into markup. Strategies are tried in order by the
/// chain, so implementations report failures instead of retrying across
/// strategies themselves.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn method(&self) -> FetchMethod;

    async fn fetch(&self, url: &Url) -> Result<RawPage, FetchError>;
}

/// Direct HTTP GET with bounded retries and exponential backoff on transient
/// failures.
pub struct PlainFetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl PlainFetcher {
    pub fn new(retry: RetryPolicy) -> Result<PlainFetcher, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(retry.timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .redirect(Policy::limited(5))
            .user_agent(USER_AGENT)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(PlainFetcher { client, retry })
    }

    async fn try_once(&self, url: &Url) -> Result<RawPage, FetchError> {
        let response = self.client.get(url.as_str()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = response.text().await?;

        Ok(RawPage { body, content_type })
    }
}

#[async_trait]
impl FetchStrategy for PlainFetcher {
    fn method(&self) -> FetchMethod {
        FetchMethod::Fetch
    }

    async fn fetch(&self, url: &Url) -> Result<RawPage, FetchError> {
        let mut attempt = 0u32;
        loop {
            match self.try_once(url).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    attempt += 1;
                    log::warn!(
                        "fetch attempt {attempt} failed for {url}: {e}, retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Fetches through a WebDriver session so JS-rendered markup comes back
/// populated. Inactive until a WebDriver URL is configured.
pub struct RenderFetcher {
    webdriver_url: Option<String>,
}

impl RenderFetcher {
    pub fn new(webdriver_url: Option<String>) -> RenderFetcher {
        RenderFetcher { webdriver_url }
    }
}

#[async_trait]
impl FetchStrategy for RenderFetcher {
    fn method(&self) -> FetchMethod {
        FetchMethod::Render
    }

    async fn fetch(&self, url: &Url) -> Result<RawPage, FetchError> {
        let webdriver_url = self
            .webdriver_url
            .as_deref()
            .ok_or(FetchError::Unavailable("render"))?;

        let client = ClientBuilder::native()
            .connect(webdriver_url)
            .await
            .map_err(|e| FetchError::Render(e.to_string()))?;

        // Close the session on every path, the driver leaks them otherwise.
        if let Err(e) = client.goto(url.as_str()).await {
            let _ = client.close().await;
            return Err(FetchError::Render(e.to_string()));
        }
        let source = client.source().await;
        let _ = client.close().await;

        let body = source.map_err(|e| FetchError::Render(e.to_string()))?;
        Ok(RawPage {
            body,
            content_type: Some("text/html".to_string()),
        })
    }
}

/// Routes the request through an HTTP fetch proxy that does the origin fetch
/// on our behalf. Inactive until an endpoint is configured.
pub struct ProxyFetcher {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl ProxyFetcher {
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Result<ProxyFetcher, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(USER_AGENT)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(ProxyFetcher { client, endpoint })
    }
}

#[async_trait]
impl FetchStrategy for ProxyFetcher {
    fn method(&self) -> FetchMethod {
        FetchMethod::Proxy
    }

    async fn fetch(&self, url: &Url) -> Result<RawPage, FetchError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or(FetchError::Unavailable("proxy"))?;

        let response = self
            .client
            .get(endpoint)
            .query(&[("url", url.as_str())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = response.text().await?;

        Ok(RawPage { body, content_type })
    }
}

/// Everything needed to build the standard plain -> render -> proxy chain.
#[derive(Debug, Clone, Default)]
pub struct ChainConfig {
    pub retry: RetryPolicy,
    pub webdriver_url: Option<String>,
    pub proxy_url: Option<String>,
}

/// Ordered fallback over fetch strategies. The first strategy that returns a
/// non-empty body wins; per-strategy failures are logged and swallowed, and
/// only full exhaustion surfaces as an error.
pub struct FetchChain {
    strategies: Vec<Box<dyn FetchStrategy>>,
}

impl FetchChain {
    pub fn new(strategies: Vec<Box<dyn FetchStrategy>>) -> FetchChain {
        FetchChain { strategies }
    }

    /// The standard chain: plain HTTP first, then a rendered fetch, then the
    /// proxy. Unconfigured strategies stay in the chain and report themselves
    /// unavailable so the order never changes.
    pub fn standard(config: ChainConfig) -> Result<FetchChain, FetchError> {
        let timeout = config.retry.timeout;
        Ok(FetchChain::new(vec![
            Box::new(PlainFetcher::new(config.retry)?),
            Box::new(RenderFetcher::new(config.webdriver_url)),
            Box::new(ProxyFetcher::new(config.proxy_url, timeout)?),
        ]))
    }

    pub async fn fetch(&self, url: &str) -> Result<(RawPage, FetchMethod), FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        let mut last: Option<FetchError> = None;
        for strategy in &self.strategies {
            let name = strategy.method().as_str();
            match strategy.fetch(&parsed).await {
                Ok(page) if !page.body.trim().is_empty() => {
                    log::debug!("fetched {url} via {name}");
                    return Ok((page, strategy.method()));
                }
                Ok(_) => {
                    log::warn!("{name} strategy returned an empty body for {url}");
                    last = Some(FetchError::EmptyBody(url.to_string()));
                }
                Err(e @ FetchError::Unavailable(_)) => {
                    log::debug!("{name} strategy skipped for {url}: {e}");
                    // an unconfigured strategy should not mask a real error
                    if last.is_none() {
                        last = Some(e);
                    }
                }
                Err(e) => {
                    log::warn!("{name} strategy failed for {url}: {e}");
                    last = Some(e);
                }
            }
        }

        let last = match last {
            Some(e) => e.to_string(),
            None => "no strategies configured".to_string(),
        };
        Err(FetchError::Exhausted {
            url: url.to_string(),
            last,
        })
    }
}
