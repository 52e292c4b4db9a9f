use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use trawl::cache::PageCache;
use trawl::crawler::Crawler;
use trawl::extractor::Extractor;
use trawl::fetcher::{ChainConfig, FetchChain, RetryPolicy};

fn quick_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_secs(5),
        max_retries,
        backoff_base: Duration::from_millis(10),
        backoff_factor: 2.0,
        backoff_cap: Duration::from_millis(50),
    }
}

fn build_crawler(cache: Arc<PageCache>, max_pages: usize, max_retries: u32) -> Crawler {
    let chain = FetchChain::standard(ChainConfig {
        retry: quick_policy(max_retries),
        webdriver_url: None,
        proxy_url: None,
    })
    .unwrap();
    Crawler::new(chain, Extractor::default(), cache, max_pages, Duration::ZERO)
}

fn fresh_crawler() -> Crawler {
    build_crawler(Arc::new(PageCache::new(Duration::from_secs(3600))), 100, 0)
}

fn page_markup(title: &str, links: &[String]) -> String {
    let anchors: String = links
        .iter()
        .map(|l| format!(r#"<a href="{l}">{l}</a>"#))
        .collect();
    format!(
        "<html><head><title>{title}</title></head><body><p>{title} body</p>{anchors}</body></html>"
    )
}

async fn mount_page(server: &MockServer, at: &str, title: &str, links: &[String]) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_raw(page_markup(title, links), "text/html"))
        .mount(server)
        .await;
}

mod traversal_tests {
    use super::*;

    #[tokio::test]
    async fn test_depth_one_crawl_stays_on_site() {
        let server = MockServer::start().await;
        let root_links = [
            format!("{}/a", server.uri()),
            format!("{}/b", server.uri()),
            format!("{}/c", server.uri()),
            "https://elsewhere.example/one".to_string(),
            "https://elsewhere.example/two".to_string(),
        ];
        mount_page(&server, "/", "Root", &root_links).await;
        mount_page(&server, "/a", "A", &[]).await;
        mount_page(&server, "/b", "B", &[]).await;
        mount_page(&server, "/c", "C", &[]).await;

        let crawler = fresh_crawler();
        let cancel = CancellationToken::new();
        let report = crawler
            .crawl(&format!("{}/", server.uri()), 1, &cancel)
            .await;

        // start page plus its three same-site children
        assert!(report.success);
        assert_eq!(report.pages_crawled, 4);
        assert!(report.failed.is_empty());
        assert!(report.pages.iter().all(|p| p.depth <= 1));

        // off-site links are recorded on the page but never crawled
        let root = &report.pages[0];
        assert!(
            root.links
                .iter()
                .any(|l| l.starts_with("https://elsewhere.example/"))
        );
        assert!(report.pages.iter().all(|p| !p.url.contains("elsewhere")));
    }

    #[tokio::test]
    async fn test_cyclic_links_fetched_once() {
        let server = MockServer::start().await;
        let to_loop = [format!("{}/loop", server.uri())];
        let back_home = [
            format!("{}/", server.uri()),
            format!("{}/loop", server.uri()),
        ];

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(page_markup("Home", &to_loop), "text/html"),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(page_markup("Loop", &back_home), "text/html"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let crawler = fresh_crawler();
        let cancel = CancellationToken::new();
        let report = crawler
            .crawl(&format!("{}/", server.uri()), 5, &cancel)
            .await;

        assert!(report.success);
        assert_eq!(report.pages_crawled, 2);
    }

    #[tokio::test]
    async fn test_page_cap_stops_traversal() {
        let server = MockServer::start().await;
        let children: Vec<String> = (1..=5).map(|n| format!("{}/{n}", server.uri())).collect();
        mount_page(&server, "/", "Root", &children).await;
        for n in 1..=5 {
            mount_page(&server, &format!("/{n}"), &format!("Child {n}"), &[]).await;
        }

        let crawler = build_crawler(Arc::new(PageCache::new(Duration::from_secs(3600))), 3, 0);
        let cancel = CancellationToken::new();
        let report = crawler
            .crawl(&format!("{}/", server.uri()), 1, &cancel)
            .await;

        assert!(report.success);
        assert_eq!(report.pages_crawled, 3);
    }

    #[tokio::test]
    async fn test_failed_child_does_not_abort_crawl() {
        let server = MockServer::start().await;
        let links = [
            format!("{}/ok", server.uri()),
            format!("{}/broken", server.uri()),
        ];
        mount_page(&server, "/", "Root", &links).await;
        mount_page(&server, "/ok", "Fine", &[]).await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let crawler = fresh_crawler();
        let cancel = CancellationToken::new();
        let report = crawler
            .crawl(&format!("{}/", server.uri()), 1, &cancel)
            .await;

        assert!(report.success);
        assert_eq!(report.pages_crawled, 2);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].url.ends_with("/broken"));
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn test_invalid_start_url_fails_cleanly() {
        let crawler = fresh_crawler();
        let cancel = CancellationToken::new();
        let report = crawler.crawl("not a url", 0, &cancel).await;

        assert!(!report.success);
        assert_eq!(report.pages_crawled, 0);
        assert_eq!(report.failed.len(), 1);
        assert!(report.error.as_deref().unwrap().contains("invalid url"));
    }
}

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_crawl_of_failing_url_reports_exhaustion() {
        let server = MockServer::start().await;
        // initial attempt plus two retries, then strategies are exhausted
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let crawler = build_crawler(Arc::new(PageCache::new(Duration::from_secs(3600))), 100, 2);
        let cancel = CancellationToken::new();
        let report = crawler
            .crawl(&format!("{}/broken", server.uri()), 0, &cancel)
            .await;

        assert!(!report.success);
        assert_eq!(report.pages_crawled, 0);
        assert_eq!(report.failed.len(), 1);
        let error = report.error.as_deref().unwrap();
        assert!(
            error.contains("all fetch strategies failed"),
            "got: {error}"
        );
        assert!(crawler.cache().is_empty());
    }
}

mod cache_tests {
    use super::*;

    #[tokio::test]
    async fn test_second_crawl_served_from_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/once"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(page_markup("Cached", &[]), "text/html"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let crawler = fresh_crawler();
        let cancel = CancellationToken::new();
        let url = format!("{}/once", server.uri());

        let first = crawler.crawl(&url, 0, &cancel).await;
        let second = crawler.crawl(&url, 0, &cancel).await;

        assert!(first.success && second.success);
        assert_eq!(first.pages_crawled, 1);
        assert_eq!(second.pages_crawled, 1);
        assert_eq!(second.pages[0].title, "Cached");
    }

    #[tokio::test]
    async fn test_expired_cache_entry_refetched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stale"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(page_markup("Stale", &[]), "text/html"),
            )
            .expect(2)
            .mount(&server)
            .await;

        let crawler = build_crawler(Arc::new(PageCache::new(Duration::from_millis(50))), 100, 0);
        let cancel = CancellationToken::new();
        let url = format!("{}/stale", server.uri());

        crawler.crawl(&url, 0, &cancel).await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        let second = crawler.crawl(&url, 0, &cancel).await;

        assert!(second.success);
        assert_eq!(second.pages_crawled, 1);
    }
}

mod cancellation_tests {
    use super::*;

    #[tokio::test]
    async fn test_pre_cancelled_token_returns_empty_report() {
        let crawler = fresh_crawler();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = crawler.crawl("https://example.com/", 2, &cancel).await;

        assert_eq!(report.pages_crawled, 0);
        assert!(report.pages.is_empty());
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_mid_crawl_returns_partial_report() {
        let server = MockServer::start().await;
        let slow_link = [format!("{}/slow", server.uri())];
        mount_page(&server, "/", "Fast", &slow_link).await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(page_markup("Slow", &[]), "text/html")
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let crawler = fresh_crawler();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            trigger.cancel();
        });

        let report = crawler
            .crawl(&format!("{}/", server.uri()), 1, &cancel)
            .await;

        // the fast root made it in before the token fired mid-fetch
        assert_eq!(report.pages_crawled, 1);
        assert_eq!(report.pages[0].title, "Fast");
    }
}
