use std::time::Duration;

use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use trawl::data_models::FetchMethod;
use trawl::fetcher::*;

fn quick_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_secs(5),
        max_retries,
        backoff_base: Duration::from_millis(10),
        backoff_factor: 2.0,
        backoff_cap: Duration::from_millis(50),
    }
}

mod plain_fetcher_tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_returns_body_and_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<html>hello</html>", "text/html"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = PlainFetcher::new(quick_policy(0)).unwrap();
        let url = Url::parse(&format!("{}/page", server.uri())).unwrap();
        let page = fetcher.fetch(&url).await.unwrap();

        assert_eq!(page.body, "<html>hello</html>");
        assert_eq!(page.content_type.as_deref(), Some("text/html"));
    }

    #[tokio::test]
    async fn test_transient_500_retried_until_success() {
        let server = MockServer::start().await;
        // two failures, then the page appears
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = PlainFetcher::new(quick_policy(2)).unwrap();
        let url = Url::parse(&format!("{}/flaky", server.uri())).unwrap();
        let page = fetcher.fetch(&url).await.unwrap();

        assert_eq!(page.body, "recovered");
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        // initial attempt plus two retries
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let fetcher = PlainFetcher::new(quick_policy(2)).unwrap();
        let url = Url::parse(&format!("{}/down", server.uri())).unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();

        assert!(matches!(err, FetchError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let policy = RetryPolicy {
            timeout: Duration::from_millis(50),
            max_retries: 0,
            ..quick_policy(0)
        };
        let fetcher = PlainFetcher::new(policy).unwrap();
        let url = Url::parse(&format!("{}/slow", server.uri())).unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();

        assert!(matches!(err, FetchError::Http(_)));
        assert!(err.is_transient());
    }
}

mod chain_tests {
    use super::*;

    fn plain_only_chain(max_retries: u32) -> FetchChain {
        FetchChain::standard(ChainConfig {
            retry: quick_policy(max_retries),
            webdriver_url: None,
            proxy_url: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_chain_reports_plain_method_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>content</p>"))
            .mount(&server)
            .await;

        let chain = plain_only_chain(0);
        let (page, used) = chain.fetch(&format!("{}/x", server.uri())).await.unwrap();

        assert_eq!(page.body, "<p>content</p>");
        assert_eq!(used, FetchMethod::Fetch);
    }

    #[tokio::test]
    async fn test_chain_exhaustion_cites_last_real_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let chain = plain_only_chain(0);
        let err = chain.fetch(&format!("{}/y", server.uri())).await.unwrap_err();

        // render and proxy are unconfigured; the 500 is what gets reported
        match err {
            FetchError::Exhausted { ref last, .. } => assert!(last.contains("500"), "got: {last}"),
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert!(err.to_string().contains("all fetch strategies failed"));
    }

    #[tokio::test]
    async fn test_chain_treats_blank_body_as_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("   "))
            .mount(&server)
            .await;

        let chain = plain_only_chain(0);
        let err = chain.fetch(&format!("{}/blank", server.uri())).await.unwrap_err();

        match err {
            FetchError::Exhausted { last, .. } => {
                assert!(last.contains("empty body"), "got: {last}")
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }
}

mod proxy_fetcher_tests {
    use super::*;

    #[tokio::test]
    async fn test_proxy_passes_target_as_query_param() {
        let server = MockServer::start().await;
        let target = "https://origin.example/article";
        Mock::given(method("GET"))
            .and(path("/relay"))
            .and(query_param("url", target))
            .respond_with(ResponseTemplate::new(200).set_body_string("proxied content"))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = format!("{}/relay", server.uri());
        let fetcher = ProxyFetcher::new(Some(endpoint), Duration::from_secs(5)).unwrap();
        let page = fetcher.fetch(&Url::parse(target).unwrap()).await.unwrap();

        assert_eq!(page.body, "proxied content");
    }

    #[tokio::test]
    async fn test_proxy_unconfigured_reports_unavailable() {
        let fetcher = ProxyFetcher::new(None, Duration::from_secs(5)).unwrap();
        let err = fetcher
            .fetch(&Url::parse("https://origin.example/article").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Unavailable("proxy")));
    }
}

mod render_fetcher_tests {
    use super::*;

    #[tokio::test]
    async fn test_render_unconfigured_reports_unavailable() {
        let fetcher = RenderFetcher::new(None);
        let err = fetcher
            .fetch(&Url::parse("https://origin.example/app").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Unavailable("render")));
    }
}
