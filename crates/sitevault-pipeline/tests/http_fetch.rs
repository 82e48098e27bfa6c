use std::time::Duration;

use anyhow::Result;
use httpmock::prelude::*;
use sitevault_pipeline::{FetchError, Fetcher, HttpFetcher};

const AGENT: &str = "sitevault-test/1.0";

#[tokio::test]
async fn sends_user_agent_and_returns_body() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/css/site.css").header("user-agent", AGENT);
            then.status(200)
                .header("content-type", "text/css")
                .body("body{margin:0}");
        })
        .await;

    let fetcher = HttpFetcher::new(AGENT, Duration::from_secs(5))?;
    let body = fetcher.fetch(&server.url("/css/site.css")).await?;

    mock.assert_async().await;
    assert_eq!(&body[..], b"body{margin:0}");
    Ok(())
}

#[tokio::test]
async fn non_success_status_is_an_error() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/missing.png");
            then.status(404).body("<html>Not Found</html>");
        })
        .await;

    let fetcher = HttpFetcher::new(AGENT, Duration::from_secs(5))?;
    let err = fetcher
        .fetch(&server.url("/missing.png"))
        .await
        .expect_err("404 must fail");

    assert!(matches!(err, FetchError::Status { status: 404, .. }));
    assert_eq!(err.reason(), "http_status");
    Ok(())
}
