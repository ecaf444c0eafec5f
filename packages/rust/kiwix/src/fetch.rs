//! Page retrieval from a running content server.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

use zimport_shared::{
    FetchConfig, FetchFailure, Result, RetrievedDocument, ServerHandle, ZimportError,
};

/// Fetches rendered pages over plain HTTP.
#[derive(Debug, Clone)]
pub struct ContentFetcher {
    client: Client,
    max_retries: u32,
    retry_backoff: Duration,
}

impl ContentFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .no_proxy()
            .build()
            .map_err(|e| ZimportError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    /// GET `http://<host>:<port>/<page_name>` and return the body.
    ///
    /// A non-2xx status or transport error fails the call. Retries happen only
    /// when `max_retries > 0`, and only for transport errors and 5xx answers.
    #[instrument(skip_all, fields(port = handle.port, page = page_name))]
    pub async fn fetch(&self, handle: &ServerHandle, page_name: &str) -> Result<RetrievedDocument> {
        let url = handle.page_url(page_name)?;
        let mut attempt = 0;

        loop {
            match self.fetch_once(&url).await {
                Ok((status, body)) => {
                    info!(%url, status, bytes = body.len(), "page fetched");
                    return Ok(RetrievedDocument::new(
                        body,
                        handle.archive.name(),
                        url.as_str(),
                        status,
                    ));
                }
                Err(failure) if attempt < self.max_retries && is_retryable(&failure) => {
                    attempt += 1;
                    warn!(%url, %failure, attempt, "fetch failed, retrying");
                    tokio::time::sleep(self.retry_backoff).await;
                }
                Err(failure) => return Err(ZimportError::fetch(url.as_str(), failure)),
            }
        }
    }

    async fn fetch_once(&self, url: &Url) -> std::result::Result<(u16, String), FetchFailure> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify(&e))?;

        let status = response.status();
        if !status.is_success() {
            debug!(%url, %status, "non-success status");
            return Err(FetchFailure::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchFailure::Transport(format!("failed to read body: {e}")))?;

        Ok((status.as_u16(), body))
    }
}

fn is_retryable(failure: &FetchFailure) -> bool {
    match failure {
        FetchFailure::Status(code) => *code >= 500,
        FetchFailure::ConnectionRefused | FetchFailure::Transport(_) => true,
    }
}

/// Map a reqwest error onto the fetch failure taxonomy.
fn classify(err: &reqwest::Error) -> FetchFailure {
    let mut source: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return FetchFailure::ConnectionRefused;
            }
        }
        source = e.source();
    }

    // Local endpoint: failing to connect at all means nothing is listening
    if err.is_connect() {
        FetchFailure::ConnectionRefused
    } else if err.is_timeout() {
        FetchFailure::Transport("request timed out".into())
    } else {
        FetchFailure::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{archive, free_port, temp_dir};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn handle_for(port: u16, dir: &std::path::Path) -> ServerHandle {
        ServerHandle {
            pid: None,
            host: "127.0.0.1".into(),
            port,
            archive: archive(dir, "sample"),
        }
    }

    #[tokio::test]
    async fn fetch_returns_body_verbatim() {
        let server = MockServer::start().await;
        let body = "<html><body><div id=\"bodyContent\"><h1>Intro</h1></div></body></html>";

        Mock::given(method("GET"))
            .and(path("/sample"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = temp_dir("zimport-fetch-test");
        let handle = handle_for(server.address().port(), &tmp);
        let fetcher = ContentFetcher::new(&FetchConfig::default()).unwrap();

        let doc = fetcher.fetch(&handle, "sample").await.unwrap();
        assert_eq!(doc.markup, body);
        assert_eq!(doc.source, "sample");
        assert_eq!(doc.status_code, 200);
        assert!(doc.url.ends_with("/sample"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn non_success_status_fails_without_retry() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/sample"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = temp_dir("zimport-fetch-test");
        let handle = handle_for(server.address().port(), &tmp);
        let fetcher = ContentFetcher::new(&FetchConfig::default()).unwrap();

        let err = fetcher.fetch(&handle, "sample").await.unwrap_err();
        match err {
            ZimportError::Fetch { failure, .. } => assert_eq!(failure, FetchFailure::Status(503)),
            other => panic!("expected Fetch error, got {other:?}"),
        }

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/sample"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = temp_dir("zimport-fetch-test");
        let handle = handle_for(server.address().port(), &tmp);
        let config = FetchConfig {
            max_retries: 3,
            retry_backoff_ms: 1,
            ..FetchConfig::default()
        };
        let fetcher = ContentFetcher::new(&config).unwrap();

        let err = fetcher.fetch(&handle, "sample").await.unwrap_err();
        assert!(err.to_string().contains("HTTP 404"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn bounded_retry_recovers_from_server_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/sample"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/sample"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>ok</p>"))
            .mount(&server)
            .await;

        let tmp = temp_dir("zimport-fetch-test");
        let handle = handle_for(server.address().port(), &tmp);
        let config = FetchConfig {
            max_retries: 2,
            retry_backoff_ms: 1,
            ..FetchConfig::default()
        };
        let fetcher = ContentFetcher::new(&config).unwrap();

        let doc = fetcher.fetch(&handle, "sample").await.unwrap();
        assert_eq!(doc.markup, "<p>ok</p>");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn refused_connection_is_classified() {
        let tmp = temp_dir("zimport-fetch-test");
        let handle = handle_for(free_port(), &tmp);
        let fetcher = ContentFetcher::new(&FetchConfig::default()).unwrap();

        let err = fetcher.fetch(&handle, "sample").await.unwrap_err();
        match err {
            ZimportError::Fetch { failure, url } => {
                assert_eq!(failure, FetchFailure::ConnectionRefused);
                assert!(url.ends_with("/sample"));
            }
            other => panic!("expected Fetch error, got {other:?}"),
        }

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
