// src/ingest/fetch.rs
use async_trait::async_trait;
use metrics::counter;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use std::time::Duration;

use crate::errors::{WorkerError, WorkerResult};
use crate::ingest::types::PageSource;

pub const USER_AGENT: &str = concat!(
    "realtime-price-worker/",
    env!("CARGO_PKG_VERSION"),
    " (housing price monitor; polite polling)"
);
pub const ACCEPT_LANGUAGE_VALUE: &str = "fr-FR,fr;q=0.9,en;q=0.7";

/// Single GET with a hard timeout. Retrying is the scheduler's job (next tick).
pub struct HttpFetcher {
    url: String,
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> WorkerResult<Self> {
        let url = url.into();
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE),
        );
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| WorkerError::network(&url, format!("building http client: {e}")))?;
        Ok(Self { url, client })
    }

    async fn get_body(&self) -> Result<String, reqwest::Error> {
        self.client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

#[async_trait]
impl PageSource for HttpFetcher {
    async fn fetch_page(&self) -> WorkerResult<String> {
        match self.get_body().await {
            Ok(body) => Ok(body),
            Err(e) => {
                counter!("worker_fetch_errors_total").increment(1);
                let kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_status() {
                    "status"
                } else if e.is_connect() {
                    "connect"
                } else {
                    "other"
                };
                tracing::warn!(error = %e, kind, url = %self.url, "source fetch failed");
                Err(WorkerError::network(&self.url, format!("{kind}: {e}")))
            }
        }
    }

    fn url(&self) -> &str {
        &self.url
    }
}
