use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Url};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, warn};

use crate::config::{Endpoint, QueryConfig};
use crate::error::QueryError;

const ACCEPT_XML: &str = "text/html,application/xhtml+xml,application/xml";

/// Raw reply to an E-utilities GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EutilsResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl EutilsResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turns a non-success status into [`QueryError::EutilsStatus`].
    pub fn into_body(self) -> Result<Vec<u8>, QueryError> {
        if self.is_success() {
            return Ok(self.body);
        }
        let message = String::from_utf8_lossy(&self.body).trim().to_string();
        let message = if message.is_empty() {
            "E-utilities request failed".to_string()
        } else {
            message
        };
        Err(QueryError::EutilsStatus {
            status: self.status,
            message,
        })
    }
}

pub trait EutilsTransport {
    fn get(&self, url: &str) -> impl Future<Output = Result<EutilsResponse, QueryError>>;
}

impl<T: EutilsTransport> EutilsTransport for &T {
    fn get(&self, url: &str) -> impl Future<Output = Result<EutilsResponse, QueryError>> {
        (**self).get(url)
    }
}

/// Builds the esearch and efetch URLs for one query.
#[derive(Debug, Clone)]
pub struct EutilsUrls {
    endpoint: Endpoint,
}

impl EutilsUrls {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    pub fn search(&self, query: &QueryConfig, offset: u64) -> Result<Url, QueryError> {
        let mut params = vec![
            ("db", self.endpoint.database.clone()),
            ("term", query.search_term()),
            ("retmax", query.page_size.to_string()),
        ];
        if offset > 0 {
            params.push(("retstart", offset.to_string()));
        }
        push_api_key(&mut params, query);
        self.endpoint.search_url(&params)
    }

    pub fn fetch(&self, query: &QueryConfig, identifiers: &[u64]) -> Result<Url, QueryError> {
        let ids = identifiers
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let mut params = vec![
            ("db", self.endpoint.database.clone()),
            ("id", ids),
            ("rettype", "gb".to_string()),
            ("retmode", "xml".to_string()),
            ("retmax", query.page_size.to_string()),
        ];
        push_api_key(&mut params, query);
        self.endpoint.fetch_url(&params)
    }
}

fn push_api_key(params: &mut Vec<(&'static str, String)>, query: &QueryConfig) {
    if let Some(key) = &query.api_key {
        params.push(("api_key", key.clone()));
    }
}

#[derive(Clone)]
pub struct EutilsHttpClient {
    client: Client,
}

impl EutilsHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, QueryError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("ncbi-query/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| QueryError::EutilsHttp(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_XML));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| QueryError::EutilsHttp(err.to_string()))?;
        Ok(Self { client })
    }

    async fn send_with_retries(&self, url: &str) -> Result<reqwest::Response, QueryError> {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match self.client.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        warn!(status, attempt, "retrying E-utilities request");
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        warn!(error = %err, attempt, "retrying E-utilities request");
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(QueryError::EutilsHttp(err.to_string()));
                }
            }
        }
    }
}

impl EutilsTransport for EutilsHttpClient {
    async fn get(&self, url: &str) -> Result<EutilsResponse, QueryError> {
        debug!(url, "GET");
        let response = self.send_with_retries(url).await?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| QueryError::EutilsHttp(err.to_string()))?;
        Ok(EutilsResponse {
            status,
            body: body.to_vec(),
        })
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
