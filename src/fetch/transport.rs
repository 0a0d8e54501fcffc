//! HTTP seam between the archive client and the network.

use crate::config::NetworkSettings;
use crate::error::FetchError;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Body type requested from an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    Json,
    Html,
}

impl Accept {
    pub fn header_value(&self) -> &'static str {
        match self {
            Accept::Json => "application/json",
            Accept::Html => "text/html",
        }
    }
}

/// Status and body of a completed request. Non-2xx statuses are not errors at
/// this layer; the client decides which ones to retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues GET requests.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, accept: Accept) -> Result<HttpResponse, FetchError>;
}

fn map_http_error(url: &str, timeout: Duration, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            after_ms: timeout.as_millis() as u64,
        }
    } else if error.is_connect() {
        FetchError::Http {
            url: url.to_string(),
            status: None,
            message: format!("Connection error: {}", error),
        }
    } else {
        FetchError::Http {
            url: url.to_string(),
            status: error.status().map(|s| s.as_u16()),
            message: error.to_string(),
        }
    }
}

/// `reqwest` transport. No cookie store is configured, so requests never carry
/// credentials.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(settings: &NetworkSettings) -> Result<Self, FetchError> {
        let timeout = settings.request_timeout();
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .user_agent(concat!("archlink/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Http {
                url: String::new(),
                status: None,
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, accept: Accept) -> Result<HttpResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, accept.header_value())
            .send()
            .await
            .map_err(|e| map_http_error(url, self.timeout, e))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| map_http_error(url, self.timeout, e))?;
        Ok(HttpResponse { status, body })
    }
}
