//! Fetch/Parse Adapter
//!
//! Resolves posts and threads through the cache tier, falling back to the archive
//! API named by the active [`SiteSchema`]. Responses are normalized per source
//! family and written through to the cache before they are returned.

use crate::cache::CacheTier;
use crate::config::NetworkSettings;
use crate::error::FetchError;
use crate::model::{Post, PostKey, SourceFamily, Thread};
use crate::site::{PageLocation, SiteSchema};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

pub mod parse;
mod replies;
pub mod transport;

pub use transport::{Accept, HttpResponse, HttpTransport, ReqwestTransport};

/// Archive API client bound to one page's schema and location.
pub struct ArchiveClient {
    transport: Arc<dyn HttpTransport>,
    schema: Arc<dyn SiteSchema>,
    location: PageLocation,
    cache: Arc<CacheTier>,
    network: NetworkSettings,
}

impl ArchiveClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        schema: Arc<dyn SiteSchema>,
        location: PageLocation,
        cache: Arc<CacheTier>,
        network: NetworkSettings,
    ) -> Self {
        Self {
            transport,
            schema,
            location,
            cache,
            network,
        }
    }

    pub fn schema(&self) -> &Arc<dyn SiteSchema> {
        &self.schema
    }

    pub fn location(&self) -> &PageLocation {
        &self.location
    }

    pub fn cache(&self) -> &Arc<CacheTier> {
        &self.cache
    }

    pub fn network(&self) -> &NetworkSettings {
        &self.network
    }

    fn unsupported(&self, operation: &str) -> FetchError {
        FetchError::UnsupportedSite {
            schema: self.schema.name().to_string(),
            operation: operation.to_string(),
        }
    }

    fn accept(&self) -> Accept {
        match self.schema.family() {
            SourceFamily::HtmlOnly => Accept::Html,
            _ => Accept::Json,
        }
    }

    /// Resolve one post: cache first, then the archive.
    #[instrument(skip(self), fields(schema = self.schema.name()))]
    pub async fn fetch_post(&self, id: &str, board: &str) -> Result<Post, FetchError> {
        let key = PostKey::new(board, id);
        if let Some(post) = self.cache.get_post(&key) {
            debug!(post = %key, "Post served from cache");
            return Ok(post);
        }

        let url = self
            .schema
            .post_api_url(&self.location, board, id)
            .ok_or_else(|| self.unsupported("post"))?;
        let body = self.get_with_retry(&url, self.accept()).await?;

        match self.schema.family() {
            family @ (SourceFamily::FoolFuuka | SourceFamily::FourPlebs) => {
                let post = parse::parse_foolfuuka_post(&body, board, id, family)?;
                self.cache.put_post(post.clone());
                Ok(post)
            }
            SourceFamily::FourChan | SourceFamily::HtmlOnly => {
                // The endpoint answers with a whole thread.
                let thread_id = self.location.thread_id.as_deref().unwrap_or(id);
                let thread = self.parse_thread(&body, board, thread_id)?;
                let post = thread
                    .post(id)
                    .cloned()
                    .ok_or_else(|| FetchError::NotFound {
                        board: board.to_string(),
                        id: id.to_string(),
                    })?;
                self.cache.put_thread(thread);
                Ok(post)
            }
        }
    }

    /// Resolve a thread: cache first, then the archive.
    pub async fn fetch_thread(&self, id: &str, board: &str) -> Result<Thread, FetchError> {
        let key = PostKey::new(board, id);
        if let Some(thread) = self.cache.get_thread(&key) {
            debug!(thread = %key, "Thread served from cache");
            return Ok(thread);
        }
        self.refresh_thread(id, board).await
    }

    /// Fetch a thread from the archive regardless of the cache and overwrite
    /// the cached copy.
    #[instrument(skip(self), fields(schema = self.schema.name()))]
    pub async fn refresh_thread(&self, id: &str, board: &str) -> Result<Thread, FetchError> {
        let url = self
            .schema
            .thread_api_url(&self.location, board, id)
            .ok_or_else(|| self.unsupported("thread"))?;
        let body = self.get_with_retry(&url, self.accept()).await?;
        let thread = self.parse_thread(&body, board, id)?;
        self.cache.put_thread(thread.clone());
        Ok(thread)
    }

    fn parse_thread(&self, body: &str, board: &str, thread_id: &str) -> Result<Thread, FetchError> {
        match self.schema.family() {
            SourceFamily::FourChan => parse::parse_fourchan_thread(body, board),
            family @ (SourceFamily::FoolFuuka | SourceFamily::FourPlebs) => {
                parse::parse_foolfuuka_thread(body, board, thread_id, family)
            }
            SourceFamily::HtmlOnly => {
                parse::parse_html_thread(body, self.schema.as_ref(), board, thread_id)
            }
        }
    }

    /// One request bounded by the configured timeout.
    async fn send_once(&self, url: &str, accept: Accept) -> Result<HttpResponse, FetchError> {
        let timeout = self.network.request_timeout();
        match tokio::time::timeout(timeout, self.transport.get(url, accept)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                after_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// GET `url`, retrying only on 429 with linear backoff.
    async fn get_with_retry(&self, url: &str, accept: Accept) -> Result<String, FetchError> {
        let mut attempt: u32 = 0;
        loop {
            let response = self.send_once(url, accept).await?;
            if response.status == 429 {
                if attempt >= self.network.max_retries {
                    warn!(url, attempts = attempt + 1, "Rate limit retries exhausted");
                    return Err(FetchError::RateLimitExhausted {
                        url: url.to_string(),
                        attempts: attempt + 1,
                    });
                }
                let wait = self.network.backoff(attempt);
                warn!(
                    url,
                    attempt = attempt + 1,
                    wait_ms = wait.as_millis() as u64,
                    "Rate limited, backing off"
                );
                sleep(wait).await;
                attempt += 1;
                continue;
            }
            if !response.is_success() {
                return Err(FetchError::Http {
                    url: url.to_string(),
                    status: Some(response.status),
                    message: format!("HTTP {}", response.status),
                });
            }
            debug!(url, status = response.status, bytes = response.body.len(), "Fetched");
            return Ok(response.body);
        }
    }
}
