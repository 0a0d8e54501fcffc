//! Reply lookup against the FoolFuuka backlinks endpoint.

use super::{parse, Accept, ArchiveClient};
use crate::error::FetchError;
use tokio::time::sleep;
use tracing::{debug, warn};

impl ArchiveClient {
    /// Post numbers of the replies to `board/id` known to the archive.
    ///
    /// Unlike post and thread fetches, any failure is retried, up to
    /// `max_retries` times with the same linear backoff; the last error is
    /// returned once retries run out.
    pub async fn fetch_replies(&self, id: &str, board: &str) -> Result<Vec<String>, FetchError> {
        let url = self
            .schema()
            .replies_api_url(self.location(), board, id)
            .ok_or_else(|| FetchError::UnsupportedSite {
                schema: self.schema().name().to_string(),
                operation: "replies".to_string(),
            })?;

        let max_retries = self.network().max_retries;
        let mut attempt: u32 = 0;
        loop {
            match self.replies_once(&url).await {
                Ok(replies) => {
                    debug!(board, id, count = replies.len(), "Fetched replies");
                    return Ok(replies);
                }
                Err(e) if attempt >= max_retries => {
                    warn!(board, id, error = %e, "Giving up on replies");
                    return Err(e);
                }
                Err(e) => {
                    let wait = self.network().backoff(attempt);
                    warn!(
                        board,
                        id,
                        attempt = attempt + 1,
                        error = %e,
                        "Replies lookup failed, retrying"
                    );
                    sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn replies_once(&self, url: &str) -> Result<Vec<String>, FetchError> {
        let response = self.send_once(url, Accept::Json).await?;
        if !response.is_success() {
            return Err(FetchError::Http {
                url: url.to_string(),
                status: Some(response.status),
                message: format!("HTTP {}", response.status),
            });
        }
        parse::parse_replies(&response.body)
    }
}
