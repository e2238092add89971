//! Where feed pages come from
//!
//! The controller only talks to a [`FeedSource`]; [`HttpFeedSource`] is the
//! real implementation and [`super::mock::MockFeedSource`] the scripted one
//! used by tests.

use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;
use tracing::debug;

use crate::config::FeedConfig;
use crate::error::{ConfigError, FeedError, Result};
use crate::types::Page;

/// Query parameter carrying the continuation cursor
pub const CURSOR_PARAM: &str = "next_token";

/// A cursor-paginated feed
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the page after `cursor`, or the first page when `cursor` is `None`.
    ///
    /// Every failure (network, timeout, non-2xx) is a [`FeedError`]; callers
    /// do not distinguish between them.
    async fn fetch_page(&self, cursor: Option<&str>) -> std::result::Result<Page, FeedError>;

    /// Short identifier used in logs
    fn name(&self) -> &str;
}

/// Feed source backed by an HTTP endpoint returning
/// `{ "captions": [...], "next_token": "..." }`
pub struct HttpFeedSource {
    client: reqwest::Client,
    url: Url,
}

impl HttpFeedSource {
    /// Create a source for `url` with a per-request `timeout`
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| ConfigError::InvalidValue {
            field: "feed.url".to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                field: "feed.url".to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            }
            .into());
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Unavailable(e.to_string()))?;

        Ok(Self { client, url })
    }

    /// Create a source from the `[feed]` config section
    pub fn from_config(config: &FeedConfig) -> Result<Self> {
        Self::new(config.require_url()?, config.timeout())
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The URL requested for `cursor`
    pub fn page_url(&self, cursor: Option<&str>) -> Url {
        let mut url = self.url.clone();
        if let Some(cursor) = cursor {
            url.query_pairs_mut().append_pair(CURSOR_PARAM, cursor);
        }
        url
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch_page(&self, cursor: Option<&str>) -> std::result::Result<Page, FeedError> {
        let url = self.page_url(cursor);
        debug!(%url, "GET feed page");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        Ok(Page::from_body(&body))
    }

    fn name(&self) -> &str {
        "http"
    }
}
