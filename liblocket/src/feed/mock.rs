//! Scripted feed source for testing
//!
//! Responses are queued up front and handed out in order, one per request.
//! Once the script runs out the fallback response is repeated. Every call is
//! recorded so tests can check which cursors were requested.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::FeedError;
use crate::feed::source::FeedSource;
use crate::types::{FeedItem, Page};

type Response = std::result::Result<Page, FeedError>;

/// Mock feed source
#[derive(Clone)]
pub struct MockFeedSource {
    script: Arc<Mutex<VecDeque<Response>>>,
    fallback: Response,
    delay: Duration,
    calls: Arc<Mutex<Vec<Option<String>>>>,
}

impl MockFeedSource {
    /// A source with an empty script that answers every request with `fallback`
    pub fn new(fallback: Response) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback,
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Serve `pages` in order, then fail
    pub fn pages(pages: Vec<Page>) -> Self {
        let source = Self::new(Err(FeedError::Unavailable("script exhausted".to_string())));
        for page in pages {
            source.push(Ok(page));
        }
        source
    }

    /// Fail every request
    pub fn failing() -> Self {
        Self::new(Err(FeedError::Status(503)))
    }

    /// Wait this long before answering (simulates network latency)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue one more response
    pub fn push(&self, response: Response) {
        self.script.lock().unwrap().push_back(response);
    }

    /// Cursors requested so far, in call order
    pub fn calls(&self) -> Vec<Option<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl FeedSource for MockFeedSource {
    async fn fetch_page(&self, cursor: Option<&str>) -> Response {
        self.calls.lock().unwrap().push(cursor.map(str::to_string));

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Build feed items whose only field is `id`
pub fn items_with_ids(ids: &[&str]) -> Vec<FeedItem> {
    ids.iter()
        .map(|id| FeedItem::new(serde_json::json!({ "id": id })))
        .collect()
}
