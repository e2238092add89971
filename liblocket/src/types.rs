//! Core data types for Locketdash
//!
//! Feed items are kept as raw JSON: the loader only counts and orders them,
//! and whatever renders them gets back exactly what the server sent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One caption post from the feed, passed through unmodified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedItem(Value);

impl FeedItem {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Server-assigned id, when the record carries one
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn caption(&self) -> Option<&str> {
        self.0.get("caption").and_then(Value::as_str)
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }

    pub fn into_json(self) -> Value {
        self.0
    }
}

impl From<Value> for FeedItem {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// One page of the cursor-paginated feed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<FeedItem>,
    /// Continuation token; `None` marks the end of the stream
    pub next_cursor: Option<String>,
}

impl Page {
    pub fn new(items: Vec<FeedItem>, next_cursor: Option<String>) -> Self {
        Self { items, next_cursor }
    }

    /// A final page (no continuation token)
    pub fn last(items: Vec<FeedItem>) -> Self {
        Self::new(items, None)
    }

    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }

    /// Build a page from the wire shape `{ "captions": [...], "next_token": "..." }`.
    ///
    /// Parsing is lenient: missing or mistyped `captions` means no items, and
    /// a missing, empty or non-string `next_token` means no further pages.
    pub fn from_json(value: &Value) -> Self {
        let items = value
            .get("captions")
            .and_then(Value::as_array)
            .map(|captions| captions.iter().cloned().map(FeedItem::new).collect())
            .unwrap_or_default();

        let next_cursor = value
            .get("next_token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_string);

        Self { items, next_cursor }
    }

    /// Parse a response body. A body that is not JSON is an empty last page.
    pub fn from_body(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => Self::from_json(&value),
            Err(e) => {
                tracing::debug!("Feed response is not JSON ({}), treating as empty", e);
                Self::default()
            }
        }
    }
}
