//! Progress notifications for feed loading
//!
//! The loader reports what it is doing as [`Notice`]s; the controller fans
//! them out over a `tokio::sync::broadcast` channel so any number of
//! presentation layers (CLI output, logs, tests) can follow along.
//!
//! Emitting never blocks. With no subscribers the notice is dropped, and a
//! lagging subscriber loses the oldest notices first.
//!
//! # Example
//!
//! ```
//! use liblocket::feed::events::{EventBus, Notice};
//!
//! let bus = EventBus::new(100);
//! let mut receiver = bus.subscribe();
//!
//! bus.emit(Notice::EndOfFeed { total: 3 });
//! assert!(matches!(receiver.try_recv(), Ok(Notice::EndOfFeed { total: 3 })));
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Notice receiver type alias
pub type NoticeReceiver = broadcast::Receiver<Notice>;

/// Broadcast channel for loader notices
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Notice>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` notices per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> NoticeReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, notice: Notice) {
        // Err only means nobody is listening
        let _ = self.sender.send(notice);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Something the loader did that a presentation layer may want to show
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    /// A request was dispatched
    FetchStarted {
        cursor: Option<String>,
        retry_attempt: bool,
    },

    /// A page arrived and its items were appended
    PageAppended {
        /// Items in this page
        count: usize,
        /// Items loaded so far
        total: usize,
        has_more: bool,
    },

    /// A request failed and another attempt is scheduled
    RetryScheduled {
        attempt: u32,
        max_retries: u32,
        delay_ms: u64,
        error: String,
    },

    /// Automatic retries are used up; a manual retry is needed.
    /// `error` is the message shown to the user, `cause` the last request error.
    Failed { error: String, cause: String },

    /// The last page has been loaded
    EndOfFeed { total: usize },
}
