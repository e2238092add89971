//! Paginated feed loading
//!
//! - [`loader`]: the state machine (no I/O)
//! - [`controller`]: runs a loader on tokio against a [`FeedSource`]
//! - [`source`]: the HTTP feed endpoint
//! - [`events`]: progress notices for presentation layers
//! - [`mock`]: scripted source for tests

pub mod controller;
pub mod events;
pub mod loader;
pub mod source;
pub mod state;

// Mock source is available for all builds to support integration tests
pub mod mock;

pub use controller::FeedController;
pub use events::{EventBus, Notice, NoticeReceiver};
pub use loader::{
    Effect, FeedLoader, LoaderEvent, LoaderSettings, RequestId, Timer, TimerToken, BASE_DELAY,
    DEBOUNCE, FETCH_FAILED_MESSAGE, MAX_RETRIES,
};
pub use source::{FeedSource, HttpFeedSource};
pub use state::{FeedView, Phase};
