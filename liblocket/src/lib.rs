//! Locketdash - client toolkit for the Locket dashboard
//!
//! This library loads the cursor-paginated caption feed with bounded,
//! exponentially backed-off retries, and probes the health of the backend
//! nodes the dashboard talks to.

pub mod config;
pub mod error;
pub mod feed;
pub mod logging;
pub mod nodes;
pub mod settings;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{ConfigError, FeedError, LocketError, Result};
pub use feed::{FeedController, FeedLoader, FeedView, Phase};
pub use types::{FeedItem, Page};
