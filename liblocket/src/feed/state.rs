//! Loader phase and the read-only view handed to presentation layers

use serde::{Deserialize, Serialize};

use crate::types::FeedItem;

/// Where the loader is in its fetch lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Nothing in flight; a "load more" trigger may dispatch a request
    Idle,
    /// A request is in flight
    Loading,
    /// A request failed and the loader is working through its retry budget.
    /// Stays set across the backoff wait and the retry attempt itself.
    Retrying,
    /// Retries are used up; only a manual retry leaves this phase
    Error,
}

impl Phase {
    /// True while a request is in flight or a retry is pending
    pub fn is_busy(self) -> bool {
        matches!(self, Phase::Loading | Phase::Retrying)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Loading => write!(f, "loading"),
            Phase::Retrying => write!(f, "retrying"),
            Phase::Error => write!(f, "error"),
        }
    }
}

/// Snapshot of loader state for rendering
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedView {
    pub items: Vec<FeedItem>,
    pub phase: Phase,
    pub has_more: bool,
    /// Display-only message, set once automatic retries are exhausted
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub initialized: bool,
}

impl FeedView {
    /// Everything has been loaded and nothing is pending
    pub fn is_end_of_feed(&self) -> bool {
        !self.has_more && self.phase == Phase::Idle
    }

    /// Whether the "load more" sentinel should be rendered at all
    pub fn shows_sentinel(&self) -> bool {
        self.has_more && self.error.is_none()
    }

    /// Progress line shown while automatic retries run
    pub fn retry_progress(&self) -> Option<String> {
        (self.phase == Phase::Retrying)
            .then(|| format!("Retrying... ({}/{})", self.retry_count, self.max_retries))
    }
}
