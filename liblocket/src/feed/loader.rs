//! Incremental feed loading as an event-driven state machine
//!
//! [`FeedLoader`] owns the state of one paginated feed view. Everything that
//! can happen to it (mount, sentinel visibility, timer expiry, HTTP
//! completion, manual retry, teardown) arrives as a [`LoaderEvent`] and goes
//! through [`FeedLoader::handle`], which mutates state and returns the
//! [`Effect`]s the caller must carry out. The loader itself does no I/O and
//! never sleeps, so every transition can be driven step by step.
//!
//! At most one request is in flight at a time. The phase acts as the guard:
//! while it is `Loading` or `Retrying`, triggers other than the loader's own
//! backoff timer are ignored, including during the backoff wait.
//!
//! Timers and requests carry tokens. An event whose token no longer matches
//! the state (a cancelled timer that fired anyway, a response to an abandoned
//! request) is dropped.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::events::Notice;
use super::state::{FeedView, Phase};
use crate::config::FeedConfig;
use crate::error::FeedError;
use crate::types::{FeedItem, Page};

/// Automatic retries after a failed request
pub const MAX_RETRIES: u32 = 3;

/// First backoff delay; doubles with every further retry
pub const BASE_DELAY: Duration = Duration::from_secs(1);

/// Coalescing window for "load more" triggers
pub const DEBOUNCE: Duration = Duration::from_millis(200);

/// Message shown once automatic retries are exhausted
pub const FETCH_FAILED_MESSAGE: &str = "Could not load the feed. Please try again.";

/// The two timers a loader may have armed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    /// Delays a "load more" fetch after the sentinel becomes visible
    Debounce,
    /// Delays the next attempt after a failed request
    RetryBackoff,
}

/// Identifies one dispatched request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

/// Identifies one arming of a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

/// Input to the loader
#[derive(Debug, Clone)]
pub enum LoaderEvent {
    /// The feed view was shown; triggers the initial load once
    Mounted,
    /// The "load more" sentinel entered (`true`) or left (`false`) the viewport
    SentinelVisibility(bool),
    TimerElapsed { timer: Timer, token: TimerToken },
    PageLoaded {
        request: RequestId,
        result: Result<Page, FeedError>,
    },
    /// The user asked to try again after a terminal failure
    ManualRetry,
    /// The feed view is going away
    Teardown,
}

/// Work the loader asks its driver to perform
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Issue one GET; `cursor` goes into `next_token` when present
    Fetch {
        request: RequestId,
        cursor: Option<String>,
    },
    /// Arm `timer`, replacing any previous arming
    StartTimer {
        timer: Timer,
        token: TimerToken,
        delay: Duration,
    },
    CancelTimer(Timer),
    /// Abandon an in-flight request
    AbortFetch(RequestId),
    Notify(Notice),
}

/// Retry budget and timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderSettings {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub debounce: Duration,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay: BASE_DELAY,
            debounce: DEBOUNCE,
        }
    }
}

impl From<&FeedConfig> for LoaderSettings {
    fn from(config: &FeedConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.base_delay(),
            debounce: config.debounce(),
        }
    }
}

#[derive(Debug)]
struct InFlight {
    request: RequestId,
    cursor: Option<String>,
    retry_attempt: bool,
}

#[derive(Debug)]
struct ScheduledRetry {
    token: TimerToken,
    cursor: Option<String>,
}

/// State of one paginated feed view
#[derive(Debug)]
pub struct FeedLoader {
    settings: LoaderSettings,
    items: Vec<FeedItem>,
    cursor: Option<String>,
    has_more: bool,
    phase: Phase,
    retry_count: u32,
    initialized: bool,
    error: Option<String>,
    sentinel_visible: bool,
    in_flight: Option<InFlight>,
    debounce: Option<TimerToken>,
    retry_backoff: Option<ScheduledRetry>,
    next_token: u64,
    active: bool,
}

impl FeedLoader {
    pub fn new(settings: LoaderSettings) -> Self {
        Self {
            settings,
            items: Vec::new(),
            cursor: None,
            has_more: true,
            phase: Phase::Idle,
            retry_count: 0,
            initialized: false,
            error: None,
            sentinel_visible: false,
            in_flight: None,
            debounce: None,
            retry_backoff: None,
            next_token: 0,
            active: true,
        }
    }

    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// False once the loader has been torn down
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn view(&self) -> FeedView {
        FeedView {
            items: self.items.clone(),
            phase: self.phase,
            has_more: self.has_more,
            error: self.error.clone(),
            retry_count: self.retry_count,
            max_retries: self.settings.max_retries,
            initialized: self.initialized,
        }
    }

    /// Apply one event and return the effects it produced
    pub fn handle(&mut self, event: LoaderEvent) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !self.active {
            debug!(?event, "Loader torn down, ignoring event");
            return effects;
        }

        match event {
            LoaderEvent::Mounted => self.mount(&mut effects),
            LoaderEvent::SentinelVisibility(visible) => {
                self.sentinel_visible = visible;
                // A fresh intersection restarts the debounce window
                if visible && self.debounce.take().is_some() {
                    effects.push(Effect::CancelTimer(Timer::Debounce));
                }
            }
            LoaderEvent::TimerElapsed {
                timer: Timer::Debounce,
                token,
            } => {
                if self.debounce == Some(token) {
                    self.debounce = None;
                    if self.can_load_more() {
                        let cursor = self.cursor.clone();
                        self.dispatch(cursor, false, &mut effects);
                    }
                } else {
                    debug!(?token, "Ignoring stale debounce timer");
                }
            }
            LoaderEvent::TimerElapsed {
                timer: Timer::RetryBackoff,
                token,
            } => match self.retry_backoff.take() {
                Some(scheduled) if scheduled.token == token => {
                    self.dispatch(scheduled.cursor, true, &mut effects);
                }
                pending => {
                    self.retry_backoff = pending;
                    debug!(?token, "Ignoring stale retry timer");
                }
            },
            LoaderEvent::PageLoaded { request, result } => {
                self.complete(request, result, &mut effects)
            }
            LoaderEvent::ManualRetry => self.retry(&mut effects),
            LoaderEvent::Teardown => {
                self.teardown(&mut effects);
                return effects;
            }
        }

        self.settle_debounce(&mut effects);
        effects
    }

    /// Request the page after `cursor` (`None` for the first page).
    ///
    /// A no-op when a request is already in flight, when the loader is busy
    /// and this is not a retry attempt, or when the feed has ended and a
    /// cursor was supplied.
    pub fn fetch_page(&mut self, cursor: Option<String>, retry_attempt: bool) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.active {
            self.dispatch(cursor, retry_attempt, &mut effects);
            self.settle_debounce(&mut effects);
        }
        effects
    }

    /// Leave the error state and retry the current cursor with a fresh budget
    pub fn manual_retry(&mut self) -> Vec<Effect> {
        self.handle(LoaderEvent::ManualRetry)
    }

    fn mount(&mut self, effects: &mut Vec<Effect>) {
        if self.initialized {
            debug!("Feed already initialized, skipping initial load");
            return;
        }
        self.initialized = true;
        self.dispatch(None, false, effects);
    }

    fn can_load_more(&self) -> bool {
        self.sentinel_visible
            && self.has_more
            && self.phase == Phase::Idle
            && self.initialized
            && self.error.is_none()
            && self.in_flight.is_none()
    }

    /// Keep the debounce timer armed exactly while a "load more" may fire
    fn settle_debounce(&mut self, effects: &mut Vec<Effect>) {
        if self.can_load_more() {
            if self.debounce.is_none() {
                let token = self.next_timer_token();
                self.debounce = Some(token);
                effects.push(Effect::StartTimer {
                    timer: Timer::Debounce,
                    token,
                    delay: self.settings.debounce,
                });
            }
        } else if self.debounce.take().is_some() {
            effects.push(Effect::CancelTimer(Timer::Debounce));
        }
    }

    fn dispatch(&mut self, cursor: Option<String>, retry_attempt: bool, effects: &mut Vec<Effect>) {
        if self.in_flight.is_some() {
            debug!("Request already in flight, skipping fetch");
            return;
        }
        if !retry_attempt && self.phase.is_busy() {
            debug!(phase = %self.phase, "Loader busy, skipping fetch");
            return;
        }
        if !self.has_more && cursor.is_some() {
            debug!("End of feed reached, skipping fetch");
            return;
        }

        if !retry_attempt {
            self.phase = Phase::Loading;
            self.retry_count = 0;
            self.error = None;
        }

        let request = RequestId(self.next_token());
        debug!(?request, cursor = ?cursor, retry_attempt, "Dispatching feed request");
        self.in_flight = Some(InFlight {
            request,
            cursor: cursor.clone(),
            retry_attempt,
        });
        effects.push(Effect::Notify(Notice::FetchStarted {
            cursor: cursor.clone(),
            retry_attempt,
        }));
        effects.push(Effect::Fetch { request, cursor });
    }

    fn complete(
        &mut self,
        request: RequestId,
        result: Result<Page, FeedError>,
        effects: &mut Vec<Effect>,
    ) {
        let in_flight = match self.in_flight.take() {
            Some(in_flight) if in_flight.request == request => in_flight,
            other => {
                self.in_flight = other;
                debug!(?request, "Ignoring response to an abandoned request");
                return;
            }
        };

        match result {
            Ok(page) => {
                let count = page.items.len();
                self.items.extend(page.items);
                self.has_more = page.next_cursor.is_some();
                self.cursor = page.next_cursor;
                self.retry_count = 0;
                self.error = None;
                self.phase = Phase::Idle;

                if in_flight.retry_attempt {
                    info!("Feed request succeeded after retrying");
                }
                info!(
                    count,
                    total = self.items.len(),
                    has_more = self.has_more,
                    "Loaded feed page"
                );

                effects.push(Effect::Notify(Notice::PageAppended {
                    count,
                    total: self.items.len(),
                    has_more: self.has_more,
                }));
                if !self.has_more {
                    effects.push(Effect::Notify(Notice::EndOfFeed {
                        total: self.items.len(),
                    }));
                }
            }
            Err(err) if self.retry_count < self.settings.max_retries => {
                self.retry_count += 1;
                let delay = self.backoff_delay(self.retry_count);
                warn!(
                    "Feed request failed (attempt {}/{}): {}. Retrying in {}ms",
                    self.retry_count,
                    self.settings.max_retries,
                    err,
                    delay.as_millis()
                );

                // The guard stays busy until the retry sequence ends
                self.phase = Phase::Retrying;
                let token = self.next_timer_token();
                self.retry_backoff = Some(ScheduledRetry {
                    token,
                    cursor: in_flight.cursor,
                });
                effects.push(Effect::StartTimer {
                    timer: Timer::RetryBackoff,
                    token,
                    delay,
                });
                effects.push(Effect::Notify(Notice::RetryScheduled {
                    attempt: self.retry_count,
                    max_retries: self.settings.max_retries,
                    delay_ms: delay.as_millis() as u64,
                    error: err.to_string(),
                }));
            }
            Err(err) => {
                error!(
                    "Feed request failed after {} retries: {}",
                    self.settings.max_retries, err
                );
                self.phase = Phase::Error;
                self.retry_count = 0;
                self.error = Some(FETCH_FAILED_MESSAGE.to_string());
                effects.push(Effect::Notify(Notice::Failed {
                    error: FETCH_FAILED_MESSAGE.to_string(),
                    cause: err.to_string(),
                }));
            }
        }
    }

    fn retry(&mut self, effects: &mut Vec<Effect>) {
        if self.in_flight.is_some() {
            debug!("Request in flight, ignoring manual retry");
            return;
        }
        if !self.has_more {
            debug!("End of feed reached, nothing to retry");
            return;
        }

        if self.retry_backoff.take().is_some() {
            effects.push(Effect::CancelTimer(Timer::RetryBackoff));
        }
        self.phase = Phase::Idle;
        self.retry_count = 0;
        self.error = None;

        info!(cursor = ?self.cursor, "Manual retry requested");
        let cursor = self.cursor.clone();
        self.dispatch(cursor, false, effects);
    }

    fn teardown(&mut self, effects: &mut Vec<Effect>) {
        self.active = false;
        if self.debounce.take().is_some() {
            effects.push(Effect::CancelTimer(Timer::Debounce));
        }
        if self.retry_backoff.take().is_some() {
            effects.push(Effect::CancelTimer(Timer::RetryBackoff));
        }
        if let Some(in_flight) = self.in_flight.take() {
            effects.push(Effect::AbortFetch(in_flight.request));
        }
        debug!("Feed loader torn down");
    }

    /// `base_delay * 2^(attempt - 1)`
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.settings.base_delay.saturating_mul(factor)
    }

    fn next_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn next_timer_token(&mut self) -> TimerToken {
        TimerToken(self.next_token())
    }
}

impl Default for FeedLoader {
    fn default() -> Self {
        Self::new(LoaderSettings::default())
    }
}
