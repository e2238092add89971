//! Async driver for [`FeedLoader`]
//!
//! [`FeedController::spawn`] moves a loader into a tokio task together with a
//! [`FeedSource`]. The task reads [`LoaderEvent`]s from one queue, feeds them
//! through the loader and carries out the returned effects: requests and
//! timers run as spawned tasks that post their completion back into the same
//! queue, so the loader only ever sees one event at a time.
//!
//! Presentation layers read [`FeedView`] snapshots from a `watch` channel and
//! follow [`Notice`]s on the broadcast bus. Both are updated after each event,
//! view first.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use liblocket::feed::{FeedController, HttpFeedSource, LoaderSettings};
//!
//! # async fn example() -> liblocket::Result<()> {
//! let source = HttpFeedSource::new("https://api.example.com/captions", Duration::from_secs(10))?;
//! let controller = FeedController::spawn(Arc::new(source), LoaderSettings::default());
//!
//! controller.mount();
//! controller.set_sentinel_visible(true);
//! if let Some(view) = controller.wait_for(|view| view.is_end_of_feed()).await {
//!     println!("{} items", view.items.len());
//! }
//! controller.teardown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

use super::events::{EventBus, Notice, NoticeReceiver};
use super::loader::{Effect, FeedLoader, LoaderEvent, LoaderSettings, Timer};
use super::source::FeedSource;
use super::state::FeedView;

/// Handle to a running feed loader
///
/// Dropping the handle tears the loader down.
pub struct FeedController {
    events: mpsc::UnboundedSender<LoaderEvent>,
    view: watch::Receiver<FeedView>,
    bus: EventBus,
    task: Option<JoinHandle<()>>,
}

impl FeedController {
    /// Start a loader on the current tokio runtime
    pub fn spawn(source: Arc<dyn FeedSource>, settings: LoaderSettings) -> Self {
        let loader = FeedLoader::new(settings);
        let (events, inbox) = mpsc::unbounded_channel();
        let (view_tx, view) = watch::channel(loader.view());
        let bus = EventBus::default();

        let driver = Driver {
            loader,
            source,
            outbox: events.clone(),
            inbox,
            view: view_tx,
            bus: bus.clone(),
            fetch: None,
            debounce: None,
            retry_backoff: None,
        };
        let task = tokio::spawn(driver.run());

        Self {
            events,
            view,
            bus,
            task: Some(task),
        }
    }

    /// Follow loader notices from now on
    pub fn subscribe(&self) -> NoticeReceiver {
        self.bus.subscribe()
    }

    /// Signal that the feed view is shown (starts the initial load once)
    pub fn mount(&self) {
        self.send(LoaderEvent::Mounted);
    }

    /// Report whether the "load more" sentinel is in the viewport
    pub fn set_sentinel_visible(&self, visible: bool) {
        self.send(LoaderEvent::SentinelVisibility(visible));
    }

    pub fn manual_retry(&self) {
        self.send(LoaderEvent::ManualRetry);
    }

    /// Latest snapshot
    pub fn view(&self) -> FeedView {
        self.view.borrow().clone()
    }

    /// A receiver that is notified on every state change
    pub fn watch(&self) -> watch::Receiver<FeedView> {
        self.view.clone()
    }

    /// Wait until the view satisfies `predicate`.
    ///
    /// Returns `None` if the loader stops first.
    pub async fn wait_for<F>(&self, predicate: F) -> Option<FeedView>
    where
        F: FnMut(&FeedView) -> bool,
    {
        let mut view = self.view.clone();
        let result = view.wait_for(predicate).await;
        result.ok().map(|view| view.clone())
    }

    /// Cancel timers, abandon the in-flight request and stop the driver task
    pub async fn teardown(mut self) {
        self.send(LoaderEvent::Teardown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn send(&self, event: LoaderEvent) {
        if self.events.send(event).is_err() {
            debug!("Feed controller stopped, dropping event");
        }
    }
}

impl Drop for FeedController {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.events.send(LoaderEvent::Teardown);
        }
    }
}

struct Driver {
    loader: FeedLoader,
    source: Arc<dyn FeedSource>,
    outbox: mpsc::UnboundedSender<LoaderEvent>,
    inbox: mpsc::UnboundedReceiver<LoaderEvent>,
    view: watch::Sender<FeedView>,
    bus: EventBus,
    fetch: Option<JoinHandle<()>>,
    debounce: Option<JoinHandle<()>>,
    retry_backoff: Option<JoinHandle<()>>,
}

impl Driver {
    async fn run(mut self) {
        debug!(source = self.source.name(), "Feed controller started");

        while let Some(event) = self.inbox.recv().await {
            let teardown = matches!(event, LoaderEvent::Teardown);

            let mut notices = Vec::new();
            for effect in self.loader.handle(event) {
                self.apply(effect, &mut notices);
            }

            self.view.send_replace(self.loader.view());
            for notice in notices {
                self.bus.emit(notice);
            }

            if teardown {
                break;
            }
        }

        self.abort_all();
        debug!("Feed controller stopped");
    }

    /// Carry out one effect; notices are held back until the view is published
    fn apply(&mut self, effect: Effect, notices: &mut Vec<Notice>) {
        match effect {
            Effect::Fetch { request, cursor } => {
                let source = Arc::clone(&self.source);
                let outbox = self.outbox.clone();
                let handle = tokio::spawn(async move {
                    let result = source.fetch_page(cursor.as_deref()).await;
                    let _ = outbox.send(LoaderEvent::PageLoaded { request, result });
                });
                if let Some(previous) = self.fetch.replace(handle) {
                    previous.abort();
                }
            }
            Effect::StartTimer {
                timer,
                token,
                delay,
            } => {
                let outbox = self.outbox.clone();
                let handle = tokio::spawn(async move {
                    sleep(delay).await;
                    let _ = outbox.send(LoaderEvent::TimerElapsed { timer, token });
                });
                if let Some(previous) = self.timer_slot(timer).replace(handle) {
                    previous.abort();
                }
            }
            Effect::CancelTimer(timer) => {
                if let Some(handle) = self.timer_slot(timer).take() {
                    handle.abort();
                }
            }
            Effect::AbortFetch(request) => {
                debug!(?request, "Abandoning in-flight request");
                if let Some(handle) = self.fetch.take() {
                    handle.abort();
                }
            }
            Effect::Notify(notice) => notices.push(notice),
        }
    }

    fn timer_slot(&mut self, timer: Timer) -> &mut Option<JoinHandle<()>> {
        match timer {
            Timer::Debounce => &mut self.debounce,
            Timer::RetryBackoff => &mut self.retry_backoff,
        }
    }

    fn abort_all(&mut self) {
        for handle in [
            self.fetch.take(),
            self.debounce.take(),
            self.retry_backoff.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}
