//! Generic status polling task.

use crate::backoff::PollingConfig;
use app_lifecycle::{AppState, LifecycleObserver, LifecycleSubscription};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Fetches the current status of one resource.
#[async_trait]
pub trait StatusFetcher<Id, S, E>: Send + Sync {
    async fn fetch_status(&self, id: &Id) -> Result<S, E>;
}

/// Decides whether a freshly fetched snapshot differs meaningfully from the
/// last one handed out. The first argument is `None` until something was seen.
pub type ChangePredicate<S> = Arc<dyn Fn(Option<&S>, &S) -> bool + Send + Sync>;

/// A resource snapshot carrying a status and a last-modified marker.
pub trait Snapshot {
    type Status: PartialEq;

    fn status(&self) -> &Self::Status;
    fn status_updated(&self) -> Option<DateTime<Utc>>;
}

/// Reports a change when either the status or its last-modified marker moved.
pub fn default_change_predicate<S>() -> ChangePredicate<S>
where
    S: Snapshot + 'static,
{
    Arc::new(|previous: Option<&S>, next: &S| match previous {
        None => true,
        Some(previous) => {
            previous.status_updated() != next.status_updated() || previous.status() != next.status()
        }
    })
}

/// Externally visible polling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingState {
    /// Never started.
    Idle,
    /// Scheduling polls.
    Polling,
    /// Stopped by the owner, or after a failed fetch.
    Paused,
    /// Started but suspended while the app is in the background.
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Paused,
}

type InFlight<S, E> = BoxFuture<'static, Result<S, E>>;

/// Polls one resource until stopped.
///
/// The task is passive: nothing happens unless the owner awaits
/// [`PollingTask::next_update`], usually inside its own `select!` loop.
/// `next_update` is cancel-safe, so `start`/`stop` can be interleaved
/// with it from the same loop. At most one fetch is outstanding at a time.
pub struct PollingTask<Id, S, E> {
    id: Id,
    fetcher: Arc<dyn StatusFetcher<Id, S, E>>,
    predicate: ChangePredicate<S>,
    config: PollingConfig,
    lifecycle: LifecycleSubscription,
    lifecycle_open: bool,
    app_active: bool,
    phase: Phase,
    interval: Duration,
    deadline: Option<Instant>,
    in_flight: Option<InFlight<S, E>>,
    last_seen: Option<S>,
    state_tx: watch::Sender<PollingState>,
}

impl<Id, S, E> PollingTask<Id, S, E>
where
    Id: Clone + Send + Sync + std::fmt::Debug + 'static,
    S: Clone + Send + 'static,
    E: Send + 'static,
{
    pub fn new(
        id: Id,
        initial: Option<S>,
        fetcher: Arc<dyn StatusFetcher<Id, S, E>>,
        predicate: ChangePredicate<S>,
        config: PollingConfig,
        lifecycle: &dyn LifecycleObserver,
    ) -> Self {
        let lifecycle = lifecycle.subscribe();
        let app_active = lifecycle.current().is_active();
        let (state_tx, _) = watch::channel(PollingState::Idle);
        Self {
            id,
            fetcher,
            predicate,
            config,
            lifecycle,
            lifecycle_open: true,
            app_active,
            phase: Phase::Idle,
            interval: config.initial_interval,
            deadline: None,
            in_flight: None,
            last_seen: initial,
            state_tx,
        }
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn last_seen(&self) -> Option<&S> {
        self.last_seen.as_ref()
    }

    pub fn current_interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> PollingState {
        match self.phase {
            Phase::Idle => PollingState::Idle,
            Phase::Paused => PollingState::Paused,
            Phase::Running if self.app_active => PollingState::Polling,
            Phase::Running => PollingState::Inactive,
        }
    }

    pub fn is_polling(&self) -> bool {
        self.phase == Phase::Running
    }

    /// Receiver that tracks [`PollingTask::state`].
    pub fn watch_state(&self) -> watch::Receiver<PollingState> {
        self.state_tx.subscribe()
    }

    /// Begin polling. The first fetch happens one interval from now.
    ///
    /// No-op while already polling; otherwise the interval restarts from
    /// its initial value.
    pub fn start(&mut self) {
        if self.phase == Phase::Running {
            return;
        }
        self.phase = Phase::Running;
        self.interval = self.config.initial_interval;
        if self.app_active {
            self.deadline = Some(Instant::now() + self.interval);
        }
        debug!(
            id = ?self.id,
            interval_ms = self.interval.as_millis() as u64,
            "polling started"
        );
        self.publish_state();
    }

    /// Cancel the outstanding fetch and any scheduled poll. Idempotent.
    pub fn stop(&mut self) {
        let cancelled = self.in_flight.take().is_some();
        self.deadline = None;
        if self.phase != Phase::Paused {
            debug!(id = ?self.id, cancelled_in_flight = cancelled, "polling stopped");
        }
        self.phase = Phase::Paused;
        self.publish_state();
    }

    /// Wait for the next meaningful change or a failed fetch.
    ///
    /// After a failure the task is paused and must be started again to
    /// resume. Pends forever while not polling.
    pub async fn next_update(&mut self) -> Result<S, E> {
        loop {
            tokio::select! {
                change = self.lifecycle.changed(), if self.lifecycle_open => {
                    self.on_lifecycle(change);
                }
                result = in_flight_response(&mut self.in_flight) => {
                    self.in_flight = None;
                    match result {
                        Ok(snapshot) => {
                            let changed = (self.predicate)(self.last_seen.as_ref(), &snapshot);
                            self.schedule_retry();
                            if changed {
                                debug!(id = ?self.id, "status changed");
                                self.last_seen = Some(snapshot.clone());
                                return Ok(snapshot);
                            }
                            trace!(id = ?self.id, "status unchanged");
                        }
                        Err(error) => {
                            warn!(id = ?self.id, "status fetch failed, polling paused");
                            self.deadline = None;
                            self.phase = Phase::Paused;
                            self.publish_state();
                            return Err(error);
                        }
                    }
                }
                () = deadline_elapsed(self.deadline) => {
                    self.deadline = None;
                    self.issue_fetch();
                }
            }
        }
    }

    fn issue_fetch(&mut self) {
        let fetcher = Arc::clone(&self.fetcher);
        let id = self.id.clone();
        trace!(id = ?self.id, "poll issued");
        self.in_flight = Some(Box::pin(async move { fetcher.fetch_status(&id).await }));
    }

    fn schedule_retry(&mut self) {
        if self.phase != Phase::Running || !self.app_active {
            return;
        }
        self.deadline = Some(Instant::now() + self.interval);
        self.interval = self.config.backoff.next_interval(self.interval);
    }

    fn on_lifecycle(&mut self, change: Option<AppState>) {
        match change {
            Some(AppState::Inactive) => self.suspend(),
            Some(AppState::Active) => self.resume(),
            None => {
                // Observer gone; no further transitions will arrive.
                self.lifecycle_open = false;
                if !self.app_active {
                    self.resume();
                }
            }
        }
    }

    fn suspend(&mut self) {
        self.app_active = false;
        let cancelled = self.in_flight.take().is_some();
        self.deadline = None;
        debug!(id = ?self.id, cancelled_in_flight = cancelled, "app inactive, polling suspended");
        self.publish_state();
    }

    fn resume(&mut self) {
        self.app_active = true;
        if self.phase == Phase::Running {
            debug!(id = ?self.id, "app active, polling now");
            self.deadline = None;
            self.issue_fetch();
        }
        self.publish_state();
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(self.state());
    }
}

async fn in_flight_response<S, E>(slot: &mut Option<InFlight<S, E>>) -> Result<S, E> {
    match slot {
        Some(fetch) => fetch.await,
        None => pending().await,
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending().await,
    }
}
