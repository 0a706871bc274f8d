//! Application foreground/background notifications.
//!
//! The embedding application owns one [`AppLifecycle`] and reports
//! "became active" / "will resign active" transitions into it. Polling
//! components receive it as an injected [`LifecycleObserver`] and hold a
//! [`LifecycleSubscription`] for as long as they run. Dropping the
//! subscription unsubscribes.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Foreground state of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppState {
    Active,
    Inactive,
}

impl AppState {
    pub fn is_active(self) -> bool {
        matches!(self, AppState::Active)
    }
}

/// Source of foreground/background transitions.
pub trait LifecycleObserver: Send + Sync {
    fn subscribe(&self) -> LifecycleSubscription;
}

impl<T: LifecycleObserver + ?Sized> LifecycleObserver for Arc<T> {
    fn subscribe(&self) -> LifecycleSubscription {
        (**self).subscribe()
    }
}

/// Lifecycle notifier backed by a watch channel.
#[derive(Debug)]
pub struct AppLifecycle {
    tx: watch::Sender<AppState>,
}

impl AppLifecycle {
    /// Create a notifier for an application that starts in the foreground.
    pub fn new() -> Self {
        Self::with_state(AppState::Active)
    }

    pub fn with_state(initial: AppState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn did_become_active(&self) {
        self.transition(AppState::Active);
    }

    pub fn will_resign_active(&self) {
        self.transition(AppState::Inactive);
    }

    pub fn state(&self) -> AppState {
        *self.tx.borrow()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn transition(&self, next: AppState) {
        let changed = self.tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            debug!(state = ?next, subscribers = self.subscriber_count(), "app lifecycle transition");
        }
    }
}

impl Default for AppLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleObserver for AppLifecycle {
    fn subscribe(&self) -> LifecycleSubscription {
        LifecycleSubscription {
            rx: self.tx.subscribe(),
        }
    }
}

/// A single subscriber's view of the lifecycle.
///
/// Transitions that happen faster than the subscriber observes them are
/// coalesced: after `Inactive -> Active` the subscriber may only see a
/// notification carrying `Active`.
#[derive(Debug)]
pub struct LifecycleSubscription {
    rx: watch::Receiver<AppState>,
}

impl LifecycleSubscription {
    /// State at the time of the call.
    pub fn current(&self) -> AppState {
        *self.rx.borrow()
    }

    /// Wait for the next transition.
    ///
    /// Returns `None` once the notifier is gone; no further transitions
    /// will ever arrive after that.
    pub async fn changed(&mut self) -> Option<AppState> {
        match self.rx.changed().await {
            Ok(()) => Some(*self.rx.borrow_and_update()),
            Err(_) => None,
        }
    }
}
