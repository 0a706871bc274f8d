//! Standalone polling loop on its own tokio task.

use crate::polling::{PollingState, PollingTask};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

enum Command {
    Start,
    Stop,
}

/// Owner handle for a [`PollingTask`] running on its own tokio task.
///
/// Dropping the handle aborts the loop together with any in-flight fetch.
pub struct PollingHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<PollingState>,
    join: JoinHandle<()>,
}

impl PollingHandle {
    pub fn start(&self) {
        let _ = self.commands.send(Command::Start);
    }

    pub fn stop(&self) {
        let _ = self.commands.send(Command::Stop);
    }

    pub fn state(&self) -> PollingState {
        *self.state.borrow()
    }

    /// Wait until the loop reports `state`.
    pub async fn wait_for_state(&mut self, state: PollingState) {
        let _ = self.state.wait_for(|current| *current == state).await;
    }
}

impl Drop for PollingHandle {
    fn drop(&mut self) {
        self.join.abort();
    }
}

impl<Id, S, E> PollingTask<Id, S, E>
where
    Id: Clone + Send + Sync + std::fmt::Debug + 'static,
    S: Clone + Send + 'static,
    E: Send + 'static,
{
    /// Run this task on its own tokio task, invoking `on_update` for every
    /// change or failure. Updates are delivered one at a time, in order.
    pub fn spawn<F>(mut self, mut on_update: F) -> PollingHandle
    where
        F: FnMut(Result<S, E>) + Send + 'static,
    {
        let (commands, mut rx) = mpsc::unbounded_channel();
        let state = self.watch_state();

        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    command = rx.recv() => match command {
                        Some(Command::Start) => self.start(),
                        Some(Command::Stop) => self.stop(),
                        None => break,
                    },
                    update = self.next_update() => on_update(update),
                }
            }
            self.stop();
            debug!(id = ?self.id(), "polling loop exited");
        });

        PollingHandle {
            commands,
            state,
            join,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::backoff::PollingConfig;
    use crate::polling::{ChangePredicate, PollingState, PollingTask, StatusFetcher};
    use app_lifecycle::AppLifecycle;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct Counter {
        polls: AtomicU32,
    }

    #[async_trait]
    impl StatusFetcher<&'static str, u32, String> for Counter {
        async fn fetch_status(&self, _id: &&'static str) -> Result<u32, String> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 4 {
                Err("gone".to_string())
            } else {
                Ok(n)
            }
        }
    }

    fn every_value() -> ChangePredicate<u32> {
        Arc::new(|previous: Option<&u32>, next: &u32| previous != Some(next))
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_loop_delivers_updates_in_order_until_failure() {
        let lifecycle = AppLifecycle::new();
        let fetcher = Arc::new(Counter {
            polls: AtomicU32::new(0),
        });
        let task = PollingTask::new(
            "credentials-1",
            None,
            fetcher.clone() as Arc<dyn StatusFetcher<_, _, _>>,
            every_value(),
            PollingConfig::default(),
            &lifecycle,
        );

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut handle = task.spawn(move |update| sink.lock().unwrap().push(update));

        handle.start();
        handle.wait_for_state(PollingState::Polling).await;
        handle.wait_for_state(PollingState::Paused).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Ok(1), Ok(2), Ok(3), Err("gone".to_string())]
        );
        assert_eq!(fetcher.polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_stops_polling() {
        let lifecycle = AppLifecycle::new();
        let fetcher = Arc::new(Counter {
            polls: AtomicU32::new(0),
        });
        let task = PollingTask::new(
            "credentials-2",
            None,
            fetcher.clone() as Arc<dyn StatusFetcher<_, _, _>>,
            every_value(),
            PollingConfig::default(),
            &lifecycle,
        );

        let handle = task.spawn(|_| {});
        handle.start();
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(fetcher.polls.load(Ordering::SeqCst), 1);

        drop(handle);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fetcher.polls.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_through_handle_pauses() {
        let lifecycle = AppLifecycle::new();
        let fetcher = Arc::new(Counter {
            polls: AtomicU32::new(0),
        });
        let task = PollingTask::new(
            "credentials-3",
            None,
            fetcher.clone() as Arc<dyn StatusFetcher<_, _, _>>,
            every_value(),
            PollingConfig::default(),
            &lifecycle,
        );

        let mut handle = task.spawn(|_| {});
        handle.start();
        handle.wait_for_state(PollingState::Polling).await;
        handle.stop();
        handle.wait_for_state(PollingState::Paused).await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fetcher.polls.load(Ordering::SeqCst), 0);
    }
}
