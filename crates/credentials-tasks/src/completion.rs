//! Single-resolution outcome channel shared by task actors.

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::error;

/// Create the two ends of a task outcome.
///
/// `interrupted` builds the error reported when the actor ends without
/// completing, e.g. because the runtime is shutting down.
pub fn outcome_channel<T, E>(
    task: &'static str,
    interrupted: fn() -> E,
) -> (Completer<T, E>, PendingOutcome<T, E>) {
    let (tx, rx) = oneshot::channel();
    (
        Completer { task, tx: Some(tx) },
        PendingOutcome { rx, interrupted },
    )
}

/// Actor-side end. Resolving it twice is a programming error.
pub struct Completer<T, E> {
    task: &'static str,
    tx: Option<oneshot::Sender<Result<T, E>>>,
}

impl<T, E> Completer<T, E> {
    pub fn is_completed(&self) -> bool {
        self.tx.is_none()
    }

    /// Deliver the outcome. Returns false if one was already delivered.
    pub fn complete(&mut self, result: Result<T, E>) -> bool {
        match self.tx.take() {
            Some(tx) => {
                // Receiver gone means nobody is waiting for the result.
                let _ = tx.send(result);
                true
            }
            None => {
                error!(task = self.task, "task completed twice");
                debug_assert!(false, "{} completed twice", self.task);
                false
            }
        }
    }
}

/// Caller-side end, paired with the actor's join handle by [`TaskOutcome`].
pub struct PendingOutcome<T, E> {
    rx: oneshot::Receiver<Result<T, E>>,
    interrupted: fn() -> E,
}

impl<T, E> PendingOutcome<T, E> {
    pub fn attach(self, join: JoinHandle<()>) -> TaskOutcome<T, E> {
        TaskOutcome {
            rx: self.rx,
            interrupted: self.interrupted,
            join: Some(join),
            resolved: None,
        }
    }
}

/// The awaited result of a task actor.
///
/// Dropping it aborts the actor together with everything the actor owns.
pub struct TaskOutcome<T, E> {
    rx: oneshot::Receiver<Result<T, E>>,
    interrupted: fn() -> E,
    join: Option<JoinHandle<()>>,
    resolved: Option<Result<T, E>>,
}

impl<T: Clone, E: Clone> TaskOutcome<T, E> {
    /// Wait for the outcome. Cancel-safe; resolved outcomes are cached.
    ///
    /// A panic inside the actor is re-raised here.
    pub async fn get(&mut self) -> Result<T, E> {
        if let Some(resolved) = &self.resolved {
            return resolved.clone();
        }

        let result = match (&mut self.rx).await {
            Ok(result) => result,
            Err(_) => {
                if let Some(join) = self.join.take() {
                    if let Err(err) = join.await {
                        if err.is_panic() {
                            std::panic::resume_unwind(err.into_panic());
                        }
                    }
                }
                Err((self.interrupted)())
            }
        };

        self.resolved = Some(result.clone());
        result
    }

    /// True once an outcome has been observed through [`get`](Self::get).
    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }
}

impl<T, E> Drop for TaskOutcome<T, E> {
    fn drop(&mut self) {
        if let Some(join) = &self.join {
            join.abort();
        }
    }
}
