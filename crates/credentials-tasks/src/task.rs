//! One state machine for adding, refreshing, updating and authenticating
//! credentials.
//!
//! Each [`CredentialsTask`] runs as its own tokio task (the actor) that
//! owns the initiating call, the status poll and any open sub-task.
//! Progress is reported through a callback invoked on the actor, one event
//! at a time; the terminal result is delivered exactly once through
//! [`CredentialsTask::outcome`].

use crate::authentication::{SubTaskDriver, SubTaskOutcome};
use crate::completion::{outcome_channel, Completer, TaskOutcome};
use crate::error::{
    CredentialsTaskError, CredentialsTaskResult, ServiceError, ServiceResult,
    ThirdPartyAppAuthenticationError,
};
use crate::fsm::{CredentialsFlow, CredentialsFlowInput, CredentialsTaskState};
use crate::models::{Credentials, CredentialsId, CredentialsStatus};
use crate::service::{credentials_polling_task, CredentialsPollingTask, CredentialsService};
use crate::supplement::SupplementInformationTask;
use crate::third_party::ThirdPartyAppAuthenticationTask;
use crate::url_opener::UrlOpener;
use app_lifecycle::LifecycleObserver;
use futures_util::future::{pending, BoxFuture};
use status_polling_task::PollingConfig;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Message used when an app-based authentication fails without a reason.
pub const AUTHENTICATION_FAILED_FALLBACK_MESSAGE: &str = "Please try again later";

/// Identifier of one running task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which status ends a task successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessPredicate {
    /// Done as soon as the provider starts aggregating data.
    Updating,
    /// Done once aggregation has finished.
    Updated,
}

/// When a credentials task counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionPredicate {
    pub success_predicate: SuccessPredicate,
    /// Fail the task when the third-party authentication app is not installed,
    /// instead of waiting for out-of-band authentication.
    pub should_fail_on_third_party_app_authentication_download_required: bool,
}

impl CompletionPredicate {
    pub fn new(
        success_predicate: SuccessPredicate,
        should_fail_on_third_party_app_authentication_download_required: bool,
    ) -> Self {
        Self {
            success_predicate,
            should_fail_on_third_party_app_authentication_download_required,
        }
    }
}

impl Default for CompletionPredicate {
    fn default() -> Self {
        Self::new(SuccessPredicate::Updated, true)
    }
}

/// Statuses a task may legitimately observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReachableStatuses {
    /// Brand new credentials; `disabled` and `session_expired` cannot occur.
    Creation,
    /// Existing credentials.
    Refresh,
}

/// The initiating call a task was started with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialsOperation {
    Add,
    Refresh,
    Update,
    Authenticate,
}

impl CredentialsOperation {
    pub fn reachable_statuses(self) -> ReachableStatuses {
        match self {
            CredentialsOperation::Add => ReachableStatuses::Creation,
            CredentialsOperation::Refresh
            | CredentialsOperation::Update
            | CredentialsOperation::Authenticate => ReachableStatuses::Refresh,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CredentialsOperation::Add => "add",
            CredentialsOperation::Refresh => "refresh",
            CredentialsOperation::Update => "update",
            CredentialsOperation::Authenticate => "authenticate",
        }
    }
}

impl fmt::Display for CredentialsOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Non-terminal events reported while a task runs.
#[derive(Debug, Clone)]
pub enum CredentialsTaskProgress {
    Created,
    Authenticating(String),
    /// The user must fill in a form; see [`SupplementInformationTask`].
    AwaitingSupplementalInformation(SupplementInformationTask),
    /// The user must authenticate in an external app.
    AwaitingThirdPartyAppAuthentication(ThirdPartyAppAuthenticationTask),
    Updating(String),
}

pub type ProgressHandler = Box<dyn Fn(CredentialsTaskProgress) + Send + Sync>;

/// Result of the initiating call.
pub(crate) enum Initiated {
    /// The call returned the credentials it created; it seeds the poll and
    /// is dispatched right away.
    Snapshot(Credentials),
    /// The call was accepted; wait for the first status change.
    Accepted(CredentialsId),
}

pub(crate) type InitiatingCall = BoxFuture<'static, CredentialsTaskResult<Initiated>>;

/// Collaborators every task needs.
#[derive(Clone)]
pub(crate) struct TaskDependencies {
    pub(crate) service: Arc<dyn CredentialsService>,
    pub(crate) url_opener: Arc<dyn UrlOpener>,
    pub(crate) lifecycle: Arc<dyn LifecycleObserver>,
    pub(crate) redirect_uri: Url,
    pub(crate) polling: PollingConfig,
}

enum Command {
    Cancel,
}

/// A running credentials operation.
///
/// Dropping the task tears it down: the initiating call, the poll and any
/// sub-task call in flight are all dropped.
pub struct CredentialsTask {
    id: TaskId,
    operation: CredentialsOperation,
    commands: mpsc::UnboundedSender<Command>,
    cancel_requested: Arc<AtomicBool>,
    state: watch::Receiver<CredentialsTaskState>,
    outcome: TaskOutcome<Credentials, CredentialsTaskError>,
}

impl CredentialsTask {
    pub(crate) fn spawn(
        operation: CredentialsOperation,
        predicate: CompletionPredicate,
        dependencies: TaskDependencies,
        initiating: InitiatingCall,
        progress: ProgressHandler,
    ) -> Self {
        let id = TaskId::new();
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(CredentialsTaskState::Initiating);
        let cancel_requested = Arc::new(AtomicBool::new(false));
        let (completer, pending_outcome) =
            outcome_channel("credentials task", || CredentialsTaskError::Interrupted);

        let actor = CredentialsTaskActor {
            id,
            operation,
            predicate,
            authentication: SubTaskDriver::new(
                Arc::clone(&dependencies.service),
                Arc::clone(&dependencies.url_opener),
                dependencies.redirect_uri.clone(),
            ),
            dependencies,
            flow: CredentialsFlow::new(),
            polling: None,
            cancel_requested: Arc::clone(&cancel_requested),
            completer,
            progress,
            state_tx,
        };
        let join = tokio::spawn(actor.run(initiating, commands_rx));

        Self {
            id,
            operation,
            commands,
            cancel_requested,
            state,
            outcome: pending_outcome.attach(join),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn operation(&self) -> CredentialsOperation {
        self.operation
    }

    pub fn state(&self) -> CredentialsTaskState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<CredentialsTaskState> {
        self.state.clone()
    }

    /// Cancel the task. It resolves with [`CredentialsTaskError::Cancelled`]
    /// unless it already finished; no progress is reported afterwards.
    pub fn cancel(&self) {
        if self.cancel_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(task_id = %self.id, operation = %self.operation, "credentials task cancel requested");
        let _ = self.commands.send(Command::Cancel);
    }

    /// Wait for the terminal result. Can be awaited again after it resolved.
    pub async fn outcome(&mut self) -> CredentialsTaskResult<Credentials> {
        self.outcome.get().await
    }
}

impl fmt::Debug for CredentialsTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsTask")
            .field("id", &self.id)
            .field("operation", &self.operation)
            .field("state", &self.state())
            .finish()
    }
}

/// Failure message for an `authentication_error` status.
///
/// App-based kinds may report the error without a payload after the same
/// credentials were added twice mid-flight; those get a generic message.
pub fn authentication_failure_message(credentials: &Credentials) -> String {
    if credentials.status_payload.is_empty() && credentials.kind.uses_third_party_app() {
        AUTHENTICATION_FAILED_FALLBACK_MESSAGE.to_string()
    } else {
        credentials.status_payload.clone()
    }
}

struct CredentialsTaskActor {
    id: TaskId,
    operation: CredentialsOperation,
    predicate: CompletionPredicate,
    dependencies: TaskDependencies,
    authentication: SubTaskDriver,
    flow: CredentialsFlow,
    polling: Option<CredentialsPollingTask>,
    cancel_requested: Arc<AtomicBool>,
    completer: Completer<Credentials, CredentialsTaskError>,
    progress: ProgressHandler,
    state_tx: watch::Sender<CredentialsTaskState>,
}

impl CredentialsTaskActor {
    async fn run(mut self, initiating: InitiatingCall, mut commands: mpsc::UnboundedReceiver<Command>) {
        debug!(task_id = %self.id, operation = %self.operation, "credentials task started");

        tokio::select! {
            biased;
            _ = commands.recv() => self.finish_cancelled(),
            result = initiating => match result {
                Ok(initiated) => self.on_initiated(initiated),
                Err(error) => self.fail(error),
            },
        }

        while !self.completer.is_completed() {
            tokio::select! {
                biased;
                _ = commands.recv() => self.finish_cancelled(),
                outcome = self.authentication.next_outcome() => self.on_sub_task_outcome(outcome),
                update = next_poll(&mut self.polling) => self.on_update(update),
            }
        }

        self.teardown();
        debug!(task_id = %self.id, state = ?self.flow.state(), "credentials task finished");
    }

    fn on_initiated(&mut self, initiated: Initiated) {
        if self.should_stop() || !self.transition(CredentialsFlowInput::Initiated) {
            return;
        }

        let (credentials_id, snapshot) = match initiated {
            Initiated::Snapshot(credentials) => (credentials.id.clone(), Some(credentials)),
            Initiated::Accepted(credentials_id) => (credentials_id, None),
        };
        info!(task_id = %self.id, %credentials_id, operation = %self.operation, "initiating call succeeded");

        let mut polling = credentials_polling_task(
            Arc::clone(&self.dependencies.service),
            credentials_id,
            snapshot.clone(),
            self.dependencies.polling,
            &*self.dependencies.lifecycle,
        );
        polling.start();
        self.polling = Some(polling);

        if let Some(credentials) = snapshot {
            self.dispatch(credentials);
        }
    }

    fn on_update(&mut self, update: ServiceResult<Credentials>) {
        if self.should_stop() {
            return;
        }
        match update {
            Ok(credentials) => self.dispatch(credentials),
            Err(error) => self.fail(error.into()),
        }
    }

    fn dispatch(&mut self, credentials: Credentials) {
        debug!(
            task_id = %self.id,
            credentials_id = %credentials.id,
            status = credentials.status.name(),
            "credentials status changed"
        );

        match credentials.status.clone() {
            CredentialsStatus::Created => self.report(CredentialsTaskProgress::Created),
            CredentialsStatus::Authenticating => {
                let payload = credentials.status_payload.clone();
                self.report(CredentialsTaskProgress::Authenticating(payload));
            }
            CredentialsStatus::AwaitingSupplementalInformation(fields) => {
                self.stop_polling();
                if self.transition(CredentialsFlowInput::SupplementalInformationRequested) {
                    let task = self.authentication.supplement_information(credentials, fields);
                    self.report(CredentialsTaskProgress::AwaitingSupplementalInformation(task));
                }
            }
            CredentialsStatus::AwaitingThirdPartyAppAuthentication(authentication)
            | CredentialsStatus::AwaitingMobileBankIdAuthentication(authentication) => {
                self.stop_polling();
                if self.transition(CredentialsFlowInput::ThirdPartyAppRequested) {
                    let task = self.authentication.third_party_app_authentication(
                        credentials,
                        authentication,
                        self.predicate
                            .should_fail_on_third_party_app_authentication_download_required,
                    );
                    self.report(CredentialsTaskProgress::AwaitingThirdPartyAppAuthentication(task));
                }
            }
            CredentialsStatus::Updating => {
                if self.predicate.success_predicate == SuccessPredicate::Updating {
                    self.succeed(credentials);
                } else {
                    let payload = credentials.status_payload.clone();
                    self.report(CredentialsTaskProgress::Updating(payload));
                }
            }
            CredentialsStatus::Updated => {
                if self.predicate.success_predicate == SuccessPredicate::Updated {
                    self.succeed(credentials);
                } else {
                    debug!(task_id = %self.id, "updated after completing on updating");
                }
            }
            CredentialsStatus::TemporaryError => {
                self.fail(CredentialsTaskError::TemporaryFailure(credentials.status_payload))
            }
            CredentialsStatus::PermanentError => {
                self.fail(CredentialsTaskError::PermanentFailure(credentials.status_payload))
            }
            CredentialsStatus::AuthenticationError => {
                let message = authentication_failure_message(&credentials);
                self.fail(CredentialsTaskError::AuthenticationFailed(message));
            }
            CredentialsStatus::Disabled => match self.operation.reachable_statuses() {
                ReachableStatuses::Creation => {
                    panic!("credentials {} reported disabled while being created", credentials.id)
                }
                ReachableStatuses::Refresh => {
                    self.fail(CredentialsTaskError::Disabled(credentials.status_payload))
                }
            },
            CredentialsStatus::SessionExpired => match self.operation.reachable_statuses() {
                ReachableStatuses::Creation => panic!(
                    "credentials {} reported session expired while being created",
                    credentials.id
                ),
                ReachableStatuses::Refresh => {
                    debug!(task_id = %self.id, credentials_id = %credentials.id, "session expired, still polling");
                }
            },
            CredentialsStatus::Deleted => {
                self.fail(CredentialsTaskError::Deleted(credentials.status_payload))
            }
            CredentialsStatus::Unknown => {
                warn!(task_id = %self.id, credentials_id = %credentials.id, "unknown credentials status");
            }
        }
    }

    fn on_sub_task_outcome(&mut self, outcome: SubTaskOutcome) {
        if self.should_stop() {
            return;
        }
        match outcome {
            SubTaskOutcome::SupplementalInformation(Ok(())) => {
                info!(task_id = %self.id, "supplemental information submitted");
                self.resume_polling();
            }
            SubTaskOutcome::SupplementalInformation(Err(error)) => self.fail(error.into()),
            SubTaskOutcome::ThirdPartyAppAuthentication(Ok(())) => {
                info!(task_id = %self.id, "third party app authentication handled");
                self.resume_polling();
            }
            SubTaskOutcome::ThirdPartyAppAuthentication(Err(error))
                if error.is_download_required()
                    && !self
                        .predicate
                        .should_fail_on_third_party_app_authentication_download_required =>
            {
                info!(task_id = %self.id, "third party app not installed, waiting for authentication elsewhere");
                self.resume_polling();
            }
            SubTaskOutcome::ThirdPartyAppAuthentication(Err(
                ThirdPartyAppAuthenticationError::UserCancelled
                | ThirdPartyAppAuthenticationError::Service(ServiceError::Cancelled),
            )) => self.finish_cancelled(),
            SubTaskOutcome::ThirdPartyAppAuthentication(Err(error)) => {
                self.fail(CredentialsTaskError::ThirdPartyApp(error))
            }
        }
    }

    fn resume_polling(&mut self) {
        if !self.transition(CredentialsFlowInput::SubTaskResolved) {
            return;
        }
        if let Some(polling) = self.polling.as_mut() {
            polling.start();
        }
    }

    fn stop_polling(&mut self) {
        if let Some(polling) = self.polling.as_mut() {
            polling.stop();
        }
    }

    fn teardown(&mut self) {
        self.stop_polling();
        self.authentication.clear();
    }

    /// True when nothing more may be reported. A pending cancellation is
    /// turned into the terminal result here.
    fn should_stop(&mut self) -> bool {
        if self.completer.is_completed() {
            return true;
        }
        if self.cancel_requested.load(Ordering::SeqCst) {
            self.finish_cancelled();
            return true;
        }
        false
    }

    fn report(&mut self, progress: CredentialsTaskProgress) {
        if self.should_stop() {
            return;
        }
        (self.progress)(progress);
    }

    fn succeed(&mut self, credentials: Credentials) {
        if self.should_stop() {
            return;
        }
        self.teardown();
        if self.transition(CredentialsFlowInput::Completed) {
            info!(task_id = %self.id, credentials_id = %credentials.id, operation = %self.operation, "credentials task succeeded");
            self.completer.complete(Ok(credentials));
        }
    }

    fn fail(&mut self, error: CredentialsTaskError) {
        if error.is_cancelled() {
            self.finish_cancelled();
            return;
        }
        if self.should_stop() {
            return;
        }
        self.teardown();
        if self.transition(CredentialsFlowInput::Fail) {
            warn!(task_id = %self.id, operation = %self.operation, %error, "credentials task failed");
            self.completer.complete(Err(error));
        }
    }

    fn finish_cancelled(&mut self) {
        if self.completer.is_completed() {
            return;
        }
        self.teardown();
        if self.transition(CredentialsFlowInput::Cancel) {
            info!(task_id = %self.id, operation = %self.operation, "credentials task cancelled");
            self.completer.complete(Err(CredentialsTaskError::Cancelled));
        }
    }

    fn transition(&mut self, input: CredentialsFlowInput) -> bool {
        let old_state = self.flow.state().clone();
        if self.flow.consume(&input).is_err() {
            warn!(task_id = %self.id, ?input, state = ?old_state, "invalid credentials task transition ignored");
            return false;
        }
        let new_state = self.flow.state();
        debug!(task_id = %self.id, old_state = ?old_state, new_state = ?new_state, "credentials task transition");
        self.state_tx.send_replace(CredentialsTaskState::from(new_state));
        true
    }
}

async fn next_poll(polling: &mut Option<CredentialsPollingTask>) -> ServiceResult<Credentials> {
    match polling {
        Some(polling) => polling.next_update().await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CredentialsKind, ProviderId};

    fn credentials(kind: CredentialsKind, payload: &str) -> Credentials {
        Credentials {
            id: CredentialsId::new("c1"),
            provider_id: ProviderId::new("se-demo"),
            kind,
            status: CredentialsStatus::AuthenticationError,
            status_payload: payload.to_string(),
            status_updated: None,
            updated: None,
            fields: Default::default(),
            session_expiry_date: None,
        }
    }

    #[test]
    fn authentication_failure_message_falls_back_for_app_kinds() {
        assert_eq!(
            authentication_failure_message(&credentials(CredentialsKind::MobileBankId, "")),
            AUTHENTICATION_FAILED_FALLBACK_MESSAGE
        );
        assert_eq!(
            authentication_failure_message(&credentials(CredentialsKind::ThirdPartyAuthentication, "")),
            AUTHENTICATION_FAILED_FALLBACK_MESSAGE
        );
        assert_eq!(
            authentication_failure_message(&credentials(CredentialsKind::Password, "")),
            ""
        );
        assert_eq!(
            authentication_failure_message(&credentials(CredentialsKind::MobileBankId, "Wrong code")),
            "Wrong code"
        );
    }

    #[test]
    fn operations_map_to_reachable_statuses() {
        assert_eq!(CredentialsOperation::Add.reachable_statuses(), ReachableStatuses::Creation);
        assert_eq!(CredentialsOperation::Update.reachable_statuses(), ReachableStatuses::Refresh);
        assert_eq!(CredentialsOperation::Authenticate.reachable_statuses(), ReachableStatuses::Refresh);
    }

    #[test]
    fn default_completion_predicate() {
        let predicate = CompletionPredicate::default();
        assert_eq!(predicate.success_predicate, SuccessPredicate::Updated);
        assert!(predicate.should_fail_on_third_party_app_authentication_download_required);
    }
}
