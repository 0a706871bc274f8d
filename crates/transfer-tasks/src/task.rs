//! Transfer initiation: polls the signable operation and detours through
//! the credentials whenever the bank needs the user to authenticate.

use crate::error::{TransferTaskError, TransferTaskResult, MISSING_CREDENTIALS_ID, MISSING_TRANSFER_ID};
use crate::fsm::{TransferFlow, TransferFlowInput, TransferTaskState};
use crate::models::{Receipt, SignableOperation, SignableOperationStatus, TransferId};
use crate::service::{transfer_polling_task, TransferPollingTask, TransferService};
use app_lifecycle::LifecycleObserver;
use credentials_tasks::{
    authentication_failure_message, credentials_polling_task, outcome_channel, Completer,
    Credentials, CredentialsPollingTask, CredentialsService, CredentialsStatus, ServiceError,
    ServiceResult, SubTaskDriver, SubTaskOutcome, SupplementInformationTask, TaskId, TaskOutcome,
    ThirdPartyAppAuthenticationError, ThirdPartyAppAuthenticationTask, UrlOpener,
};
use futures_util::future::{pending, BoxFuture};
use status_polling_task::PollingConfig;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use url::Url;

/// Non-terminal events reported while a transfer runs.
#[derive(Debug, Clone)]
pub enum TransferTaskProgress {
    Created(TransferId),
    Authenticating,
    Executing(String),
    AwaitingSupplementalInformation(SupplementInformationTask),
    AwaitingThirdPartyAppAuthentication(ThirdPartyAppAuthenticationTask),
}

pub type TransferProgressHandler = Box<dyn Fn(TransferTaskProgress) + Send + Sync>;

pub(crate) type InitiatingCall = BoxFuture<'static, TransferTaskResult<SignableOperation>>;

#[derive(Clone)]
pub(crate) struct TransferDependencies {
    pub(crate) transfer_service: Arc<dyn TransferService>,
    pub(crate) credentials_service: Arc<dyn CredentialsService>,
    pub(crate) url_opener: Arc<dyn UrlOpener>,
    pub(crate) lifecycle: Arc<dyn LifecycleObserver>,
    pub(crate) redirect_uri: Url,
    pub(crate) polling: PollingConfig,
}

enum Command {
    Cancel,
}

/// A running transfer.
///
/// Dropping the task drops the initiating call, both polls and any
/// sub-task call in flight.
pub struct InitiateTransferTask {
    id: TaskId,
    commands: mpsc::UnboundedSender<Command>,
    cancel_requested: Arc<AtomicBool>,
    state: watch::Receiver<TransferTaskState>,
    outcome: TaskOutcome<Receipt, TransferTaskError>,
}

impl InitiateTransferTask {
    pub(crate) fn spawn(
        dependencies: TransferDependencies,
        initiating: InitiatingCall,
        progress: TransferProgressHandler,
    ) -> Self {
        let id = TaskId::new();
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(TransferTaskState::Initiating);
        let cancel_requested = Arc::new(AtomicBool::new(false));
        let (completer, pending_outcome) =
            outcome_channel("transfer task", || TransferTaskError::Interrupted);

        let actor = TransferTaskActor {
            id,
            authentication: SubTaskDriver::new(
                Arc::clone(&dependencies.credentials_service),
                Arc::clone(&dependencies.url_opener),
                dependencies.redirect_uri.clone(),
            ),
            dependencies,
            flow: TransferFlow::new(),
            operation: None,
            credentials: None,
            cancel_requested: Arc::clone(&cancel_requested),
            completer,
            progress,
            state_tx,
        };
        let join = tokio::spawn(actor.run(initiating, commands_rx));

        Self {
            id,
            commands,
            cancel_requested,
            state,
            outcome: pending_outcome.attach(join),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn state(&self) -> TransferTaskState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<TransferTaskState> {
        self.state.clone()
    }

    /// Cancel the transfer. It resolves with `Cancelled` unless it
    /// already finished.
    pub fn cancel(&self) {
        if self.cancel_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(task_id = %self.id, "transfer task cancel requested");
        let _ = self.commands.send(Command::Cancel);
    }

    pub async fn outcome(&mut self) -> TransferTaskResult<Receipt> {
        self.outcome.get().await
    }
}

impl fmt::Debug for InitiateTransferTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitiateTransferTask")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

struct TransferTaskActor {
    id: TaskId,
    dependencies: TransferDependencies,
    authentication: SubTaskDriver,
    flow: TransferFlow,
    operation: Option<TransferPollingTask>,
    credentials: Option<CredentialsPollingTask>,
    cancel_requested: Arc<AtomicBool>,
    completer: Completer<Receipt, TransferTaskError>,
    progress: TransferProgressHandler,
    state_tx: watch::Sender<TransferTaskState>,
}

impl TransferTaskActor {
    async fn run(mut self, initiating: InitiatingCall, mut commands: mpsc::UnboundedReceiver<Command>) {
        debug!(task_id = %self.id, "transfer task started");

        tokio::select! {
            biased;
            _ = commands.recv() => self.finish_cancelled(),
            result = initiating => match result {
                Ok(operation) => self.on_initiated(operation),
                Err(error) => self.fail(error),
            },
        }

        while !self.completer.is_completed() {
            tokio::select! {
                biased;
                _ = commands.recv() => self.finish_cancelled(),
                outcome = self.authentication.next_outcome() => self.on_sub_task_outcome(outcome),
                update = next_operation(&mut self.operation) => self.on_operation_update(update),
                update = next_credentials(&mut self.credentials) => self.on_credentials_update(update),
            }
        }

        self.teardown();
        debug!(task_id = %self.id, state = ?self.flow.state(), "transfer task finished");
    }

    fn on_initiated(&mut self, operation: SignableOperation) {
        if self.should_stop() {
            return;
        }
        let Some(transfer_id) = operation.transfer_id.clone() else {
            self.fail(TransferTaskError::Failed(Some(MISSING_TRANSFER_ID.to_string())));
            return;
        };
        if !self.transition(TransferFlowInput::Initiated) {
            return;
        }
        info!(task_id = %self.id, %transfer_id, "transfer initiated");

        let mut polling = transfer_polling_task(
            Arc::clone(&self.dependencies.transfer_service),
            transfer_id,
            Some(operation.clone()),
            self.dependencies.polling,
            &*self.dependencies.lifecycle,
        );
        polling.start();
        self.operation = Some(polling);
        self.dispatch_operation(operation);
    }

    fn on_operation_update(&mut self, update: ServiceResult<SignableOperation>) {
        if self.should_stop() {
            return;
        }
        match update {
            Ok(operation) => self.dispatch_operation(operation),
            Err(error) => self.fail(error.into()),
        }
    }

    fn on_credentials_update(&mut self, update: ServiceResult<Credentials>) {
        if self.should_stop() {
            return;
        }
        match update {
            Ok(credentials) => self.dispatch_credentials(credentials),
            Err(error) => self.fail(error.into()),
        }
    }

    fn dispatch_operation(&mut self, operation: SignableOperation) {
        debug!(task_id = %self.id, status = operation.status.name(), "signable operation changed");

        match operation.status {
            SignableOperationStatus::Created => match operation.transfer_id {
                Some(transfer_id) => self.report(TransferTaskProgress::Created(transfer_id)),
                None => self.fail(TransferTaskError::Failed(Some(MISSING_TRANSFER_ID.to_string()))),
            },
            SignableOperationStatus::AwaitingCredentials
            | SignableOperationStatus::AwaitingThirdPartyAppAuthentication => {
                self.poll_credentials(&operation)
            }
            SignableOperationStatus::Executing => {
                let message = operation.status_message.unwrap_or_default();
                self.report(TransferTaskProgress::Executing(message));
            }
            SignableOperationStatus::Executed | SignableOperationStatus::Sent => {
                match operation.transfer_id {
                    Some(id) => self.succeed(Receipt {
                        id,
                        message: operation.status_message,
                    }),
                    None => {
                        self.fail(TransferTaskError::Failed(Some(MISSING_TRANSFER_ID.to_string())))
                    }
                }
            }
            SignableOperationStatus::Cancelled => {
                self.fail(TransferTaskError::CancelledByBank(operation.status_message))
            }
            SignableOperationStatus::Failed => {
                self.fail(TransferTaskError::Failed(operation.status_message))
            }
            SignableOperationStatus::Unknown => {
                warn!(task_id = %self.id, "unknown signable operation status");
            }
        }
    }

    /// Hand over from the operation poll to the credentials poll.
    fn poll_credentials(&mut self, operation: &SignableOperation) {
        if let Some(polling) = self.operation.as_mut() {
            polling.stop();
        }

        let Some(credentials_id) = operation.credentials_id.clone() else {
            self.fail(TransferTaskError::Failed(Some(MISSING_CREDENTIALS_ID.to_string())));
            return;
        };
        debug!(task_id = %self.id, %credentials_id, "transfer needs credentials authentication");

        // Fresh poll each time, so an unchanged `updated` snapshot is seen again.
        self.credentials = Some(credentials_polling_task(
            Arc::clone(&self.dependencies.credentials_service),
            credentials_id,
            None,
            self.dependencies.polling,
            &*self.dependencies.lifecycle,
        ));

        if self.transition(TransferFlowInput::CredentialsRequired) {
            if let Some(polling) = self.credentials.as_mut() {
                polling.start();
            }
        }
    }

    fn dispatch_credentials(&mut self, credentials: Credentials) {
        debug!(
            task_id = %self.id,
            credentials_id = %credentials.id,
            status = credentials.status.name(),
            "credentials status changed"
        );

        match credentials.status.clone() {
            CredentialsStatus::Created => {}
            CredentialsStatus::Authenticating => self.report(TransferTaskProgress::Authenticating),
            CredentialsStatus::AwaitingSupplementalInformation(fields) => {
                self.stop_credentials();
                if self.transition(TransferFlowInput::SupplementalInformationRequested) {
                    let task = self.authentication.supplement_information(credentials, fields);
                    self.report(TransferTaskProgress::AwaitingSupplementalInformation(task));
                }
            }
            CredentialsStatus::AwaitingThirdPartyAppAuthentication(authentication)
            | CredentialsStatus::AwaitingMobileBankIdAuthentication(authentication) => {
                self.stop_credentials();
                if self.transition(TransferFlowInput::ThirdPartyAppRequested) {
                    let task = self.authentication.third_party_app_authentication(
                        credentials,
                        authentication,
                        false,
                    );
                    self.report(TransferTaskProgress::AwaitingThirdPartyAppAuthentication(task));
                }
            }
            CredentialsStatus::Updating | CredentialsStatus::Updated => {
                self.stop_credentials();
                if self.transition(TransferFlowInput::CredentialsUpdated) {
                    debug!(task_id = %self.id, "credentials ready, polling transfer again");
                    if let Some(polling) = self.operation.as_mut() {
                        polling.start();
                    }
                }
            }
            CredentialsStatus::TemporaryError
            | CredentialsStatus::PermanentError
            | CredentialsStatus::Deleted => {
                self.fail(TransferTaskError::Failed(Some(credentials.status_payload)))
            }
            CredentialsStatus::AuthenticationError => {
                let message = authentication_failure_message(&credentials);
                self.fail(TransferTaskError::AuthenticationFailed(message));
            }
            CredentialsStatus::Disabled => {
                self.fail(TransferTaskError::DisabledCredentials(credentials.status_payload))
            }
            CredentialsStatus::SessionExpired => {
                self.fail(TransferTaskError::CredentialsSessionExpired(credentials.status_payload))
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
                self.resume_credentials();
            }
            SubTaskOutcome::SupplementalInformation(Err(error)) => self.fail(error.into()),
            SubTaskOutcome::ThirdPartyAppAuthentication(Ok(())) => {
                info!(task_id = %self.id, "third party app authentication handled");
                self.resume_credentials();
            }
            SubTaskOutcome::ThirdPartyAppAuthentication(Err(error)) if error.is_download_required() => {
                info!(task_id = %self.id, "third party app not installed, waiting for authentication elsewhere");
                self.resume_credentials();
            }
            SubTaskOutcome::ThirdPartyAppAuthentication(Err(
                ThirdPartyAppAuthenticationError::UserCancelled
                | ThirdPartyAppAuthenticationError::Service(ServiceError::Cancelled),
            )) => self.finish_cancelled(),
            SubTaskOutcome::ThirdPartyAppAuthentication(Err(error)) => {
                self.fail(TransferTaskError::ThirdPartyApp(error))
            }
        }
    }

    fn resume_credentials(&mut self) {
        if !self.transition(TransferFlowInput::SubTaskResolved) {
            return;
        }
        if let Some(polling) = self.credentials.as_mut() {
            polling.start();
        }
    }

    fn stop_credentials(&mut self) {
        if let Some(polling) = self.credentials.as_mut() {
            polling.stop();
        }
    }

    fn teardown(&mut self) {
        if let Some(polling) = self.operation.as_mut() {
            polling.stop();
        }
        self.stop_credentials();
        self.authentication.clear();
    }

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

    fn report(&mut self, progress: TransferTaskProgress) {
        if self.should_stop() {
            return;
        }
        (self.progress)(progress);
    }

    fn succeed(&mut self, receipt: Receipt) {
        if self.should_stop() {
            return;
        }
        self.teardown();
        if self.transition(TransferFlowInput::Executed) {
            info!(task_id = %self.id, transfer_id = %receipt.id, "transfer executed");
            self.completer.complete(Ok(receipt));
        }
    }

    fn fail(&mut self, error: TransferTaskError) {
        if error.is_user_cancellation() {
            self.finish_cancelled();
            return;
        }
        if self.should_stop() {
            return;
        }
        self.teardown();
        if self.transition(TransferFlowInput::Fail) {
            warn!(task_id = %self.id, %error, "transfer task failed");
            self.completer.complete(Err(error));
        }
    }

    fn finish_cancelled(&mut self) {
        if self.completer.is_completed() {
            return;
        }
        self.teardown();
        if self.transition(TransferFlowInput::Cancel) {
            info!(task_id = %self.id, "transfer task cancelled");
            self.completer.complete(Err(TransferTaskError::Cancelled));
        }
    }

    fn transition(&mut self, input: TransferFlowInput) -> bool {
        let old_state = self.flow.state().clone();
        if self.flow.consume(&input).is_err() {
            warn!(task_id = %self.id, ?input, state = ?old_state, "invalid transfer task transition ignored");
            return false;
        }
        let new_state = self.flow.state();
        debug!(task_id = %self.id, old_state = ?old_state, new_state = ?new_state, "transfer task transition");
        self.state_tx.send_replace(TransferTaskState::from(new_state));
        true
    }
}

async fn next_operation(polling: &mut Option<TransferPollingTask>) -> ServiceResult<SignableOperation> {
    match polling {
        Some(polling) => polling.next_update().await,
        None => pending().await,
    }
}

async fn next_credentials(polling: &mut Option<CredentialsPollingTask>) -> ServiceResult<Credentials> {
    match polling {
        Some(polling) => polling.next_update().await,
        None => pending().await,
    }
}
