//! Runs the user-facing authentication sub-tasks of a parent task.
//!
//! Sub-task handles only send requests; the parent task owns the driver and
//! awaits [`SubTaskDriver::next_outcome`] inside its own loop. Every service
//! call a sub-task makes therefore lives and dies with the parent.

use crate::error::{ServiceError, ServiceResult, ThirdPartyAppAuthenticationError};
use crate::models::{Credentials, CredentialsId, FieldSpecification, ThirdPartyAppAuthentication};
use crate::service::CredentialsService;
use crate::supplement::SupplementInformationTask;
use crate::third_party::{ThirdPartyAppAuthenticationTask, ThirdPartyAppStatus, ThirdPartyFlow};
use crate::url_opener::UrlOpener;
use futures_util::future::{pending, BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

pub(crate) type SubTaskId = u64;

/// Callback for QR code and "use another device" fallbacks.
pub type StatusHandler = Arc<dyn Fn(ThirdPartyAppStatus) + Send + Sync>;

pub(crate) enum SubTaskRequest {
    Submit {
        sub_task: SubTaskId,
        fields: HashMap<String, String>,
    },
    CancelSupplement {
        sub_task: SubTaskId,
    },
    Handle {
        sub_task: SubTaskId,
        status_handler: Option<StatusHandler>,
    },
    CancelThirdParty {
        sub_task: SubTaskId,
    },
}

impl SubTaskRequest {
    fn sub_task(&self) -> SubTaskId {
        match self {
            SubTaskRequest::Submit { sub_task, .. }
            | SubTaskRequest::CancelSupplement { sub_task }
            | SubTaskRequest::Handle { sub_task, .. }
            | SubTaskRequest::CancelThirdParty { sub_task } => *sub_task,
        }
    }
}

/// How a sub-task resolved.
#[derive(Debug)]
pub enum SubTaskOutcome {
    SupplementalInformation(ServiceResult<()>),
    ThirdPartyAppAuthentication(Result<(), ThirdPartyAppAuthenticationError>),
}

enum Pending {
    Supplement {
        id: SubTaskId,
        credentials_id: CredentialsId,
        cancelling: bool,
    },
    ThirdParty {
        id: SubTaskId,
        credentials: Credentials,
        authentication: ThirdPartyAppAuthentication,
        should_fail_on_download_required: bool,
    },
}

impl Pending {
    fn id(&self) -> SubTaskId {
        match self {
            Pending::Supplement { id, .. } | Pending::ThirdParty { id, .. } => *id,
        }
    }
}

/// Holds at most one open sub-task and the service call it is running.
pub struct SubTaskDriver {
    service: Arc<dyn CredentialsService>,
    url_opener: Arc<dyn UrlOpener>,
    redirect_uri: Url,
    requests_tx: mpsc::UnboundedSender<SubTaskRequest>,
    requests_rx: mpsc::UnboundedReceiver<SubTaskRequest>,
    next_id: SubTaskId,
    pending: Option<Pending>,
    in_flight: Option<BoxFuture<'static, SubTaskOutcome>>,
}

impl SubTaskDriver {
    pub fn new(
        service: Arc<dyn CredentialsService>,
        url_opener: Arc<dyn UrlOpener>,
        redirect_uri: Url,
    ) -> Self {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        Self {
            service,
            url_opener,
            redirect_uri,
            requests_tx,
            requests_rx,
            next_id: 0,
            pending: None,
            in_flight: None,
        }
    }

    /// Open a supplemental-information sub-task, replacing any open one.
    pub fn supplement_information(
        &mut self,
        credentials: Credentials,
        fields: Vec<FieldSpecification>,
    ) -> SupplementInformationTask {
        let id = self.open();
        self.pending = Some(Pending::Supplement {
            id,
            credentials_id: credentials.id.clone(),
            cancelling: false,
        });
        SupplementInformationTask::new(id, credentials, fields, self.requests_tx.clone())
    }

    /// Open a third-party-app sub-task, replacing any open one.
    pub fn third_party_app_authentication(
        &mut self,
        credentials: Credentials,
        authentication: ThirdPartyAppAuthentication,
        should_fail_on_download_required: bool,
    ) -> ThirdPartyAppAuthenticationTask {
        let id = self.open();
        self.pending = Some(Pending::ThirdParty {
            id,
            credentials: credentials.clone(),
            authentication: authentication.clone(),
            should_fail_on_download_required,
        });
        ThirdPartyAppAuthenticationTask::new(
            id,
            credentials,
            authentication,
            should_fail_on_download_required,
            self.requests_tx.clone(),
        )
    }

    pub fn is_open(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop the open sub-task and any call it is running.
    pub fn clear(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(
                sub_task = pending.id(),
                cancelled_in_flight = self.in_flight.is_some(),
                "sub-task cleared"
            );
        }
        self.in_flight = None;
    }

    /// Wait until the open sub-task resolves. Cancel-safe; pends forever
    /// while nothing is open.
    ///
    /// A finished call wins over requests queued behind it, which are then
    /// stale and ignored.
    pub async fn next_outcome(&mut self) -> SubTaskOutcome {
        loop {
            tokio::select! {
                biased;
                outcome = in_flight_outcome(&mut self.in_flight) => {
                    self.in_flight = None;
                    self.pending = None;
                    return outcome;
                }
                Some(request) = self.requests_rx.recv() => {
                    if let Some(outcome) = self.on_request(request) {
                        return outcome;
                    }
                }
            }
        }
    }

    fn open(&mut self) -> SubTaskId {
        self.clear();
        self.next_id += 1;
        self.next_id
    }

    fn on_request(&mut self, request: SubTaskRequest) -> Option<SubTaskOutcome> {
        let sub_task = request.sub_task();
        let Some(pending) = self.pending.as_mut().filter(|pending| pending.id() == sub_task) else {
            warn!(sub_task, "request for a resolved sub-task ignored");
            return None;
        };

        match (request, pending) {
            (
                SubTaskRequest::Submit { fields, .. },
                Pending::Supplement {
                    credentials_id,
                    cancelling: false,
                    ..
                },
            ) if self.in_flight.is_none() => {
                debug!(sub_task, %credentials_id, "submitting supplemental information");
                let service = Arc::clone(&self.service);
                let credentials_id = credentials_id.clone();
                self.in_flight = Some(
                    async move {
                        let result = service.supplement_information(&credentials_id, fields).await;
                        SubTaskOutcome::SupplementalInformation(result)
                    }
                    .boxed(),
                );
                None
            }
            (
                SubTaskRequest::CancelSupplement { .. },
                Pending::Supplement {
                    credentials_id,
                    cancelling,
                    ..
                },
            ) if !*cancelling => {
                debug!(sub_task, %credentials_id, "cancelling supplemental information");
                *cancelling = true;
                let service = Arc::clone(&self.service);
                let credentials_id = credentials_id.clone();
                self.in_flight = Some(
                    async move {
                        if let Err(error) = service.cancel_supplement_information(&credentials_id).await {
                            debug!(%credentials_id, %error, "cancel supplemental information failed");
                        }
                        SubTaskOutcome::SupplementalInformation(Err(ServiceError::Cancelled))
                    }
                    .boxed(),
                );
                None
            }
            (
                SubTaskRequest::Handle { status_handler, .. },
                Pending::ThirdParty {
                    credentials,
                    authentication,
                    should_fail_on_download_required,
                    ..
                },
            ) if self.in_flight.is_none() => {
                debug!(sub_task, credentials_id = %credentials.id, "handling third party app authentication");
                let flow = ThirdPartyFlow {
                    service: Arc::clone(&self.service),
                    url_opener: Arc::clone(&self.url_opener),
                    redirect_uri: self.redirect_uri.clone(),
                    credentials: credentials.clone(),
                    authentication: authentication.clone(),
                    should_fail_on_download_required: *should_fail_on_download_required,
                };
                self.in_flight = Some(
                    flow.run(status_handler)
                        .map(SubTaskOutcome::ThirdPartyAppAuthentication)
                        .boxed(),
                );
                None
            }
            (SubTaskRequest::CancelThirdParty { .. }, Pending::ThirdParty { credentials, .. }) => {
                debug!(sub_task, credentials_id = %credentials.id, "third party app authentication cancelled");
                self.pending = None;
                self.in_flight = None;
                Some(SubTaskOutcome::ThirdPartyAppAuthentication(Err(
                    ThirdPartyAppAuthenticationError::UserCancelled,
                )))
            }
            _ => {
                warn!(sub_task, "duplicate sub-task request ignored");
                None
            }
        }
    }
}

async fn in_flight_outcome(slot: &mut Option<BoxFuture<'static, SubTaskOutcome>>) -> SubTaskOutcome {
    match slot {
        Some(call) => call.await,
        None => pending().await,
    }
}
