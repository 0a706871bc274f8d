//! Scripted transfer and credentials services.

use crate::models::{
    CurrencyDenominatedAmount, SignableOperation, SignableOperationId, SignableOperationStatus,
    TransferId, TransferRequest,
};
use crate::service::TransferService;
use crate::task::TransferTaskProgress;
use crate::TransferContext;
use app_lifecycle::AppLifecycle;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use credentials_tasks::{
    Credentials, CredentialsId, CredentialsKind, CredentialsService, CredentialsStatus,
    FieldSpecification, ProviderId, RefreshableItems, ServiceError, ServiceResult,
    ThirdPartyAppAuthentication, UrlOpener,
};
use link_config_and_utils::Config;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

pub(crate) const TRANSFER_ID: &str = "transfer-1";
pub(crate) const CREDENTIALS_ID: &str = "credentials-1";

/// Which service answered a status poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Poll {
    Operation,
    Credentials,
}

pub(crate) type PollLog = Arc<Mutex<Vec<Poll>>>;

pub(crate) fn operation(status: SignableOperationStatus, at: i64) -> SignableOperation {
    SignableOperation {
        id: Some(SignableOperationId::new("operation-1")),
        credentials_id: Some(CredentialsId::new(CREDENTIALS_ID)),
        status,
        status_message: None,
        transfer_id: Some(TransferId::new(TRANSFER_ID)),
        updated: Utc.timestamp_opt(at, 0).single(),
    }
}

pub(crate) fn with_message(mut operation: SignableOperation, message: &str) -> SignableOperation {
    operation.status_message = Some(message.to_string());
    operation
}

pub(crate) fn credentials(status: CredentialsStatus, at: i64) -> Credentials {
    Credentials {
        id: CredentialsId::new(CREDENTIALS_ID),
        provider_id: ProviderId::new("se-demobank-bankid"),
        kind: CredentialsKind::MobileBankId,
        status,
        status_payload: String::new(),
        status_updated: Utc.timestamp_opt(at, 0).single(),
        updated: None,
        fields: HashMap::new(),
        session_expiry_date: None,
    }
}

pub(crate) fn with_payload(mut credentials: Credentials, payload: &str) -> Credentials {
    credentials.status_payload = payload.to_string();
    credentials
}

pub(crate) fn otp_fields() -> Vec<FieldSpecification> {
    vec![FieldSpecification {
        name: "otp".into(),
        description: "One-time code".into(),
        ..Default::default()
    }]
}

pub(crate) fn bank_id_authentication() -> ThirdPartyAppAuthentication {
    ThirdPartyAppAuthentication {
        download_title: Some("Download Mobile BankID".into()),
        app_store_url: Url::parse("https://apps.example.com/bankid").ok(),
        scheme: Some("bankid".into()),
        deep_link_url: Url::parse("bankid:///?redirect=tink://bankid").ok(),
        ..Default::default()
    }
}

pub(crate) fn request() -> TransferRequest {
    TransferRequest {
        amount: CurrencyDenominatedAmount::new(12_345, 2, "SEK"),
        source_uri: "iban://SE4550000000058398257466".into(),
        destination_uri: "iban://SE3550000000054910000003".into(),
        source_message: Some("Rent".into()),
        destination_message: "Rent october".into(),
        due_date: None,
    }
}

/// Pops scripted results; the last one repeats forever.
fn next_scripted<T: Clone>(script: &Mutex<VecDeque<ServiceResult<T>>>) -> ServiceResult<T> {
    let mut script = script.lock().unwrap();
    if script.len() > 1 {
        script.pop_front().unwrap()
    } else {
        script
            .front()
            .cloned()
            .unwrap_or_else(|| Err(ServiceError::NotFound("script exhausted".into())))
    }
}

pub(crate) struct MockTransferService {
    initiated: Mutex<ServiceResult<SignableOperation>>,
    initiating_delay: Mutex<Duration>,
    statuses: Mutex<VecDeque<ServiceResult<SignableOperation>>>,
    polls: AtomicUsize,
    log: PollLog,
}

impl MockTransferService {
    pub(crate) fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub(crate) fn set_initiated(&self, result: ServiceResult<SignableOperation>) {
        *self.initiated.lock().unwrap() = result;
    }

    pub(crate) fn delay_initiating(&self, delay: Duration) {
        *self.initiating_delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl TransferService for MockTransferService {
    async fn initiate_transfer(
        &self,
        _request: &TransferRequest,
        _redirect_uri: &Url,
    ) -> ServiceResult<SignableOperation> {
        let delay = *self.initiating_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.initiated.lock().unwrap().clone()
    }

    async fn transfer_status(&self, _transfer_id: &TransferId) -> ServiceResult<SignableOperation> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(Poll::Operation);
        next_scripted(&self.statuses)
    }
}

pub(crate) struct MockCredentialsService {
    statuses: Mutex<VecDeque<ServiceResult<Credentials>>>,
    polls: AtomicUsize,
    supplements: Mutex<Vec<HashMap<String, String>>>,
    log: PollLog,
}

impl MockCredentialsService {
    pub(crate) fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub(crate) fn supplements(&self) -> Vec<HashMap<String, String>> {
        self.supplements.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialsService for MockCredentialsService {
    async fn credentials(&self, _id: &CredentialsId) -> ServiceResult<Credentials> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(Poll::Credentials);
        next_scripted(&self.statuses)
    }

    async fn create_credentials(
        &self,
        _provider_id: &ProviderId,
        _refreshable_items: RefreshableItems,
        _fields: HashMap<String, String>,
        _app_uri: &Url,
    ) -> ServiceResult<Credentials> {
        Err(ServiceError::Internal("not used by transfers".into()))
    }

    async fn update_credentials(
        &self,
        _id: &CredentialsId,
        _provider_id: &ProviderId,
        _app_uri: &Url,
        _fields: HashMap<String, String>,
    ) -> ServiceResult<Credentials> {
        Err(ServiceError::Internal("not used by transfers".into()))
    }

    async fn refresh_credentials(
        &self,
        _id: &CredentialsId,
        _authenticate: bool,
        _refreshable_items: RefreshableItems,
        _opt_in: bool,
    ) -> ServiceResult<()> {
        Err(ServiceError::Internal("not used by transfers".into()))
    }

    async fn authenticate_credentials(&self, _id: &CredentialsId) -> ServiceResult<()> {
        Err(ServiceError::Internal("not used by transfers".into()))
    }

    async fn supplement_information(
        &self,
        _id: &CredentialsId,
        fields: HashMap<String, String>,
    ) -> ServiceResult<()> {
        self.supplements.lock().unwrap().push(fields);
        Ok(())
    }

    async fn cancel_supplement_information(&self, _id: &CredentialsId) -> ServiceResult<()> {
        Ok(())
    }

    async fn qr_code(&self, _id: &CredentialsId) -> ServiceResult<Vec<u8>> {
        Err(ServiceError::NotFound("qr code".into()))
    }

    async fn third_party_callback(
        &self,
        _state: &str,
        _parameters: HashMap<String, String>,
    ) -> ServiceResult<()> {
        Ok(())
    }
}

/// Opens nothing, as if no authentication app were installed.
pub(crate) struct NoAppsInstalled;

#[async_trait]
impl UrlOpener for NoAppsInstalled {
    async fn open(&self, _url: &Url, _universal_links_only: bool) -> bool {
        false
    }
}

pub(crate) struct Harness {
    pub(crate) transfers: Arc<MockTransferService>,
    pub(crate) credentials: Arc<MockCredentialsService>,
    pub(crate) lifecycle: Arc<AppLifecycle>,
    pub(crate) log: PollLog,
    pub(crate) context: TransferContext,
}

impl Harness {
    /// The transfer is initiated in `created`, then polls through `operations`.
    pub(crate) fn new(operations: Vec<SignableOperation>, credentials: Vec<Credentials>) -> Self {
        let log = PollLog::default();
        let transfers = Arc::new(MockTransferService {
            initiated: Mutex::new(Ok(operation(SignableOperationStatus::Created, 1))),
            initiating_delay: Mutex::new(Duration::ZERO),
            statuses: Mutex::new(operations.into_iter().map(Ok).collect()),
            polls: AtomicUsize::new(0),
            log: log.clone(),
        });
        let credentials = Arc::new(MockCredentialsService {
            statuses: Mutex::new(credentials.into_iter().map(Ok).collect()),
            polls: AtomicUsize::new(0),
            supplements: Mutex::new(Vec::new()),
            log: log.clone(),
        });
        let lifecycle = Arc::new(AppLifecycle::new());
        let context = TransferContext::new(
            transfers.clone(),
            credentials.clone(),
            lifecycle.clone(),
            Arc::new(NoAppsInstalled),
            &Config::default(),
        )
        .unwrap();
        Self {
            transfers,
            credentials,
            lifecycle,
            log,
            context,
        }
    }

    /// Polls in order, with consecutive polls of the same service merged.
    pub(crate) fn poll_phases(&self) -> Vec<Poll> {
        let mut phases = self.log.lock().unwrap().clone();
        phases.dedup();
        phases
    }
}

/// Collects progress events in the order they were reported.
#[derive(Clone, Default)]
pub(crate) struct ProgressLog {
    events: Arc<Mutex<Vec<TransferTaskProgress>>>,
}

impl ProgressLog {
    pub(crate) fn handler(&self) -> impl Fn(TransferTaskProgress) + Send + Sync + 'static {
        self.reacting(|_| {})
    }

    pub(crate) fn reacting<F>(&self, react: F) -> impl Fn(TransferTaskProgress) + Send + Sync + 'static
    where
        F: Fn(&TransferTaskProgress) + Send + Sync + 'static,
    {
        let events = self.events.clone();
        move |progress| {
            react(&progress);
            events.lock().unwrap().push(progress);
        }
    }

    pub(crate) fn events(&self) -> Vec<TransferTaskProgress> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn names(&self) -> Vec<&'static str> {
        self.events()
            .iter()
            .map(|progress| match progress {
                TransferTaskProgress::Created(_) => "created",
                TransferTaskProgress::Authenticating => "authenticating",
                TransferTaskProgress::Executing(_) => "executing",
                TransferTaskProgress::AwaitingSupplementalInformation(_) => {
                    "awaiting_supplemental_information"
                }
                TransferTaskProgress::AwaitingThirdPartyAppAuthentication(_) => {
                    "awaiting_third_party_app_authentication"
                }
            })
            .collect()
    }
}
