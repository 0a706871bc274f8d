//! Contract of the credentials service consumed by the tasks.
//!
//! Implementations perform the actual network calls. Every call is
//! cancelled by dropping its future; tasks drop outstanding calls when
//! they are cancelled or torn down.

use crate::error::{ServiceError, ServiceResult};
use crate::models::{Credentials, CredentialsId, ProviderId, RefreshableItems};
use app_lifecycle::LifecycleObserver;
use async_trait::async_trait;
use status_polling_task::{default_change_predicate, PollingConfig, PollingTask, StatusFetcher};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

#[async_trait]
pub trait CredentialsService: Send + Sync {
    /// Current snapshot of one credentials resource.
    async fn credentials(&self, id: &CredentialsId) -> ServiceResult<Credentials>;

    async fn create_credentials(
        &self,
        provider_id: &ProviderId,
        refreshable_items: RefreshableItems,
        fields: HashMap<String, String>,
        app_uri: &Url,
    ) -> ServiceResult<Credentials>;

    async fn update_credentials(
        &self,
        id: &CredentialsId,
        provider_id: &ProviderId,
        app_uri: &Url,
        fields: HashMap<String, String>,
    ) -> ServiceResult<Credentials>;

    async fn refresh_credentials(
        &self,
        id: &CredentialsId,
        authenticate: bool,
        refreshable_items: RefreshableItems,
        opt_in: bool,
    ) -> ServiceResult<()>;

    async fn authenticate_credentials(&self, id: &CredentialsId) -> ServiceResult<()>;

    async fn supplement_information(
        &self,
        id: &CredentialsId,
        fields: HashMap<String, String>,
    ) -> ServiceResult<()>;

    async fn cancel_supplement_information(&self, id: &CredentialsId) -> ServiceResult<()>;

    /// PNG bytes of the QR challenge for authenticating on another device.
    async fn qr_code(&self, id: &CredentialsId) -> ServiceResult<Vec<u8>>;

    /// Forward the query of a third-party app redirect back to the service.
    async fn third_party_callback(
        &self,
        state: &str,
        parameters: HashMap<String, String>,
    ) -> ServiceResult<()>;
}

/// Polls credentials snapshots through a [`CredentialsService`].
pub struct CredentialsStatusFetcher {
    service: Arc<dyn CredentialsService>,
}

impl CredentialsStatusFetcher {
    pub fn new(service: Arc<dyn CredentialsService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl StatusFetcher<CredentialsId, Credentials, ServiceError> for CredentialsStatusFetcher {
    async fn fetch_status(&self, id: &CredentialsId) -> ServiceResult<Credentials> {
        self.service.credentials(id).await
    }
}

pub type CredentialsPollingTask = PollingTask<CredentialsId, Credentials, ServiceError>;

/// Polling task over one credentials resource.
///
/// Reports a snapshot only when its status or status timestamp moved, so a
/// repeated third-party or BankID status is not handed out twice.
pub fn credentials_polling_task(
    service: Arc<dyn CredentialsService>,
    id: CredentialsId,
    initial: Option<Credentials>,
    config: PollingConfig,
    lifecycle: &dyn LifecycleObserver,
) -> CredentialsPollingTask {
    PollingTask::new(
        id,
        initial,
        Arc::new(CredentialsStatusFetcher::new(service)),
        default_change_predicate(),
        config,
        lifecycle,
    )
}
