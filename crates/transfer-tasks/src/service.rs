//! Contract of the transfer service consumed by the tasks.

use crate::models::{SignableOperation, TransferId, TransferRequest};
use app_lifecycle::LifecycleObserver;
use async_trait::async_trait;
use credentials_tasks::{ServiceError, ServiceResult};
use status_polling_task::{default_change_predicate, PollingConfig, PollingTask, StatusFetcher};
use std::sync::Arc;
use url::Url;

#[async_trait]
pub trait TransferService: Send + Sync {
    /// Start a transfer; answers with the operation that will sign it.
    async fn initiate_transfer(
        &self,
        request: &TransferRequest,
        redirect_uri: &Url,
    ) -> ServiceResult<SignableOperation>;

    /// Current state of the operation behind `transfer_id`.
    async fn transfer_status(&self, transfer_id: &TransferId) -> ServiceResult<SignableOperation>;
}

struct TransferStatusFetcher {
    service: Arc<dyn TransferService>,
}

#[async_trait]
impl StatusFetcher<TransferId, SignableOperation, ServiceError> for TransferStatusFetcher {
    async fn fetch_status(&self, id: &TransferId) -> ServiceResult<SignableOperation> {
        self.service.transfer_status(id).await
    }
}

pub type TransferPollingTask = PollingTask<TransferId, SignableOperation, ServiceError>;

/// Polling task over one transfer's signable operation.
pub fn transfer_polling_task(
    service: Arc<dyn TransferService>,
    id: TransferId,
    initial: Option<SignableOperation>,
    config: PollingConfig,
    lifecycle: &dyn LifecycleObserver,
) -> TransferPollingTask {
    PollingTask::new(
        id,
        initial,
        Arc::new(TransferStatusFetcher { service }),
        default_change_predicate(),
        config,
        lifecycle,
    )
}
