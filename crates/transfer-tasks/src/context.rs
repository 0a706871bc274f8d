//! Entry point that starts transfer tasks.

use crate::error::TransferTaskError;
use crate::models::TransferRequest;
use crate::service::TransferService;
use crate::task::{InitiateTransferTask, TransferDependencies, TransferTaskProgress};
use app_lifecycle::LifecycleObserver;
use credentials_tasks::{CredentialsService, UrlOpener};
use futures_util::FutureExt;
use link_config_and_utils::{Config, CoreResult};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Starts transfers against a transfer service, authenticating through the
/// credentials service when the bank asks for it.
pub struct TransferContext {
    dependencies: TransferDependencies,
}

impl TransferContext {
    pub fn new(
        transfer_service: Arc<dyn TransferService>,
        credentials_service: Arc<dyn CredentialsService>,
        lifecycle: Arc<dyn LifecycleObserver>,
        url_opener: Arc<dyn UrlOpener>,
        config: &Config,
    ) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self {
            dependencies: TransferDependencies {
                transfer_service,
                credentials_service,
                url_opener,
                lifecycle,
                redirect_uri: config.redirect_uri()?,
                polling: config.polling_config(),
            },
        })
    }

    pub fn redirect_uri(&self) -> &Url {
        &self.dependencies.redirect_uri
    }

    /// Start a transfer. The task resolves with a receipt once the bank has
    /// executed it.
    pub fn initiate_transfer<F>(&self, request: TransferRequest, progress: F) -> InitiateTransferTask
    where
        F: Fn(TransferTaskProgress) + Send + Sync + 'static,
    {
        debug!(amount = %request.amount, destination = %request.destination_uri, "initiating transfer");
        let service = Arc::clone(&self.dependencies.transfer_service);
        let redirect_uri = self.dependencies.redirect_uri.clone();
        let initiating = async move {
            service
                .initiate_transfer(&request, &redirect_uri)
                .await
                .map_err(TransferTaskError::from)
        }
        .boxed();

        InitiateTransferTask::spawn(self.dependencies.clone(), initiating, Box::new(progress))
    }
}
