//! Entry point that starts credentials tasks.

use crate::error::{CredentialsTaskError, ServiceResult};
use crate::models::{Credentials, Form, Provider, ProviderId, RefreshableItems};
use crate::service::CredentialsService;
use crate::task::{
    CompletionPredicate, CredentialsOperation, CredentialsTask, CredentialsTaskProgress,
    Initiated, InitiatingCall, SuccessPredicate, TaskDependencies,
};
use crate::url_opener::UrlOpener;
use app_lifecycle::LifecycleObserver;
use futures_util::FutureExt;
use link_config_and_utils::{Config, CoreResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

const STATE_PARAMETER: &str = "state";

/// Starts credentials tasks against one service.
///
/// Remembers the credentials created per provider, so adding again for the
/// same provider updates them instead of creating a duplicate.
pub struct CredentialsContext {
    dependencies: TaskDependencies,
    fail_on_download_required: bool,
    newly_added: Arc<Mutex<HashMap<ProviderId, Credentials>>>,
}

impl CredentialsContext {
    pub fn new(
        service: Arc<dyn CredentialsService>,
        lifecycle: Arc<dyn LifecycleObserver>,
        url_opener: Arc<dyn UrlOpener>,
        config: &Config,
    ) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self {
            dependencies: TaskDependencies {
                service,
                url_opener,
                lifecycle,
                redirect_uri: config.redirect_uri()?,
                polling: config.polling_config(),
            },
            fail_on_download_required: config.fail_on_third_party_app_download_required,
            newly_added: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn redirect_uri(&self) -> &Url {
        &self.dependencies.redirect_uri
    }

    /// Complete on `updated`, with the configured download-required policy.
    pub fn default_completion_predicate(&self) -> CompletionPredicate {
        CompletionPredicate::new(SuccessPredicate::Updated, self.fail_on_download_required)
    }

    /// Add credentials for `provider` from a filled-in form.
    ///
    /// `refreshable_items` is narrowed to what the provider supports.
    pub fn add<F>(
        &self,
        provider: &Provider,
        form: Form,
        refreshable_items: RefreshableItems,
        completion_predicate: CompletionPredicate,
        progress: F,
    ) -> CredentialsTask
    where
        F: Fn(CredentialsTaskProgress) + Send + Sync + 'static,
    {
        let refreshable_items = refreshable_items.supporting(provider.capabilities);
        let service = Arc::clone(&self.dependencies.service);
        let redirect_uri = self.dependencies.redirect_uri.clone();
        let provider_id = provider.id.clone();
        let fields = form.make_fields();
        let previously_added = self.newly_added.lock().get(&provider_id).cloned();
        let newly_added = Arc::clone(&self.newly_added);

        let initiating: InitiatingCall = match previously_added {
            Some(existing) => {
                debug!(provider_id = %provider_id, credentials_id = %existing.id, "updating newly added credentials");
                async move {
                    let credentials = service
                        .update_credentials(&existing.id, &existing.provider_id, &redirect_uri, fields)
                        .await
                        .map_err(CredentialsTaskError::from_add_error)?;
                    Ok(Initiated::Snapshot(credentials))
                }
                .boxed()
            }
            None => async move {
                let credentials = service
                    .create_credentials(&provider_id, refreshable_items, fields, &redirect_uri)
                    .await
                    .map_err(CredentialsTaskError::from_add_error)?;
                newly_added.lock().insert(provider_id, credentials.clone());
                Ok(Initiated::Snapshot(credentials))
            }
            .boxed(),
        };

        self.spawn(CredentialsOperation::Add, completion_predicate, initiating, progress)
    }

    /// Refresh existing credentials, optionally forcing a new authentication.
    pub fn refresh<F>(
        &self,
        credentials: &Credentials,
        authenticate: bool,
        refreshable_items: RefreshableItems,
        should_fail_on_third_party_app_authentication_download_required: bool,
        progress: F,
    ) -> CredentialsTask
    where
        F: Fn(CredentialsTaskProgress) + Send + Sync + 'static,
    {
        let service = Arc::clone(&self.dependencies.service);
        let credentials_id = credentials.id.clone();
        let initiating = async move {
            service
                .refresh_credentials(&credentials_id, authenticate, refreshable_items, false)
                .await?;
            Ok(Initiated::Accepted(credentials_id))
        }
        .boxed();

        self.spawn(
            CredentialsOperation::Refresh,
            CompletionPredicate::new(
                SuccessPredicate::Updated,
                should_fail_on_third_party_app_authentication_download_required,
            ),
            initiating,
            progress,
        )
    }

    /// Update existing credentials with new field values.
    pub fn update<F>(
        &self,
        credentials: &Credentials,
        form: Option<Form>,
        should_fail_on_third_party_app_authentication_download_required: bool,
        progress: F,
    ) -> CredentialsTask
    where
        F: Fn(CredentialsTaskProgress) + Send + Sync + 'static,
    {
        let service = Arc::clone(&self.dependencies.service);
        let redirect_uri = self.dependencies.redirect_uri.clone();
        let credentials_id = credentials.id.clone();
        let provider_id = credentials.provider_id.clone();
        let fields = form.map(|form| form.make_fields()).unwrap_or_default();
        let initiating = async move {
            service
                .update_credentials(&credentials_id, &provider_id, &redirect_uri, fields)
                .await?;
            Ok(Initiated::Accepted(credentials_id))
        }
        .boxed();

        self.spawn(
            CredentialsOperation::Update,
            CompletionPredicate::new(
                SuccessPredicate::Updated,
                should_fail_on_third_party_app_authentication_download_required,
            ),
            initiating,
            progress,
        )
    }

    /// Authenticate open-banking credentials.
    pub fn authenticate<F>(
        &self,
        credentials: &Credentials,
        should_fail_on_third_party_app_authentication_download_required: bool,
        progress: F,
    ) -> CredentialsTask
    where
        F: Fn(CredentialsTaskProgress) + Send + Sync + 'static,
    {
        let service = Arc::clone(&self.dependencies.service);
        let credentials_id = credentials.id.clone();
        let initiating = async move {
            service.authenticate_credentials(&credentials_id).await?;
            Ok(Initiated::Accepted(credentials_id))
        }
        .boxed();

        self.spawn(
            CredentialsOperation::Authenticate,
            CompletionPredicate::new(
                SuccessPredicate::Updated,
                should_fail_on_third_party_app_authentication_download_required,
            ),
            initiating,
            progress,
        )
    }

    /// Forward a third-party app redirect back to the service.
    ///
    /// Returns `false` when `url` carries no `state` parameter and so is not
    /// a third-party callback.
    pub async fn open_redirect(&self, url: &Url) -> ServiceResult<bool> {
        let mut parameters: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let Some(state) = parameters.remove(STATE_PARAMETER) else {
            debug!(url = %url, "redirect without state ignored");
            return Ok(false);
        };

        self.dependencies
            .service
            .third_party_callback(&state, parameters)
            .await?;
        info!("third party callback forwarded");
        Ok(true)
    }

    fn spawn<F>(
        &self,
        operation: CredentialsOperation,
        completion_predicate: CompletionPredicate,
        initiating: InitiatingCall,
        progress: F,
    ) -> CredentialsTask
    where
        F: Fn(CredentialsTaskProgress) + Send + Sync + 'static,
    {
        CredentialsTask::spawn(
            operation,
            completion_predicate,
            self.dependencies.clone(),
            initiating,
            Box::new(progress),
        )
    }
}
