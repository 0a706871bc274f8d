//! Third-party-app authentication sub-task.

use crate::authentication::{StatusHandler, SubTaskId, SubTaskRequest};
use crate::error::ThirdPartyAppAuthenticationError;
use crate::models::{Credentials, CredentialsKind, ThirdPartyAppAuthentication};
use crate::service::CredentialsService;
use crate::url_opener::UrlOpener;
use image::DynamicImage;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

/// Redirect the backend embeds in BankID deep links; rewritten to the app's
/// own redirect URI before opening.
const LEGACY_BANKID_REDIRECT: &str = "tink://bankid";

/// User action needed when the authentication app cannot be opened here.
#[derive(Debug, Clone, PartialEq)]
pub enum ThirdPartyAppStatus {
    /// Show this QR code so the user can scan it with another device.
    QrImage(DynamicImage),
    /// The user authenticates on another device; keep waiting.
    AwaitAuthenticationOnAnotherDevice,
}

/// Pause in a task's flow while the user authenticates in an external app.
///
/// [`handle`](Self::handle) opens the app. [`handle_with_status`](Self::handle_with_status)
/// additionally offers a QR code or "authenticate on another device" when
/// the app cannot be opened and the task does not fail on a missing app.
/// Clones share the same sub-task.
#[derive(Clone)]
pub struct ThirdPartyAppAuthenticationTask {
    inner: Arc<Inner>,
}

struct Inner {
    sub_task: SubTaskId,
    credentials: Credentials,
    authentication: ThirdPartyAppAuthentication,
    should_fail_on_download_required: bool,
    requests: mpsc::UnboundedSender<SubTaskRequest>,
}

impl ThirdPartyAppAuthenticationTask {
    pub(crate) fn new(
        sub_task: SubTaskId,
        credentials: Credentials,
        authentication: ThirdPartyAppAuthentication,
        should_fail_on_download_required: bool,
        requests: mpsc::UnboundedSender<SubTaskRequest>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                sub_task,
                credentials,
                authentication,
                should_fail_on_download_required,
                requests,
            }),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.inner.credentials
    }

    /// How to open or download the authentication app.
    pub fn third_party_app_authentication(&self) -> &ThirdPartyAppAuthentication {
        &self.inner.authentication
    }

    pub fn should_fail_on_download_required(&self) -> bool {
        self.inner.should_fail_on_download_required
    }

    /// Open the authentication app.
    pub fn handle(&self) {
        self.send(SubTaskRequest::Handle {
            sub_task: self.inner.sub_task,
            status_handler: None,
        });
    }

    /// Open the authentication app, falling back to `status_handler` when it
    /// cannot be opened.
    pub fn handle_with_status<F>(&self, status_handler: F)
    where
        F: Fn(ThirdPartyAppStatus) + Send + Sync + 'static,
    {
        self.send(SubTaskRequest::Handle {
            sub_task: self.inner.sub_task,
            status_handler: Some(Arc::new(status_handler)),
        });
    }

    /// Stop waiting, aborting any QR code fetch. The owning task fails as cancelled.
    pub fn cancel(&self) {
        self.send(SubTaskRequest::CancelThirdParty {
            sub_task: self.inner.sub_task,
        });
    }

    fn send(&self, request: SubTaskRequest) {
        if self.inner.requests.send(request).is_err() {
            warn!(
                credentials_id = %self.inner.credentials.id,
                "third party app request dropped, task already finished"
            );
        }
    }
}

impl fmt::Debug for ThirdPartyAppAuthenticationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThirdPartyAppAuthenticationTask")
            .field("credentials_id", &self.inner.credentials.id)
            .field("kind", &self.inner.credentials.kind)
            .field(
                "should_fail_on_download_required",
                &self.inner.should_fail_on_download_required,
            )
            .finish()
    }
}

/// Everything needed to run one hand-off, detached from the handle.
pub(crate) struct ThirdPartyFlow {
    pub(crate) service: Arc<dyn CredentialsService>,
    pub(crate) url_opener: Arc<dyn UrlOpener>,
    pub(crate) redirect_uri: Url,
    pub(crate) credentials: Credentials,
    pub(crate) authentication: ThirdPartyAppAuthentication,
    pub(crate) should_fail_on_download_required: bool,
}

impl ThirdPartyFlow {
    pub(crate) async fn run(
        self,
        status_handler: Option<StatusHandler>,
    ) -> Result<(), ThirdPartyAppAuthenticationError> {
        let opened =
            open_third_party_app(&*self.url_opener, &self.authentication, &self.redirect_uri).await;

        let status_handler = match status_handler {
            Some(handler) if !self.should_fail_on_download_required => handler,
            _ => return opened,
        };

        let error = match opened {
            Ok(()) => return Ok(()),
            Err(error) => error,
        };

        let is_bank_id = self.credentials.kind == CredentialsKind::MobileBankId;
        if is_bank_id && self.authentication.has_auto_start_token() {
            debug!(credentials_id = %self.credentials.id, "app not opened, fetching QR code");
            let bytes = self.service.qr_code(&self.credentials.id).await?;
            let image = decode_qr_image(&bytes)?;
            status_handler(ThirdPartyAppStatus::QrImage(image));
            Ok(())
        } else if is_bank_id {
            info!(credentials_id = %self.credentials.id, "awaiting authentication on another device");
            status_handler(ThirdPartyAppStatus::AwaitAuthenticationOnAnotherDevice);
            Ok(())
        } else {
            Err(error)
        }
    }
}

/// Open the deep link, preferring a universal link over a plain open.
pub async fn open_third_party_app(
    url_opener: &dyn UrlOpener,
    authentication: &ThirdPartyAppAuthentication,
    redirect_uri: &Url,
) -> Result<(), ThirdPartyAppAuthenticationError> {
    let deep_link = authentication
        .deep_link_url
        .as_ref()
        .ok_or(ThirdPartyAppAuthenticationError::DeeplinkUrlNotFound)?;
    let deep_link = sanitize_deep_link(deep_link, redirect_uri);

    if url_opener.open(&deep_link, true).await || url_opener.open(&deep_link, false).await {
        debug!(url = %deep_link, "third party app opened");
        return Ok(());
    }

    Err(ThirdPartyAppAuthenticationError::DownloadRequired {
        title: authentication.download_title.clone(),
        message: authentication.download_message.clone(),
        app_store_url: authentication.app_store_url.clone(),
    })
}

/// Rewrite the backend's BankID redirect to `<redirect_uri>/bankid`.
pub fn sanitize_deep_link(deep_link: &Url, redirect_uri: &Url) -> Url {
    let bank_id_redirect = format!("{}/bankid", redirect_uri.as_str().trim_end_matches('/'));
    let rewritten = deep_link
        .as_str()
        .replace(LEGACY_BANKID_REDIRECT, &bank_id_redirect);
    Url::parse(&rewritten).unwrap_or_else(|_| deep_link.clone())
}

fn decode_qr_image(bytes: &[u8]) -> Result<DynamicImage, ThirdPartyAppAuthenticationError> {
    image::load_from_memory(bytes).map_err(|err| {
        warn!(error = %err, "QR code payload is not an image");
        ThirdPartyAppAuthenticationError::DecodingQrCodeImageFailed
    })
}
