//! Error types for credentials tasks and the service contract they consume.

use thiserror::Error;
use url::Url;

/// Failure reported by the credentials or transfer service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The call was cancelled before it completed
    #[error("Request cancelled")]
    Cancelled,

    /// The resource already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Service unreachable (transient error, can retry)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns true if the call can be retried as-is.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Unavailable(_) | ServiceError::Timeout)
    }
}

/// Result type alias using ServiceError.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Failure of the third-party app hand-off.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThirdPartyAppAuthenticationError {
    /// The authentication payload carries no deep link
    #[error("Deep link URL not found")]
    DeeplinkUrlNotFound,

    /// The app could not be opened; it most likely needs to be installed
    #[error("Third party app could not be opened and may need to be downloaded")]
    DownloadRequired {
        title: Option<String>,
        message: Option<String>,
        app_store_url: Option<Url>,
    },

    #[error("Credentials cannot be authenticated on another device")]
    DoesNotSupportAuthenticatingOnAnotherDevice,

    #[error("Decoding the QR code image failed")]
    DecodingQrCodeImageFailed,

    #[error("Cancelled by user")]
    UserCancelled,

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl ThirdPartyAppAuthenticationError {
    /// Store link for the missing app, if any.
    pub fn app_store_url(&self) -> Option<&Url> {
        match self {
            ThirdPartyAppAuthenticationError::DownloadRequired { app_store_url, .. } => {
                app_store_url.as_ref()
            }
            _ => None,
        }
    }

    pub fn is_download_required(&self) -> bool {
        matches!(self, ThirdPartyAppAuthenticationError::DownloadRequired { .. })
    }
}

/// Terminal failure of a credentials task.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CredentialsTaskError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Temporary failure: {0}")]
    TemporaryFailure(String),

    #[error("Permanent failure: {0}")]
    PermanentFailure(String),

    #[error("Credentials already exist: {0}")]
    CredentialsAlreadyExists(String),

    #[error("Credentials disabled: {0}")]
    Disabled(String),

    #[error("Credentials deleted: {0}")]
    Deleted(String),

    #[error("Task cancelled")]
    Cancelled,

    #[error("Third party app authentication failed: {0}")]
    ThirdPartyApp(#[from] ThirdPartyAppAuthenticationError),

    #[error("Service error: {0}")]
    Service(ServiceError),

    /// The task ended without producing an outcome
    #[error("Task ended without an outcome")]
    Interrupted,
}

impl CredentialsTaskError {
    /// Maps a failed create/update call of an add flow.
    pub fn from_add_error(error: ServiceError) -> Self {
        match error {
            ServiceError::AlreadyExists(payload) => CredentialsTaskError::CredentialsAlreadyExists(payload),
            other => other.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CredentialsTaskError::Cancelled)
    }
}

impl From<ServiceError> for CredentialsTaskError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::Cancelled => CredentialsTaskError::Cancelled,
            other => CredentialsTaskError::Service(other),
        }
    }
}

/// Result type alias using CredentialsTaskError.
pub type CredentialsTaskResult<T> = Result<T, CredentialsTaskError>;
