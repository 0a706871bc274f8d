//! Error types for transfer tasks.

use credentials_tasks::{ServiceError, ThirdPartyAppAuthenticationError};
use thiserror::Error;

pub(crate) const MISSING_TRANSFER_ID: &str = "Failed to get transfer ID.";
pub(crate) const MISSING_CREDENTIALS_ID: &str = "Failed to get credentials ID.";

/// Terminal failure of a transfer task.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransferTaskError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Credentials disabled: {0}")]
    DisabledCredentials(String),

    #[error("Credentials session expired: {0}")]
    CredentialsSessionExpired(String),

    /// Cancelled by the user
    #[error("Transfer cancelled")]
    Cancelled,

    /// The bank cancelled the operation, with its message if it gave one
    #[error("Transfer cancelled by the bank{}", reason(.0))]
    CancelledByBank(Option<String>),

    #[error("Transfer failed{}", reason(.0))]
    Failed(Option<String>),

    #[error("Third party app authentication failed: {0}")]
    ThirdPartyApp(#[from] ThirdPartyAppAuthenticationError),

    #[error("Service error: {0}")]
    Service(ServiceError),

    /// The task ended without producing an outcome
    #[error("Task ended without an outcome")]
    Interrupted,
}

fn reason(message: &Option<String>) -> String {
    match message {
        Some(message) if !message.is_empty() => format!(": {message}"),
        _ => String::new(),
    }
}

impl TransferTaskError {
    /// Cancelled by the user rather than by the bank.
    pub fn is_user_cancellation(&self) -> bool {
        matches!(self, TransferTaskError::Cancelled)
    }
}

impl From<ServiceError> for TransferTaskError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::Cancelled => TransferTaskError::Cancelled,
            other => TransferTaskError::Service(other),
        }
    }
}

/// Result type alias using TransferTaskError.
pub type TransferTaskResult<T> = Result<T, TransferTaskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_backend_reason() {
        assert_eq!(
            TransferTaskError::Failed(Some("Insufficient funds".into())).to_string(),
            "Transfer failed: Insufficient funds"
        );
        assert_eq!(TransferTaskError::Cancelled.to_string(), "Transfer cancelled");
        assert_eq!(
            TransferTaskError::CancelledByBank(None).to_string(),
            "Transfer cancelled by the bank"
        );
    }

    #[test]
    fn service_cancellation_is_user_cancellation() {
        let error: TransferTaskError = ServiceError::Cancelled.into();
        assert!(error.is_user_cancellation());
        assert!(!TransferTaskError::CancelledByBank(None).is_user_cancellation());
        assert!(!TransferTaskError::CancelledByBank(Some("Rejected by bank".into())).is_user_cancellation());
    }
}
