//! Credentials tasks: add, refresh, update and authenticate bank credentials.
//!
//! A task issues its initiating call, then polls the credentials status and
//! reacts to it, pausing for the user whenever the provider asks for
//! supplemental information or authentication in an external app.
//!
//! ```text
//! CredentialsContext::add ──► CredentialsTask (actor)
//!                               ├── initiating call
//!                               ├── PollingTask<CredentialsId, Credentials>
//!                               └── SubTaskDriver
//!                                     ├── SupplementInformationTask
//!                                     └── ThirdPartyAppAuthenticationTask
//! ```

pub mod authentication;
pub mod completion;
mod context;
pub mod error;
pub mod fsm;
pub mod models;
pub mod service;
mod supplement;
mod task;
pub mod third_party;
pub mod url_opener;

pub use authentication::{StatusHandler, SubTaskDriver, SubTaskOutcome};
pub use completion::{outcome_channel, Completer, PendingOutcome, TaskOutcome};
pub use context::CredentialsContext;
pub use error::{
    CredentialsTaskError, CredentialsTaskResult, ServiceError, ServiceResult,
    ThirdPartyAppAuthenticationError,
};
pub use fsm::CredentialsTaskState;
pub use models::{
    Credentials, CredentialsId, CredentialsKind, CredentialsStatus, FieldSpecification, Form,
    FormField, Provider, ProviderId, RefreshableItems, ThirdPartyAppAuthentication,
};
pub use service::{credentials_polling_task, CredentialsPollingTask, CredentialsService};
pub use supplement::SupplementInformationTask;
pub use task::{
    authentication_failure_message, CompletionPredicate, CredentialsOperation, CredentialsTask,
    CredentialsTaskProgress, ProgressHandler, ReachableStatuses, SuccessPredicate, TaskId,
    AUTHENTICATION_FAILED_FALLBACK_MESSAGE,
};
pub use third_party::{ThirdPartyAppAuthenticationTask, ThirdPartyAppStatus};
pub use url_opener::{SystemUrlOpener, UrlOpener};

#[cfg(test)]
mod tests;
