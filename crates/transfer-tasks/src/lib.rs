//! Transfer tasks: initiate a bank transfer and follow it until the bank
//! executes it.
//!
//! ```text
//! TransferContext::initiate_transfer ──► InitiateTransferTask (actor)
//!                                          ├── PollingTask<TransferId, SignableOperation>
//!                                          ├── PollingTask<CredentialsId, Credentials>
//!                                          └── SubTaskDriver
//! ```
//!
//! While the operation waits for credentials, the task polls the
//! credentials instead and hands supplemental information and third-party
//! app requests to the caller, exactly as a credentials task would.

mod context;
pub mod error;
pub mod fsm;
pub mod models;
pub mod service;
mod task;

pub use context::TransferContext;
pub use error::{TransferTaskError, TransferTaskResult};
pub use fsm::TransferTaskState;
pub use models::{
    CurrencyDenominatedAmount, Receipt, SignableOperation, SignableOperationId,
    SignableOperationStatus, TransferId, TransferRequest,
};
pub use service::{transfer_polling_task, TransferPollingTask, TransferService};
pub use task::{InitiateTransferTask, TransferProgressHandler, TransferTaskProgress};

#[cfg(test)]
mod tests;
