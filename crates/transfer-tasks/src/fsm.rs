//! Lifecycle of a transfer task.
//!
//! Exactly one of the two polls runs in each polling state.
//!
//! ```text
//! Initiating ──Initiated──► PollingOperation ──Executed──► Succeeded
//!                             │  ▲
//!          CredentialsRequired│  │CredentialsUpdated
//!                             ▼  │
//!                           PollingCredentials ◄──SubTaskResolved──┐
//!                             │                                    │
//!                             └─► Awaiting{SupplementalInformation,┘
//!                                          ThirdPartyAppAuthentication}
//!
//! any non-terminal state ──Fail──► Failed
//! any non-terminal state ──Cancel──► Cancelled
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub transfer_flow(Initiating)

    Initiating => {
        Initiated => PollingOperation,
        Fail => Failed,
        Cancel => Cancelled
    },
    PollingOperation => {
        CredentialsRequired => PollingCredentials,
        Executed => Succeeded,
        Fail => Failed,
        Cancel => Cancelled
    },
    PollingCredentials => {
        CredentialsUpdated => PollingOperation,
        SupplementalInformationRequested => AwaitingSupplementalInformation,
        ThirdPartyAppRequested => AwaitingThirdPartyAppAuthentication,
        Fail => Failed,
        Cancel => Cancelled
    },
    AwaitingSupplementalInformation => {
        SubTaskResolved => PollingCredentials,
        Fail => Failed,
        Cancel => Cancelled
    },
    AwaitingThirdPartyAppAuthentication => {
        SubTaskResolved => PollingCredentials,
        Fail => Failed,
        Cancel => Cancelled
    }
}

pub use transfer_flow::Input as TransferFlowInput;
pub use transfer_flow::State as TransferFlowState;
pub use transfer_flow::StateMachine as TransferFlow;

/// Where a transfer task stands, for callers and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferTaskState {
    Initiating,
    /// Polling the signable operation.
    PollingOperation,
    /// Polling the credentials the transfer is signed with.
    PollingCredentials,
    AwaitingSupplementalInformation,
    AwaitingThirdPartyAppAuthentication,
    Succeeded,
    Failed,
    Cancelled,
}

impl TransferTaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferTaskState::Succeeded | TransferTaskState::Failed | TransferTaskState::Cancelled
        )
    }
}

impl From<&TransferFlowState> for TransferTaskState {
    fn from(state: &TransferFlowState) -> Self {
        match state {
            TransferFlowState::Initiating => TransferTaskState::Initiating,
            TransferFlowState::PollingOperation => TransferTaskState::PollingOperation,
            TransferFlowState::PollingCredentials => TransferTaskState::PollingCredentials,
            TransferFlowState::AwaitingSupplementalInformation => {
                TransferTaskState::AwaitingSupplementalInformation
            }
            TransferFlowState::AwaitingThirdPartyAppAuthentication => {
                TransferTaskState::AwaitingThirdPartyAppAuthentication
            }
            TransferFlowState::Succeeded => TransferTaskState::Succeeded,
            TransferFlowState::Failed => TransferTaskState::Failed,
            TransferFlowState::Cancelled => TransferTaskState::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_detour_returns_to_operation() {
        let mut machine = TransferFlow::new();
        machine.consume(&TransferFlowInput::Initiated).unwrap();
        machine.consume(&TransferFlowInput::CredentialsRequired).unwrap();
        machine
            .consume(&TransferFlowInput::ThirdPartyAppRequested)
            .unwrap();
        machine.consume(&TransferFlowInput::SubTaskResolved).unwrap();
        machine.consume(&TransferFlowInput::CredentialsUpdated).unwrap();
        machine.consume(&TransferFlowInput::Executed).unwrap();
        assert_eq!(*machine.state(), TransferFlowState::Succeeded);
    }

    #[test]
    fn cannot_execute_while_polling_credentials() {
        let mut machine = TransferFlow::new();
        machine.consume(&TransferFlowInput::Initiated).unwrap();
        machine.consume(&TransferFlowInput::CredentialsRequired).unwrap();
        assert!(machine.consume(&TransferFlowInput::Executed).is_err());
        assert_eq!(*machine.state(), TransferFlowState::PollingCredentials);
    }

    #[test]
    fn terminal_after_cancel() {
        let mut machine = TransferFlow::new();
        machine.consume(&TransferFlowInput::Cancel).unwrap();
        assert!(TransferTaskState::from(machine.state()).is_terminal());
        assert!(machine.consume(&TransferFlowInput::Initiated).is_err());
    }
}
