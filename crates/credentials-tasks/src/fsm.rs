//! Lifecycle of a credentials task.
//!
//! ```text
//! Initiating ──Initiated──► Polling ──Completed──► Succeeded
//!                             │  ▲
//!   SupplementalInformation-  │  │ SubTaskResolved
//!   Requested / ThirdParty-   ▼  │
//!   AppRequested          Awaiting{SupplementalInformation,
//!                                  ThirdPartyAppAuthentication}
//!
//! any non-terminal state ──Fail──► Failed
//! any non-terminal state ──Cancel──► Cancelled
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub credentials_flow(Initiating)

    Initiating => {
        Initiated => Polling,
        Fail => Failed,
        Cancel => Cancelled
    },
    Polling => {
        SupplementalInformationRequested => AwaitingSupplementalInformation,
        ThirdPartyAppRequested => AwaitingThirdPartyAppAuthentication,
        Completed => Succeeded,
        Fail => Failed,
        Cancel => Cancelled
    },
    AwaitingSupplementalInformation => {
        SubTaskResolved => Polling,
        Fail => Failed,
        Cancel => Cancelled
    },
    AwaitingThirdPartyAppAuthentication => {
        SubTaskResolved => Polling,
        Fail => Failed,
        Cancel => Cancelled
    }
}

pub use credentials_flow::Input as CredentialsFlowInput;
pub use credentials_flow::State as CredentialsFlowState;
pub use credentials_flow::StateMachine as CredentialsFlow;

/// Where a credentials task stands, for callers and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialsTaskState {
    /// Waiting for the create, update, refresh or authenticate call.
    Initiating,
    /// Polling the credentials status.
    Polling,
    /// Waiting for the user to fill in a form.
    AwaitingSupplementalInformation,
    /// Waiting for the user to authenticate in an external app.
    AwaitingThirdPartyAppAuthentication,
    Succeeded,
    Failed,
    Cancelled,
}

impl CredentialsTaskState {
    /// True once the task has produced its outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CredentialsTaskState::Succeeded
                | CredentialsTaskState::Failed
                | CredentialsTaskState::Cancelled
        )
    }
}

impl From<&CredentialsFlowState> for CredentialsTaskState {
    fn from(state: &CredentialsFlowState) -> Self {
        match state {
            CredentialsFlowState::Initiating => CredentialsTaskState::Initiating,
            CredentialsFlowState::Polling => CredentialsTaskState::Polling,
            CredentialsFlowState::AwaitingSupplementalInformation => {
                CredentialsTaskState::AwaitingSupplementalInformation
            }
            CredentialsFlowState::AwaitingThirdPartyAppAuthentication => {
                CredentialsTaskState::AwaitingThirdPartyAppAuthentication
            }
            CredentialsFlowState::Succeeded => CredentialsTaskState::Succeeded,
            CredentialsFlowState::Failed => CredentialsTaskState::Failed,
            CredentialsFlowState::Cancelled => CredentialsTaskState::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_initiating() {
        let machine = CredentialsFlow::new();
        assert_eq!(*machine.state(), CredentialsFlowState::Initiating);
    }

    #[test]
    fn supplemental_information_round_trip() {
        let mut machine = CredentialsFlow::new();
        machine.consume(&CredentialsFlowInput::Initiated).unwrap();
        machine
            .consume(&CredentialsFlowInput::SupplementalInformationRequested)
            .unwrap();
        assert_eq!(
            *machine.state(),
            CredentialsFlowState::AwaitingSupplementalInformation
        );

        machine.consume(&CredentialsFlowInput::SubTaskResolved).unwrap();
        machine.consume(&CredentialsFlowInput::Completed).unwrap();
        assert_eq!(*machine.state(), CredentialsFlowState::Succeeded);
    }

    #[test]
    fn terminal_states_accept_nothing() {
        let mut machine = CredentialsFlow::new();
        machine.consume(&CredentialsFlowInput::Cancel).unwrap();
        assert_eq!(*machine.state(), CredentialsFlowState::Cancelled);

        assert!(machine.consume(&CredentialsFlowInput::Completed).is_err());
        assert!(machine.consume(&CredentialsFlowInput::Fail).is_err());
        assert!(machine.consume(&CredentialsFlowInput::Cancel).is_err());
        assert_eq!(*machine.state(), CredentialsFlowState::Cancelled);
    }

    #[test]
    fn cannot_complete_while_awaiting_user() {
        let mut machine = CredentialsFlow::new();
        machine.consume(&CredentialsFlowInput::Initiated).unwrap();
        machine
            .consume(&CredentialsFlowInput::ThirdPartyAppRequested)
            .unwrap();
        assert!(machine.consume(&CredentialsFlowInput::Completed).is_err());
    }

    #[test]
    fn user_facing_state() {
        let state = CredentialsTaskState::from(&CredentialsFlowState::Failed);
        assert!(state.is_terminal());
        assert!(!CredentialsTaskState::Polling.is_terminal());
    }
}
