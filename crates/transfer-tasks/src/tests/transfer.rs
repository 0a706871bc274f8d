//! Operation statuses and the detour through the credentials.

use super::harness::{
    bank_id_authentication, credentials, operation, otp_fields, request, with_message, Harness,
    Poll, ProgressLog, TRANSFER_ID,
};
use crate::error::{TransferTaskError, MISSING_CREDENTIALS_ID, MISSING_TRANSFER_ID};
use crate::fsm::TransferTaskState;
use crate::models::{Receipt, SignableOperationStatus, TransferId};
use crate::task::TransferTaskProgress;
use credentials_tasks::{CredentialsStatus, ServiceError};

// =============================================================================
// Operation statuses
// =============================================================================

#[tokio::test(start_paused = true)]
async fn executed_transfer_resolves_with_receipt() {
    let harness = Harness::new(
        vec![
            with_message(operation(SignableOperationStatus::Executing, 2), "Processing"),
            with_message(operation(SignableOperationStatus::Executed, 3), "Transfer done"),
        ],
        vec![],
    );
    let progress = ProgressLog::default();

    let mut task = harness.context.initiate_transfer(request(), progress.handler());
    let receipt = task.outcome().await.unwrap();

    assert_eq!(
        receipt,
        Receipt {
            id: TransferId::new(TRANSFER_ID),
            message: Some("Transfer done".into()),
        }
    );
    assert_eq!(progress.names(), vec!["created", "executing"]);
    match &progress.events()[1] {
        TransferTaskProgress::Executing(message) => assert_eq!(message, "Processing"),
        other => panic!("unexpected progress {other:?}"),
    }
    assert_eq!(task.state(), TransferTaskState::Succeeded);
    assert_eq!(harness.credentials.polls(), 0);
}

#[tokio::test(start_paused = true)]
async fn sent_counts_as_executed() {
    let harness = Harness::new(vec![operation(SignableOperationStatus::Sent, 2)], vec![]);

    let mut task = harness.context.initiate_transfer(request(), |_| {});
    let receipt = task.outcome().await.unwrap();

    assert_eq!(receipt.id, TransferId::new(TRANSFER_ID));
    assert_eq!(receipt.message, None);
}

#[tokio::test(start_paused = true)]
async fn executed_on_initiation_needs_no_poll() {
    let harness = Harness::new(vec![], vec![]);
    harness
        .transfers
        .set_initiated(Ok(operation(SignableOperationStatus::Executed, 1)));

    let mut task = harness.context.initiate_transfer(request(), |_| {});

    assert!(task.outcome().await.is_ok());
    assert_eq!(harness.transfers.polls(), 0);
}

#[tokio::test(start_paused = true)]
async fn backend_failure_carries_its_message() {
    let harness = Harness::new(
        vec![with_message(operation(SignableOperationStatus::Failed, 2), "Insufficient funds")],
        vec![],
    );

    let mut task = harness.context.initiate_transfer(request(), |_| {});

    assert_eq!(
        task.outcome().await,
        Err(TransferTaskError::Failed(Some("Insufficient funds".into())))
    );
    assert_eq!(task.state(), TransferTaskState::Failed);
}

#[tokio::test(start_paused = true)]
async fn unknown_status_keeps_polling() {
    let harness = Harness::new(
        vec![
            operation(SignableOperationStatus::Unknown, 2),
            operation(SignableOperationStatus::Executed, 3),
        ],
        vec![],
    );

    let mut task = harness.context.initiate_transfer(request(), |_| {});

    assert!(task.outcome().await.is_ok());
    assert_eq!(harness.transfers.polls(), 2);
}

#[tokio::test(start_paused = true)]
async fn missing_transfer_id_fails_without_polling() {
    let harness = Harness::new(vec![], vec![]);
    let mut initiated = operation(SignableOperationStatus::Created, 1);
    initiated.transfer_id = None;
    harness.transfers.set_initiated(Ok(initiated));

    let mut task = harness.context.initiate_transfer(request(), |_| {});

    assert_eq!(
        task.outcome().await,
        Err(TransferTaskError::Failed(Some(MISSING_TRANSFER_ID.into())))
    );
    assert_eq!(harness.transfers.polls(), 0);
}

#[tokio::test(start_paused = true)]
async fn initiation_error_is_surfaced() {
    let harness = Harness::new(vec![], vec![]);
    harness.transfers.set_initiated(Err(ServiceError::InvalidArgument(
        "destination".into(),
    )));

    let mut task = harness.context.initiate_transfer(request(), |_| {});

    assert_eq!(
        task.outcome().await,
        Err(TransferTaskError::Service(
            ServiceError::InvalidArgument("destination".into())
        ))
    );
}

// =============================================================================
// Credentials detour
// =============================================================================

#[tokio::test(start_paused = true)]
async fn supplemental_information_detour_then_executed() {
    let harness = Harness::new(
        vec![
            operation(SignableOperationStatus::AwaitingCredentials, 2),
            operation(SignableOperationStatus::Executed, 5),
        ],
        vec![
            credentials(CredentialsStatus::Authenticating, 2),
            credentials(CredentialsStatus::AwaitingSupplementalInformation(otp_fields()), 3),
            credentials(CredentialsStatus::Updated, 4),
        ],
    );
    let progress = ProgressLog::default();
    let handler = progress.reacting(|progress| {
        if let TransferTaskProgress::AwaitingSupplementalInformation(task) = progress {
            let mut form = task.form();
            form.set("otp", "123456");
            task.submit(form);
        }
    });

    let mut task = harness.context.initiate_transfer(request(), handler);

    assert!(task.outcome().await.is_ok());
    assert_eq!(
        progress.names(),
        vec!["created", "authenticating", "awaiting_supplemental_information"]
    );
    assert_eq!(harness.credentials.supplements().len(), 1);
    assert_eq!(
        harness.credentials.supplements()[0].get("otp").map(String::as_str),
        Some("123456")
    );
    // Never both polls at once.
    assert_eq!(
        harness.poll_phases(),
        vec![Poll::Operation, Poll::Credentials, Poll::Operation]
    );
}

#[tokio::test(start_paused = true)]
async fn credentials_updating_resumes_the_operation() {
    let harness = Harness::new(
        vec![
            operation(SignableOperationStatus::AwaitingThirdPartyAppAuthentication, 2),
            operation(SignableOperationStatus::Executed, 4),
        ],
        vec![credentials(CredentialsStatus::Updating, 3)],
    );

    let mut task = harness.context.initiate_transfer(request(), |_| {});

    assert!(task.outcome().await.is_ok());
    assert_eq!(harness.credentials.polls(), 1);
    assert_eq!(
        harness.poll_phases(),
        vec![Poll::Operation, Poll::Credentials, Poll::Operation]
    );
}

#[tokio::test(start_paused = true)]
async fn missing_app_keeps_waiting_for_authentication() {
    let harness = Harness::new(
        vec![
            operation(SignableOperationStatus::AwaitingCredentials, 2),
            operation(SignableOperationStatus::Executed, 5),
        ],
        vec![
            credentials(
                CredentialsStatus::AwaitingThirdPartyAppAuthentication(bank_id_authentication()),
                2,
            ),
            credentials(CredentialsStatus::Updated, 3),
        ],
    );
    let progress = ProgressLog::default();
    let handler = progress.reacting(|progress| {
        if let TransferTaskProgress::AwaitingThirdPartyAppAuthentication(task) = progress {
            assert!(!task.should_fail_on_download_required());
            task.handle();
        }
    });

    let mut task = harness.context.initiate_transfer(request(), handler);

    assert!(task.outcome().await.is_ok());
    assert_eq!(
        progress.names(),
        vec!["created", "awaiting_third_party_app_authentication"]
    );
}

#[tokio::test(start_paused = true)]
async fn awaiting_credentials_without_credentials_id_fails() {
    let mut awaiting = operation(SignableOperationStatus::AwaitingCredentials, 2);
    awaiting.credentials_id = None;
    let harness = Harness::new(vec![awaiting], vec![]);

    let mut task = harness.context.initiate_transfer(request(), |_| {});

    assert_eq!(
        task.outcome().await,
        Err(TransferTaskError::Failed(Some(MISSING_CREDENTIALS_ID.into())))
    );
    assert_eq!(harness.credentials.polls(), 0);
}
