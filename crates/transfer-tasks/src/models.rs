//! Transfer and signable-operation value types.

use chrono::{DateTime, NaiveDate, Utc};
use credentials_tasks::CredentialsId;
use serde::{Deserialize, Serialize};
use status_polling_task::Snapshot;
use std::fmt;

/// Identifier of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(pub String);

impl TransferId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignableOperationId(pub String);

impl SignableOperationId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for SignableOperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a transfer stands on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignableOperationStatus {
    Created,
    /// The credentials must be (re)authenticated before the transfer can go out.
    AwaitingCredentials,
    AwaitingThirdPartyAppAuthentication,
    Executing,
    Executed,
    /// Reported by some providers instead of `executed`.
    Sent,
    Failed,
    Cancelled,
    Unknown,
}

impl SignableOperationStatus {
    pub fn name(self) -> &'static str {
        match self {
            SignableOperationStatus::Created => "created",
            SignableOperationStatus::AwaitingCredentials => "awaiting_credentials",
            SignableOperationStatus::AwaitingThirdPartyAppAuthentication => {
                "awaiting_third_party_app_authentication"
            }
            SignableOperationStatus::Executing => "executing",
            SignableOperationStatus::Executed => "executed",
            SignableOperationStatus::Sent => "sent",
            SignableOperationStatus::Failed => "failed",
            SignableOperationStatus::Cancelled => "cancelled",
            SignableOperationStatus::Unknown => "unknown",
        }
    }
}

/// A snapshot of the operation that signs and executes a transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignableOperation {
    pub id: Option<SignableOperationId>,
    pub credentials_id: Option<CredentialsId>,
    pub status: SignableOperationStatus,
    pub status_message: Option<String>,
    pub transfer_id: Option<TransferId>,
    pub updated: Option<DateTime<Utc>>,
}

impl Snapshot for SignableOperation {
    type Status = SignableOperationStatus;

    fn status(&self) -> &SignableOperationStatus {
        &self.status
    }

    fn status_updated(&self) -> Option<DateTime<Utc>> {
        self.updated
    }
}

/// An exact amount in one currency: `unscaled_value * 10^-scale`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyDenominatedAmount {
    pub unscaled_value: i64,
    pub scale: u32,
    pub currency_code: String,
}

impl CurrencyDenominatedAmount {
    pub fn new(unscaled_value: i64, scale: u32, currency_code: impl Into<String>) -> Self {
        Self {
            unscaled_value,
            scale,
            currency_code: currency_code.into(),
        }
    }
}

impl fmt::Display for CurrencyDenominatedAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.unscaled_value < 0 { "-" } else { "" };
        let magnitude = self.unscaled_value.unsigned_abs();
        let Some(divisor) = 10u64.checked_pow(self.scale) else {
            return write!(f, "{}e-{} {}", self.unscaled_value, self.scale, self.currency_code);
        };
        if self.scale == 0 {
            write!(f, "{sign}{magnitude} {}", self.currency_code)
        } else {
            write!(
                f,
                "{sign}{}.{:0width$} {}",
                magnitude / divisor,
                magnitude % divisor,
                self.currency_code,
                width = self.scale as usize
            )
        }
    }
}

/// A transfer to initiate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub amount: CurrencyDenominatedAmount,
    /// Account the money leaves, as an account URI such as `iban://...`.
    pub source_uri: String,
    pub destination_uri: String,
    pub source_message: Option<String>,
    pub destination_message: String,
    pub due_date: Option<NaiveDate>,
}

/// Proof that a transfer was executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: TransferId,
    pub message: Option<String>,
}
