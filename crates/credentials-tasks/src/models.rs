//! Credentials value types as reported by the credentials service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use status_polling_task::Snapshot;
use std::collections::HashMap;
use std::fmt;
use url::Url;

/// Identifier of a stored credentials resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialsId(pub String);

impl CredentialsId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a financial-institution provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(pub String);

impl ProviderId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the user authenticates against the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialsKind {
    Unknown,
    Password,
    MobileBankId,
    Keyfob,
    Fraud,
    ThirdPartyAuthentication,
}

impl CredentialsKind {
    /// Kinds that authenticate through an external app.
    pub fn uses_third_party_app(self) -> bool {
        matches!(
            self,
            CredentialsKind::MobileBankId | CredentialsKind::ThirdPartyAuthentication
        )
    }
}

impl fmt::Display for CredentialsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CredentialsKind::Unknown => "Unknown",
            CredentialsKind::Password => "Password",
            CredentialsKind::MobileBankId => "Mobile BankID",
            CredentialsKind::Keyfob => "Key Fob",
            CredentialsKind::Fraud => "Fraud",
            CredentialsKind::ThirdPartyAuthentication => "Third Party Authentication",
        };
        f.write_str(name)
    }
}

/// Where a credentials resource currently stands.
///
/// The human-readable message for `updating` and the error states lives in
/// [`Credentials::status_payload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialsStatus {
    Created,
    Authenticating,
    Updating,
    Updated,
    TemporaryError,
    PermanentError,
    AuthenticationError,
    AwaitingSupplementalInformation(Vec<FieldSpecification>),
    AwaitingThirdPartyAppAuthentication(ThirdPartyAppAuthentication),
    /// Older spelling of [`CredentialsStatus::AwaitingThirdPartyAppAuthentication`].
    AwaitingMobileBankIdAuthentication(ThirdPartyAppAuthentication),
    Disabled,
    SessionExpired,
    Deleted,
    Unknown,
}

impl CredentialsStatus {
    pub fn name(&self) -> &'static str {
        match self {
            CredentialsStatus::Created => "created",
            CredentialsStatus::Authenticating => "authenticating",
            CredentialsStatus::Updating => "updating",
            CredentialsStatus::Updated => "updated",
            CredentialsStatus::TemporaryError => "temporary_error",
            CredentialsStatus::PermanentError => "permanent_error",
            CredentialsStatus::AuthenticationError => "authentication_error",
            CredentialsStatus::AwaitingSupplementalInformation(_) => {
                "awaiting_supplemental_information"
            }
            CredentialsStatus::AwaitingThirdPartyAppAuthentication(_) => {
                "awaiting_third_party_app_authentication"
            }
            CredentialsStatus::AwaitingMobileBankIdAuthentication(_) => {
                "awaiting_mobile_bank_id_authentication"
            }
            CredentialsStatus::Disabled => "disabled",
            CredentialsStatus::SessionExpired => "session_expired",
            CredentialsStatus::Deleted => "deleted",
            CredentialsStatus::Unknown => "unknown",
        }
    }
}

/// A snapshot of one credentials resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub id: CredentialsId,
    pub provider_id: ProviderId,
    pub kind: CredentialsKind,
    pub status: CredentialsStatus,
    #[serde(default)]
    pub status_payload: String,
    pub status_updated: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fields: HashMap<String, String>,
    pub session_expiry_date: Option<DateTime<Utc>>,
}

impl Snapshot for Credentials {
    type Status = CredentialsStatus;

    fn status(&self) -> &CredentialsStatus {
        &self.status
    }

    fn status_updated(&self) -> Option<DateTime<Utc>> {
        self.status_updated
    }
}

/// How to open, or where to download, the app that authenticates a credential.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ThirdPartyAppAuthentication {
    pub download_title: Option<String>,
    pub download_message: Option<String>,
    pub upgrade_title: Option<String>,
    pub upgrade_message: Option<String>,
    pub app_store_url: Option<Url>,
    pub scheme: Option<String>,
    pub deep_link_url: Option<Url>,
}

impl ThirdPartyAppAuthentication {
    /// The deep link carries a BankID autostart token, so a QR code can be
    /// offered for authenticating on another device.
    pub fn has_auto_start_token(&self) -> bool {
        self.deep_link_url
            .as_ref()
            .and_then(|url| url.query())
            .is_some_and(|query| query.contains("autostartToken"))
    }
}

/// One input requested by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldSpecification {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hint: String,
    #[serde(default)]
    pub is_optional: bool,
    #[serde(default)]
    pub masked: bool,
    pub max_length: Option<usize>,
    pub min_length: Option<usize>,
    #[serde(default)]
    pub value: String,
}

/// A single form input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub text: String,
    pub is_optional: bool,
}

/// User input collected for a set of field specifications.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Form {
    pub fields: Vec<FormField>,
}

impl Form {
    pub fn new(specifications: &[FieldSpecification]) -> Self {
        Self {
            fields: specifications
                .iter()
                .map(|spec| FormField {
                    name: spec.name.clone(),
                    text: spec.value.clone(),
                    is_optional: spec.is_optional,
                })
                .collect(),
        }
    }

    /// Set the text of the field called `name`. Returns false when absent.
    pub fn set(&mut self, name: &str, text: impl Into<String>) -> bool {
        match self.fields.iter_mut().find(|field| field.name == name) {
            Some(field) => {
                field.text = text.into();
                true
            }
            None => false,
        }
    }

    /// True when every required field has text.
    pub fn is_complete(&self) -> bool {
        self.fields
            .iter()
            .all(|field| field.is_optional || !field.text.is_empty())
    }

    /// Field values keyed by name, as sent to the service.
    pub fn make_fields(&self) -> HashMap<String, String> {
        self.fields
            .iter()
            .map(|field| (field.name.clone(), field.text.clone()))
            .collect()
    }
}

/// Set of data types to aggregate on refresh, as bit flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefreshableItems(u32);

impl RefreshableItems {
    pub const CHECKING_ACCOUNTS: Self = Self(1 << 0);
    pub const CHECKING_TRANSACTIONS: Self = Self(1 << 1);
    pub const SAVING_ACCOUNTS: Self = Self(1 << 2);
    pub const SAVING_TRANSACTIONS: Self = Self(1 << 3);
    pub const CREDIT_CARD_ACCOUNTS: Self = Self(1 << 4);
    pub const CREDIT_CARD_TRANSACTIONS: Self = Self(1 << 5);
    pub const LOAN_ACCOUNTS: Self = Self(1 << 6);
    pub const LOAN_TRANSACTIONS: Self = Self(1 << 7);
    pub const INVESTMENT_ACCOUNTS: Self = Self(1 << 8);
    pub const INVESTMENT_TRANSACTIONS: Self = Self(1 << 9);
    pub const E_INVOICES: Self = Self(1 << 10);
    pub const TRANSFER_DESTINATIONS: Self = Self(1 << 11);
    pub const ALL: Self = Self((1 << 12) - 1);
    pub const EMPTY: Self = Self(0);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Keep only the items the provider can deliver.
    pub fn supporting(self, capabilities: Self) -> Self {
        Self(self.0 & capabilities.0)
    }
}

impl Default for RefreshableItems {
    fn default() -> Self {
        Self::ALL
    }
}

/// A financial institution credentials can be added for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: ProviderId,
    pub display_name: String,
    pub credentials_kind: CredentialsKind,
    #[serde(default)]
    pub fields: Vec<FieldSpecification>,
    /// Data the provider can aggregate.
    #[serde(default)]
    pub capabilities: RefreshableItems,
}
