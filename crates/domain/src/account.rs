//! Authorization records resolved from credentials.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use paygate_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

/// Gateway account identifier a credential belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(NonEmptyString);

impl AccountId {
    /// Creates a validated account identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        NonEmptyString::new(value).map(Self)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for AccountId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Payment type a credential was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPaymentType {
    /// Card payments.
    Card,
    /// Direct debit payments.
    DirectDebit,
}

impl TokenPaymentType {
    /// Returns the wire string for this payment type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::DirectDebit => "direct_debit",
        }
    }
}

impl FromStr for TokenPaymentType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "card" => Ok(Self::Card),
            "direct_debit" => Ok(Self::DirectDebit),
            _ => Err(AppError::Validation(format!(
                "unknown token payment type '{value}'"
            ))),
        }
    }
}

/// Validated account and tenant classification for one credential.
///
/// Records are immutable. An expired record is replaced by a fresh lookup,
/// never refreshed in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRecord {
    account_id: AccountId,
    token_payment_type: TokenPaymentType,
    service_name: Option<String>,
}

impl AuthorizationRecord {
    /// Creates an authorization record.
    #[must_use]
    pub fn new(
        account_id: AccountId,
        token_payment_type: TokenPaymentType,
        service_name: Option<String>,
    ) -> Self {
        Self {
            account_id,
            token_payment_type,
            service_name,
        }
    }

    /// Returns the account the credential belongs to.
    #[must_use]
    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    /// Returns the payment type classification.
    #[must_use]
    pub fn token_payment_type(&self) -> TokenPaymentType {
        self.token_payment_type
    }

    /// Returns the service name registered for the account, if any.
    #[must_use]
    pub fn service_name(&self) -> Option<&str> {
        self.service_name.as_deref()
    }
}

/// Answer of the authentication upstream for one credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialLookup {
    /// The credential is valid for the enclosed account.
    Valid(AuthorizationRecord),
    /// The credential is unknown, revoked or expired. Terminal.
    Invalid,
}
