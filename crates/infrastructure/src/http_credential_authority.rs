//! HTTP client for the upstream authentication service.

use std::str::FromStr;

use async_trait::async_trait;
use paygate_application::CredentialAuthority;
use paygate_core::{AppError, AppResult};
use paygate_domain::{
    AccountId, AuthorizationRecord, Credential, CredentialLookup, TokenPaymentType,
};
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

const AUTH_PATH: &str = "v1/api/auth";

/// HTTP adapter for the upstream authentication service.
///
/// Sends the credential as a bearer token and maps the answer onto
/// [`CredentialLookup`]. Only a definitive rejection yields
/// [`CredentialLookup::Invalid`]; every other failure is
/// [`AppError::Unavailable`].
pub struct HttpCredentialAuthority {
    http_client: reqwest::Client,
    auth_endpoint: Url,
}

impl HttpCredentialAuthority {
    /// Creates a new authority client rooted at `base_url`.
    pub fn new(http_client: reqwest::Client, base_url: &Url) -> AppResult<Self> {
        let mut base_url = base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let auth_endpoint = base_url.join(AUTH_PATH).map_err(|error| {
            AppError::Validation(format!("invalid auth service url '{base_url}': {error}"))
        })?;

        Ok(Self {
            http_client,
            auth_endpoint,
        })
    }

    /// Returns the resolved authentication endpoint.
    #[must_use]
    pub fn auth_endpoint(&self) -> &Url {
        &self.auth_endpoint
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireAccountId {
    Text(String),
    Number(u64),
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    account_id: WireAccountId,
    token_type: String,
    #[serde(default)]
    service_name: Option<String>,
}

impl AuthResponse {
    fn into_record(self) -> AppResult<AuthorizationRecord> {
        let account_id = match self.account_id {
            WireAccountId::Text(value) => AccountId::new(value),
            WireAccountId::Number(value) => AccountId::new(value.to_string()),
        }
        .map_err(|error| {
            AppError::Unavailable(format!("auth service returned an unusable account id: {error}"))
        })?;
        let token_payment_type = TokenPaymentType::from_str(&self.token_type).map_err(|error| {
            AppError::Unavailable(format!("auth service returned an unusable token type: {error}"))
        })?;
        let service_name = self
            .service_name
            .filter(|service_name| !service_name.trim().is_empty());

        Ok(AuthorizationRecord::new(
            account_id,
            token_payment_type,
            service_name,
        ))
    }
}

enum StatusClass {
    Accepted,
    Rejected,
    Failed,
}

fn classify_status(status: StatusCode) -> StatusClass {
    if status.is_success() {
        return StatusClass::Accepted;
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
            StatusClass::Rejected
        }
        _ => StatusClass::Failed,
    }
}

fn decode_record(body: &[u8]) -> AppResult<AuthorizationRecord> {
    serde_json::from_slice::<AuthResponse>(body)
        .map_err(|error| {
            AppError::Unavailable(format!("failed to decode auth service response: {error}"))
        })?
        .into_record()
}

#[async_trait]
impl CredentialAuthority for HttpCredentialAuthority {
    async fn lookup(&self, credential: &Credential) -> AppResult<CredentialLookup> {
        let response = self
            .http_client
            .get(self.auth_endpoint.clone())
            .bearer_auth(credential.expose())
            .send()
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("auth service transport error: {error}"))
            })?;

        let status = response.status();
        match classify_status(status) {
            StatusClass::Rejected => Ok(CredentialLookup::Invalid),
            StatusClass::Failed => Err(AppError::Unavailable(format!(
                "auth service returned status {status}"
            ))),
            StatusClass::Accepted => {
                let body = response.bytes().await.map_err(|error| {
                    AppError::Unavailable(format!("failed to read auth service response: {error}"))
                })?;
                decode_record(&body).map(CredentialLookup::Valid)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use paygate_core::AppError;
    use paygate_domain::TokenPaymentType;
    use reqwest::StatusCode;
    use url::Url;

    use super::{HttpCredentialAuthority, StatusClass, classify_status, decode_record};

    #[test]
    fn endpoint_is_joined_below_the_base_path() {
        let base = Url::parse("http://auth.internal:9000/publicauth")
            .unwrap_or_else(|_| panic!("test"));
        let authority = HttpCredentialAuthority::new(reqwest::Client::new(), &base)
            .unwrap_or_else(|_| panic!("test"));

        assert_eq!(
            authority.auth_endpoint().as_str(),
            "http://auth.internal:9000/publicauth/v1/api/auth"
        );
    }

    #[test]
    fn only_definitive_rejections_mean_invalid() {
        assert!(matches!(classify_status(StatusCode::OK), StatusClass::Accepted));
        for status in [
            StatusCode::UNAUTHORIZED,
            StatusCode::FORBIDDEN,
            StatusCode::NOT_FOUND,
        ] {
            assert!(matches!(classify_status(status), StatusClass::Rejected));
        }
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::BAD_REQUEST,
        ] {
            assert!(matches!(classify_status(status), StatusClass::Failed));
        }
    }

    #[test]
    fn decodes_numeric_and_textual_account_ids() {
        let numeric = serde_json::json!({
            "account_id": 1234,
            "token_type": "CARD",
            "service_name": "Example Service"
        });
        let record = decode_record(numeric.to_string().as_bytes())
            .unwrap_or_else(|_| panic!("test"));
        assert_eq!(record.account_id().as_str(), "1234");
        assert_eq!(record.token_payment_type(), TokenPaymentType::Card);
        assert_eq!(record.service_name(), Some("Example Service"));

        let textual = serde_json::json!({
            "account_id": "acct-9",
            "token_type": "DIRECT_DEBIT"
        });
        let record = decode_record(textual.to_string().as_bytes())
            .unwrap_or_else(|_| panic!("test"));
        assert_eq!(record.account_id().as_str(), "acct-9");
        assert_eq!(record.token_payment_type(), TokenPaymentType::DirectDebit);
        assert_eq!(record.service_name(), None);
    }

    #[test]
    fn malformed_success_body_is_an_outage() {
        let missing_account = serde_json::json!({ "token_type": "CARD" });
        let unknown_type = serde_json::json!({ "account_id": "a", "token_type": "CHEQUE" });

        assert!(matches!(
            decode_record(missing_account.to_string().as_bytes()),
            Err(AppError::Unavailable(_))
        ));
        assert!(matches!(
            decode_record(unknown_type.to_string().as_bytes()),
            Err(AppError::Unavailable(_))
        ));
        assert!(matches!(
            decode_record(b"not json"),
            Err(AppError::Unavailable(_))
        ));
    }
}
