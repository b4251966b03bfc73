use axum::{Extension, Json};
use paygate_domain::AuthorizationRecord;

use crate::dto::AuthorizationResponse;

/// Stand-in for the payment resource handlers behind the admission filter.
///
/// Answers with the authorization the filter attached, which is all a
/// resource handler needs to scope its work to the calling account.
pub async fn resource_handler(
    Extension(authorization): Extension<AuthorizationRecord>,
) -> Json<AuthorizationResponse> {
    Json(AuthorizationResponse {
        account_id: authorization.account_id().to_string(),
        token_type: authorization.token_payment_type().as_str(),
        service_name: authorization.service_name().map(str::to_owned),
    })
}
