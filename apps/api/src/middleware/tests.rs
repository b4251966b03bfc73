use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use tower::ServiceExt;

use paygate_application::{
    AdmissionService, CredentialAuthority, CredentialCache, RateLimitPolicy, RateLimitRule,
    RateLimitService,
};
use paygate_core::{AppError, AppResult, ManualClock};
use paygate_domain::{
    AccountId, AuthorizationRecord, Credential, CredentialLookup, OperationClass,
    TokenPaymentType,
};
use paygate_infrastructure::InMemoryRateLimitRepository;

use crate::api_router::build_router;
use crate::state::AppState;

use super::operation_class_for;

struct FakeAuthority {
    down: bool,
    calls: AtomicUsize,
}

impl FakeAuthority {
    fn new(down: bool) -> Self {
        Self {
            down,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CredentialAuthority for FakeAuthority {
    async fn lookup(&self, credential: &Credential) -> AppResult<CredentialLookup> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down {
            return Err(AppError::Unavailable("auth service returned 502".to_owned()));
        }

        if credential.expose() == "token-a" {
            return Ok(CredentialLookup::Valid(AuthorizationRecord::new(
                AccountId::new("acct-a")?,
                TokenPaymentType::Card,
                Some("Demo Service".to_owned()),
            )));
        }

        Ok(CredentialLookup::Invalid)
    }
}

fn app(authority: Arc<FakeAuthority>) -> Router {
    let start = Utc
        .timestamp_millis_opt(1_700_000_000_250)
        .single()
        .unwrap_or_else(|| panic!("test"));
    let clock = Arc::new(ManualClock::new(start));

    let credential_cache = CredentialCache::new(
        authority,
        clock.clone(),
        Duration::from_secs(300),
        Duration::from_secs(1),
    )
    .unwrap_or_else(|_| panic!("test"));
    let local_rate_limit_repository = Arc::new(InMemoryRateLimitRepository::new(clock.clone()));
    let policy = RateLimitPolicy::default().with_rule(
        RateLimitRule::new(OperationClass::Create, 1, Duration::from_secs(1))
            .unwrap_or_else(|_| panic!("test")),
    );
    let rate_limit_service =
        RateLimitService::local_only(local_rate_limit_repository.clone(), policy, clock.clone());

    build_router(AppState {
        admission_service: AdmissionService::new(credential_cache, rate_limit_service, clock),
        local_rate_limit_repository,
        redis_repository: None,
        redis_timeout: Duration::from_millis(250),
    })
}

fn request(method: Method, uri: &str, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(authorization) = authorization {
        builder = builder.header(header::AUTHORIZATION, authorization);
    }
    builder.body(Body::empty()).unwrap_or_else(|_| panic!("test"))
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone()
        .oneshot(request)
        .await
        .unwrap_or_else(|_| panic!("test"))
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap_or_else(|_| panic!("test"));
    serde_json::from_slice(&bytes).unwrap_or_else(|_| panic!("test"))
}

#[tokio::test]
async fn missing_credential_is_declined_with_401() {
    let authority = Arc::new(FakeAuthority::new(false));
    let app = app(authority.clone());

    let response = send(&app, request(Method::GET, "/v1/payments/pay-1", None)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["code"], "P0110");
    assert_eq!(authority.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_credential_is_declined_with_401() {
    let app = app(Arc::new(FakeAuthority::new(false)));

    let response = send(
        &app,
        request(Method::GET, "/v1/payments/pay-1", Some("Bearer token-x")),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn auth_outage_is_declined_with_503() {
    let app = app(Arc::new(FakeAuthority::new(true)));

    let response = send(
        &app,
        request(Method::GET, "/v1/payments", Some("Bearer token-a")),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["code"], "P0920");
}

#[tokio::test]
async fn admitted_request_reaches_the_handler_with_its_authorization() {
    let authority = Arc::new(FakeAuthority::new(false));
    let app = app(authority.clone());

    let first = send(
        &app,
        request(Method::GET, "/v1/payments/pay-1/refunds", Some("Bearer token-a")),
    )
    .await;
    let second = send(
        &app,
        request(Method::GET, "/v1/payments/pay-1", Some("bearer token-a")),
    )
    .await;

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    let body = json_body(first).await;
    assert_eq!(body["account_id"], "acct-a");
    assert_eq!(body["token_type"], "card");
    assert_eq!(body["service_name"], "Demo Service");
    assert_eq!(authority.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exhausted_budget_is_declined_with_429_and_retry_after() {
    let app = app(Arc::new(FakeAuthority::new(false)));

    let first = send(
        &app,
        request(Method::POST, "/v1/payments", Some("Bearer token-a")),
    )
    .await;
    let second = send(
        &app,
        request(Method::POST, "/v1/agreements", Some("Bearer token-a")),
    )
    .await;
    let read = send(
        &app,
        request(Method::GET, "/v1/payments/pay-1", Some("Bearer token-a")),
    )
    .await;

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        second
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok()),
        Some("1")
    );
    assert_eq!(json_body(second).await["code"], "P0900");
    assert_eq!(read.status(), StatusCode::OK);
}

#[tokio::test]
async fn healthcheck_is_not_admission_controlled() {
    let authority = Arc::new(FakeAuthority::new(false));
    let app = app(authority.clone());

    let response = send(&app, request(Method::GET, "/healthcheck", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["redis"]["status"], "disabled");
    assert_eq!(body["rate_limiter"], "local_only");
    assert_eq!(authority.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn routes_map_to_operation_classes() {
    let cases = [
        (Method::POST, "/v1/payments", OperationClass::Create),
        (Method::GET, "/v1/payments", OperationClass::Search),
        (Method::GET, "/v1/payments/pay-1", OperationClass::Read),
        (Method::GET, "/v1/payments/pay-1/events", OperationClass::Read),
        (Method::POST, "/v1/payments/pay-1/cancel", OperationClass::Cancel),
        (Method::POST, "/v1/payments/pay-1/capture", OperationClass::Capture),
        (Method::POST, "/v1/payments/pay-1/refunds", OperationClass::Refund),
        (Method::GET, "/v1/payments/pay-1/refunds", OperationClass::Read),
        (Method::GET, "/v1/refunds", OperationClass::Search),
        (Method::POST, "/v1/agreements", OperationClass::Create),
        (Method::GET, "/v1/agreements/", OperationClass::Search),
        (Method::POST, "/v1/agreements/agr-1/cancel", OperationClass::Cancel),
        (Method::PATCH, "/v1/payments/pay-1", OperationClass::Create),
    ];

    for (method, path, expected) in cases {
        assert_eq!(
            operation_class_for(&method, path),
            expected,
            "{method} {path}"
        );
    }
}
