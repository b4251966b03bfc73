use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::handlers::{health, resources};
use crate::middleware;
use crate::state::AppState;

pub fn build_router(app_state: AppState) -> Router {
    let admission_controlled_routes = Router::new()
        .route(
            "/v1/payments",
            get(resources::resource_handler).post(resources::resource_handler),
        )
        .route("/v1/payments/{payment_id}", get(resources::resource_handler))
        .route(
            "/v1/payments/{payment_id}/{*sub_resource}",
            get(resources::resource_handler).post(resources::resource_handler),
        )
        .route("/v1/refunds", get(resources::resource_handler))
        .route(
            "/v1/agreements",
            get(resources::resource_handler).post(resources::resource_handler),
        )
        .route(
            "/v1/agreements/{agreement_id}",
            get(resources::resource_handler),
        )
        .route(
            "/v1/agreements/{agreement_id}/cancel",
            post(resources::resource_handler),
        )
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::admission_filter,
        ));

    Router::new()
        .route("/healthcheck", get(health::health_handler))
        .merge(admission_controlled_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
