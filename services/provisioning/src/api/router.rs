use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use super::handlers;
use super::ApiState;

pub fn create_router(state: Arc<ApiState>) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            state.config.request_timeout_secs,
        )));

    Router::new()
        .route(
            "/v1/quotas/:project_id",
            get(handlers::get_project_quotas).put(handlers::set_project_quotas),
        )
        .route(
            "/v1/quotas/:project_id/defaults",
            get(handlers::get_quota_defaults),
        )
        .route(
            "/v1/quota-classes/default",
            put(handlers::set_default_quota_class),
        )
        .route(
            "/v1/projects/:project_id/domains",
            get(handlers::list_domains).post(handlers::create_domain),
        )
        .route(
            "/v1/domains/:uuid",
            get(handlers::get_domain)
                .put(handlers::update_domain)
                .delete(handlers::delete_domain),
        )
        .route(
            "/v1/projects/:project_id/subscribers",
            get(handlers::list_subscribers).post(handlers::create_subscriber),
        )
        .route(
            "/v1/subscribers/:uuid",
            get(handlers::get_subscriber)
                .put(handlers::update_subscriber)
                .delete(handlers::delete_subscriber),
        )
        .route("/health", get(handlers::health_check))
        .with_state(state)
        .layer(middleware)
}
