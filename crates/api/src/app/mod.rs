//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: stores, cache, fanout and activation engine wiring
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use assistsync_infra::AppConfig;

use crate::{interceptor, middleware};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router from configuration (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> anyhow::Result<Router> {
    let services = Arc::new(services::build_services(config).await?);
    Ok(build_router(config.jwt_secret.clone(), services))
}

/// Build the router around already-constructed services.
///
/// Layer order (outermost first): auth (sets the tenant scope), service
/// extension, cache interceptor, handlers.
pub fn build_router(jwt_secret: String, services: Arc<services::AppServices>) -> Router {
    let jwt = Arc::new(assistsync_auth::Hs256JwtValidator::new(jwt_secret.into_bytes()));
    let auth_state = middleware::AuthState { jwt };

    // Protected routes: require auth + tenant context.
    let protected = routes::router()
        .layer(axum::middleware::from_fn_with_state(
            services.cache().clone(),
            interceptor::cache_interceptor,
        ))
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
