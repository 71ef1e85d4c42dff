use axum::{routing::get, Router};

pub mod ai_config;
pub mod cache_admin;
pub mod channels;
pub mod conversations;
pub mod realtime;
pub mod system;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/conversations", conversations::router())
        .nest("/ai-config", ai_config::router())
        .nest("/channels", channels::router())
        .nest("/realtime", realtime::router())
        .nest("/cache", cache_admin::router())
}
