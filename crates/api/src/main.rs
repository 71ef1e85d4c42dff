use std::sync::Arc;

use assistsync_api::app::{build_router, services};
use assistsync_infra::AppConfig;
use assistsync_infra::activation::{PauseExpiryReconciler, ReconcilerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    assistsync_observability::init();

    let config = AppConfig::from_env()?;
    let services = Arc::new(services::build_services(&config).await?);

    let reconciler = PauseExpiryReconciler::new(services.engine().clone())
        .spawn(ReconcilerConfig::default().with_interval(config.reconciler_interval));

    let app = build_router(config.jwt_secret.clone(), services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reconciler.shutdown().await;
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
