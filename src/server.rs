use std::future::Future;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::api::{self, SharedState};
use crate::config::ServerSection;

/// Build the full application router.
pub fn build_router(state: SharedState) -> Router {
    api::api_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind the configured address and serve until `shutdown` resolves.
pub async fn start_server<F>(config: &ServerSection, state: SharedState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    serve_on(listener, state, shutdown).await
}

/// Serve on an already-bound listener.
pub async fn serve_on<F>(listener: TcpListener, state: SharedState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, "pagesmith listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl-C handler; serving until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
