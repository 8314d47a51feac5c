//! HTTP transport.

mod routes;

pub use routes::{create_router, AppState};

use crate::runtime::Shutdown;

/// Serves `state` on `127.0.0.1:port` until `shutdown` fires.
pub async fn serve(state: AppState, port: u16, shutdown: Shutdown) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!(port, "Connector listening");
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            shutdown.triggered().await;
            tracing::info!("Shutting down HTTP transport");
        })
        .await
}
