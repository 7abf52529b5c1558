//! Execution service backed by local interpreter kernels.
//!
//! Run with: cargo run -p exec-server
//!
//! Then point remote clients at http://localhost:8000.
//! `CODECELL_BIND` overrides the listen address.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use codecell_core::{BackendKind, ExecConfig};
use codecell_kernel::LocalKernelFactory;
use codecell_session::SessionRegistry;
use codecell_transport::server::create_router;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const ENV_BIND: &str = "CODECELL_BIND";
const DEFAULT_BIND: &str = "127.0.0.1:8000";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    // this process hosts kernels; it never forwards
    let config = ExecConfig {
        backend: BackendKind::Local,
        ..ExecConfig::from_env()
    };
    tracing::info!(
        interpreter = %config.interpreter,
        read_timeout_secs = config.read_timeout_secs,
        "Using local kernels"
    );

    let registry = Arc::new(SessionRegistry::new(Arc::new(LocalKernelFactory::new(config))));
    let app = create_router(Arc::clone(&registry)).layer(CorsLayer::permissive());

    let addr: SocketAddr = std::env::var(ENV_BIND)
        .unwrap_or_else(|_| DEFAULT_BIND.to_string())
        .parse()
        .context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let released = registry.shutdown_all().await;
    tracing::info!(released, "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
