use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use pdfmaster::{ArtifactStore, RandomIds, Rasterizer, TempDirSink};
use pdfmaster_api::{app, AppState, ServerConfig};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let sink = TempDirSink::new(config.temp_dir.as_deref())
        .context("failed to create artifact directory")?;
    info!("Staging artifacts in {}", sink.path().display());
    let store = ArtifactStore::new(Arc::new(sink), Arc::new(RandomIds));

    let rasterizer = rasterizer();
    info!(
        "Rasterizer: {} ({})",
        rasterizer.name(),
        if rasterizer.available() { "available" } else { "unavailable" }
    );

    let state = AppState::new(store)
        .with_rasterizer(rasterizer)
        .with_limits(config.limits());

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    info!("pdfmaster API listening on http://{}", config.bind);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

#[cfg(feature = "pdfium")]
fn rasterizer() -> Arc<dyn Rasterizer> {
    Arc::new(pdfmaster::PdfiumRasterizer::probe())
}

#[cfg(not(feature = "pdfium"))]
fn rasterizer() -> Arc<dyn Rasterizer> {
    Arc::new(pdfmaster::NoRasterizer)
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, starting graceful shutdown"),
    }
}
