//! # groupsnap-server
//!
//! Group photo session server.
//!
//! This binary provides:
//! - **Session coordination** (recruiting, readiness, countdown) over a REST
//!   API (axum)
//! - **Contribution uploads** stored on local disk
//! - **A composition worker** that lays every member's photo into the
//!   session's collage template once all uploads are in
//! - **Upload status** by polling or pushed over a WebSocket

mod api;
mod config;
mod coordinator;
mod error;
mod status;
mod upload_store;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use groupsnap_shared::constants::APP_NAME;
use groupsnap_shared::template::TemplateCatalog;
use groupsnap_store::Database;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::coordinator::SessionCoordinator;
use crate::status::StatusReporter;
use crate::upload_store::UploadStore;
use crate::worker::CompositionWorker;

/// How long in-flight work may take to wind down after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,groupsnap_server=debug")),
        )
        .init();

    info!("Starting {} server v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = Database::open_at(&config.database_path)
        .with_context(|| format!("opening database {}", config.database_path.display()))?;
    let db = Arc::new(Mutex::new(db));

    let catalog = TemplateCatalog::load(&config.templates_path)
        .with_context(|| format!("loading templates from {}", config.templates_path.display()))?;
    if catalog.is_empty() {
        warn!("Template catalog is empty, every collage will use a generated grid");
    }
    info!(templates = catalog.len(), "Template catalog loaded");
    let catalog = Arc::new(catalog);

    let uploads = Arc::new(
        UploadStore::new(config.upload_storage_path.clone(), config.max_upload_size).await?,
    );

    let coordinator = Arc::new(SessionCoordinator::new(
        db.clone(),
        catalog.clone(),
        uploads.clone(),
        config.countdown,
    ));

    let cancel_token = CancellationToken::new();
    setup_shutdown_signal(cancel_token.clone());

    let app_state = AppState {
        coordinator,
        status: StatusReporter::new(db.clone()),
        catalog: catalog.clone(),
        uploads: uploads.clone(),
        config: Arc::new(config.clone()),
        shutdown: cancel_token.clone(),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn the composition worker
    // -----------------------------------------------------------------------
    let worker = CompositionWorker::new(
        db,
        catalog,
        uploads,
        config.worker_poll_interval,
        config.jpeg_quality,
    );
    let worker_task = tokio::spawn(worker.run(cancel_token.clone()));

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    let served = api::serve(app_state, config.http_addr, cancel_token.clone()).await;
    if let Err(e) = &served {
        error!(error = %e, "HTTP server failed");
        cancel_token.cancel();
    }

    info!("Waiting for the composition worker to finish");
    if tokio::time::timeout(SHUTDOWN_GRACE, worker_task).await.is_err() {
        warn!("Composition worker did not stop in time");
    }

    info!("{} server shutdown complete", APP_NAME);
    served
}

/// Cancel `cancel_token` on Ctrl+C or SIGTERM.
fn setup_shutdown_signal(cancel_token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
            _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
        }

        cancel_token.cancel();
    });
}
