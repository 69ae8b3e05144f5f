//! qms-records - record store service
//!
//! Serves generic record CRUD for every module of the station's quality
//! system. The backend is the local JSON blob, the SQLite table store, or
//! (when a remote URL is configured) a remote store with local fallback.

use anyhow::{Context, Result};
use clap::Parser;
use qms_common::config::{RootFolderInitializer, RootFolderResolver, StoreBackend, TomlConfig};
use qms_common::store::{FallbackStore, LocalStore, RemoteStore, SharedStore, TableStore};
use qms_records::{build_router, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

const SERVICE_NAME: &str = "qms-records";
const DEFAULT_PORT: u16 = 5731;

/// Command-line arguments for qms-records
#[derive(Parser, Debug)]
#[command(name = "qms-records")]
#[command(about = "Record store service for the station quality system")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "QMS_RECORDS_PORT")]
    port: Option<u16>,

    /// Root folder holding the record blob and database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Storage backend: local or table
    #[arg(short, long, env = "QMS_STORE_BACKEND")]
    backend: Option<StoreBackend>,

    /// Remote record store URL; enables remote-first with local fallback
    #[arg(long, env = "QMS_REMOTE_URL")]
    remote_url: Option<String>,

    /// Explicit configuration file (skips the platform search)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter_handle = init_tracing();

    // Log build identification immediately after tracing init
    info!(
        "Starting QMS Record Store (qms-records) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let toml = match &args.config {
        Some(path) => TomlConfig::load_from_path(path)?,
        None => TomlConfig::load(SERVICE_NAME)?,
    };

    // RUST_LOG wins over the configured level
    if std::env::var_os("RUST_LOG").is_none() {
        filter_handle
            .modify(|filter| *filter = EnvFilter::new(&toml.logging.level))
            .context("Failed to apply configured log level")?;
    }

    let root_folder =
        RootFolderResolver::new(SERVICE_NAME).resolve(args.root_folder.as_deref(), &toml);
    let initializer = RootFolderInitializer::new(root_folder);
    initializer.ensure_directory_exists()?;
    info!("Root folder: {}", initializer.root().display());

    let store = open_store(&args, &toml, &initializer).await?;
    info!("Record store backend: {}", store.name());

    let app = build_router(AppState::new(store));

    let port = args.port.or(toml.port).unwrap_or(DEFAULT_PORT);
    let addr: SocketAddr = format!("{}:{}", args.bind, port)
        .parse()
        .context("Invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("qms-records listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Pick the backend: CLI/env beat the TOML `[store]` section
async fn open_store(
    args: &Args,
    toml: &TomlConfig,
    initializer: &RootFolderInitializer,
) -> Result<SharedStore> {
    let local: SharedStore = Arc::new(LocalStore::new(initializer.blob_path()));

    if let Some(url) = args.remote_url.as_ref().or(toml.store.remote_url.as_ref()) {
        info!("Remote store {} with local fallback", url);
        let remote: SharedStore = Arc::new(RemoteStore::new(url.as_str())?);
        return Ok(Arc::new(FallbackStore::new(remote, local)));
    }

    match args.backend.unwrap_or(toml.store.backend) {
        StoreBackend::Local => {
            info!("Record blob: {}", initializer.blob_path().display());
            Ok(local)
        }
        StoreBackend::Table => {
            let db_path = initializer.database_path();
            info!("Database path: {}", db_path.display());
            let pool = qms_common::db::init_database(&db_path)
                .await
                .context("Failed to open record database")?;
            Ok(Arc::new(TableStore::new(pool)))
        }
    }
}

/// Install the subscriber at `info` (or `RUST_LOG`) so configuration
/// loading is logged; the returned handle swaps in the configured level.
fn init_tracing() -> reload::Handle<EnvFilter, Registry> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
    handle
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
