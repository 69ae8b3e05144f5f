//! qms-upload - file upload sidecar
//!
//! Stores files attached to quality records (certificates, scans, signed
//! forms) and serves them back by stored filename.

use anyhow::{Context, Result};
use clap::Parser;
use qms_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use qms_upload::{build_router, AppState, UploadDir};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

const SERVICE_NAME: &str = "qms-upload";
const DEFAULT_PORT: u16 = 5730;

/// Command-line arguments for qms-upload
#[derive(Parser, Debug)]
#[command(name = "qms-upload")]
#[command(about = "File upload sidecar for the station quality system")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "QMS_UPLOAD_PORT")]
    port: Option<u16>,

    /// Root folder; uploads go to its `uploads` subdirectory
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Largest accepted file in bytes
    #[arg(long, env = "QMS_MAX_FILE_SIZE")]
    max_file_size: Option<u64>,

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
        "Starting QMS Upload Sidecar (qms-upload) v{} [{}] built {} ({})",
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
    let upload_dir = initializer
        .upload_dir(&toml.upload)
        .context("Failed to create upload directory")?;
    info!("Upload directory: {}", upload_dir.display());

    let max_file_size = args.max_file_size.unwrap_or(toml.upload.max_file_size);
    info!("Maximum upload size: {} bytes", max_file_size);

    let app = build_router(AppState::new(UploadDir::new(upload_dir), max_file_size));

    let port = args.port.or(toml.port).unwrap_or(DEFAULT_PORT);
    let addr: SocketAddr = format!("{}:{}", args.bind, port)
        .parse()
        .context("Invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("qms-upload listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
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
