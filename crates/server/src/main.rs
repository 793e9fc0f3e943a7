use std::future::IntoFuture;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use docvault_server::api::AppState;
use docvault_server::config::DocvaultConfig;
use docvault_server::store_factory;

/// docvault HTTP server.
#[derive(Parser, Debug)]
#[command(name = "docvault-server", about = "HTTP server for the docvault document library")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "docvault.toml")]
    config: String,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the tables of the configured database backends, then exit.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration from TOML file, or use defaults if the file does not exist.
    let config_exists = Path::new(&cli.config).exists();
    let config: DocvaultConfig = if config_exists {
        let contents = std::fs::read_to_string(&cli.config)?;
        toml::from_str(&contents)?
    } else {
        toml::from_str("")?
    };

    docvault_server::telemetry::init(&config.logging);

    if !config_exists {
        info!(path = %cli.config, "config file not found, using defaults");
    }

    if let Some(Commands::Migrate) = cli.command {
        return run_migrate(&config).await;
    }

    let identity = store_factory::create_identity_resolver(&config.auth)?;
    let library = store_factory::build_library(&config).await?;
    info!(
        max_file_size = library.policy().max_file_size,
        allowed_types = library.policy().allowed_mime_types.len(),
        families = config.families.len(),
        "document library ready"
    );

    let state = AppState {
        library: Arc::new(library),
        identity,
    };
    let app = docvault_server::api::router(state);

    // Resolve the bind address (CLI overrides take precedence).
    let host = cli.host.unwrap_or(config.server.host);
    let port = cli.port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "docvault-server listening");

    // In-flight requests get `shutdown_timeout_seconds` to finish once a
    // signal arrives.
    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = stop_tx.send(true);
        })
        .into_future();

    let timeout_secs = config.server.shutdown_timeout_seconds;
    let deadline = async move {
        if stop_rx.wait_for(|stopping| *stopping).await.is_ok() {
            tokio::time::sleep(Duration::from_secs(timeout_secs)).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server => result?,
        () = deadline => {
            warn!(timeout_secs, "shutdown timeout exceeded, dropping in-flight requests");
        }
    }

    info!("docvault-server shut down");
    Ok(())
}

/// Run the `migrate` subcommand: initialize database schemas for configured backends and exit.
async fn run_migrate(config: &DocvaultConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(backend = %config.blob.backend, "running blob store migrations...");
    let _blobs = store_factory::create_blob_store(&config.blob).await?;
    info!(backend = %config.blob.backend, "blob store migrations complete");

    info!(backend = %config.metadata.backend, "running metadata store migrations...");
    let _documents = store_factory::create_document_store(&config.metadata).await?;
    info!(backend = %config.metadata.backend, "metadata store migrations complete");

    info!("all migrations complete");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
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
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
