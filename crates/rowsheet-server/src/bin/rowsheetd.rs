//! rowsheet server daemon.
//!
//! ```bash
//! # Google backend; visit /login first to authorize
//! rowsheetd --credentials credentials.json
//!
//! # In-process backend persisted to a snapshot file
//! rowsheetd --backend memory --snapshot rows.json --port 9000
//!
//! # Use configuration file
//! rowsheetd --config rowsheet.yaml
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rowsheet_server::{AppState, BackendKind, ServerConfig, router};

#[derive(Parser, Debug)]
#[command(
    name = "rowsheetd",
    version,
    about = "Serve spreadsheet sheets as row-level CRUD resources"
)]
struct Args {
    /// Host address to bind to
    #[arg(short = 'H', long, env = "ROWSHEET_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short = 'p', long, env = "PORT")]
    port: Option<u16>,

    /// Configuration file path (YAML)
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Document engine
    #[arg(long, value_enum, env = "ROWSHEET_BACKEND")]
    backend: Option<BackendKind>,

    /// OAuth client credentials file
    #[arg(long, value_name = "FILE", env = "ROWSHEET_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Where the OAuth token is kept
    #[arg(long, value_name = "FILE", env = "ROWSHEET_TOKEN")]
    token: Option<PathBuf>,

    /// Snapshot file for the memory backend
    #[arg(long, value_name = "FILE", env = "ROWSHEET_SNAPSHOT")]
    snapshot: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'd', long)]
    debug: bool,

    /// Log level (error, warn, info, debug, trace); defaults to `debug`
    /// with `--debug` and `info` otherwise
    #[arg(long, env = "ROWSHEET_LOG_LEVEL")]
    log_level: Option<String>,

    /// Print configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_logging(&args, &config);

    if args.print_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    run_server(config).await
}

fn init_logging(args: &Args, config: &ServerConfig) {
    let level = log_level(args.log_level.as_deref(), config.debug);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            EnvFilter::try_new(format!(
                "rowsheet_server={level},rowsheet_core={level},rowsheet_gateway={level}"
            ))
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// An explicit level wins over `--debug`.
fn log_level(explicit: Option<&str>, debug: bool) -> &str {
    match explicit {
        Some(level) => level,
        None if debug => "debug",
        None => "info",
    }
}

fn load_config(args: &Args) -> Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path).context("Failed to load config file")?,
        None => ServerConfig::default(),
    };

    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if let Some(path) = &args.credentials {
        config.credentials_path = path.clone();
    }
    if let Some(path) = &args.token {
        config.token_path = path.clone();
    }
    if let Some(path) = &args.snapshot {
        config.snapshot_path = Some(path.clone());
    }
    if args.debug {
        config.debug = true;
    }

    Ok(config)
}

async fn run_server(config: ServerConfig) -> Result<()> {
    match config.backend {
        BackendKind::Google => {
            info!(
                credentials = %config.credentials_path.display(),
                "Using the Google Sheets backend"
            );
            if !config.token_path.exists() {
                warn!(
                    token = %config.token_path.display(),
                    "No OAuth token yet; visit /login to authorize"
                );
            }
        }
        BackendKind::Memory => match &config.snapshot_path {
            Some(path) => info!(snapshot = %path.display(), "Using the memory backend"),
            None => info!("Using the memory backend (data will not be persisted)"),
        },
    }

    let state = AppState::from_config(&config).context("Failed to open the document store")?;
    let app = router(state);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_log_level_beats_debug() {
        assert_eq!(log_level(Some("trace"), true), "trace");
        assert_eq!(log_level(None, true), "debug");
        assert_eq!(log_level(None, false), "info");
    }

    #[test]
    fn flags_override_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rowsheet.yaml");
        std::fs::write(&path, "port: 9000\nbackend: memory\nhost: 127.0.0.1\n").unwrap();
        let args = Args::parse_from([
            "rowsheetd",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "9100",
            "--debug",
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.backend, BackendKind::Memory);
        assert!(config.debug);
    }
}
