//! codoc Daemon (codocd)
//!
//! The relay server process for codoc - collaborative document
//! synchronization.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (WebSocket on 5000, in-memory store)
//! codocd
//!
//! # Custom bind/port
//! codocd --bind 127.0.0.1 --port 7000
//!
//! # With persistence
//! codocd --db /var/lib/codoc/documents.db
//!
//! # Restrict browser origins
//! codocd --allow-origin http://localhost:3000
//!
//! # With configuration file (flags and env override file values)
//! codocd --config /etc/codoc/codoc.toml
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use codoc_core::RoomRegistry;
use codoc_storage::{DocumentStore, MemoryStore, SqliteStore};
use codoc_transport::WebSocketServer;

/// codoc daemon - collaborative document relay
#[derive(Parser, Debug)]
#[command(name = "codocd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket port to listen on
    #[arg(long, env = "CODOC_PORT")]
    port: Option<u16>,

    /// Bind address
    #[arg(long, env = "CODOC_BIND")]
    bind: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "CODOC_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CODOC_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// SQLite database path for persistence (default: in-memory only)
    #[arg(long, env = "CODOC_DB")]
    db: Option<PathBuf>,

    /// Allowed browser origin; repeat for several (default: any)
    #[arg(long = "allow-origin", env = "CODOC_ALLOW_ORIGIN", value_delimiter = ',')]
    allow_origin: Vec<String>,

    /// Store lookup timeout in milliseconds
    #[arg(long, env = "CODOC_STORE_TIMEOUT_MS")]
    store_timeout_ms: Option<u64>,
}

/// File-based configuration; any CLI flag or env var overrides it.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    port: Option<u16>,
    bind: Option<String>,
    db: Option<PathBuf>,
    allow_origin: Vec<String>,
    store_timeout_ms: Option<u64>,
}

impl FileConfig {
    fn load(path: &PathBuf) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

/// Effective settings after merging file, env, and flags.
struct Settings {
    addr: SocketAddr,
    db: Option<PathBuf>,
    allow_origin: Vec<String>,
    store_timeout: Option<Duration>,
}

fn merge(args: Args, file: FileConfig) -> Result<Settings> {
    let bind = args
        .bind
        .or(file.bind)
        .unwrap_or_else(|| "0.0.0.0".to_string());
    let port = args.port.or(file.port).unwrap_or(5000);
    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", bind, port))?;

    let allow_origin = if args.allow_origin.is_empty() {
        file.allow_origin
    } else {
        args.allow_origin
    };

    Ok(Settings {
        addr,
        db: args.db.or(file.db),
        allow_origin,
        store_timeout: args
            .store_timeout_ms
            .or(file.store_timeout_ms)
            .map(Duration::from_millis),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    print_banner();

    let file = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration file");
            FileConfig::load(path)?
        }
        None => FileConfig::default(),
    };
    let settings = merge(args, file)?;

    // Shared room registry
    let registry = Arc::new(RoomRegistry::new());

    // Initialize SQLite storage if a path was provided
    let store: Arc<dyn DocumentStore> = match &settings.db {
        Some(db_path) => {
            info!(path = %db_path.display(), "Initializing SQLite persistence");
            match SqliteStore::new(db_path) {
                Ok(store) => {
                    info!("SQLite persistence enabled");
                    Arc::new(store)
                }
                Err(e) => {
                    warn!(error = %e, "Failed to initialize SQLite, running in-memory only");
                    Arc::new(MemoryStore::new())
                }
            }
        }
        None => {
            info!("Running in-memory only (no --db specified)");
            Arc::new(MemoryStore::new())
        }
    };

    info!(
        addr = %settings.addr,
        origins = settings.allow_origin.len(),
        persistent = settings.db.is_some(),
        "Starting codoc daemon"
    );

    let mut server = WebSocketServer::new(registry, store, settings.addr);
    if !settings.allow_origin.is_empty() {
        server = server.with_allowed_origins(settings.allow_origin.clone());
    }
    if let Some(timeout) = settings.store_timeout {
        server = server.with_store_timeout(timeout);
    }

    let handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!(error = %e, "Relay server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    handle.abort();

    Ok(())
}

fn print_banner() {
    println!(
        r#"
  codoc - collaborative document relay
  Version {}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
