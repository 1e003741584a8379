//! `openerpd`: the OpenERP manufacturing server binary.
//!
//! Usage:
//!   openerpd -c <context-name-or-path> [--listen <addr>] [--sqlite <path>]
//!
//! The context name resolves to `/etc/openerp/<name>.toml`.
//! If a path with `/` or `.` is given, it's used directly.

mod bootstrap;
mod config;
mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::ServerConfig;

const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

/// OpenERP server.
#[derive(Parser, Debug)]
#[command(name = "openerpd", about = "OpenERP manufacturing server")]
struct Cli {
    /// Context name or path to config file.
    #[arg(short = 'c', long = "config", required = true)]
    config: String,

    /// Listen address (overrides `server.listen`, default 0.0.0.0:8080).
    #[arg(long = "listen")]
    listen: Option<String>,

    /// SQLite database file (overrides `{data_dir}/data.sqlite`).
    #[arg(long = "sqlite")]
    sqlite: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load server configuration before logging so it can carry the filter.
    let config_path = ServerConfig::resolve_path(&cli.config);
    let server_config = ServerConfig::load(&config_path)?;

    // Initialize logging: RUST_LOG, else the config filter, else info.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        server_config
            .log
            .filter
            .as_deref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
    info!("Loaded configuration from {}", config_path.display());

    // Verify configuration is valid.
    bootstrap::verify_config(&server_config)?;

    // Initialize storage.
    let data_dir = PathBuf::from(&server_config.storage.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let core_config = openerp_core::ServiceConfig {
        data_dir: Some(data_dir),
        sqlite_path: cli
            .sqlite
            .or_else(|| server_config.storage.sqlite_path.as_ref().map(PathBuf::from)),
        listen: cli
            .listen
            .or_else(|| server_config.server.listen.clone())
            .unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
    };

    let sqlite_path = core_config.resolve_sqlite_path();
    let sql: Arc<dyn openerp_sql::SQLStore> = Arc::new(
        openerp_sql::SqliteStore::open(&sqlite_path)
            .map_err(|e| anyhow::anyhow!("failed to open SQL store: {}", e))?,
    );
    info!("SQL store opened at {}", sqlite_path.display());

    let mfg_module = mfg::MfgModule::new(Arc::clone(&sql))?;
    info!("Manufacturing module initialized");

    let app = routes::build_router(&[&mfg_module]);

    // Start server.
    let listener = tokio::net::TcpListener::bind(&core_config.listen).await?;
    info!("OpenERP server listening on {}", core_config.listen);
    axum::serve(listener, app).await?;

    Ok(())
}
