use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use smsfeed_server::shutdown::wait_for_signal;
use smsfeed_server::ServerConfig;
use smsfeed_settings::load_settings;
use smsfeed_store::{Database, MessageRepo, SqliteMessageStore};
use smsfeed_telemetry::{init_telemetry, TelemetryConfig};

/// Live SMS feed: authenticated ingest, WebSocket fan-out, short retention.
#[derive(Debug, Parser)]
#[command(name = "smsfeed", version)]
struct Cli {
    /// JSON settings file. Missing file means defaults.
    #[arg(long, default_value = "smsfeed.json")]
    config: PathBuf,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// SQLite file path, overrides settings and DATABASE_URL.
    #[arg(long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = load_settings(Some(&cli.config))
        .with_context(|| format!("loading settings from {}", cli.config.display()))?;
    if let Some(host) = cli.host {
        settings.server.host = host;
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if let Some(database) = cli.database {
        settings.storage.database_path = database;
    }

    let telemetry = TelemetryConfig::from_names(&settings.logging.level, &settings.logging.format)
        .context("invalid logging settings")?;
    init_telemetry(&telemetry).context("failed to install tracing subscriber")?;

    let config = ServerConfig::from_settings(&settings)?;

    let db_path = &settings.storage.database_path;
    let db = Database::open(db_path)
        .with_context(|| format!("opening database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");
    let store = Arc::new(SqliteMessageStore::new(MessageRepo::new(db)));

    let handle = smsfeed_server::start(config, store)
        .await
        .context("failed to start server")?;
    tracing::info!(addr = %handle.local_addr(), "smsfeed ready");

    wait_for_signal().await;
    handle.shutdown(None).await;
    Ok(())
}
