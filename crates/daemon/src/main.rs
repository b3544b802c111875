use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use signoff_daemon::{
    collab::VisaHistoryStore,
    config::{DaemonConfig, HistoryBackend, ServersFile},
    db::{Db, SurrealVisaHistory},
    history::InMemoryVisaHistory,
    http, remote,
    service::SignOffService,
};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "signoff-daemon", version, about = "CI sign-off service")]
struct Cli {
    /// Where the HTTP API will listen, e.g. 127.0.0.1:8080
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// TOML file describing the CI, source and tracker servers.
    #[arg(long, default_value = "config/signoff.toml")]
    config: PathBuf,

    /// Visa history backend.
    #[arg(long, value_enum, default_value_t = HistoryBackend::Memory)]
    history: HistoryBackend,

    /// SurrealKV directory, used with `--history surreal`.
    #[arg(long, default_value = ".signoff/db")]
    db_dir: PathBuf,

    /// Interval between polls of observed builds.
    #[arg(long, default_value_t = 60)]
    poll_interval_secs: u64,

    /// Log level (env-filter syntax).
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&cli.log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = DaemonConfig {
        listen: cli.listen,
        servers_file: cli.config,
        history: cli.history,
        db_dir: cli.db_dir,
        poll_interval: Duration::from_secs(cli.poll_interval_secs.max(1)),
    };
    info!(?config, "starting daemon");

    let servers = ServersFile::load_from(&config.servers_file)?;
    let registry = remote::build_registry(&servers)?;
    info!(servers = ?registry.server_ids(), "servers loaded");

    let history: Arc<dyn VisaHistoryStore> = match config.history {
        HistoryBackend::Memory => Arc::new(InMemoryVisaHistory::new()),
        HistoryBackend::Surreal => {
            tokio::fs::create_dir_all(&config.db_dir).await?;
            let db = Db::connect(&config.db_dir).await?;
            db.apply_schema().await?;
            Arc::new(SurrealVisaHistory::new(db))
        }
    };

    let svc = Arc::new(SignOffService::new(
        Arc::new(registry),
        history,
        config.poll_interval,
    ));
    let app = http::router(svc);

    info!(listen = %config.listen, "listening");
    axum::serve(tokio::net::TcpListener::bind(config.listen).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown requested");
}
