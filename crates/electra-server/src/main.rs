use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use electra_engine::NativeEngine;
use electra_server::{logging::init_logging, router, AppState, ElectraConfig};
use electra_store::{ensure_schema, GridRepository, MemoryRepository, PgRepository};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "electra", about = "Grid ingest and power flow service")]
struct Opt {
    /// Configuration file (defaults to ./electra.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Listen address, overrides `server.addr`
    #[arg(long)]
    addr: Option<SocketAddr>,
    /// Log level, overrides `logging.level`
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();
    let mut config =
        ElectraConfig::load(opt.config.as_deref()).context("failed to load configuration")?;
    if let Some(addr) = opt.addr {
        config.server.addr = addr;
    }
    if let Some(level) = opt.log_level {
        config.logging.level = level;
    }

    init_logging(&config.logging.level, config.logging.log_dir.as_deref())
        .context("failed to initialise logging")?;

    let repo: Arc<dyn GridRepository> = match config.database.url.as_deref() {
        Some(url) => {
            let repo = PgRepository::connect(
                url,
                config.database.max_connections,
                config.acquire_timeout(),
            )
            .await
            .context("failed to connect to database")?;
            ensure_schema(repo.pool())
                .await
                .context("failed to apply schema migrations")?;
            info!("database schema ready");
            Arc::new(repo)
        }
        None => {
            warn!("no database configured, grids are kept in memory");
            Arc::new(MemoryRepository::new())
        }
    };

    tokio::fs::create_dir_all(&config.storage.circuit_dir)
        .await
        .with_context(|| {
            format!(
                "failed to create circuit directory {}",
                config.storage.circuit_dir.display()
            )
        })?;

    let addr = config.server.addr;
    let app = router(AppState::new(repo, Arc::new(NativeEngine), config));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "electra listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
