// Draftpool server entry point.
//
// Startup sequence:
// 1. Load config (copying defaults on first run)
// 2. Initialize tracing (log to file)
// 3. Open database
// 4. Wire engine, pool watch and cross-team query
// 5. Spawn profile sync loop
// 6. Spawn WebSocket server task
// 7. Wait for Ctrl+C, then shut down

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use draftpool_core::db::Database;
use draftpool_core::profile_sync::ProfileSync;
use draftpool_server::config::{self, Config};
use draftpool_server::handler::Services;
use draftpool_server::ws_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = config::load_config().context("failed to load configuration")?;

    // 2. Initialize tracing
    init_tracing(&config)?;
    info!("Draftpool starting up");

    // 3. Open database
    let db = Arc::new(Database::open(&config.database.path).context("failed to open database")?);
    info!("Database opened at {}", config.database.path);

    // 4. Wire services
    let services = Arc::new(Services::new(
        Arc::clone(&db),
        &config.allocation.system_operator_id,
    ));

    // 5. Profile sync loop
    let sync = Arc::new(ProfileSync::new(
        db.clone(),
        db.clone(),
        config.profile_sync.batch_size,
    ));
    let sync_every = Duration::from_secs(config.profile_sync.interval_secs);
    let sync_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(sync_every);
        loop {
            interval.tick().await;
            let sync = Arc::clone(&sync);
            match tokio::task::spawn_blocking(move || sync.sync_pending()).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!("Profile sync failed, will retry: {e}"),
                Err(e) => error!("Profile sync task panicked: {e}"),
            }
        }
    });

    // 6. WebSocket server
    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind WebSocket server on {addr}"))?;
    let ws_handle = tokio::spawn(async move {
        if let Err(e) = ws_server::run(listener, services).await {
            error!("WebSocket server error: {e}");
        }
    });
    info!("Draftpool ready on ws://{addr}");

    // 7. Wait for shutdown
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    ws_handle.abort();
    sync_handle.abort();

    info!("Draftpool shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to `logs/draftpool.log`. `RUST_LOG` overrides
/// the configured filter.
fn init_tracing(config: &Config) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("draftpool.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
