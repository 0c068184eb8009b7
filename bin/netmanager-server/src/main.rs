//! netmanager-server – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables.
//! 2. Initialise structured tracing (JSON or pretty, optional rolling file).
//! 3. Open the SQLite database, run migrations, release stale claims.
//! 4. Start the command channel to the router and build the login pipeline.
//! 5. Start the failover monitor in a background task.
//! 6. Build the Axum router and serve with graceful shutdown.

mod config;
mod error;
mod middleware;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use netmanager_core::monitor::PROBE_TIMEOUT;
use netmanager_core::{
    CommandChannel, ConfigClient, CredentialSelector, FailoverMonitor, HttpProbe, LogHub,
    LoginPipeline, ProcessLoginRunner, SqliteStore, SshTransport, UciClient, WeightController,
};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use crate::config::Config;
use crate::state::AppState;

/// Depth of the command queue in front of the router connection.
const CHANNEL_QUEUE: usize = 32;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let _log_guard = init_tracing(&cfg);
    info!(version = env!("CARGO_PKG_VERSION"), "netmanager-server starting");

    // ── 3. Database ────────────────────────────────────────────────────────────
    let store = Arc::new(SqliteStore::connect(&cfg.database_url).await?);
    info!(database_url = %cfg.database_url, "database ready");

    let released = CredentialSelector::new(Arc::clone(&store)).release_stale_claims().await?;
    if released > 0 {
        warn!(released, "credentials left CONNECTING by a previous run moved to RETRYING");
    }

    // ── 4. Router channel + pipeline ───────────────────────────────────────────
    let target = cfg.ssh_target();
    info!(addr = %target.addr(), user = %target.user, "router command channel");
    let channel = CommandChannel::spawn(SshTransport::new(target)?, CHANNEL_QUEUE);
    let uci: Arc<dyn ConfigClient> = Arc::new(UciClient::new(channel));
    let hub = LogHub::new(cfg.log_buffer);
    let pipeline = Arc::new(LoginPipeline::new(
        Arc::clone(&store),
        Arc::new(ProcessLoginRunner::new(cfg.login_binary.clone())),
        WeightController::new(uci),
        hub.clone(),
        cfg.portal(),
    ));

    // ── 5. Failover monitor ────────────────────────────────────────────────────
    let (stop_tx, stop_rx) = watch::channel(false);
    let monitor = FailoverMonitor::new(
        cfg.monitor(),
        Arc::new(HttpProbe::new(PROBE_TIMEOUT)?),
        Arc::clone(&store),
        Arc::clone(&pipeline) as Arc<dyn netmanager_core::Trigger>,
        hub.clone(),
    );
    let monitor_task = tokio::spawn(monitor.run(stop_rx));

    // ── 6. HTTP server with graceful shutdown ──────────────────────────────────
    let state = Arc::new(AppState {
        config: Arc::new(cfg.clone()),
        store,
        pipeline,
        hub,
    });
    let app = routes::build(state);
    let addr: SocketAddr = cfg.bind_address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Abandons a failover in progress; a router command already dequeued still completes.
    if stop_tx.send(true).is_err() {
        warn!("failover monitor exited early");
    }
    if let Err(e) = monitor_task.await {
        warn!(error = %e, "failover monitor task failed");
    }

    info!("netmanager-server stopped");
    Ok(())
}

/// Install the global subscriber.  The returned guard flushes the log file
/// on drop and must live until shutdown.
fn init_tracing(cfg: &Config) -> Option<WorkerGuard> {
    // Build the log-level filter, warning loudly if the configured value is
    // not a valid tracing filter expression.
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: NM_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                EnvFilter::new("info")
            }
        },
    };

    let (file, guard) = match &cfg.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "netmanager.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true);

    match (file, cfg.log_json) {
        (Some(file), true) => subscriber.json().with_writer(std::io::stdout.and(file)).init(),
        (Some(file), false) => subscriber.with_writer(std::io::stdout.and(file)).init(),
        (None, true) => subscriber.json().init(),
        (None, false) => subscriber.init(),
    }
    guard
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
