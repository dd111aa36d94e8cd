//! watchkeeper - self-healing infrastructure watchdog
//!
//! # Usage
//!
//! ```bash
//! # Run forever with ./watchkeeper.toml (or built-in defaults)
//! watchkeeper
//!
//! # One cycle, print the status report as JSON
//! watchkeeper --once
//!
//! # Serve GET /status while running
//! watchkeeper --status-addr 127.0.0.1:9100
//!
//! # What would a disk cleanup remove?
//! watchkeeper cleanup --dry-run
//! ```
//!
//! # Environment Variables
//!
//! - `WATCHKEEPER_CONFIG`: Path to the TOML config file
//! - `TELEGRAM_BOT_TOKEN`: Alert channel token (name configurable)
//! - `TIMEWEB_TOKEN`, `OPENAI_API_KEY`: Billing credentials
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use watchkeeper::api::create_app;
use watchkeeper::remediation::run_cleanup;
use watchkeeper::storage::{InMemoryStore, ProcessLock, SledStore, StateStore};
use watchkeeper::{SharedStatus, Watchdog, WatchdogConfig, WatchdogParts};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "watchkeeper")]
#[command(about = "Self-healing infrastructure watchdog")]
#[command(version)]
struct CliArgs {
    /// Config file (overrides $WATCHKEEPER_CONFIG and ./watchkeeper.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Run every check once, print the status report as JSON and exit
    #[arg(long)]
    once: bool,

    /// Serve GET /status and /health on this address (overrides server.addr)
    #[arg(long, value_name = "HOST:PORT")]
    status_addr: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "WATCHKEEPER_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Run the disk cleanup rules now and print what was freed
    Cleanup {
        /// Report totals without deleting anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Probe everything once and send the status digest to the alert channel
    Report,

    /// Load and validate the config, then print the effective TOML
    CheckConfig,
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    Watchdog,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::Watchdog => write!(f, "Watchdog"),
        }
    }
}

// ============================================================================
// Setup
// ============================================================================

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

/// `--config` is strict; otherwise the standard search order applies.
fn load_config(explicit: Option<&Path>) -> Result<WatchdogConfig> {
    match explicit {
        Some(path) => WatchdogConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(WatchdogConfig::load()),
    }
}

/// Open the configured state store. A durable store is guarded by a process lock.
fn open_store(config: &WatchdogConfig) -> Result<(Arc<dyn StateStore>, Option<ProcessLock>)> {
    let Some(path) = &config.storage.path else {
        info!("State store: in-memory (history resets on restart)");
        return Ok((Arc::new(InMemoryStore::new()), None));
    };

    let state_dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let lock = ProcessLock::acquire(state_dir).context("Failed to acquire process lock")?;

    let store = SledStore::open(path)
        .with_context(|| format!("Failed to open state store at {}", path.display()))?;
    info!(path = %path.display(), "State store: sled");
    Ok((Arc::new(store), Some(lock)))
}

/// Flush buffered history before the process exits.
fn flush_store(store: &dyn StateStore) {
    match store.flush() {
        Ok(()) => info!(backend = store.backend_name(), "State store flushed"),
        Err(e) => warn!(error = %e, "State store flush failed, recent history may be lost"),
    }
}

fn build_watchdog(config: WatchdogConfig, store: Arc<dyn StateStore>) -> Result<Watchdog> {
    let parts = WatchdogParts::from_config(&config, store).context("Failed to build check adapters")?;
    Ok(Watchdog::new(config, parts))
}

// ============================================================================
// Tasks
// ============================================================================

/// Spawn the status HTTP server task into the JoinSet.
async fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    addr: &str,
    status: SharedStatus,
    cancel_token: CancellationToken,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!("🌐 Status endpoint listening on http://{}/status", addr);

    let app = create_app(status);
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
    Ok(())
}

fn spawn_watchdog(
    task_set: &mut JoinSet<Result<TaskName>>,
    mut watchdog: Watchdog,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[Watchdog] Task starting");
        watchdog.run(cancel_token).await;
        let stats = watchdog.stats();
        info!(
            checks = stats.total_checks,
            alerts = stats.alerts_sent,
            restarts = stats.restarts_attempted,
            "[Watchdog] Loop stopped"
        );
        Ok(TaskName::Watchdog)
    });
}

/// Run the supervisor loop: monitor tasks, cancel on failure.
///
/// Tasks observe the cancel token themselves, so on shutdown this waits for
/// the watchdog to finish its current tick.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("🔒 Supervisor: All tasks spawned, monitoring...");

    while let Some(result) = task_set.join_next().await {
        match result {
            Ok(Ok(task_name)) => {
                info!("🔒 Supervisor: Task {} completed normally", task_name);
                // Either task ending means the process has nothing left to do
                cancel_token.cancel();
            }
            Ok(Err(e)) => {
                error!("🔒 Supervisor: Task failed with error: {}", e);
                cancel_token.cancel();
                return Err(e);
            }
            Err(e) => {
                error!("🔒 Supervisor: Task panicked: {}", e);
                cancel_token.cancel();
                return Err(anyhow::anyhow!("Task panicked: {}", e));
            }
        }
    }

    info!("🔒 Supervisor: All tasks completed");
    Ok(())
}

async fn run_forever(config: WatchdogConfig, status_addr: Option<String>) -> Result<()> {
    let (store, _process_lock) = open_store(&config)?;
    let watchdog = build_watchdog(config, Arc::clone(&store))?;

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("🛑 Shutdown signal received, finishing current tick...");
        shutdown_token.cancel();
    });

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    if let Some(addr) = status_addr {
        spawn_http_server(&mut task_set, &addr, watchdog.status_handle(), cancel_token.clone()).await?;
    }
    spawn_watchdog(&mut task_set, watchdog, cancel_token.clone());

    let result = run_supervisor(&mut task_set, cancel_token).await;
    flush_store(store.as_ref());
    result
}

/// Ctrl-C, or SIGTERM from the service manager.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = CliArgs::parse();
    init_tracing(args.log_json);

    match args.command {
        Some(SubCommand::CheckConfig) => {
            let path = args.config.clone().or_else(WatchdogConfig::search_path);
            let config = match &path {
                Some(p) => load_config(Some(p))?,
                None => {
                    info!("No config file found, showing built-in defaults");
                    WatchdogConfig::default()
                }
            };
            println!("{}", config.to_toml().context("Failed to render config")?);
            return Ok(());
        }
        Some(SubCommand::Cleanup { dry_run }) => {
            let config = load_config(args.config.as_deref())?;
            let report = tokio::task::spawn_blocking(move || run_cleanup(&config.cleanup, dry_run))
                .await
                .context("Cleanup task failed")?;
            for d in &report.details {
                println!("{:<10} {:>6} items {:>12} bytes  {}", format!("{:?}", d.rule), d.items, d.bytes, d.path.display());
            }
            println!(
                "{} {} items, {:.2} MB",
                if dry_run { "Would free" } else { "Freed" },
                report.items_deleted,
                report.mb_freed()
            );
            return Ok(());
        }
        Some(SubCommand::Report) => {
            let config = load_config(args.config.as_deref())?;
            let (store, _process_lock) = open_store(&config)?;
            let mut watchdog = build_watchdog(config, Arc::clone(&store))?;
            let sent = watchdog.send_report().await;
            flush_store(store.as_ref());
            sent.context("Failed to send status report")?;
            info!("Status report sent");
            return Ok(());
        }
        None => {}
    }

    let config = load_config(args.config.as_deref())?;

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  watchkeeper v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "  {} services | {} endpoints | tick {}s",
        config.services.units.len(),
        config.health.endpoints.len(),
        config.intervals.tick_secs
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if args.once {
        let (store, _process_lock) = open_store(&config)?;
        let mut watchdog = build_watchdog(config, Arc::clone(&store))?;
        let report = watchdog.run_once().await;
        flush_store(store.as_ref());
        println!("{}", serde_json::to_string_pretty(&report).context("Failed to serialize status report")?);
        return Ok(());
    }

    let status_addr = args.status_addr.or_else(|| config.server.addr.clone());
    run_forever(config, status_addr).await?;

    info!("✓ watchkeeper shutdown complete");
    Ok(())
}
