pub mod downloader;
pub mod notifier;
pub mod scheduler;
pub mod tracker;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;

use crate::daemon::downloader::{Downloader, ToolRunner, YtDlpRunner};
use crate::daemon::notifier::{DisabledNotifier, JellyfinNotifier, LibraryNotifier};
use crate::daemon::scheduler::{SystemClock, WatchScheduler};
use crate::daemon::tracker::JobTracker;
use crate::models::ServerConfig;
use crate::server::{self, AppState};
use crate::storage::JsonWatchStore;

const APP_DIR: &str = "media-archiver";

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load the ServerConfig. File resolution order:
///   1. `--config` CLI flag (passed as `config_path`)
///   2. `ARCHIVER_CONFIG` environment variable
///   3. Platform config dir (`dirs::config_dir()/media-archiver/config.json`)
///   4. `ServerConfig::default()`
///
/// Environment overrides are applied on top of whichever source won.
pub fn load_config(config_path: Option<&Path>) -> Result<ServerConfig> {
    let mut config = load_config_file(config_path)?;
    config.apply_env();
    Ok(config)
}

fn load_config_file(config_path: Option<&Path>) -> Result<ServerConfig> {
    // 1. Explicit config path
    if let Some(path) = config_path {
        if path.exists() {
            return read_config(path);
        }
        return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
    }

    // 2. ARCHIVER_CONFIG env var
    if let Ok(env_path) = std::env::var("ARCHIVER_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return read_config(&path);
        }
        tracing::warn!(
            "ARCHIVER_CONFIG points to a missing file: {}",
            path.display()
        );
    }

    // 3. Platform config dir
    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join(APP_DIR).join("config.json");
        if path.exists() {
            return read_config(&path);
        }
    }

    // 4. Defaults
    tracing::info!("No config file found, using defaults");
    Ok(ServerConfig::default())
}

fn read_config(path: &Path) -> Result<ServerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: ServerConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    tracing::info!("Loaded config from: {}", path.display());
    Ok(config)
}

/// Resolve the data directory: `ARCHIVER_DATA_DIR`, else the platform data dir.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(d) = std::env::var("ARCHIVER_DATA_DIR") {
        if !d.is_empty() {
            return PathBuf::from(d);
        }
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Watches file path, defaulting to `<data_dir>/watches.json`.
pub fn watches_file(config: &ServerConfig) -> PathBuf {
    config
        .watches_file
        .clone()
        .unwrap_or_else(|| resolve_data_dir().join("watches.json"))
}

/// Archive directory, defaulting to `<data_dir>/archives`.
pub fn archives_dir(config: &ServerConfig) -> PathBuf {
    config
        .archives_dir
        .clone()
        .unwrap_or_else(|| resolve_data_dir().join("archives"))
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Set up tracing: always stderr, plus a daily-rolling `archiver.log` under
/// `log_dir` when given. `RUST_LOG` overrides the default level.
///
/// The returned guard must live as long as file logging is wanted.
pub fn init_tracing(verbose: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_level.into());

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "archiver.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false);

            let result = tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .with(file_layer)
                .try_init();
            if result.is_ok() {
                tracing::info!("Logging to stderr and {}", dir.display());
            }
            Some(guard)
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .try_init();
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Service construction
// ---------------------------------------------------------------------------

/// Build the rescan notifier: Jellyfin when a URL is configured, otherwise a no-op.
pub fn build_notifier(config: &ServerConfig) -> Result<Arc<dyn LibraryNotifier>> {
    match config.media_server_url.as_deref() {
        Some(url) if !url.is_empty() => {
            let notifier = JellyfinNotifier::new(
                url,
                config.media_server_token.clone(),
                config.media_path.clone(),
                Duration::from_secs(config.notify_timeout_secs),
            )?;
            tracing::info!("Library rescans go to {}", url);
            Ok(Arc::new(notifier))
        }
        _ => {
            tracing::info!("No media server configured, library rescans disabled");
            Ok(Arc::new(DisabledNotifier))
        }
    }
}

/// Build the downloader around the configured tool binary.
pub fn build_downloader(config: &ServerConfig) -> Result<Downloader> {
    let runner: Arc<dyn ToolRunner> = Arc::new(YtDlpRunner::new(config.downloader_bin.clone()));
    Ok(Downloader::new(
        runner,
        build_notifier(config)?,
        archives_dir(config),
        config.media_path.clone(),
        config.downloader_config.clone(),
    ))
}

/// Assemble the shared state from a resolved config and a downloader.
pub fn build_state(config: ServerConfig, downloader: Downloader) -> Arc<AppState> {
    let store = Arc::new(JsonWatchStore::new(watches_file(&config)));
    Arc::new(AppState {
        store,
        tracker: Arc::new(JobTracker::new()),
        downloader: Arc::new(downloader),
        config: Arc::new(config),
        start_time: Instant::now(),
    })
}

/// The scheduler that shares `state`'s store and downloader.
pub fn build_scheduler(state: &AppState) -> WatchScheduler {
    WatchScheduler::new(
        Arc::clone(&state.store),
        Arc::clone(&state.downloader),
        Arc::new(SystemClock),
        Duration::from_secs(state.config.scheduler_interval_secs.max(1)),
    )
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

/// Run the web service and scheduler until Ctrl+C or SIGTERM.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let downloader = build_downloader(&config)?;
    let state = build_state(config, downloader);

    tokio::fs::create_dir_all(archives_dir(&state.config))
        .await
        .context("Failed to create archive directory")?;

    // Creates the file as `[]` when missing.
    let existing = state.store.load().await;
    tracing::info!(
        "Loaded {} watch(es) from {}",
        existing.len(),
        state.store.file_path().display()
    );

    let scheduler = build_scheduler(&state);
    let scheduler_handle = tokio::spawn(async move { scheduler.run().await });

    let router = server::create_router(Arc::clone(&state));
    let bind_addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    tracing::info!("Listening on http://{}", bind_addr);

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error");

    // Stop scheduling new watch runs
    scheduler_handle.abort();

    tracing::info!("Server exited cleanly.");
    served
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Received Ctrl+C signal");
                    }
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM signal");
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Received Ctrl+C signal");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received Ctrl+C signal");
    }
}
