//! Recovery and bootstrap binary for the Holon operating model.
//!
//! Brings every derived layer back in step with the event log: the
//! projection is replayed from scratch, the graph is rebuilt from it, and
//! the cache namespace is flushed. Safe to run at any time; the event log
//! is only read.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `holon-config.yaml` (or `HOLON_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Open the event store and cache, replay, and build the graph
//! 4. Force a full rebuild and cache flush (Ctrl-C stops it at the next
//!    entity)
//! 5. Log the result

mod error;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use holon_core::HolonConfig;
use holon_core::bootstrap::builder_from_config;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "holon-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, the event store, or the rebuild
/// fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let (config, config_path) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config)?;
    info!(
        path = %config_path.display(),
        store = config.store.backend.as_str(),
        cache_enabled = config.cache.enabled,
        namespace = config.cache.namespace,
        "Configuration loaded"
    );

    // 3. Open backends, replay, build the graph.
    let interrupt = Arc::new(AtomicBool::new(false));
    let requested = Arc::new(AtomicBool::new(false));
    spawn_interrupt_handler(Arc::clone(&interrupt), Arc::clone(&requested));
    let model = builder_from_config(&config)
        .await
        .map_err(EngineError::from)?
        .interrupt_on(interrupt)
        .build()
        .await
        .map_err(EngineError::from)?;
    let started_degraded = model.is_degraded();

    // 4. Forced rebuild and cache flush.
    if requested.load(Ordering::Acquire) {
        info!(started_degraded, "Interrupted before recovery, exiting");
        return Ok(());
    }
    let summary = model.recover().await.map_err(EngineError::from)?;

    // 5. Result.
    info!(
        started_degraded,
        nodes = summary.nodes,
        edges = summary.edges,
        skipped_edges = summary.skipped_edges,
        "Recovery complete"
    );
    Ok(())
}

/// On Ctrl-C, set `flag` so a running rebuild stops cleanly, and
/// `requested` so no new one starts.
fn spawn_interrupt_handler(flag: Arc<AtomicBool>, requested: Arc<AtomicBool>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("Interrupt received, stopping graph rebuild");
                requested.store(true, Ordering::Release);
                flag.store(true, Ordering::Release);
            }
            Err(e) => tracing::warn!(error = %e, "Could not install Ctrl-C handler"),
        }
    });
}

/// Load configuration from `HOLON_CONFIG`, or `holon-config.yaml` in the
/// working directory. A missing file means defaults.
fn load_config() -> Result<(HolonConfig, PathBuf), EngineError> {
    let path = std::env::var("HOLON_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = if path.exists() {
        HolonConfig::from_file(&path)?
    } else {
        // Defaults still honour the connection environment variables.
        HolonConfig::parse("{}")?
    };
    Ok((config, path))
}

/// Install the tracing subscriber. `RUST_LOG` wins over the configured
/// level.
fn init_logging(config: &HolonConfig) -> Result<(), EngineError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = if config.logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| EngineError::Logging {
        message: e.to_string(),
    })
}
