//! # Integration Point Runtime
//!
//! Entry point: load configuration, lock the data directory, then sweep the
//! inbound spool until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ip_runtime::{build_intake, sweep, DatabaseLock, RuntimeConfig};

const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = RuntimeConfig::from_env();
    if let Err(e) = config.validate_for_production() {
        warn!("{}", e);
    }

    let _lock = DatabaseLock::acquire(&config.storage.data_dir, LOCK_TIMEOUT)
        .context("locking data directory")?;
    let intake = Arc::new(build_intake(&config)?);

    info!(
        "Integration point running (data {}, spool {}, {} workers)",
        config.storage.data_dir.display(),
        config.spool.spool_dir.display(),
        config.spool.workers
    );

    if config.spool.poll_interval.is_zero() {
        sweep(intake, &config.spool).await?;
        return Ok(());
    }

    let mut ticker = tokio::time::interval(config.spool.poll_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = sweep(intake.clone(), &config.spool).await {
                    error!("Sweep failed: {:#}", e);
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Shutdown requested");
                break;
            }
        }
    }

    info!("Shutdown complete");
    Ok(())
}
