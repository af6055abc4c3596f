//! Standalone artifact janitor.
//!
//! Prunes the capture and audio directories on the configured cadence.
//! `--once` runs a single sweep, `--emergency <keep>` keeps only the newest
//! files, `--stats` prints directory statistics as JSON.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{bail, Context};
use tokio::sync::watch;
use tracing::{info, warn};

use emocap_worker::{init_tracing, metrics, ArtifactGovernor, WorkerConfig};

enum Mode {
    Daemon,
    Once,
    Emergency(usize),
    Stats,
}

fn parse_mode() -> anyhow::Result<Mode> {
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None => Ok(Mode::Daemon),
        Some("--once") => Ok(Mode::Once),
        Some("--stats") => Ok(Mode::Stats),
        Some("--emergency") => {
            let keep = args
                .next()
                .context("--emergency needs a file count")?
                .parse()
                .context("--emergency count must be a number")?;
            Ok(Mode::Emergency(keep))
        }
        Some(other) => bail!("unknown argument {}", other),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(&["emocap=info"]);

    let mode = parse_mode()?;
    let config = WorkerConfig::from_env();
    let governor = Arc::new(ArtifactGovernor::from_config(&config));

    match mode {
        Mode::Once => {
            let reports = governor.sweep(SystemTime::now());
            println!("{}", serde_json::to_string_pretty(&reports)?);
            return Ok(());
        }
        Mode::Emergency(keep) => {
            let deleted = governor.emergency_prune(keep);
            info!(deleted = deleted, keep = keep, "Emergency prune finished");
            return Ok(());
        }
        Mode::Stats => {
            let stats = governor.directory_stats(SystemTime::now());
            println!("{}", serde_json::to_string_pretty(&stats)?);
            return Ok(());
        }
        Mode::Daemon => {}
    }

    if let Some(port) = std::env::var("METRICS_PORT").ok().and_then(|s| s.parse::<u16>().ok()) {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        metrics::install_exporter(addr)?;
        info!(%addr, "Metrics exporter listening");
    }

    info!(
        max_age_hours = config.artifact_max_age.as_secs() / 3600,
        max_files = config.artifact_max_files,
        interval_mins = config.artifact_sweep_interval.as_secs() / 60,
        "Starting emocap-janitor"
    );

    let (shutdown, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(Arc::clone(&governor).run(shutdown_rx));

    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal");
    let _ = shutdown.send(true);

    if tokio::time::timeout(config.shutdown_timeout, task).await.is_err() {
        warn!("Janitor did not stop in time");
    }

    let stats = governor.stats();
    info!(
        sweeps = stats.sweeps,
        bytes_freed = stats.bytes_freed,
        "Janitor shutdown complete"
    );
    Ok(())
}
