use crate::config::parse::load_config;
use crate::pipeline::runner::JoinEngine;
use crate::recovery::duckdb::DuckDbRecoveryLog;
use crate::recovery::snapshot::{CheckpointManager, RecoveryLog};
use crate::sink::StdoutSink;
use crate::source::partition::PartitionSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::parse::ConfigError),

    #[error("recovery error: {0}")]
    Recovery(#[from] crate::recovery::snapshot::RecoveryError),

    #[error("engine error: {0}")]
    Engine(#[from] crate::pipeline::runner::EngineError),
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match config_path {
        Some(path) => path,
        None => {
            eprintln!("Error: config not found");
            eprintln!("Searched locations:");
            eprintln!("  ~/.config/cartflow/config.yml");
            eprintln!("  /etc/cartflow/config.yml");
            eprintln!(
                "\nUse --config <path> to specify a config file, or run \
                 'cartflow config init' to generate one."
            );
            std::process::exit(1);
        }
    };

    run_join(&config_path).await.map_err(|e| e.into())
}

async fn run_join(config_path: &Path) -> Result<(), RunError> {
    info!(config_path = %config_path.display(), "Loading configuration");
    let config = load_config(config_path)?;

    info!(path = %config.recovery.path.display(), "Opening recovery log");
    let log = DuckDbRecoveryLog::open(&config.recovery.path)?;
    log.init_schema().await?;
    let checkpoints = CheckpointManager::new(
        Arc::new(log) as Arc<dyn RecoveryLog>,
        config.recovery.checkpoint_interval,
        config.recovery.retain,
    );

    let partitions = PartitionSet::new(config.partitions, config.corrupt_marker);
    info!(partitions = partitions.len(), "Partition set fixed for this run");

    let mut engine = JoinEngine::start(
        &partitions,
        checkpoints,
        Arc::new(StdoutSink),
        config.pipeline.batch_size,
    )
    .await?;

    info!("Pipeline started, press Ctrl+C to stop");

    tokio::select! {
        result = engine.run() => {
            result?;
            info!("All partitions consumed, run complete");
        }
        _ = signal::ctrl_c() => {
            warn!("Shutdown signal received; restart resumes from the last committed snapshot");
        }
    }

    Ok(())
}
