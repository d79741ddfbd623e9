use crate::state::store::CartState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

const CURRENT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("recovery log database error: {0}")]
    Database(String),

    #[error("snapshot serialization error: {0}")]
    Serialization(String),

    #[error("unsupported snapshot version {0}")]
    InvalidVersion(u32),
}

pub type Result<T> = std::result::Result<T, RecoveryError>;

/// The atomic unit of recovery: every partition's resume token plus the full
/// keyed state image, as they stood at one epoch boundary. Immutable once
/// committed; a restart only ever sees fully committed snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub epoch: u64,
    pub created_at: DateTime<Utc>,
    pub partition_tokens: HashMap<String, u64>,
    pub state_image: HashMap<String, CartState>,
}

impl Snapshot {
    pub fn new(
        epoch: u64,
        partition_tokens: HashMap<String, u64>,
        state_image: HashMap<String, CartState>,
    ) -> Self {
        Self {
            version: CURRENT_VERSION,
            epoch,
            created_at: Utc::now(),
            partition_tokens,
            state_image,
        }
    }
}

/// Durable storage for committed snapshots.
///
/// `save_snapshot` must be atomic: either the whole snapshot (all tokens and
/// the full state image) becomes the latest committed one, or nothing
/// changes. Any store with atomic multi-key commit qualifies.
#[async_trait]
pub trait RecoveryLog: Send + Sync {
    async fn init_schema(&self) -> Result<()>;
    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()>;
    async fn load_latest_snapshot(&self) -> Result<Option<Snapshot>>;
    /// Drop committed snapshots older than `epoch`. Retention is advisory;
    /// the latest committed snapshot is never pruned.
    async fn prune_before(&self, epoch: u64) -> Result<usize>;
}

/// Drives snapshot persistence for the engine: owns the recovery log handle
/// and decides when an epoch boundary should commit.
///
/// A zero interval (the default) commits after every batch of progress.
pub struct CheckpointManager {
    log: std::sync::Arc<dyn RecoveryLog>,
    interval: Duration,
    retain: u64,
    last_save: Instant,
}

impl CheckpointManager {
    pub fn new(log: std::sync::Arc<dyn RecoveryLog>, interval: Duration, retain: u64) -> Self {
        Self {
            log,
            interval,
            retain,
            last_save: Instant::now(),
        }
    }

    /// Load the latest committed snapshot, failing on a version the running
    /// binary does not understand. Guessing a resume point is never safe.
    pub async fn load(&self) -> Result<Option<Snapshot>> {
        tracing::info!("Loading latest snapshot from recovery log");

        let snapshot_opt = self.log.load_latest_snapshot().await?;

        match snapshot_opt {
            Some(snapshot) if snapshot.version != CURRENT_VERSION => {
                Err(RecoveryError::InvalidVersion(snapshot.version))
            }
            Some(snapshot) => {
                tracing::info!(
                    epoch = snapshot.epoch,
                    partitions = snapshot.partition_tokens.len(),
                    keys = snapshot.state_image.len(),
                    "Loaded committed snapshot"
                );
                Ok(Some(snapshot))
            }
            None => {
                tracing::info!("No committed snapshot found, cold start");
                Ok(None)
            }
        }
    }

    /// Commit a snapshot, then prune anything older than the retention
    /// window. Pruning failures are logged but never fail the commit.
    pub async fn commit(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.log.save_snapshot(snapshot).await?;
        self.last_save = Instant::now();
        tracing::debug!(epoch = snapshot.epoch, "Snapshot committed");

        if snapshot.epoch > self.retain {
            let cutoff = snapshot.epoch - self.retain;
            match self.log.prune_before(cutoff).await {
                Ok(0) => {}
                Ok(pruned) => tracing::debug!(pruned, cutoff, "Pruned old snapshots"),
                Err(e) => tracing::warn!(error = %e, "Failed to prune old snapshots"),
            }
        }

        Ok(())
    }

    pub fn should_save(&self) -> bool {
        self.last_save.elapsed() >= self.interval
    }

    pub fn reset_timer(&mut self) {
        self.last_save = Instant::now();
    }
}
