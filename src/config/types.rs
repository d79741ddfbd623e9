use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Partition id -> backing JSONL file. The set is fixed for the run.
    pub partitions: BTreeMap<String, PathBuf>,

    /// Lines starting with this marker are treated as corrupt and skipped.
    #[serde(default = "default_corrupt_marker")]
    pub corrupt_marker: String,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    pub recovery: RecoveryConfig,
}

fn default_corrupt_marker() -> String {
    "FAIL".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Max events pulled from each partition per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// DuckDB database file holding committed snapshots.
    pub path: PathBuf,

    /// Minimum time between snapshot commits; zero (the default) commits
    /// after every batch of progress.
    #[serde(default, with = "humantime_serde")]
    pub checkpoint_interval: Duration,

    /// How many epochs of committed snapshots to keep behind the latest.
    #[serde(default = "default_retain")]
    pub retain: u64,
}

fn default_retain() -> u64 {
    2
}
