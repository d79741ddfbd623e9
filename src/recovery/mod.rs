pub mod duckdb;
pub mod snapshot;

pub use duckdb::DuckDbRecoveryLog;
pub use snapshot::{CheckpointManager, RecoveryError, RecoveryLog, Snapshot};
