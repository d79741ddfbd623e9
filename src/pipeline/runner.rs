use crate::recovery::snapshot::{CheckpointManager, RecoveryError, Snapshot};
use crate::sink::{OutputSink, SinkError};
use crate::source::partition::{PartitionSet, SourceError};
use crate::source::reader::{PartitionReader, ReaderError};
use crate::state::operator::{JoinOperator, OperatorError};
use crate::state::store::StateStore;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("reader error: {0}")]
    Reader(#[from] ReaderError),

    #[error("operator error: {0}")]
    Operator(#[from] OperatorError),

    #[error("recovery error: {0}")]
    Recovery(#[from] RecoveryError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Drives the whole run: advances partitions round-robin, routes each event
/// through the join operator to the sink, and commits a snapshot of every
/// partition token plus the full state image at each epoch boundary.
///
/// A single driver task is the reference scheduling model: same-key operator
/// calls are serialized structurally, and the gap between batches is the
/// global barrier, so a snapshot can never capture state whose originating
/// token it missed (or the reverse).
pub struct JoinEngine {
    readers: Vec<PartitionReader>,
    store: StateStore,
    epoch: u64,
    checkpoints: CheckpointManager,
    sink: Arc<dyn OutputSink>,
    batch_size: usize,
}

impl JoinEngine {
    /// Build the engine from the latest committed snapshot, or cold-start if
    /// the recovery log is empty.
    ///
    /// Every partition token in the snapshot must name a partition in the
    /// current set; a topology mismatch refuses to start rather than guess.
    /// A partition with no stored token (none committed yet) opens from the
    /// beginning.
    pub async fn start(
        partitions: &PartitionSet,
        checkpoints: CheckpointManager,
        sink: Arc<dyn OutputSink>,
        batch_size: usize,
    ) -> Result<Self, EngineError> {
        let snapshot = checkpoints.load().await?;

        let (epoch, tokens, store) = match snapshot {
            Some(snapshot) => {
                for partition_id in snapshot.partition_tokens.keys() {
                    if !partitions.contains(partition_id) {
                        return Err(SourceError::UnknownPartition(partition_id.clone()).into());
                    }
                }
                info!(
                    epoch = snapshot.epoch,
                    keys = snapshot.state_image.len(),
                    "Warm start from committed snapshot"
                );
                (
                    snapshot.epoch,
                    snapshot.partition_tokens,
                    StateStore::from_image(snapshot.state_image),
                )
            }
            None => {
                info!("Cold start: no committed snapshot");
                (0, HashMap::new(), StateStore::new())
            }
        };

        let mut readers = Vec::with_capacity(partitions.len());
        for partition_id in partitions.partition_ids() {
            let token = tokens.get(&partition_id).copied();
            readers.push(partitions.build_reader(&partition_id, token)?);
        }

        Ok(Self {
            readers,
            store,
            epoch,
            checkpoints,
            sink,
            batch_size,
        })
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// All partitions fully consumed.
    pub fn is_finished(&self) -> bool {
        self.readers.iter().all(|r| r.is_exhausted())
    }

    /// Advance every partition by up to `batch_size` events, folding each
    /// event into the store and emitting the post-update view. Returns the
    /// number of events processed.
    pub async fn process_batch(&mut self) -> Result<usize, EngineError> {
        let mut processed = 0;

        for reader in &mut self.readers {
            for _ in 0..self.batch_size {
                match reader.next_event()? {
                    Some(event) => {
                        let record = JoinOperator::apply(&mut self.store, &event)?;
                        self.sink.emit(&record).await?;
                        processed += 1;
                    }
                    None => break,
                }
            }
        }

        Ok(processed)
    }

    /// Epoch boundary: collect every partition's token and the full state
    /// image, commit them as one snapshot, and only then bump the epoch.
    /// A failed commit leaves the previous snapshot as the resume point.
    pub async fn checkpoint(&mut self) -> Result<(), EngineError> {
        let tokens: HashMap<String, u64> = self
            .readers
            .iter()
            .map(|r| (r.partition_id().to_string(), r.resume_token()))
            .collect();

        let snapshot = Snapshot::new(self.epoch + 1, tokens, self.store.image());
        self.checkpoints.commit(&snapshot).await?;
        self.epoch += 1;

        debug!(epoch = self.epoch, "Epoch boundary committed");
        Ok(())
    }

    /// Consume all partitions to completion, checkpointing per the interval
    /// policy and once more at the end so a finished run restarts as a no-op.
    pub async fn run(&mut self) -> Result<(), EngineError> {
        info!(
            partitions = self.readers.len(),
            epoch = self.epoch,
            "Join engine running"
        );

        while !self.is_finished() {
            let processed = self.process_batch().await?;
            if processed > 0 && self.checkpoints.should_save() {
                self.checkpoint().await?;
            }
        }

        // Terminal snapshot captures the end-of-partition tokens.
        self.checkpoint().await?;

        info!(
            epoch = self.epoch,
            keys = self.store.len(),
            "Join engine finished"
        );
        Ok(())
    }
}
