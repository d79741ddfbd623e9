//! End-to-end recovery tests: crash/resume equivalence, skip-not-crash
//! across restarts, and snapshot commit atomicity.

use async_trait::async_trait;
use cartflow::pipeline::runner::JoinEngine;
use cartflow::recovery::duckdb::DuckDbRecoveryLog;
use cartflow::recovery::snapshot::{CheckpointManager, RecoveryError, RecoveryLog, Snapshot};
use cartflow::sink::MemorySink;
use cartflow::source::partition::PartitionSet;
use cartflow::state::store::CartState;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn event_line(user: &str, ty: &str, order: &str) -> String {
    format!(r#"{{"user_id": "{user}", "type": "{ty}", "order_id": "{order}"}}"#)
}

fn write_partition(dir: &TempDir, name: &str, lines: &[String]) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file.flush().unwrap();
    path
}

fn partition_set(entries: Vec<(&str, PathBuf)>) -> PartitionSet {
    let mut partitions = BTreeMap::new();
    for (id, path) in entries {
        partitions.insert(id.to_string(), path);
    }
    PartitionSet::new(partitions, "FAIL".to_string())
}

async fn shared_log() -> Arc<dyn RecoveryLog> {
    let log = DuckDbRecoveryLog::in_memory().unwrap();
    log.init_schema().await.unwrap();
    Arc::new(log) as Arc<dyn RecoveryLog>
}

fn manager(log: Arc<dyn RecoveryLog>) -> CheckpointManager {
    CheckpointManager::new(log, Duration::ZERO, 10)
}

fn sample_events() -> Vec<String> {
    vec![
        event_line("u1", "order", "o1"),
        event_line("u2", "order", "o2"),
        event_line("u1", "payment", "o1"),
        event_line("u3", "order", "o3"),
        event_line("u1", "order", "o4"),
        event_line("u2", "payment", "o2"),
        event_line("u3", "order", "o5"),
        event_line("u1", "payment", "o4"),
    ]
}

/// Property 1: crash after a committed epoch and resume, final state matches
/// an uninterrupted run key for key.
#[tokio::test]
async fn test_crash_and_resume_matches_uninterrupted_run() {
    let dir = TempDir::new().unwrap();
    let path = write_partition(&dir, "p0.json", &sample_events());
    let set = partition_set(vec![("p0", path)]);

    // Uninterrupted reference run.
    let reference_sink = Arc::new(MemorySink::new());
    let mut reference = JoinEngine::start(
        &set,
        manager(shared_log().await),
        reference_sink.clone(),
        100,
    )
    .await
    .unwrap();
    reference.run().await.unwrap();

    // Interrupted run: small batches, checkpoint each batch, stop partway.
    let log = shared_log().await;
    let first_sink = Arc::new(MemorySink::new());
    let mut first = JoinEngine::start(&set, manager(log.clone()), first_sink.clone(), 2)
        .await
        .unwrap();
    for _ in 0..2 {
        let processed = first.process_batch().await.unwrap();
        assert!(processed > 0);
        first.checkpoint().await.unwrap();
    }
    let committed_epoch = first.epoch();
    assert_eq!(committed_epoch, 2);
    // Simulated crash: drop the engine without finishing.
    drop(first);

    // Resume from the recovery log and finish.
    let resumed_sink = Arc::new(MemorySink::new());
    let mut resumed = JoinEngine::start(&set, manager(log), resumed_sink.clone(), 2)
        .await
        .unwrap();
    assert_eq!(resumed.epoch(), committed_epoch);
    resumed.run().await.unwrap();

    // Final keyed state matches the uninterrupted run exactly.
    for user in ["u1", "u2", "u3"] {
        assert_eq!(
            resumed.store().get(user),
            reference.store().get(user),
            "state mismatch for {user}"
        );
    }

    // No event was lost or double-applied across the restart.
    let total_emitted = first_sink.records().len() + resumed_sink.records().len();
    assert_eq!(total_emitted, reference_sink.records().len());
}

/// Property 3: a marked-corrupt line never reaches the output, and a restart
/// neither reprocesses it nor skips valid lines after it.
#[tokio::test]
async fn test_corrupt_line_skipped_across_restart() {
    let dir = TempDir::new().unwrap();
    let path = write_partition(
        &dir,
        "p0.json",
        &[
            event_line("u1", "order", "o1"),
            "FAIL mid-stream corruption".to_string(),
            event_line("u1", "payment", "o1"),
            event_line("u1", "order", "o2"),
        ],
    );
    let set = partition_set(vec![("p0", path)]);

    let log = shared_log().await;

    // Process one batch (covering the corrupt line) and commit.
    let first_sink = Arc::new(MemorySink::new());
    let mut first = JoinEngine::start(&set, manager(log.clone()), first_sink.clone(), 2)
        .await
        .unwrap();
    first.process_batch().await.unwrap();
    first.checkpoint().await.unwrap();
    drop(first);

    assert_eq!(first_sink.records().len(), 2);

    // The restart sees only the remaining valid line.
    let resumed_sink = Arc::new(MemorySink::new());
    let mut resumed = JoinEngine::start(&set, manager(log), resumed_sink.clone(), 100)
        .await
        .unwrap();
    resumed.run().await.unwrap();

    let records = resumed_sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].unpaid_order_ids, vec!["o2"]);
    assert_eq!(records[0].paid_order_ids, vec!["o1"]);
}

/// Recovery log wrapper that fails every commit once armed.
struct FailingRecoveryLog {
    inner: Arc<dyn RecoveryLog>,
    fail_saves: AtomicBool,
}

impl FailingRecoveryLog {
    fn new(inner: Arc<dyn RecoveryLog>) -> Self {
        Self {
            inner,
            fail_saves: AtomicBool::new(false),
        }
    }

    fn arm(&self) {
        self.fail_saves.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecoveryLog for FailingRecoveryLog {
    async fn init_schema(&self) -> Result<(), RecoveryError> {
        self.inner.init_schema().await
    }

    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), RecoveryError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(RecoveryError::Database("injected commit failure".into()));
        }
        self.inner.save_snapshot(snapshot).await
    }

    async fn load_latest_snapshot(&self) -> Result<Option<Snapshot>, RecoveryError> {
        self.inner.load_latest_snapshot().await
    }

    async fn prune_before(&self, epoch: u64) -> Result<usize, RecoveryError> {
        self.inner.prune_before(epoch).await
    }
}

/// Property 4: a failed commit must leave the previous snapshot as the
/// latest, with tokens and state image still mutually consistent.
#[tokio::test]
async fn test_failed_commit_preserves_previous_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = write_partition(&dir, "p0.json", &sample_events());
    let set = partition_set(vec![("p0", path)]);

    let inner = shared_log().await;
    let failing = Arc::new(FailingRecoveryLog::new(inner.clone()));

    let sink = Arc::new(MemorySink::new());
    let mut engine = JoinEngine::start(
        &set,
        CheckpointManager::new(failing.clone(), Duration::ZERO, 10),
        sink,
        2,
    )
    .await
    .unwrap();

    engine.process_batch().await.unwrap();
    engine.checkpoint().await.unwrap();
    let good_epoch = engine.epoch();

    // Next boundary fails mid-run; the epoch must not advance.
    failing.arm();
    engine.process_batch().await.unwrap();
    assert!(engine.checkpoint().await.is_err());
    assert_eq!(engine.epoch(), good_epoch);
    drop(engine);

    // The restart sees the last good snapshot: its tokens and image were
    // written as one unit, so neither can be ahead of the other.
    let latest = inner.load_latest_snapshot().await.unwrap().unwrap();
    assert_eq!(latest.epoch, good_epoch);

    let resumed = JoinEngine::start(
        &set,
        CheckpointManager::new(inner, Duration::ZERO, 10),
        Arc::new(MemorySink::new()),
        2,
    )
    .await
    .unwrap();
    assert_eq!(resumed.epoch(), good_epoch);
    // State image corresponds to exactly the first two events.
    assert_eq!(
        resumed.store().get("u1"),
        Some(&CartState {
            unpaid_order_ids: vec!["o1".to_string()],
            paid_order_ids: vec![],
        })
    );
}

/// Resuming is at-least-once: events after the last commit are re-applied on
/// restart, and re-applying them in order reconverges to the same state.
#[tokio::test]
async fn test_uncommitted_tail_replays_without_state_divergence() {
    let dir = TempDir::new().unwrap();
    let path = write_partition(&dir, "p0.json", &sample_events());
    let set = partition_set(vec![("p0", path)]);

    let log = shared_log().await;

    // Commit after one batch, then process more without committing.
    let sink = Arc::new(MemorySink::new());
    let mut engine = JoinEngine::start(&set, manager(log.clone()), sink, 2)
        .await
        .unwrap();
    engine.process_batch().await.unwrap();
    engine.checkpoint().await.unwrap();
    engine.process_batch().await.unwrap();
    // Crash with the second batch unacknowledged.
    drop(engine);

    let resumed_sink = Arc::new(MemorySink::new());
    let mut resumed = JoinEngine::start(&set, manager(log), resumed_sink.clone(), 100)
        .await
        .unwrap();
    resumed.run().await.unwrap();

    // The resumed run replays events 3..8: 6 emissions, one per event.
    assert_eq!(resumed_sink.records().len(), 6);

    let u1 = resumed.store().get("u1").unwrap();
    assert!(u1.unpaid_order_ids.is_empty());
    assert_eq!(u1.paid_order_ids, vec!["o1", "o4"]);
}

/// Two partitions, each with its own token; a snapshot captures both, and a
/// resume advances each from its own position.
#[tokio::test]
async fn test_multi_partition_tokens_restore_independently() {
    let dir = TempDir::new().unwrap();
    let p0 = write_partition(
        &dir,
        "p0.json",
        &[
            event_line("u1", "order", "o1"),
            event_line("u1", "payment", "o1"),
        ],
    );
    let p1 = write_partition(
        &dir,
        "p1.json",
        &[
            event_line("u2", "order", "o2"),
            event_line("u2", "order", "o3"),
            event_line("u2", "payment", "o2"),
        ],
    );
    let set = partition_set(vec![("p0", p0), ("p1", p1)]);

    let log = shared_log().await;

    let mut engine = JoinEngine::start(&set, manager(log.clone()), Arc::new(MemorySink::new()), 1)
        .await
        .unwrap();
    // One event from each partition, then commit.
    engine.process_batch().await.unwrap();
    engine.checkpoint().await.unwrap();
    drop(engine);

    let snapshot = log.load_latest_snapshot().await.unwrap().unwrap();
    assert_eq!(snapshot.partition_tokens.len(), 2);
    assert!(snapshot.partition_tokens["p0"] > 0);
    assert!(snapshot.partition_tokens["p1"] > 0);

    let resumed_sink = Arc::new(MemorySink::new());
    let mut resumed = JoinEngine::start(&set, manager(log), resumed_sink.clone(), 100)
        .await
        .unwrap();
    resumed.run().await.unwrap();

    // Remaining: 1 event on p0, 2 on p1.
    assert_eq!(resumed_sink.records().len(), 3);
    assert_eq!(resumed.store().get("u1").unwrap().paid_order_ids, vec!["o1"]);
    let u2 = resumed.store().get("u2").unwrap();
    assert_eq!(u2.unpaid_order_ids, vec!["o3"]);
    assert_eq!(u2.paid_order_ids, vec!["o2"]);
}
