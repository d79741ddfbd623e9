use crate::event::OutputRecord;
use async_trait::async_trait;
use std::io::Write;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Where formatted join results go, one record at a time, in operator
/// emission order. Emission is not covered by snapshots, so replay after a
/// crash may duplicate output lines.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn emit(&self, record: &OutputRecord) -> Result<(), SinkError>;
}

/// Writes one JSON line per record to standard output.
pub struct StdoutSink;

#[async_trait]
impl OutputSink for StdoutSink {
    async fn emit(&self, record: &OutputRecord) -> Result<(), SinkError> {
        let line = serde_json::to_string(record)?;
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{line}")?;
        Ok(())
    }
}

/// Collects records in memory, for tests and for inspecting small runs.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<OutputRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<OutputRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn emit(&self, record: &OutputRecord) -> Result<(), SinkError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}
