use crate::source::reader::{PartitionReader, ReaderError};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unknown partition '{0}': topology does not match the resumed run")]
    UnknownPartition(String),

    #[error(transparent)]
    Reader(#[from] ReaderError),
}

/// The fixed set of partitions available to a run, mapping each partition id
/// to its backing file. The topology never changes mid-run; a resumed run
/// must present the same ids the snapshot was taken against.
///
/// A single-file input is just the one-entry case.
pub struct PartitionSet {
    partitions: BTreeMap<String, PathBuf>,
    corrupt_marker: String,
}

impl PartitionSet {
    pub fn new(partitions: BTreeMap<String, PathBuf>, corrupt_marker: String) -> Self {
        Self {
            partitions,
            corrupt_marker,
        }
    }

    /// Partition ids in stable (sorted) order.
    pub fn partition_ids(&self) -> Vec<String> {
        self.partitions.keys().cloned().collect()
    }

    pub fn contains(&self, partition_id: &str) -> bool {
        self.partitions.contains_key(partition_id)
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Build a reader for `partition_id`, positioned at `resume_token` if one
    /// was captured by a previous run.
    pub fn build_reader(
        &self,
        partition_id: &str,
        resume_token: Option<u64>,
    ) -> Result<PartitionReader, SourceError> {
        let path = self
            .partitions
            .get(partition_id)
            .ok_or_else(|| SourceError::UnknownPartition(partition_id.to_string()))?;

        Ok(PartitionReader::open(
            partition_id,
            path,
            &self.corrupt_marker,
            resume_token,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn one_partition_set(file: &NamedTempFile) -> PartitionSet {
        let mut partitions = BTreeMap::new();
        partitions.insert("p0".to_string(), file.path().to_path_buf());
        PartitionSet::new(partitions, "FAIL".to_string())
    }

    #[test]
    fn test_build_reader_known_partition() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"user_id": "u1", "type": "order", "order_id": "o1"}}"#).unwrap();
        file.flush().unwrap();

        let set = one_partition_set(&file);
        let mut reader = set.build_reader("p0", None).unwrap();
        assert!(reader.next_event().unwrap().is_some());
    }

    #[test]
    fn test_unknown_partition_rejected() {
        let file = NamedTempFile::new().unwrap();
        let set = one_partition_set(&file);

        match set.build_reader("p7", None) {
            Err(SourceError::UnknownPartition(id)) => assert_eq!(id, "p7"),
            other => panic!("expected UnknownPartition, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_partition_ids_sorted_and_stable() {
        let mut partitions = BTreeMap::new();
        partitions.insert("p1".to_string(), PathBuf::from("/tmp/b.json"));
        partitions.insert("p0".to_string(), PathBuf::from("/tmp/a.json"));
        let set = PartitionSet::new(partitions, "FAIL".to_string());
        assert_eq!(set.partition_ids(), vec!["p0", "p1"]);
    }
}
