use crate::event::Event;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("io error on partition '{partition}': {source}")]
    Io {
        partition: String,
        #[source]
        source: std::io::Error,
    },
}

/// Reads events from one partition's backing file, one JSON object per line.
///
/// The reader tracks a byte-offset resume token meaning "fully consumed
/// through here": a reader reopened from `resume_token()` returns exactly the
/// records that had not yet been returned by the reader the token was taken
/// from. Lines starting with the corruption marker, and lines that fail to
/// deserialize, are skipped without being emitted; the token still advances
/// past them.
pub struct PartitionReader {
    partition_id: String,
    path: PathBuf,
    corrupt_marker: String,
    file: Option<BufReader<File>>,
    offset: u64,
}

impl PartitionReader {
    /// Open a partition's file, positioned at `resume_token` (or the start).
    pub fn open(
        partition_id: &str,
        path: &Path,
        corrupt_marker: &str,
        resume_token: Option<u64>,
    ) -> Result<Self, ReaderError> {
        let offset = resume_token.unwrap_or(0);

        let file = File::open(path).map_err(|e| ReaderError::Io {
            partition: partition_id.to_string(),
            source: e,
        })?;
        let mut buf_reader = BufReader::new(file);
        buf_reader
            .seek(SeekFrom::Start(offset))
            .map_err(|e| ReaderError::Io {
                partition: partition_id.to_string(),
                source: e,
            })?;

        debug!(
            partition = %partition_id,
            path = %path.display(),
            offset,
            "Opened partition reader"
        );

        Ok(Self {
            partition_id: partition_id.to_string(),
            path: path.to_path_buf(),
            corrupt_marker: corrupt_marker.to_string(),
            file: Some(buf_reader),
            offset,
        })
    }

    pub fn partition_id(&self) -> &str {
        &self.partition_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset after the last consumed line, skipped lines included.
    pub fn resume_token(&self) -> u64 {
        self.offset
    }

    /// Read the next event. Returns `None` at end of partition.
    pub fn next_event(&mut self) -> Result<Option<Event>, ReaderError> {
        loop {
            let file = match self.file.as_mut() {
                Some(file) => file,
                // End of partition already reached and the handle released.
                None => return Ok(None),
            };

            let mut line = String::new();
            let bytes_read = file.read_line(&mut line).map_err(|e| ReaderError::Io {
                partition: self.partition_id.clone(),
                source: e,
            })?;

            if bytes_read == 0 {
                // End of partition; drop the handle so it is released even if
                // the reader itself lives on for token collection.
                self.file = None;
                return Ok(None);
            }

            // The token covers this line whether or not it produces an event.
            self.offset += bytes_read as u64;

            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() {
                continue;
            }

            if trimmed.starts_with(&self.corrupt_marker) {
                debug!(
                    partition = %self.partition_id,
                    offset = self.offset,
                    "Skipping marked-corrupt line"
                );
                continue;
            }

            match serde_json::from_str::<Event>(trimmed) {
                Ok(event) => return Ok(Some(event)),
                Err(e) => {
                    debug!(
                        partition = %self.partition_id,
                        offset = self.offset,
                        error = %e,
                        "Skipping malformed line"
                    );
                    continue;
                }
            }
        }
    }

    /// Whether the underlying file has been fully consumed.
    pub fn is_exhausted(&self) -> bool {
        self.file.is_none()
    }
}
