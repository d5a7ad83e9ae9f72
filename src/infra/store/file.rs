//! File-backed task store using an append-only JSON-lines log.
//!
//! Every mutation appends the full record as one line. On open the log is
//! replayed (the last line per id wins) and compacted, so any record that was
//! not terminal before a restart is visible to the readiness query again.
//!
//! A write is committed once its line is appended. Compaction after that is
//! best effort: a failed rewrite is logged and retried on a later write.
//!
//! Writes are blocking file I/O performed under the scheduler's store mutex,
//! on whichever tokio worker thread made the call.

use std::fs::{self, create_dir_all, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::core::{SchedulerError, TaskRecord, TaskState, TaskStore};
use crate::infra::store::memory::InMemoryTaskStore;
use crate::util::serde::TaskId;

/// Appended lines allowed beyond the live record count before compacting.
const COMPACTION_SLACK: usize = 1_024;

fn backend_error(e: impl std::fmt::Display) -> SchedulerError {
    SchedulerError::StoreUnavailable(e.to_string())
}

/// Durable task store persisting to `<dir>/<stream>.jsonl`.
#[derive(Debug)]
pub struct FileTaskStore {
    dir: PathBuf,
    stream: String,
    index: InMemoryTaskStore,
    log: File,
    log_lines: usize,
    sync_writes: bool,
}

impl FileTaskStore {
    /// Open (or create) the store, replaying and compacting any existing log.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the directory or log cannot be accessed.
    pub fn open(dir: impl AsRef<Path>, stream: impl Into<String>) -> Result<Self, SchedulerError> {
        let dir = dir.as_ref().to_path_buf();
        let stream = stream.into();
        create_dir_all(&dir).map_err(backend_error)?;

        let log_path = dir.join(format!("{stream}.jsonl"));
        let index = Self::replay(&log_path)?;
        let log = Self::write_snapshot(&dir, &stream, &index)?;
        let log_lines = index.len();

        tracing::info!(
            path = %log_path.display(),
            records = log_lines,
            "opened file task store"
        );

        Ok(Self {
            dir,
            stream,
            index,
            log,
            log_lines,
            sync_writes: false,
        })
    }

    /// Call `fsync` after every write. Off by default.
    #[must_use]
    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }

    /// Path of the log file.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        Self::path_for(&self.dir, &self.stream)
    }

    fn path_for(dir: &Path, stream: &str) -> PathBuf {
        dir.join(format!("{stream}.jsonl"))
    }

    fn replay(path: &Path) -> Result<InMemoryTaskStore, SchedulerError> {
        let mut index = InMemoryTaskStore::new();
        if !path.exists() {
            return Ok(index);
        }
        let file = File::open(path).map_err(backend_error)?;
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(backend_error)?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TaskRecord>(&line) {
                Ok(record) => index.put(record),
                Err(e) => {
                    // A torn write from a crash leaves a partial final line.
                    tracing::warn!(line = line_no + 1, error = %e, "skipping unreadable log line");
                }
            }
        }
        Ok(index)
    }

    /// Write all live records to a temp file and swap it in.
    ///
    /// The returned handle is the temp file itself, positioned at its end, so
    /// the rename is the last fallible step and a failure keeps the old log.
    fn write_snapshot(
        dir: &Path,
        stream: &str,
        index: &InMemoryTaskStore,
    ) -> Result<File, SchedulerError> {
        let path = Self::path_for(dir, stream);
        let tmp_path = dir.join(format!("{stream}.jsonl.tmp"));
        let mut tmp = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(backend_error)?;
        for record in index.records() {
            let line = serde_json::to_string(record).map_err(backend_error)?;
            writeln!(tmp, "{line}").map_err(backend_error)?;
        }
        tmp.sync_all().map_err(backend_error)?;
        fs::rename(&tmp_path, &path).map_err(backend_error)?;
        Ok(tmp)
    }

    fn append(&mut self, record: &TaskRecord) -> Result<(), SchedulerError> {
        let line = serde_json::to_string(record).map_err(backend_error)?;
        writeln!(self.log, "{line}").map_err(backend_error)?;
        if self.sync_writes {
            self.log.sync_data().map_err(backend_error)?;
        }
        self.log_lines += 1;
        Ok(())
    }

    fn compaction_due(&self) -> bool {
        self.log_lines > self.index.len().saturating_mul(2) + COMPACTION_SLACK
    }

    /// Compact after a committed write. Errors are logged, not returned.
    fn compact_best_effort(&mut self) {
        if let Err(e) = self.compact() {
            tracing::warn!(
                path = %self.log_path().display(),
                lines = self.log_lines,
                error = %e,
                "task log compaction failed"
            );
        }
    }

    fn compact_if_needed(&mut self) {
        if self.compaction_due() {
            self.compact_best_effort();
        }
    }

    /// Rewrite the log so it holds exactly one line per live record.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` on I/O failure; the previous log stays intact.
    pub fn compact(&mut self) -> Result<(), SchedulerError> {
        self.log = Self::write_snapshot(&self.dir, &self.stream, &self.index)?;
        tracing::debug!(
            before = self.log_lines,
            after = self.index.len(),
            "compacted task log"
        );
        self.log_lines = self.index.len();
        Ok(())
    }
}

impl TaskStore for FileTaskStore {
    fn insert(&mut self, record: TaskRecord) -> Result<(), SchedulerError> {
        if self.index.get(&record.id)?.is_some() {
            return Err(SchedulerError::DuplicateTaskId(record.id));
        }
        self.append(&record)?;
        self.index.put(record);
        self.compact_if_needed();
        Ok(())
    }

    fn get(&self, id: &TaskId) -> Result<Option<TaskRecord>, SchedulerError> {
        self.index.get(id)
    }

    fn ready(&self, now_ms: u128, limit: usize) -> Result<Vec<TaskRecord>, SchedulerError> {
        self.index.ready(now_ms, limit)
    }

    fn compare_and_set(
        &mut self,
        expected: TaskState,
        expected_revision: u64,
        record: TaskRecord,
    ) -> Result<bool, SchedulerError> {
        match self.index.get(&record.id)? {
            Some(current) if current.state == expected && current.revision == expected_revision => {}
            Some(_) => return Ok(false),
            None => return Err(SchedulerError::NotFound(record.id)),
        }
        // Disk first: a failed append must leave the in-memory view untouched.
        self.append(&record)?;
        self.index.put(record);
        self.compact_if_needed();
        Ok(true)
    }

    fn next_due_ms(&self) -> Result<Option<u128>, SchedulerError> {
        self.index.next_due_ms()
    }

    fn stale_active(&self, claimed_before_ms: u128) -> Result<Vec<TaskRecord>, SchedulerError> {
        self.index.stale_active(claimed_before_ms)
    }

    fn prune_terminal(&mut self, updated_before_ms: u128) -> Result<usize, SchedulerError> {
        let removed = self.index.prune_terminal(updated_before_ms)?;
        if removed > 0 {
            // Pruned lines left behind are replayed as terminal records.
            self.compact_best_effort();
        }
        Ok(removed)
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}
