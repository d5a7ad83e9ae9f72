//! Durable store abstraction for task records.

use crate::core::error::SchedulerError;
use crate::core::task::{TaskRecord, TaskState};
use crate::util::serde::TaskId;

/// Abstraction for task record backends.
///
/// The scheduler keeps the store behind a `parking_lot::Mutex`, so every call
/// is atomic with respect to every other caller. [`compare_and_set`] is the
/// only way records change after insertion.
///
/// [`compare_and_set`]: TaskStore::compare_and_set
pub trait TaskStore {
    /// Persist a new record. Fails with `DuplicateTaskId` if the id exists.
    fn insert(&mut self, record: TaskRecord) -> Result<(), SchedulerError>;

    /// Fetch a record by id.
    fn get(&self, id: &TaskId) -> Result<Option<TaskRecord>, SchedulerError>;

    /// Records in SCHEDULED or DELAYED whose `scheduled_for_ms <= now_ms`,
    /// ordered by due time ascending, then priority descending, then
    /// admission time. At most `limit` records are returned.
    fn ready(&self, now_ms: u128, limit: usize) -> Result<Vec<TaskRecord>, SchedulerError>;

    /// Replace the stored record with `record` if the stored record is still
    /// in state `expected` at revision `expected_revision`. Returns whether the
    /// write happened; a `false` means another writer got there first.
    ///
    /// Callers set `record.revision` to `expected_revision + 1`. Checking the
    /// revision as well as the state rejects writes derived from a snapshot
    /// that has since gone through a full ACTIVE/DELAYED cycle.
    fn compare_and_set(
        &mut self,
        expected: TaskState,
        expected_revision: u64,
        record: TaskRecord,
    ) -> Result<bool, SchedulerError>;

    /// Earliest due time among SCHEDULED/DELAYED records.
    fn next_due_ms(&self) -> Result<Option<u128>, SchedulerError>;

    /// ACTIVE records claimed before `claimed_before_ms`.
    fn stale_active(&self, claimed_before_ms: u128) -> Result<Vec<TaskRecord>, SchedulerError>;

    /// Delete terminal records last updated before `updated_before_ms`.
    fn prune_terminal(&mut self, updated_before_ms: u128) -> Result<usize, SchedulerError>;

    /// Number of stored records.
    fn len(&self) -> usize;

    /// Whether the store holds no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Store selected at runtime from configuration.
pub type DynTaskStore = Box<dyn TaskStore + Send>;

impl<T> TaskStore for Box<T>
where
    T: TaskStore + ?Sized,
{
    fn insert(&mut self, record: TaskRecord) -> Result<(), SchedulerError> {
        (**self).insert(record)
    }

    fn get(&self, id: &TaskId) -> Result<Option<TaskRecord>, SchedulerError> {
        (**self).get(id)
    }

    fn ready(&self, now_ms: u128, limit: usize) -> Result<Vec<TaskRecord>, SchedulerError> {
        (**self).ready(now_ms, limit)
    }

    fn compare_and_set(
        &mut self,
        expected: TaskState,
        expected_revision: u64,
        record: TaskRecord,
    ) -> Result<bool, SchedulerError> {
        (**self).compare_and_set(expected, expected_revision, record)
    }

    fn next_due_ms(&self) -> Result<Option<u128>, SchedulerError> {
        (**self).next_due_ms()
    }

    fn stale_active(&self, claimed_before_ms: u128) -> Result<Vec<TaskRecord>, SchedulerError> {
        (**self).stale_active(claimed_before_ms)
    }

    fn prune_terminal(&mut self, updated_before_ms: u128) -> Result<usize, SchedulerError> {
        (**self).prune_terminal(updated_before_ms)
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}
