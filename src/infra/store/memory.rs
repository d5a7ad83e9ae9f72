//! In-memory task store with an ordered readiness index.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use crate::core::{SchedulerError, TaskRecord, TaskState, TaskStore};
use crate::util::serde::TaskId;

/// Readiness index key. Field order is the dispatch order:
/// due time ascending, priority descending, admission time ascending.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ReadyKey {
    scheduled_for_ms: u128,
    priority: Reverse<i32>,
    created_at_ms: u128,
    id: TaskId,
}

impl ReadyKey {
    fn of(record: &TaskRecord) -> Self {
        Self {
            scheduled_for_ms: record.scheduled_for_ms,
            priority: Reverse(record.priority),
            created_at_ms: record.created_at_ms,
            id: record.id.clone(),
        }
    }
}

/// Non-durable task store for development and tests.
///
/// Pending records are additionally kept in a `BTreeSet` so the readiness
/// query walks only due entries in dispatch order.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    records: HashMap<TaskId, TaskRecord>,
    pending: BTreeSet<ReadyKey>,
}

impl InMemoryTaskStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterate over all records in no particular order.
    pub fn records(&self) -> impl Iterator<Item = &TaskRecord> {
        self.records.values()
    }

    /// Insert or replace a record without any checks. Used when replaying a log.
    pub(crate) fn put(&mut self, record: TaskRecord) {
        if let Some(old) = self.records.get(&record.id) {
            if old.state.is_pending() {
                self.pending.remove(&ReadyKey::of(old));
            }
        }
        if record.state.is_pending() {
            self.pending.insert(ReadyKey::of(&record));
        }
        self.records.insert(record.id.clone(), record);
    }
}

impl TaskStore for InMemoryTaskStore {
    fn insert(&mut self, record: TaskRecord) -> Result<(), SchedulerError> {
        if self.records.contains_key(&record.id) {
            return Err(SchedulerError::DuplicateTaskId(record.id));
        }
        self.put(record);
        Ok(())
    }

    fn get(&self, id: &TaskId) -> Result<Option<TaskRecord>, SchedulerError> {
        Ok(self.records.get(id).cloned())
    }

    fn ready(&self, now_ms: u128, limit: usize) -> Result<Vec<TaskRecord>, SchedulerError> {
        Ok(self
            .pending
            .iter()
            .take_while(|key| key.scheduled_for_ms <= now_ms)
            .filter_map(|key| self.records.get(&key.id))
            .take(limit)
            .cloned()
            .collect())
    }

    fn compare_and_set(
        &mut self,
        expected: TaskState,
        expected_revision: u64,
        record: TaskRecord,
    ) -> Result<bool, SchedulerError> {
        match self.records.get(&record.id) {
            Some(current) if current.state == expected && current.revision == expected_revision => {
                self.put(record);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(SchedulerError::NotFound(record.id)),
        }
    }

    fn next_due_ms(&self) -> Result<Option<u128>, SchedulerError> {
        Ok(self.pending.first().map(|key| key.scheduled_for_ms))
    }

    fn stale_active(&self, claimed_before_ms: u128) -> Result<Vec<TaskRecord>, SchedulerError> {
        let mut stale: Vec<_> = self
            .records
            .values()
            .filter(|r| {
                r.state == TaskState::Active
                    && r.claimed_at_ms.unwrap_or(r.updated_at_ms) < claimed_before_ms
            })
            .cloned()
            .collect();
        stale.sort_by_key(|r| r.claimed_at_ms.unwrap_or(r.updated_at_ms));
        Ok(stale)
    }

    fn prune_terminal(&mut self, updated_before_ms: u128) -> Result<usize, SchedulerError> {
        let before = self.records.len();
        self.records
            .retain(|_, r| !(r.is_terminal() && r.updated_at_ms < updated_before_ms));
        Ok(before.saturating_sub(self.records.len()))
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
