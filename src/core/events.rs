//! Lifecycle event publication.
//!
//! Observers register callbacks per [`EventKind`] or consume the broadcast
//! stream. Delivery is best-effort and in-process only: a panicking callback
//! is logged and skipped, a lagging stream receiver loses events, and nothing
//! is persisted. Task processing never depends on an event being seen.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::util::clock::now_ms;
use crate::util::serde::{TaskId, TaskType};

/// Capacity of the broadcast stream.
const STREAM_CAPACITY: usize = 1_024;

/// Lifecycle transition being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Task admitted.
    Scheduled,
    /// Task claimed for an attempt.
    Active,
    /// Task finished successfully.
    Completed,
    /// Attempt failed, retry pending.
    Delayed,
    /// Attempts exhausted.
    Failed,
    /// Task cancelled.
    Cancelled,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scheduled => "scheduled",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Delayed => "delayed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Event payload delivered to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Task identifier.
    pub id: TaskId,
    /// Task type tag.
    pub task_type: TaskType,
    /// Transition.
    pub kind: EventKind,
    /// When the transition happened (ms since epoch).
    pub timestamp_ms: u128,
    /// Extra context, e.g. the failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Helper to build an event stamped with the current time.
pub fn build_event(
    id: &TaskId,
    task_type: &TaskType,
    kind: EventKind,
    detail: Option<String>,
) -> LifecycleEvent {
    LifecycleEvent {
        id: id.clone(),
        task_type: task_type.clone(),
        kind,
        timestamp_ms: now_ms(),
        detail,
    }
}

/// Subscriber callback.
pub type EventCallback = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Handle returned by [`EventNotifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    kind: Option<EventKind>,
    callback: EventCallback,
}

/// In-process publish/subscribe hub for lifecycle events.
pub struct EventNotifier {
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
    stream: broadcast::Sender<LifecycleEvent>,
}

impl EventNotifier {
    /// Create a notifier with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (stream, _) = broadcast::channel(STREAM_CAPACITY);
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            stream,
        }
    }

    /// Invoke `callback` for every event of `kind`.
    ///
    /// Callbacks run on the publishing thread and should return quickly.
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.add(Some(kind), Arc::new(callback))
    }

    /// Invoke `callback` for every event.
    pub fn subscribe_all<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.add(None, Arc::new(callback))
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Receiver for async observers. Lagging receivers skip missed events.
    #[must_use]
    pub fn stream(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.stream.subscribe()
    }

    /// Deliver an event to all matching subscribers and the stream.
    pub fn publish(&self, event: LifecycleEvent) {
        let callbacks: Vec<EventCallback> = self
            .subscribers
            .read()
            .iter()
            .filter(|s| s.kind.is_none_or(|k| k == event.kind))
            .map(|s| Arc::clone(&s.callback))
            .collect();

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                tracing::warn!(
                    task_id = %event.id,
                    kind = %event.kind,
                    "event subscriber panicked; continuing"
                );
            }
        }

        // No receivers is fine.
        let _ = self.stream.send(event);
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    fn add(&self, kind: Option<EventKind>, callback: EventCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push(Subscriber { id, kind, callback });
        id
    }
}

impl Default for EventNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventNotifier")
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

/// Bounded in-memory event history, for tests and development.
#[derive(Debug, Clone)]
pub struct InMemoryEventLog {
    events: Arc<Mutex<VecDeque<LifecycleEvent>>>,
    max_events: usize,
}

impl InMemoryEventLog {
    /// Create a log keeping at most `max_events` entries (oldest dropped first).
    ///
    /// A log created with `0` records nothing.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events.min(1_024)))),
            max_events,
        }
    }

    /// Subscribe this log to every event published by `notifier`.
    pub fn attach(&self, notifier: &EventNotifier) -> SubscriptionId {
        let log = self.clone();
        notifier.subscribe_all(move |event| log.record(event.clone()))
    }

    /// Append an event.
    pub fn record(&self, event: LifecycleEvent) {
        if self.max_events == 0 {
            return;
        }
        let mut events = self.events.lock();
        while events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Snapshot of stored events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Kinds of the events recorded for one task, oldest first.
    #[must_use]
    pub fn kinds_for(&self, id: &TaskId) -> Vec<EventKind> {
        self.events
            .lock()
            .iter()
            .filter(|e| &e.id == id)
            .map(|e| e.kind)
            .collect()
    }

    /// Events of one kind, oldest first.
    #[must_use]
    pub fn of_kind(&self, kind: EventKind) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }
}
