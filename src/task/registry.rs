//! In-flight task registry.
//!
//! Maps a [`TaskId`] to the per-task state the multiplexer needs while the
//! engine is delivering callbacks: the caller's delegate, and for
//! streaming-bytes requests the stream producer and the response callback.

use crate::delegate::Delegate;
use crate::stream::{ResponseCallback, StreamProducer};
use crate::task::handle::{TaskHandle, TaskId};
use dashmap::DashMap;
use std::sync::Arc;

/// Per-task state, owned by the registry.
///
/// [`TaskRegistry::lookup`] hands out clones; all fields are cheap handles.
#[derive(Clone)]
pub struct TaskHandlerRecord {
    handle: TaskHandle,
    delegate: Option<Arc<Delegate>>,
    producer: Option<StreamProducer>,
    response: Option<ResponseCallback>,
    streaming: bool,
}

impl TaskHandlerRecord {
    pub fn handle(&self) -> &TaskHandle {
        &self.handle
    }

    pub fn delegate(&self) -> Option<&Arc<Delegate>> {
        self.delegate.as_ref()
    }

    pub fn producer(&self) -> Option<&StreamProducer> {
        self.producer.as_ref()
    }

    pub fn response(&self) -> Option<&ResponseCallback> {
        self.response.as_ref()
    }

    /// True for streaming-bytes requests. Survives invalidation, so a task
    /// whose consumer went away is still routed as a streaming task.
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    fn has_dependents(&self) -> bool {
        self.delegate.is_some() || self.producer.is_some() || self.response.is_some()
    }

    fn clear_dependents(&mut self) {
        self.delegate = None;
        self.producer = None;
        self.response = None;
    }
}

impl std::fmt::Debug for TaskHandlerRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandlerRecord")
            .field("handle", &self.handle)
            .field("delegate", &self.delegate.is_some())
            .field("producer", &self.producer.is_some())
            .field("response", &self.response.is_some())
            .field("streaming", &self.streaming)
            .finish()
    }
}

/// Thread-safe map of in-flight tasks.
///
/// Each operation runs under the lock of the shard owning the task id, so
/// operations on one task never interleave. Shards only split unrelated
/// tasks.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    entries: Arc<DashMap<TaskId, TaskHandlerRecord>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `handle`. Last write wins.
    pub fn register(
        &self,
        handle: TaskHandle,
        delegate: Option<Arc<Delegate>>,
        producer: Option<StreamProducer>,
        response: Option<ResponseCallback>,
    ) {
        let id = handle.id();
        let streaming = producer.is_some() || response.is_some();
        let record = TaskHandlerRecord { handle, delegate, producer, response, streaming };
        if self.entries.insert(id, record).is_some() {
            tracing::warn!(task_id = %id, "task registered twice, replacing record");
        } else {
            tracing::debug!(task_id = %id, streaming, "task registered");
        }
    }

    /// Snapshot of the record for `id`.
    ///
    /// If the issuer dropped the task, the delegate, producer and response
    /// callback are cleared first, in the same critical section.
    pub fn lookup(&self, id: TaskId) -> Option<TaskHandlerRecord> {
        let mut entry = self.entries.get_mut(&id)?;
        if !entry.handle.is_alive() && entry.has_dependents() {
            tracing::debug!(task_id = %id, "task no longer reachable, clearing dependents");
            entry.clear_dependents();
        }
        Some(entry.clone())
    }

    /// Remove the record for `id`. Removing an absent task is a no-op.
    pub fn remove(&self, id: TaskId) {
        if self.entries.remove(&id).is_some() {
            tracing::debug!(task_id = %id, "task deregistered");
        }
    }

    /// Handles of every registered task, live or not.
    pub fn handles(&self) -> Vec<TaskHandle> {
        self.entries.iter().map(|entry| entry.handle.clone()).collect()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
