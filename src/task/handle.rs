//! Task identity and non-owning task references.

use crate::engine::EngineTask;
use std::fmt;
use std::sync::{Arc, Weak};

/// Identifier assigned to a task by the engine. Stable for the task's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

impl From<u64> for TaskId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// One in-flight request, as seen by delegates and the registry.
///
/// Holds only a weak reference to the engine task. It never keeps the task
/// alive; whoever issued the request owns the strong reference.
#[derive(Clone)]
pub struct TaskHandle {
    id: TaskId,
    task: Weak<dyn EngineTask>,
}

impl TaskHandle {
    pub fn new(task: &Arc<dyn EngineTask>) -> Self {
        Self { id: task.id(), task: Arc::downgrade(task) }
    }

    /// Build a handle from an id and an existing weak reference.
    pub fn from_weak(id: TaskId, task: Weak<dyn EngineTask>) -> Self {
        Self { id, task }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// True while the issuer still holds the task.
    pub fn is_alive(&self) -> bool {
        self.task.strong_count() > 0
    }

    /// Temporarily upgrade, e.g. to cancel from inside a callback.
    pub fn upgrade(&self) -> Option<Arc<dyn EngineTask>> {
        self.task.upgrade()
    }

    /// Cancel the task if it is still reachable.
    pub fn cancel(&self) {
        if let Some(task) = self.upgrade() {
            task.cancel();
        }
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}
