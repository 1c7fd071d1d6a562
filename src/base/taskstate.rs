/// The current state of an engine task.
/// This roughly matches the lifecycle of a URL session task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    /// Created but not yet resumed. Callbacks cannot fire yet.
    #[default]
    Suspended,

    /// Resumed and delivering callbacks.
    Running,

    /// Cancel was requested; a completion callback is still pending.
    Canceling,

    /// The completion callback has fired.
    Completed,
}

impl TaskState {
    /// True once no further callbacks will be delivered.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed)
    }
}
