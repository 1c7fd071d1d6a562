//! Task identity and the in-flight task registry.

pub mod handle;
pub mod registry;

pub use handle::{TaskHandle, TaskId};
pub use registry::{TaskHandlerRecord, TaskRegistry};
