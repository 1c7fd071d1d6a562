//! # taskbridge
//!
//! A delegate proxy and per-task session multiplexer for callback-driven
//! HTTP engines.
//!
//! An engine reports every event of every task through one callback
//! surface. `taskbridge` sits in front of it and routes each callback to
//! the task's own delegate, then to a session-wide delegate, then to a
//! default. Streaming requests get their body as an async byte sequence
//! with backpressure and their response head as a separate deferred value.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use taskbridge::{Request, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), taskbridge::NetError> {
//!     let session = Session::builder().build();
//!     let (bytes, mut response) = session.bytes(Request::get("http://example.com")?, None);
//!
//!     println!("Status: {}", response.get().await?.status());
//!     println!("{}", bytes.text().await?);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error types and task state
//! - [`delegate`] - Delegates, callback selectors and the multiplexer
//! - [`engine`] - The engine contract and a hyper-based reference engine
//! - [`http`] - Request, response and authentication types
//! - [`session`] - The application-facing session
//! - [`stream`] - The bridge from data callbacks to an async byte stream
//! - [`task`] - Task handles and the in-flight registry

pub mod base;
pub mod delegate;
pub mod engine;
pub mod http;
pub mod session;
pub mod stream;
pub mod task;

pub use base::{DelegateError, NetError, TaskState};
pub use delegate::{Callback, Capability, Delegate, DelegateBuilder, DelegateMultiplexer};
pub use engine::hyperengine::HyperEngine;
pub use engine::{Completion, Decision, Engine, EngineTask, SessionEvents};
pub use crate::http::{Request, RequestBody, ResponseMeta};
pub use session::{DataTask, Session, SessionBuilder, SessionConfig};
pub use stream::{AsyncBytes, PendingResponse};
pub use task::{TaskHandle, TaskId, TaskRegistry};
