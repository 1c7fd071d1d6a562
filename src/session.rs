//! Session with builder pattern.
//!
//! A [`Session`] owns one engine and one [`DelegateMultiplexer`]. Requests
//! are issued either as a streaming byte sequence ([`Session::bytes`]) or as
//! a plain callback task ([`Session::data_task`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use taskbridge::{Delegate, Request, Session};
//!
//! let session = Session::builder()
//!     .delegate(Delegate::builder().on_complete(|task, err| println!("{task:?} {err:?}")).build())
//!     .build();
//!
//! let (bytes, mut response) = session.bytes(Request::get("http://example.com")?, None);
//! println!("status: {}", response.get().await?.status());
//! let body = bytes.text().await?;
//! ```

use crate::base::taskstate::TaskState;
use crate::delegate::{Delegate, DelegateMultiplexer};
use crate::engine::hyperengine::HyperEngine;
use crate::engine::{Engine, EngineTask, SessionEvents};
use crate::http::Request;
use crate::stream::{self, AsyncBytes, PendingResponse};
use crate::task::{TaskHandle, TaskId, TaskRegistry};
use http::HeaderMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Configuration shared by a session and the engine it builds.
#[derive(Clone)]
pub struct SessionConfig {
    /// Body chunks buffered per streaming request before the engine waits.
    pub stream_buffer: usize,

    /// Redirects followed per task before failing with `TooManyRedirects`.
    pub max_redirects: u8,

    /// Whole-request timeout (None = no limit).
    pub timeout: Option<Duration>,

    /// Delay before each task starts. Triggers `WillBeginDelayedRequest`.
    pub begin_delay: Option<Duration>,

    /// User-Agent sent when the request has none.
    pub user_agent: String,

    /// Headers added to every request that does not set them itself.
    pub default_headers: HeaderMap,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stream_buffer: 16,
            max_redirects: 20,
            timeout: None,
            begin_delay: None,
            user_agent: concat!("taskbridge/", env!("CARGO_PKG_VERSION")).to_string(),
            default_headers: HeaderMap::new(),
        }
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("stream_buffer", &self.stream_buffer)
            .field("max_redirects", &self.max_redirects)
            .field("timeout", &self.timeout)
            .field("begin_delay", &self.begin_delay)
            .field("user_agent", &self.user_agent)
            .field("default_headers_count", &self.default_headers.len())
            .finish()
    }
}

struct SessionInner {
    engine: Arc<dyn Engine>,
    events: Arc<DelegateMultiplexer>,
    config: SessionConfig,
    invalidated: AtomicBool,
}

/// Entry point for issuing requests.
///
/// Use [`Session::builder()`] to configure and create a session. Clones
/// share the same engine, registry and global delegate.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Default for Session {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Session {
    /// Create a new session builder.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// The global delegate, fixed at construction.
    pub fn delegate(&self) -> Option<&Arc<Delegate>> {
        self.inner.events.global()
    }

    /// Number of tasks whose completion has not been delivered yet.
    pub fn in_flight(&self) -> usize {
        self.inner.events.registry().len()
    }

    pub fn is_invalidated(&self) -> bool {
        self.inner.invalidated.load(Ordering::SeqCst)
    }

    fn events(&self) -> Arc<dyn SessionEvents> {
        self.inner.events.clone()
    }

    fn registry(&self) -> &TaskRegistry {
        self.inner.events.registry()
    }

    /// Issue `request` and return its body as an async byte sequence plus
    /// the deferred response head.
    ///
    /// `delegate` receives every callback except the response head and the
    /// body, which go to the returned pair. The task is already running.
    pub fn bytes(
        &self,
        request: Request,
        delegate: Option<Delegate>,
    ) -> (AsyncBytes, PendingResponse) {
        let delegate = delegate.map(Arc::new);

        if let Some(native) = self.inner.engine.native_bytes(&request, delegate.clone()) {
            tracing::debug!(url = %request.url(), "using engine's native byte stream");
            return stream::native(native);
        }

        let task = self.inner.engine.create_task(request, self.events());
        let (producer, bytes, response, pending) =
            stream::bridge(task.clone(), self.inner.config.stream_buffer);
        self.registry().register(TaskHandle::new(&task), delegate, Some(producer), Some(response));

        if self.is_invalidated() {
            tracing::warn!(task_id = %task.id(), "request issued on invalidated session");
            task.cancel();
        } else {
            task.resume();
        }
        (bytes, pending)
    }

    /// Create a suspended callback task for `request`.
    ///
    /// Callbacks go to `delegate` first and fall back to the global
    /// delegate. Call [`DataTask::resume`] to start it.
    pub fn data_task(&self, request: Request, delegate: Option<Delegate>) -> DataTask {
        let task = self.inner.engine.create_task(request, self.events());
        self.registry().register(TaskHandle::new(&task), delegate.map(Arc::new), None, None);

        if self.is_invalidated() {
            tracing::warn!(task_id = %task.id(), "request issued on invalidated session");
            task.cancel();
        }
        DataTask { task }
    }

    /// Cancel every in-flight task, then notify the global delegate once
    /// the last of them has completed.
    ///
    /// Requests issued afterwards are cancelled before they start.
    pub fn invalidate(&self) {
        if self.inner.invalidated.swap(true, Ordering::SeqCst) {
            return;
        }
        let handles = self.registry().handles();
        tracing::debug!(in_flight = handles.len(), "invalidating session");
        for handle in handles {
            handle.cancel();
        }
        self.inner.events.invalidate_when_drained();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.inner.config)
            .field("delegate", &self.inner.events.global().is_some())
            .field("in_flight", &self.in_flight())
            .field("invalidated", &self.is_invalidated())
            .finish()
    }
}

/// Builder for creating a [`Session`].
#[derive(Default)]
pub struct SessionBuilder {
    delegate: Option<Delegate>,
    config: Option<SessionConfig>,
    engine: Option<Arc<dyn Engine>>,
}

impl SessionBuilder {
    /// Set the global delegate.
    pub fn delegate(mut self, delegate: Delegate) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use `engine` instead of the default [`HyperEngine`].
    pub fn engine(mut self, engine: Arc<dyn Engine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Set request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.get_or_insert_with(SessionConfig::default).timeout = Some(timeout);
        self
    }

    /// Build the session.
    pub fn build(self) -> Session {
        let config = self.config.unwrap_or_default();
        let engine = self
            .engine
            .unwrap_or_else(|| Arc::new(HyperEngine::with_config(config.clone())));
        let events = Arc::new(DelegateMultiplexer::new(
            TaskRegistry::new(),
            self.delegate.map(Arc::new),
        ));

        Session {
            inner: Arc::new(SessionInner {
                engine,
                events,
                config,
                invalidated: AtomicBool::new(false),
            }),
        }
    }
}

/// A plain callback task returned by [`Session::data_task`].
///
/// Owns the task: dropping the last `DataTask` lets the engine discard it.
pub struct DataTask {
    task: Arc<dyn EngineTask>,
}

impl DataTask {
    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    pub fn state(&self) -> TaskState {
        self.task.state()
    }

    pub fn original_request(&self) -> &Request {
        self.task.original_request()
    }

    /// A non-owning handle, the same one delegates receive.
    pub fn handle(&self) -> TaskHandle {
        TaskHandle::new(&self.task)
    }

    pub fn resume(&self) {
        self.task.resume();
    }

    pub fn suspend(&self) {
        self.task.suspend();
    }

    pub fn cancel(&self) {
        self.task.cancel();
    }
}

impl std::fmt::Debug for DataTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataTask")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.stream_buffer, 16);
        assert_eq!(config.max_redirects, 20);
        assert!(config.timeout.is_none());
        assert!(config.user_agent.starts_with("taskbridge/"));
    }

    #[test]
    fn test_builder_timeout() {
        let session = Session::builder().timeout(Duration::from_secs(3)).build();
        assert_eq!(session.config().timeout, Some(Duration::from_secs(3)));
        assert!(session.delegate().is_none());
        assert_eq!(session.in_flight(), 0);
    }

    #[test]
    fn test_invalidate_notifies_once() {
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen = count.clone();
        let session = Session::builder()
            .delegate(
                Delegate::builder()
                    .on_invalidated(move |_| {
                        seen.fetch_add(1, Ordering::SeqCst);
                    })
                    .build(),
            )
            .build();

        session.invalidate();
        session.invalidate();
        assert!(session.is_invalidated());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
