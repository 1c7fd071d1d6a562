//! Delegates as tables of optional handlers.
//!
//! A [`Delegate`] implements a callback exactly when the matching handler
//! is set. Capability probing is a presence check on that slot, never a
//! type inspection.
//!
//! # Example
//!
//! ```rust,ignore
//! use taskbridge::delegate::Delegate;
//!
//! let delegate = Delegate::builder()
//!     .on_redirect(|_task, _response, request, done| done.call(Some(request)))
//!     .on_complete(|task, error| println!("{} finished: {:?}", task.id(), error))
//!     .build();
//! ```

use crate::base::neterror::{DelegateError, NetError};
use crate::delegate::callback::{Callback, Capability};
use crate::engine::{Completion, DelayedRequestDisposition, ResponseDisposition, TransferProgress};
use crate::http::{
    AuthChallenge, CachedResponse, ChallengeDisposition, Request, RequestBody, ResponseMeta,
    TaskMetrics,
};
use crate::task::TaskHandle;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;

pub type InvalidatedFn = Arc<dyn Fn(Option<NetError>) + Send + Sync>;
pub type SessionChallengeFn =
    Arc<dyn Fn(&AuthChallenge, Completion<ChallengeDisposition>) + Send + Sync>;
pub type TaskFn = Arc<dyn Fn(&TaskHandle) + Send + Sync>;
pub type DelayedRequestFn =
    Arc<dyn Fn(&TaskHandle, Request, Completion<DelayedRequestDisposition>) + Send + Sync>;
pub type RedirectFn =
    Arc<dyn Fn(&TaskHandle, &ResponseMeta, Request, Completion<Option<Request>>) + Send + Sync>;
pub type TaskChallengeFn =
    Arc<dyn Fn(&TaskHandle, &AuthChallenge, Completion<ChallengeDisposition>) + Send + Sync>;
pub type BodyStreamFn = Arc<dyn Fn(&TaskHandle, Completion<Option<RequestBody>>) + Send + Sync>;
pub type ProgressFn = Arc<dyn Fn(&TaskHandle, TransferProgress) + Send + Sync>;
pub type MetricsFn = Arc<dyn Fn(&TaskHandle, &TaskMetrics) + Send + Sync>;
pub type CompleteFn = Arc<dyn Fn(&TaskHandle, Option<NetError>) + Send + Sync>;
pub type ResponseFn =
    Arc<dyn Fn(&TaskHandle, &ResponseMeta, Completion<ResponseDisposition>) + Send + Sync>;
pub type DataFn = Arc<dyn Fn(&TaskHandle, &Bytes) + Send + Sync>;
pub type CacheFn =
    Arc<dyn Fn(&TaskHandle, CachedResponse, Completion<Option<CachedResponse>>) + Send + Sync>;
pub type ResumeFn = Arc<dyn Fn(&TaskHandle, u64, Option<u64>) + Send + Sync>;
pub type DownloadFinishedFn = Arc<dyn Fn(&TaskHandle, &Path) + Send + Sync>;
pub type WebSocketOpenFn = Arc<dyn Fn(&TaskHandle, Option<&str>) + Send + Sync>;
pub type WebSocketCloseFn = Arc<dyn Fn(&TaskHandle, u16, Option<&[u8]>) + Send + Sync>;

/// A set of callback handlers, used both per task and session-wide.
#[derive(Clone, Default)]
pub struct Delegate {
    // Session
    pub(crate) invalidated: Option<InvalidatedFn>,
    pub(crate) session_challenge: Option<SessionChallengeFn>,

    // Task
    pub(crate) task_created: Option<TaskFn>,
    pub(crate) delayed_request: Option<DelayedRequestFn>,
    pub(crate) waiting_for_connectivity: Option<TaskFn>,
    pub(crate) redirect: Option<RedirectFn>,
    pub(crate) task_challenge: Option<TaskChallengeFn>,
    pub(crate) need_body_stream: Option<BodyStreamFn>,
    pub(crate) body_sent: Option<ProgressFn>,
    pub(crate) metrics: Option<MetricsFn>,
    pub(crate) complete: Option<CompleteFn>,

    // Data
    pub(crate) response: Option<ResponseFn>,
    pub(crate) data: Option<DataFn>,
    pub(crate) will_cache: Option<CacheFn>,

    // Download
    pub(crate) download_progress: Option<ProgressFn>,
    pub(crate) download_resumed: Option<ResumeFn>,
    pub(crate) download_finished: Option<DownloadFinishedFn>,

    // Stream
    pub(crate) read_closed: Option<TaskFn>,
    pub(crate) write_closed: Option<TaskFn>,
    pub(crate) better_route: Option<TaskFn>,
    pub(crate) became_streams: Option<TaskFn>,

    // WebSocket
    pub(crate) websocket_open: Option<WebSocketOpenFn>,
    pub(crate) websocket_close: Option<WebSocketCloseFn>,
}

impl Delegate {
    pub fn builder() -> DelegateBuilder {
        DelegateBuilder::default()
    }

    /// Whether this delegate has a handler for `callback`.
    pub fn responds_to(&self, callback: Callback) -> bool {
        match callback {
            Callback::SessionDidBecomeInvalid => self.invalidated.is_some(),
            Callback::SessionDidReceiveChallenge => self.session_challenge.is_some(),
            Callback::DidCreateTask => self.task_created.is_some(),
            Callback::WillBeginDelayedRequest => self.delayed_request.is_some(),
            Callback::TaskIsWaitingForConnectivity => self.waiting_for_connectivity.is_some(),
            Callback::WillPerformHttpRedirection => self.redirect.is_some(),
            Callback::TaskDidReceiveChallenge => self.task_challenge.is_some(),
            Callback::NeedNewBodyStream => self.need_body_stream.is_some(),
            Callback::DidSendBodyData => self.body_sent.is_some(),
            Callback::DidFinishCollectingMetrics => self.metrics.is_some(),
            Callback::DidComplete => self.complete.is_some(),
            Callback::DidReceiveResponse => self.response.is_some(),
            Callback::DidReceiveData => self.data.is_some(),
            Callback::WillCacheResponse => self.will_cache.is_some(),
            Callback::DidWriteData => self.download_progress.is_some(),
            Callback::DidResumeAtOffset => self.download_resumed.is_some(),
            Callback::DidFinishDownloading => self.download_finished.is_some(),
            Callback::ReadClosed => self.read_closed.is_some(),
            Callback::WriteClosed => self.write_closed.is_some(),
            Callback::BetterRouteDiscovered => self.better_route.is_some(),
            Callback::DidBecomeStreams => self.became_streams.is_some(),
            Callback::WebSocketDidOpen => self.websocket_open.is_some(),
            Callback::WebSocketDidClose => self.websocket_close.is_some(),
        }
    }

    /// Whether any callback of `capability` is implemented.
    pub fn implements(&self, capability: Capability) -> bool {
        Callback::ALL
            .iter()
            .any(|cb| cb.capability() == capability && self.responds_to(*cb))
    }

    /// The download-finished handler, for a delegate already probed for it.
    pub(crate) fn download_finished_handler(&self) -> Result<&DownloadFinishedFn, DelegateError> {
        self.download_finished
            .as_ref()
            .ok_or(DelegateError::ContractViolation(Callback::DidFinishDownloading))
    }
}

impl std::fmt::Debug for Delegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let implemented: Vec<_> =
            Callback::ALL.iter().filter(|cb| self.responds_to(**cb)).collect();
        f.debug_struct("Delegate").field("implements", &implemented).finish()
    }
}

/// Builder for a [`Delegate`].
#[derive(Default)]
pub struct DelegateBuilder {
    inner: Delegate,
}

impl DelegateBuilder {
    pub fn on_invalidated<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<NetError>) + Send + Sync + 'static,
    {
        self.inner.invalidated = Some(Arc::new(f));
        self
    }

    /// Session-level challenges. Whether the session-wide delegate sets this
    /// changes how engines route challenges, see
    /// [`Callback::SessionDidReceiveChallenge`].
    pub fn on_session_challenge<F>(mut self, f: F) -> Self
    where
        F: Fn(&AuthChallenge, Completion<ChallengeDisposition>) + Send + Sync + 'static,
    {
        self.inner.session_challenge = Some(Arc::new(f));
        self
    }

    pub fn on_task_created<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskHandle) + Send + Sync + 'static,
    {
        self.inner.task_created = Some(Arc::new(f));
        self
    }

    pub fn on_delayed_request<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskHandle, Request, Completion<DelayedRequestDisposition>) + Send + Sync + 'static,
    {
        self.inner.delayed_request = Some(Arc::new(f));
        self
    }

    pub fn on_waiting_for_connectivity<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskHandle) + Send + Sync + 'static,
    {
        self.inner.waiting_for_connectivity = Some(Arc::new(f));
        self
    }

    /// Decide whether to follow a redirect: call the completion with the
    /// (possibly rewritten) request, or `None` to stop at the 3xx response.
    pub fn on_redirect<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskHandle, &ResponseMeta, Request, Completion<Option<Request>>)
            + Send
            + Sync
            + 'static,
    {
        self.inner.redirect = Some(Arc::new(f));
        self
    }

    pub fn on_task_challenge<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskHandle, &AuthChallenge, Completion<ChallengeDisposition>)
            + Send
            + Sync
            + 'static,
    {
        self.inner.task_challenge = Some(Arc::new(f));
        self
    }

    pub fn on_need_body_stream<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskHandle, Completion<Option<RequestBody>>) + Send + Sync + 'static,
    {
        self.inner.need_body_stream = Some(Arc::new(f));
        self
    }

    pub fn on_body_sent<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskHandle, TransferProgress) + Send + Sync + 'static,
    {
        self.inner.body_sent = Some(Arc::new(f));
        self
    }

    pub fn on_metrics<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskHandle, &TaskMetrics) + Send + Sync + 'static,
    {
        self.inner.metrics = Some(Arc::new(f));
        self
    }

    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskHandle, Option<NetError>) + Send + Sync + 'static,
    {
        self.inner.complete = Some(Arc::new(f));
        self
    }

    pub fn on_response<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskHandle, &ResponseMeta, Completion<ResponseDisposition>)
            + Send
            + Sync
            + 'static,
    {
        self.inner.response = Some(Arc::new(f));
        self
    }

    pub fn on_data<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskHandle, &Bytes) + Send + Sync + 'static,
    {
        self.inner.data = Some(Arc::new(f));
        self
    }

    pub fn on_will_cache<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskHandle, CachedResponse, Completion<Option<CachedResponse>>)
            + Send
            + Sync
            + 'static,
    {
        self.inner.will_cache = Some(Arc::new(f));
        self
    }

    pub fn on_download_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskHandle, TransferProgress) + Send + Sync + 'static,
    {
        self.inner.download_progress = Some(Arc::new(f));
        self
    }

    pub fn on_download_resumed<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskHandle, u64, Option<u64>) + Send + Sync + 'static,
    {
        self.inner.download_resumed = Some(Arc::new(f));
        self
    }

    pub fn on_download_finished<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskHandle, &Path) + Send + Sync + 'static,
    {
        self.inner.download_finished = Some(Arc::new(f));
        self
    }

    pub fn on_read_closed<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskHandle) + Send + Sync + 'static,
    {
        self.inner.read_closed = Some(Arc::new(f));
        self
    }

    pub fn on_write_closed<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskHandle) + Send + Sync + 'static,
    {
        self.inner.write_closed = Some(Arc::new(f));
        self
    }

    pub fn on_better_route<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskHandle) + Send + Sync + 'static,
    {
        self.inner.better_route = Some(Arc::new(f));
        self
    }

    /// The task was converted into a raw read/write stream pair.
    pub fn on_became_streams<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskHandle) + Send + Sync + 'static,
    {
        self.inner.became_streams = Some(Arc::new(f));
        self
    }

    pub fn on_websocket_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskHandle, Option<&str>) + Send + Sync + 'static,
    {
        self.inner.websocket_open = Some(Arc::new(f));
        self
    }

    pub fn on_websocket_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskHandle, u16, Option<&[u8]>) + Send + Sync + 'static,
    {
        self.inner.websocket_close = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Delegate {
        self.inner
    }
}
