//! Reference engine over hyper-util's pooled HTTP/1.1 client.
//!
//! Each task is driven by one tokio task spawned on first `resume`. The
//! driver reports everything through [`SessionEvents`] and awaits each
//! completion-style decision before moving on, so a slow delegate stalls
//! only its own task.
//!
//! Only `http://` URLs are supported; TLS lives in other engines.

use crate::base::context::TransportResultExt;
use crate::base::neterror::NetError;
use crate::base::taskstate::TaskState;
use crate::delegate::Callback;
use crate::engine::{
    Completion, DelayedRequestDisposition, Engine, EngineTask, ResponseDisposition,
    SessionEvents, TransferProgress,
};
use crate::http::{
    AuthChallenge, CachedResponse, ChallengeDisposition, ProtectionSpace, Request, ResponseMeta,
    TaskMetrics,
};
use crate::session::SessionConfig;
use crate::task::{TaskHandle, TaskId};
use bytes::{Bytes, BytesMut};
use http::header::{AUTHORIZATION, LOCATION, USER_AGENT, WWW_AUTHENTICATE};
use http::{HeaderValue, Method, StatusCode};
use http_body::Body as _;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Instant;
use tokio::sync::Notify;

/// Authentication challenges answered per task before the 401 is final.
const MAX_AUTH_ATTEMPTS: u32 = 3;

/// Bodies larger than this are not proposed for caching.
const MAX_CACHEABLE_BYTES: usize = 1024 * 1024;

type HttpClient = Client<HttpConnector, Full<Bytes>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Engine backed by `hyper_util::client::legacy::Client`.
pub struct HyperEngine {
    client: HttpClient,
    config: Arc<SessionConfig>,
    next_id: AtomicU64,
}

impl HyperEngine {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client, config: Arc::new(config), next_id: AtomicU64::new(1) }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl Default for HyperEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for HyperEngine {
    fn create_task(
        &self,
        request: Request,
        events: Arc<dyn SessionEvents>,
    ) -> Arc<dyn EngineTask> {
        let id = TaskId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let control = Arc::new(TaskControl::default());

        let task = Arc::new_cyclic(|weak: &Weak<HyperTask>| {
            let weak: Weak<dyn EngineTask> = weak.clone();
            let driver = Driver {
                handle: TaskHandle::from_weak(id, weak),
                request: request.clone(),
                client: self.client.clone(),
                config: self.config.clone(),
                events,
                control: control.clone(),
                metrics: TaskMetrics {
                    fetch_start: Instant::now(),
                    response_start: None,
                    response_end: Instant::now(),
                    redirect_count: 0,
                    request_body_bytes_sent: 0,
                    response_body_bytes_received: 0,
                },
            };
            HyperTask { id, request, control, pending: Mutex::new(Some(driver)) }
        });
        tracing::trace!(task_id = %id, "task created");
        task
    }
}

/// State shared between a [`HyperTask`] and its driver.
#[derive(Default)]
struct TaskControl {
    state: Mutex<TaskState>,
    resumed: Notify,
    cancelled: AtomicBool,
    cancel: Notify,
}

impl TaskControl {
    fn state(&self) -> TaskState {
        *lock(&self.state)
    }

    fn set_state(&self, state: TaskState) {
        let mut current = lock(&self.state);
        if !current.is_terminal() {
            *current = state;
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    async fn wait_while_suspended(&self) {
        loop {
            let notified = self.resumed.notified();
            if self.state() != TaskState::Suspended {
                return;
            }
            notified.await;
        }
    }

    async fn cancelled(&self) {
        loop {
            let notified = self.cancel.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// A task created by [`HyperEngine`].
///
/// Dropping the last strong reference cancels the task.
pub struct HyperTask {
    id: TaskId,
    request: Request,
    control: Arc<TaskControl>,
    pending: Mutex<Option<Driver>>,
}

impl HyperTask {
    /// Spawn the driver if it has not been started yet.
    fn start(&self) {
        let Some(driver) = lock(&self.pending).take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(driver.run());
            }
            Err(_) => {
                tracing::error!(task_id = %self.id, "no tokio runtime, task cannot run");
                driver.fail(NetError::Failed);
            }
        }
    }
}

impl EngineTask for HyperTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn original_request(&self) -> &Request {
        &self.request
    }

    fn state(&self) -> TaskState {
        self.control.state()
    }

    fn resume(&self) {
        if self.control.state() == TaskState::Suspended {
            self.control.set_state(TaskState::Running);
            self.control.resumed.notify_waiters();
        }
        self.start();
    }

    fn suspend(&self) {
        if self.control.state() == TaskState::Running {
            self.control.set_state(TaskState::Suspended);
        }
    }

    fn cancel(&self) {
        if self.control.state().is_terminal() || self.control.is_cancelled() {
            return;
        }
        tracing::debug!(task_id = %self.id, "cancel requested");
        self.control.set_state(TaskState::Canceling);
        self.control.cancelled.store(true, Ordering::Release);
        self.control.cancel.notify_waiters();
        self.control.resumed.notify_waiters();
        // A cancelled task still completes, even if it never ran.
        self.start();
    }
}

impl Drop for HyperTask {
    fn drop(&mut self) {
        if !self.control.state().is_terminal() {
            self.cancel();
        }
    }
}

impl std::fmt::Debug for HyperTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTask")
            .field("id", &self.id)
            .field("url", &self.request.url().as_str())
            .field("state", &self.control.state())
            .finish()
    }
}

/// Everything one running task needs. Holds the task only weakly.
struct Driver {
    handle: TaskHandle,
    request: Request,
    client: HttpClient,
    config: Arc<SessionConfig>,
    events: Arc<dyn SessionEvents>,
    control: Arc<TaskControl>,
    metrics: TaskMetrics,
}

impl Driver {
    async fn run(mut self) {
        self.events.did_create_task(&self.handle);
        self.metrics.fetch_start = Instant::now();

        let control = self.control.clone();
        let timeout = self.config.timeout;
        let result = tokio::select! {
            // Cancellation first: a task cancelled before it runs never sends.
            biased;
            _ = control.cancelled() => Err(NetError::Aborted),
            result = async {
                match timeout {
                    Some(limit) => tokio::time::timeout(limit, self.drive())
                        .await
                        .unwrap_or(Err(NetError::ConnectionTimedOut)),
                    None => self.drive().await,
                }
            } => result,
        };

        self.metrics.response_end = Instant::now();
        self.events.did_finish_collecting_metrics(&self.handle, &self.metrics);
        self.finish(result.err());
    }

    /// Complete without ever running.
    fn fail(self, error: NetError) {
        self.finish(Some(error));
    }

    fn finish(&self, error: Option<NetError>) {
        self.control.set_state(TaskState::Completed);
        self.events.did_complete(&self.handle, error);
    }

    async fn drive(&mut self) -> Result<(), NetError> {
        let mut request = self.request.clone();

        if let Some(delay) = self.config.begin_delay {
            tokio::time::sleep(delay).await;
            request = self.delayed_request(request).await?;
        }

        let mut auth_failures = 0u32;
        loop {
            self.control.wait_while_suspended().await;
            let response = self.send(&request).await?;
            let (parts, body) = response.into_parts();
            let meta = ResponseMeta::from_parts(&parts, request.url().clone());

            if let Some(next) = self.redirect_target(&request, &meta)? {
                let (completion, decision) =
                    Completion::channel(Callback::WillPerformHttpRedirection);
                self.events.will_perform_http_redirection(
                    &self.handle,
                    &meta,
                    next.clone(),
                    completion,
                );
                if let Some(next) = decision.resolve_or(Some(next)).await {
                    self.metrics.redirect_count += 1;
                    request = next;
                    continue;
                }
                // Redirect refused: the 3xx is the final response.
            } else if meta.status() == StatusCode::UNAUTHORIZED
                && auth_failures < MAX_AUTH_ATTEMPTS
            {
                if let Some(challenge) = challenge_for(&request, &meta, auth_failures) {
                    match self.challenge(challenge).await {
                        ChallengeDisposition::UseCredential(credential) => {
                            let value = HeaderValue::from_str(&credential.to_basic_header_value())
                                .map_err(|_| NetError::InvalidAuthCredentials)?;
                            request.headers_mut().insert(AUTHORIZATION, value);
                            auth_failures += 1;
                            continue;
                        }
                        ChallengeDisposition::CancelAuthenticationChallenge => {
                            return Err(NetError::Aborted);
                        }
                        ChallengeDisposition::PerformDefaultHandling
                        | ChallengeDisposition::RejectProtectionSpace => {}
                    }
                }
            }

            return self.deliver(&request, meta, body).await;
        }
    }

    async fn delayed_request(&self, request: Request) -> Result<Request, NetError> {
        let (completion, decision) = Completion::channel(Callback::WillBeginDelayedRequest);
        self.events.will_begin_delayed_request(&self.handle, request.clone(), completion);
        match decision.resolve_or(DelayedRequestDisposition::ContinueLoading).await {
            DelayedRequestDisposition::ContinueLoading => Ok(request),
            DelayedRequestDisposition::UseNewRequest(replacement) => Ok(replacement),
            DelayedRequestDisposition::Cancel => Err(NetError::Aborted),
        }
    }

    /// Route a 401 to the session delegate if it handles challenges, else to
    /// the task.
    async fn challenge(&self, challenge: AuthChallenge) -> ChallengeDisposition {
        let session_level = self.events.responds_to(Callback::SessionDidReceiveChallenge);
        let callback = if session_level {
            Callback::SessionDidReceiveChallenge
        } else {
            Callback::TaskDidReceiveChallenge
        };
        tracing::debug!(task_id = %self.handle.id(), ?callback, "authentication challenge");

        let (completion, decision) = Completion::channel(callback);
        if session_level {
            self.events.did_receive_session_challenge(challenge, completion);
        } else {
            self.events.did_receive_challenge(&self.handle, challenge, completion);
        }
        decision.resolve_or(ChallengeDisposition::PerformDefaultHandling).await
    }

    /// The follow-up request for a 3xx with a usable `Location`.
    fn redirect_target(
        &self,
        request: &Request,
        meta: &ResponseMeta,
    ) -> Result<Option<Request>, NetError> {
        let status = meta.status();
        if !status.is_redirection() || status == StatusCode::NOT_MODIFIED {
            return Ok(None);
        }
        let Some(location) = meta.header(LOCATION.as_str()) else {
            return Ok(None);
        };
        if self.metrics.redirect_count >= u32::from(self.config.max_redirects) {
            return Err(NetError::TooManyRedirects);
        }
        let target = request.url().join(location).map_err(|_| NetError::InvalidRedirect)?;
        if target.scheme() != "http" {
            return Err(NetError::UnsafeRedirect);
        }
        Ok(Some(request.redirected(status, target)))
    }

    async fn send(&mut self, request: &Request) -> Result<http::Response<Incoming>, NetError> {
        let url = request.url();
        if url.scheme() != "http" {
            return Err(NetError::DisallowedUrlScheme);
        }
        let uri: http::Uri = url.as_str().parse().map_err(|_| NetError::InvalidUrl)?;

        let body = request.body().to_bytes();
        let body_len = body.len() as u64;
        let mut outgoing = http::Request::new(Full::new(body));
        *outgoing.method_mut() = request.method().clone();
        *outgoing.uri_mut() = uri;

        let headers = outgoing.headers_mut();
        *headers = request.headers().clone();
        for (name, value) in &self.config.default_headers {
            if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
        if !headers.contains_key(USER_AGENT) {
            if let Ok(agent) = HeaderValue::from_str(&self.config.user_agent) {
                headers.insert(USER_AGENT, agent);
            }
        }

        tracing::debug!(
            task_id = %self.handle.id(),
            method = %request.method(),
            url = %url,
            "sending request"
        );
        let response = self.client.request(outgoing).await.transport_context(url)?;
        self.metrics.response_start.get_or_insert_with(Instant::now);

        if body_len > 0 {
            self.metrics.request_body_bytes_sent += body_len;
            self.events.did_send_body_data(
                &self.handle,
                TransferProgress {
                    bytes: body_len,
                    total_bytes: self.metrics.request_body_bytes_sent,
                    total_expected: Some(body_len),
                },
            );
        }
        Ok(response)
    }

    /// Hand over the final response head, then stream the body.
    async fn deliver(
        &mut self,
        request: &Request,
        meta: ResponseMeta,
        mut body: Incoming,
    ) -> Result<(), NetError> {
        let (completion, decision) = Completion::channel(Callback::DidReceiveResponse);
        self.events.did_receive_response(&self.handle, meta.clone(), completion);
        if decision.resolve_or(ResponseDisposition::Allow).await == ResponseDisposition::Cancel {
            tracing::debug!(task_id = %self.handle.id(), "response refused by delegate");
            return Err(NetError::Aborted);
        }

        tracing::trace!(
            task_id = %self.handle.id(),
            expected = ?body.size_hint().exact(),
            "reading body"
        );
        let cacheable = request.method() == Method::GET && meta.status() == StatusCode::OK;
        let mut cached = cacheable.then(BytesMut::new);

        while let Some(frame) = body.frame().await {
            let frame = frame.transport_context(request.url())?;
            let Ok(data) = frame.into_data() else {
                continue;
            };
            if data.is_empty() {
                continue;
            }
            self.control.wait_while_suspended().await;

            self.metrics.response_body_bytes_received += data.len() as u64;
            if let Some(buf) = cached.as_mut() {
                if buf.len() + data.len() <= MAX_CACHEABLE_BYTES {
                    buf.extend_from_slice(&data);
                } else {
                    cached = None;
                }
            }
            self.events.did_receive_data(&self.handle, data).await;
        }

        if let Some(data) = cached {
            let proposed = CachedResponse { response: meta, data: data.freeze() };
            let (completion, decision) = Completion::channel(Callback::WillCacheResponse);
            self.events.will_cache_response(&self.handle, proposed, completion);
            let stored = decision.resolve_or(None).await.is_some();
            tracing::trace!(task_id = %self.handle.id(), stored, "cache decision");
        }
        Ok(())
    }
}

fn challenge_for(
    request: &Request,
    meta: &ResponseMeta,
    previous_failure_count: u32,
) -> Option<AuthChallenge> {
    let value = meta.header(WWW_AUTHENTICATE.as_str())?;
    let url = request.url();
    let space = ProtectionSpace::from_header(
        url.host_str().unwrap_or_default(),
        url.port_or_known_default().unwrap_or(80),
        value,
    );
    Some(AuthChallenge { protection_space: space, previous_failure_count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::{Delegate, DelegateMultiplexer};
    use crate::task::TaskRegistry;

    fn events() -> Arc<dyn SessionEvents> {
        Arc::new(DelegateMultiplexer::new(TaskRegistry::new(), None))
    }

    #[tokio::test]
    async fn test_task_starts_suspended() {
        let engine = HyperEngine::new();
        let task = engine.create_task(Request::get("http://127.0.0.1:1/").unwrap(), events());
        assert_eq!(task.state(), TaskState::Suspended);
        assert_eq!(task.original_request().url().port(), Some(1));
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let engine = HyperEngine::new();
        let a = engine.create_task(Request::get("http://localhost/").unwrap(), events());
        let b = engine.create_task(Request::get("http://localhost/").unwrap(), events());
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_cancel_before_resume_completes() {
        let registry = TaskRegistry::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let global = Delegate::builder()
            .on_complete(move |_, error| {
                if let Some(tx) = lock(&tx).take() {
                    let _ = tx.send(error);
                }
            })
            .build();
        let events = Arc::new(DelegateMultiplexer::new(registry, Some(Arc::new(global))));

        let engine = HyperEngine::new();
        let task = engine.create_task(Request::get("http://localhost/").unwrap(), events);
        task.cancel();

        assert_eq!(rx.await.unwrap(), Some(NetError::Aborted));
        assert_eq!(task.state(), TaskState::Completed);
    }

    #[test]
    fn test_challenge_for_basic() {
        let request = Request::get("http://example.com:8080/private").unwrap();
        let mut headers = http::HeaderMap::new();
        headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Basic realm=\"vault\""));
        let meta = ResponseMeta::new(
            StatusCode::UNAUTHORIZED,
            http::Version::HTTP_11,
            headers,
            request.url().clone(),
        );

        let challenge = challenge_for(&request, &meta, 2).unwrap();
        assert_eq!(challenge.previous_failure_count, 2);
        assert_eq!(challenge.protection_space.port, 8080);
        assert_eq!(challenge.protection_space.realm.as_deref(), Some("vault"));
    }

    #[test]
    fn test_no_challenge_without_header() {
        let request = Request::get("http://example.com/").unwrap();
        let meta = ResponseMeta::new(
            StatusCode::UNAUTHORIZED,
            http::Version::HTTP_11,
            http::HeaderMap::new(),
            request.url().clone(),
        );
        assert!(challenge_for(&request, &meta, 0).is_none());
    }
}
