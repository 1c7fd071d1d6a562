//! Fans engine callbacks out to per-task and session-wide delegates.
//!
//! Every callback resolves in three tiers: the task's own delegate, then
//! the global delegate, then a fixed default. Completion-style callbacks
//! stop at the first tier that implements them; notification-style
//! callbacks reach every tier that implements them, per-task first.
//!
//! Streaming-bytes tasks are special. Their response head goes only to the
//! stream bridge, their body is pushed into the stream before anyone else
//! sees it, and their per-task delegate receives neither.

use crate::base::neterror::NetError;
use crate::delegate::callback::Callback;
use crate::delegate::handlers::{Delegate, TaskFn};
use crate::engine::{
    Completion, DelayedRequestDisposition, Delivering, ResponseDisposition, SessionEvents,
    TransferProgress,
};
use crate::http::{
    AuthChallenge, CachedResponse, ChallengeDisposition, Request, RequestBody, ResponseMeta,
    TaskMetrics,
};
use crate::task::{TaskHandle, TaskHandlerRecord, TaskRegistry};
use bytes::Bytes;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The events sink every engine task reports to.
pub struct DelegateMultiplexer {
    registry: TaskRegistry,
    global: Option<Arc<Delegate>>,
    invalidating: AtomicBool,
    invalidated: AtomicBool,
}

impl DelegateMultiplexer {
    pub fn new(registry: TaskRegistry, global: Option<Arc<Delegate>>) -> Self {
        Self {
            registry,
            global,
            invalidating: AtomicBool::new(false),
            invalidated: AtomicBool::new(false),
        }
    }

    /// Deliver `did_become_invalid` once the last registered task has
    /// completed, or straight away if none is in flight.
    ///
    /// Records of tasks that are already gone can never complete, so they
    /// are dropped here.
    pub fn invalidate_when_drained(&self) {
        for handle in self.registry.handles() {
            if !handle.is_alive() {
                self.registry.remove(handle.id());
            }
        }
        self.invalidating.store(true, Ordering::SeqCst);
        self.invalidate_if_drained();
    }

    fn invalidate_if_drained(&self) {
        if self.invalidating.load(Ordering::SeqCst)
            && self.registry.is_empty()
            && !self.invalidated.swap(true, Ordering::SeqCst)
        {
            self.did_become_invalid(None);
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn global(&self) -> Option<&Arc<Delegate>> {
        self.global.as_ref()
    }

    fn record(&self, task: &TaskHandle) -> Option<TaskHandlerRecord> {
        self.registry.lookup(task.id())
    }

    /// First delegate that implements `callback`: per-task, then global.
    fn first_responder<'a>(
        &'a self,
        record: Option<&'a TaskHandlerRecord>,
        callback: Callback,
    ) -> Option<&'a Arc<Delegate>> {
        record
            .and_then(|r| r.delegate())
            .filter(|d| d.responds_to(callback))
            .or_else(|| self.global.as_ref().filter(|d| d.responds_to(callback)))
    }

    /// Every delegate that implements `callback`, per-task first.
    fn responders<'a>(
        &'a self,
        record: Option<&'a TaskHandlerRecord>,
        callback: Callback,
    ) -> impl Iterator<Item = &'a Arc<Delegate>> + 'a {
        record
            .and_then(|r| r.delegate())
            .into_iter()
            .chain(self.global.as_ref())
            .filter(move |d| d.responds_to(callback))
    }

    fn notify_task(
        &self,
        task: &TaskHandle,
        callback: Callback,
        pick: fn(&Delegate) -> Option<&TaskFn>,
    ) {
        let record = self.record(task);
        for delegate in self.responders(record.as_ref(), callback) {
            if let Some(f) = pick(delegate) {
                f(task);
            }
        }
    }
}

impl SessionEvents for DelegateMultiplexer {
    fn responds_to(&self, callback: Callback) -> bool {
        match callback {
            // Engines route challenges differently depending on this answer,
            // so it must match the global delegate exactly.
            Callback::SessionDidReceiveChallenge => self
                .global
                .as_ref()
                .is_some_and(|d| d.responds_to(Callback::SessionDidReceiveChallenge)),
            _ => true,
        }
    }

    fn did_become_invalid(&self, error: Option<NetError>) {
        tracing::debug!(error = ?error, "session invalidated");
        if let Some(f) = self.global.as_ref().and_then(|d| d.invalidated.as_ref()) {
            f(error);
        }
    }

    fn did_receive_session_challenge(
        &self,
        challenge: AuthChallenge,
        completion: Completion<ChallengeDisposition>,
    ) {
        match self.global.as_ref().and_then(|d| d.session_challenge.as_ref()) {
            Some(f) => f(&challenge, completion),
            None => completion.call(ChallengeDisposition::PerformDefaultHandling),
        }
    }

    fn did_create_task(&self, task: &TaskHandle) {
        tracing::debug!(task_id = %task.id(), "task created");
        self.notify_task(task, Callback::DidCreateTask, |d| d.task_created.as_ref());
    }

    fn will_begin_delayed_request(
        &self,
        task: &TaskHandle,
        request: Request,
        completion: Completion<DelayedRequestDisposition>,
    ) {
        let record = self.record(task);
        match self
            .first_responder(record.as_ref(), Callback::WillBeginDelayedRequest)
            .and_then(|d| d.delayed_request.as_ref())
        {
            Some(f) => f(task, request, completion),
            None => completion.call(DelayedRequestDisposition::ContinueLoading),
        }
    }

    fn task_is_waiting_for_connectivity(&self, task: &TaskHandle) {
        self.notify_task(task, Callback::TaskIsWaitingForConnectivity, |d| {
            d.waiting_for_connectivity.as_ref()
        });
    }

    fn will_perform_http_redirection(
        &self,
        task: &TaskHandle,
        response: &ResponseMeta,
        request: Request,
        completion: Completion<Option<Request>>,
    ) {
        tracing::debug!(
            task_id = %task.id(),
            status = %response.status(),
            to = %request.url(),
            "redirect"
        );
        let record = self.record(task);
        match self
            .first_responder(record.as_ref(), Callback::WillPerformHttpRedirection)
            .and_then(|d| d.redirect.as_ref())
        {
            Some(f) => f(task, response, request, completion),
            None => completion.call(Some(request)),
        }
    }

    fn did_receive_challenge(
        &self,
        task: &TaskHandle,
        challenge: AuthChallenge,
        completion: Completion<ChallengeDisposition>,
    ) {
        let record = self.record(task);
        match self
            .first_responder(record.as_ref(), Callback::TaskDidReceiveChallenge)
            .and_then(|d| d.task_challenge.as_ref())
        {
            Some(f) => f(task, &challenge, completion),
            None => completion.call(ChallengeDisposition::PerformDefaultHandling),
        }
    }

    fn need_new_body_stream(&self, task: &TaskHandle, completion: Completion<Option<RequestBody>>) {
        let record = self.record(task);
        match self
            .first_responder(record.as_ref(), Callback::NeedNewBodyStream)
            .and_then(|d| d.need_body_stream.as_ref())
        {
            Some(f) => f(task, completion),
            None => completion.call(None),
        }
    }

    fn did_send_body_data(&self, task: &TaskHandle, progress: TransferProgress) {
        let record = self.record(task);
        for delegate in self.responders(record.as_ref(), Callback::DidSendBodyData) {
            if let Some(f) = &delegate.body_sent {
                f(task, progress);
            }
        }
    }

    fn did_finish_collecting_metrics(&self, task: &TaskHandle, metrics: &TaskMetrics) {
        let record = self.record(task);
        for delegate in self.responders(record.as_ref(), Callback::DidFinishCollectingMetrics) {
            if let Some(f) = &delegate.metrics {
                f(task, metrics);
            }
        }
    }

    fn did_complete(&self, task: &TaskHandle, error: Option<NetError>) {
        let id = task.id();
        tracing::debug!(task_id = %id, error = ?error, "task complete");
        let record = self.record(task);

        if let Some(record) = &record {
            if let Some(producer) = record.producer() {
                producer.finish(error.map_or(Ok(()), Err));
            }
            if let Some(response) = record.response() {
                // A successful task that never produced a head is still a
                // failure from the awaiting side.
                let failure = error.unwrap_or(NetError::EmptyResponse);
                if response.deliver(Err(failure)) {
                    tracing::debug!(task_id = %id, error = %failure, "response failed");
                }
            }
        }

        for delegate in self.responders(record.as_ref(), Callback::DidComplete) {
            if let Some(f) = &delegate.complete {
                f(task, error);
            }
        }

        self.registry.remove(id);
        self.invalidate_if_drained();
    }

    fn did_receive_response(
        &self,
        task: &TaskHandle,
        response: ResponseMeta,
        completion: Completion<ResponseDisposition>,
    ) {
        tracing::debug!(task_id = %task.id(), status = %response.status(), "response received");
        let record = self.record(task);

        if let Some(record) = record.as_ref().filter(|r| r.is_streaming()) {
            if let Some(callback) = record.response() {
                callback.deliver(Ok(response));
            }
            completion.call(ResponseDisposition::Allow);
            return;
        }

        match self
            .first_responder(record.as_ref(), Callback::DidReceiveResponse)
            .and_then(|d| d.response.as_ref())
        {
            Some(f) => f(task, &response, completion),
            None => completion.call(ResponseDisposition::Allow),
        }
    }

    fn did_receive_data<'a>(&'a self, task: &'a TaskHandle, data: Bytes) -> Delivering<'a> {
        Box::pin(async move {
            let record = self.record(task);
            tracing::trace!(task_id = %task.id(), len = data.len(), "data received");

            let streaming = record.as_ref().is_some_and(|r| r.is_streaming());
            if streaming {
                if let Some(producer) = record.as_ref().and_then(|r| r.producer()) {
                    if !producer.push(data.clone()).await {
                        tracing::trace!(task_id = %task.id(), "stream consumer gone, chunk dropped");
                    }
                }
                if let Some(f) = self.global.as_ref().and_then(|d| d.data.as_ref()) {
                    f(task, &data);
                }
                return;
            }

            for delegate in self.responders(record.as_ref(), Callback::DidReceiveData) {
                if let Some(f) = &delegate.data {
                    f(task, &data);
                }
            }
        })
    }

    fn will_cache_response(
        &self,
        task: &TaskHandle,
        proposed: CachedResponse,
        completion: Completion<Option<CachedResponse>>,
    ) {
        let record = self.record(task);
        match self
            .first_responder(record.as_ref(), Callback::WillCacheResponse)
            .and_then(|d| d.will_cache.as_ref())
        {
            Some(f) => f(task, proposed, completion),
            None => completion.call(Some(proposed)),
        }
    }

    fn did_write_data(&self, task: &TaskHandle, progress: TransferProgress) {
        let record = self.record(task);
        for delegate in self.responders(record.as_ref(), Callback::DidWriteData) {
            if let Some(f) = &delegate.download_progress {
                f(task, progress);
            }
        }
    }

    fn did_resume_at_offset(&self, task: &TaskHandle, offset: u64, total_expected: Option<u64>) {
        let record = self.record(task);
        for delegate in self.responders(record.as_ref(), Callback::DidResumeAtOffset) {
            if let Some(f) = &delegate.download_resumed {
                f(task, offset, total_expected);
            }
        }
    }

    fn did_finish_downloading(&self, task: &TaskHandle, location: &Path) {
        let record = self.record(task);
        // Presence-gated: probe each tier before forwarding.
        for delegate in self.responders(record.as_ref(), Callback::DidFinishDownloading) {
            match delegate.download_finished_handler() {
                Ok(f) => f(task, location),
                Err(e) => {
                    tracing::error!(task_id = %task.id(), error = %e, "presence-gated callback misrouted");
                    debug_assert!(false, "{}", e);
                }
            }
        }
    }

    fn read_closed(&self, task: &TaskHandle) {
        self.notify_task(task, Callback::ReadClosed, |d| d.read_closed.as_ref());
    }

    fn write_closed(&self, task: &TaskHandle) {
        self.notify_task(task, Callback::WriteClosed, |d| d.write_closed.as_ref());
    }

    fn better_route_discovered(&self, task: &TaskHandle) {
        self.notify_task(task, Callback::BetterRouteDiscovered, |d| d.better_route.as_ref());
    }

    fn did_become_streams(&self, task: &TaskHandle) {
        tracing::debug!(task_id = %task.id(), "task became streams");
        self.notify_task(task, Callback::DidBecomeStreams, |d| d.became_streams.as_ref());
    }

    fn web_socket_did_open(&self, task: &TaskHandle, protocol: Option<&str>) {
        let record = self.record(task);
        for delegate in self.responders(record.as_ref(), Callback::WebSocketDidOpen) {
            if let Some(f) = &delegate.websocket_open {
                f(task, protocol);
            }
        }
    }

    fn web_socket_did_close(&self, task: &TaskHandle, code: u16, reason: Option<&[u8]>) {
        let record = self.record(task);
        for delegate in self.responders(record.as_ref(), Callback::WebSocketDidClose) {
            if let Some(f) = &delegate.websocket_close {
                f(task, code, reason);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::IdleTask;
    use crate::engine::EngineTask;
    use crate::stream;
    use crate::task::TaskId;
    use http::{HeaderMap, StatusCode, Version};
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(log: &Log) -> Vec<&'static str> {
        log.lock().unwrap().clone()
    }

    fn meta() -> ResponseMeta {
        ResponseMeta::new(
            StatusCode::OK,
            Version::HTTP_11,
            HeaderMap::new(),
            url::Url::parse("http://localhost/").unwrap(),
        )
    }

    fn setup(
        id: u64,
        per_task: Option<Delegate>,
        global: Option<Delegate>,
    ) -> (DelegateMultiplexer, Arc<dyn EngineTask>, TaskHandle) {
        let registry = TaskRegistry::new();
        let task: Arc<dyn EngineTask> = Arc::new(IdleTask::new(id));
        let handle = TaskHandle::new(&task);
        registry.register(handle.clone(), per_task.map(Arc::new), None, None);
        (DelegateMultiplexer::new(registry, global.map(Arc::new)), task, handle)
    }

    fn recording(log: &Log, tag: &'static str) -> Delegate {
        let (a, b, c) = (log.clone(), log.clone(), log.clone());
        Delegate::builder()
            .on_task_created(move |_| a.lock().unwrap().push(tag))
            .on_data(move |_, _| b.lock().unwrap().push(tag))
            .on_complete(move |_, _| c.lock().unwrap().push(tag))
            .build()
    }

    #[test]
    fn test_notification_reaches_both_tiers_in_order() {
        let log = log();
        let (mux, _task, handle) =
            setup(1, Some(recording(&log, "task")), Some(recording(&log, "global")));

        mux.did_create_task(&handle);
        assert_eq!(entries(&log), vec!["task", "global"]);
    }

    #[tokio::test]
    async fn test_data_reaches_both_tiers_for_plain_tasks() {
        let log = log();
        let (mux, _task, handle) =
            setup(1, Some(recording(&log, "task")), Some(recording(&log, "global")));

        mux.did_receive_data(&handle, Bytes::from_static(b"x")).await;
        assert_eq!(entries(&log), vec!["task", "global"]);
    }

    #[tokio::test]
    async fn test_completion_style_first_tier_wins() {
        let log = log();
        let (a, b) = (log.clone(), log.clone());
        let per_task = Delegate::builder()
            .on_redirect(move |_, _, _, done| {
                a.lock().unwrap().push("task");
                done.call(None);
            })
            .build();
        let global = Delegate::builder()
            .on_redirect(move |_, _, request, done| {
                b.lock().unwrap().push("global");
                done.call(Some(request));
            })
            .build();
        let (mux, _task, handle) = setup(1, Some(per_task), Some(global));

        let (completion, decision) = Completion::channel(Callback::WillPerformHttpRedirection);
        let next = Request::get("http://localhost/next").unwrap();
        mux.will_perform_http_redirection(&handle, &meta(), next, completion);

        assert_eq!(decision.resolve_or(None).await, None);
        assert_eq!(entries(&log), vec!["task"]);
    }

    #[tokio::test]
    async fn test_global_answers_when_task_does_not_implement() {
        let per_task = Delegate::builder().on_complete(|_, _| {}).build();
        let global = Delegate::builder()
            .on_response(|_, _, done| done.call(ResponseDisposition::Cancel))
            .build();
        let (mux, _task, handle) = setup(1, Some(per_task), Some(global));

        let (completion, decision) = Completion::channel(Callback::DidReceiveResponse);
        mux.did_receive_response(&handle, meta(), completion);
        assert_eq!(
            decision.resolve_or(ResponseDisposition::Allow).await,
            ResponseDisposition::Cancel
        );
    }

    #[tokio::test]
    async fn test_defaults_without_delegates() {
        let (mux, _task, handle) = setup(1, None, None);
        let request = Request::get("http://localhost/next").unwrap();

        let (c, d) = Completion::channel(Callback::WillPerformHttpRedirection);
        mux.will_perform_http_redirection(&handle, &meta(), request.clone(), c);
        assert_eq!(d.now(), Some(Some(request.clone())));

        let (c, d) = Completion::channel(Callback::DidReceiveResponse);
        mux.did_receive_response(&handle, meta(), c);
        assert_eq!(d.now(), Some(ResponseDisposition::Allow));

        let proposed = CachedResponse { response: meta(), data: Bytes::from_static(b"body") };
        let (c, d) = Completion::channel(Callback::WillCacheResponse);
        mux.will_cache_response(&handle, proposed.clone(), c);
        assert_eq!(d.now(), Some(Some(proposed)));

        let (c, d) = Completion::channel(Callback::NeedNewBodyStream);
        mux.need_new_body_stream(&handle, c);
        assert_eq!(d.now(), Some(None));

        let (c, d) = Completion::channel(Callback::WillBeginDelayedRequest);
        mux.will_begin_delayed_request(&handle, request, c);
        assert_eq!(d.now(), Some(DelayedRequestDisposition::ContinueLoading));

        let challenge = AuthChallenge {
            protection_space: crate::http::ProtectionSpace::from_header(
                "localhost",
                80,
                "Basic realm=\"x\"",
            ),
            previous_failure_count: 0,
        };
        let (c, d) = Completion::channel(Callback::TaskDidReceiveChallenge);
        mux.did_receive_challenge(&handle, challenge.clone(), c);
        assert!(matches!(d.now(), Some(ChallengeDisposition::PerformDefaultHandling)));

        let (c, d) = Completion::channel(Callback::SessionDidReceiveChallenge);
        mux.did_receive_session_challenge(challenge, c);
        assert!(matches!(d.now(), Some(ChallengeDisposition::PerformDefaultHandling)));
    }

    #[test]
    fn test_session_challenge_probe_mirrors_global() {
        let (mux, _task, _handle) = setup(1, None, None);
        assert!(!mux.responds_to(Callback::SessionDidReceiveChallenge));
        assert!(mux.responds_to(Callback::TaskDidReceiveChallenge));
        assert!(mux.responds_to(Callback::DidFinishDownloading));

        let global = Delegate::builder()
            .on_session_challenge(|_, done| done.call(ChallengeDisposition::RejectProtectionSpace))
            .build();
        let (mux, _task, _handle) = setup(1, None, Some(global));
        assert!(mux.responds_to(Callback::SessionDidReceiveChallenge));
    }

    #[test]
    fn test_unknown_task_falls_back_to_global() {
        let log = log();
        let (mux, _task, _handle) = setup(1, None, Some(recording(&log, "global")));
        let stranger: Arc<dyn EngineTask> = Arc::new(IdleTask::new(99));

        mux.did_create_task(&TaskHandle::new(&stranger));
        assert_eq!(entries(&log), vec!["global"]);
    }

    #[test]
    fn test_complete_removes_record() {
        let log = log();
        let (mux, _task, handle) =
            setup(4, Some(recording(&log, "task")), Some(recording(&log, "global")));

        mux.did_complete(&handle, Some(NetError::ConnectionReset));
        assert_eq!(entries(&log), vec!["task", "global"]);
        assert!(mux.registry().lookup(TaskId::new(4)).is_none());
    }

    #[test]
    fn test_dead_task_still_completes_and_is_removed() {
        let log = log();
        let (mux, task, handle) =
            setup(5, Some(recording(&log, "task")), Some(recording(&log, "global")));
        drop(task);

        mux.did_complete(&handle, None);
        // Per-task delegate was cleared with the task; the global still hears.
        assert_eq!(entries(&log), vec!["global"]);
        assert!(mux.registry().is_empty());
    }

    #[test]
    fn test_download_finished_only_reaches_implementers() {
        let log = log();
        let a = log.clone();
        let per_task = Delegate::builder()
            .on_download_finished(move |_, _| a.lock().unwrap().push("task"))
            .build();
        let (mux, _task, handle) = setup(1, Some(per_task), Some(recording(&log, "global")));

        mux.did_finish_downloading(&handle, Path::new("/tmp/file"));
        assert_eq!(entries(&log), vec!["task"]);
    }

    #[test]
    fn test_became_streams_reaches_both_tiers() {
        let log = log();
        let (a, b) = (log.clone(), log.clone());
        let per_task = Delegate::builder()
            .on_became_streams(move |_| a.lock().unwrap().push("task"))
            .build();
        let global = Delegate::builder()
            .on_became_streams(move |_| b.lock().unwrap().push("global"))
            .build();
        let (mux, _task, handle) = setup(1, Some(per_task), Some(global));

        assert!(mux.responds_to(Callback::DidBecomeStreams));
        mux.did_become_streams(&handle);
        assert_eq!(entries(&log), vec!["task", "global"]);
    }

    #[test]
    fn test_late_task_delegate_takes_priority() {
        let global = Delegate::builder()
            .on_response(|_, _, done| done.call(ResponseDisposition::Cancel))
            .build();
        let (mux, task, handle) = setup(1, None, Some(global));

        let (c, d) = Completion::channel(Callback::DidReceiveResponse);
        mux.did_receive_response(&handle, meta(), c);
        assert_eq!(d.now(), Some(ResponseDisposition::Cancel));

        let per_task = Delegate::builder()
            .on_response(|_, _, done| done.call(ResponseDisposition::Allow))
            .build();
        mux.registry().register(TaskHandle::new(&task), Some(Arc::new(per_task)), None, None);

        let (c, d) = Completion::channel(Callback::DidReceiveResponse);
        mux.did_receive_response(&handle, meta(), c);
        assert_eq!(d.now(), Some(ResponseDisposition::Allow));
    }

    #[test]
    fn test_invalidation_waits_for_in_flight_tasks() {
        let log = log();
        let (a, b) = (log.clone(), log.clone());
        let global = Delegate::builder()
            .on_complete(move |_, _| a.lock().unwrap().push("complete"))
            .on_invalidated(move |_| b.lock().unwrap().push("invalidated"))
            .build();
        let (mux, _task, handle) = setup(1, None, Some(global));
        let gone: Arc<dyn EngineTask> = Arc::new(IdleTask::new(2));
        mux.registry().register(TaskHandle::new(&gone), None, None, None);
        drop(gone);

        mux.invalidate_when_drained();
        assert!(entries(&log).is_empty());
        assert_eq!(mux.registry().len(), 1);

        mux.did_complete(&handle, Some(NetError::Aborted));
        assert_eq!(entries(&log), vec!["complete", "invalidated"]);
    }

    mod streaming {
        use super::*;

        fn streaming_setup(
            per_task: Delegate,
            global: Option<Delegate>,
        ) -> (
            DelegateMultiplexer,
            Arc<dyn EngineTask>,
            TaskHandle,
            crate::stream::AsyncBytes,
            crate::stream::PendingResponse,
        ) {
            let registry = TaskRegistry::new();
            let task: Arc<dyn EngineTask> = Arc::new(IdleTask::new(10));
            let (producer, bytes, response, pending) = stream::bridge(task.clone(), 4);
            let handle = TaskHandle::new(&task);
            registry.register(handle.clone(), Some(Arc::new(per_task)), Some(producer), Some(response));
            let mux = DelegateMultiplexer::new(registry, global.map(Arc::new));
            (mux, task, handle, bytes, pending)
        }

        #[tokio::test]
        async fn test_response_and_data_bypass_task_delegate() {
            let log = log();
            let (a, b) = (log.clone(), log.clone());
            let per_task = Delegate::builder()
                .on_response(move |_, _, done| {
                    a.lock().unwrap().push("task-response");
                    done.call(ResponseDisposition::Cancel);
                })
                .on_data(move |_, _| b.lock().unwrap().push("task-data"))
                .build();
            let c = log.clone();
            let global = Delegate::builder()
                .on_data(move |_, _| c.lock().unwrap().push("global-data"))
                .build();
            let (mux, _task, handle, mut bytes, mut pending) =
                streaming_setup(per_task, Some(global));

            let (completion, decision) = Completion::channel(Callback::DidReceiveResponse);
            mux.did_receive_response(&handle, meta(), completion);
            assert_eq!(decision.now(), Some(ResponseDisposition::Allow));
            assert_eq!(pending.get().await, Ok(meta()));

            mux.did_receive_data(&handle, Bytes::from_static(b"hi")).await;
            assert_eq!(bytes.next_chunk().await, Ok(Some(Bytes::from_static(b"hi"))));
            assert_eq!(entries(&log), vec!["global-data"]);
        }

        #[tokio::test]
        async fn test_failure_reaches_stream_response_and_handlers() {
            let log = log();
            let (mux, _task, handle, mut bytes, mut pending) =
                streaming_setup(recording(&log, "task"), Some(recording(&log, "global")));

            mux.did_receive_data(&handle, Bytes::from_static(b"a")).await;
            mux.did_complete(&handle, Some(NetError::ConnectionReset));

            assert_eq!(pending.get().await, Err(NetError::ConnectionReset));
            assert_eq!(bytes.next_byte().await, Ok(Some(b'a')));
            assert_eq!(bytes.next_byte().await, Err(NetError::ConnectionReset));
            assert_eq!(bytes.next_byte().await, Ok(None));
            // Global sees data; both see completion, per-task first.
            assert_eq!(entries(&log), vec!["global", "task", "global"]);
            assert!(mux.registry().is_empty());
        }

        #[tokio::test]
        async fn test_success_without_head_is_empty_response() {
            let (mux, _task, handle, bytes, mut pending) =
                streaming_setup(Delegate::default(), None);

            mux.did_complete(&handle, None);
            assert_eq!(pending.get().await, Err(NetError::EmptyResponse));
            assert_eq!(bytes.bytes().await, Ok(Bytes::new()));
        }

        #[tokio::test]
        async fn test_abandoned_consumer_drops_chunks() {
            let log = log();
            let (mux, task, handle, bytes, pending) =
                streaming_setup(Delegate::default(), Some(recording(&log, "global")));
            drop(bytes);
            drop(pending);
            drop(task);

            // No consumer and no live task: the chunk goes nowhere, without blocking.
            mux.did_receive_data(&handle, Bytes::from_static(b"lost")).await;
            mux.did_complete(&handle, None);
            assert_eq!(entries(&log), vec!["global", "global"]);
            assert!(mux.registry().is_empty());
        }
    }
}
