//! The underlying client this crate sits in front of.
//!
//! An [`Engine`] creates tasks and reports everything that happens to them
//! through [`SessionEvents`]. The session hands every engine the same
//! events sink, the [`DelegateMultiplexer`](crate::delegate::DelegateMultiplexer).
//!
//! # Contract
//!
//! - Tasks start suspended. No callback for a task fires before `resume`.
//! - Callbacks for one task are serialized. Different tasks may overlap.
//! - Every resumed task ends with exactly one `did_complete`.
//! - Engines hold tasks weakly. The issuer owns the strong reference.

pub mod completion;
pub mod hyperengine;

pub use completion::{Completion, Decision};

use crate::base::neterror::NetError;
use crate::base::taskstate::TaskState;
use crate::delegate::{Callback, Delegate};
use crate::http::{
    AuthChallenge, CachedResponse, ChallengeDisposition, Request, RequestBody, ResponseMeta,
    TaskMetrics,
};
use crate::task::{TaskHandle, TaskId};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

/// How to proceed after a response head arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseDisposition {
    /// Keep loading the body.
    #[default]
    Allow,
    /// Fail the task with [`NetError::Aborted`].
    Cancel,
}

/// How to proceed with a request whose start was delayed.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DelayedRequestDisposition {
    #[default]
    ContinueLoading,
    UseNewRequest(Request),
    Cancel,
}

/// Byte counters reported by progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Bytes moved by this event.
    pub bytes: u64,
    /// Bytes moved so far.
    pub total_bytes: u64,
    /// Expected total, when known.
    pub total_expected: Option<u64>,
}

/// Alias for the future returned by [`SessionEvents::did_receive_data`].
pub type Delivering<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Response head and body from an engine with its own async byte API.
pub struct NativeBytes {
    pub response: BoxFuture<'static, Result<ResponseMeta, NetError>>,
    pub body: BoxStream<'static, Result<Bytes, NetError>>,
}

/// A task created by an engine.
pub trait EngineTask: Send + Sync {
    fn id(&self) -> TaskId;

    /// The request the task was created with, before any redirect.
    fn original_request(&self) -> &Request;

    fn state(&self) -> TaskState;

    /// Start, or continue after `suspend`.
    fn resume(&self);

    fn suspend(&self);

    /// Stop the task. It still completes, with [`NetError::Aborted`].
    fn cancel(&self);
}

/// The full callback surface of the engine.
///
/// Completion-style callbacks take a [`Completion`] which must be called
/// exactly once. Notification-style callbacks return nothing. The one
/// exception is `did_receive_data`: the engine awaits the returned future
/// before reading more, which is how consumer backpressure reaches it.
pub trait SessionEvents: Send + Sync {
    /// Whether `callback` is implemented. Engines change behaviour based on
    /// the answer for [`Callback::SessionDidReceiveChallenge`].
    fn responds_to(&self, callback: Callback) -> bool;

    // Session
    fn did_become_invalid(&self, error: Option<NetError>);
    fn did_receive_session_challenge(
        &self,
        challenge: AuthChallenge,
        completion: Completion<ChallengeDisposition>,
    );

    // Task lifecycle
    fn did_create_task(&self, task: &TaskHandle);
    fn will_begin_delayed_request(
        &self,
        task: &TaskHandle,
        request: Request,
        completion: Completion<DelayedRequestDisposition>,
    );
    fn task_is_waiting_for_connectivity(&self, task: &TaskHandle);
    fn will_perform_http_redirection(
        &self,
        task: &TaskHandle,
        response: &ResponseMeta,
        request: Request,
        completion: Completion<Option<Request>>,
    );
    fn did_receive_challenge(
        &self,
        task: &TaskHandle,
        challenge: AuthChallenge,
        completion: Completion<ChallengeDisposition>,
    );
    fn need_new_body_stream(&self, task: &TaskHandle, completion: Completion<Option<RequestBody>>);
    fn did_send_body_data(&self, task: &TaskHandle, progress: TransferProgress);
    fn did_finish_collecting_metrics(&self, task: &TaskHandle, metrics: &TaskMetrics);
    fn did_complete(&self, task: &TaskHandle, error: Option<NetError>);

    // Data
    fn did_receive_response(
        &self,
        task: &TaskHandle,
        response: ResponseMeta,
        completion: Completion<ResponseDisposition>,
    );
    fn did_receive_data<'a>(&'a self, task: &'a TaskHandle, data: Bytes) -> Delivering<'a>;
    fn will_cache_response(
        &self,
        task: &TaskHandle,
        proposed: CachedResponse,
        completion: Completion<Option<CachedResponse>>,
    );

    // Download
    fn did_write_data(&self, task: &TaskHandle, progress: TransferProgress);
    fn did_resume_at_offset(&self, task: &TaskHandle, offset: u64, total_expected: Option<u64>);
    fn did_finish_downloading(&self, task: &TaskHandle, location: &Path);

    // Stream
    fn read_closed(&self, task: &TaskHandle);
    fn write_closed(&self, task: &TaskHandle);
    fn better_route_discovered(&self, task: &TaskHandle);
    fn did_become_streams(&self, task: &TaskHandle);

    // WebSocket
    fn web_socket_did_open(&self, task: &TaskHandle, protocol: Option<&str>);
    fn web_socket_did_close(&self, task: &TaskHandle, code: u16, reason: Option<&[u8]>);
}

/// An underlying client.
pub trait Engine: Send + Sync {
    /// Create a suspended task for `request` reporting to `events`.
    fn create_task(&self, request: Request, events: Arc<dyn SessionEvents>)
        -> Arc<dyn EngineTask>;

    /// Engines with their own async byte API return it here.
    ///
    /// Native requests bypass the multiplexer entirely: they are never
    /// registered, and the session-wide delegate sees none of their
    /// callbacks. The engine is responsible for `delegate`, and for
    /// falling back to its own defaults where `delegate` does not
    /// implement a callback. An engine that must keep the session-wide
    /// tier should return `None` here and use [`Engine::create_task`].
    fn native_bytes(
        &self,
        _request: &Request,
        _delegate: Option<Arc<Delegate>>,
    ) -> Option<NativeBytes> {
        None
    }
}
