//! One-shot delivery of response metadata.

use crate::base::neterror::NetError;
use crate::http::ResponseMeta;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{ready, Context, Poll};
use tokio::sync::oneshot;

type DeliverFn = Box<dyn FnOnce(Result<ResponseMeta, NetError>) + Send>;

/// Callback invoked at most once with the response head or the failure.
///
/// Clones share the callback; the first `deliver` wins.
#[derive(Clone)]
pub struct ResponseCallback {
    inner: Arc<Mutex<Option<DeliverFn>>>,
}

impl ResponseCallback {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Result<ResponseMeta, NetError>) + Send + 'static,
    {
        Self { inner: Arc::new(Mutex::new(Some(Box::new(f)))) }
    }

    /// Invoke the callback. Returns `false` if it already ran.
    pub fn deliver(&self, result: Result<ResponseMeta, NetError>) -> bool {
        let f = self.inner.lock().unwrap_or_else(|p| p.into_inner()).take();
        match f {
            Some(f) => {
                f(result);
                true
            }
            None => false,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).is_none()
    }
}

impl std::fmt::Debug for ResponseCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCallback")
            .field("delivered", &self.is_delivered())
            .finish()
    }
}

enum PendingState {
    Waiting(oneshot::Receiver<Result<ResponseMeta, NetError>>),
    Native(BoxFuture<'static, Result<ResponseMeta, NetError>>),
    Ready(Result<ResponseMeta, NetError>),
}

/// Deferred response metadata for a streaming-bytes request.
///
/// Resolves once, when the response head arrives or the task fails. The
/// result is cached, so [`get`](Self::get) can be called again and returns
/// the same value.
pub struct PendingResponse {
    state: PendingState,
}

impl PendingResponse {
    pub(crate) fn waiting(rx: oneshot::Receiver<Result<ResponseMeta, NetError>>) -> Self {
        Self { state: PendingState::Waiting(rx) }
    }

    pub(crate) fn native(fut: BoxFuture<'static, Result<ResponseMeta, NetError>>) -> Self {
        Self { state: PendingState::Native(fut) }
    }

    /// Wait for the response head.
    pub async fn get(&mut self) -> Result<ResponseMeta, NetError> {
        futures::future::poll_fn(|cx| self.poll_get(cx)).await
    }

    /// The result, if it has already been observed.
    pub fn try_get(&self) -> Option<&Result<ResponseMeta, NetError>> {
        match &self.state {
            PendingState::Ready(result) => Some(result),
            _ => None,
        }
    }

    fn poll_get(&mut self, cx: &mut Context<'_>) -> Poll<Result<ResponseMeta, NetError>> {
        let result = match &mut self.state {
            PendingState::Waiting(rx) => {
                // Sender gone without a result: the task was dropped.
                ready!(Pin::new(rx).poll(cx)).unwrap_or(Err(NetError::Aborted))
            }
            PendingState::Native(fut) => ready!(fut.poll_unpin(cx)),
            PendingState::Ready(result) => return Poll::Ready(result.clone()),
        };
        self.state = PendingState::Ready(result.clone());
        Poll::Ready(result)
    }
}

impl Future for PendingResponse {
    type Output = Result<ResponseMeta, NetError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().poll_get(cx)
    }
}

impl std::fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            PendingState::Waiting(_) => "waiting",
            PendingState::Native(_) => "native",
            PendingState::Ready(Ok(_)) => "ready",
            PendingState::Ready(Err(_)) => "failed",
        };
        f.debug_struct("PendingResponse").field("state", &state).finish()
    }
}
