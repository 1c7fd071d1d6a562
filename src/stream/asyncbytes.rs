//! Consumer side: a single-pass async sequence of response body bytes.

use crate::base::neterror::NetError;
use crate::engine::EngineTask;
use crate::task::TaskId;
use bytes::{Buf, Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tokio::sync::{mpsc, oneshot};

enum ByteSource {
    /// Fed by engine callbacks through a [`StreamProducer`](super::StreamProducer).
    Bridged {
        chunks: mpsc::Receiver<Bytes>,
        terminal: oneshot::Receiver<Result<(), NetError>>,
    },
    /// An engine's own async body stream, passed through.
    Native(BoxStream<'static, Result<Bytes, NetError>>),
}

/// Response body as an async sequence of bytes.
///
/// Both construction paths honour the same contract:
/// - bytes arrive in the order the engine produced them;
/// - a failed task yields its error on the pull after the last queued byte;
/// - once the sequence has ended (or failed) every further pull yields `None`.
///
/// Holding an `AsyncBytes` keeps its task reachable. Dropping it releases
/// the task; [`HyperEngine`](crate::engine::hyperengine::HyperEngine)
/// cancels released tasks, other engines may let them run to completion.
pub struct AsyncBytes {
    source: ByteSource,
    current: Bytes,
    finished: bool,
    task: Option<Arc<dyn EngineTask>>,
}

impl AsyncBytes {
    pub(crate) fn bridged(
        task: Arc<dyn EngineTask>,
        chunks: mpsc::Receiver<Bytes>,
        terminal: oneshot::Receiver<Result<(), NetError>>,
    ) -> Self {
        Self {
            source: ByteSource::Bridged { chunks, terminal },
            current: Bytes::new(),
            finished: false,
            task: Some(task),
        }
    }

    /// Wrap a native body stream.
    pub fn native(body: BoxStream<'static, Result<Bytes, NetError>>) -> Self {
        Self {
            source: ByteSource::Native(body),
            current: Bytes::new(),
            finished: false,
            task: None,
        }
    }

    /// Id of the backing task, if this sequence was bridged from one.
    pub fn task_id(&self) -> Option<TaskId> {
        self.task.as_ref().map(|t| t.id())
    }

    /// Cancel the backing task. The sequence then ends with
    /// [`NetError::Aborted`] once the engine reports completion.
    pub fn cancel(&self) {
        if let Some(task) = &self.task {
            task.cancel();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished && self.current.is_empty()
    }

    /// Next byte, `Ok(None)` at the end of the sequence.
    pub async fn next_byte(&mut self) -> Result<Option<u8>, NetError> {
        self.next().await.transpose()
    }

    /// Next run of bytes as delivered by the engine.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, NetError> {
        futures::future::poll_fn(|cx| self.poll_next_chunk(cx)).await.transpose()
    }

    /// Read the rest of the body.
    pub async fn bytes(mut self) -> Result<Bytes, NetError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }

    /// Read the rest of the body as UTF-8.
    pub async fn text(self) -> Result<String, NetError> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|_| NetError::InvalidUtf8)
    }

    /// Read the rest of the body as JSON.
    #[cfg(feature = "json")]
    pub async fn json<T: serde::de::DeserializeOwned>(self) -> Result<T, NetError> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|_| NetError::JsonParseError)
    }

    fn poll_next_chunk(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Bytes, NetError>>> {
        if !self.current.is_empty() {
            return Poll::Ready(Some(Ok(std::mem::take(&mut self.current))));
        }
        self.poll_source(cx)
    }

    fn poll_source(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Bytes, NetError>>> {
        if self.finished {
            return Poll::Ready(None);
        }
        loop {
            let item = match &mut self.source {
                ByteSource::Bridged { chunks, terminal } => match ready!(chunks.poll_recv(cx)) {
                    Some(chunk) => Some(Ok(chunk)),
                    None => match ready!(Pin::new(terminal).poll(cx)) {
                        Ok(Ok(())) => None,
                        Ok(Err(e)) => Some(Err(e)),
                        // Producer dropped without finishing.
                        Err(_) => Some(Err(NetError::Aborted)),
                    },
                },
                ByteSource::Native(body) => ready!(body.poll_next_unpin(cx)),
            };
            match item {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => return Poll::Ready(Some(Ok(chunk))),
                Some(Err(e)) => {
                    self.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    self.finished = true;
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl Stream for AsyncBytes {
    type Item = Result<u8, NetError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.current.has_remaining() {
                return Poll::Ready(Some(Ok(this.current.get_u8())));
            }
            match ready!(this.poll_source(cx)) {
                Some(Ok(chunk)) => this.current = chunk,
                Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                None => return Poll::Ready(None),
            }
        }
    }
}

impl std::fmt::Debug for AsyncBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match &self.source {
            ByteSource::Bridged { .. } => "bridged",
            ByteSource::Native(_) => "native",
        };
        f.debug_struct("AsyncBytes")
            .field("source", &source)
            .field("task_id", &self.task_id())
            .field("buffered", &self.current.len())
            .field("finished", &self.finished)
            .finish()
    }
}
