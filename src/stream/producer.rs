//! Producer side of the stream bridge, driven by engine callbacks.

use crate::base::neterror::NetError;
use bytes::Bytes;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};

struct ProducerShared {
    chunks: Mutex<Option<mpsc::Sender<Bytes>>>,
    terminal: Mutex<Option<oneshot::Sender<Result<(), NetError>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Accepts body chunks and one terminal signal for a single task.
///
/// Clones share the same channel. The chunk channel is bounded: `push`
/// waits for the consumer instead of buffering or dropping.
#[derive(Clone)]
pub struct StreamProducer {
    shared: Arc<ProducerShared>,
}

impl StreamProducer {
    pub(crate) fn new(
        chunks: mpsc::Sender<Bytes>,
        terminal: oneshot::Sender<Result<(), NetError>>,
    ) -> Self {
        Self {
            shared: Arc::new(ProducerShared {
                chunks: Mutex::new(Some(chunks)),
                terminal: Mutex::new(Some(terminal)),
            }),
        }
    }

    /// Queue `chunk`, waiting for capacity if the consumer is behind.
    ///
    /// Returns `false` if the stream is finished or the consumer is gone.
    pub async fn push(&self, chunk: Bytes) -> bool {
        if chunk.is_empty() {
            return !self.is_finished();
        }
        let Some(tx) = lock(&self.shared.chunks).clone() else {
            return false;
        };
        tx.send(chunk).await.is_ok()
    }

    /// End the stream. `Err` is surfaced to the consumer after any chunks
    /// already queued. Only the first call has an effect.
    pub fn finish(&self, result: Result<(), NetError>) {
        let terminal = lock(&self.shared.terminal).take();
        lock(&self.shared.chunks).take();
        match terminal {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => tracing::trace!("stream already finished"),
        }
    }

    pub fn is_finished(&self) -> bool {
        lock(&self.shared.terminal).is_none()
    }

    /// True once the consumer dropped its end.
    pub fn is_closed(&self) -> bool {
        lock(&self.shared.chunks).as_ref().map_or(true, |tx| tx.is_closed())
    }
}

impl std::fmt::Debug for StreamProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamProducer")
            .field("finished", &self.is_finished())
            .field("closed", &self.is_closed())
            .finish()
    }
}
