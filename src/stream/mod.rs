//! Stream bridge.
//!
//! Turns the push-style `did_receive_data` / `did_complete` callback pair
//! into a pull-style [`AsyncBytes`], with the response head delivered
//! separately through [`PendingResponse`].

pub mod asyncbytes;
pub mod producer;
pub mod response;

pub use asyncbytes::AsyncBytes;
pub use producer::StreamProducer;
pub use response::{PendingResponse, ResponseCallback};

use crate::engine::{EngineTask, NativeBytes};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Create both halves of a bridged stream for `task`.
///
/// `capacity` bounds the number of queued chunks (at least one).
pub fn bridge(
    task: Arc<dyn EngineTask>,
    capacity: usize,
) -> (StreamProducer, AsyncBytes, ResponseCallback, PendingResponse) {
    let (chunk_tx, chunk_rx) = mpsc::channel(capacity.max(1));
    let (terminal_tx, terminal_rx) = oneshot::channel();
    let (response_tx, response_rx) = oneshot::channel();

    let producer = StreamProducer::new(chunk_tx, terminal_tx);
    let bytes = AsyncBytes::bridged(task, chunk_rx, terminal_rx);
    let response = ResponseCallback::new(move |result| {
        let _ = response_tx.send(result);
    });
    (producer, bytes, response, PendingResponse::waiting(response_rx))
}

/// Pass an engine's native byte stream through the same consumer types.
pub fn native(native: NativeBytes) -> (AsyncBytes, PendingResponse) {
    (AsyncBytes::native(native.body), PendingResponse::native(native.response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::neterror::NetError;
    use crate::engine::testing::IdleTask;
    use crate::http::ResponseMeta;
    use bytes::Bytes;
    use futures::{FutureExt, StreamExt};
    use http::{HeaderMap, StatusCode, Version};
    use std::time::Duration;

    fn task() -> Arc<dyn EngineTask> {
        Arc::new(IdleTask::new(1))
    }

    fn meta() -> ResponseMeta {
        ResponseMeta::new(
            StatusCode::OK,
            Version::HTTP_11,
            HeaderMap::new(),
            url::Url::parse("http://example.com/").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_bytes_in_order_then_end() {
        let (producer, mut bytes, _response, _pending) = bridge(task(), 8);

        assert!(producer.push(Bytes::from_static(b"ab")).await);
        assert!(producer.push(Bytes::from_static(b"c")).await);
        producer.finish(Ok(()));

        assert_eq!(bytes.next_byte().await, Ok(Some(b'a')));
        assert_eq!(bytes.next_byte().await, Ok(Some(b'b')));
        assert_eq!(bytes.next_byte().await, Ok(Some(b'c')));
        assert_eq!(bytes.next_byte().await, Ok(None));
    }

    #[tokio::test]
    async fn test_failure_after_queued_bytes() {
        let (producer, mut bytes, _response, _pending) = bridge(task(), 8);

        producer.push(Bytes::from_static(b"x")).await;
        producer.finish(Err(NetError::ConnectionReset));

        assert_eq!(bytes.next_byte().await, Ok(Some(b'x')));
        assert_eq!(bytes.next_byte().await, Err(NetError::ConnectionReset));
        assert_eq!(bytes.next_byte().await, Ok(None));
    }

    #[tokio::test]
    async fn test_not_restartable() {
        let (producer, bytes, _response, _pending) = bridge(task(), 8);
        producer.push(Bytes::from_static(b"hi")).await;
        producer.finish(Ok(()));

        let mut bytes = bytes;
        let first: Vec<_> = (&mut bytes).collect().await;
        assert_eq!(first.len(), 2);
        let second: Vec<_> = (&mut bytes).collect().await;
        assert!(second.is_empty());
        assert!(bytes.is_finished());
    }

    #[tokio::test]
    async fn test_push_waits_for_consumer() {
        let (producer, mut bytes, _response, _pending) = bridge(task(), 1);

        assert!(producer.push(Bytes::from_static(b"1")).await);
        // Channel full: the second push must not complete yet.
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            producer.push(Bytes::from_static(b"2")),
        )
        .await;
        assert!(blocked.is_err());

        assert_eq!(bytes.next_chunk().await, Ok(Some(Bytes::from_static(b"1"))));
        assert!(producer.push(Bytes::from_static(b"2")).await);
        producer.finish(Ok(()));
        assert_eq!(bytes.bytes().await.unwrap(), Bytes::from_static(b"2"));
    }

    #[tokio::test]
    async fn test_push_after_consumer_dropped() {
        let (producer, bytes, _response, _pending) = bridge(task(), 1);
        drop(bytes);
        assert!(producer.is_closed());
        assert!(!producer.push(Bytes::from_static(b"lost")).await);
    }

    #[tokio::test]
    async fn test_finish_is_once() {
        let (producer, mut bytes, _response, _pending) = bridge(task(), 1);
        producer.finish(Err(NetError::TimedOut));
        producer.finish(Ok(()));
        assert!(producer.is_finished());
        assert_eq!(bytes.next_byte().await, Err(NetError::TimedOut));
    }

    #[tokio::test]
    async fn test_dropped_producer_is_aborted() {
        let (producer, mut bytes, _response, _pending) = bridge(task(), 1);
        drop(producer);
        assert_eq!(bytes.next_byte().await, Err(NetError::Aborted));
    }

    #[tokio::test]
    async fn test_response_before_and_after_await() {
        let (_producer, _bytes, response, mut pending) = bridge(task(), 1);

        assert!(pending.try_get().is_none());
        assert!(response.deliver(Ok(meta())));
        assert!(!response.deliver(Err(NetError::Failed)));

        let first = pending.get().await.unwrap();
        let second = pending.get().await.unwrap();
        assert_eq!(first, meta());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_response_awaited_before_arrival() {
        let (_producer, _bytes, response, pending) = bridge(task(), 1);
        let waiter = tokio::spawn(pending);
        tokio::task::yield_now().await;
        response.deliver(Ok(meta()));
        assert_eq!(waiter.await.unwrap(), Ok(meta()));
    }

    #[tokio::test]
    async fn test_response_failure() {
        let (_producer, _bytes, response, mut pending) = bridge(task(), 1);
        response.deliver(Err(NetError::NameNotResolved));
        assert_eq!(pending.get().await, Err(NetError::NameNotResolved));
        assert_eq!(pending.try_get(), Some(&Err(NetError::NameNotResolved)));
    }

    #[tokio::test]
    async fn test_native_path_same_contract() {
        let body = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Ok(Bytes::new()),
            Ok(Bytes::from_static(b"c")),
            Err(NetError::ConnectionClosed),
        ])
        .boxed();
        let (mut bytes, mut pending) = native(NativeBytes {
            response: async { Ok::<_, NetError>(meta()) }.boxed(),
            body,
        });

        assert_eq!(pending.get().await, Ok(meta()));
        assert_eq!(bytes.task_id(), None);
        assert_eq!(bytes.next_byte().await, Ok(Some(b'a')));
        assert_eq!(bytes.next_byte().await, Ok(Some(b'b')));
        assert_eq!(bytes.next_byte().await, Ok(Some(b'c')));
        assert_eq!(bytes.next_byte().await, Err(NetError::ConnectionClosed));
        assert_eq!(bytes.next_byte().await, Ok(None));
    }

    #[tokio::test]
    async fn test_text() {
        let (producer, bytes, _response, _pending) = bridge(task(), 4);
        producer.push(Bytes::from_static(b"hello ")).await;
        producer.push(Bytes::from_static(b"world")).await;
        producer.finish(Ok(()));
        assert_eq!(bytes.text().await.unwrap(), "hello world");
    }

    #[cfg(feature = "json")]
    #[tokio::test]
    async fn test_json() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Status {
            ok: bool,
        }

        let (producer, bytes, _response, _pending) = bridge(task(), 4);
        producer.push(Bytes::from_static(b"{\"ok\":")).await;
        producer.push(Bytes::from_static(b"true}")).await;
        producer.finish(Ok(()));
        assert_eq!(bytes.json::<Status>().await.unwrap(), Status { ok: true });
    }

    #[tokio::test]
    async fn test_cancel_reaches_task() {
        let task = task();
        let (_producer, bytes, _response, _pending) = bridge(task.clone(), 1);
        bytes.cancel();
        assert_eq!(task.state(), crate::base::TaskState::Canceling);
    }
}
