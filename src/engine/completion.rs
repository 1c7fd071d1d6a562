//! One-shot acknowledgment for completion-style callbacks.
//!
//! The engine creates a [`Completion`]/[`Decision`] pair, hands the
//! `Completion` to the callback and waits on the `Decision`. Whichever
//! delegate tier handles the callback receives the very same `Completion`,
//! so the engine cannot tell which tier answered.

use crate::delegate::Callback;
use tokio::sync::oneshot;

/// Sender half. Call exactly once with the decision.
#[must_use = "the engine waits until a completion is called or dropped"]
pub struct Completion<T> {
    tx: oneshot::Sender<T>,
    callback: Callback,
}

/// Receiver half, held by the engine.
pub struct Decision<T> {
    rx: oneshot::Receiver<T>,
    callback: Callback,
}

impl<T> Completion<T> {
    pub fn channel(callback: Callback) -> (Completion<T>, Decision<T>) {
        let (tx, rx) = oneshot::channel();
        (Completion { tx, callback }, Decision { rx, callback })
    }

    /// Deliver the decision. Ignored if the engine stopped waiting.
    pub fn call(self, value: T) {
        if self.tx.send(value).is_err() {
            tracing::trace!(callback = ?self.callback, "decision delivered after engine gave up");
        }
    }

    pub fn callback(&self) -> Callback {
        self.callback
    }
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion").field("callback", &self.callback).finish()
    }
}

impl<T> Decision<T> {
    /// Wait for the decision. A completion dropped without being called
    /// yields `default`.
    pub async fn resolve_or(self, default: T) -> T {
        match self.rx.await {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(
                    callback = ?self.callback,
                    "completion dropped without a decision, using default"
                );
                default
            }
        }
    }

    /// The decision, if it was already made.
    pub fn now(mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_decision_delivered() {
        let (completion, decision) = Completion::channel(Callback::WillPerformHttpRedirection);
        completion.call(7u32);
        assert_eq!(decision.resolve_or(0).await, 7);
    }

    #[tokio::test]
    async fn test_dropped_completion_uses_default() {
        let (completion, decision) = Completion::<u32>::channel(Callback::DidReceiveResponse);
        drop(completion);
        assert_eq!(decision.resolve_or(3).await, 3);
    }

    #[tokio::test]
    async fn test_decision_from_another_task() {
        let (completion, decision) = Completion::channel(Callback::TaskDidReceiveChallenge);
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            completion.call("later");
        });
        assert_eq!(decision.resolve_or("default").await, "later");
    }

    #[test]
    fn test_now() {
        let (completion, decision) = Completion::channel(Callback::NeedNewBodyStream);
        completion.call(1u8);
        assert_eq!(decision.now(), Some(1));

        let (_completion, decision) = Completion::<u8>::channel(Callback::NeedNewBodyStream);
        assert_eq!(decision.now(), None);
    }
}
