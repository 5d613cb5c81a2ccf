//! Per-id completion notification.
//!
//! Waiters that find a chunk in flight subscribe here instead of polling on
//! an interval. Holders notify on every terminal status transition, success
//! or failure, so a waiter is always woken to re-read the durable status.
//! The wakeup is advisory only; status in the state store is the truth.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Notify;

#[derive(Default)]
pub struct CompletionSignals {
    inner: DashMap<String, Arc<Notify>>,
}

impl CompletionSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal handle for an id. Subscribe (`handle(id).notified()`) before
    /// re-reading status, otherwise a transition between the read and the
    /// wait is missed.
    pub fn handle(&self, id: &str) -> Arc<Notify> {
        self.inner
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    /// Wake all current waiters for an id.
    pub fn notify(&self, id: &str) {
        if let Some(notify) = self.inner.get(id) {
            notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_waiter_is_woken() {
        let signals = Arc::new(CompletionSignals::new());

        let waiter_signals = signals.clone();
        let waiter = tokio::spawn(async move {
            let handle = waiter_signals.handle("chunk-1");
            handle.notified().await;
        });

        // Give the waiter time to subscribe
        tokio::time::sleep(Duration::from_millis(20)).await;
        signals.notify("chunk-1");

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be woken")
            .unwrap();
    }

    #[tokio::test]
    async fn test_notify_without_waiters_is_noop() {
        let signals = CompletionSignals::new();
        signals.notify("nobody-listening");
    }

    #[tokio::test]
    async fn test_handles_are_shared_per_id() {
        let signals = CompletionSignals::new();
        let a = signals.handle("x");
        let b = signals.handle("x");
        assert!(Arc::ptr_eq(&a, &b));
        let c = signals.handle("y");
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
