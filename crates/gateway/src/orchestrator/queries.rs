//! Pending user queries.
//!
//! An agent may raise a question to a human mid-conversation. The pending
//! question holds a `oneshot` waiter; a response consumes it exactly
//! once, and a timeout expires it.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Waiters for pending user queries, keyed by query id.
#[derive(Default)]
pub struct UserQueryBroker {
    pending: Mutex<HashMap<String, oneshot::Sender<String>>>,
}

impl UserQueryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for a new query. The receiver resolves when a
    /// response arrives; it errors if the query expires first.
    pub fn register(&self, query_id: &str) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(query_id.to_owned(), tx);
        rx
    }

    /// Deliver a response. Returns `false` when the query was already
    /// consumed or expired.
    pub fn resolve(&self, query_id: &str, response: &str) -> bool {
        match self.pending.lock().remove(query_id) {
            Some(tx) => {
                // The asking agent may have gone away; delivery failure
                // still counts as consumption.
                let _ = tx.send(response.to_owned());
                true
            }
            None => false,
        }
    }

    /// Expire a pending query. Returns `false` if it was already resolved.
    pub fn expire(&self, query_id: &str) -> bool {
        self.pending.lock().remove(query_id).is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_delivers_to_waiter() {
        let broker = UserQueryBroker::new();
        let rx = broker.register("q1");
        assert!(broker.resolve("q1", "yes"));
        assert_eq!(rx.await.unwrap(), "yes");
    }

    #[test]
    fn resolve_consumes_at_most_once() {
        let broker = UserQueryBroker::new();
        let _rx = broker.register("q1");
        assert!(broker.resolve("q1", "yes"));
        assert!(!broker.resolve("q1", "again"));
    }

    #[tokio::test]
    async fn expire_prevents_resolution() {
        let broker = UserQueryBroker::new();
        let rx = broker.register("q1");
        assert!(broker.expire("q1"));
        assert!(!broker.resolve("q1", "late"));
        assert!(rx.await.is_err());
    }

    #[test]
    fn expire_after_resolve_is_a_noop() {
        let broker = UserQueryBroker::new();
        let _rx = broker.register("q1");
        broker.resolve("q1", "yes");
        assert!(!broker.expire("q1"));
        assert_eq!(broker.pending_count(), 0);
    }
}
