//! Per-conversation mutual exclusion.
//!
//! Turn-state transitions and the events they publish are serialised per
//! conversation by a keyed `Semaphore(1)`. Cross-conversation operations
//! never contend.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Default)]
pub struct ConversationLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl ConversationLockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the operation lock for a conversation. The permit releases
    /// on drop.
    pub async fn acquire(&self, conversation_id: &str) -> OwnedSemaphorePermit {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(conversation_id.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.acquire_owned().await.expect("semaphore never closed")
    }

    /// Drop lock entries that are not currently held.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequential_acquire() {
        let map = ConversationLockMap::new();
        let p1 = map.acquire("c1").await;
        drop(p1);
        let p2 = map.acquire("c1").await;
        drop(p2);
    }

    #[tokio::test]
    async fn different_conversations_do_not_contend() {
        let map = ConversationLockMap::new();
        let _p1 = map.acquire("c1").await;
        let _p2 = map.acquire("c2").await;
        assert_eq!(map.len(), 2);
    }

    #[tokio::test]
    async fn waiter_proceeds_after_release() {
        let map = Arc::new(ConversationLockMap::new());
        let permit = map.acquire("c1").await;

        let map2 = map.clone();
        let waiter = tokio::spawn(async move {
            let _p = map2.acquire("c1").await;
            7
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        drop(permit);
        assert_eq!(waiter.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn prune_keeps_held_locks() {
        let map = ConversationLockMap::new();
        let _held = map.acquire("held").await;
        drop(map.acquire("idle").await);
        map.prune_idle();
        assert_eq!(map.len(), 1);
    }
}
