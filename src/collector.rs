//! Reply collection for the alert workflow.
//!
//! The gateway message handler feeds every incoming message through
//! [`PendingWaits::deliver`]; each alert workflow parks its own wait on the
//! channel and resolves it with the first message from the targeted author,
//! or with a timeout. Waits on the same channel are independent: one reply
//! satisfies every wait filtered on that author, and each unanswered wait
//! runs to its own deadline. Exactly one outcome per wait, never both.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};

/// Terminal outcome of one bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The targeted author replied before the deadline.
    Replied(u64),
    /// The deadline elapsed with no qualifying reply.
    TimedOut,
}

struct PendingWait {
    id: u64,
    author_id: u64,
    tx: oneshot::Sender<u64>,
}

/// Registry of pending waits, grouped by channel.
#[derive(Default)]
pub struct PendingWaits {
    next_id: AtomicU64,
    inner: Mutex<HashMap<u64, Vec<PendingWait>>>,
}

impl PendingWaits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes an incoming message to the pending waits on its channel,
    /// consuming every wait filtered on the message's author. Returns
    /// whether the message satisfied at least one wait.
    pub async fn deliver(&self, channel_id: u64, author_id: u64) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(waits) = inner.get_mut(&channel_id) else {
            return false;
        };
        let mut satisfied = false;
        let mut index = 0;
        while index < waits.len() {
            if waits[index].author_id == author_id {
                let wait = waits.swap_remove(index);
                // A dropped receiver just means the wait already ended.
                let _ = wait.tx.send(author_id);
                satisfied = true;
            } else {
                index += 1;
            }
        }
        if waits.is_empty() {
            inner.remove(&channel_id);
        }
        satisfied
    }

    async fn register(&self, channel_id: u64, author_id: u64) -> (u64, oneshot::Receiver<u64>) {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock().await;
        inner.entry(channel_id).or_default().push(PendingWait { id, author_id, tx });
        (id, rx)
    }

    async fn unregister(&self, channel_id: u64, id: u64) {
        let mut inner = self.inner.lock().await;
        if let Some(waits) = inner.get_mut(&channel_id) {
            waits.retain(|wait| wait.id != id);
            if waits.is_empty() {
                inner.remove(&channel_id);
            }
        }
    }

    /// Waits for one reply from `author_id` in `channel_id`, up to
    /// `timeout_secs`. Resolves to exactly one [`WaitOutcome`].
    pub async fn bounded_wait(
        &self,
        channel_id: u64,
        author_id: u64,
        timeout_secs: u64,
    ) -> WaitOutcome {
        let (id, rx) = self.register(channel_id, author_id).await;
        match tokio::time::timeout(Duration::from_secs(timeout_secs), rx).await {
            Ok(Ok(responder)) => WaitOutcome::Replied(responder),
            // Sender gone without a reply: the registry itself went away.
            Ok(Err(_)) => WaitOutcome::TimedOut,
            // Deadline elapsed; withdraw our entry.
            Err(_) => {
                self.unregister(channel_id, id).await;
                WaitOutcome::TimedOut
            }
        }
    }
}
