use async_trait::async_trait;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A received message. It stays invisible to other receivers until its visibility
/// deadline; after that it is delivered again unless acknowledged with [`done`].
///
/// [`done`]: QueueMessage::done
#[async_trait]
pub trait QueueMessage: Send + Sync {
    fn data(&self) -> &serde_json::Value;

    /// Whether the visibility deadline has (nearly) passed, so another receiver may
    /// already hold the same message.
    fn is_expired(&self) -> bool;

    /// Acknowledges and deletes the message.
    async fn done(&self) -> anyhow::Result<()>;

    /// Gives the message back without acknowledging; it reappears after the deadline.
    async fn failed(&self);
}

pub trait Queue: Send + Sync {
    /// Stream of received messages; ends once `cancel` fires.
    fn receive(&self, cancel: CancellationToken) -> BoxStream<'static, Box<dyn QueueMessage>>;
}

struct Entry {
    payload: serde_json::Value,
    visible_at: Instant,
    receive_count: u32,
}

#[derive(Default)]
struct Entries {
    next_id: u64,
    entries: BTreeMap<u64, Entry>,
}

/// Process-local queue with visibility timeouts on tokio time.
#[derive(Clone)]
pub struct InMemoryQueue {
    entries: Arc<Mutex<Entries>>,
    visibility_timeout: Duration,
    polling_interval: Duration,
    batch_size: usize,
    expiry_margin: Duration,
}

impl InMemoryQueue {
    pub fn new(visibility_timeout: Duration, polling_interval: Duration, batch_size: usize) -> Self {
        Self {
            entries: Default::default(),
            visibility_timeout,
            polling_interval,
            batch_size: batch_size.max(1),
            expiry_margin: Duration::ZERO,
        }
    }

    pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
        self.expiry_margin = margin;
        self
    }

    pub fn push(&self, payload: serde_json::Value) -> u64 {
        let mut entries = self.entries.lock();
        entries.next_id += 1;
        let id = entries.next_id;
        entries.entries.insert(
            id,
            Entry {
                payload,
                visible_at: Instant::now(),
                receive_count: 0,
            },
        );
        id
    }

    /// Messages not yet acknowledged, visible or not.
    pub fn len(&self) -> usize {
        self.entries.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take_visible(&self) -> Vec<InMemoryMessage> {
        let now = Instant::now();
        let deadline = now + self.visibility_timeout;
        let mut entries = self.entries.lock();
        entries
            .entries
            .iter_mut()
            .filter(|(_, entry)| entry.visible_at <= now)
            .take(self.batch_size)
            .map(|(id, entry)| {
                entry.visible_at = deadline;
                entry.receive_count += 1;
                InMemoryMessage {
                    id: *id,
                    receive_count: entry.receive_count,
                    payload: entry.payload.clone(),
                    deadline,
                    expiry_margin: self.expiry_margin,
                    entries: self.entries.clone(),
                }
            })
            .collect()
    }
}

impl Queue for InMemoryQueue {
    fn receive(&self, cancel: CancellationToken) -> BoxStream<'static, Box<dyn QueueMessage>> {
        let queue = self.clone();
        Box::pin(async_stream::stream! {
            while !cancel.is_cancelled() {
                let batch = queue.take_visible();
                if batch.is_empty() {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(queue.polling_interval) => continue,
                    }
                }
                for message in batch {
                    yield Box::new(message) as Box<dyn QueueMessage>;
                }
            }
        })
    }
}

struct InMemoryMessage {
    id: u64,
    receive_count: u32,
    payload: serde_json::Value,
    deadline: Instant,
    expiry_margin: Duration,
    entries: Arc<Mutex<Entries>>,
}

#[async_trait]
impl QueueMessage for InMemoryMessage {
    fn data(&self) -> &serde_json::Value {
        &self.payload
    }

    fn is_expired(&self) -> bool {
        Instant::now() + self.expiry_margin >= self.deadline
    }

    async fn done(&self) -> anyhow::Result<()> {
        let mut entries = self.entries.lock();
        // a redelivered copy belongs to its new receiver
        match entries.entries.get(&self.id) {
            Some(entry) if entry.receive_count == self.receive_count => {
                entries.entries.remove(&self.id);
                Ok(())
            }
            Some(_) => anyhow::bail!("message {} was redelivered", self.id),
            None => Ok(()),
        }
    }

    async fn failed(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn unacknowledged_message_is_redelivered_after_timeout() {
        let queue = InMemoryQueue::new(Duration::from_secs(30), Duration::from_millis(100), 10);
        queue.push(json!({"n": 1}));
        let cancel = CancellationToken::new();
        let mut stream = queue.receive(cancel.clone());

        let first = stream.next().await.unwrap();
        assert!(!first.is_expired());
        first.failed().await;

        let started = Instant::now();
        let second = stream.next().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(first.is_expired());
        assert_eq!(second.data(), &json!({"n": 1}));

        // the stale copy may not delete the redelivered one
        first.done().await.unwrap_err();
        second.done().await.unwrap();
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stream_ends_on_cancel() {
        let queue = InMemoryQueue::new(Duration::from_secs(30), Duration::from_millis(100), 10);
        let cancel = CancellationToken::new();
        let mut stream = queue.receive(cancel.clone());
        cancel.cancel();
        assert!(stream.next().await.is_none());
    }
}
