//! The work queue
//!
//! Ordered multi-producer/single-consumer channel of task envelopes. Both
//! watchers hold cloneable [`WorkQueue`] handles; the executor owns the
//! single [`WorkQueueReceiver`]. A `Shutdown` sentinel tells the consumer to
//! stop pulling work; whatever remains behind it is drained for the
//! shutdown snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::core::{EventRef, Task};

/// The queue handle was used after the consumer went away
#[derive(Debug, Error)]
#[error("Work queue closed")]
pub struct QueueClosed;

/// One queue entry: a task plus the event it originated from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub id: Uuid,
    pub task: Task,
    pub event: EventRef,
    pub created_at: DateTime<Utc>,
}

impl TaskEnvelope {
    pub fn new(task: Task, event: EventRef) -> Self {
        Self {
            id: Uuid::now_v7(),
            task,
            event,
            created_at: Utc::now(),
        }
    }
}

enum QueueItem {
    Entry(TaskEnvelope),
    Shutdown,
}

/// What the consumer pulled off the queue
#[derive(Debug)]
pub enum Dequeued {
    Entry(TaskEnvelope),
    EndOfStream,
}

/// Multi-producer sending half of the work queue
#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::UnboundedSender<QueueItem>,
}

/// Single-consumer receiving half of the work queue
pub struct WorkQueueReceiver {
    rx: mpsc::UnboundedReceiver<QueueItem>,
}

/// Create a connected work queue pair
pub fn work_queue() -> (WorkQueue, WorkQueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (WorkQueue { tx }, WorkQueueReceiver { rx })
}

impl WorkQueue {
    /// Enqueue a task. Non-blocking and safe from any producer.
    pub fn enqueue(&self, task: Task, event: EventRef) -> Result<(), QueueClosed> {
        self.enqueue_envelope(TaskEnvelope::new(task, event))
    }

    /// Enqueue an existing envelope (snapshot restore keeps original ids)
    pub fn enqueue_envelope(&self, envelope: TaskEnvelope) -> Result<(), QueueClosed> {
        self.tx.send(QueueItem::Entry(envelope)).map_err(|_| QueueClosed)
    }

    /// Push the shutdown sentinel. Entries enqueued before this call are
    /// still delivered first.
    pub fn signal_shutdown(&self) -> Result<(), QueueClosed> {
        self.tx.send(QueueItem::Shutdown).map_err(|_| QueueClosed)
    }
}

impl WorkQueueReceiver {
    /// Wait for the next entry or the shutdown sentinel. A closed channel
    /// (all producers dropped) also ends the stream.
    pub async fn recv(&mut self) -> Dequeued {
        match self.rx.recv().await {
            Some(QueueItem::Entry(envelope)) => Dequeued::Entry(envelope),
            Some(QueueItem::Shutdown) | None => Dequeued::EndOfStream,
        }
    }

    /// Drain everything still queued, in order, ignoring any further
    /// sentinels. Used to build the shutdown snapshot.
    pub fn drain(&mut self) -> Vec<TaskEnvelope> {
        let mut entries = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            if let QueueItem::Entry(envelope) = item {
                entries.push(envelope);
            }
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(title: &str) -> (Task, EventRef) {
        (Task::open_playlist(title), EventRef::Submission { id: title.to_string() })
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (queue, mut rx) = work_queue();

        for title in ["a", "b", "c"] {
            let (task, event) = envelope(title);
            queue.enqueue(task, event).unwrap();
        }

        for expected in ["a", "b", "c"] {
            match rx.recv().await {
                Dequeued::Entry(env) => {
                    assert_eq!(env.event, EventRef::Submission { id: expected.to_string() });
                }
                Dequeued::EndOfStream => panic!("queue ended early"),
            }
        }
    }

    #[tokio::test]
    async fn test_sentinel_ends_stream() {
        let (queue, mut rx) = work_queue();

        let (task, event) = envelope("a");
        queue.enqueue(task, event).unwrap();
        queue.signal_shutdown().unwrap();

        assert!(matches!(rx.recv().await, Dequeued::Entry(_)));
        assert!(matches!(rx.recv().await, Dequeued::EndOfStream));
    }

    #[tokio::test]
    async fn test_multiple_producers() {
        let (queue, mut rx) = work_queue();
        let other = queue.clone();

        let (task, event) = envelope("a");
        queue.enqueue(task, event).unwrap();
        let (task, event) = envelope("b");
        other.enqueue(task, event).unwrap();
        queue.signal_shutdown().unwrap();

        assert!(matches!(rx.recv().await, Dequeued::Entry(_)));
        assert!(matches!(rx.recv().await, Dequeued::Entry(_)));
        assert!(matches!(rx.recv().await, Dequeued::EndOfStream));
    }

    #[tokio::test]
    async fn test_drain_preserves_order_and_skips_sentinels() {
        let (queue, mut rx) = work_queue();

        let (task, event) = envelope("a");
        queue.enqueue(task, event).unwrap();
        queue.signal_shutdown().unwrap();
        let (task, event) = envelope("b");
        queue.enqueue(task, event).unwrap();

        let drained = rx.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].event, EventRef::Submission { id: "a".into() });
        assert_eq!(drained[1].event, EventRef::Submission { id: "b".into() });
    }

    #[test]
    fn test_envelope_serde_round_trip() {
        let envelope = TaskEnvelope::new(
            Task::add_track("https://example/p1", "The Beatles", "Yesterday"),
            EventRef::Comment { id: "c1".into() },
        );

        let json = serde_json::to_string(&envelope).unwrap();
        let restored: TaskEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, envelope);
    }
}
