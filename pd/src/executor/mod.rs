//! Task executor
//!
//! The single serial consumer of the work queue. Each task's music-platform
//! effect runs strictly before its discussion-platform effect; a failure of
//! either retries the whole pair in place after a backoff, so the queue
//! never advances past unfinished work. The sentinel moves the executor
//! from `Running` to `Draining`, after which the coordinator takes the
//! receiver back for snapshotting.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::ExecutorConfig;
use crate::monitor::MonitorTable;
use crate::platform::{DiscussionClient, MusicClient};
use crate::task::{Dequeued, TaskEnvelope, TaskError, WorkQueueReceiver};

/// Executor lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Running,
    Draining,
    Stopped,
}

/// What the executor hands back when it stops
pub struct ExecutorOutcome {
    /// Receiver with whatever work was still queued behind the sentinel
    pub receiver: WorkQueueReceiver,
    /// Task whose in-place retry was abandoned by the shutdown signal
    pub in_flight: Option<TaskEnvelope>,
}

/// The TaskExecutor drains the work queue serially
pub struct TaskExecutor {
    discussion: Arc<dyn DiscussionClient>,
    music: Arc<dyn MusicClient>,
    monitor: MonitorTable,
    receiver: WorkQueueReceiver,
    config: ExecutorConfig,
    state: ExecutorState,
}

impl TaskExecutor {
    pub fn new(
        discussion: Arc<dyn DiscussionClient>,
        music: Arc<dyn MusicClient>,
        monitor: MonitorTable,
        receiver: WorkQueueReceiver,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            discussion,
            music,
            monitor,
            receiver,
            config,
            state: ExecutorState::Running,
        }
    }

    /// Run until the sentinel arrives or shutdown is signalled, then hand
    /// the receiver (and any abandoned task) back for draining.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ExecutorOutcome {
        info!(
            retry_backoff_secs = self.config.retry_backoff_secs,
            max_retries = self.config.max_retries,
            "Task executor started"
        );

        let in_flight = loop {
            let envelope = tokio::select! {
                _ = shutdown.changed() => break None,
                item = self.receiver.recv() => match item {
                    Dequeued::EndOfStream => break None,
                    Dequeued::Entry(envelope) => envelope,
                },
            };

            if let Some(abandoned) = self.execute(envelope, &mut shutdown).await {
                break Some(abandoned);
            }
        };

        self.state = ExecutorState::Draining;
        info!(abandoned = in_flight.is_some(), "Task executor draining");

        self.state = ExecutorState::Stopped;
        ExecutorOutcome {
            receiver: self.receiver,
            in_flight,
        }
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    /// Apply one task's effect pair, retrying in place until it succeeds,
    /// is skipped, or shutdown abandons it. Returns the envelope if it was
    /// abandoned so the coordinator can re-snapshot it.
    async fn execute(&mut self, mut envelope: TaskEnvelope, shutdown: &mut watch::Receiver<bool>) -> Option<TaskEnvelope> {
        let kind = envelope.task.kind();
        debug!(id = %envelope.id, kind, "Executing task");
        let mut attempt: u32 = 0;

        loop {
            let outcome = {
                let effects = apply_effects(&mut envelope, &*self.music, &*self.discussion, &self.monitor);
                tokio::pin!(effects);

                tokio::select! {
                    _ = shutdown.changed() => None,
                    result = &mut effects => Some(result),
                }
            };

            match outcome {
                None => {
                    warn!(id = %envelope.id, kind, "Retry abandoned by shutdown");
                    return Some(envelope);
                }

                Some(Ok(())) => {
                    info!(id = %envelope.id, kind, "Task complete");
                    return None;
                }

                Some(Err(e)) if e.is_fatal() => {
                    // Retrying cannot fix a logic error
                    error!(id = %envelope.id, kind, error = %e, "Skipping task after invariant violation");
                    return None;
                }

                Some(Err(e)) => {
                    attempt += 1;
                    if let Some(bound) = self.config.retry_bound() {
                        if attempt > bound {
                            error!(id = %envelope.id, kind, error = %e, attempt, "Retry bound exhausted, skipping task");
                            return None;
                        }
                    }
                    warn!(id = %envelope.id, kind, error = %e, attempt, "Task failed, retrying");
                }
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    warn!(id = %envelope.id, kind, "Retry abandoned by shutdown");
                    return Some(envelope);
                }
                _ = tokio::time::sleep(self.config.retry_backoff()) => {}
            }
        }
    }
}

/// The effect pair: remote strictly first, so a reply is never posted for a
/// playlist action that did not happen.
async fn apply_effects(
    envelope: &mut TaskEnvelope,
    music: &dyn MusicClient,
    discussion: &dyn DiscussionClient,
    monitor: &MonitorTable,
) -> Result<(), TaskError> {
    envelope.task.apply_remote(music).await?;
    envelope.task.apply_local(discussion, monitor, &envelope.event).await
}
