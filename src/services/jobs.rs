use std::fmt;
use tokio::sync::mpsc;

/// Work handed to the background worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Remove an object from the store. `attempt` starts at 1.
    DeleteObject { key: String, attempt: u32 },
    PurgeExpiredRecycleItems,
    PurgeStaleUploads,
    PurgeExpiredTokens,
    PurgeExpiredShares,
    /// Work through the pending deletion table.
    RetryPendingDeletions,
}

impl Job {
    pub fn delete_object(key: impl Into<String>) -> Self {
        Job::DeleteObject {
            key: key.into(),
            attempt: 1,
        }
    }

    /// Periodic maintenance jobs, in the order they are scheduled.
    pub fn sweep() -> [Job; 5] {
        [
            Job::PurgeExpiredRecycleItems,
            Job::PurgeStaleUploads,
            Job::PurgeExpiredTokens,
            Job::PurgeExpiredShares,
            Job::RetryPendingDeletions,
        ]
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Job::DeleteObject { key, attempt } => {
                write!(f, "DeleteObject({}, attempt {})", key, attempt)
            }
            other => write!(f, "{:?}", other),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("job queue is closed")]
pub struct QueueClosed;

/// Sending half of the job queue. Cheap to clone.
#[derive(Clone, Debug)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
}

impl JobQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Job>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Waits for room in the queue.
    pub async fn enqueue(&self, job: Job) -> Result<(), QueueClosed> {
        tracing::debug!("Enqueue job {}", job);
        self.tx.send(job).await.map_err(|_| QueueClosed)
    }

    /// Enqueue without waiting; a full or closed queue is logged and the
    /// job dropped. Object deletions are also recorded in the pending
    /// deletion table, so a dropped one is picked up by the next sweep.
    pub fn submit(&self, job: Job) {
        if let Err(e) = self.tx.try_send(job) {
            tracing::warn!("Dropping job, queue unavailable: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_preserves_order() {
        let (queue, mut rx) = JobQueue::new(8);
        queue.enqueue(Job::delete_object("a")).await.unwrap();
        queue.submit(Job::PurgeExpiredShares);

        assert_eq!(rx.recv().await, Some(Job::delete_object("a")));
        assert_eq!(rx.recv().await, Some(Job::PurgeExpiredShares));
    }

    #[tokio::test]
    async fn test_enqueue_after_close_fails() {
        let (queue, rx) = JobQueue::new(1);
        drop(rx);
        assert!(queue.enqueue(Job::PurgeStaleUploads).await.is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Job::delete_object("users/u/f").to_string(),
            "DeleteObject(users/u/f, attempt 1)"
        );
        assert_eq!(Job::PurgeExpiredTokens.to_string(), "PurgeExpiredTokens");
    }
}
