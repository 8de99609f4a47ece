//! In-process task queue: priority ordering, claiming, retry with backoff.
//!
//! Jobs are ordered by priority (highest first) and FIFO among equal
//! priorities. A claimed job is either completed or failed by the claimer; a
//! failed job is rescheduled after an exponential backoff until its `attempts`
//! budget is spent, then counted as failed.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use stashguard_core::models::{EnqueuedJob, JobOptions, QueueStats};
use stashguard_core::{AppError, AppResult, TaskQueue};
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

/// Maximum delay in seconds before retrying a failed job.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Backoff in seconds after `attempt` failed attempts (exponential with cap).
#[inline]
pub fn compute_retry_backoff_seconds(attempt: u32) -> u64 {
    2_u64
        .checked_pow(attempt)
        .unwrap_or(u64::MAX)
        .min(MAX_RETRY_BACKOFF_SECS)
}

/// A job handed to a worker by [`InMemoryTaskQueue::claim_next`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedJob {
    pub job_id: Uuid,
    pub job_name: String,
    pub payload: serde_json::Value,
    pub priority: i32,
    /// 1-based number of this attempt.
    pub attempt: u32,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    Retrying { attempt: u32, backoff: Duration },
    Failed { attempts: u32 },
}

#[derive(Debug, Clone)]
struct Job {
    name: String,
    payload: serde_json::Value,
    options: JobOptions,
    attempts_made: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReadyEntry {
    priority: i32,
    seq: u64,
    job_id: Uuid,
}

impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct QueueState {
    jobs: HashMap<Uuid, Job>,
    ready: BinaryHeap<ReadyEntry>,
    delayed: Vec<(Instant, ReadyEntry)>,
    active: HashMap<Uuid, Job>,
    completed: usize,
    failed: usize,
    paused: bool,
    next_seq: u64,
}

impl QueueState {
    fn next_entry(&mut self, job_id: Uuid, priority: i32) -> ReadyEntry {
        let entry = ReadyEntry {
            priority,
            seq: self.next_seq,
            job_id,
        };
        self.next_seq += 1;
        entry
    }

    fn promote_due(&mut self, now: Instant) {
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.delayed)
            .into_iter()
            .partition(|(ready_at, _)| *ready_at <= now);
        self.delayed = waiting;
        for (_, entry) in due {
            self.ready.push(entry);
        }
    }
}

#[derive(Default)]
pub struct InMemoryTaskQueue {
    state: Mutex<QueueState>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the highest-priority ready job, if any. Returns `None` while paused.
    pub async fn claim_next(&self) -> Option<ClaimedJob> {
        let mut state = self.state.lock().await;
        if state.paused {
            return None;
        }
        state.promote_due(Instant::now());

        let entry = state.ready.pop()?;
        let mut job = state.jobs.remove(&entry.job_id)?;
        job.attempts_made += 1;

        let claimed = ClaimedJob {
            job_id: entry.job_id,
            job_name: job.name.clone(),
            payload: job.payload.clone(),
            priority: job.options.priority,
            attempt: job.attempts_made,
            max_attempts: job.options.attempts,
        };
        state.active.insert(entry.job_id, job);

        tracing::debug!(
            job_id = %claimed.job_id,
            job_name = %claimed.job_name,
            attempt = claimed.attempt,
            "Job claimed"
        );
        Some(claimed)
    }

    pub async fn complete(&self, job_id: Uuid) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let job = state
            .active
            .remove(&job_id)
            .ok_or_else(|| AppError::NotFound(format!("Active job {} not found", job_id)))?;
        state.completed += 1;
        tracing::info!(
            job_id = %job_id,
            job_name = %job.name,
            attempts = job.attempts_made,
            "Job completed successfully"
        );
        Ok(())
    }

    /// Report a failed attempt. The job is retried after a backoff while
    /// attempts remain.
    pub async fn fail(&self, job_id: Uuid, error: &str) -> AppResult<FailOutcome> {
        let mut state = self.state.lock().await;
        let job = state
            .active
            .remove(&job_id)
            .ok_or_else(|| AppError::NotFound(format!("Active job {} not found", job_id)))?;

        if job.attempts_made >= job.options.attempts {
            state.failed += 1;
            tracing::error!(
                job_id = %job_id,
                job_name = %job.name,
                error = %error,
                attempts = job.attempts_made,
                "Job failed after max attempts"
            );
            return Ok(FailOutcome::Failed {
                attempts: job.attempts_made,
            });
        }

        let backoff = Duration::from_secs(compute_retry_backoff_seconds(job.attempts_made));
        let attempt = job.attempts_made;
        tracing::warn!(
            job_id = %job_id,
            job_name = %job.name,
            error = %error,
            attempt = attempt,
            backoff_seconds = backoff.as_secs(),
            "Scheduling job retry"
        );
        let entry = state.next_entry(job_id, job.options.priority);
        state.jobs.insert(job_id, job);
        state.delayed.push((Instant::now() + backoff, entry));
        Ok(FailOutcome::Retrying { attempt, backoff })
    }

    pub async fn pause(&self) {
        self.state.lock().await.paused = true;
        tracing::info!("Task queue paused");
    }

    pub async fn resume(&self) {
        self.state.lock().await.paused = false;
        tracing::info!("Task queue resumed");
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    #[tracing::instrument(skip(self, payload))]
    async fn enqueue(
        &self,
        job_name: &str,
        payload: serde_json::Value,
        options: JobOptions,
    ) -> AppResult<EnqueuedJob> {
        if options.attempts == 0 {
            return Err(AppError::Validation(
                "Job attempts must be at least 1".to_string(),
            ));
        }

        let job_id = Uuid::new_v4();
        let mut state = self.state.lock().await;
        let entry = state.next_entry(job_id, options.priority);
        state.jobs.insert(
            job_id,
            Job {
                name: job_name.to_string(),
                payload,
                options,
                attempts_made: 0,
            },
        );
        state.ready.push(entry);

        tracing::info!(
            job_id = %job_id,
            job_name = %job_name,
            priority = options.priority,
            "Job submitted to queue"
        );
        Ok(EnqueuedJob {
            job_id,
            job_name: job_name.to_string(),
        })
    }

    async fn stats(&self) -> AppResult<QueueStats> {
        let state = self.state.lock().await;
        Ok(QueueStats {
            waiting: state.jobs.len(),
            active: state.active.len(),
            completed: state.completed,
            failed: state.failed,
            paused: state.paused,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(priority: i32, attempts: u32) -> JobOptions {
        JobOptions { priority, attempts }
    }

    #[test]
    fn retry_backoff_exponential_then_capped() {
        assert_eq!(compute_retry_backoff_seconds(0), 1);
        assert_eq!(compute_retry_backoff_seconds(1), 2);
        assert_eq!(compute_retry_backoff_seconds(2), 4);
        assert_eq!(compute_retry_backoff_seconds(8), 256);
        assert_eq!(compute_retry_backoff_seconds(9), MAX_RETRY_BACKOFF_SECS);
        assert_eq!(compute_retry_backoff_seconds(200), MAX_RETRY_BACKOFF_SECS);
    }

    #[tokio::test]
    async fn test_priority_order_with_fifo_ties() {
        let queue = InMemoryTaskQueue::new();
        let low = queue.enqueue("job", json!(1), options(3, 1)).await.unwrap();
        let first_high = queue.enqueue("job", json!(2), options(9, 1)).await.unwrap();
        let second_high = queue.enqueue("job", json!(3), options(9, 1)).await.unwrap();

        let order: Vec<Uuid> = [
            queue.claim_next().await.unwrap(),
            queue.claim_next().await.unwrap(),
            queue.claim_next().await.unwrap(),
        ]
        .iter()
        .map(|j| j.job_id)
        .collect();

        assert_eq!(order, vec![first_high.job_id, second_high.job_id, low.job_id]);
        assert!(queue.claim_next().await.is_none());
    }

    #[tokio::test]
    async fn test_complete_updates_stats() {
        let queue = InMemoryTaskQueue::new();
        queue.enqueue("job", json!({}), options(5, 1)).await.unwrap();
        let job = queue.claim_next().await.unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!((stats.waiting, stats.active), (0, 1));

        queue.complete(job.job_id).await.unwrap();
        let stats = queue.stats().await.unwrap();
        assert_eq!((stats.active, stats.completed), (0, 1));
        assert!(matches!(
            queue.complete(job.job_id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_retries_after_backoff() {
        let queue = InMemoryTaskQueue::new();
        queue.enqueue("job", json!({}), options(5, 2)).await.unwrap();

        let job = queue.claim_next().await.unwrap();
        assert_eq!(job.attempt, 1);
        let outcome = queue.fail(job.job_id, "boom").await.unwrap();
        assert_eq!(
            outcome,
            FailOutcome::Retrying {
                attempt: 1,
                backoff: Duration::from_secs(2)
            }
        );

        assert!(queue.claim_next().await.is_none());
        tokio::time::advance(Duration::from_secs(2)).await;

        let retry = queue.claim_next().await.unwrap();
        assert_eq!(retry.job_id, job.job_id);
        assert_eq!(retry.attempt, 2);
        assert_eq!(
            queue.fail(retry.job_id, "boom again").await.unwrap(),
            FailOutcome::Failed { attempts: 2 }
        );
        let stats = queue.stats().await.unwrap();
        assert_eq!((stats.waiting, stats.failed), (0, 1));
    }

    #[tokio::test]
    async fn test_pause_blocks_claims() {
        let queue = InMemoryTaskQueue::new();
        queue.enqueue("job", json!({}), options(5, 1)).await.unwrap();

        queue.pause().await;
        assert!(queue.claim_next().await.is_none());
        assert!(queue.stats().await.unwrap().paused);

        queue.resume().await;
        assert!(queue.claim_next().await.is_some());
    }

    #[tokio::test]
    async fn test_zero_attempts_rejected() {
        let queue = InMemoryTaskQueue::new();
        let err = queue.enqueue("job", json!({}), options(5, 0)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
