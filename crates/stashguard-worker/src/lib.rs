//! Stashguard worker
//!
//! An in-process implementation of the task queue the processing orchestrator
//! submits jobs to. Executing the jobs is left to whoever claims them.

pub mod queue;

pub use queue::{
    compute_retry_backoff_seconds, ClaimedJob, FailOutcome, InMemoryTaskQueue,
    MAX_RETRY_BACKOFF_SECS,
};
