//! Batch job scheduler
//!
//! Jobs for all rows in a phase are registered, then executed together with
//! bounded concurrency. Completion order is arbitrary; callers key results
//! by the row index registered with each job.

use crate::error::Result;
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use std::future::Future;
use tracing::debug;

/// A batch of per-row jobs awaiting execution
pub struct Jobs<'a, T> {
    jobs: Vec<(usize, BoxFuture<'a, Result<T>>)>,
}

impl<'a, T: Send + 'a> Jobs<'a, T> {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Register a job for the given query row index
    pub fn add(&mut self, index: usize, job: impl Future<Output = Result<T>> + Send + 'a) {
        self.jobs.push((index, Box::pin(job)));
    }

    /// Run every registered job, at most `max_concurrent` at a time.
    ///
    /// Returns (index, result) pairs in completion order.
    pub async fn execute(self, max_concurrent: usize) -> Vec<(usize, Result<T>)> {
        let total = self.jobs.len();
        debug!(jobs = total, max_concurrent, "executing job batch");

        stream::iter(
            self.jobs
                .into_iter()
                .map(|(index, job)| async move { (index, job.await) }),
        )
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await
    }
}

impl<'a, T: Send + 'a> Default for Jobs<'a, T> {
    fn default() -> Self {
        Self::new()
    }
}
