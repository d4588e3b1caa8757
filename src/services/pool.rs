//! Bounded execution of extractor runs.
//!
//! Every run holds a semaphore permit for its whole lifetime, is raced
//! against an optional timeout and a cancellation token, and ends in a typed
//! [`JobOutcome`]. Losing the race drops the extractor future, which kills the
//! child process.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::extractor::{ProcessOutput, ProcessorError, ShapeExtractor};
use super::jobs::JobStatus;

#[derive(Debug, Clone)]
pub enum JobOutcome {
    Completed { stdout: String, stderr: String },
    Failed { exit_code: Option<i32>, stderr: String },
    TimedOut { after: Duration },
    Cancelled,
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Completed { .. } => JobStatus::Succeeded,
            Self::Failed { .. } => JobStatus::Failed,
            Self::TimedOut { .. } => JobStatus::TimedOut,
            Self::Cancelled => JobStatus::Cancelled,
        }
    }
}

impl From<ProcessOutput> for JobOutcome {
    fn from(output: ProcessOutput) -> Self {
        if output.success {
            Self::Completed {
                stdout: output.stdout,
                stderr: output.stderr,
            }
        } else {
            Self::Failed {
                exit_code: output.exit_code,
                stderr: output.stderr,
            }
        }
    }
}

/// Increments a counter for as long as it lives.
struct Gauge(Arc<AtomicUsize>);

impl Gauge {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for Gauge {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ProcessingPool {
    extractor: Arc<dyn ShapeExtractor>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    timeout: Option<Duration>,
    shutdown: CancellationToken,
    active: Arc<AtomicUsize>,
    queued: Arc<AtomicUsize>,
}

impl ProcessingPool {
    pub fn new(
        extractor: Arc<dyn ShapeExtractor>,
        max_concurrent: usize,
        timeout: Option<Duration>,
        shutdown: CancellationToken,
    ) -> Self {
        let max_concurrent = max_concurrent.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            extractor,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            timeout,
            shutdown,
            active: Arc::new(AtomicUsize::new(0)),
            queued: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn extractor(&self) -> &Arc<dyn ShapeExtractor> {
        &self.extractor
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn active_jobs(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn queued_jobs(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Run one job, cancelled only by server shutdown.
    pub async fn run(&self, input: &Path, output_dir: &Path) -> Result<JobOutcome, ProcessorError> {
        self.run_with_cancel(input, output_dir, self.shutdown.child_token())
            .await
    }

    pub async fn run_with_cancel(
        &self,
        input: &Path,
        output_dir: &Path,
        cancel: CancellationToken,
    ) -> Result<JobOutcome, ProcessorError> {
        let permit = {
            let _queued = Gauge::enter(&self.queued);
            tokio::select! {
                permit = self.permits.clone().acquire_owned() => {
                    permit.map_err(|_| ProcessorError::PoolClosed)?
                }
                _ = cancel.cancelled() => return Ok(JobOutcome::Cancelled),
            }
        };
        let _active = Gauge::enter(&self.active);

        let extraction = bounded(self.timeout, self.extractor.extract(input, output_dir));
        let outcome = tokio::select! {
            result = extraction => match result {
                Some(output) => JobOutcome::from(output?),
                None => {
                    let after = self.timeout.unwrap_or_default();
                    tracing::warn!(
                        input = %input.display(),
                        "⏱️  Extractor timed out after {:?}, killing it",
                        after
                    );
                    JobOutcome::TimedOut { after }
                }
            },
            _ = cancel.cancelled() => {
                tracing::warn!(input = %input.display(), "🛑 Extractor run cancelled");
                JobOutcome::Cancelled
            }
        };

        drop(permit);
        Ok(outcome)
    }
}

async fn bounded<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}
