//! Bounded concurrent job execution.
//!
//! Every job gets its own task; a semaphore admits at most `concurrency` of
//! them into their work at a time. Jobs never cancel each other, and the
//! caller gets exactly one outcome per job back.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinError;

/// Outcome of [`run_all`].
#[derive(Debug)]
pub struct DispatchReport<T, E> {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub completed: Vec<T>,
    /// One entry per failed job, in completion order.
    pub errors: Vec<E>,
}

impl<T, E> DispatchReport<T, E> {
    /// Number of outcomes collected; always equals `total`.
    pub fn outcomes(&self) -> usize {
        self.completed.len() + self.errors.len()
    }
}

/// Run every job with at most `concurrency` in flight and wait for all of them.
///
/// A `concurrency` of zero is treated as one. A job that panics is reported
/// as a failure through `E: From<JoinError>`.
pub async fn run_all<J, T, E, F, Fut>(
    jobs: Vec<J>,
    concurrency: usize,
    job_fn: F,
) -> DispatchReport<T, E>
where
    J: Send + 'static,
    T: Send + 'static,
    E: From<JoinError> + Send + 'static,
    F: Fn(J) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    let total = jobs.len();
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let succeeded = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    // Sized so that no job ever waits to report its outcome
    let (outcome_tx, mut outcome_rx) = mpsc::channel::<Result<T, E>>(total.max(1));

    let mut handles = Vec::with_capacity(total);

    for job in jobs {
        let work = job_fn(job);
        let semaphore = semaphore.clone();
        let succeeded = succeeded.clone();
        let failed = failed.clone();
        let outcome_tx = outcome_tx.clone();

        handles.push(tokio::spawn(async move {
            // Held until the task ends, including on panic
            let _permit = semaphore.acquire_owned().await.ok();

            let outcome = work.await;
            match outcome {
                Ok(_) => succeeded.fetch_add(1, Ordering::Relaxed),
                Err(_) => failed.fetch_add(1, Ordering::Relaxed),
            };

            let _ = outcome_tx.send(outcome).await;
        }));
    }
    drop(outcome_tx);

    let mut errors = Vec::new();
    let mut panicked = 0usize;
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!("Download task failed: {}", e);
            panicked += 1;
            errors.push(E::from(e));
        }
    }

    let mut completed = Vec::new();
    while let Some(outcome) = outcome_rx.recv().await {
        match outcome {
            Ok(value) => completed.push(value),
            Err(e) => errors.push(e),
        }
    }

    let report = DispatchReport {
        total,
        succeeded: succeeded.load(Ordering::Relaxed),
        failed: failed.load(Ordering::Relaxed) + panicked,
        completed,
        errors,
    };
    debug_assert_eq!(report.outcomes(), total);
    report
}
