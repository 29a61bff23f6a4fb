//! Launching column-minimum jobs on the shared compute pool.
//!
//! Every job runs on one process-wide rayon pool, so the number of compute
//! threads stays fixed no matter how many clients start jobs at once.  The
//! async side only ever sees a [`JobHandle`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::ThreadPool;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use matrix_core::processor::{column_minima_scatter, ConfigError};
use matrix_core::{JobOutcome, JobTicket, Matrix};

/// Starts jobs on a bounded compute pool.
#[derive(Clone)]
pub struct MatrixProcessor {
    pool: Arc<ThreadPool>,
}

impl MatrixProcessor {
    pub fn new(pool: Arc<ThreadPool>) -> Self {
        Self { pool }
    }

    /// Number of threads in the underlying pool.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs `ticket` in the background and returns a handle to its outcome.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn launch(&self, ticket: JobTicket) -> JobHandle {
        let (n, worker_count) = (ticket.n, ticket.worker_count);
        debug!("queueing job on compute pool: n={n}, workers={worker_count}");
        let rx = spawn_on_pool(&self.pool, ticket);

        let task = tokio::spawn(async move {
            match rx.await {
                Ok(PoolReport { result, elapsed }) => {
                    let elapsed_ms = elapsed.as_millis();
                    match result {
                        Ok(matrix) => {
                            info!("job finished: n={n}, workers={worker_count}, {elapsed_ms}ms");
                            JobOutcome::Completed(matrix)
                        }
                        Err(e) => {
                            warn!("job failed after {elapsed_ms}ms: {e}");
                            JobOutcome::Failed(e.to_string())
                        }
                    }
                }
                Err(_) => {
                    warn!("job failed: compute worker panicked");
                    JobOutcome::Failed("compute worker panicked".to_string())
                }
            }
        });

        JobHandle {
            state: JobState::Running(task),
        }
    }
}

/// What a pool thread sends back once the computation returns.
struct PoolReport {
    result: Result<Matrix, ConfigError>,
    /// Time spent computing, excluding any wait in the pool queue.
    elapsed: Duration,
}

fn spawn_on_pool(pool: &Arc<ThreadPool>, ticket: JobTicket) -> oneshot::Receiver<PoolReport> {
    let (tx, rx) = oneshot::channel();
    let compute_pool = Arc::clone(pool);
    let JobTicket {
        matrix,
        n,
        worker_count,
    } = ticket;

    pool.spawn(move || {
        let started = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| {
            column_minima_scatter(&matrix, n, worker_count, &compute_pool)
        }));
        // A panic drops `tx` unsent, which the awaiting task reports.
        if let Ok(result) = result {
            let _ = tx.send(PoolReport {
                result,
                elapsed: started.elapsed(),
            });
        }
    });
    rx
}

#[derive(Debug)]
enum JobState {
    Running(JoinHandle<JobOutcome>),
    Done(JobOutcome),
}

/// A running job.
///
/// Dropping the handle detaches the job: it runs to completion and its
/// outcome is discarded.
#[derive(Debug)]
pub struct JobHandle {
    state: JobState,
}

impl JobHandle {
    /// Waits for the outcome without consuming the handle.  Once the job has
    /// ended, every later call returns the same outcome immediately.
    ///
    /// Cancel-safe: dropping the returned future leaves the job running.
    pub async fn wait(&mut self) -> JobOutcome {
        let task = match &mut self.state {
            JobState::Done(outcome) => return outcome.clone(),
            JobState::Running(task) => task,
        };
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => JobOutcome::Failed("job was cancelled".to_string()),
            Err(e) => JobOutcome::Failed(format!("job task failed: {e}")),
        };
        self.state = JobState::Done(outcome.clone());
        outcome
    }

    /// Waits for the outcome.
    pub async fn join(mut self) -> JobOutcome {
        self.wait().await
    }

    /// Stops waiting for the job.  Gather workers already running on the
    /// compute pool finish, but their result is dropped.
    pub fn abort(&self) {
        if let JobState::Running(task) = &self.state {
            task.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        match &self.state {
            JobState::Running(task) => task.is_finished(),
            JobState::Done(_) => true,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
