//! Per-connection session state machine.
//!
//! A [`Session`] records what a client has sent so far and decides whether
//! each new request is allowed.  It performs no I/O and never starts threads:
//! when a job may start it hands back a [`JobTicket`], and whoever owns the
//! session reports the job's end through [`Session::complete_job`].
//!
//! # Lifecycle
//!
//! ```text
//! Fresh ──CONFIG──► Configured ──MATRIX──► MatrixLoaded ──START──► Processing
//!   ▲                   ▲                       ▲                      │
//!   └───────────────────┴─────── CONFIG ────────┘         Finished / Failed
//! ```
//!
//! A new CONFIG is accepted from any state except `Processing` and resets the
//! matrix, the result, and the job status.  STATUS_REQUEST is valid in every
//! state.

use thiserror::Error;
use tracing::{debug, info};

use crate::domain::matrix::Matrix;
use crate::domain::processor::ConfigError;
use crate::protocol::codec::{decode_matrix, ProtocolError};
use crate::protocol::messages::{JobConfig, JobStatus, Request, Response};

/// A request that arrived in an order the state machine does not allow.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("a job is in progress")]
    JobInProgress,
    #[error("no configuration has been received")]
    NotConfigured,
    #[error("no matrix has been received for the current configuration")]
    MatrixMissing,
}

/// Why a request was rejected.  The session is unchanged in every case.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    State(#[from] StateError),
}

/// Everything a job needs, copied out of the session when it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTicket {
    pub matrix: Matrix,
    pub n: usize,
    pub worker_count: usize,
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed(Matrix),
    Failed(String),
}

/// The effect of an accepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// State changed (or nothing to do); no reply is owed.
    Accepted,
    /// A reply frame must be sent.
    Reply(Response),
    /// The caller must launch the job and send the accompanying reply.
    StartJob { ticket: JobTicket, reply: Response },
}

/// Protocol state for one client connection.
#[derive(Debug, Default)]
pub struct Session {
    n: u32,
    worker_count: u32,
    input_matrix: Option<Matrix>,
    result_matrix: Option<Matrix>,
    configured: bool,
    matrix_loaded: bool,
    job_status: JobStatus,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_status(&self) -> JobStatus {
        self.job_status
    }

    /// The last accepted configuration, if any.
    pub fn config(&self) -> Option<JobConfig> {
        self.configured.then_some(JobConfig {
            n: self.n,
            worker_count: self.worker_count,
        })
    }

    pub fn is_matrix_loaded(&self) -> bool {
        self.matrix_loaded
    }

    pub fn result(&self) -> Option<&Matrix> {
        self.result_matrix.as_ref()
    }

    fn is_processing(&self) -> bool {
        self.job_status == JobStatus::InProgress
    }

    /// Applies one decoded request.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the request is malformed or arrives
    /// out of order.  A rejected request leaves the session untouched.
    pub fn handle(&mut self, request: Request) -> Result<SessionOutcome, TransitionError> {
        match request {
            Request::Config(config) => self.configure(config).map(|()| SessionOutcome::Accepted),
            Request::Matrix(payload) => self.load_matrix(&payload).map(|()| SessionOutcome::Accepted),
            Request::StartProcess => self.start_job().map(|ticket| SessionOutcome::StartJob {
                ticket,
                reply: Response::Status(JobStatus::InProgress),
            }),
            Request::StatusRequest => Ok(SessionOutcome::Reply(self.status_reply())),
        }
    }

    /// Accepts a new configuration and resets everything downstream of it.
    ///
    /// # Errors
    ///
    /// - [`StateError::JobInProgress`] while a job runs.
    /// - [`ConfigError::InvalidDimension`] when `n` is zero.
    pub fn configure(&mut self, config: JobConfig) -> Result<(), TransitionError> {
        if self.is_processing() {
            return Err(StateError::JobInProgress.into());
        }
        if config.n == 0 {
            return Err(ConfigError::InvalidDimension.into());
        }

        self.n = config.n;
        self.worker_count = config.worker_count;
        self.configured = true;
        self.matrix_loaded = false;
        self.input_matrix = None;
        self.result_matrix = None;
        self.job_status = JobStatus::NotStarted;
        info!(
            "configuration accepted: n={}, worker_count={}",
            config.n, config.worker_count
        );
        Ok(())
    }

    /// Decodes and stores an `n × n` matrix for the current configuration.
    ///
    /// A previous result is discarded since it belongs to the old input.
    ///
    /// # Errors
    ///
    /// - [`StateError::JobInProgress`] while a job runs.
    /// - [`StateError::NotConfigured`] before any CONFIG.
    /// - [`ProtocolError::PayloadSize`] when the payload is not `n * n * 4` bytes.
    pub fn load_matrix(&mut self, payload: &[u8]) -> Result<(), TransitionError> {
        if self.is_processing() {
            return Err(StateError::JobInProgress.into());
        }
        if !self.configured {
            return Err(StateError::NotConfigured.into());
        }

        let matrix = decode_matrix(self.n as usize, payload)?;
        self.input_matrix = Some(matrix);
        self.matrix_loaded = true;
        self.result_matrix = None;
        self.job_status = JobStatus::NotStarted;
        info!("matrix received: n={}", self.n);
        Ok(())
    }

    /// Marks the job as running and returns a copy of its inputs.
    ///
    /// # Errors
    ///
    /// - [`StateError::JobInProgress`] if a job already runs.
    /// - [`StateError::NotConfigured`] / [`StateError::MatrixMissing`] when a
    ///   prerequisite is missing.
    pub fn start_job(&mut self) -> Result<JobTicket, TransitionError> {
        if self.is_processing() {
            return Err(StateError::JobInProgress.into());
        }
        if !self.configured {
            return Err(StateError::NotConfigured.into());
        }
        let matrix = match (&self.input_matrix, self.matrix_loaded) {
            (Some(matrix), true) => matrix.clone(),
            _ => return Err(StateError::MatrixMissing.into()),
        };

        self.job_status = JobStatus::InProgress;
        self.result_matrix = None;
        Ok(JobTicket {
            matrix,
            n: self.n as usize,
            worker_count: self.worker_count as usize,
        })
    }

    /// Records the end of the running job.
    ///
    /// Ignored unless a job is in progress.
    pub fn complete_job(&mut self, outcome: JobOutcome) {
        if !self.is_processing() {
            debug!("ignoring completion with no job in progress");
            return;
        }
        match outcome {
            JobOutcome::Completed(matrix) => {
                self.result_matrix = Some(matrix);
                self.job_status = JobStatus::Finished;
            }
            JobOutcome::Failed(reason) => {
                info!("job failed: {reason}");
                self.result_matrix = None;
                self.job_status = JobStatus::Failed;
            }
        }
    }

    /// The reply to STATUS_REQUEST: the result once finished, otherwise the
    /// status code.
    pub fn status_reply(&self) -> Response {
        match (self.job_status, &self.result_matrix) {
            (JobStatus::Finished, Some(result)) => Response::Result(result.clone()),
            (status, _) => Response::Status(status),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
