//! Session actor: owns one connection's [`Session`] and its running job.
//!
//! The connection task never touches session state directly.  It sends each
//! frame over a channel and awaits the reply, while the actor also watches
//! the running job and records its outcome the moment it ends.  Every state
//! change therefore happens on one task, in arrival order.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use matrix_core::protocol::codec::{decode_request, encode_response};
use matrix_core::{
    Frame, JobOutcome, JobStatus, Request, Response, Session, SessionOutcome, TransitionError,
};

use crate::application::job::{JobHandle, MatrixProcessor};

const COMMAND_CHANNEL_CAPACITY: usize = 8;

/// Per-session behaviour switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Reply `STATUS_RESP(NotStarted)` to every accepted CONFIG.
    pub ack_config: bool,
}

/// What the connection should do with a frame after the actor applied it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Send this frame back to the client.
    Reply(Frame),
    /// Accepted; nothing to send.
    NoReply,
    /// Ignored.  The session is unchanged and nothing is sent.
    Rejected(TransitionError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActorError {
    #[error("session actor has stopped")]
    Stopped,
}

enum SessionCommand {
    Frame {
        frame: Frame,
        reply: oneshot::Sender<Dispatch>,
    },
    AwaitJob {
        reply: oneshot::Sender<JobStatus>,
    },
}

/// Sender side of a session actor.
///
/// The actor stops once every handle is dropped.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: Uuid,
    tx: mpsc::Sender<SessionCommand>,
}

impl std::fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Frame { frame, .. } => write!(f, "Frame(tag=0x{:02X})", frame.tag),
            Self::AwaitJob { .. } => f.write_str("AwaitJob"),
        }
    }
}

impl SessionHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Applies one frame to the session.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::Stopped`] if the actor is gone.
    pub async fn dispatch(&self, frame: Frame) -> Result<Dispatch, ActorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Frame { frame, reply })
            .await
            .map_err(|_| ActorError::Stopped)?;
        rx.await.map_err(|_| ActorError::Stopped)
    }

    /// Resolves once no job is running, with the status at that point.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::Stopped`] if the actor is gone.
    pub async fn wait_for_job(&self) -> Result<JobStatus, ActorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::AwaitJob { reply })
            .await
            .map_err(|_| ActorError::Stopped)?;
        rx.await.map_err(|_| ActorError::Stopped)
    }
}

/// Spawns the actor for a new connection.
///
/// The returned task resolves when every [`SessionHandle`] is dropped.  Its
/// output is the job still running at that moment, if any; dropping it lets
/// the job finish detached.
pub fn spawn_session(
    session_id: Uuid,
    processor: MatrixProcessor,
    options: SessionOptions,
) -> (SessionHandle, JoinHandle<Option<JobHandle>>) {
    let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let actor = SessionActor {
        session_id,
        session: Session::new(),
        processor,
        options,
        rx,
        job: None,
        waiters: Vec::new(),
    };
    let task = tokio::spawn(actor.run());
    (SessionHandle { session_id, tx }, task)
}

// ── Actor ─────────────────────────────────────────────────────────────────────

enum Event {
    Command(Option<SessionCommand>),
    JobDone(JobOutcome),
}

struct SessionActor {
    session_id: Uuid,
    session: Session,
    processor: MatrixProcessor,
    options: SessionOptions,
    rx: mpsc::Receiver<SessionCommand>,
    job: Option<JobHandle>,
    waiters: Vec<oneshot::Sender<JobStatus>>,
}

impl SessionActor {
    async fn run(mut self) -> Option<JobHandle> {
        loop {
            let event = match self.job.as_mut() {
                Some(job) => tokio::select! {
                    outcome = job.wait() => Event::JobDone(outcome),
                    command = self.rx.recv() => Event::Command(command),
                },
                None => Event::Command(self.rx.recv().await),
            };

            match event {
                Event::JobDone(outcome) => self.finish_job(outcome),
                Event::Command(Some(SessionCommand::Frame { frame, reply })) => {
                    let dispatch = self.apply(frame);
                    let _ = reply.send(dispatch);
                }
                Event::Command(Some(SessionCommand::AwaitJob { reply })) => {
                    if self.job.is_some() {
                        self.waiters.push(reply);
                    } else {
                        let _ = reply.send(self.session.job_status());
                    }
                }
                Event::Command(None) => break,
            }
        }

        if self.job.is_some() {
            info!("session {}: closed with a job still running", self.session_id);
        } else {
            debug!("session {}: actor stopped", self.session_id);
        }
        self.job.take()
    }

    fn apply(&mut self, frame: Frame) -> Dispatch {
        let request = match decode_request(&frame) {
            Ok(request) => request,
            Err(e) => return Dispatch::Rejected(e.into()),
        };
        let is_config = matches!(request, Request::Config(_));

        match self.session.handle(request) {
            Ok(SessionOutcome::Accepted) if is_config && self.options.ack_config => {
                Dispatch::Reply(encode_response(&Response::Status(self.session.job_status())))
            }
            Ok(SessionOutcome::Accepted) => Dispatch::NoReply,
            Ok(SessionOutcome::Reply(response)) => Dispatch::Reply(encode_response(&response)),
            Ok(SessionOutcome::StartJob { ticket, reply }) => {
                info!(
                    "session {}: starting job n={} workers={}",
                    self.session_id, ticket.n, ticket.worker_count
                );
                self.job = Some(self.processor.launch(ticket));
                Dispatch::Reply(encode_response(&reply))
            }
            Err(e) => Dispatch::Rejected(e),
        }
    }

    fn finish_job(&mut self, outcome: JobOutcome) {
        self.job = None;
        self.session.complete_job(outcome);
        let status = self.session.job_status();
        debug!("session {}: job ended with {status:?}", self.session_id);
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(status);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
