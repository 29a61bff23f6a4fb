//! TCP server: accept loop and per-connection frame handling.
//!
//! Each accepted connection gets a Tokio task, a fresh session id, and its
//! own session actor.  Frames are handled strictly one at a time: the next
//! frame is not read until the reply to the previous one (if any) has been
//! written.
//!
//! A semaphore caps the number of live connections.  When every slot is
//! taken the accept loop stops accepting until one frees up; pending
//! connections wait in the OS backlog.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::{spawn_session, Dispatch, MatrixProcessor, SessionHandle, SessionOptions};
use crate::infrastructure::frame_io::{read_frame, write_frame, FrameIoError};
use crate::infrastructure::storage::config::AppConfig;

/// How often the accept loop re-checks the shutdown flag.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Connection-level settings derived from [`AppConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    pub max_connections: usize,
    pub max_payload_bytes: Option<u32>,
    pub session: SessionOptions,
}

impl From<&AppConfig> for ServerSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_connections: config.server.max_connections.max(1),
            max_payload_bytes: config.server.max_payload_bytes,
            session: SessionOptions {
                ack_config: config.server.ack_config,
            },
        }
    }
}

struct ConnectionContext {
    processor: MatrixProcessor,
    settings: ServerSettings,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds the configured address and serves until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the address is invalid or cannot be bound.
pub async fn run_server(
    config: &AppConfig,
    processor: MatrixProcessor,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let addr = config.listen_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind listener on {addr}"))?;

    info!("matrix server listening on {addr}");
    serve(listener, ServerSettings::from(config), processor, running).await
}

/// Runs the accept loop on an already-bound listener.
///
/// Returns once `running` is cleared.  Connections already accepted keep
/// running on their own tasks.
///
/// # Errors
///
/// Returns an error if the connection limiter is closed.
pub async fn serve(
    listener: TcpListener,
    settings: ServerSettings,
    processor: MatrixProcessor,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let limiter = Arc::new(Semaphore::new(settings.max_connections));
    let context = Arc::new(ConnectionContext {
        processor,
        settings,
    });

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Wait for a connection slot, re-checking the flag while full.
        let permit = match timeout(POLL_INTERVAL, Arc::clone(&limiter).acquire_owned()).await {
            Ok(permit) => permit.context("connection limiter closed")?,
            Err(_) => continue,
        };

        match timeout(POLL_INTERVAL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                let ctx = Arc::clone(&context);
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, ctx, permit).await;
                });
            }
            Ok(Err(e)) => {
                error!("accept error: {e}");
            }
            Err(_) => {
                // No connection within the interval; the permit is released.
            }
        }
    }

    Ok(())
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    context: Arc<ConnectionContext>,
    _permit: OwnedSemaphorePermit,
) {
    let session_id = Uuid::new_v4();
    info!("session {session_id}: connected from {peer_addr}");
    if let Err(e) = stream.set_nodelay(true) {
        debug!("session {session_id}: could not set TCP_NODELAY: {e}");
    }

    let (handle, actor) = spawn_session(
        session_id,
        context.processor.clone(),
        context.settings.session,
    );

    match serve_frames(&mut stream, &handle, context.settings.max_payload_bytes).await {
        Ok(()) => info!("session {session_id}: disconnected"),
        Err(e) => warn!("session {session_id}: closed with error: {e:#}"),
    }

    drop(handle);
    match actor.await {
        // Dropping the handle detaches the job; its result is discarded.
        Ok(Some(_job)) => debug!("session {session_id}: job detached"),
        Ok(None) => {}
        Err(e) => error!("session {session_id}: actor task failed: {e}"),
    }
}

/// Reads frames from `stream` until the peer disconnects, forwarding each to
/// the session actor and writing back any reply.
///
/// Rejected frames are logged and skipped; the connection stays open.
///
/// # Errors
///
/// Returns an error on I/O failure, an oversized payload, or if the actor
/// stops unexpectedly.  A clean disconnect returns `Ok(())`.
pub async fn serve_frames<S>(
    stream: &mut S,
    handle: &SessionHandle,
    max_payload: Option<u32>,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let session_id = handle.session_id();
    loop {
        let frame = match read_frame(stream, max_payload).await {
            Ok(frame) => frame,
            Err(FrameIoError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e).context("failed to read frame"),
        };
        debug!(
            "session {session_id}: frame tag=0x{:02X} len={}",
            frame.tag,
            frame.payload.len()
        );

        match handle.dispatch(frame).await? {
            Dispatch::Reply(reply) => write_frame(stream, &reply)
                .await
                .context("failed to write reply")?,
            Dispatch::NoReply => {}
            Dispatch::Rejected(reason) => {
                warn!("session {session_id}: ignoring frame: {reason}");
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
