//! Network infrastructure for the client.
//!
//! [`MatrixClient`] owns one connection and speaks the request/reply
//! protocol over it.  Requests that the server never answers (CONFIG and
//! MATRIX) return as soon as they are written; START_PROCESS and
//! STATUS_REQUEST wait for their reply.

use std::net::SocketAddr;
use std::time::Duration;

use matrix_core::protocol::codec::{
    decode_response, encode_frame, encode_matrix, encode_request, parse_header,
};
use matrix_core::protocol::messages::FRAME_HEADER_SIZE;
use matrix_core::{Frame, JobConfig, JobStatus, Matrix, Request, Response};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, info};

/// Errors that can occur in the client network layer.
#[derive(Debug, Error)]
pub enum ClientError {
    /// TCP connection to the server failed.
    #[error("failed to connect to server at {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// An I/O error occurred on the established connection.
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A reply could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] matrix_core::ProtocolError),
    /// The connection was closed by the server.
    #[error("connection closed by server")]
    Closed,
    /// The server answered with a reply that does not fit the request.
    #[error("unexpected reply: {0:?}")]
    UnexpectedReply(Response),
}

/// The server's answer to STATUS_REQUEST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReply {
    Status(JobStatus),
    Result(Matrix),
}

impl From<Response> for StatusReply {
    fn from(response: Response) -> Self {
        match response {
            Response::Status(status) => Self::Status(status),
            Response::Result(matrix) => Self::Result(matrix),
        }
    }
}

/// A connection to the matrix job server.
#[derive(Debug)]
pub struct MatrixClient<S = TcpStream> {
    stream: S,
    config_ack: bool,
}

impl MatrixClient<TcpStream> {
    /// Opens a TCP connection to the server.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConnectFailed`] if the connection is refused.
    pub async fn connect(addr: SocketAddr) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::ConnectFailed { addr, source })?;
        stream.set_nodelay(true)?;
        info!("connected to matrix server at {addr}");
        Ok(Self::from_stream(stream))
    }
}

impl<S> MatrixClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an already-connected stream.
    pub fn from_stream(stream: S) -> Self {
        Self {
            stream,
            config_ack: false,
        }
    }

    /// Expect a status reply after each CONFIG, for servers configured to
    /// acknowledge it.
    pub fn with_config_ack(mut self, config_ack: bool) -> Self {
        self.config_ack = config_ack;
        self
    }

    /// Sends CONFIG.  The server does not answer unless it acknowledges
    /// configurations, and rejects the request silently if a job is running.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the write fails.
    pub async fn configure(&mut self, n: u32, worker_count: u32) -> Result<(), ClientError> {
        self.send(&Request::Config(JobConfig { n, worker_count }))
            .await?;
        if self.config_ack {
            self.read_status().await?;
        }
        Ok(())
    }

    /// Sends MATRIX with the row-major contents of `matrix`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Protocol`] if the matrix is too large for one
    /// frame (nothing is written), or [`ClientError::Io`] if the write fails.
    pub async fn upload_matrix(&mut self, matrix: &Matrix) -> Result<(), ClientError> {
        self.send(&Request::Matrix(encode_matrix(matrix))).await
    }

    /// Sends START_PROCESS and returns the status the server replies with.
    ///
    /// The server sends nothing back if it rejects the request (no matrix,
    /// or a job already running), so only call this once the job is ready.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnexpectedReply`] if the server sends a RESULT.
    pub async fn start(&mut self) -> Result<JobStatus, ClientError> {
        self.send(&Request::StartProcess).await?;
        self.read_status().await
    }

    /// Sends STATUS_REQUEST and returns the status or the finished result.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, disconnect, or an undecodable reply.
    pub async fn request_status(&mut self) -> Result<StatusReply, ClientError> {
        self.send(&Request::StatusRequest).await?;
        Ok(self.read_response().await?.into())
    }

    /// Polls every `interval` until the job finishes or fails.
    ///
    /// Returns [`StatusReply::Result`] with the `n × n` result, or
    /// [`StatusReply::Status`] carrying [`JobStatus::Failed`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnexpectedReply`] if the result is not `n × n`
    /// or the server reports that no job was started.
    pub async fn poll_until_done(
        &mut self,
        interval: Duration,
        n: usize,
    ) -> Result<StatusReply, ClientError> {
        loop {
            match self.request_status().await? {
                StatusReply::Status(JobStatus::InProgress) => {
                    debug!("job in progress; polling again in {interval:?}");
                    time::sleep(interval).await;
                }
                StatusReply::Status(JobStatus::Failed) => {
                    return Ok(StatusReply::Status(JobStatus::Failed))
                }
                StatusReply::Result(matrix) if matrix.n() == n => {
                    return Ok(StatusReply::Result(matrix))
                }
                StatusReply::Result(matrix) => {
                    return Err(ClientError::UnexpectedReply(Response::Result(matrix)))
                }
                StatusReply::Status(status) => {
                    return Err(ClientError::UnexpectedReply(Response::Status(status)))
                }
            }
        }
    }

    // ── Wire helpers ──────────────────────────────────────────────────────────

    async fn send(&mut self, request: &Request) -> Result<(), ClientError> {
        let frame = encode_request(request);
        self.write_frame(&frame).await
    }

    async fn write_frame(&mut self, frame: &Frame) -> Result<(), ClientError> {
        let bytes = encode_frame(frame.tag, &frame.payload)?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        debug!("sent frame tag=0x{:02X} len={}", frame.tag, frame.payload.len());
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Frame, ClientError> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        self.read_exact(&mut header).await?;
        let (tag, length) = parse_header(&header);
        let mut payload = vec![0u8; length as usize];
        self.read_exact(&mut payload).await?;
        Ok(Frame { tag, payload })
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ClientError> {
        match self.stream.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(ClientError::Closed),
            Err(e) => Err(ClientError::Io(e)),
        }
    }

    async fn read_response(&mut self) -> Result<Response, ClientError> {
        let frame = self.read_frame().await?;
        Ok(decode_response(&frame)?)
    }

    async fn read_status(&mut self) -> Result<JobStatus, ClientError> {
        match self.read_response().await? {
            Response::Status(status) => Ok(status),
            other => Err(ClientError::UnexpectedReply(other)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
