//! All matrix job protocol message types.
//!
//! Every message travels as one [`Frame`]: a tag byte, a big-endian payload
//! length, and the payload itself.  Requests flow client → server, responses
//! flow server → client.

use serde::{Deserialize, Serialize};

use crate::domain::matrix::Matrix;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Size of the frame header: tag (1) + payload length (4).
pub const FRAME_HEADER_SIZE: usize = 5;

/// Exact payload size of a CONFIG frame: `n` (4) + `worker_count` (4).
pub const CONFIG_PAYLOAD_SIZE: usize = 8;

// ── Tag codes ─────────────────────────────────────────────────────────────────

/// All tag codes defined by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Tag {
    // Client → server
    Config = 0x01,
    Matrix = 0x02,
    StartProcess = 0x03,
    StatusRequest = 0x04,
    // Server → client
    Result = 0x05,
    StatusResp = 0x06,
}

impl Tag {
    /// Returns `true` for tags a client is allowed to send.
    pub fn is_request(self) -> bool {
        matches!(
            self,
            Tag::Config | Tag::Matrix | Tag::StartProcess | Tag::StatusRequest
        )
    }
}

impl TryFrom<u8> for Tag {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(Tag::Config),
            0x02 => Ok(Tag::Matrix),
            0x03 => Ok(Tag::StartProcess),
            0x04 => Ok(Tag::StatusRequest),
            0x05 => Ok(Tag::Result),
            0x06 => Ok(Tag::StatusResp),
            _ => Err(()),
        }
    }
}

// ── Job status codes ──────────────────────────────────────────────────────────

/// One-byte status carried by STATUS_RESP frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum JobStatus {
    #[default]
    NotStarted = 0x00,
    InProgress = 0x01,
    Finished = 0x02,
    /// The job was rejected by validation or aborted before producing a result.
    Failed = 0x03,
}

impl TryFrom<u8> for JobStatus {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x00 => Ok(JobStatus::NotStarted),
            0x01 => Ok(JobStatus::InProgress),
            0x02 => Ok(JobStatus::Finished),
            0x03 => Ok(JobStatus::Failed),
            _ => Err(()),
        }
    }
}

// ── Frame ─────────────────────────────────────────────────────────────────────

/// One length-prefixed message unit as it appears on the wire.
///
/// The tag is kept as the raw byte so that frames with unknown tags can still
/// be decoded, logged, and skipped without losing stream alignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub tag: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(tag: Tag, payload: Vec<u8>) -> Self {
        Self {
            tag: tag as u8,
            payload,
        }
    }

    /// Returns the decoded tag, or `None` when the byte is not a known tag.
    pub fn known_tag(&self) -> Option<Tag> {
        Tag::try_from(self.tag).ok()
    }
}

// ── Typed messages ────────────────────────────────────────────────────────────

/// Parameters carried by a CONFIG frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Side length of the square matrix.
    pub n: u32,
    /// Number of workers the computation is split across.
    pub worker_count: u32,
}

/// A client request decoded from a frame.
///
/// The MATRIX payload stays raw here: its expected size depends on the `n`
/// of the session's current configuration, so the session decodes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Config(JobConfig),
    Matrix(Vec<u8>),
    StartProcess,
    StatusRequest,
}

/// A server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Status(JobStatus),
    Result(Matrix),
}
