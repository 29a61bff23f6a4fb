//! Binary codec for the matrix job protocol.
//!
//! Wire format:
//! ```text
//! [tag:1][payload_len:4][payload:N]
//! ```
//! Total header size: 5 bytes. All multi-byte integers are big-endian.
//!
//! Payload encodings:
//! - CONFIG: `n` (u32) followed by `worker_count` (u32).
//! - MATRIX / RESULT: `n * n` i32 values, row-major.
//! - STATUS_RESP: one status byte.
//! - START_PROCESS / STATUS_REQUEST: contents ignored.

use thiserror::Error;

use crate::domain::matrix::Matrix;
use crate::protocol::messages::{
    Frame, JobConfig, JobStatus, Request, Response, Tag, CONFIG_PAYLOAD_SIZE, FRAME_HEADER_SIZE,
};

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the frame it starts.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The tag byte is not a recognized value.
    #[error("unknown tag: 0x{0:02X}")]
    UnknownTag(u8),

    /// A known tag arrived in the wrong direction (e.g. a client sent RESULT).
    #[error("unexpected {0:?} frame in this direction")]
    UnexpectedDirection(Tag),

    /// The payload length does not match what the tag requires.
    #[error("{tag:?} payload must be {expected} bytes, got {actual}")]
    PayloadSize {
        tag: Tag,
        expected: usize,
        actual: usize,
    },

    /// The payload could not be parsed (field value out of range, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The payload does not fit the 4-byte length field.
    #[error("payload of {0} bytes exceeds the frame length limit")]
    FrameTooLarge(usize),
}

// ── Frames ────────────────────────────────────────────────────────────────────

/// Encodes one frame: tag byte, big-endian payload length, payload.
///
/// # Examples
///
/// ```rust
/// use matrix_core::protocol::codec::{decode_frame, encode_frame};
///
/// let bytes = encode_frame(0x04, &[]).unwrap();
/// assert_eq!(bytes, vec![0x04, 0, 0, 0, 0]);
/// let (frame, consumed) = decode_frame(&bytes).unwrap();
/// assert_eq!(frame.tag, 0x04);
/// assert_eq!(consumed, 5);
/// ```
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] if the payload is 4 GiB or more.
pub fn encode_frame(tag: u8, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let length = frame_length(payload.len())?;
    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.push(tag);
    buf.extend_from_slice(&length.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// The header length field for a payload of `len` bytes.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] if `len` does not fit in a `u32`.
pub fn frame_length(len: usize) -> Result<u32, ProtocolError> {
    u32::try_from(len).map_err(|_| ProtocolError::FrameTooLarge(len))
}

/// Splits a 5-byte header into the tag and the declared payload length.
pub fn parse_header(header: &[u8; FRAME_HEADER_SIZE]) -> (u8, u32) {
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    (header[0], len)
}

/// Decodes one [`Frame`] from the beginning of `bytes`.
///
/// Returns the frame and the total number of bytes consumed (header +
/// payload), so the caller can advance their read cursor.  Unknown tags are
/// not an error at this level; see [`decode_request`].
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] if the header or the declared
/// payload is not fully present yet.
pub fn decode_frame(bytes: &[u8]) -> Result<(Frame, usize), ProtocolError> {
    if bytes.len() < FRAME_HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: FRAME_HEADER_SIZE,
            available: bytes.len(),
        });
    }
    let tag = bytes[0];
    let len = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);

    let total = FRAME_HEADER_SIZE + len as usize;
    if bytes.len() < total {
        return Err(ProtocolError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }

    let payload = bytes[FRAME_HEADER_SIZE..total].to_vec();
    Ok((Frame { tag, payload }, total))
}

// ── Requests (client → server) ────────────────────────────────────────────────

/// Interprets a frame received by the server.
///
/// # Errors
///
/// - [`ProtocolError::UnknownTag`] for unrecognized tag bytes.
/// - [`ProtocolError::UnexpectedDirection`] for RESULT / STATUS_RESP.
/// - [`ProtocolError::PayloadSize`] for a CONFIG payload that is not 8 bytes.
pub fn decode_request(frame: &Frame) -> Result<Request, ProtocolError> {
    let tag = frame.known_tag().ok_or(ProtocolError::UnknownTag(frame.tag))?;
    match tag {
        Tag::Config => decode_config(&frame.payload).map(Request::Config),
        Tag::Matrix => Ok(Request::Matrix(frame.payload.clone())),
        Tag::StartProcess => Ok(Request::StartProcess),
        Tag::StatusRequest => Ok(Request::StatusRequest),
        Tag::Result | Tag::StatusResp => Err(ProtocolError::UnexpectedDirection(tag)),
    }
}

/// Builds the frame a client sends for `request`.
pub fn encode_request(request: &Request) -> Frame {
    match request {
        Request::Config(config) => Frame::new(Tag::Config, encode_config(config)),
        Request::Matrix(payload) => Frame::new(Tag::Matrix, payload.clone()),
        // The payload byte is ignored by the server; clients conventionally send 0x01.
        Request::StartProcess => Frame::new(Tag::StartProcess, vec![0x01]),
        Request::StatusRequest => Frame::new(Tag::StatusRequest, Vec::new()),
    }
}

// ── Responses (server → client) ───────────────────────────────────────────────

/// Builds the frame the server sends for `response`.
pub fn encode_response(response: &Response) -> Frame {
    match response {
        Response::Status(status) => Frame::new(Tag::StatusResp, vec![*status as u8]),
        Response::Result(matrix) => Frame::new(Tag::Result, encode_matrix(matrix)),
    }
}

/// Interprets a frame received by a client.
///
/// The RESULT side length is inferred from the payload size, which must be
/// `n * n * 4` for some `n`.
///
/// # Errors
///
/// Returns [`ProtocolError`] for request tags, unknown tags or status codes,
/// and RESULT payloads that do not describe a square matrix.
pub fn decode_response(frame: &Frame) -> Result<Response, ProtocolError> {
    let tag = frame.known_tag().ok_or(ProtocolError::UnknownTag(frame.tag))?;
    match tag {
        Tag::StatusResp => {
            if frame.payload.len() != 1 {
                return Err(ProtocolError::PayloadSize {
                    tag,
                    expected: 1,
                    actual: frame.payload.len(),
                });
            }
            let code = frame.payload[0];
            let status = JobStatus::try_from(code)
                .map_err(|_| ProtocolError::MalformedPayload(format!("unknown status code: {code}")))?;
            Ok(Response::Status(status))
        }
        Tag::Result => {
            let cells = frame.payload.len() / 4;
            let n = integer_sqrt(cells);
            decode_matrix(n, &frame.payload).map(Response::Result)
        }
        _ => Err(ProtocolError::UnexpectedDirection(tag)),
    }
}

// ── Payload helpers ───────────────────────────────────────────────────────────

pub fn encode_config(config: &JobConfig) -> Vec<u8> {
    let mut buf = Vec::with_capacity(CONFIG_PAYLOAD_SIZE);
    buf.extend_from_slice(&config.n.to_be_bytes());
    buf.extend_from_slice(&config.worker_count.to_be_bytes());
    buf
}

/// Decodes an 8-byte CONFIG payload.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadSize`] unless the payload is exactly 8 bytes.
pub fn decode_config(payload: &[u8]) -> Result<JobConfig, ProtocolError> {
    let bytes: &[u8; CONFIG_PAYLOAD_SIZE] =
        payload.try_into().map_err(|_| ProtocolError::PayloadSize {
            tag: Tag::Config,
            expected: CONFIG_PAYLOAD_SIZE,
            actual: payload.len(),
        })?;
    Ok(JobConfig {
        n: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        worker_count: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
    })
}

/// Serializes a matrix as `n * n` big-endian i32 values, row-major.
pub fn encode_matrix(matrix: &Matrix) -> Vec<u8> {
    let mut buf = Vec::with_capacity(matrix.values().len() * 4);
    for value in matrix.values() {
        buf.extend_from_slice(&value.to_be_bytes());
    }
    buf
}

/// Deserializes an `n × n` matrix.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadSize`] unless the payload is exactly
/// `n * n * 4` bytes, or [`ProtocolError::MalformedPayload`] if that size
/// overflows `usize`.
///
/// # Examples
///
/// ```rust
/// use matrix_core::protocol::codec::{decode_matrix, encode_matrix};
/// use matrix_core::Matrix;
///
/// let m = Matrix::from_rows(vec![vec![1, -2], vec![3, 4]]).unwrap();
/// assert_eq!(decode_matrix(2, &encode_matrix(&m)).unwrap(), m);
/// assert!(decode_matrix(3, &encode_matrix(&m)).is_err());
/// ```
pub fn decode_matrix(n: usize, payload: &[u8]) -> Result<Matrix, ProtocolError> {
    let expected = n
        .checked_mul(n)
        .and_then(|cells| cells.checked_mul(4))
        .ok_or_else(|| ProtocolError::MalformedPayload(format!("matrix size {n}x{n} overflows")))?;
    if payload.len() != expected {
        return Err(ProtocolError::PayloadSize {
            tag: Tag::Matrix,
            expected,
            actual: payload.len(),
        });
    }

    let values = payload
        .chunks_exact(4)
        .map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Matrix::from_flat(n, values)
        .ok_or_else(|| ProtocolError::MalformedPayload(format!("matrix is not {n}x{n}")))
}

fn integer_sqrt(value: usize) -> usize {
    let mut root = (value as f64).sqrt() as usize;
    // Correct float rounding in either direction.
    while root * root > value {
        root -= 1;
    }
    while (root + 1) * (root + 1) <= value {
        root += 1;
    }
    root
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_matrix() -> Matrix {
        Matrix::from_rows(vec![vec![5, 2, 9], vec![1, 8, 3], vec![7, 4, 6]]).unwrap()
    }

    // ── Frames ───────────────────────────────────────────────────────────────

    #[test]
    fn test_encode_frame_writes_big_endian_length() {
        let bytes = encode_frame(0x02, &[0xAA; 258]).unwrap();
        assert_eq!(&bytes[..5], &[0x02, 0x00, 0x00, 0x01, 0x02]);
        assert_eq!(bytes.len(), 5 + 258);
    }

    #[test]
    fn test_frame_length_accepts_u32_max() {
        assert_eq!(frame_length(u32::MAX as usize), Ok(u32::MAX));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_frame_length_rejects_payload_over_4gib() {
        // Arrange: one byte past what the length field can describe
        let len = u32::MAX as usize + 1;

        // Act
        let result = frame_length(len);

        // Assert
        assert_eq!(result, Err(ProtocolError::FrameTooLarge(len)));
    }

    #[test]
    fn test_frame_round_trip_for_various_payload_lengths() {
        for len in [0usize, 1, 7, 8, 255, 4096] {
            let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let bytes = encode_frame(0x06, &payload).unwrap();
            let (frame, consumed) = decode_frame(&bytes).expect("decode");
            assert_eq!(consumed, bytes.len());
            assert_eq!(frame.tag, 0x06);
            assert_eq!(frame.payload, payload);
        }
    }

    #[test]
    fn test_decode_frame_keeps_unknown_tag() {
        let bytes = encode_frame(0x7F, &[1, 2]).unwrap();
        let (frame, _) = decode_frame(&bytes).unwrap();
        assert_eq!(frame.tag, 0x7F);
        assert_eq!(frame.known_tag(), None);
    }

    #[test]
    fn test_decode_frame_truncated_header_returns_insufficient_data() {
        let result = decode_frame(&[0x01, 0x00, 0x00]);
        assert_eq!(
            result,
            Err(ProtocolError::InsufficientData {
                needed: 5,
                available: 3
            })
        );
    }

    #[test]
    fn test_decode_frame_truncated_payload_returns_insufficient_data() {
        let mut bytes = encode_frame(0x02, &[0u8; 16]).unwrap();
        bytes.truncate(10);
        assert!(matches!(
            decode_frame(&bytes),
            Err(ProtocolError::InsufficientData { needed: 21, .. })
        ));
    }

    #[test]
    fn test_two_frames_in_one_buffer_decode_independently() {
        let mut buf = encode_frame(0x04, &[]).unwrap();
        buf.extend_from_slice(&encode_frame(0x03, &[0x01]).unwrap());

        let (first, used) = decode_frame(&buf).unwrap();
        let (second, used2) = decode_frame(&buf[used..]).unwrap();

        assert_eq!(first.tag, 0x04);
        assert_eq!(second.payload, vec![0x01]);
        assert_eq!(used + used2, buf.len());
    }

    // ── Requests ─────────────────────────────────────────────────────────────

    #[test]
    fn test_decode_request_config() {
        let frame = Frame::new(Tag::Config, vec![0, 0, 0, 3, 0, 0, 0, 2]);
        assert_eq!(
            decode_request(&frame),
            Ok(Request::Config(JobConfig { n: 3, worker_count: 2 }))
        );
    }

    #[test]
    fn test_decode_request_config_with_seven_bytes_is_payload_size_error() {
        let frame = Frame::new(Tag::Config, vec![0; 7]);
        assert_eq!(
            decode_request(&frame),
            Err(ProtocolError::PayloadSize {
                tag: Tag::Config,
                expected: 8,
                actual: 7
            })
        );
    }

    #[test]
    fn test_decode_request_rejects_server_tags() {
        let frame = Frame::new(Tag::StatusResp, vec![0x00]);
        assert_eq!(
            decode_request(&frame),
            Err(ProtocolError::UnexpectedDirection(Tag::StatusResp))
        );
    }

    #[test]
    fn test_decode_request_unknown_tag() {
        let frame = Frame { tag: 0x42, payload: vec![] };
        assert_eq!(decode_request(&frame), Err(ProtocolError::UnknownTag(0x42)));
    }

    #[test]
    fn test_start_process_payload_is_ignored() {
        let frame = Frame::new(Tag::StartProcess, vec![0xFF, 0xEE]);
        assert_eq!(decode_request(&frame), Ok(Request::StartProcess));
    }

    #[test]
    fn test_encode_request_start_process_sends_one_byte() {
        let frame = encode_request(&Request::StartProcess);
        assert_eq!(frame.tag, Tag::StartProcess as u8);
        assert_eq!(frame.payload.len(), 1);
    }

    // ── Responses ────────────────────────────────────────────────────────────

    #[test]
    fn test_status_response_round_trip() {
        for status in [
            JobStatus::NotStarted,
            JobStatus::InProgress,
            JobStatus::Finished,
            JobStatus::Failed,
        ] {
            let frame = encode_response(&Response::Status(status));
            assert_eq!(frame.payload, vec![status as u8]);
            assert_eq!(decode_response(&frame), Ok(Response::Status(status)));
        }
    }

    #[test]
    fn test_result_response_infers_side_length() {
        let frame = encode_response(&Response::Result(sample_matrix()));
        assert_eq!(frame.payload.len(), 36);
        assert_eq!(decode_response(&frame), Ok(Response::Result(sample_matrix())));
    }

    #[test]
    fn test_result_response_with_non_square_payload_is_rejected() {
        let frame = Frame::new(Tag::Result, vec![0; 12]);
        assert!(matches!(
            decode_response(&frame),
            Err(ProtocolError::PayloadSize { .. })
        ));
    }

    #[test]
    fn test_decode_response_unknown_status_code() {
        let frame = Frame::new(Tag::StatusResp, vec![0x09]);
        assert!(matches!(
            decode_response(&frame),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    // ── Matrix payloads ──────────────────────────────────────────────────────

    #[test]
    fn test_encode_matrix_is_row_major_big_endian() {
        let m = Matrix::from_rows(vec![vec![1, -1], vec![256, 0]]).unwrap();
        let bytes = encode_matrix(&m);
        assert_eq!(
            bytes,
            vec![
                0, 0, 0, 1, //
                0xFF, 0xFF, 0xFF, 0xFF, //
                0, 0, 1, 0, //
                0, 0, 0, 0,
            ]
        );
    }

    #[test]
    fn test_decode_matrix_size_mismatch() {
        let bytes = encode_matrix(&sample_matrix());
        assert_eq!(
            decode_matrix(2, &bytes),
            Err(ProtocolError::PayloadSize {
                tag: Tag::Matrix,
                expected: 16,
                actual: 36
            })
        );
    }

    #[test]
    fn test_decode_matrix_overflowing_size_is_malformed() {
        assert!(matches!(
            decode_matrix(usize::MAX, &[]),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_integer_sqrt_exact_and_inexact() {
        assert_eq!(integer_sqrt(0), 0);
        assert_eq!(integer_sqrt(9), 3);
        assert_eq!(integer_sqrt(10), 3);
        assert_eq!(integer_sqrt(4096), 64);
    }
}
