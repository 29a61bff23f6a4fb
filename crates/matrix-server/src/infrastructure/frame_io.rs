//! Async frame reading and writing over any byte stream.
//!
//! A frame is a 1-byte tag, a 4-byte big-endian payload length, and the
//! payload.  [`read_frame`] returns exactly one frame per call and never
//! consumes bytes belonging to the next one.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use matrix_core::protocol::codec::{encode_frame, parse_header};
use matrix_core::protocol::messages::FRAME_HEADER_SIZE;
use matrix_core::{Frame, ProtocolError};

/// Errors produced while moving frames over a stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameIoError {
    /// The peer closed the stream, possibly in the middle of a frame.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The header announced a payload larger than the configured limit.
    #[error("payload of {announced} bytes exceeds the {limit}-byte limit")]
    PayloadTooLarge { announced: u32, limit: u32 },

    /// The frame could not be encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn map_read_error(e: std::io::Error) -> FrameIoError {
    match e.kind() {
        std::io::ErrorKind::UnexpectedEof
        | std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::BrokenPipe => FrameIoError::ConnectionClosed,
        _ => FrameIoError::Io(e),
    }
}

/// Reads one complete frame.
///
/// `max_payload` rejects oversized frames before any payload memory is
/// allocated.  `None` accepts any length the header announces.
///
/// # Errors
///
/// - [`FrameIoError::ConnectionClosed`] on EOF, including a truncated frame.
/// - [`FrameIoError::PayloadTooLarge`] if the limit is exceeded.
/// - [`FrameIoError::Io`] for other stream errors.
pub async fn read_frame<R>(reader: &mut R, max_payload: Option<u32>) -> Result<Frame, FrameIoError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_SIZE];
    reader.read_exact(&mut header).await.map_err(map_read_error)?;
    let (tag, length) = parse_header(&header);

    if let Some(limit) = max_payload {
        if length > limit {
            return Err(FrameIoError::PayloadTooLarge {
                announced: length,
                limit,
            });
        }
    }

    let mut payload = vec![0u8; length as usize];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(map_read_error)?;

    trace!("read frame tag=0x{tag:02X} len={length}");
    Ok(Frame { tag, payload })
}

/// Writes one frame and flushes the stream.
///
/// # Errors
///
/// - [`FrameIoError::Protocol`] if the payload does not fit a frame.
/// - [`FrameIoError::Io`] if the write or flush fails.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), FrameIoError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_frame(frame.tag, &frame.payload)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    trace!("wrote frame tag=0x{:02X} len={}", frame.tag, frame.payload.len());
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_core::Tag;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_read_frame_returns_complete_frame() {
        // Arrange
        let bytes = encode_frame(0x04, &[]).unwrap();
        let mut stream = Builder::new().read(&bytes).build();

        // Act
        let frame = read_frame(&mut stream, None).await.unwrap();

        // Assert
        assert_eq!(frame, Frame::new(Tag::StatusRequest, vec![]));
    }

    #[tokio::test]
    async fn test_read_frame_reassembles_split_reads() {
        // Arrange: header and payload arrive in three pieces
        let bytes = encode_frame(0x01, &[0, 0, 0, 3, 0, 0, 0, 1]).unwrap();
        let mut stream = Builder::new()
            .read(&bytes[..2])
            .read(&bytes[2..7])
            .read(&bytes[7..])
            .build();

        // Act
        let frame = read_frame(&mut stream, None).await.unwrap();

        // Assert
        assert_eq!(frame.tag, 0x01);
        assert_eq!(frame.payload, vec![0, 0, 0, 3, 0, 0, 0, 1]);
    }

    #[tokio::test]
    async fn test_read_frame_leaves_following_frame_intact() {
        let mut bytes = encode_frame(0x03, &[1]).unwrap();
        bytes.extend(encode_frame(0x04, &[]).unwrap());
        let mut stream = Builder::new().read(&bytes).build();

        let first = read_frame(&mut stream, None).await.unwrap();
        let second = read_frame(&mut stream, None).await.unwrap();

        assert_eq!(first.tag, 0x03);
        assert_eq!(second.tag, 0x04);
    }

    #[tokio::test]
    async fn test_eof_before_header_is_connection_closed() {
        let mut stream = Builder::new().build();
        let result = read_frame(&mut stream, None).await;
        assert!(matches!(result, Err(FrameIoError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_truncated_payload_is_connection_closed() {
        // Arrange: header announces 8 bytes but only 3 follow
        let mut stream = Builder::new()
            .read(&[0x01, 0, 0, 0, 8])
            .read(&[1, 2, 3])
            .build();

        // Act
        let result = read_frame(&mut stream, None).await;

        // Assert
        assert!(matches!(result, Err(FrameIoError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_oversized_payload_is_rejected_before_reading_it() {
        let mut stream = Builder::new().read(&[0x02, 0, 0, 1, 0]).build();
        let result = read_frame(&mut stream, Some(64)).await;
        assert!(matches!(
            result,
            Err(FrameIoError::PayloadTooLarge {
                announced: 256,
                limit: 64
            })
        ));
    }

    #[tokio::test]
    async fn test_write_frame_emits_header_and_payload() {
        // Arrange: the mock asserts the exact bytes written
        let mut stream = Builder::new().write(&[0x06, 0, 0, 0, 1, 0x02]).build();

        // Act / Assert
        write_frame(&mut stream, &Frame::new(Tag::StatusResp, vec![0x02]))
            .await
            .unwrap();
    }
}
