//! Framed I/O over an ordered byte stream.
//!
//! `FrameStream` adapts any reliable, ordered byte stream (a `TcpStream`
//! in production, an in-memory duplex in tests) into whole-frame reads and
//! writes: a fixed header followed by exactly `payload_size` payload bytes.
//! Each read carries a timeout; expiry is fatal to the session.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::core::{ChannelError, DEFAULT_READ_TIMEOUT, HEADER_SIZE};
use crate::wire::{ErrorCode, ErrorRecord, Header, MessageType};

/// Whole-frame reader/writer over an ordered byte stream.
pub struct FrameStream<T> {
    io: T,
    read_timeout: Duration,
}

impl<T> FrameStream<T> {
    /// Wrap a byte stream with the default read timeout.
    pub fn new(io: T) -> Self {
        Self {
            io,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Set the per-read idle budget.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Consume the wrapper, returning the underlying stream.
    pub fn into_inner(self) -> T {
        self.io
    }
}

impl<T: AsyncRead + Unpin> FrameStream<T> {
    /// Read one complete frame.
    ///
    /// Returns the decoded header and the raw payload bytes. Fails with
    /// [`ChannelError::Timeout`] if no complete frame arrives within the
    /// read budget, [`ChannelError::Transport`] on I/O failure or EOF
    /// mid-frame, and [`ChannelError::Malformed`] if the header does not
    /// decode.
    pub async fn read_frame(&mut self) -> Result<(Header, Vec<u8>), ChannelError> {
        let io = &mut self.io;
        let read = async {
            let mut header_buf = [0u8; HEADER_SIZE];
            io.read_exact(&mut header_buf).await?;
            let header = Header::from_bytes(&header_buf)?;

            let mut payload = vec![0u8; header.payload_size as usize];
            io.read_exact(&mut payload).await?;
            Ok::<_, ChannelError>((header, payload))
        };

        match timeout(self.read_timeout, read).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout),
        }
    }
}

impl<T: AsyncWrite + Unpin> FrameStream<T> {
    /// Write one complete frame and flush it.
    pub async fn write_frame(&mut self, header: &Header, payload: &[u8]) -> Result<(), ChannelError> {
        debug_assert_eq!(header.payload_size as usize, payload.len());
        self.io.write_all(&header.to_bytes()).await?;
        self.io.write_all(payload).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Write an ERROR_MESSAGE frame carrying the given code.
    pub async fn write_error(&mut self, code: ErrorCode) -> Result<(), ChannelError> {
        let record = ErrorRecord { code };
        let payload = record.to_bytes();
        let header = Header::new(MessageType::ErrorMessage, 0, payload.len() as u16);
        self.write_frame(&header, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CodecError;

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let (a, b) = tokio::io::duplex(4096);
        let mut writer = FrameStream::new(a);
        let mut reader = FrameStream::new(b);

        let payload = b"frame payload".to_vec();
        let header = Header::new(MessageType::EncryptedMessage, 5, payload.len() as u16);
        writer.write_frame(&header, &payload).await.unwrap();

        let (got_header, got_payload) = reader.read_frame().await.unwrap();
        assert_eq!(got_header, header);
        assert_eq!(got_payload, payload);
    }

    #[tokio::test]
    async fn test_empty_payload_frame() {
        let (a, b) = tokio::io::duplex(4096);
        let mut writer = FrameStream::new(a);
        let mut reader = FrameStream::new(b);

        let header = Header::new(MessageType::KeyRotation, 0, 0);
        writer.write_frame(&header, &[]).await.unwrap();

        let (got_header, got_payload) = reader.read_frame().await.unwrap();
        assert_eq!(got_header.message_type, MessageType::KeyRotation);
        assert!(got_payload.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_frame_is_transport_error() {
        let (mut a, b) = tokio::io::duplex(4096);
        let mut reader = FrameStream::new(b);

        // Header declares 100 payload bytes; deliver only 50, then EOF.
        let header = Header::new(MessageType::EncryptedMessage, 1, 100);
        a.write_all(&header.to_bytes()).await.unwrap();
        a.write_all(&[0u8; 50]).await.unwrap();
        drop(a);

        let result = reader.read_frame().await;
        assert!(matches!(result, Err(ChannelError::Transport(_))));
    }

    #[tokio::test]
    async fn test_undecodable_header_is_malformed() {
        let (mut a, b) = tokio::io::duplex(4096);
        let mut reader = FrameStream::new(b);

        let mut bytes = Header::new(MessageType::Close, 0, 0).to_bytes();
        bytes[2] = 0xEE; // unknown message type
        a.write_all(&bytes).await.unwrap();

        let result = reader.read_frame().await;
        assert!(matches!(
            result,
            Err(ChannelError::Malformed(CodecError::UnknownType(_)))
        ));
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let (_a, b) = tokio::io::duplex(4096);
        let mut reader = FrameStream::new(b).with_read_timeout(Duration::from_millis(50));

        let result = reader.read_frame().await;
        assert!(matches!(result, Err(ChannelError::Timeout)));
    }

    #[tokio::test]
    async fn test_write_error_frame() {
        let (a, b) = tokio::io::duplex(4096);
        let mut writer = FrameStream::new(a);
        let mut reader = FrameStream::new(b);

        writer.write_error(ErrorCode::Replay).await.unwrap();

        let (header, payload) = reader.read_frame().await.unwrap();
        assert_eq!(header.message_type, MessageType::ErrorMessage);
        let record = ErrorRecord::from_bytes(&payload).unwrap();
        assert_eq!(record.code, ErrorCode::Replay);
    }
}
