//! Message header encoding and decoding.
//!
//! Every frame on the wire is `Header ∥ Payload`. The header is a fixed
//! 20 bytes, all multi-byte integers little-endian:
//!
//! ```text
//! +---------+---------+----------+-----------+--------------+---------+
//! | Version | Type    | Sequence | Timestamp | Payload Size | Flags   |
//! | u16 LE  | u16 LE  | u32 LE   | u64 LE    | u16 LE       | u16 LE  |
//! +---------+---------+----------+-----------+--------------+---------+
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::{CodecError, HEADER_SIZE, MAX_MESSAGE_SIZE, VERSION_1_0};

/// Message type identifiers (u16 on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    /// First handshake flight (initiator ephemeral + nonce + signature).
    HandshakeInit = 1,
    /// Second handshake flight (responder ephemeral + nonce + signature).
    HandshakeResponse = 2,
    /// Final handshake confirmation (empty payload).
    HandshakeComplete = 3,
    /// AEAD-protected application record.
    EncryptedMessage = 4,
    /// Rekey request or echo (empty payload).
    KeyRotation = 5,
    /// Error report carrying an [`ErrorCode`].
    ErrorMessage = 6,
    /// Orderly shutdown (empty payload).
    Close = 7,
}

impl MessageType {
    /// Parse a message type from its wire value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::HandshakeInit),
            2 => Some(Self::HandshakeResponse),
            3 => Some(Self::HandshakeComplete),
            4 => Some(Self::EncryptedMessage),
            5 => Some(Self::KeyRotation),
            6 => Some(Self::ErrorMessage),
            7 => Some(Self::Close),
            _ => None,
        }
    }

    /// Get the wire value.
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::HandshakeInit => "HANDSHAKE_INIT",
            Self::HandshakeResponse => "HANDSHAKE_RESPONSE",
            Self::HandshakeComplete => "HANDSHAKE_COMPLETE",
            Self::EncryptedMessage => "ENCRYPTED_MESSAGE",
            Self::KeyRotation => "KEY_ROTATION",
            Self::ErrorMessage => "ERROR_MESSAGE",
            Self::Close => "CLOSE",
        };
        f.write_str(name)
    }
}

/// Error codes carried by ERROR_MESSAGE frames (u16 on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    /// Unexpected message for the current phase or version.
    ProtocolError = 1,
    /// A transcript signature did not verify.
    BadSignature = 2,
    /// AEAD open failed.
    DecryptFail = 3,
    /// Sequence regression or duplicate.
    Replay = 4,
    /// A time budget was exceeded.
    Timeout = 5,
    /// Session ID already in use on the responder.
    DuplicateSession = 6,
    /// Internal failure.
    Internal = 7,
}

impl ErrorCode {
    /// Parse an error code from its wire value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::ProtocolError),
            2 => Some(Self::BadSignature),
            3 => Some(Self::DecryptFail),
            4 => Some(Self::Replay),
            5 => Some(Self::Timeout),
            6 => Some(Self::DuplicateSession),
            7 => Some(Self::Internal),
            _ => None,
        }
    }

    /// Get the wire value.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Map an error code reported by the peer to a local channel error.
    pub(crate) fn to_channel_error(self) -> crate::core::ChannelError {
        use crate::core::ChannelError;
        match self {
            Self::BadSignature | Self::DecryptFail => ChannelError::AuthFailure,
            Self::Replay => ChannelError::Replay,
            Self::Timeout => ChannelError::Timeout,
            code => ChannelError::Protocol(format!("peer reported {code}")),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ProtocolError => "PROTOCOL_ERROR",
            Self::BadSignature => "BAD_SIGNATURE",
            Self::DecryptFail => "DECRYPT_FAIL",
            Self::Replay => "REPLAY",
            Self::Timeout => "TIMEOUT",
            Self::DuplicateSession => "DUPLICATE_SESSION",
            Self::Internal => "INTERNAL",
        };
        f.write_str(name)
    }
}

/// The fixed per-frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Protocol version ([`VERSION_1_0`]).
    pub version: u16,
    /// Payload kind.
    pub message_type: MessageType,
    /// Record sequence number; 0 for unsequenced frames.
    pub sequence: u32,
    /// Sender wall-clock, seconds since the Unix epoch.
    pub timestamp: u64,
    /// Exact payload length following this header.
    pub payload_size: u16,
    /// Reserved; always 0 in v1.0.
    pub flags: u16,
}

impl Header {
    /// Create a header for an outgoing frame, stamped with the current time.
    pub fn new(message_type: MessageType, sequence: u32, payload_size: u16) -> Self {
        Self {
            version: VERSION_1_0,
            message_type,
            sequence,
            timestamp: unix_timestamp(),
            payload_size,
            flags: 0,
        }
    }

    /// Serialize to the fixed 20-byte wire layout.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.version.to_le_bytes());
        buf[2..4].copy_from_slice(&self.message_type.as_u16().to_le_bytes());
        buf[4..8].copy_from_slice(&self.sequence.to_le_bytes());
        buf[8..16].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[16..18].copy_from_slice(&self.payload_size.to_le_bytes());
        buf[18..20].copy_from_slice(&self.flags.to_le_bytes());
        buf
    }

    /// Parse a header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_SIZE {
            return Err(CodecError::Truncated {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let version = u16::from_le_bytes([bytes[0], bytes[1]]);
        if version != VERSION_1_0 {
            return Err(CodecError::UnsupportedVersion(version));
        }

        let raw_type = u16::from_le_bytes([bytes[2], bytes[3]]);
        let message_type =
            MessageType::from_u16(raw_type).ok_or(CodecError::UnknownType(raw_type))?;

        let sequence = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&bytes[8..16]);
        let timestamp = u64::from_le_bytes(ts);
        let payload_size = u16::from_le_bytes([bytes[16], bytes[17]]);
        let flags = u16::from_le_bytes([bytes[18], bytes[19]]);

        if payload_size as usize > MAX_MESSAGE_SIZE {
            return Err(CodecError::Oversize {
                size: payload_size as usize,
                max: MAX_MESSAGE_SIZE,
            });
        }

        Ok(Self {
            version,
            message_type,
            sequence,
            timestamp,
            payload_size,
            flags,
        })
    }
}

/// Current wall-clock time in seconds since the Unix epoch.
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
