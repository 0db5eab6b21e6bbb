//! Error types for the SECLINK protocol.

use thiserror::Error;

/// Errors from the cryptographic primitives.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Signature generation failed.
    #[error("signing failed")]
    SigningFailed,

    /// Signature did not verify.
    #[error("signature verification failed")]
    SignatureInvalid,

    /// DH agreement produced a degenerate shared secret.
    #[error("key agreement failed")]
    AgreementFailed,

    /// AEAD encryption failed.
    #[error("AEAD encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (invalid tag or corrupted).
    #[error("AEAD decryption failed (invalid tag or corrupted)")]
    DecryptionFailed,

    /// Key derivation failed.
    #[error("key derivation failed")]
    KeyDerivationFailed,

    /// Sequence space exhausted - a rekey is mandatory before further sends.
    #[error("sequence counter exhausted - rekey required")]
    CounterExhaustion,
}

/// Errors from the wire codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input is shorter than the declared shape.
    #[error("frame too short: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Minimum expected size.
        expected: usize,
        /// Actual size available.
        actual: usize,
    },

    /// Input carries bytes beyond the declared shape.
    #[error("trailing bytes: expected {expected} bytes, got {actual}")]
    TrailingBytes {
        /// Expected exact size.
        expected: usize,
        /// Actual size available.
        actual: usize,
    },

    /// Unknown message type.
    #[error("unknown message type: 0x{0:04x}")]
    UnknownType(u16),

    /// Unknown error code.
    #[error("unknown error code: 0x{0:04x}")]
    UnknownErrorCode(u16),

    /// Unsupported protocol version.
    #[error("unsupported protocol version: 0x{0:04x}")]
    UnsupportedVersion(u16),

    /// Unsupported forward-secrecy mode.
    #[error("unsupported forward-secrecy mode: {0}")]
    UnsupportedMode(u16),

    /// Declared payload size exceeds the protocol maximum.
    #[error("payload size {size} exceeds maximum {max}")]
    Oversize {
        /// Declared size.
        size: usize,
        /// Protocol maximum.
        max: usize,
    },

    /// Embedded length field disagrees with the available bytes.
    #[error("length mismatch: declared {declared}, available {available}")]
    LengthMismatch {
        /// Length declared by the record.
        declared: usize,
        /// Bytes actually available.
        available: usize,
    },
}

/// Errors surfaced by the channel at every core entry point.
///
/// `AuthFailure`, `Replay`, `Malformed` and `Protocol` are always fatal to
/// the session: the session transitions to FAILED, the transport is closed
/// and subsequent operations return [`ChannelError::Closed`].
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Received bytes did not decode.
    #[error("malformed frame: {0}")]
    Malformed(#[from] CodecError),

    /// Unexpected message for the current phase or version.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Signature or AEAD tag check failed.
    #[error("authentication failure")]
    AuthFailure,

    /// Sequence regression or duplicate frame.
    #[error("replay detected")]
    Replay,

    /// An operation exceeded its time budget.
    #[error("operation timed out")]
    Timeout,

    /// The session is closed.
    #[error("session closed")]
    Closed,

    /// A cryptographic primitive failed internally.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl ChannelError {
    /// Whether this error is fatal to the session.
    ///
    /// Every kind except `Closed` tears the session down; `Closed` reports
    /// an already-terminated session.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ChannelError::Closed)
    }
}
