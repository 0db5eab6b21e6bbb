//! Payload record encoding and decoding.
//!
//! Three payload shapes exist: the fixed-size handshake record, the
//! variable-size encrypted record (u16 length-prefixed ciphertext) and the
//! two-byte error record. Decoding is exact: short input, trailing bytes
//! and length disagreements all fail, so `decode(encode(r)) == r` and
//! `decode(b) == Ok(r)` implies `encode(r) == b`.

use super::header::{ErrorCode, Header};
use crate::core::{
    AAD_SIZE, CodecError, ENCRYPTED_RECORD_OVERHEAD, FS_MODE_PFS, HANDSHAKE_RECORD_SIZE,
    ERROR_RECORD_SIZE, IV_SIZE, KEY_SIZE, SESSION_ID_SIZE, SIGNATURE_SIZE,
};
use crate::crypto::{ClientId, SessionId};

/// Handshake flight payload.
///
/// Wire format (322 bytes):
/// ```text
/// +-----------+------------+--------+---------------+--------+-----------+
/// | Client ID | Session ID | Mode   | Ephemeral Key | Nonce  | Signature |
/// | u32 LE    | u128 LE    | u16 LE | 32 bytes      | 12 B   | 256 bytes |
/// +-----------+------------+--------+---------------+--------+-----------+
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct HandshakeRecord {
    /// Initiator-chosen client identifier.
    pub client_id: ClientId,
    /// Initiator-chosen session identifier.
    pub session_id: SessionId,
    /// Forward-secrecy mode; [`FS_MODE_PFS`] is the only defined value.
    pub mode: u16,
    /// Sender's ephemeral X25519 public key.
    pub ephemeral_public: [u8; KEY_SIZE],
    /// Sender's freshness nonce, bound into the key derivation.
    pub nonce: [u8; IV_SIZE],
    /// RSA signature over the sender's handshake transcript.
    pub signature: [u8; SIGNATURE_SIZE],
}

impl HandshakeRecord {
    /// Serialize to the fixed wire layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HANDSHAKE_RECORD_SIZE);
        buf.extend_from_slice(&self.client_id.as_u32().to_le_bytes());
        buf.extend_from_slice(&self.session_id.to_le_bytes());
        buf.extend_from_slice(&self.mode.to_le_bytes());
        buf.extend_from_slice(&self.ephemeral_public);
        buf.extend_from_slice(&self.nonce);
        buf.extend_from_slice(&self.signature);
        buf
    }

    /// Parse from bytes. The input must be exactly one record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HANDSHAKE_RECORD_SIZE {
            return Err(CodecError::Truncated {
                expected: HANDSHAKE_RECORD_SIZE,
                actual: bytes.len(),
            });
        }
        if bytes.len() > HANDSHAKE_RECORD_SIZE {
            return Err(CodecError::TrailingBytes {
                expected: HANDSHAKE_RECORD_SIZE,
                actual: bytes.len(),
            });
        }

        let client_id = ClientId::from_u32(u32::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ]));

        let mut sid = [0u8; SESSION_ID_SIZE];
        sid.copy_from_slice(&bytes[4..20]);
        let session_id = SessionId::from_le_bytes(sid);

        let mode = u16::from_le_bytes([bytes[20], bytes[21]]);
        if mode != FS_MODE_PFS {
            return Err(CodecError::UnsupportedMode(mode));
        }

        let mut ephemeral_public = [0u8; KEY_SIZE];
        ephemeral_public.copy_from_slice(&bytes[22..22 + KEY_SIZE]);

        let nonce_start = 22 + KEY_SIZE;
        let mut nonce = [0u8; IV_SIZE];
        nonce.copy_from_slice(&bytes[nonce_start..nonce_start + IV_SIZE]);

        let sig_start = nonce_start + IV_SIZE;
        let mut signature = [0u8; SIGNATURE_SIZE];
        signature.copy_from_slice(&bytes[sig_start..sig_start + SIGNATURE_SIZE]);

        Ok(Self {
            client_id,
            session_id,
            mode,
            ephemeral_public,
            nonce,
            signature,
        })
    }
}

impl std::fmt::Debug for HandshakeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeRecord")
            .field("client_id", &self.client_id)
            .field("session_id", &self.session_id)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// AEAD-protected application record.
///
/// Wire format (34 bytes + ciphertext):
/// ```text
/// +------------+------------+----------+--------+------------------------+
/// | Session ID | Message ID | IV       | Length | Ciphertext ∥ Tag       |
/// | u128 LE    | u32 LE     | 12 bytes | u16 LE | `Length` bytes         |
/// +------------+------------+----------+--------+------------------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedRecord {
    /// Session this record belongs to.
    pub session_id: SessionId,
    /// Message identifier; equals the header sequence number.
    pub message_id: u32,
    /// Per-record random IV, unique under the current traffic key.
    pub iv: [u8; IV_SIZE],
    /// AEAD ciphertext with the 16-byte tag appended.
    pub ciphertext: Vec<u8>,
}

impl EncryptedRecord {
    /// Serialize to the wire layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ENCRYPTED_RECORD_OVERHEAD + self.ciphertext.len());
        buf.extend_from_slice(&self.session_id.to_le_bytes());
        buf.extend_from_slice(&self.message_id.to_le_bytes());
        buf.extend_from_slice(&self.iv);
        buf.extend_from_slice(&(self.ciphertext.len() as u16).to_le_bytes());
        buf.extend_from_slice(&self.ciphertext);
        buf
    }

    /// Parse from bytes. The input must be exactly one record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < ENCRYPTED_RECORD_OVERHEAD {
            return Err(CodecError::Truncated {
                expected: ENCRYPTED_RECORD_OVERHEAD,
                actual: bytes.len(),
            });
        }

        let mut sid = [0u8; SESSION_ID_SIZE];
        sid.copy_from_slice(&bytes[0..16]);
        let session_id = SessionId::from_le_bytes(sid);

        let message_id = u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);

        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&bytes[20..32]);

        let declared = u16::from_le_bytes([bytes[32], bytes[33]]) as usize;
        let available = bytes.len() - ENCRYPTED_RECORD_OVERHEAD;
        if declared > available {
            return Err(CodecError::LengthMismatch {
                declared,
                available,
            });
        }
        if declared < available {
            return Err(CodecError::TrailingBytes {
                expected: ENCRYPTED_RECORD_OVERHEAD + declared,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            session_id,
            message_id,
            iv,
            ciphertext: bytes[ENCRYPTED_RECORD_OVERHEAD..].to_vec(),
        })
    }
}

/// Error report payload: a single error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorRecord {
    /// The reported error.
    pub code: ErrorCode,
}

impl ErrorRecord {
    /// Serialize to the two-byte wire layout.
    pub fn to_bytes(&self) -> [u8; ERROR_RECORD_SIZE] {
        self.code.as_u16().to_le_bytes()
    }

    /// Parse from bytes. The input must be exactly one record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < ERROR_RECORD_SIZE {
            return Err(CodecError::Truncated {
                expected: ERROR_RECORD_SIZE,
                actual: bytes.len(),
            });
        }
        if bytes.len() > ERROR_RECORD_SIZE {
            return Err(CodecError::TrailingBytes {
                expected: ERROR_RECORD_SIZE,
                actual: bytes.len(),
            });
        }
        let raw = u16::from_le_bytes([bytes[0], bytes[1]]);
        let code = ErrorCode::from_u16(raw).ok_or(CodecError::UnknownErrorCode(raw))?;
        Ok(Self { code })
    }
}

/// Construct the AAD for an encrypted record.
///
/// Layout (exactly 40 bytes):
/// ```text
/// [ header (20) | session_id (16) | message_id (4) ]
/// ```
pub fn record_aad(header: &Header, session_id: SessionId, message_id: u32) -> [u8; AAD_SIZE] {
    let mut aad = [0u8; AAD_SIZE];
    aad[0..20].copy_from_slice(&header.to_bytes());
    aad[20..36].copy_from_slice(&session_id.to_le_bytes());
    aad[36..40].copy_from_slice(&message_id.to_le_bytes());
    aad
}
