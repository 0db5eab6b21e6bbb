//! Protocol constants for SECLINK.
//!
//! These values are fixed by the protocol and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// PROTOCOL VERSION
// =============================================================================

/// Protocol version v1.0.
pub const VERSION_1_0: u16 = 0x0100;

// =============================================================================
// CRYPTOGRAPHIC CONSTANTS
// =============================================================================

/// RSA modulus size for long-term identity keys.
pub const RSA_KEY_BITS: usize = 2048;

/// RSA PKCS#1 v1.5 signature size for a 2048-bit key.
pub const SIGNATURE_SIZE: usize = 256;

/// X25519 ephemeral public key size. The DH group is a build-time constant
/// of the protocol, advertised through the forward-secrecy-mode field.
pub const KEY_SIZE: usize = 32;

/// AES-256-GCM key size.
pub const TRAFFIC_KEY_SIZE: usize = 32;

/// AES-GCM IV size; also the size of the handshake freshness nonces.
pub const IV_SIZE: usize = 12;

/// AES-GCM authentication tag size.
pub const AEAD_TAG_SIZE: usize = 16;

/// Session ID size (128-bit).
pub const SESSION_ID_SIZE: usize = 16;

// =============================================================================
// FORWARD SECRECY MODES
// =============================================================================

/// Forward-secrecy mode: ephemeral DH per session. The only defined value.
pub const FS_MODE_PFS: u16 = 1;

// =============================================================================
// FRAME SIZES
// =============================================================================

/// Fixed header size on the wire.
pub const HEADER_SIZE: usize = 20;

/// Handshake record size (client-id + session-id + mode + ephemeral key
/// + nonce + signature).
pub const HANDSHAKE_RECORD_SIZE: usize =
    4 + SESSION_ID_SIZE + 2 + KEY_SIZE + IV_SIZE + SIGNATURE_SIZE;

/// Encrypted record overhead before the ciphertext (session-id +
/// message-id + iv + length prefix).
pub const ENCRYPTED_RECORD_OVERHEAD: usize = SESSION_ID_SIZE + 4 + IV_SIZE + 2;

/// Error record size (a single error code).
pub const ERROR_RECORD_SIZE: usize = 2;

/// Maximum payload size declared in a header.
pub const MAX_MESSAGE_SIZE: usize = 65535;

/// Maximum plaintext accepted by the record layer per message.
pub const MAX_PLAINTEXT_SIZE: usize = MAX_MESSAGE_SIZE - ENCRYPTED_RECORD_OVERHEAD - AEAD_TAG_SIZE;

/// AAD size for encrypted records (header + session-id + message-id).
pub const AAD_SIZE: usize = HEADER_SIZE + SESSION_ID_SIZE + 4;

// =============================================================================
// TIMING CONSTANTS
// =============================================================================

/// Wall-clock budget for the complete handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Budget for a rekey round-trip once initiated.
pub const REKEY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default idle budget for a single read from the transport.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// NETWORK DEFAULTS
// =============================================================================

/// Default TCP port for SECLINK endpoints.
pub const DEFAULT_PORT: u16 = 8080;

/// Default maximum number of concurrent sessions on a server.
pub const DEFAULT_MAX_SESSIONS: usize = 1000;
