//! Wire codec: bijective encoding and decoding of frames.
//!
//! Every frame is `Header ∥ Payload`. All multi-byte integers are
//! little-endian on both endpoints.

mod header;
mod records;

pub use header::{ErrorCode, Header, MessageType, unix_timestamp};
pub use records::{EncryptedRecord, ErrorRecord, HandshakeRecord, record_aad};
