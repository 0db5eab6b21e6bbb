//! Cryptographic layer: primitives adapter and key management.
//!
//! The ciphersuite is fixed (no negotiation): RSA-2048 signatures over
//! handshake transcripts, X25519 ephemeral agreement, HKDF-SHA256 key
//! derivation and AES-256-GCM record protection.

mod keys;
pub mod primitives;

pub use keys::{ClientId, EphemeralKeypair, Identity, SessionId};
pub use primitives::TrafficKey;
