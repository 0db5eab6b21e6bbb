//! Identity and ephemeral key management.
//!
//! The long-term identity is an RSA-2048 keypair owned by the endpoint and
//! shared read-only with the sessions it establishes. Ephemeral X25519
//! keypairs live for exactly one agreement; the secret half is consumed by
//! the agreement and zeroized on drop.

use rand::{RngCore, rngs::OsRng};
use rsa::{RsaPrivateKey, RsaPublicKey};
use x25519_dalek::{EphemeralSecret, SharedSecret};

use super::primitives;
use crate::core::{CryptoError, KEY_SIZE, RSA_KEY_BITS, SESSION_ID_SIZE};

/// A long-term RSA identity keypair.
pub struct Identity {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl Identity {
    /// Generate a fresh RSA-2048 identity.
    pub fn generate() -> Result<Self, CryptoError> {
        let (private, public) = primitives::rsa_generate(RSA_KEY_BITS)?;
        Ok(Self { private, public })
    }

    /// Create an identity from an existing private key.
    pub fn from_private_key(private: RsaPrivateKey) -> Self {
        let public = RsaPublicKey::from(&private);
        Self { private, public }
    }

    /// Get the public half.
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Sign a message with the private half.
    pub fn sign(&self, msg: &[u8]) -> Result<[u8; crate::core::SIGNATURE_SIZE], CryptoError> {
        primitives::rsa_sign(&self.private, msg)
    }
}

/// An ephemeral X25519 keypair for a single handshake.
pub struct EphemeralKeypair {
    secret: EphemeralSecret,
    public: [u8; KEY_SIZE],
}

impl EphemeralKeypair {
    /// Generate a fresh ephemeral keypair.
    pub fn generate() -> Self {
        let (secret, public) = primitives::dh_generate();
        Self { secret, public }
    }

    /// Get the public key bytes for the handshake record.
    pub fn public_bytes(&self) -> [u8; KEY_SIZE] {
        self.public
    }

    /// Compute the shared secret with the peer's ephemeral public key.
    ///
    /// Consumes the keypair; the secret half is zeroized by the agreement.
    pub fn agree(self, peer_public: &[u8; KEY_SIZE]) -> Result<SharedSecret, CryptoError> {
        primitives::dh_agree(self.secret, peer_public)
    }
}

/// 128-bit opaque session identifier, chosen by the initiator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(u128);

impl SessionId {
    /// Generate a new random session ID.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_ID_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(u128::from_le_bytes(bytes))
    }

    /// Create from little-endian bytes.
    pub fn from_le_bytes(bytes: [u8; SESSION_ID_SIZE]) -> Self {
        Self(u128::from_le_bytes(bytes))
    }

    /// Get the little-endian byte representation.
    pub fn to_le_bytes(self) -> [u8; SESSION_ID_SIZE] {
        self.0.to_le_bytes()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// 32-bit opaque client identifier, chosen by the initiator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(u32);

impl ClientId {
    /// Generate a new random client ID.
    pub fn generate() -> Self {
        Self(OsRng.next_u32())
    }

    /// Create from a raw value.
    pub fn from_u32(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw value.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}
