//! Cryptographic primitives adapter.
//!
//! A thin capability surface over the fixed ciphersuite: RSA-2048 PKCS#1
//! v1.5 / SHA-256 signatures, X25519 ephemeral agreement, HKDF-SHA256
//! derivation and AES-256-GCM sealing. All functions are pure; only the
//! generating functions consume entropy.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use hkdf::Hkdf;
use rand::{RngCore, rngs::OsRng};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, SharedSecret};
use zeroize::Zeroize;

use crate::core::{CryptoError, IV_SIZE, KEY_SIZE, SIGNATURE_SIZE, TRAFFIC_KEY_SIZE};

/// A symmetric AEAD key for the current epoch.
///
/// Zeroized on drop.
#[derive(Clone)]
pub struct TrafficKey {
    key: [u8; TRAFFIC_KEY_SIZE],
}

impl TrafficKey {
    /// Create a traffic key from raw bytes.
    pub fn from_bytes(key: [u8; TRAFFIC_KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Get the raw key bytes.
    ///
    /// # Security
    /// Handle with care - this exposes sensitive key material.
    pub fn as_bytes(&self) -> &[u8; TRAFFIC_KEY_SIZE] {
        &self.key
    }
}

impl Drop for TrafficKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Fill an array with cryptographically strong random bytes.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// Generate an RSA keypair of the given modulus size.
pub fn rsa_generate(bits: usize) -> Result<(RsaPrivateKey, RsaPublicKey), CryptoError> {
    let mut rng = OsRng;
    let private = RsaPrivateKey::new(&mut rng, bits)
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
    let public = RsaPublicKey::from(&private);
    Ok((private, public))
}

/// Sign a message with an RSA private key (PKCS#1 v1.5, SHA-256).
///
/// The signature length is fixed by the modulus size; for RSA-2048 it is
/// exactly [`SIGNATURE_SIZE`] bytes.
pub fn rsa_sign(private: &RsaPrivateKey, msg: &[u8]) -> Result<[u8; SIGNATURE_SIZE], CryptoError> {
    let signing_key = SigningKey::<Sha256>::new(private.clone());
    let signature = signing_key
        .try_sign(msg)
        .map_err(|_| CryptoError::SigningFailed)?;
    let bytes = signature.to_bytes();
    if bytes.len() != SIGNATURE_SIZE {
        return Err(CryptoError::SigningFailed);
    }
    let mut out = [0u8; SIGNATURE_SIZE];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Verify an RSA signature against a public key.
pub fn rsa_verify(public: &RsaPublicKey, msg: &[u8], sig: &[u8]) -> bool {
    let verifying_key = VerifyingKey::<Sha256>::new(public.clone());
    match Signature::try_from(sig) {
        Ok(signature) => verifying_key.verify(msg, &signature).is_ok(),
        Err(_) => false,
    }
}

/// Generate a fresh X25519 ephemeral keypair.
///
/// The secret half is consumed by [`dh_agree`] and zeroized on drop.
pub fn dh_generate() -> (EphemeralSecret, [u8; KEY_SIZE]) {
    let secret = EphemeralSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    (secret, *public.as_bytes())
}

/// Compute the X25519 shared secret with a peer's public key.
///
/// Consumes the ephemeral secret; the returned shared secret is zeroized
/// when dropped, so callers should drop it as soon as derivation is done.
pub fn dh_agree(
    secret: EphemeralSecret,
    peer_public: &[u8; KEY_SIZE],
) -> Result<SharedSecret, CryptoError> {
    let shared = secret.diffie_hellman(&PublicKey::from(*peer_public));
    if !shared.was_contributory() {
        return Err(CryptoError::AgreementFailed);
    }
    Ok(shared)
}

/// One-shot HKDF-SHA256 extract-and-expand into an AEAD key.
pub fn kdf(ikm: &[u8], salt: &[u8]) -> Result<TrafficKey, CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = [0u8; TRAFFIC_KEY_SIZE];
    hk.expand(b"seclink v1 traffic key", &mut okm)
        .map_err(|_| CryptoError::KeyDerivationFailed)?;
    let key = TrafficKey::from_bytes(okm);
    okm.zeroize();
    Ok(key)
}

/// Encrypt plaintext under AES-256-GCM.
///
/// Returns the ciphertext with the 16-byte tag appended.
pub fn aead_seal(
    key: &TrafficKey,
    iv: &[u8; IV_SIZE],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .encrypt(Nonce::from_slice(iv), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::EncryptionFailed)
}

/// Decrypt a ciphertext-with-tag under AES-256-GCM.
pub fn aead_open(
    key: &TrafficKey,
    iv: &[u8; IV_SIZE],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(iv), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AEAD_TAG_SIZE;

    #[test]
    fn test_random_bytes_distinct() {
        // IV collision probability must be negligible within one epoch.
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10_000 {
            let iv: [u8; IV_SIZE] = random_bytes();
            assert!(seen.insert(iv));
        }
    }

    #[test]
    fn test_rsa_sign_verify_roundtrip() {
        let (private, public) = rsa_generate(2048).unwrap();
        let msg = b"handshake transcript";

        let sig = rsa_sign(&private, msg).unwrap();
        assert!(rsa_verify(&public, msg, &sig));

        // Different message must not verify
        assert!(!rsa_verify(&public, b"other transcript", &sig));
    }

    #[test]
    fn test_rsa_verify_wrong_key_fails() {
        let (private, _) = rsa_generate(2048).unwrap();
        let (_, other_public) = rsa_generate(2048).unwrap();
        let msg = b"handshake transcript";

        let sig = rsa_sign(&private, msg).unwrap();
        assert!(!rsa_verify(&other_public, msg, &sig));
    }

    #[test]
    fn test_rsa_verify_garbage_signature_fails() {
        let (_, public) = rsa_generate(2048).unwrap();
        assert!(!rsa_verify(&public, b"msg", &[0u8; SIGNATURE_SIZE]));
        assert!(!rsa_verify(&public, b"msg", &[0u8; 3]));
    }

    #[test]
    fn test_dh_agreement_symmetric() {
        let (secret_a, public_a) = dh_generate();
        let (secret_b, public_b) = dh_generate();

        let shared_a = dh_agree(secret_a, &public_b).unwrap();
        let shared_b = dh_agree(secret_b, &public_a).unwrap();
        assert_eq!(shared_a.as_bytes(), shared_b.as_bytes());
    }

    #[test]
    fn test_dh_rejects_zero_point() {
        let (secret, _) = dh_generate();
        let result = dh_agree(secret, &[0u8; KEY_SIZE]);
        assert!(matches!(result, Err(CryptoError::AgreementFailed)));
    }

    #[test]
    fn test_kdf_deterministic_and_separated() {
        let ikm = [0x42u8; 32];

        let key_a = kdf(&ikm, b"salt one").unwrap();
        let key_b = kdf(&ikm, b"salt one").unwrap();
        let key_c = kdf(&ikm, b"salt two").unwrap();

        assert_eq!(key_a.as_bytes(), key_b.as_bytes());
        assert_ne!(key_a.as_bytes(), key_c.as_bytes());
    }

    #[test]
    fn test_aead_roundtrip() {
        let key = TrafficKey::from_bytes([0x42; TRAFFIC_KEY_SIZE]);
        let iv = [0x01; IV_SIZE];
        let aad = b"frame header";
        let plaintext = b"Hello, SECLINK!";

        let ciphertext = aead_seal(&key, &iv, aad, plaintext).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len() + AEAD_TAG_SIZE);

        let decrypted = aead_open(&key, &iv, aad, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_aead_wrong_key_fails() {
        let key1 = TrafficKey::from_bytes([0x42; TRAFFIC_KEY_SIZE]);
        let key2 = TrafficKey::from_bytes([0x43; TRAFFIC_KEY_SIZE]);
        let iv = [0x01; IV_SIZE];

        let ciphertext = aead_seal(&key1, &iv, b"aad", b"secret").unwrap();
        let result = aead_open(&key2, &iv, b"aad", &ciphertext);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_aead_wrong_aad_fails() {
        let key = TrafficKey::from_bytes([0x42; TRAFFIC_KEY_SIZE]);
        let iv = [0x01; IV_SIZE];

        let ciphertext = aead_seal(&key, &iv, b"aad one", b"secret").unwrap();
        let result = aead_open(&key, &iv, b"aad two", &ciphertext);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_aead_tamper_fails() {
        let key = TrafficKey::from_bytes([0x42; TRAFFIC_KEY_SIZE]);
        let iv = [0x01; IV_SIZE];

        let mut ciphertext = aead_seal(&key, &iv, b"aad", b"secret").unwrap();
        ciphertext[0] ^= 0x01;

        let result = aead_open(&key, &iv, b"aad", &ciphertext);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_aead_empty_plaintext() {
        let key = TrafficKey::from_bytes([0x42; TRAFFIC_KEY_SIZE]);
        let iv = [0x01; IV_SIZE];

        let ciphertext = aead_seal(&key, &iv, b"aad", b"").unwrap();
        assert_eq!(ciphertext.len(), AEAD_TAG_SIZE);

        let decrypted = aead_open(&key, &iv, b"aad", &ciphertext).unwrap();
        assert!(decrypted.is_empty());
    }
}
