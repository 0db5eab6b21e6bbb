//! # SECLINK Protocol
//!
//! SECLINK is a secure two-party messaging channel over an ordered
//! byte-stream transport (TCP). It provides:
//!
//! - **Authentication**: mutual RSA-2048 signatures over fresh handshake
//!   transcripts; both peers know the other's public key out-of-band
//! - **Forward secrecy**: per-session X25519 ephemerals, destroyed after
//!   key derivation
//! - **Confidentiality and integrity**: AES-256-GCM records with strict
//!   sequence discipline and replay rejection
//! - **In-session rekeying**: an epoch-scoped key ratchet, driven by
//!   either peer
//! - **Simplicity**: one fixed ciphersuite, no negotiation
//!
//! ## Modules
//!
//! - [`core`]: constants and error types
//! - [`crypto`]: primitives adapter and key management
//! - [`wire`]: bijective frame codec
//! - [`session`]: per-connection state machine and session registry
//! - [`transport`]: whole-frame I/O over reliable ordered bytes
//! - [`handshake`]: the three-flight handshake engine
//! - [`record`]: the record layer ([`SecureChannel`])
//! - [`client`] / [`server`]: TCP entry points
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use seclink_protocol::prelude::*;
//!
//! # async fn run() -> Result<(), ChannelError> {
//! let identity = Arc::new(Identity::generate()?);
//! # let server_public_key = identity.public_key().clone();
//! let config = ClientConfig::new(identity, server_public_key)
//!     .with_server_addr("127.0.0.1:8080".parse().unwrap());
//!
//! let mut session = seclink_protocol::client::connect(&config).await?;
//! session.send(b"ping").await?;
//! let reply = session.recv().await?;
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod core;
pub mod crypto;
pub mod handshake;
pub mod record;
pub mod server;
pub mod session;
pub mod transport;
pub mod wire;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::client::{ClientConfig, connect};
    pub use crate::core::{ChannelError, ChannelResult, CodecError, CryptoError};
    pub use crate::crypto::{ClientId, Identity, SessionId, TrafficKey};
    pub use crate::record::SecureChannel;
    pub use crate::server::{SeclinkServer, ServerConfig};
    pub use crate::session::{SessionPhase, SessionRegistry, SessionState};
    pub use crate::transport::FrameStream;
    pub use crate::wire::{ErrorCode, Header, MessageType};
}

// Re-export the most commonly used items at the crate root.
pub use crate::core::{ChannelError, ChannelResult};
pub use crate::crypto::Identity;
pub use crate::record::SecureChannel;
