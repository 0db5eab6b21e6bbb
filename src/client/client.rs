//! High-level SECLINK client API.
//!
//! Connects to a server over TCP and drives the handshake, yielding a
//! [`SecureChannel`] for application traffic.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rsa::RsaPublicKey;
use tokio::net::TcpStream;
use tracing::debug;

use crate::core::{ChannelError, DEFAULT_PORT, DEFAULT_READ_TIMEOUT};
use crate::crypto::Identity;
use crate::handshake;
use crate::record::SecureChannel;
use crate::transport::FrameStream;

/// Client configuration.
///
/// The server's long-term public key is supplied out-of-band; there is no
/// certificate infrastructure.
pub struct ClientConfig {
    /// Server address to connect to.
    pub server_addr: SocketAddr,

    /// This endpoint's long-term identity, shared read-only across sessions.
    pub identity: Arc<Identity>,

    /// The server's long-term public key.
    pub server_public_key: RsaPublicKey,

    /// Idle budget for each read from the transport.
    pub read_timeout: Duration,
}

impl ClientConfig {
    /// Create a configuration for the default port on localhost.
    pub fn new(identity: Arc<Identity>, server_public_key: RsaPublicKey) -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            identity,
            server_public_key,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Set the server address.
    pub fn with_server_addr(mut self, addr: SocketAddr) -> Self {
        self.server_addr = addr;
        self
    }

    /// Set the per-read idle budget.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

/// Open a secure session to a server.
///
/// Establishes the TCP connection, runs the handshake and returns the
/// authenticated channel.
pub async fn connect(config: &ClientConfig) -> Result<SecureChannel<TcpStream>, ChannelError> {
    let stream = TcpStream::connect(config.server_addr).await?;
    stream.set_nodelay(true)?;
    debug!(addr = %config.server_addr, "connected, starting handshake");

    let framed = FrameStream::new(stream).with_read_timeout(config.read_timeout);
    handshake::initiate(framed, &config.identity, &config.server_public_key).await
}
