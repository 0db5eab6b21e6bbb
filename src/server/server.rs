//! High-level SECLINK server API.
//!
//! Accepts TCP connections and drives the responder handshake for each,
//! yielding one [`SecureChannel`] per client. Sessions share nothing but
//! the endpoint identity (read-only) and the session-id registry.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rsa::RsaPublicKey;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::core::{
    ChannelError, DEFAULT_MAX_SESSIONS, DEFAULT_PORT, DEFAULT_READ_TIMEOUT,
};
use crate::crypto::Identity;
use crate::handshake;
use crate::record::SecureChannel;
use crate::session::SessionRegistry;
use crate::transport::FrameStream;
use crate::wire::ErrorCode;

/// Server configuration.
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,

    /// This endpoint's long-term identity, shared read-only across sessions.
    pub identity: Arc<Identity>,

    /// The long-term public key clients must prove possession of.
    pub client_public_key: RsaPublicKey,

    /// Maximum number of concurrent sessions.
    pub max_sessions: usize,

    /// Idle budget for each read from a session's transport.
    pub read_timeout: Duration,
}

impl ServerConfig {
    /// Create a configuration binding the default port on all interfaces.
    pub fn new(identity: Arc<Identity>, client_public_key: RsaPublicKey) -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            identity,
            client_public_key,
            max_sessions: DEFAULT_MAX_SESSIONS,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Set the bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the maximum number of concurrent sessions.
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Set the per-read idle budget.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

/// A SECLINK protocol server.
pub struct SeclinkServer {
    listener: TcpListener,
    registry: Arc<SessionRegistry>,
    config: ServerConfig,
}

impl SeclinkServer {
    /// Bind to the configured address.
    pub async fn bind(config: ServerConfig) -> Result<Self, ChannelError> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        debug!(addr = %config.bind_addr, "server listening");
        Ok(Self {
            listener,
            registry: Arc::new(SessionRegistry::new()),
            config,
        })
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ChannelError> {
        Ok(self.listener.local_addr()?)
    }

    /// Get the number of active sessions.
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Accept one connection and drive it to an authenticated session.
    ///
    /// An error terminates only the offending connection; the listener
    /// stays usable.
    pub async fn accept(&self) -> Result<SecureChannel<TcpStream>, ChannelError> {
        let (stream, peer_addr) = self.listener.accept().await?;
        stream.set_nodelay(true)?;

        let mut framed = FrameStream::new(stream).with_read_timeout(self.config.read_timeout);
        if self.registry.len() >= self.config.max_sessions {
            warn!(%peer_addr, "rejecting connection: session limit reached");
            let _ = framed.write_error(ErrorCode::Internal).await;
            return Err(ChannelError::Protocol(format!(
                "session limit of {} reached",
                self.config.max_sessions
            )));
        }

        debug!(%peer_addr, "accepted connection, starting handshake");
        handshake::respond(
            framed,
            &self.config.identity,
            &self.config.client_public_key,
            self.registry.clone(),
        )
        .await
    }
}
