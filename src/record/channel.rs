//! The record layer: authenticated encrypted traffic after the handshake.
//!
//! A `SecureChannel` owns its transport and session state exclusively; all
//! operations take `&mut self`, so no two sends can interleave for the
//! same session. Authentication, replay and protocol violations are fatal:
//! the session transitions to FAILED and later calls return `Closed`.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::core::{
    AEAD_TAG_SIZE, ChannelError, ChannelResult, CodecError, ENCRYPTED_RECORD_OVERHEAD, IV_SIZE,
    MAX_PLAINTEXT_SIZE, REKEY_TIMEOUT, SESSION_ID_SIZE,
};
use crate::crypto::{ClientId, SessionId, TrafficKey, primitives};
use crate::session::{SessionPhase, SessionRegistry, SessionState};
use crate::transport::FrameStream;
use crate::wire::{EncryptedRecord, ErrorCode, ErrorRecord, Header, MessageType, record_aad};

/// An authenticated, forward-secret messaging channel.
///
/// Produced by the handshake engine; carries application records in both
/// directions and runs the in-band rekey subprotocol.
pub struct SecureChannel<T> {
    stream: FrameStream<T>,
    state: SessionState,
    registry: Option<Arc<SessionRegistry>>,
    /// Records decrypted while a rekey echo was awaited; drained by `recv`.
    pending: VecDeque<Vec<u8>>,
}

impl<T> SecureChannel<T> {
    pub(crate) fn new(
        stream: FrameStream<T>,
        state: SessionState,
        registry: Option<Arc<SessionRegistry>>,
    ) -> Self {
        Self {
            stream,
            state,
            registry,
            pending: VecDeque::new(),
        }
    }

    /// Get the session ID.
    pub fn session_id(&self) -> SessionId {
        self.state.session_id()
    }

    /// Get the client ID.
    pub fn client_id(&self) -> ClientId {
        self.state.client_id()
    }

    /// Get the current phase.
    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    /// Get the current rekey epoch.
    pub fn epoch(&self) -> u32 {
        self.state.epoch()
    }

    /// Get the send sequence counter for the current epoch.
    pub fn send_seq(&self) -> u32 {
        self.state.send_seq()
    }

    /// Get the highest accepted receive sequence for the current epoch.
    pub fn recv_seq(&self) -> u32 {
        self.state.recv_seq()
    }

    fn ensure_open(&self) -> ChannelResult<()> {
        match self.state.phase() {
            SessionPhase::Authenticated => Ok(()),
            SessionPhase::Closed | SessionPhase::Failed => Err(ChannelError::Closed),
            other => Err(ChannelError::Protocol(format!(
                "record operation in {other:?} phase"
            ))),
        }
    }

    fn deregister(&mut self) {
        if let Some(registry) = &self.registry {
            registry.deregister(self.state.session_id());
        }
    }

    fn fail(&mut self) {
        self.state.fail();
        self.deregister();
    }

    /// Derive the traffic key for the next epoch from the current one.
    ///
    /// `new_key = kdf(current_key, session-id ∥ epoch+1)` - the ratchet
    /// keeps old keys underivable from the new one once zeroized.
    fn next_epoch_key(&self) -> ChannelResult<TrafficKey> {
        let next_epoch = self.state.epoch() + 1;
        let mut salt = [0u8; SESSION_ID_SIZE + 4];
        salt[..SESSION_ID_SIZE].copy_from_slice(&self.state.session_id().to_le_bytes());
        salt[SESSION_ID_SIZE..].copy_from_slice(&next_epoch.to_le_bytes());
        Ok(primitives::kdf(self.state.traffic_key()?.as_bytes(), &salt)?)
    }

    /// Validate, sequence-check and decrypt one received encrypted record.
    ///
    /// Any failure closes the session without emitting an error frame, so
    /// a tampering peer learns nothing about why the record was rejected.
    fn open_record(&mut self, header: &Header, payload: &[u8]) -> ChannelResult<Vec<u8>> {
        let record = match EncryptedRecord::from_bytes(payload) {
            Ok(record) => record,
            Err(e) => {
                self.fail();
                return Err(e.into());
            }
        };

        if record.session_id != self.state.session_id() {
            self.fail();
            return Err(ChannelError::Protocol(
                "record for a different session".into(),
            ));
        }
        if record.message_id != header.sequence {
            self.fail();
            return Err(ChannelError::Protocol(
                "message id disagrees with header sequence".into(),
            ));
        }

        if let Err(e) = self.state.accept_recv_seq(header.sequence) {
            warn!(session = %self.state.session_id(), seq = header.sequence, "replayed record");
            self.fail();
            return Err(e);
        }

        let aad = record_aad(header, self.state.session_id(), record.message_id);
        match primitives::aead_open(
            self.state.traffic_key()?,
            &record.iv,
            &aad,
            &record.ciphertext,
        ) {
            Ok(plaintext) => Ok(plaintext),
            Err(_) => {
                warn!(session = %self.state.session_id(), seq = header.sequence, "undecryptable record");
                self.fail();
                Err(ChannelError::AuthFailure)
            }
        }
    }

    /// Handle a peer-initiated KEY_ROTATION: derive and install the next
    /// epoch's key, then echo the rotation frame.
    async fn answer_rekey(&mut self) -> ChannelResult<()>
    where
        T: AsyncWrite + Unpin,
    {
        self.state.begin_rekey()?;
        let new_key = self.next_epoch_key()?;
        self.state.complete_rekey(new_key)?;

        let header = Header::new(MessageType::KeyRotation, 0, 0);
        if let Err(e) = self.stream.write_frame(&header, &[]).await {
            self.fail();
            return Err(e);
        }
        debug!(session = %self.state.session_id(), epoch = self.state.epoch(), "rekey completed (passive)");
        Ok(())
    }

    fn handle_peer_error(&mut self, payload: &[u8]) -> ChannelError {
        let code = match ErrorRecord::from_bytes(payload) {
            Ok(record) => record.code,
            Err(e) => {
                self.fail();
                return e.into();
            }
        };
        warn!(session = %self.state.session_id(), code = %code, "peer reported error");
        self.fail();
        code.to_channel_error()
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> SecureChannel<T> {
    /// Encrypt and send one application message.
    pub async fn send(&mut self, plaintext: &[u8]) -> ChannelResult<()> {
        self.ensure_open()?;
        if plaintext.len() > MAX_PLAINTEXT_SIZE {
            return Err(ChannelError::Protocol(format!(
                "plaintext of {} bytes exceeds the {MAX_PLAINTEXT_SIZE}-byte record limit",
                plaintext.len()
            )));
        }

        let sequence = self.state.bump_send_seq()?;
        let iv: [u8; IV_SIZE] = primitives::random_bytes();

        let payload_size = ENCRYPTED_RECORD_OVERHEAD + plaintext.len() + AEAD_TAG_SIZE;
        let header = Header::new(MessageType::EncryptedMessage, sequence, payload_size as u16);

        let aad = record_aad(&header, self.state.session_id(), sequence);
        let ciphertext = primitives::aead_seal(self.state.traffic_key()?, &iv, &aad, plaintext)?;

        let record = EncryptedRecord {
            session_id: self.state.session_id(),
            message_id: sequence,
            iv,
            ciphertext,
        };
        if let Err(e) = self.stream.write_frame(&header, &record.to_bytes()).await {
            self.fail();
            return Err(e);
        }
        self.state.touch();
        Ok(())
    }

    /// Receive the next application message.
    ///
    /// Handles peer-initiated rekeys transparently. Returns
    /// [`ChannelError::Closed`] after an orderly CLOSE from the peer.
    pub async fn recv(&mut self) -> ChannelResult<Vec<u8>> {
        if let Some(message) = self.pending.pop_front() {
            return Ok(message);
        }
        self.ensure_open()?;

        loop {
            let (header, payload) = match self.stream.read_frame().await {
                Ok(frame) => frame,
                Err(e) => {
                    if matches!(
                        e,
                        ChannelError::Malformed(CodecError::UnsupportedVersion(_))
                    ) {
                        let _ = self.stream.write_error(ErrorCode::ProtocolError).await;
                    }
                    self.fail();
                    return Err(e);
                }
            };
            self.state.touch();

            match header.message_type {
                MessageType::EncryptedMessage => return self.open_record(&header, &payload),
                MessageType::KeyRotation => {
                    self.answer_rekey().await?;
                }
                MessageType::ErrorMessage => return Err(self.handle_peer_error(&payload)),
                MessageType::Close => {
                    debug!(session = %self.state.session_id(), "peer closed session");
                    self.state.close();
                    self.deregister();
                    return Err(ChannelError::Closed);
                }
                other => {
                    let _ = self.stream.write_error(ErrorCode::ProtocolError).await;
                    self.fail();
                    return Err(ChannelError::Protocol(format!(
                        "unexpected {other} frame on an authenticated session"
                    )));
                }
            }
        }
    }

    /// Initiate a key rotation and wait for the peer's echo.
    ///
    /// No new application sends are admitted until the rotation completes;
    /// records already in flight under the old key are decrypted and held
    /// for subsequent `recv` calls.
    pub async fn rotate(&mut self) -> ChannelResult<()> {
        self.ensure_open()?;
        self.state.begin_rekey()?;

        let header = Header::new(MessageType::KeyRotation, 0, 0);
        if let Err(e) = self.stream.write_frame(&header, &[]).await {
            self.fail();
            return Err(e);
        }

        match timeout(REKEY_TIMEOUT, self.await_rekey_echo()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(session = %self.state.session_id(), "rekey echo timed out");
                self.fail();
                Err(ChannelError::Timeout)
            }
        }
    }

    async fn await_rekey_echo(&mut self) -> ChannelResult<()> {
        loop {
            let (header, payload) = match self.stream.read_frame().await {
                Ok(frame) => frame,
                Err(e) => {
                    self.fail();
                    return Err(e);
                }
            };
            self.state.touch();

            match header.message_type {
                MessageType::KeyRotation => {
                    let new_key = self.next_epoch_key()?;
                    self.state.complete_rekey(new_key)?;
                    debug!(session = %self.state.session_id(), epoch = self.state.epoch(), "rekey completed (active)");
                    return Ok(());
                }
                // Sealed under the pre-rekey key while our request was in
                // flight; deliver on the next recv.
                MessageType::EncryptedMessage => {
                    let message = self.open_record(&header, &payload)?;
                    self.pending.push_back(message);
                }
                MessageType::ErrorMessage => return Err(self.handle_peer_error(&payload)),
                MessageType::Close => {
                    self.state.close();
                    self.deregister();
                    return Err(ChannelError::Closed);
                }
                other => {
                    let _ = self.stream.write_error(ErrorCode::ProtocolError).await;
                    self.fail();
                    return Err(ChannelError::Protocol(format!(
                        "unexpected {other} frame during rekey"
                    )));
                }
            }
        }
    }

    /// Orderly shutdown: notify the peer and close the session.
    pub async fn close(&mut self) -> ChannelResult<()> {
        if self.state.phase().is_terminal() {
            return Ok(());
        }
        let header = Header::new(MessageType::Close, 0, 0);
        // Best effort - the peer may already be gone.
        let _ = self.stream.write_frame(&header, &[]).await;
        self.state.close();
        self.deregister();
        debug!(session = %self.state.session_id(), "session closed");
        Ok(())
    }
}

impl<T> Drop for SecureChannel<T> {
    fn drop(&mut self) {
        self.deregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Identity;
    use crate::handshake;
    use std::sync::OnceLock;
    use tokio::io::DuplexStream;

    fn client_identity() -> &'static Identity {
        static SLOT: OnceLock<Identity> = OnceLock::new();
        SLOT.get_or_init(|| Identity::generate().unwrap())
    }

    fn server_identity() -> &'static Identity {
        static SLOT: OnceLock<Identity> = OnceLock::new();
        SLOT.get_or_init(|| Identity::generate().unwrap())
    }

    async fn channel_pair() -> (SecureChannel<DuplexStream>, SecureChannel<DuplexStream>) {
        let registry = Arc::new(SessionRegistry::new());
        let (a, b) = tokio::io::duplex(256 * 1024);
        let (client, server) = tokio::join!(
            handshake::initiate(
                FrameStream::new(a),
                client_identity(),
                server_identity().public_key()
            ),
            handshake::respond(
                FrameStream::new(b),
                server_identity(),
                client_identity().public_key(),
                registry
            ),
        );
        (client.unwrap(), server.unwrap())
    }

    #[tokio::test]
    async fn test_bidirectional_roundtrip() {
        let (mut client, mut server) = channel_pair().await;

        client.send(b"ping").await.unwrap();
        assert_eq!(server.recv().await.unwrap(), b"ping");

        server.send(b"pong").await.unwrap();
        assert_eq!(client.recv().await.unwrap(), b"pong");

        assert_eq!(server.recv_seq(), 1);
        assert_eq!(client.recv_seq(), 1);
    }

    #[tokio::test]
    async fn test_empty_message_roundtrip() {
        let (mut client, mut server) = channel_pair().await;

        client.send(b"").await.unwrap();
        assert_eq!(server.recv().await.unwrap(), b"");
    }

    #[tokio::test]
    async fn test_send_rejects_oversized_plaintext() {
        let (mut client, _server) = channel_pair().await;

        let oversized = vec![0u8; MAX_PLAINTEXT_SIZE + 1];
        let result = client.send(&oversized).await;
        assert!(matches!(result, Err(ChannelError::Protocol(_))));

        // Not fatal: the channel still works at the limit
        let exact = vec![0u8; MAX_PLAINTEXT_SIZE];
        client.send(&exact).await.unwrap();
    }

    #[tokio::test]
    async fn test_rotate_advances_epoch_and_resets_counters() {
        let (mut client, mut server) = channel_pair().await;

        for _ in 0..3 {
            client.send(b"before rekey").await.unwrap();
            server.recv().await.unwrap();
        }

        // The server answers the rotation inside its recv loop and then
        // returns the first post-rekey record.
        let client_task = async {
            client.rotate().await.unwrap();
            let after_rotate = (client.epoch(), client.send_seq(), client.recv_seq());
            client.send(b"after rekey").await.unwrap();
            (client, after_rotate)
        };
        let server_task = async {
            let message = server.recv().await.unwrap();
            (server, message)
        };
        let ((client, after_rotate), (server, message)) = tokio::join!(client_task, server_task);

        assert_eq!(after_rotate, (1, 0, 0));
        assert_eq!(message, b"after rekey");
        assert_eq!(server.epoch(), 1);
        assert_eq!(server.send_seq(), 0);
        assert_eq!(server.recv_seq(), 1);
        assert_eq!(client.send_seq(), 1);
    }

    #[tokio::test]
    async fn test_close_is_orderly() {
        let (mut client, mut server) = channel_pair().await;

        client.close().await.unwrap();
        assert_eq!(client.phase(), SessionPhase::Closed);

        let result = server.recv().await;
        assert!(matches!(result, Err(ChannelError::Closed)));
        assert_eq!(server.phase(), SessionPhase::Closed);

        // Operations after close report Closed
        assert!(matches!(
            client.send(b"late").await,
            Err(ChannelError::Closed)
        ));
        assert!(matches!(client.recv().await, Err(ChannelError::Closed)));
    }

    #[tokio::test]
    async fn test_registry_released_on_close() {
        let registry = Arc::new(SessionRegistry::new());
        let (a, b) = tokio::io::duplex(256 * 1024);
        let (client, server) = tokio::join!(
            handshake::initiate(
                FrameStream::new(a),
                client_identity(),
                server_identity().public_key()
            ),
            handshake::respond(
                FrameStream::new(b),
                server_identity(),
                client_identity().public_key(),
                registry.clone()
            ),
        );
        let _client = client.unwrap();
        let mut server = server.unwrap();

        assert_eq!(registry.len(), 1);
        server.close().await.unwrap();
        assert!(registry.is_empty());
    }

}
