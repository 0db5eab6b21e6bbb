//! The three-flight handshake state machine.
//!
//! ```text
//! I -> R: HANDSHAKE_INIT      client-id, session-id, e_I, nonce_I,
//!                             SIG_I(session-id ∥ e_I ∥ nonce_I)
//! I <- R: HANDSHAKE_RESPONSE  client-id, session-id, e_R, nonce_R,
//!                             SIG_R(session-id ∥ e_R ∥ nonce_R ∥ nonce_I)
//! I -> R: HANDSHAKE_COMPLETE  (empty; its presence is the confirmation)
//! ```
//!
//! Mutual signatures over each side's ephemeral and the other side's nonce
//! authenticate fresh key material; binding `nonce_I` into the response
//! prevents reflection and unknown-key-share. Both sides derive
//! `traffic_key = kdf(dh(e_I, e_R), nonce_I ∥ nonce_R ∥ epoch)` and destroy
//! the ephemeral secret and shared secret immediately afterwards, which is
//! what makes the channel forward-secret.

use std::sync::Arc;

use rsa::RsaPublicKey;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::{debug, warn};
use x25519_dalek::SharedSecret;

use crate::core::{
    ChannelError, CodecError, FS_MODE_PFS, HANDSHAKE_TIMEOUT, IV_SIZE, KEY_SIZE, SESSION_ID_SIZE,
};
use crate::crypto::{EphemeralKeypair, Identity, SessionId, TrafficKey, primitives};
use crate::record::SecureChannel;
use crate::session::{SessionPhase, SessionRegistry, SessionState};
use crate::transport::FrameStream;
use crate::wire::{ErrorCode, ErrorRecord, Header, HandshakeRecord, MessageType};

/// Transcript signed by the initiator: `session-id ∥ e_pub ∥ nonce`.
fn init_transcript(
    session_id: SessionId,
    ephemeral_public: &[u8; KEY_SIZE],
    nonce: &[u8; IV_SIZE],
) -> Vec<u8> {
    let mut transcript = Vec::with_capacity(SESSION_ID_SIZE + KEY_SIZE + IV_SIZE);
    transcript.extend_from_slice(&session_id.to_le_bytes());
    transcript.extend_from_slice(ephemeral_public);
    transcript.extend_from_slice(nonce);
    transcript
}

/// Transcript signed by the responder: `session-id ∥ e_pub ∥ nonce_R ∥ nonce_I`.
fn response_transcript(
    session_id: SessionId,
    ephemeral_public: &[u8; KEY_SIZE],
    nonce_r: &[u8; IV_SIZE],
    nonce_i: &[u8; IV_SIZE],
) -> Vec<u8> {
    let mut transcript = Vec::with_capacity(SESSION_ID_SIZE + KEY_SIZE + 2 * IV_SIZE);
    transcript.extend_from_slice(&session_id.to_le_bytes());
    transcript.extend_from_slice(ephemeral_public);
    transcript.extend_from_slice(nonce_r);
    transcript.extend_from_slice(nonce_i);
    transcript
}

/// Derive the epoch-0 traffic key from the ephemeral agreement.
fn derive_initial_key(
    shared: &SharedSecret,
    nonce_i: &[u8; IV_SIZE],
    nonce_r: &[u8; IV_SIZE],
) -> Result<TrafficKey, ChannelError> {
    let mut salt = [0u8; 2 * IV_SIZE + 4];
    salt[..IV_SIZE].copy_from_slice(nonce_i);
    salt[IV_SIZE..2 * IV_SIZE].copy_from_slice(nonce_r);
    salt[2 * IV_SIZE..].copy_from_slice(&0u32.to_le_bytes());
    Ok(primitives::kdf(shared.as_bytes(), &salt)?)
}

/// Drive a transport to an authenticated session as the initiator.
///
/// The whole exchange must finish within [`HANDSHAKE_TIMEOUT`].
pub async fn initiate<T>(
    stream: FrameStream<T>,
    identity: &Identity,
    peer_public: &RsaPublicKey,
) -> Result<SecureChannel<T>, ChannelError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    match timeout(HANDSHAKE_TIMEOUT, initiate_inner(stream, identity, peer_public)).await {
        Ok(result) => result,
        Err(_) => Err(ChannelError::Timeout),
    }
}

async fn initiate_inner<T>(
    mut stream: FrameStream<T>,
    identity: &Identity,
    peer_public: &RsaPublicKey,
) -> Result<SecureChannel<T>, ChannelError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut state = SessionState::new_initiator();
    let ephemeral = EphemeralKeypair::generate();
    let nonce_i: [u8; IV_SIZE] = primitives::random_bytes();

    let transcript = init_transcript(state.session_id(), &ephemeral.public_bytes(), &nonce_i);
    let record = HandshakeRecord {
        client_id: state.client_id(),
        session_id: state.session_id(),
        mode: FS_MODE_PFS,
        ephemeral_public: ephemeral.public_bytes(),
        nonce: nonce_i,
        signature: identity.sign(&transcript)?,
    };
    let payload = record.to_bytes();
    let header = Header::new(MessageType::HandshakeInit, 0, payload.len() as u16);
    stream.write_frame(&header, &payload).await?;
    state.advance(SessionPhase::AwaitResponse)?;

    let (resp_header, resp_payload) = stream.read_frame().await?;
    match resp_header.message_type {
        MessageType::HandshakeResponse => {}
        MessageType::ErrorMessage => {
            let code = ErrorRecord::from_bytes(&resp_payload)?.code;
            warn!(code = %code, "handshake rejected by responder");
            return Err(code.to_channel_error());
        }
        other => {
            let _ = stream.write_error(ErrorCode::ProtocolError).await;
            return Err(ChannelError::Protocol(format!(
                "expected HANDSHAKE_RESPONSE, got {other}"
            )));
        }
    }

    let response = HandshakeRecord::from_bytes(&resp_payload)?;
    if response.session_id != state.session_id() {
        let _ = stream.write_error(ErrorCode::ProtocolError).await;
        return Err(ChannelError::Protocol(
            "handshake response for a different session".into(),
        ));
    }

    let transcript = response_transcript(
        state.session_id(),
        &response.ephemeral_public,
        &response.nonce,
        &nonce_i,
    );
    if !primitives::rsa_verify(peer_public, &transcript, &response.signature) {
        let _ = stream.write_error(ErrorCode::BadSignature).await;
        return Err(ChannelError::AuthFailure);
    }

    // Agreement consumes the ephemeral secret; the shared secret is dropped
    // (zeroized) as soon as the traffic key is derived.
    let shared = ephemeral.agree(&response.ephemeral_public)?;
    let key = derive_initial_key(&shared, &nonce_i, &response.nonce)?;
    drop(shared);
    state.set_traffic_key(key);

    let header = Header::new(MessageType::HandshakeComplete, 0, 0);
    stream.write_frame(&header, &[]).await?;
    state.advance(SessionPhase::Authenticated)?;

    debug!(session = %state.session_id(), "handshake completed (initiator)");
    Ok(SecureChannel::new(stream, state, None))
}

/// Drive a transport to an authenticated session as the responder.
///
/// The whole exchange must finish within [`HANDSHAKE_TIMEOUT`].
pub async fn respond<T>(
    stream: FrameStream<T>,
    identity: &Identity,
    peer_public: &RsaPublicKey,
    registry: Arc<SessionRegistry>,
) -> Result<SecureChannel<T>, ChannelError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    match timeout(
        HANDSHAKE_TIMEOUT,
        respond_inner(stream, identity, peer_public, registry),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(ChannelError::Timeout),
    }
}

async fn respond_inner<T>(
    mut stream: FrameStream<T>,
    identity: &Identity,
    peer_public: &RsaPublicKey,
    registry: Arc<SessionRegistry>,
) -> Result<SecureChannel<T>, ChannelError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let (init_header, init_payload) = match stream.read_frame().await {
        Ok(frame) => frame,
        Err(e) => {
            // A peer speaking an unsupported version must be told so.
            if matches!(
                e,
                ChannelError::Malformed(CodecError::UnsupportedVersion(_))
            ) {
                let _ = stream.write_error(ErrorCode::ProtocolError).await;
            }
            return Err(e);
        }
    };
    match init_header.message_type {
        MessageType::HandshakeInit => {}
        MessageType::ErrorMessage => {
            let code = ErrorRecord::from_bytes(&init_payload)?.code;
            return Err(code.to_channel_error());
        }
        other => {
            let _ = stream.write_error(ErrorCode::ProtocolError).await;
            return Err(ChannelError::Protocol(format!(
                "expected HANDSHAKE_INIT, got {other}"
            )));
        }
    }

    let init = HandshakeRecord::from_bytes(&init_payload)?;

    let transcript = init_transcript(init.session_id, &init.ephemeral_public, &init.nonce);
    if !primitives::rsa_verify(peer_public, &transcript, &init.signature) {
        warn!(session = %init.session_id, "rejecting handshake: bad initiator signature");
        let _ = stream.write_error(ErrorCode::BadSignature).await;
        return Err(ChannelError::AuthFailure);
    }

    if !registry.try_register(init.session_id) {
        let _ = stream.write_error(ErrorCode::DuplicateSession).await;
        return Err(ChannelError::Protocol(format!(
            "duplicate session id {}",
            init.session_id
        )));
    }

    match respond_registered(&mut stream, identity, &init).await {
        Ok(state) => {
            debug!(session = %state.session_id(), "handshake completed (responder)");
            Ok(SecureChannel::new(stream, state, Some(registry)))
        }
        Err(e) => {
            registry.deregister(init.session_id);
            Err(e)
        }
    }
}

async fn respond_registered<T>(
    stream: &mut FrameStream<T>,
    identity: &Identity,
    init: &HandshakeRecord,
) -> Result<SessionState, ChannelError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut state = SessionState::new_responder(init.session_id, init.client_id);
    let ephemeral = EphemeralKeypair::generate();
    let nonce_r: [u8; IV_SIZE] = primitives::random_bytes();

    let transcript = response_transcript(
        init.session_id,
        &ephemeral.public_bytes(),
        &nonce_r,
        &init.nonce,
    );
    let record = HandshakeRecord {
        client_id: init.client_id,
        session_id: init.session_id,
        mode: FS_MODE_PFS,
        ephemeral_public: ephemeral.public_bytes(),
        nonce: nonce_r,
        signature: identity.sign(&transcript)?,
    };
    let payload = record.to_bytes();
    let header = Header::new(MessageType::HandshakeResponse, 0, payload.len() as u16);
    stream.write_frame(&header, &payload).await?;

    let shared = ephemeral.agree(&init.ephemeral_public)?;
    let key = derive_initial_key(&shared, &init.nonce, &nonce_r)?;
    drop(shared);
    state.set_traffic_key(key);
    state.advance(SessionPhase::AwaitComplete)?;

    let (complete_header, complete_payload) = stream.read_frame().await?;
    match complete_header.message_type {
        MessageType::HandshakeComplete => {}
        MessageType::ErrorMessage => {
            let code = ErrorRecord::from_bytes(&complete_payload)?.code;
            warn!(code = %code, "handshake aborted by initiator");
            return Err(code.to_channel_error());
        }
        other => {
            let _ = stream.write_error(ErrorCode::ProtocolError).await;
            return Err(ChannelError::Protocol(format!(
                "expected HANDSHAKE_COMPLETE, got {other}"
            )));
        }
    }
    state.advance(SessionPhase::Authenticated)?;

    Ok(state)
}
