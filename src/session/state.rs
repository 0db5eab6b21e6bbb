//! Per-connection session state.
//!
//! The state is mutated only by the handshake engine and the record layer,
//! under single-threaded discipline: each session is one task with
//! exclusive ownership of its transport.

use std::time::Instant;

use crate::core::{ChannelError, CryptoError};
use crate::crypto::{ClientId, SessionId, TrafficKey};

/// Session lifecycle phase.
///
/// Transitions are one-way except `Authenticated` ↔ `Rekeying`;
/// `Closed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Created, no flight exchanged yet.
    Init,
    /// Initiator sent HANDSHAKE_INIT, awaiting the response.
    AwaitResponse,
    /// Responder sent HANDSHAKE_RESPONSE, awaiting the confirmation.
    AwaitComplete,
    /// Handshake complete; application records flow.
    Authenticated,
    /// Rekey in flight; application sends are suspended.
    Rekeying,
    /// Orderly shutdown.
    Closed,
    /// Fatal error; the transport has been abandoned.
    Failed,
}

impl SessionPhase {
    /// Whether the phase admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// Whether a transition from `self` to `next` is permitted.
    fn permits(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Init => false,
            Self::AwaitResponse | Self::AwaitComplete => self == Self::Init,
            Self::Authenticated => {
                matches!(self, Self::AwaitResponse | Self::AwaitComplete | Self::Rekeying)
            }
            Self::Rekeying => self == Self::Authenticated,
            Self::Closed | Self::Failed => true,
        }
    }
}

/// The per-connection session data.
pub struct SessionState {
    session_id: SessionId,
    client_id: ClientId,
    phase: SessionPhase,
    traffic_key: Option<TrafficKey>,
    send_seq: u32,
    recv_seq: u32,
    epoch: u32,
    last_activity: Instant,
}

impl SessionState {
    /// Create initiator-side state, choosing fresh session and client IDs.
    pub fn new_initiator() -> Self {
        Self::new(SessionId::generate(), ClientId::generate())
    }

    /// Create responder-side state for identifiers chosen by the initiator.
    pub fn new_responder(session_id: SessionId, client_id: ClientId) -> Self {
        Self::new(session_id, client_id)
    }

    fn new(session_id: SessionId, client_id: ClientId) -> Self {
        Self {
            session_id,
            client_id,
            phase: SessionPhase::Init,
            traffic_key: None,
            send_seq: 0,
            recv_seq: 0,
            epoch: 0,
            last_activity: Instant::now(),
        }
    }

    /// Get the session ID.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Get the client ID.
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Get the current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Get the current epoch.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Get the send sequence counter.
    pub fn send_seq(&self) -> u32 {
        self.send_seq
    }

    /// Get the highest accepted receive sequence.
    pub fn recv_seq(&self) -> u32 {
        self.recv_seq
    }

    /// Advance the phase, enforcing the transition rules.
    pub fn advance(&mut self, next: SessionPhase) -> Result<(), ChannelError> {
        if !self.phase.permits(next) {
            return Err(ChannelError::Protocol(format!(
                "invalid phase transition {:?} -> {:?}",
                self.phase, next
            )));
        }
        self.phase = next;
        Ok(())
    }

    /// Install the traffic key for the current epoch.
    pub fn set_traffic_key(&mut self, key: TrafficKey) {
        self.traffic_key = Some(key);
    }

    /// Get the current traffic key.
    pub fn traffic_key(&self) -> Result<&TrafficKey, ChannelError> {
        self.traffic_key
            .as_ref()
            .ok_or_else(|| ChannelError::Protocol("no traffic key installed".into()))
    }

    /// Take the next send sequence number.
    ///
    /// Sequence numbers start at 1 within each epoch. The counter must not
    /// wrap: once the space is exhausted a rekey is mandatory.
    pub fn bump_send_seq(&mut self) -> Result<u32, ChannelError> {
        if self.send_seq == u32::MAX {
            return Err(ChannelError::Crypto(CryptoError::CounterExhaustion));
        }
        self.send_seq += 1;
        Ok(self.send_seq)
    }

    /// Accept or reject a received sequence number.
    ///
    /// Strictly monotonic: the transport is reliable and ordered, so any
    /// sequence at or below the last accepted one is a replay.
    pub fn accept_recv_seq(&mut self, seq: u32) -> Result<(), ChannelError> {
        if seq <= self.recv_seq {
            return Err(ChannelError::Replay);
        }
        self.recv_seq = seq;
        Ok(())
    }

    /// Suspend application traffic for a rekey.
    pub fn begin_rekey(&mut self) -> Result<(), ChannelError> {
        self.advance(SessionPhase::Rekeying)
    }

    /// Install the next epoch's key, bump the epoch and reset both
    /// sequence counters.
    pub fn complete_rekey(&mut self, new_key: TrafficKey) -> Result<(), ChannelError> {
        if self.phase != SessionPhase::Rekeying {
            return Err(ChannelError::Protocol(
                "rekey completion outside REKEYING phase".into(),
            ));
        }
        self.traffic_key = Some(new_key);
        self.epoch += 1;
        self.send_seq = 0;
        self.recv_seq = 0;
        self.advance(SessionPhase::Authenticated)
    }

    /// Transition to the terminal `Closed` phase.
    pub fn close(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = SessionPhase::Closed;
        }
    }

    /// Transition to the terminal `Failed` phase.
    pub fn fail(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = SessionPhase::Failed;
        }
    }

    /// Record activity on the session.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Time since the last frame was sent or received.
    pub fn idle_time(&self) -> std::time::Duration {
        self.last_activity.elapsed()
    }
}
