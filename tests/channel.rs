//! End-to-end channel scenarios: happy path, replay, tampering, rekeying,
//! wrong peer identity and truncated frames.
//!
//! Attacks are mounted by a frame-level man-in-the-middle pump sitting
//! between the two endpoints: it forwards frames verbatim until its tap
//! decides to duplicate, corrupt or truncate one.

use std::sync::{Arc, OnceLock};

use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

use seclink_protocol::client::{ClientConfig, connect};
use seclink_protocol::core::ChannelError;
use seclink_protocol::crypto::Identity;
use seclink_protocol::handshake;
use seclink_protocol::server::{SeclinkServer, ServerConfig};
use seclink_protocol::session::{SessionPhase, SessionRegistry};
use seclink_protocol::transport::FrameStream;
use seclink_protocol::wire::{EncryptedRecord, Header, MessageType};
use seclink_protocol::SecureChannel;

fn client_identity() -> Arc<Identity> {
    static SLOT: OnceLock<Arc<Identity>> = OnceLock::new();
    SLOT.get_or_init(|| Arc::new(Identity::generate().unwrap()))
        .clone()
}

fn server_identity() -> Arc<Identity> {
    static SLOT: OnceLock<Arc<Identity>> = OnceLock::new();
    SLOT.get_or_init(|| Arc::new(Identity::generate().unwrap()))
        .clone()
}

/// Establish a session pair over a direct in-memory duplex.
async fn establish_direct() -> (SecureChannel<DuplexStream>, SecureChannel<DuplexStream>) {
    let client_id = client_identity();
    let server_id = server_identity();
    let registry = Arc::new(SessionRegistry::new());

    let (a, b) = tokio::io::duplex(256 * 1024);
    let (client, server) = tokio::join!(
        handshake::initiate(FrameStream::new(a), &client_id, server_id.public_key()),
        handshake::respond(
            FrameStream::new(b),
            &server_id,
            client_id.public_key(),
            registry
        ),
    );
    (client.unwrap(), server.unwrap())
}

/// What the man-in-the-middle does with one client-to-server frame.
enum Action {
    /// Deliver unchanged.
    Forward,
    /// Deliver, then deliver an identical copy.
    Replay,
    /// Flip the first ciphertext byte, then deliver.
    TamperCiphertext,
    /// Deliver the header and half the payload, then hang up.
    Truncate,
}

type Tap = Box<dyn FnMut(&Header, &[u8]) -> Action + Send>;

/// Forward client-to-server frames through the tap.
async fn pump_frames(
    mut from: FrameStream<ReadHalf<DuplexStream>>,
    mut to: WriteHalf<DuplexStream>,
    mut tap: Tap,
) {
    while let Ok((header, payload)) = from.read_frame().await {
        let deliveries: Vec<Vec<u8>> = match tap(&header, &payload) {
            Action::Forward => vec![payload],
            Action::Replay => vec![payload.clone(), payload],
            Action::TamperCiphertext => {
                let mut record = EncryptedRecord::from_bytes(&payload).unwrap();
                record.ciphertext[0] ^= 0x01;
                vec![record.to_bytes()]
            }
            Action::Truncate => {
                let mut frame = header.to_bytes().to_vec();
                frame.extend_from_slice(&payload[..payload.len() / 2]);
                let _ = to.write_all(&frame).await;
                let _ = to.flush().await;
                return; // dropping the write half delivers EOF
            }
        };
        for body in deliveries {
            let mut frame = header.to_bytes().to_vec();
            frame.extend_from_slice(&body);
            if to.write_all(&frame).await.is_err() {
                return;
            }
        }
        if to.flush().await.is_err() {
            return;
        }
    }
}

/// Establish a session pair whose client-to-server path runs through a
/// man-in-the-middle applying `tap`.
async fn establish_via_mitm(
    tap: Tap,
) -> (SecureChannel<DuplexStream>, SecureChannel<DuplexStream>) {
    let client_id = client_identity();
    let server_id = server_identity();
    let registry = Arc::new(SessionRegistry::new());

    let (client_io, mitm_client) = tokio::io::duplex(256 * 1024);
    let (mitm_server, server_io) = tokio::io::duplex(256 * 1024);

    let (mc_read, mut mc_write) = tokio::io::split(mitm_client);
    let (mut ms_read, ms_write) = tokio::io::split(mitm_server);

    // Client-to-server frames pass the tap; the reverse path is a byte copy.
    tokio::spawn(pump_frames(FrameStream::new(mc_read), ms_write, tap));
    tokio::spawn(async move {
        let _ = tokio::io::copy(&mut ms_read, &mut mc_write).await;
    });

    let (client, server) = tokio::join!(
        handshake::initiate(
            FrameStream::new(client_io),
            &client_id,
            server_id.public_key()
        ),
        handshake::respond(
            FrameStream::new(server_io),
            &server_id,
            client_id.public_key(),
            registry
        ),
    );
    (client.unwrap(), server.unwrap())
}

/// Tap acting on the n-th ENCRYPTED_MESSAGE frame (1-based).
fn on_nth_encrypted(n: usize, action: fn() -> Action) -> Tap {
    let mut count = 0;
    Box::new(move |header, _| {
        if header.message_type == MessageType::EncryptedMessage {
            count += 1;
            if count == n {
                return action();
            }
        }
        Action::Forward
    })
}

#[tokio::test]
async fn happy_path_ping_pong() {
    let (mut client, mut server) = establish_direct().await;

    client.send("ping".as_bytes()).await.unwrap();
    assert_eq!(server.recv().await.unwrap(), b"ping");

    server.send("pong".as_bytes()).await.unwrap();
    assert_eq!(client.recv().await.unwrap(), b"pong");

    assert_eq!(server.recv_seq(), 1);
    assert_eq!(client.recv_seq(), 1);

    client.close().await.unwrap();
}

#[tokio::test]
async fn replayed_frame_is_rejected_and_fatal() {
    let (mut client, mut server) =
        establish_via_mitm(on_nth_encrypted(3, || Action::Replay)).await;

    for msg in [b"one".as_slice(), b"two", b"three"] {
        client.send(msg).await.unwrap();
    }

    // The three originals arrive intact.
    assert_eq!(server.recv().await.unwrap(), b"one");
    assert_eq!(server.recv().await.unwrap(), b"two");
    assert_eq!(server.recv().await.unwrap(), b"three");

    // The reinjected copy of the third frame is a replay.
    assert!(matches!(server.recv().await, Err(ChannelError::Replay)));
    assert_eq!(server.phase(), SessionPhase::Failed);
    assert!(matches!(server.recv().await, Err(ChannelError::Closed)));
}

#[tokio::test]
async fn tampered_frame_is_rejected_and_fatal() {
    let (mut client, mut server) =
        establish_via_mitm(on_nth_encrypted(1, || Action::TamperCiphertext)).await;

    client.send(b"sensitive payload").await.unwrap();

    assert!(matches!(
        server.recv().await,
        Err(ChannelError::AuthFailure)
    ));
    assert_eq!(server.phase(), SessionPhase::Failed);
    assert!(matches!(server.recv().await, Err(ChannelError::Closed)));
}

#[tokio::test]
async fn rekey_resets_epoch_and_counters() {
    let (mut client, mut server) = establish_direct().await;

    for i in 0..5u8 {
        client.send(&[i]).await.unwrap();
        assert_eq!(server.recv().await.unwrap(), [i]);
        server.send(&[i, i]).await.unwrap();
        assert_eq!(client.recv().await.unwrap(), [i, i]);
    }
    assert_eq!(client.send_seq(), 5);
    assert_eq!(server.recv_seq(), 5);

    let client_task = async {
        client.rotate().await.unwrap();
        let after_rotate = (client.phase(), client.epoch(), client.send_seq(), client.recv_seq());
        client.send(b"hello").await.unwrap();
        (client, after_rotate)
    };
    let server_task = async {
        let message = server.recv().await.unwrap();
        (server, message)
    };
    let ((client, after_rotate), (mut server, message)) = tokio::join!(client_task, server_task);

    assert_eq!(after_rotate, (SessionPhase::Authenticated, 1, 0, 0));
    assert_eq!(message, b"hello");
    assert_eq!(server.phase(), SessionPhase::Authenticated);
    assert_eq!(server.epoch(), 1);
    assert_eq!(server.send_seq(), 0);
    assert_eq!(server.recv_seq(), 1);

    // The refreshed key carries traffic in both directions.
    server.send(b"hello back").await.unwrap();
    let mut client = client;
    assert_eq!(client.recv().await.unwrap(), b"hello back");
}

#[tokio::test]
async fn wrong_server_identity_is_rejected_before_completion() {
    let client_id = client_identity();
    let server_id = server_identity();
    let unrelated = Identity::generate().unwrap();

    let config = ServerConfig::new(server_id.clone(), client_id.public_key().clone())
        .with_bind_addr("127.0.0.1:0".parse().unwrap());
    let server = SeclinkServer::bind(config).await.unwrap();
    let server_addr = server.local_addr().unwrap();

    // The client expects a key the server does not hold.
    let client_config = ClientConfig::new(client_id, unrelated.public_key().clone())
        .with_server_addr(server_addr);

    let (client, accepted) = tokio::join!(connect(&client_config), server.accept());
    assert!(matches!(client, Err(ChannelError::AuthFailure)));
    assert!(accepted.is_err());
    assert_eq!(server.session_count(), 0);
}

#[tokio::test]
async fn truncated_frame_does_not_yield_plaintext() {
    let (mut client, mut server) =
        establish_via_mitm(on_nth_encrypted(1, || Action::Truncate)).await;

    client.send(b"will be cut short").await.unwrap();

    let result = server.recv().await;
    assert!(matches!(
        result,
        Err(ChannelError::Transport(_)) | Err(ChannelError::Malformed(_))
    ));
    assert_eq!(server.phase(), SessionPhase::Failed);
}
