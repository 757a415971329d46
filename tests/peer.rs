//! End-to-end scenarios driven over the in-memory duplex transport: the
//! happy paths plus the lossy/garbage cases the wire format is meant to
//! survive.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use p2p_core::codec::BARKER;
use p2p_core::testutil::{duplex, DropNthSend};
use p2p_core::{Handler, Peer, PeerConfig};

#[derive(Clone, Default)]
struct RecordingHandler {
    reliable: Arc<Mutex<Vec<Bytes>>>,
    unreliable: Arc<Mutex<Vec<Bytes>>>,
    reliable_stream: Arc<Mutex<Vec<(Bytes, u32)>>>,
    unreliable_stream: Arc<Mutex<Vec<(Bytes, u32)>>>,
    files: Arc<Mutex<Vec<(String, Bytes)>>>,
}

#[async_trait]
impl Handler for RecordingHandler {
    async fn on_reliable_message(&self, message: Bytes) {
        self.reliable.lock().await.push(message);
    }

    async fn on_unreliable_message(&self, message: Bytes) {
        self.unreliable.lock().await.push(message);
    }

    async fn on_reliable_stream_message(&self, message: Bytes, stream_id: u32) {
        self.reliable_stream.lock().await.push((message, stream_id));
    }

    async fn on_unreliable_stream_message(&self, message: Bytes, stream_id: u32) {
        self.unreliable_stream.lock().await.push((message, stream_id));
    }

    async fn on_file(&self, filename: String, file_data: Bytes) {
        self.files.lock().await.push((filename, file_data));
    }
}

fn fast_config() -> PeerConfig {
    PeerConfig {
        ack_arrival_time: Duration::from_millis(20),
        wait_before_file_stream_release: Duration::from_millis(60),
        ..PeerConfig::default()
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

#[tokio::test]
async fn unreliable_message_is_delivered() {
    let (a_transport, b_transport) = duplex();
    let a_handler = RecordingHandler::default();
    let b_handler = RecordingHandler::default();
    let a = Peer::with_config(a_transport, a_handler, fast_config());
    let _b = Peer::with_config(b_transport, b_handler.clone(), fast_config());

    a.send_unreliable(b"hello").await.unwrap();
    settle().await;

    let got = b_handler.unreliable.lock().await;
    assert_eq!(got.as_slice(), &[Bytes::from_static(b"hello")]);
}

#[tokio::test]
async fn reliable_message_survives_a_dropped_first_transmission() {
    let (a_transport, b_transport) = duplex();
    let a_transport = DropNthSend::new(a_transport, 0);
    let a_handler = RecordingHandler::default();
    let b_handler = RecordingHandler::default();
    let a = Peer::with_config(a_transport, a_handler, fast_config());
    let _b = Peer::with_config(b_transport, b_handler.clone(), fast_config());

    a.send_reliable(b"important").await;
    settle().await;

    let got = b_handler.reliable.lock().await;
    assert_eq!(got.as_slice(), &[Bytes::from_static(b"important")]);
}

#[tokio::test]
async fn reliable_delivery_is_deduplicated_despite_retransmission() {
    // never ack at all: the retransmitter keeps resending, but the
    // receiver must still deliver the message exactly once.
    let (a_transport, b_transport) = duplex();
    let a_handler = RecordingHandler::default();
    let b_handler = RecordingHandler::default();
    let mut config = fast_config();
    config.ack_arrival_time = Duration::from_millis(15);
    let a = Peer::with_config(a_transport, a_handler, config.clone());
    let _b = Peer::with_config(b_transport, b_handler.clone(), config);

    a.send_reliable(b"once").await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let got = b_handler.reliable.lock().await;
    assert_eq!(got.as_slice(), &[Bytes::from_static(b"once")]);
}

#[tokio::test]
async fn payload_containing_the_barker_round_trips() {
    let (a_transport, b_transport) = duplex();
    let a_handler = RecordingHandler::default();
    let b_handler = RecordingHandler::default();
    let a = Peer::with_config(a_transport, a_handler, fast_config());
    let _b = Peer::with_config(b_transport, b_handler.clone(), fast_config());

    let mut payload = b"prefix-".to_vec();
    payload.extend_from_slice(BARKER);
    payload.extend_from_slice(b"-suffix");
    a.send_reliable(&payload).await;
    settle().await;

    let got = b_handler.reliable.lock().await;
    assert_eq!(got.as_slice(), &[Bytes::from(payload)]);
}

#[tokio::test]
async fn garbage_interleaved_between_frames_does_not_break_resync() {
    let (a_transport, b_transport) = duplex();
    let raw = a_transport.raw_sender();
    let a_handler = RecordingHandler::default();
    let b_handler = RecordingHandler::default();
    let a = Peer::with_config(a_transport, a_handler, fast_config());
    let _b = Peer::with_config(b_transport, b_handler.clone(), fast_config());

    raw.send(b"\x00\x01garbage-with-no-barker-at-all".to_vec()).unwrap();
    a.send_unreliable(b"first").await.unwrap();
    raw.send(b"more garbage, still no barker".to_vec()).unwrap();
    a.send_unreliable(b"second").await.unwrap();
    settle().await;

    let got = b_handler.unreliable.lock().await;
    assert_eq!(
        got.as_slice(),
        &[Bytes::from_static(b"first"), Bytes::from_static(b"second")]
    );
}

#[tokio::test]
async fn application_stream_messages_carry_their_stream_id() {
    let (a_transport, b_transport) = duplex();
    let a_handler = RecordingHandler::default();
    let b_handler = RecordingHandler::default();
    let a = Peer::with_config(a_transport, a_handler, fast_config());
    let _b = Peer::with_config(b_transport, b_handler.clone(), fast_config());

    a.send_reliable_stream(b"chat", 42).await;
    a.send_unreliable_stream(b"telemetry", 99).await.unwrap();
    settle().await;

    let reliable = b_handler.reliable_stream.lock().await;
    assert_eq!(reliable.as_slice(), &[(Bytes::from_static(b"chat"), 42)]);
    let unreliable = b_handler.unreliable_stream.lock().await;
    assert_eq!(
        unreliable.as_slice(),
        &[(Bytes::from_static(b"telemetry"), 99)]
    );
}

fn unique_temp_path(label: &str) -> std::path::PathBuf {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("p2p-core-test-{label}-{nonce}.bin"))
}

#[tokio::test]
async fn small_file_arrives_split_across_several_chunks() {
    let (a_transport, b_transport) = duplex();
    let a_handler = RecordingHandler::default();
    let b_handler = RecordingHandler::default();
    let mut config = fast_config();
    config.file_chunk_size = 2;
    let a = Peer::with_config(a_transport, a_handler, config.clone());
    let _b = Peer::with_config(b_transport, b_handler.clone(), config);

    let path = unique_temp_path("small-file");
    tokio::fs::write(&path, b"abcdefgh").await.unwrap();

    a.send_file(&path).await.unwrap();
    settle().await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    tokio::fs::remove_file(&path).await.ok();

    let files = b_handler.files.lock().await;
    assert_eq!(files.len(), 1);
    let (name, data) = &files[0];
    assert_eq!(name, path.file_name().unwrap().to_str().unwrap());
    assert_eq!(data, &Bytes::from_static(b"abcdefgh"));
}

#[tokio::test]
async fn send_file_blocks_when_the_stream_pool_is_exhausted() {
    let (a_transport, b_transport) = duplex();
    let a_handler = RecordingHandler::default();
    let b_handler = RecordingHandler::default();
    let mut config = fast_config();
    config.file_transfer_streams = vec![9001];
    config.wait_before_file_stream_release = Duration::from_millis(100);
    let a = Peer::with_config(a_transport, a_handler, config.clone());
    let _b = Peer::with_config(b_transport, b_handler.clone(), config);

    let first = unique_temp_path("first");
    let second = unique_temp_path("second");
    tokio::fs::write(&first, b"one").await.unwrap();
    tokio::fs::write(&second, b"two").await.unwrap();

    a.send_file(&first).await.unwrap();

    let start = Instant::now();
    a.send_file(&second).await.unwrap();
    let elapsed = start.elapsed();

    tokio::fs::remove_file(&first).await.ok();
    tokio::fs::remove_file(&second).await.ok();

    assert!(
        elapsed >= Duration::from_millis(80),
        "second send_file should block until the only stream id is released, took {elapsed:?}"
    );
}
