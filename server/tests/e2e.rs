//! End-to-end tests over real TCP against an in-process server on an
//! ephemeral port.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use common::codec::parse_message;
use common::net::{FrameReader, write_frame};
use common::{Record, RecordKind};
use pipechat_server::net::run_server;
use pipechat_server::{ServerConfig, ServerState};

const READ_TIMEOUT: Duration = Duration::from_secs(3);
const QUIET: Duration = Duration::from_millis(200);

struct TestServer {
    addr: std::net::SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), Box<dyn std::error::Error + Send + Sync>>>,
}

impl TestServer {
    async fn start() -> TestServer {
        TestServer::start_with(ServerConfig::default()).await
    }

    async fn start_with(mut config: ServerConfig) -> TestServer {
        config.host = "127.0.0.1".into();
        config.log_path = String::new();

        let state = ServerState::new(config);
        state.users.lock().unwrap().init_defaults();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");

        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(run_server(listener, state, async move {
            let _ = stopped.await;
        }));

        TestServer {
            addr,
            stop: Some(stop),
            task,
        }
    }

    async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        timeout(READ_TIMEOUT, &mut self.task)
            .await
            .expect("server should stop promptly")
            .expect("server task should not panic")
            .expect("server should exit cleanly");
    }
}

struct TestClient {
    reader: FrameReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(server: &TestServer) -> TestClient {
        let stream = TcpStream::connect(server.addr).await.expect("connect");
        let (read_half, write_half) = stream.into_split();
        TestClient {
            reader: FrameReader::new(read_half),
            writer: write_half,
        }
    }

    async fn send(&mut self, frame: &str) {
        write_frame(&mut self.writer, frame).await.expect("send");
    }

    async fn recv(&mut self) -> Record {
        let frame = timeout(READ_TIMEOUT, self.reader.read_frame())
            .await
            .expect("timed out waiting for a frame")
            .expect("read frame")
            .expect("stream closed while waiting for a frame");
        parse_message(&frame).expect("inbound frame should parse")
    }

    async fn expect_silence(&mut self) {
        let result = timeout(QUIET, self.reader.read_frame()).await;
        assert!(result.is_err(), "expected no frame, got {result:?}");
    }

    async fn send_raw(&mut self, bytes: &str) {
        use tokio::io::AsyncWriteExt;
        self.writer.write_all(bytes.as_bytes()).await.expect("send");
        self.writer.flush().await.expect("flush");
    }

    async fn login(&mut self, name: &str, pass: &str) {
        self.send(&format!("LOGIN|{name}|server|2024-01-15 10:30:00|{pass}"))
            .await;
        let reply = self.recv().await;
        assert_eq!(reply.kind, RecordKind::Ok, "login reply: {reply:?}");
        assert_eq!(reply.content, "0|Login successful");
    }
}

#[tokio::test]
async fn login_round_trip() {
    let server = TestServer::start().await;
    let mut alice = TestClient::connect(&server).await;

    alice
        .send("LOGIN|alice|server|2024-01-15 10:30:00|alice123")
        .await;
    let reply = alice.recv().await;
    assert_eq!(reply.kind, RecordKind::Ok);
    assert_eq!(reply.sender, "server");
    assert_eq!(reply.receiver, "client");
    assert_eq!(reply.content, "0|Login successful");

    server.shutdown().await;
}

#[tokio::test]
async fn direct_message_to_offline_user() {
    let server = TestServer::start().await;
    let mut alice = TestClient::connect(&server).await;
    alice.login("alice", "alice123").await;

    alice.send("MSG|alice|bob|2024-01-15 10:31:00|hi").await;
    let reply = alice.recv().await;
    assert_eq!(reply.kind, RecordKind::Error);
    assert_eq!(reply.content, "1003|User is offline");

    server.shutdown().await;
}

#[tokio::test]
async fn direct_message_to_unknown_user() {
    let server = TestServer::start().await;
    let mut alice = TestClient::connect(&server).await;
    alice.login("alice", "alice123").await;

    alice.send("MSG|alice|zzz|2024-01-15 10:31:00|hi").await;
    let reply = alice.recv().await;
    assert_eq!(reply.kind, RecordKind::Error);
    assert_eq!(reply.content, "1002|User not found");

    server.shutdown().await;
}

#[tokio::test]
async fn broadcast_excludes_sender() {
    let server = TestServer::start().await;
    let mut alice = TestClient::connect(&server).await;
    let mut bob = TestClient::connect(&server).await;
    let mut charlie = TestClient::connect(&server).await;
    alice.login("alice", "alice123").await;
    bob.login("bob", "bob123").await;
    charlie.login("charlie", "charlie123").await;

    alice
        .send("BROADCAST|alice|*|2024-01-15 10:32:00|hello")
        .await;

    let ack = alice.recv().await;
    assert_eq!(ack.kind, RecordKind::Ok);
    assert_eq!(ack.content, "0|Broadcast sent successfully");

    for peer in [&mut bob, &mut charlie] {
        let frame = peer.recv().await;
        assert_eq!(frame.kind, RecordKind::Broadcast);
        assert_eq!(frame.sender, "alice");
        assert_eq!(frame.content, "hello");
    }

    // The sender hears only the acknowledgement.
    alice.expect_silence().await;

    server.shutdown().await;
}

#[tokio::test]
async fn escaped_content_round_trips_through_private_message() {
    let server = TestServer::start().await;
    let mut alice = TestClient::connect(&server).await;
    let mut bob = TestClient::connect(&server).await;
    alice.login("alice", "alice123").await;
    bob.login("bob", "bob123").await;

    alice
        .send("MSG|alice|bob|2024-01-15 10:33:00|Hello\\|World\\nNew")
        .await;

    let ack = alice.recv().await;
    assert_eq!(ack.kind, RecordKind::Ok);
    assert_eq!(ack.content, "0|Message sent successfully");

    let frame = bob.recv().await;
    assert_eq!(frame.kind, RecordKind::Msg);
    assert_eq!(frame.sender, "alice");
    assert_eq!(frame.content, "Hello|World\nNew");

    server.shutdown().await;
}

#[tokio::test]
async fn spoofed_sender_is_blocked_and_session_survives() {
    let server = TestServer::start().await;
    let mut alice = TestClient::connect(&server).await;
    alice.login("alice", "alice123").await;

    alice.send("MSG|bob|alice|2024-01-15 10:34:00|spoof").await;
    let reply = alice.recv().await;
    assert_eq!(reply.kind, RecordKind::Error);
    assert_eq!(reply.content, "1001|Sender mismatch");

    // Still authenticated: the status report says so.
    alice.send("STATUS|alice|server||").await;
    let status = alice.recv().await;
    assert_eq!(status.kind, RecordKind::Ok);
    assert!(status.content.contains("- Your status: Online"));

    server.shutdown().await;
}

#[tokio::test]
async fn second_login_for_an_online_user_is_rejected() {
    let server = TestServer::start().await;
    let mut alice = TestClient::connect(&server).await;
    alice.login("alice", "alice123").await;

    let mut intruder = TestClient::connect(&server).await;
    intruder.send("LOGIN|alice|server||alice123").await;
    let reply = intruder.recv().await;
    assert_eq!(reply.kind, RecordKind::Error);
    assert_eq!(reply.content, "1001|User already logged in");

    server.shutdown().await;
}

#[tokio::test]
async fn logout_frees_the_identity() {
    let server = TestServer::start().await;
    let mut alice = TestClient::connect(&server).await;
    alice.login("alice", "alice123").await;

    alice.send("LOGOUT|alice|server||").await;
    let reply = alice.recv().await;
    assert_eq!(reply.content, "0|Logout successful");

    let mut other = TestClient::connect(&server).await;
    other.login("alice", "alice123").await;

    server.shutdown().await;
}

#[tokio::test]
async fn garbage_frame_yields_parse_error() {
    let server = TestServer::start().await;
    let mut client = TestClient::connect(&server).await;

    client.send("this is not a frame").await;
    let reply = client.recv().await;
    assert_eq!(reply.kind, RecordKind::Error);
    assert_eq!(reply.content, "5000|Failed to parse message");

    server.shutdown().await;
}

#[tokio::test]
async fn fragmented_and_coalesced_writes_are_framed_correctly() {
    let server = TestServer::start().await;
    let mut alice = TestClient::connect(&server).await;
    let mut bob = TestClient::connect(&server).await;
    alice.login("alice", "alice123").await;
    bob.login("bob", "bob123").await;

    // One logical frame split across two writes...
    alice.send_raw("MSG|alice|bob|2024-01-15 1").await;
    alice.send_raw("0:35:00|part one\n").await;
    // ...then two frames in a single write.
    alice
        .send_raw("MSG|alice|bob||part two\nMSG|alice|bob||part three\n")
        .await;

    for expected in ["part one", "part two", "part three"] {
        let ack = alice.recv().await;
        assert_eq!(ack.content, "0|Message sent successfully");
        let frame = bob.recv().await;
        assert_eq!(frame.content, expected);
    }

    server.shutdown().await;
}

#[tokio::test]
async fn connections_above_max_clients_are_refused() {
    let config = ServerConfig {
        max_clients: 1,
        ..ServerConfig::default()
    };
    let server = TestServer::start_with(config).await;

    let mut first = TestClient::connect(&server).await;
    first.login("alice", "alice123").await;

    // The second connection is dropped with no reply.
    let mut second = TestClient::connect(&server).await;
    let closed = timeout(READ_TIMEOUT, second.reader.read_frame())
        .await
        .expect("refusal should be prompt")
        .expect("read");
    assert!(closed.is_none(), "expected the server to close the socket");

    server.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_live_connections() {
    let server = TestServer::start().await;
    let mut alice = TestClient::connect(&server).await;
    alice.login("alice", "alice123").await;

    let addr = server.addr;
    server.shutdown().await;

    let closed = timeout(READ_TIMEOUT, alice.reader.read_frame())
        .await
        .expect("close should be prompt")
        .expect("read");
    assert!(closed.is_none());
    assert!(TcpStream::connect(addr).await.is_err());
}
