// End-to-end tests for the caro server
// Each test binds an in-process server on an ephemeral loopback port and
// talks to it over real TCP connections.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Duration};

use rusty_caro::config::{DisconnectPolicy, ServerConfig};
use rusty_caro::core::matchmaker::Matchmaker;
use rusty_caro::core::message::ServerEvent;
use rusty_caro::core::GameServer;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect failed");
        let (read_half, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read_half).lines(),
            writer,
        }
    }

    /// Connect and register, waiting until the server has queued us
    async fn join_as_first(addr: SocketAddr, nick: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.send(&format!("NICK:{}", nick)).await;
        client.expect("INFO:Waiting for an opponent...").await;
        client
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .expect("write failed");
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write failed");
    }

    /// Next line, or None once the server closed the connection
    async fn recv(&mut self) -> Option<String> {
        match timeout(READ_TIMEOUT, self.lines.next_line()).await {
            Ok(Ok(line)) => line,
            Ok(Err(_)) => None,
            Err(_) => panic!("timed out waiting for the server"),
        }
    }

    async fn expect(&mut self, expected: &str) {
        let line = self.recv().await;
        assert_eq!(line.as_deref(), Some(expected));
    }

    async fn expect_info(&mut self) -> String {
        match self.recv().await.map(|line| line.parse::<ServerEvent>()) {
            Some(Ok(ServerEvent::Info(text))) => text,
            other => panic!("expected INFO, got {:?}", other),
        }
    }

    async fn expect_closed(&mut self) {
        assert_eq!(self.recv().await, None);
    }
}

async fn start_server(config: ServerConfig) -> (SocketAddr, Arc<Matchmaker>) {
    let server = GameServer::bind(config).await.expect("bind failed");
    let addr = server.local_addr().unwrap();
    let matchmaker = server.matchmaker();
    tokio::spawn(server.run());
    (addr, matchmaker)
}

/// Connect two players and consume the match opening on both sides
async fn paired_clients(addr: SocketAddr) -> (TestClient, TestClient) {
    let mut alice = TestClient::join_as_first(addr, "alice").await;
    let mut bob = TestClient::connect(addr).await;
    bob.send("NICK:bob").await;

    for line in ["ROLE:X", "OPPONENT:bob", "START:SIZE=15", "TURN:X"] {
        alice.expect(line).await;
    }
    for line in ["ROLE:O", "OPPONENT:alice", "START:SIZE=15", "TURN:X"] {
        bob.expect(line).await;
    }
    (alice, bob)
}

async fn play(mover: &mut TestClient, other: &mut TestClient, x: i64, y: i64, mark: &str) {
    mover.send(&format!("MOVE:{},{}", x, y)).await;
    let board = format!("BOARD:{},{},{}", x, y, mark);
    mover.expect(&board).await;
    other.expect(&board).await;
}

#[tokio::test]
async fn test_horizontal_win_then_rematch() {
    let (addr, _) = start_server(ServerConfig::for_testing()).await;
    let (mut alice, mut bob) = paired_clients(addr).await;

    let o_moves = [(0, 0), (0, 1), (0, 2), (0, 3)];
    for (i, x) in (7..=11).enumerate() {
        play(&mut alice, &mut bob, x, 7, "X").await;
        if x == 11 {
            break;
        }
        alice.expect("TURN:O").await;
        bob.expect("TURN:O").await;

        let (ox, oy) = o_moves[i];
        play(&mut bob, &mut alice, ox, oy, "O").await;
        alice.expect("TURN:X").await;
        bob.expect("TURN:X").await;
    }
    alice.expect("WIN:X").await;
    bob.expect("WIN:X").await;

    // No more moves until someone asks for a rematch
    bob.send("MOVE:5,5").await;
    assert!(bob.expect_info().await.contains("REMATCH"));
    alice.send("MOVE:5,5").await;
    alice.expect_info().await;

    bob.send("REMATCH").await;
    assert!(alice.expect_info().await.contains("bob"));
    for client in [&mut alice, &mut bob] {
        client.expect("START:SIZE=15").await;
        client.expect("TURN:X").await;
    }

    // The fresh board accepts the old winning cell again
    play(&mut alice, &mut bob, 7, 7, "X").await;
}

#[tokio::test]
async fn test_rule_violations_reach_only_the_sender() {
    let (addr, _) = start_server(ServerConfig::for_testing()).await;
    let (mut alice, mut bob) = paired_clients(addr).await;

    bob.send("MOVE:1,1").await;
    assert_eq!(bob.expect_info().await, "Not your turn");

    alice.send("MOVE:15,0").await;
    alice.expect_info().await;
    alice.send("HELLO").await;
    assert!(alice.expect_info().await.contains("HELLO"));
    bob.send("REMATCH").await;
    assert_eq!(bob.expect_info().await, "Match is still in progress");

    // Alice's first line after all that is her own placement
    play(&mut alice, &mut bob, 3, 3, "X").await;
    alice.expect("TURN:O").await;
    bob.expect("TURN:O").await;

    alice.send("MOVE:4,4").await;
    alice.expect_info().await;
    bob.send("MOVE:3,3").await;
    assert!(bob.expect_info().await.contains("already taken"));
}

#[tokio::test]
async fn test_invalid_utf8_line_keeps_the_match_going() {
    let (addr, _) = start_server(ServerConfig::for_testing()).await;
    let (mut alice, mut bob) = paired_clients(addr).await;

    alice.send_raw(&[0xff, 0xfe, b'\n']).await;
    assert!(alice.expect_info().await.starts_with("Unrecognized command"));

    play(&mut alice, &mut bob, 7, 7, "X").await;
    alice.expect("TURN:O").await;
    bob.expect("TURN:O").await;
}

#[tokio::test]
async fn test_over_long_line_is_rejected_and_the_session_continues() {
    let config = ServerConfig {
        max_line_length: 32,
        ..ServerConfig::for_testing()
    };
    let (addr, _) = start_server(config).await;
    let mut alice = TestClient::join_as_first(addr, "alice").await;

    let mut flood = vec![b'x'; 200_000];
    flood.push(b'\n');
    alice.send_raw(&flood).await;
    assert!(alice.expect_info().await.contains("200000"));

    alice.send("EXIT").await;
    alice.expect("INFO:Goodbye").await;
    alice.expect_closed().await;
}

#[tokio::test]
async fn test_disconnect_notifies_the_other_player() {
    let (addr, _) = start_server(ServerConfig::for_testing()).await;
    let (mut alice, mut bob) = paired_clients(addr).await;

    play(&mut alice, &mut bob, 7, 7, "X").await;
    alice.expect("TURN:O").await;
    bob.expect("TURN:O").await;

    drop(alice);
    bob.expect("OPPONENT_LEFT").await;
    bob.expect_closed().await;
}

#[tokio::test]
async fn test_exit_mid_match() {
    let (addr, _) = start_server(ServerConfig::for_testing()).await;
    let (mut alice, mut bob) = paired_clients(addr).await;

    bob.send("EXIT").await;
    bob.expect("INFO:Goodbye").await;
    bob.expect_closed().await;

    alice.expect("OPPONENT_LEFT").await;
    alice.expect_closed().await;
}

#[tokio::test]
async fn test_handshake_failures_close_the_connection() {
    let (addr, matchmaker) = start_server(ServerConfig::for_testing()).await;

    let mut no_nick = TestClient::connect(addr).await;
    no_nick.send("MOVE:1,1").await;
    no_nick.expect_info().await;
    no_nick.expect_closed().await;

    let mut blank = TestClient::connect(addr).await;
    blank.send("NICK:   ").await;
    assert!(blank.expect_info().await.contains("empty"));
    blank.expect_closed().await;

    assert_eq!(matchmaker.queue_len(), 0);
}

#[tokio::test]
async fn test_exit_while_waiting_leaves_the_queue() {
    let (addr, matchmaker) = start_server(ServerConfig::for_testing()).await;

    let mut alice = TestClient::join_as_first(addr, "alice").await;
    alice.send("MOVE:0,0").await;
    assert_eq!(alice.expect_info().await, "Waiting for an opponent");
    alice.send("EXIT").await;
    alice.expect("INFO:Goodbye").await;
    alice.expect_closed().await;
    assert_eq!(matchmaker.queue_len(), 0);

    // The next two arrivals pair with each other
    let mut carol = TestClient::join_as_first(addr, "carol").await;
    let mut dave = TestClient::connect(addr).await;
    dave.send("NICK:dave").await;
    carol.expect("ROLE:X").await;
    carol.expect("OPPONENT:dave").await;
    dave.expect("ROLE:O").await;
    dave.expect("OPPONENT:carol").await;
}

#[tokio::test]
async fn test_disconnect_while_waiting_leaves_the_queue() {
    let (addr, matchmaker) = start_server(ServerConfig::for_testing()).await;

    let alice = TestClient::join_as_first(addr, "alice").await;
    assert_eq!(matchmaker.queue_len(), 1);
    drop(alice);

    for _ in 0..50 {
        if matchmaker.queue_len() == 0 {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(matchmaker.queue_len(), 0);
}

#[tokio::test]
async fn test_requeue_policy_returns_survivor_to_queue() {
    let config = ServerConfig {
        disconnect_policy: DisconnectPolicy::Requeue,
        ..ServerConfig::for_testing()
    };
    let (addr, matchmaker) = start_server(config).await;
    let (mut alice, mut bob) = paired_clients(addr).await;

    bob.send("EXIT").await;
    bob.expect("INFO:Goodbye").await;
    bob.expect_closed().await;

    alice.expect("OPPONENT_LEFT").await;
    alice.expect("INFO:Waiting for an opponent...").await;
    assert_eq!(matchmaker.queue_len(), 1);

    let mut carol = TestClient::connect(addr).await;
    carol.send("NICK:carol").await;
    for line in ["ROLE:X", "OPPONENT:carol", "START:SIZE=15", "TURN:X"] {
        alice.expect(line).await;
    }
    for line in ["ROLE:O", "OPPONENT:alice", "START:SIZE=15", "TURN:X"] {
        carol.expect(line).await;
    }
    assert_eq!(matchmaker.rooms_created(), 2);
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let (addr, _) = start_server(ServerConfig::for_testing()).await;
    let config = ServerConfig {
        port: addr.port(),
        ..ServerConfig::for_testing()
    };
    let err = GameServer::bind(config).await.err().expect("second bind should fail");
    assert!(err.to_string().contains("Failed to bind"));
}
