//! Integration tests for the game room server
//!
//! These tests start a real server on a loopback port and drive it with
//! plain TCP clients speaking the JSON line protocol.

use server::config::ServerConfig;
use server::games::tictactoe::{Move, MOVE};
use server::keepalive;
use server::lobby::Lobby;
use server::network::Server;
use server::observer::LogObserver;
use shared::{decode, encode, Envelope, GameMode, GamePayload, JoinType, Message};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    lobby: Arc<Mutex<Lobby>>,
    _store: TempDir,
}

/// Starts a server with anonymous login on an OS-chosen port.
async fn start_server() -> TestServer {
    let store = TempDir::new().unwrap();
    let config = ServerConfig {
        port: 0,
        anonymous_login: true,
        user_store: store.path().join("users.json"),
        ..ServerConfig::default()
    };

    let lobby = Arc::new(Mutex::new(
        Lobby::from_config(&config, Arc::new(LogObserver)).unwrap(),
    ));
    let server = Server::bind(&config.address(), Arc::clone(&lobby)).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    TestServer {
        addr,
        lobby,
        _store: store,
    }
}

struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read_half).lines(),
            writer,
        }
    }

    /// Connects and logs in under the given display name.
    async fn login(addr: SocketAddr, name: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client
            .send(Message::Identify {
                login_name: name.to_string(),
                password: String::new(),
                display_name: name.to_string(),
                multi_login: false,
            })
            .await;
        match client.recv().await {
            Message::IdentifyResponse {
                success: true,
                username,
                ..
            } => assert_eq!(username.as_deref(), Some(name)),
            other => panic!("expected IdentifyResponse, got {other:?}"),
        }
        client
    }

    async fn send_line(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    async fn send(&mut self, message: Message) {
        let line = encode(&Envelope::new(message));
        self.send_line(&line).await;
    }

    async fn next_line(&mut self) -> Option<String> {
        tokio::time::timeout(RECV_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for the server")
            .unwrap()
    }

    async fn recv(&mut self) -> Message {
        let line = self.next_line().await.expect("connection closed");
        decode(&line).message
    }

    /// Skips messages until one matches.
    async fn recv_until(&mut self, wanted: impl Fn(&Message) -> bool) -> Message {
        loop {
            let message = self.recv().await;
            if wanted(&message) {
                return message;
            }
        }
    }

    async fn join(&mut self, mode: GameMode, join_type: JoinType, party: Option<&str>, private: bool) {
        self.send(Message::Join {
            game_type: "TicTacToe".to_string(),
            mode,
            join_type,
            party_name: party.map(str::to_string),
            private,
        })
        .await;
    }

    async fn auto_join(&mut self) {
        self.join(GameMode::Multiplayer, JoinType::Auto, None, false).await;
    }
}

fn is_started(message: &Message) -> bool {
    matches!(message, Message::GameStarted { .. })
}

fn is_update(message: &Message) -> bool {
    matches!(message, Message::GameUpdate { .. })
}

fn is_terminated(message: &Message) -> bool {
    matches!(message, Message::GameTerminated { .. })
}

/// Two anonymous players auto-joined into one running TicTacToe session.
async fn running_pair(addr: SocketAddr) -> (TestClient, TestClient, u64) {
    let mut alice = TestClient::login(addr, "alice").await;
    let mut bob = TestClient::login(addr, "bob").await;

    alice.auto_join().await;
    let game_id = match alice.recv().await {
        Message::JoinResponse {
            success: true,
            created: true,
            game_id: Some(id),
            ..
        } => id,
        other => panic!("expected JoinResponse, got {other:?}"),
    };

    bob.auto_join().await;
    assert!(matches!(
        bob.recv().await,
        Message::JoinResponse { success: true, created: false, game_id: Some(id), .. } if id == game_id
    ));

    for client in [&mut alice, &mut bob] {
        match client.recv_until(is_started).await {
            Message::GameStarted { players, .. } => assert_eq!(players.len(), 2),
            _ => unreachable!(),
        }
    }

    (alice, bob, game_id)
}

/// MATCHMAKING TESTS
mod matchmaking_tests {
    use super::*;

    /// Two auto-joins fill one session, which starts for both players
    #[tokio::test]
    async fn auto_join_pairs_players_and_plays_to_the_end() {
        let server = start_server().await;
        let (mut alice, mut bob, game_id) = running_pair(server.addr).await;
        assert_eq!(server.lobby.lock().await.running().len(), 1);

        // initial board
        alice.recv_until(is_update).await;
        bob.recv_until(is_update).await;

        let moves = [(true, 0), (false, 3), (true, 1), (false, 4)];
        for (alice_moves, cell) in moves {
            let payload = GamePayload::pack(MOVE, &Move { cell }).unwrap();
            let mover = if alice_moves { &mut alice } else { &mut bob };
            mover.send(Message::GameAction { game_id, payload }).await;
            alice.recv_until(is_update).await;
            bob.recv_until(is_update).await;
        }

        let payload = GamePayload::pack(MOVE, &Move { cell: 2 }).unwrap();
        alice.send(Message::GameAction { game_id, payload }).await;
        for client in [&mut alice, &mut bob] {
            match client.recv_until(is_terminated).await {
                Message::GameTerminated { reason, .. } => assert_eq!(reason, "alice wins"),
                _ => unreachable!(),
            }
        }
        assert!(server.lobby.lock().await.running().is_empty());
    }

    /// A second create for a waiting party name fails
    #[tokio::test]
    async fn create_named_party_twice_fails() {
        let server = start_server().await;
        let mut alice = TestClient::login(server.addr, "alice").await;
        let mut bob = TestClient::login(server.addr, "bob").await;

        alice
            .join(GameMode::Multiplayer, JoinType::Create, Some("p1"), true)
            .await;
        assert!(matches!(
            alice.recv().await,
            Message::JoinResponse { success: true, created: true, .. }
        ));

        bob.join(GameMode::Multiplayer, JoinType::Create, Some("p1"), true)
            .await;
        match bob.recv().await {
            Message::JoinResponse {
                success: false,
                reason: Some(reason),
                ..
            } => assert!(reason.contains("already exists")),
            other => panic!("expected failed JoinResponse, got {other:?}"),
        }

        let lobby = server.lobby.lock().await;
        assert_eq!(lobby.waiting().len(), 1);
        assert!(lobby.waiting()[0].private);
    }

    /// Single-player sessions start at once against an AI
    #[tokio::test]
    async fn single_player_starts_immediately() {
        let server = start_server().await;
        let mut carol = TestClient::login(server.addr, "carol").await;

        carol
            .join(GameMode::SinglePlayer, JoinType::Auto, None, false)
            .await;
        assert!(matches!(
            carol.recv().await,
            Message::JoinResponse { success: true, created: true, .. }
        ));
        match carol.recv_until(is_started).await {
            Message::GameStarted { players, .. } => {
                assert_eq!(players.len(), 2);
                assert!(players[1].ai);
            }
            _ => unreachable!(),
        }

        let lobby = server.lobby.lock().await;
        assert!(lobby.running()[0].private);
    }

    /// Joining before identifying is refused
    #[tokio::test]
    async fn join_requires_identify() {
        let server = start_server().await;
        let mut client = TestClient::connect(server.addr).await;

        client.auto_join().await;
        assert!(matches!(
            client.recv().await,
            Message::JoinResponse { success: false, .. }
        ));
    }
}

/// CONNECTION LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;

    /// A player who never answers a probe ends the session for the others
    #[tokio::test]
    async fn keep_alive_terminates_silent_player() {
        let server = start_server().await;
        let (mut alice, _bob, game_id) = running_pair(server.addr).await;
        tokio::spawn(keepalive::run(
            Arc::clone(&server.lobby),
            Duration::from_millis(200),
        ));

        let reason = loop {
            match alice.recv().await {
                Message::KeepAlive => alice.send(Message::KeepAlive).await,
                Message::GameTerminated { game_id: id, reason } => {
                    assert_eq!(id, game_id);
                    break reason;
                }
                _ => {}
            }
        };
        assert_eq!(reason, "bob did not answer");
        assert!(server.lobby.lock().await.running().is_empty());
    }

    /// Losing a connection ends that player's session
    #[tokio::test]
    async fn disconnect_terminates_game() {
        let server = start_server().await;
        let (mut alice, bob, _game_id) = running_pair(server.addr).await;

        drop(bob);
        match alice.recv_until(is_terminated).await {
            Message::GameTerminated { reason, .. } => assert_eq!(reason, "bob left the game"),
            _ => unreachable!(),
        }
    }

    /// An undecodable line is answered with ForceClose and the connection closes
    #[tokio::test]
    async fn malformed_line_force_closes() {
        let server = start_server().await;
        let mut client = TestClient::connect(server.addr).await;

        client.send_line("this is not json").await;
        match client.recv().await {
            Message::ForceClose { reason } => assert!(reason.contains("Could not decode")),
            other => panic!("expected ForceClose, got {other:?}"),
        }
        assert!(client.next_line().await.is_none());
    }

    /// The list of game types comes from the module registry
    #[tokio::test]
    async fn list_games() {
        let server = start_server().await;
        let mut client = TestClient::connect(server.addr).await;

        client.send(Message::ListGames).await;
        assert_eq!(
            client.recv().await,
            Message::GameList {
                game_types: vec!["TicTacToe".to_string()]
            }
        );
    }
}
