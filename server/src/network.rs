//! Server network layer: TCP listener and per-connection sessions
//!
//! Each accepted connection gets two tasks. The reader task decodes one
//! envelope per line and dispatches it against the shared [`Lobby`]; the
//! writer task drains the connection's outgoing queue onto the socket.
//! Everything that talks to a player (the lobby, running sessions, the
//! keep-alive monitor) goes through that queue, so lines never interleave.

use crate::lobby::{JoinRequest, Lobby};
use crate::users::{LoginTicket, UserDirectory};
use log::{debug, error, info, warn};
use shared::{decode, Connection, Message, Player};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;

/// How long queued lines may take to flush after the reader stops.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

pub const NOT_IDENTIFIED: &str = "Please identify first.";

/// Whether the connection stays open after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// Accepts connections and hands each one to its own session task
pub struct Server {
    listener: TcpListener,
    lobby: Arc<Mutex<Lobby>>,
}

impl Server {
    pub async fn bind(
        address: &str,
        lobby: Arc<Mutex<Lobby>>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(address).await?;
        info!("Server listening on {}", listener.local_addr()?);
        Ok(Server { listener, lobby })
    }

    /// Bound address, useful when binding to port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> std::io::Result<()> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            info!("Connection from {}", addr);
            let lobby = Arc::clone(&self.lobby);
            tokio::spawn(async move {
                handle_connection(stream, addr, lobby).await;
                info!("Connection from {} closed", addr);
            });
        }
    }
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, lobby: Arc<Mutex<Lobby>>) {
    let (read_half, write_half) = stream.into_split();
    let (connection, outgoing) = Connection::channel();
    let writer = tokio::spawn(write_lines(write_half, outgoing));

    let mut session = ClientSession::new(connection, lobby);
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let envelope = decode(&line);
                if session.handle(envelope.message).await == Flow::Close {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Read from {} failed: {}", addr, e);
                break;
            }
        }
    }

    session.disconnected().await;
    drop(session);

    if tokio::time::timeout(FLUSH_TIMEOUT, writer).await.is_err() {
        debug!("Writer for {} still had queued lines", addr);
    }
}

/// Drains a connection queue onto the socket, one line per entry.
async fn write_lines(mut writer: OwnedWriteHalf, mut outgoing: UnboundedReceiver<String>) {
    while let Some(mut line) = outgoing.recv().await {
        line.push('\n');
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            error!("Write failed: {}", e);
            return;
        }
    }
    let _ = writer.shutdown().await;
}

/// Who is on the other end of a connection, once identified.
#[derive(Debug, Clone)]
struct Identity {
    login_name: String,
    username: String,
    ticket: LoginTicket,
}

/// The connection's identity if its login is still the live one.
///
/// A stale identity is dropped: its name may already belong to someone else.
fn live_identity(identity: &mut Option<Identity>, users: &UserDirectory) -> Option<Identity> {
    let current = identity.as_ref()?;
    if users.is_current(&current.ticket, &current.username) {
        return Some(current.clone());
    }
    debug!("Login of {} on this connection has lapsed", current.username);
    *identity = None;
    None
}

/// Per-connection protocol state.
pub struct ClientSession {
    connection: Connection,
    lobby: Arc<Mutex<Lobby>>,
    identity: Option<Identity>,
}

impl ClientSession {
    pub fn new(connection: Connection, lobby: Arc<Mutex<Lobby>>) -> Self {
        Self {
            connection,
            lobby,
            identity: None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.username.as_str())
    }

    fn reply(&self, message: Message) {
        self.connection.send_message(message);
    }

    /// Dispatches one decoded client message.
    pub async fn handle(&mut self, message: Message) -> Flow {
        match message {
            Message::Identify {
                login_name,
                password,
                display_name,
                multi_login,
            } => {
                self.identify(&login_name, &password, &display_name, multi_login)
                    .await
            }
            join @ Message::Join { .. } => {
                if let Some(request) = JoinRequest::from_message(&join) {
                    self.join(request).await;
                }
            }
            Message::GameAction { game_id, payload } => {
                let mut lobby = self.lobby.lock().await;
                let Some(identity) = live_identity(&mut self.identity, lobby.users()) else {
                    self.reply(Message::exception("Action rejected", NOT_IDENTIFIED));
                    return Flow::Continue;
                };
                if let Err(reply) = lobby.route_action(game_id, &identity.username, &payload) {
                    self.reply(reply);
                }
            }
            Message::KeepAlive => {
                let mut lobby = self.lobby.lock().await;
                if let Some(identity) = live_identity(&mut self.identity, lobby.users()) {
                    lobby.keep_alive_answered(&identity.username);
                }
            }
            Message::ListGames => {
                let registry = Arc::clone(self.lobby.lock().await.registry());
                match tokio::task::spawn_blocking(move || registry.list_installed()).await {
                    Ok(Ok(game_types)) => self.reply(Message::GameList { game_types }),
                    Ok(Err(e)) => self.reply(Message::exception("Cannot list game types", e.to_string())),
                    Err(e) => self.reply(Message::exception("Cannot list game types", e.to_string())),
                }
            }
            Message::Goodbye => {
                debug!("{} said goodbye", self.username().unwrap_or("anonymous peer"));
                return Flow::Close;
            }
            Message::ForceClose { reason } => {
                warn!("Closing connection: {}", reason);
                self.reply(Message::ForceClose { reason });
                return Flow::Close;
            }
            other => {
                warn!("Unexpected {} message from client", other.kind());
                self.reply(Message::exception(
                    "Unexpected message",
                    format!("{} is not accepted from clients", other.kind()),
                ));
            }
        }
        Flow::Continue
    }

    async fn identify(
        &mut self,
        login_name: &str,
        password: &str,
        display_name: &str,
        multi_login: bool,
    ) {
        let mut lobby = self.lobby.lock().await;
        if let Some(identity) = live_identity(&mut self.identity, lobby.users()) {
            self.reply(Message::IdentifyResponse {
                success: false,
                reason: format!("Already identified as {}.", identity.username),
                username: Some(identity.username),
            });
            return;
        }

        let outcome = lobby
            .users_mut()
            .identify(login_name, password, display_name, multi_login);
        if let (Some(username), Some(ticket)) = (&outcome.username, outcome.ticket) {
            self.identity = Some(Identity {
                login_name: login_name.to_string(),
                username: username.clone(),
                ticket,
            });
        }
        self.reply(outcome.into_message());
    }

    async fn join(&mut self, request: JoinRequest) {
        let mut lobby = self.lobby.lock().await;
        let Some(identity) = live_identity(&mut self.identity, lobby.users()) else {
            self.reply(Message::join_failed(NOT_IDENTIFIED));
            return;
        };

        let player = Player::new(
            &identity.login_name,
            &identity.username,
            Some(self.connection.clone()),
        );
        lobby.join(&request, player);
    }

    /// Ends the player's sessions and logs them off.
    pub async fn disconnected(&mut self) {
        let mut lobby = self.lobby.lock().await;
        if let Some(identity) = live_identity(&mut self.identity, lobby.users()) {
            info!("{} disconnected", identity.username);
            lobby.player_disconnected(&identity.username);
        }
        self.identity = None;
    }
}
