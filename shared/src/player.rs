use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::message::{Envelope, Message};

/// A participant in one game session.
///
/// Two players are equal when their display names match, regardless of id
/// or connection. A session uses this to recognize a player echoed back in
/// a message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    /// Session-scoped id, assigned from 1 upward as players join
    pub id: u32,
    /// Name the user logged in with
    pub login_name: String,
    /// Display name, unique among logged-in users
    pub name: String,
    /// Synthetic opponent that never owns a connection
    #[serde(default)]
    pub ai: bool,
    /// Outgoing line queue of the owning connection, never serialized
    #[serde(skip)]
    pub connection: Option<Connection>,
}

impl Player {
    pub fn new(login_name: &str, name: &str, connection: Option<Connection>) -> Self {
        Self {
            id: 0,
            login_name: login_name.to_string(),
            name: name.to_string(),
            ai: false,
            connection,
        }
    }

    pub fn ai(name: &str) -> Self {
        Self {
            id: 0,
            login_name: name.to_string(),
            name: name.to_string(),
            ai: true,
            connection: None,
        }
    }

    /// Sends a message addressed to this player.
    ///
    /// Returns false when the player has no connection or the connection
    /// is already closed.
    pub fn send(&self, message: Message) -> bool {
        match &self.connection {
            Some(connection) => connection.send(&Envelope::for_player(self.without_connection(), message)),
            None => false,
        }
    }

    /// Copy of this player suitable for putting on the wire.
    pub fn without_connection(&self) -> Player {
        Player {
            connection: None,
            ..self.clone()
        }
    }
}

impl PartialEq for Player {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Player {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_by_name() {
        let mut a = Player::new("alice", "Alice", None);
        a.id = 1;
        let mut b = Player::new("other-login", "Alice", None);
        b.id = 7;
        let c = Player::new("alice", "Bob", None);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_connection_is_not_serialized() {
        let (connection, _rx) = Connection::channel();
        let player = Player::new("alice", "Alice", Some(connection));

        let json = serde_json::to_string(&player).unwrap();
        assert!(!json.contains("connection"));

        let back: Player = serde_json::from_str(&json).unwrap();
        assert!(back.connection.is_none());
        assert!(!back.ai);
    }

    #[test]
    fn test_send_without_connection_fails() {
        let player = Player::ai("Computer");
        assert!(!player.send(Message::KeepAlive));
    }

    #[test]
    fn test_send_addresses_envelope() {
        let (connection, mut rx) = Connection::channel();
        let player = Player::new("alice", "Alice", Some(connection));

        assert!(player.send(Message::KeepAlive));
        let line = rx.try_recv().unwrap();
        let envelope = crate::codec::decode(&line);
        assert_eq!(envelope.message, Message::KeepAlive);
        assert_eq!(envelope.player.unwrap().name, "Alice");
    }
}
